use std::env;
use std::path::PathBuf;

use portfolio_sw::AppConfig;

fn print_usage() {
    eprintln!("Usage: portfolio-sw [OPTIONS]");
    eprintln!();
    eprintln!("Serves a site through the offline caching worker.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <PATH>     Config file (default: {})", AppConfig::default_path().display());
    eprintln!("  --upstream <URL>    Origin to proxy");
    eprintln!("  --host <HOST>       Bind address (default: 127.0.0.1)");
    eprintln!("  --port <PORT>       Bind port (default: 9724)");
    eprintln!("  -h, --help          Show this help");
}

fn value_of(args: &[String], i: usize, flag: &str) -> String {
    if let Some(value) = args.get(i) {
        value.clone()
    } else {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() -> portfolio_sw::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut config_path: Option<PathBuf> = None;
    let mut upstream = None;
    let mut host = None;
    let mut port = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--config" => {
                i += 1;
                config_path = Some(PathBuf::from(value_of(&args, i, "--config")));
            }
            "--upstream" => {
                i += 1;
                upstream = Some(value_of(&args, i, "--upstream"));
            }
            "--host" => {
                i += 1;
                host = Some(value_of(&args, i, "--host"));
            }
            "--port" => {
                i += 1;
                let raw = value_of(&args, i, "--port");
                match raw.parse::<u16>() {
                    Ok(p) => port = Some(p),
                    Err(_) => {
                        eprintln!("Error: invalid port '{raw}'");
                        std::process::exit(1);
                    }
                }
            }
            other => {
                eprintln!("Error: unknown argument '{other}'");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = AppConfig::load(config_path.as_deref())?;
    if let Some(upstream) = upstream {
        config.server.upstream = upstream;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    if let Err(e) = portfolio_sw::server::run(config).await {
        log::error!("{e}");
        return Err(e);
    }
    Ok(())
}
