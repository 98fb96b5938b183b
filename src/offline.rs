//! Synthesized responses for requests that can be answered neither by the
//! network nor by the cache.

use serde::{Deserialize, Serialize};

use crate::http::Response;

/// Header set on every synthesized response.
pub const OFFLINE_HEADER: &str = "x-sw-offline";

/// A link listed on the offline page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineLink {
    /// Visible label.
    pub label: String,
    /// Target path.
    pub href: String,
}

impl OfflineLink {
    /// Creates a link.
    #[must_use]
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
        }
    }

    /// The site pages known to be cached at install time.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("🏠 Accueil", "/"),
            Self::new("📄 CV", "/cv.html"),
            Self::new("💼 Projets", "/projet.html"),
            Self::new("📝 Blog", "/blog.html"),
            Self::new("📧 Contact", "/contact.html"),
        ]
    }
}

/// Returns true if `response` was synthesized by this module.
#[must_use]
pub fn is_offline(response: &Response) -> bool {
    response.header(OFFLINE_HEADER).is_some()
}

/// Escapes text for inclusion in HTML.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Full offline HTML page with a retry button and the cached page list.
///
/// Served with status 200 so browsers render it as a document; the
/// [`OFFLINE_HEADER`] marks it as synthesized.
#[must_use]
pub fn offline_page(links: &[OfflineLink]) -> Response {
    let items: String = links
        .iter()
        .map(|l| {
            format!(
                "                <a href=\"{}\">{}</a>\n",
                escape(&l.href),
                escape(&l.label)
            )
        })
        .collect();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="fr">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Hors ligne</title>
<style>
  body {{
    font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
    background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
    margin: 0;
    padding: 20px;
    min-height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
    color: white;
  }}
  .offline-container {{
    text-align: center;
    max-width: 500px;
    background: rgba(255,255,255,0.1);
    padding: 40px;
    border-radius: 20px;
    backdrop-filter: blur(15px);
    border: 1px solid rgba(255,255,255,0.2);
  }}
  .offline-icon {{ font-size: 4rem; margin-bottom: 20px; }}
  p {{ margin-bottom: 30px; line-height: 1.6; }}
  .retry-btn {{
    background: #3498db;
    color: white;
    border: none;
    padding: 12px 30px;
    border-radius: 25px;
    cursor: pointer;
    font-size: 1rem;
  }}
  .retry-btn:hover {{ background: #2980b9; }}
  .cached-pages {{ margin-top: 30px; text-align: left; }}
  .cached-pages a {{
    color: #ecf0f1;
    text-decoration: none;
    display: block;
    padding: 8px 0;
    border-bottom: 1px solid rgba(255,255,255,0.1);
  }}
  .cached-pages a:hover {{ color: #3498db; }}
</style>
</head>
<body data-offline="true">
<div class="offline-container">
    <div class="offline-icon">📡</div>
    <h1>Vous êtes hors ligne</h1>
    <p>Cette page n'est pas disponible sans connexion internet. Vérifiez votre connexion et réessayez.</p>
    <button class="retry-btn" onclick="window.location.reload()">Réessayer</button>
    <div class="cached-pages">
        <h3>Pages disponibles hors ligne :</h3>
{items}    </div>
</div>
</body>
</html>
"#
    );

    Response::ok(html)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_header(OFFLINE_HEADER, "page")
}

/// Plain-text 503 for resources with no offline substitute.
#[must_use]
pub fn unavailable() -> Response {
    Response::new(503, "Contenu non disponible hors ligne")
        .with_status_text("Service Unavailable")
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_header(OFFLINE_HEADER, "unavailable")
}

/// JSON 503 for API calls made while offline.
#[must_use]
pub fn api_unavailable() -> Response {
    let body = serde_json::json!({
        "error": "Connexion réseau requise",
        "offline": true,
    });
    Response::new(503, body.to_string())
        .with_status_text("Service Unavailable")
        .with_header("content-type", "application/json")
        .with_header(OFFLINE_HEADER, "api")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_page_lists_links_and_retry() {
        let resp = offline_page(&OfflineLink::defaults());
        assert_eq!(resp.status, 200);
        assert!(is_offline(&resp));
        assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));

        let html = resp.text();
        assert!(html.contains("window.location.reload()"));
        assert!(html.contains(r#"<a href="/cv.html">📄 CV</a>"#));
        assert_eq!(html.matches("<a href=").count(), 5);
    }

    #[test]
    fn offline_page_escapes_links() {
        let resp = offline_page(&[OfflineLink::new("<b>x</b>", "/a?b=1&c=2")]);
        let html = resp.text();
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(html.contains("/a?b=1&amp;c=2"));
    }

    #[test]
    fn unavailable_is_plain_503() {
        let resp = unavailable();
        assert_eq!(resp.status, 503);
        assert_eq!(resp.status_text, "Service Unavailable");
        assert!(is_offline(&resp));
    }

    #[test]
    fn api_unavailable_body() {
        let resp = api_unavailable();
        assert_eq!(resp.status, 503);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["offline"], true);
        assert!(body["error"].is_string());
    }

    #[test]
    fn network_responses_are_not_marked() {
        assert!(!is_offline(&Response::ok("live")));
    }
}
