//! Request classification.
//!
//! Every request URL maps to exactly one [`Category`], which in turn picks
//! the caching strategy. Rules are checked in a fixed order: static asset,
//! HTML page, API call, and finally the catch-all [`Category::Other`].

use serde::{Deserialize, Serialize};
use url::Url;

/// Kind of resource a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Stylesheets, scripts, images, documents.
    StaticAsset,
    /// HTML documents and the site root.
    HtmlPage,
    /// API endpoints and third-party analytics/email services.
    ApiCall,
    /// Anything else.
    Other,
}

/// Matching rules used by the [`Classifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    /// Path suffixes of static assets, compared case-insensitively.
    pub static_extensions: Vec<String>,
    /// Path suffixes of HTML pages.
    pub page_extensions: Vec<String>,
    /// Path fragments marking an API call.
    pub api_markers: Vec<String>,
    /// Host name fragments of third-party API services.
    pub api_hosts: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        let list = |items: &[&str]| -> Vec<String> { items.iter().map(ToString::to_string).collect() };
        Self {
            static_extensions: list(&[
                ".css", ".js", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".ico", ".pdf",
            ]),
            page_extensions: list(&[".html"]),
            api_markers: list(&["/api/"]),
            api_hosts: list(&["analytics", "emailjs"]),
        }
    }
}

/// Maps request URLs to categories. Pure, total, side-effect free.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: ClassifierRules,
}

impl Classifier {
    /// Creates a classifier from explicit rules.
    #[must_use]
    pub const fn new(rules: ClassifierRules) -> Self {
        Self { rules }
    }

    /// Returns the rules in use.
    #[must_use]
    pub const fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    /// Classifies a request URL.
    #[must_use]
    pub fn classify(&self, url: &Url) -> Category {
        let path = url.path();
        if self.is_static_asset(path) {
            Category::StaticAsset
        } else if self.is_page(path) {
            Category::HtmlPage
        } else if self.is_api_call(url) {
            Category::ApiCall
        } else {
            Category::Other
        }
    }

    /// Returns true if `path` names an HTML page.
    #[must_use]
    pub fn is_page(&self, path: &str) -> bool {
        path == "/" || ends_with_any(path, &self.rules.page_extensions)
    }

    fn is_static_asset(&self, path: &str) -> bool {
        ends_with_any(path, &self.rules.static_extensions)
    }

    fn is_api_call(&self, url: &Url) -> bool {
        let path = url.path();
        if self.rules.api_markers.iter().any(|m| path.contains(m.as_str())) {
            return true;
        }
        url.host_str().is_some_and(|host| {
            self.rules
                .api_hosts
                .iter()
                .any(|h| host.contains(h.as_str()))
        })
    }
}

fn ends_with_any(path: &str, suffixes: &[String]) -> bool {
    let path = path.to_ascii_lowercase();
    suffixes
        .iter()
        .any(|s| path.ends_with(&s.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classify(url: &str) -> Category {
        Classifier::default().classify(&Url::parse(url).unwrap())
    }

    #[test]
    fn documented_examples() {
        assert_eq!(classify("https://site.test/styles.css"), Category::StaticAsset);
        assert_eq!(classify("https://site.test/cv.html"), Category::HtmlPage);
        assert_eq!(classify("https://site.test/api/contact"), Category::ApiCall);
        assert_eq!(classify("https://site.test/some/unknown/path"), Category::Other);
    }

    #[test]
    fn root_is_a_page() {
        assert_eq!(classify("https://site.test/"), Category::HtmlPage);
        assert_eq!(classify("https://site.test"), Category::HtmlPage);
    }

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(classify("https://site.test/images/Accueil.PNG"), Category::StaticAsset);
        assert_eq!(classify("https://site.test/Document/cv.pdf"), Category::StaticAsset);
    }

    #[test]
    fn query_does_not_affect_extension() {
        assert_eq!(classify("https://site.test/script.js?v=3"), Category::StaticAsset);
    }

    #[test]
    fn third_party_hosts_are_api_calls() {
        assert_eq!(classify("https://api.emailjs.com/send"), Category::ApiCall);
        assert_eq!(
            classify("https://www.google-analytics.com/collect"),
            Category::ApiCall
        );
    }

    #[test]
    fn static_rule_wins_over_api_marker() {
        assert_eq!(classify("https://site.test/api/widget.js"), Category::StaticAsset);
    }

    #[test]
    fn json_falls_through_to_other() {
        assert_eq!(classify("https://site.test/data.json"), Category::Other);
        assert_eq!(classify("https://site.test/locales/fr.json"), Category::Other);
    }

    #[test]
    fn custom_rules() {
        let rules = ClassifierRules {
            static_extensions: vec![".woff2".into()],
            page_extensions: vec![".htm".into()],
            api_markers: vec!["/graphql".into()],
            api_hosts: vec![],
        };
        let c = Classifier::new(rules);
        let cat = |u: &str| c.classify(&Url::parse(u).unwrap());
        assert_eq!(cat("https://a.test/font.woff2"), Category::StaticAsset);
        assert_eq!(cat("https://a.test/old.htm"), Category::HtmlPage);
        assert_eq!(cat("https://a.test/graphql"), Category::ApiCall);
        assert_eq!(cat("https://a.test/styles.css"), Category::Other);
    }

    proptest! {
        #[test]
        fn any_path_with_static_extension_is_static(stem in "[a-z0-9/_-]{0,24}", ext in prop::sample::select(vec!["css", "js", "png", "svg", "pdf"])) {
            let url = format!("https://site.test/{stem}.{ext}");
            prop_assert_eq!(classify(&url), Category::StaticAsset);
        }

        #[test]
        fn plain_segments_are_other(segments in prop::collection::vec("[b-z]{1,8}", 1..4)) {
            let path = segments.join("/");
            let url = format!("https://site.test/{path}");
            prop_assert_eq!(classify(&url), Category::Other);
        }

        #[test]
        fn classification_is_deterministic(path in "[ -~]{0,40}") {
            if let Ok(url) = Url::parse("https://site.test/").and_then(|b| b.join(&path)) {
                prop_assert_eq!(classify(url.as_str()), Classifier::default().classify(&url));
            }
        }
    }
}
