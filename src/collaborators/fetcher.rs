//! Article fetcher: downloads a news article and strips it to plain text.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::CollaboratorError;

/// Desktop browser user agent; the article pages serve a stripped layout to
/// unknown clients.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Minimum plausible article length; shorter usually means a paywall stub.
const MIN_ARTICLE_CHARS: usize = 500;

/// Fetches article text from a URL.
#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch_article(&self, url: &str) -> Result<String, CollaboratorError>;
}

/// Production fetcher: reqwest download plus HTML extraction.
pub struct HttpFetcher {
    client: reqwest::Client,
    /// Optional Cookie header for subscriber-only articles.
    cookie: Option<String>,
}

impl HttpFetcher {
    pub fn new(cookie: Option<String>) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, cookie })
    }
}

#[async_trait]
impl ArticleFetcher for HttpFetcher {
    async fn fetch_article(&self, url: &str) -> Result<String, CollaboratorError> {
        debug!(url, "Fetching article");
        let mut request = self.client.get(url);
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CollaboratorError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let body = response.text().await.map_err(|e| CollaboratorError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let text = extract_article_text(&body, url)?;
        if text.len() < MIN_ARTICLE_CHARS {
            warn!(
                url,
                chars = text.len(),
                "Article text is suspiciously short; page may be paywalled"
            );
        }
        Ok(text)
    }
}

/// Pull readable text out of an article page.
///
/// `scraper::Html` is not `Send`, so all parsing happens synchronously here
/// with no await points while the document is alive.
fn extract_article_text(html: &str, url: &str) -> Result<String, CollaboratorError> {
    let document = Html::parse_document(html);

    // Most to least specific containers, matching the site's layouts.
    let candidates = [
        Selector::parse("article").unwrap(),
        Selector::parse("div.article-body").unwrap(),
        Selector::parse("div#article_body").unwrap(),
        Selector::parse("main").unwrap(),
    ];

    let container = candidates
        .iter()
        .find_map(|sel| document.select(sel).next())
        .ok_or_else(|| CollaboratorError::ArticleStructure {
            url: url.to_string(),
        })?;

    Ok(visible_text(container))
}

/// Collect text nodes under `root`, skipping chrome elements, and collapse
/// all whitespace runs to single spaces.
fn visible_text(root: ElementRef<'_>) -> String {
    const STRIP: [&str; 6] = ["script", "style", "aside", "nav", "header", "footer"];

    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let stripped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| STRIP.contains(&e.name()))
        });
        if !stripped {
            parts.push(&**text);
        }
    }

    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_article_element() {
        let html = r#"
            <html><body>
            <nav>Home | News</nav>
            <article>
                <header>Section header</header>
                <p>El presidente   anunció</p>
                <script>var x = 1;</script>
                <p>nuevas medidas económicas.</p>
                <aside>Related stories</aside>
            </article>
            <footer>Copyright</footer>
            </body></html>
        "#;
        let text = extract_article_text(html, "https://example.com/a").unwrap();
        assert_eq!(text, "El presidente anunció nuevas medidas económicas.");
    }

    #[test]
    fn falls_back_to_article_body_div() {
        let html = r#"<div class="article-body"><p>Texto del artículo</p></div>"#;
        let text = extract_article_text(html, "https://example.com/a").unwrap();
        assert_eq!(text, "Texto del artículo");
    }

    #[test]
    fn falls_back_to_main() {
        let html = "<main><p>Contenido principal</p></main>";
        let text = extract_article_text(html, "https://example.com/a").unwrap();
        assert_eq!(text, "Contenido principal");
    }

    #[test]
    fn missing_container_is_an_error() {
        let html = "<html><body><div><p>nothing recognizable</p></div></body></html>";
        let err = extract_article_text(html, "https://example.com/a").unwrap_err();
        assert!(matches!(err, CollaboratorError::ArticleStructure { .. }));
    }
}
