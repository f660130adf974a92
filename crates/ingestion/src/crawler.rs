//! Page crawling
//!
//! Firecrawl is tried first when a key is configured; a direct HTTP fetch
//! with a browser user agent is the fallback. Each is attempted once.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use srcent_common::config::CrawlerConfig;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{IngestionError, Result};

/// Page metadata used for logos and prompts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub description: Option<String>,
    pub og_image: Option<String>,
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub title: String,
    pub html: String,
    /// Readable text (Markdown from Firecrawl, plain text from direct fetches)
    pub text: String,
    pub screenshot: Option<String>,
    pub metadata: PageMetadata,
}

impl CrawlResult {
    /// Screenshot URL when the crawler returned a hosted image
    pub fn hosted_screenshot(&self) -> Option<&str> {
        self.screenshot.as_deref().filter(|s| is_http_url(s))
    }

    /// Favicon, else the Open Graph image
    pub fn logo(&self) -> Option<&str> {
        self.metadata
            .favicon
            .as_deref()
            .or(self.metadata.og_image.as_deref())
    }
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl(&self, url: &str) -> Result<CrawlResult>;

    fn name(&self) -> &'static str;
}

/// Firecrawl scrape API client
pub struct FirecrawlCrawler {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    data: Option<ScrapeData>,
}

#[derive(Deserialize, Default)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    screenshot: Option<String>,
    #[serde(default)]
    metadata: Value,
}

fn meta_string(metadata: &Value, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

impl FirecrawlCrawler {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(srcent_common::AppError::from)?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Crawler for FirecrawlCrawler {
    async fn crawl(&self, url: &str) -> Result<CrawlResult> {
        let response = self
            .client
            .post(format!("{}/v1/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "url": url,
                "formats": ["markdown", "html"],
                "onlyMainContent": true,
            }))
            .send()
            .await
            .map_err(|e| IngestionError::crawl(url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IngestionError::crawl(
                url,
                format!("Firecrawl error {}: {}", status, body),
            ));
        }

        let parsed: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| IngestionError::crawl(url, e))?;
        let data = parsed.data.unwrap_or_default();

        Ok(CrawlResult {
            url: url.to_string(),
            title: meta_string(&data.metadata, "title").unwrap_or_default(),
            html: data.html.unwrap_or_default(),
            text: data.markdown.unwrap_or_default(),
            screenshot: data.screenshot,
            metadata: PageMetadata {
                description: meta_string(&data.metadata, "description"),
                og_image: meta_string(&data.metadata, "ogImage"),
                favicon: meta_string(&data.metadata, "favicon"),
            },
        })
    }

    fn name(&self) -> &'static str {
        "firecrawl"
    }
}

/// Plain GET with a browser user agent
pub struct HttpCrawler {
    client: reqwest::Client,
}

impl HttpCrawler {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(srcent_common::AppError::from)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn crawl(&self, url: &str) -> Result<CrawlResult> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestionError::crawl(url, e))?;

        if !response.status().is_success() {
            return Err(IngestionError::crawl(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| IngestionError::crawl(url, e))?;

        Ok(parse_html(url, html))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Primary crawler with a single fallback attempt
pub struct CrawlerChain {
    primary: Option<Arc<dyn Crawler>>,
    fallback: Arc<dyn Crawler>,
}

impl CrawlerChain {
    pub fn new(primary: Option<Arc<dyn Crawler>>, fallback: Arc<dyn Crawler>) -> Self {
        Self { primary, fallback }
    }

    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let primary = match config.firecrawl_api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Some(Arc::new(FirecrawlCrawler::new(
                key.to_string(),
                &config.firecrawl_api_base,
                timeout,
            )?) as Arc<dyn Crawler>),
            None => None,
        };

        let fallback = Arc::new(HttpCrawler::new(&config.user_agent, timeout)?);
        Ok(Self::new(primary, fallback))
    }
}

#[async_trait]
impl Crawler for CrawlerChain {
    async fn crawl(&self, url: &str) -> Result<CrawlResult> {
        if let Some(primary) = &self.primary {
            match primary.crawl(url).await {
                Ok(result) => return Ok(result),
                Err(e) => warn!(
                    url,
                    crawler = primary.name(),
                    error = %e,
                    "Primary crawler failed, falling back"
                ),
            }
        }

        info!(url, crawler = self.fallback.name(), "Crawling");
        self.fallback.crawl(url).await
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

struct HtmlPatterns {
    title: Regex,
    meta: Regex,
    link: Regex,
    attr: Regex,
}

fn patterns() -> Option<&'static HtmlPatterns> {
    static PATTERNS: OnceLock<Option<HtmlPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(HtmlPatterns {
                title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?,
                meta: Regex::new(r"(?i)<meta\s[^>]*>").ok()?,
                link: Regex::new(r"(?i)<link\s[^>]*>").ok()?,
                attr: Regex::new(r#"(?i)([a-z:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok()?,
            })
        })
        .as_ref()
}

fn attributes(attr: &Regex, tag: &str) -> Vec<(String, String)> {
    attr.captures_iter(tag)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
            Some((name, value))
        })
        .collect()
}

fn attr_value<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Extract title, meta tags and readable text from a fetched page
pub fn parse_html(url: &str, html: String) -> CrawlResult {
    let mut result = CrawlResult {
        url: url.to_string(),
        text: readable_text(&html),
        ..Default::default()
    };

    let Some(p) = patterns() else {
        result.html = html;
        return result;
    };

    result.title = p
        .title
        .captures(&html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let mut description = None;
    let mut og_description = None;
    for tag in p.meta.find_iter(&html) {
        let attrs = attributes(&p.attr, tag.as_str());
        let key = attr_value(&attrs, "name").or_else(|| attr_value(&attrs, "property"));
        let content = attr_value(&attrs, "content").map(str::to_string);
        match key.map(str::to_ascii_lowercase).as_deref() {
            Some("description") => description = description.or(content),
            Some("og:description") => og_description = og_description.or(content),
            Some("og:image") => {
                result.metadata.og_image = result.metadata.og_image.take().or(content)
            }
            _ => {}
        }
    }
    result.metadata.description = description.or(og_description);

    result.metadata.favicon = p.link.find_iter(&html).find_map(|tag| {
        let attrs = attributes(&p.attr, tag.as_str());
        let rel = attr_value(&attrs, "rel")?.to_ascii_lowercase();
        if rel != "icon" && rel != "shortcut icon" {
            return None;
        }
        attr_value(&attrs, "href").map(|href| resolve_url(url, href))
    });

    result.html = html;
    result
}

fn resolve_url(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

fn readable_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 120) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            debug!(error = %e, "Failed to convert HTML to text");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head>
        <title> Cursor - The AI Code Editor </title>
        <meta name="description" content="Built to make you extraordinarily productive">
        <meta property="og:image" content="https://cursor.com/og.png">
        <link rel="icon" href="/favicon.ico">
        </head><body><h1>Cursor</h1><p>The AI code editor.</p></body></html>"#;

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn test_parse_html_metadata() {
        let result = parse_html("https://cursor.com/features", PAGE.to_string());

        assert_eq!(result.title, "Cursor - The AI Code Editor");
        assert_eq!(
            result.metadata.description.as_deref(),
            Some("Built to make you extraordinarily productive")
        );
        assert_eq!(result.metadata.og_image.as_deref(), Some("https://cursor.com/og.png"));
        assert_eq!(result.metadata.favicon.as_deref(), Some("https://cursor.com/favicon.ico"));
        assert!(result.text.contains("The AI code editor."));
        assert_eq!(result.logo(), Some("https://cursor.com/favicon.ico"));
    }

    #[test]
    fn test_og_description_is_fallback() {
        let html = r#"<meta property="og:description" content="og text"><title>x</title>"#;
        let result = parse_html("https://x.dev", html.to_string());
        assert_eq!(result.metadata.description.as_deref(), Some("og text"));
        assert_eq!(result.metadata.favicon, None);
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("深度拆解", 2), "深度");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_hosted_screenshot() {
        let mut result = CrawlResult::default();
        result.screenshot = Some("data:image/png;base64,AAAA".to_string());
        assert_eq!(result.hosted_screenshot(), None);

        result.screenshot = Some("https://cdn.firecrawl.dev/shot.png".to_string());
        assert_eq!(result.hosted_screenshot(), Some("https://cdn.firecrawl.dev/shot.png"));
    }

    #[tokio::test]
    async fn test_firecrawl_maps_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer fc-key"))
            .and(body_partial_json(serde_json::json!({
                "url": "https://kimi.ai",
                "onlyMainContent": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": {
                    "markdown": "# Kimi",
                    "html": "<h1>Kimi</h1>",
                    "metadata": {
                        "title": "Kimi",
                        "description": "Long context assistant",
                        "ogImage": "https://kimi.ai/og.png",
                        "favicon": "https://kimi.ai/favicon.ico"
                    }
                }
            })))
            .mount(&server)
            .await;

        let crawler = FirecrawlCrawler::new("fc-key".into(), &server.uri(), timeout()).unwrap();
        let result = crawler.crawl("https://kimi.ai").await.unwrap();

        assert_eq!(result.title, "Kimi");
        assert_eq!(result.text, "# Kimi");
        assert_eq!(result.metadata.description.as_deref(), Some("Long context assistant"));
        assert_eq!(result.logo(), Some("https://kimi.ai/favicon.ico"));
    }

    #[tokio::test]
    async fn test_chain_falls_back_to_direct_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/product"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let primary = FirecrawlCrawler::new("fc-key".into(), &server.uri(), timeout()).unwrap();
        let fallback = HttpCrawler::new("test-agent", timeout()).unwrap();
        let chain = CrawlerChain::new(Some(Arc::new(primary)), Arc::new(fallback));

        let url = format!("{}/product", server.uri());
        let result = chain.crawl(&url).await.unwrap();

        assert_eq!(result.title, "Cursor - The AI Code Editor");
        assert_eq!(
            result.metadata.favicon.as_deref(),
            Some(format!("{}/favicon.ico", server.uri()).as_str())
        );
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let chain = CrawlerChain::new(None, Arc::new(HttpCrawler::new("ua", timeout()).unwrap()));
        let err = chain
            .crawl(&format!("{}/gone", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::Crawl { .. }));
    }
}
