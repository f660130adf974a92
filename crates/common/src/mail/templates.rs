//! Digest email templates

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use serde::Serialize;
use tera::{Context, Tera};

use crate::config::SiteConfig;
use crate::digest::{DigestProduct, DigestSelection};
use crate::errors::{AppError, Result};

const DIGEST_HTML: &str = "daily_digest.html";
const DIGEST_TEXT: &str = "daily_digest.txt";

/// HTML and plain-text bodies of one email
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub html: String,
    pub text: String,
}

#[derive(Serialize)]
struct DigestView<'a> {
    site_name: &'a str,
    site_url: &'a str,
    date: &'a str,
    year: i32,
    featured: Option<&'a DigestProduct>,
    products: &'a [DigestProduct],
    unsubscribe_url: String,
}

/// Renders the digest email for one recipient
pub struct EmailRenderer {
    tera: Tera,
    site: SiteConfig,
}

impl EmailRenderer {
    pub fn new(site: SiteConfig) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (DIGEST_HTML, include_str!("../../templates/daily_digest.html")),
            (DIGEST_TEXT, include_str!("../../templates/daily_digest.txt")),
        ])?;

        Ok(Self { tera, site })
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Render the digest for `recipient`. `date` is the display date used in
    /// the header and subject.
    pub fn render_digest(
        &self,
        recipient: &str,
        date: &str,
        year: i32,
        selection: &DigestSelection,
    ) -> Result<RenderedEmail> {
        let site_url = self.site.base_url.trim_end_matches('/');
        let view = DigestView {
            site_name: &self.site.name,
            site_url,
            date,
            year,
            featured: selection.featured.as_ref(),
            products: &selection.others,
            unsubscribe_url: unsubscribe_url(site_url, recipient),
        };

        let context = Context::from_serialize(&view)?;

        Ok(RenderedEmail {
            html: self.tera.render(DIGEST_HTML, &context)?,
            text: self.tera.render(DIGEST_TEXT, &context)?,
        })
    }

    /// Local display date and year for `now` in the site time zone
    pub fn today(&self, now: DateTime<Utc>) -> Result<(String, i32)> {
        let offset = FixedOffset::east_opt(self.site.utc_offset_hours * 3600).ok_or_else(|| {
            AppError::Configuration {
                message: format!("invalid utc offset {}", self.site.utc_offset_hours),
            }
        })?;
        let local = now.with_timezone(&offset);
        Ok((digest_date(&local), local.year()))
    }
}

/// Long zh-CN date, e.g. `2025年1月9日`
pub fn digest_date(date: &DateTime<FixedOffset>) -> String {
    date.format("%Y年%-m月%-d日").to_string()
}

pub fn daily_subject(date: &str) -> String {
    format!("srcent AI 产品日报 - {}", date)
}

pub fn welcome_subject(date: &str) -> String {
    format!("欢迎订阅！这是你的首期 AI 产品日报 - {}", date)
}

/// One-click unsubscribe link for `email`
pub fn unsubscribe_url(site_url: &str, email: &str) -> String {
    format!(
        "{}/api/unsubscribe?email={}",
        site_url.trim_end_matches('/'),
        urlencoding::encode(email)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn product(slug: &str, deep_dive: bool) -> DigestProduct {
        DigestProduct {
            name: format!("Product {slug}"),
            slug: slug.to_string(),
            tagline: Some(format!("{slug} <tagline>")),
            category: Some("编程开发".to_string()),
            logo_url: None,
            has_deep_dive: deep_dive,
        }
    }

    fn renderer() -> EmailRenderer {
        EmailRenderer::new(SiteConfig::default()).unwrap()
    }

    #[test]
    fn test_digest_date_uses_site_offset() {
        // 2025-01-08 17:30 UTC is already 9 January in UTC+8
        let now = Utc.with_ymd_and_hms(2025, 1, 8, 17, 30, 0).unwrap();
        let (date, year) = renderer().today(now).unwrap();
        assert_eq!(date, "2025年1月9日");
        assert_eq!(year, 2025);
    }

    #[test]
    fn test_subjects() {
        assert_eq!(daily_subject("2025年1月9日"), "srcent AI 产品日报 - 2025年1月9日");
        assert_eq!(
            welcome_subject("2025年1月9日"),
            "欢迎订阅！这是你的首期 AI 产品日报 - 2025年1月9日"
        );
    }

    #[test]
    fn test_unsubscribe_link_is_encoded() {
        assert_eq!(
            unsubscribe_url("https://srcent.top/", "a+b@example.com"),
            "https://srcent.top/api/unsubscribe?email=a%2Bb%40example.com"
        );
    }

    #[test]
    fn test_render_featured_and_others() {
        let selection = DigestSelection {
            featured: Some(product("cursor", true)),
            others: vec![product("kimi", false), product("suno", true)],
        };

        let email = renderer()
            .render_digest("reader@example.com", "2025年1月9日", 2025, &selection)
            .unwrap();

        assert!(email.html.contains("今日推荐"));
        assert!(email.html.contains("https://srcent.top/product/cursor/deep-dive"));
        assert!(email.html.contains("更多精选"));
        assert!(email.html.contains("https://srcent.top/product/suno"));
        assert!(email.html.contains("reader%40example.com"));
        assert!(email.html.contains("cursor &lt;tagline&gt;"));
        assert!(email.text.contains("【今日推荐】Product cursor"));
        assert!(email.text.contains("- Product kimi"));
    }

    #[test]
    fn test_render_without_featured() {
        let selection = DigestSelection {
            featured: None,
            others: vec![product("kimi", false)],
        };

        let email = renderer()
            .render_digest("reader@example.com", "2025年1月9日", 2025, &selection)
            .unwrap();

        assert!(!email.html.contains("今日推荐"));
        assert!(!email.html.contains("deep-dive"));
        assert!(email.html.contains("Product kimi"));
    }
}
