//! Ingestion processor
//!
//! Runs product and deep-dive tasks one after another. A failed task is
//! logged and counted; the run always continues with the next task.

use std::sync::Arc;

use serde::Serialize;
use srcent_common::catalog::normalize_category;
use srcent_common::db::models::Product;
use srcent_common::db::{ContentStore, DeepDiveUpdate, NewProduct, NewSourceArticle};
use srcent_common::errors::AppError;
use srcent_common::llm::LanguageModel;
use srcent_common::metrics;
use tracing::{error, info, instrument, warn};

use crate::analyzer::{AnalysisResult, Analyzer};
use crate::crawler::{CrawlResult, Crawler};
use crate::errors::{IngestionError, Result};
use crate::podcast::PodcastWriter;
use crate::tasks::{DeepDiveTask, IngestTask};
use crate::tts::{AudioAsset, AudioSynthesizer};

/// Whether a task produced a new product row or used an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSource {
    Created,
    Existing,
}

#[derive(Debug, Clone)]
pub struct ProductOutcome {
    pub product: Product,
    pub source: ProductSource,
}

#[derive(Debug, Clone)]
pub struct DeepDiveOutcome {
    pub slug: String,
    pub product_source: ProductSource,
    pub audio: AudioAsset,
    pub sources_saved: usize,
}

/// Per-run counts. `reused` tasks landed on an existing product row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub reused: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, kind: &str, result: std::result::Result<ProductSource, &IngestionError>) {
        let outcome = match result {
            Ok(ProductSource::Created) => {
                self.succeeded += 1;
                "created"
            }
            Ok(ProductSource::Existing) => {
                self.reused += 1;
                "reused"
            }
            Err(_) => {
                self.failed += 1;
                "failed"
            }
        };
        metrics::record_ingestion_task(kind, outcome);
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.reused + self.failed
    }
}

fn explicit_slug(slug: &Option<String>) -> Option<&str> {
    slug.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Build a draft product from a crawl and its analysis
fn new_product(
    website_url: &str,
    page: &CrawlResult,
    analysis: AnalysisResult,
    slug: String,
    category_hint: Option<&str>,
    tag_hints: &[String],
) -> Result<NewProduct> {
    let ai_analysis = serde_json::to_value(&analysis.analysis).map_err(AppError::from)?;

    let category = match category_hint.map(str::trim).filter(|c| !c.is_empty()) {
        Some(hint) => normalize_category(Some(hint)).to_string(),
        None => analysis.category,
    };
    let tags = if tag_hints.is_empty() {
        analysis.tags
    } else {
        tag_hints.to_vec()
    };

    Ok(NewProduct {
        slug,
        name: analysis.name,
        tagline: analysis.tagline,
        description: None,
        logo_url: page.logo().map(str::to_string),
        website_url: Some(website_url.to_string()),
        screenshot_url: page.hosted_screenshot().map(str::to_string),
        category: Some(category),
        tags,
        ai_analysis: Some(ai_analysis),
    })
}

/// Crawl, analyze and persist pipeline
pub struct Pipeline {
    store: Arc<dyn ContentStore>,
    crawler: Arc<dyn Crawler>,
    analyzer: Analyzer,
    writer: PodcastWriter,
    audio: Arc<dyn AudioSynthesizer>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ContentStore>,
        crawler: Arc<dyn Crawler>,
        model: Arc<dyn LanguageModel>,
        audio: Arc<dyn AudioSynthesizer>,
    ) -> Self {
        Self {
            store,
            crawler,
            analyzer: Analyzer::new(model.clone()),
            writer: PodcastWriter::new(model),
            audio,
        }
    }

    async fn existing(&self, slug: &str) -> Result<Option<Product>> {
        Ok(self.store.find_product_by_slug(slug).await?)
    }

    /// Crawl and analyze one product page into a draft product
    #[instrument(skip(self, task), fields(url = %task.url))]
    pub async fn ingest_product(&self, task: &IngestTask) -> Result<ProductOutcome> {
        let task_slug = explicit_slug(&task.slug);
        if let Some(slug) = task_slug {
            if let Some(product) = self.existing(slug).await? {
                info!(slug, "Product already exists, skipping");
                return Ok(ProductOutcome { product, source: ProductSource::Existing });
            }
        }

        let page = self.crawler.crawl(&task.url).await?;
        info!(title = %page.title, "Page crawled");

        let analysis = self.analyzer.analyze(&page).await?;
        if let Some(product) = self.existing(&analysis.slug).await? {
            info!(slug = %analysis.slug, "Product already exists, skipping");
            return Ok(ProductOutcome { product, source: ProductSource::Existing });
        }

        let slug = task_slug.map_or_else(|| analysis.slug.clone(), str::to_string);
        let new = new_product(
            &task.url,
            &page,
            analysis,
            slug,
            task.category.as_deref(),
            &task.tags,
        )?;

        let product = self.store.insert_product(new).await?;
        info!(slug = %product.slug, name = %product.name, "Product inserted as draft");
        Ok(ProductOutcome { product, source: ProductSource::Created })
    }

    /// Run product tasks sequentially
    pub async fn run_products(&self, tasks: &[IngestTask]) -> RunSummary {
        let mut summary = RunSummary::default();

        for (i, task) in tasks.iter().enumerate() {
            info!(task = i + 1, total = tasks.len(), url = %task.url, "Processing product");
            let result = self.ingest_product(task).await;
            if let Err(ref e) = result {
                error!(url = %task.url, error = %e, "Product task failed");
            }
            summary.record("product", result.as_ref().map(|o| o.source));
        }

        info!(
            succeeded = summary.succeeded,
            reused = summary.reused,
            failed = summary.failed,
            "Product ingestion complete"
        );
        summary
    }

    async fn resolve_product(
        &self,
        task: &DeepDiveTask,
        page: &CrawlResult,
    ) -> Result<(Product, ProductSource)> {
        let task_slug = explicit_slug(&task.product_slug);
        if let Some(slug) = task_slug {
            if let Some(product) = self.existing(slug).await? {
                return Ok((product, ProductSource::Existing));
            }
        }

        let analysis = self.analyzer.analyze(page).await?;
        if let Some(product) = self.existing(&analysis.slug).await? {
            info!(slug = %analysis.slug, "Found product by analyzed slug");
            return Ok((product, ProductSource::Existing));
        }

        let slug = task_slug.map_or_else(|| analysis.slug.clone(), str::to_string);
        let new = new_product(
            &task.product_url,
            page,
            analysis,
            slug,
            task.category.as_deref(),
            &task.tags,
        )?;
        let product = self.store.insert_product(new).await?;
        info!(slug = %product.slug, "Product created for deep dive");
        Ok((product, ProductSource::Created))
    }

    async fn crawl_sources(&self, urls: &[String]) -> Vec<CrawlResult> {
        let mut articles = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            match self.crawler.crawl(url).await {
                Ok(article) => {
                    info!(source = i + 1, total = urls.len(), title = %article.title, "Source crawled");
                    articles.push(article);
                }
                Err(e) => warn!(url = %url, error = %e, "Source crawl failed, excluding"),
            }
        }
        articles
    }

    /// Generate and store a podcast deep dive for one product
    #[instrument(skip(self, task), fields(url = %task.product_url))]
    pub async fn deep_dive(&self, task: &DeepDiveTask) -> Result<DeepDiveOutcome> {
        let page = self.crawler.crawl(&task.product_url).await?;
        info!(title = %page.title, "Product page crawled");

        let (product, product_source) = self.resolve_product(task, &page).await?;

        let articles = self.crawl_sources(&task.source_urls).await;
        if articles.is_empty() {
            return Err(IngestionError::NoSources);
        }

        let insights = self.writer.extract_insights(&articles).await?;
        let script = self.writer.write_script(&page, &insights).await?;

        info!(mode = self.audio.mode(), "Synthesizing audio");
        let audio = self.audio.synthesize(&script, &product.slug).await?;

        let mut sources_saved = 0;
        for insight in &insights {
            let article = NewSourceArticle {
                product_id: product.id,
                url: insight.url.clone(),
                title: Some(insight.title.clone()).filter(|t| !t.is_empty()),
                source_name: Some(insight.source_name.clone()),
                key_insight: Some(insight.key_insight.clone()).filter(|k| !k.is_empty()),
            };
            match self.store.insert_source_article(article).await {
                Ok(_) => sources_saved += 1,
                Err(e) => warn!(url = %insight.url, error = %e, "Source article not saved"),
            }
        }

        self.store
            .update_deep_dive(
                &product.slug,
                DeepDiveUpdate {
                    podcast_audio_url: audio.url.clone(),
                    podcast_transcript: script,
                    podcast_duration: audio.duration_secs,
                },
            )
            .await?;

        info!(slug = %product.slug, sources_saved, "Deep dive stored");
        Ok(DeepDiveOutcome {
            slug: product.slug,
            product_source,
            audio,
            sources_saved,
        })
    }

    /// Run deep-dive tasks sequentially
    pub async fn run_deep_dives(&self, tasks: &[DeepDiveTask]) -> RunSummary {
        let mut summary = RunSummary::default();

        for (i, task) in tasks.iter().enumerate() {
            info!(
                task = i + 1,
                total = tasks.len(),
                slug = task.product_slug.as_deref().unwrap_or(&task.product_url),
                "Processing deep dive"
            );
            let result = self.deep_dive(task).await;
            if let Err(ref e) = result {
                error!(url = %task.product_url, error = %e, "Deep-dive task failed");
            }
            summary.record("deep_dive", result.as_ref().map(|o| o.product_source));
        }

        info!(
            succeeded = summary.succeeded,
            reused = summary.reused,
            failed = summary.failed,
            "Deep-dive ingestion complete"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::PageMetadata;
    use crate::tts::PlaceholderSynthesizer;
    use async_trait::async_trait;
    use serde_json::json;
    use srcent_common::db::models::ProductStatus;
    use srcent_common::testing::{sample_product, FnModel, InMemoryStore};
    use std::collections::HashMap;

    /// Serves canned pages; unknown URLs fail
    struct StaticCrawler {
        pages: HashMap<String, CrawlResult>,
    }

    impl StaticCrawler {
        fn new(urls: &[&str]) -> Self {
            let pages = urls
                .iter()
                .map(|url| {
                    let page = CrawlResult {
                        url: url.to_string(),
                        title: format!("title of {url}"),
                        text: format!("text of {url}"),
                        metadata: PageMetadata {
                            favicon: Some(format!("{url}/favicon.ico")),
                            og_image: Some(format!("{url}/og.png")),
                            ..Default::default()
                        },
                        ..Default::default()
                    };
                    (url.to_string(), page)
                })
                .collect();
            Self { pages }
        }
    }

    #[async_trait]
    impl Crawler for StaticCrawler {
        async fn crawl(&self, url: &str) -> Result<CrawlResult> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| IngestionError::crawl(url, "HTTP 404"))
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    /// Answers analysis, insight and script requests
    fn model(slug: &'static str) -> Arc<FnModel> {
        Arc::new(FnModel::new(move |request| {
            Ok(if request.json_mode {
                json!({
                    "name": "Cursor",
                    "tagline": "AI 代码编辑器",
                    "slug": slug,
                    "category": "代码",
                    "tags": ["AI编程"],
                    "what_is": "An editor"
                })
                .to_string()
            } else if request.max_tokens == Some(200) {
                "独到观点".to_string()
            } else {
                "# Cursor：写代码的新方式\n\n## 开场暴击\n正文".to_string()
            })
        }))
    }

    fn pipeline(store: Arc<InMemoryStore>, crawler: StaticCrawler, model: Arc<FnModel>) -> Pipeline {
        Pipeline::new(
            store,
            Arc::new(crawler),
            model,
            Arc::new(PlaceholderSynthesizer::new("https://placeholder.test", 200)),
        )
    }

    #[tokio::test]
    async fn test_ingest_product_inserts_draft() {
        let store = Arc::new(InMemoryStore::new());
        let p = pipeline(store.clone(), StaticCrawler::new(&["https://cursor.com"]), model("cursor"));

        let outcome = p
            .ingest_product(&IngestTask {
                url: "https://cursor.com".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.source, ProductSource::Created);
        let product = store.product("cursor").unwrap();
        assert_eq!(product.product_status(), ProductStatus::Draft);
        assert_eq!(product.category.as_deref(), Some("编程开发"));
        assert_eq!(product.tags, Some(vec!["AI编程".to_string()]));
        assert_eq!(product.logo_url.as_deref(), Some("https://cursor.com/favicon.ico"));
        assert_eq!(product.website_url.as_deref(), Some("https://cursor.com"));
        assert_eq!(product.screenshot_url, None);
        assert!(!product.has_deep_dive());
        assert_eq!(
            product.analysis().unwrap().what_is.as_deref(),
            Some("An editor")
        );
    }

    #[tokio::test]
    async fn test_task_hints_override_analysis() {
        let store = Arc::new(InMemoryStore::new());
        let p = pipeline(store.clone(), StaticCrawler::new(&["https://cursor.com"]), model("cursor"));

        p.ingest_product(&IngestTask {
            url: "https://cursor.com".into(),
            slug: Some("cursor-ide".into()),
            category: Some("效率".into()),
            tags: vec!["IDE".into()],
        })
        .await
        .unwrap();

        let product = store.product("cursor-ide").unwrap();
        assert_eq!(product.category.as_deref(), Some("效率工具"));
        assert_eq!(product.tags, Some(vec!["IDE".to_string()]));
    }

    #[tokio::test]
    async fn test_existing_slug_is_reused() {
        let store = Arc::new(InMemoryStore::new());
        store.put_product(sample_product("cursor", ProductStatus::Published));
        let model = model("cursor");
        let p = pipeline(store.clone(), StaticCrawler::new(&["https://cursor.com"]), model.clone());

        // Explicit slug short-circuits before the model is called
        let outcome = p
            .ingest_product(&IngestTask {
                url: "https://cursor.com".into(),
                slug: Some("cursor".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.source, ProductSource::Existing);
        assert!(model.requests().is_empty());

        // Model slug is checked after analysis
        let outcome = p
            .ingest_product(&IngestTask {
                url: "https://cursor.com".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.source, ProductSource::Existing);
        assert_eq!(store.products().len(), 1);
    }

    #[tokio::test]
    async fn test_run_continues_after_failures() {
        let store = Arc::new(InMemoryStore::new());
        let p = pipeline(store.clone(), StaticCrawler::new(&["https://cursor.com"]), model("cursor"));

        let summary = p
            .run_products(&[
                IngestTask { url: "https://down.example".into(), ..Default::default() },
                IngestTask { url: "https://cursor.com".into(), ..Default::default() },
                IngestTask { url: "https://cursor.com".into(), ..Default::default() },
            ])
            .await;

        assert_eq!(summary, RunSummary { succeeded: 1, reused: 1, failed: 1 });
        assert_eq!(summary.total(), 3);
    }

    #[tokio::test]
    async fn test_invalid_analysis_fails_task_without_writes() {
        let store = Arc::new(InMemoryStore::new());
        let p = pipeline(
            store.clone(),
            StaticCrawler::new(&["https://x.dev"]),
            Arc::new(FnModel::fixed(r#"{"tagline":"no name"}"#)),
        );

        let err = p
            .ingest_product(&IngestTask { url: "https://x.dev".into(), ..Default::default() })
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::InvalidAnalysis(_)));
        assert!(store.products().is_empty());
    }

    fn deep_dive_task(slug: Option<&str>, sources: &[&str]) -> DeepDiveTask {
        DeepDiveTask {
            product_url: "https://cursor.com".into(),
            product_slug: slug.map(str::to_string),
            source_urls: sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_deep_dive_on_existing_product() {
        let store = Arc::new(InMemoryStore::new());
        let existing = store.put_product(sample_product("cursor", ProductStatus::Published));
        let crawler = StaticCrawler::new(&[
            "https://cursor.com",
            "https://36kr.com/p/1",
            "https://sspai.com/post/2",
        ]);
        let p = pipeline(store.clone(), crawler, model("cursor"));

        let outcome = p
            .deep_dive(&deep_dive_task(
                Some("cursor"),
                &["https://36kr.com/p/1", "https://unreachable.dev/a", "https://sspai.com/post/2"],
            ))
            .await
            .unwrap();

        assert_eq!(outcome.product_source, ProductSource::Existing);
        assert_eq!(outcome.sources_saved, 2);
        assert_eq!(outcome.audio.url, "https://placeholder.test/podcasts/cursor.mp3");

        let product = store.product("cursor").unwrap();
        assert!(product.has_deep_dive());
        assert!(product.podcast_transcript.unwrap().starts_with("# Cursor"));
        assert_eq!(product.podcast_duration, Some(outcome.audio.duration_secs));

        let articles = store.articles();
        assert_eq!(articles.len(), 2);
        assert!(articles.iter().all(|a| a.product_id == existing.id));
        assert_eq!(articles[0].source_name.as_deref(), Some("36Kr"));
        assert_eq!(articles[0].key_insight.as_deref(), Some("独到观点"));
        assert_eq!(articles[1].source_name.as_deref(), Some("少数派"));
    }

    #[tokio::test]
    async fn test_deep_dive_creates_missing_product() {
        let store = Arc::new(InMemoryStore::new());
        let crawler = StaticCrawler::new(&["https://cursor.com", "https://36kr.com/p/1"]);
        let p = pipeline(store.clone(), crawler, model("cursor-analyzed"));

        let outcome = p
            .deep_dive(&deep_dive_task(Some("cursor"), &["https://36kr.com/p/1"]))
            .await
            .unwrap();

        assert_eq!(outcome.product_source, ProductSource::Created);
        assert_eq!(outcome.slug, "cursor");
        let product = store.product("cursor").unwrap();
        assert_eq!(product.product_status(), ProductStatus::Draft);
        assert!(product.has_deep_dive());
        assert!(store.product("cursor-analyzed").is_none());
    }

    #[tokio::test]
    async fn test_deep_dive_without_reachable_sources_fails() {
        let store = Arc::new(InMemoryStore::new());
        store.put_product(sample_product("cursor", ProductStatus::Published));
        let p = pipeline(store.clone(), StaticCrawler::new(&["https://cursor.com"]), model("cursor"));

        let summary = p
            .run_deep_dives(&[deep_dive_task(Some("cursor"), &["https://gone.dev/1"])])
            .await;

        assert_eq!(summary.failed, 1);
        let product = store.product("cursor").unwrap();
        assert!(!product.has_deep_dive());
        assert!(store.articles().is_empty());
    }
}
