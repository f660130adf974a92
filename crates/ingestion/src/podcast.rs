//! Deep-dive script synthesis
//!
//! Each reference article is reduced to one key insight (all articles in
//! parallel), then a single completion weaves the product page and the
//! articles into a Markdown podcast script.

use std::sync::Arc;

use futures::future::try_join_all;
use srcent_common::llm::{CompletionRequest, LanguageModel};
use tracing::info;
use url::Url;

use crate::crawler::{truncate_chars, CrawlResult};
use crate::errors::{IngestionError, Result};

const INSIGHT_TEXT_LIMIT: usize = 8_000;
const PRODUCT_TEXT_LIMIT: usize = 6_000;
const ARTICLE_TEXT_LIMIT: usize = 4_000;

const INSIGHT_PROMPT: &str = "你是一位专业的内容分析师。请从这篇文章中提取最独特、最有见地的一个核心观点。

要求：
1. 观点必须是这篇文章独有的，不要泛泛而谈
2. 用一句话概括，30-50 字
3. 只输出这一句话";

const SCRIPT_PROMPT: &str = "你是一位追求深度的科技播客主理人。你面前有几篇关于同一产品的文章。

不要简单拼接。先找出每篇文章最独特的观点，再把它们编织成一篇口语化、信息密度高的播客文稿。

文稿结构：

# [产品名称]：[一句话核心价值]

## 开场暴击
直接抛出该产品最反直觉或最核心的价值点，一两句话抓住听众。

## 深度解析
融合多篇文章的观点，从三个维度解读：
- **技术维度**：用了什么独特的技术方案？
- **商业维度**：商业模式和增长策略是什么？
- **用户体验**：如何改变用户的工作流程？

## 行业预判
结合文章中的预测和你的判断，给出对未来发展的洞察。

## 金句总结
用一句话总结这个产品的核心价值。

注意：
1. 语气像内行的老朋友聊天，用词精准但通俗
2. 总字数 800-1200 字
3. 只基于提供的内容归纳，不要编造
4. 输出纯 Markdown，不要输出 JSON";

const KNOWN_SOURCES: &[(&str, &str)] = &[
    ("mp.weixin.qq.com", "微信公众号"),
    ("36kr.com", "36Kr"),
    ("zhihu.com", "知乎"),
    ("juejin.cn", "掘金"),
    ("medium.com", "Medium"),
    ("sspai.com", "少数派"),
    ("geekpark.net", "极客公园"),
];

/// Display name of the publication an article URL belongs to
pub fn infer_source_name(url: &str) -> String {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return "未知来源".to_string();
    };

    KNOWN_SOURCES
        .iter()
        .find(|(domain, _)| host.contains(domain))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// A crawled reference article with its extracted insight
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleInsight {
    pub url: String,
    pub title: String,
    pub source_name: String,
    pub key_insight: String,
    pub content: String,
}

pub fn build_script_prompt(product: &CrawlResult, insights: &[ArticleInsight]) -> String {
    let articles = insights
        .iter()
        .enumerate()
        .map(|(i, article)| {
            format!(
                "### 文章 {}: {}\n来源: {}\n核心洞察: {}\n\n内容摘要:\n{}\n",
                i + 1,
                article.title,
                article.source_name,
                article.key_insight,
                truncate_chars(&article.content, ARTICLE_TEXT_LIMIT),
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n");

    format!(
        "请基于以下内容，撰写一篇深度播客文稿:\n\n## 产品官网信息\nURL: {}\n标题: {}\n描述: {}\n\n官网内容:\n{}\n\n---\n\n## 参考文章\n\n{}",
        product.url,
        product.title,
        product.metadata.description.as_deref().unwrap_or("无"),
        truncate_chars(&product.text, PRODUCT_TEXT_LIMIT),
        articles,
    )
}

#[derive(Clone)]
pub struct PodcastWriter {
    model: Arc<dyn LanguageModel>,
}

impl PodcastWriter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    async fn extract_insight(&self, article: &CrawlResult) -> Result<ArticleInsight> {
        let request = CompletionRequest::new(
            INSIGHT_PROMPT,
            format!(
                "文章标题: {}\n\n文章内容:\n{}",
                article.title,
                truncate_chars(&article.text, INSIGHT_TEXT_LIMIT)
            ),
        )
        .temperature(0.3)
        .max_tokens(200);

        let insight = self.model.complete(request).await?;

        Ok(ArticleInsight {
            url: article.url.clone(),
            title: article.title.clone(),
            source_name: infer_source_name(&article.url),
            key_insight: insight.trim().to_string(),
            content: article.text.clone(),
        })
    }

    /// One insight per article, requested concurrently. Any failure fails all.
    pub async fn extract_insights(&self, articles: &[CrawlResult]) -> Result<Vec<ArticleInsight>> {
        let insights =
            try_join_all(articles.iter().map(|article| self.extract_insight(article))).await?;
        info!(count = insights.len(), "Article insights extracted");
        Ok(insights)
    }

    pub async fn write_script(
        &self,
        product: &CrawlResult,
        insights: &[ArticleInsight],
    ) -> Result<String> {
        let request = CompletionRequest::new(SCRIPT_PROMPT, build_script_prompt(product, insights))
            .temperature(0.7)
            .max_tokens(3000);

        let script = self
            .model
            .complete(request)
            .await
            .map_err(|e| IngestionError::Synthesis(e.to_string()))?;

        let script = script.trim();
        if script.is_empty() {
            return Err(IngestionError::Synthesis("empty script".to_string()));
        }

        info!(chars = script.chars().count(), "Podcast script written");
        Ok(script.to_string())
    }
}
