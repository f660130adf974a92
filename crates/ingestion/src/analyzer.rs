//! Structured product analysis
//!
//! One JSON-mode completion per product page, validated into an
//! [`AnalysisResult`] before anything is written.

use std::sync::Arc;

use serde::Deserialize;
use srcent_common::catalog::normalize_category;
use srcent_common::db::models::AiAnalysis;
use srcent_common::llm::{CompletionRequest, LanguageModel};
use tracing::{debug, info};

use crate::crawler::{truncate_chars, CrawlResult};
use crate::errors::{IngestionError, Result};

const PAGE_TEXT_LIMIT: usize = 12_000;

const SYSTEM_PROMPT: &str = r#"你是一位专业的 AI 产品分析师，负责把产品官网内容拆解成结构化报告。

只输出一个 JSON 对象，字段如下：

{
  "name": "产品名称",
  "tagline": "一句话介绍，10-20 字",
  "slug": "url-friendly-name（小写字母、数字、连字符）",
  "category": "通用助手/图像生成/视频创作/音频处理/编程开发/智能搜索/知识管理/写作辅助/智能硬件/虚拟陪伴/Agent构建/效率工具/3D生成/科研辅助/其他类型 之一",
  "tags": ["标签"],
  "what_is": "2-3 段介绍：产品背景、核心价值、技术特点，段落之间用换行分隔",
  "design_philosophy": "设计思路与核心理念，2-3 句",
  "target_users": ["目标用户"],
  "features": [{ "title": "功能名称", "description": "30-50 字描述", "icon": "emoji" }],
  "use_cases": [{ "title": "场景", "description": "谁在什么情况下如何使用" }],
  "pricing_model": "免费/免费增值/订阅制/一次性付费/按量付费",
  "pricing_details": "定价详情",
  "strengths": ["优势"],
  "weaknesses": ["不足"],
  "faqs": [{ "question": "常见问题？", "answer": "回答" }],
  "alternatives": [{ "name": "竞品", "description": "与本产品的对比" }]
}

要求：
1. 客观、专业、具体
2. features 4-6 个，use_cases 3-5 个，faqs 3-5 个，alternatives 2-4 个
3. 面向学生群体，兼顾学习、作业、创作场景
4. 只输出 JSON"#;

/// Validated model output
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub name: String,
    pub tagline: Option<String>,
    pub slug: String,
    /// Always a taxonomy category
    pub category: String,
    pub tags: Vec<String>,
    pub analysis: AiAnalysis,
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tagline: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(flatten)]
    analysis: AiAnalysis,
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (```json)
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Lowercase ASCII alphanumerics joined by single hyphens
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse and validate a completion into an [`AnalysisResult`]
pub fn parse_analysis(raw: &str) -> Result<AnalysisResult> {
    let parsed: RawAnalysis = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| IngestionError::InvalidAnalysis(format!("not a JSON object: {}", e)))?;

    let name = non_blank(parsed.name)
        .ok_or_else(|| IngestionError::InvalidAnalysis("missing name".to_string()))?;

    let slug = parsed
        .slug
        .as_deref()
        .map(slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&name));
    if slug.is_empty() {
        return Err(IngestionError::InvalidAnalysis(format!(
            "no usable slug for '{}'",
            name
        )));
    }

    Ok(AnalysisResult {
        name,
        tagline: non_blank(parsed.tagline),
        slug,
        category: normalize_category(parsed.category.as_deref()).to_string(),
        tags: parsed
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        analysis: parsed.analysis,
    })
}

pub fn build_user_prompt(page: &CrawlResult) -> String {
    format!(
        "请深度分析以下 AI 产品，给出结构化拆解：\n\nURL: {}\n标题: {}\n描述: {}\n\n页面内容:\n{}",
        page.url,
        page.title,
        page.metadata.description.as_deref().unwrap_or("无"),
        truncate_chars(&page.text, PAGE_TEXT_LIMIT),
    )
}

/// Product page analyzer
#[derive(Clone)]
pub struct Analyzer {
    model: Arc<dyn LanguageModel>,
}

impl Analyzer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn analyze(&self, page: &CrawlResult) -> Result<AnalysisResult> {
        let request = CompletionRequest::new(SYSTEM_PROMPT, build_user_prompt(page))
            .temperature(0.3)
            .json();

        let raw = self.model.complete(request).await?;
        debug!(url = %page.url, chars = raw.len(), "Analysis received");

        let result = parse_analysis(&raw)?;
        info!(
            url = %page.url,
            name = %result.name,
            slug = %result.slug,
            category = %result.category,
            "Product analyzed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::PageMetadata;
    use serde_json::json;
    use srcent_common::testing::FnModel;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Cursor AI"), "cursor-ai");
        assert_eq!(slugify("  --Notion__AI!! "), "notion-ai");
        assert_eq!(slugify("already-fine-2"), "already-fine-2");
        assert_eq!(slugify("通义千问"), "");
    }

    #[test]
    fn test_parse_analysis_normalizes_fields() {
        let raw = json!({
            "name": " Cursor ",
            "tagline": "AI 代码编辑器",
            "slug": "Cursor Editor",
            "category": "代码",
            "tags": ["AI编程", " ", "IDE"],
            "what_is": "An editor",
            "features": [{ "title": "Tab", "description": "补全" }]
        })
        .to_string();

        let result = parse_analysis(&format!("```json\n{}\n```", raw)).unwrap();

        assert_eq!(result.name, "Cursor");
        assert_eq!(result.slug, "cursor-editor");
        assert_eq!(result.category, "编程开发");
        assert_eq!(result.tags, vec!["AI编程", "IDE"]);
        assert_eq!(result.analysis.what_is.as_deref(), Some("An editor"));
        assert_eq!(result.analysis.features.len(), 1);
        assert!(result.analysis.faqs.is_empty());
    }

    #[test]
    fn test_slug_falls_back_to_name() {
        let result = parse_analysis(r#"{"name":"Kimi Chat","slug":"！！"}"#).unwrap();
        assert_eq!(result.slug, "kimi-chat");
        assert_eq!(result.category, "其他类型");
    }

    #[test]
    fn test_invalid_analysis_is_rejected() {
        for raw in [
            "not json",
            r#"{"slug":"x"}"#,
            r#"{"name":"  "}"#,
            r#"{"name":"通义千问"}"#,
        ] {
            assert!(
                matches!(parse_analysis(raw), Err(IngestionError::InvalidAnalysis(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_analyze_sends_truncated_page() {
        let model = Arc::new(FnModel::fixed(r#"{"name":"Kimi","slug":"kimi","category":"通用助手"}"#));
        let analyzer = Analyzer::new(model.clone());

        let page = CrawlResult {
            url: "https://kimi.ai".into(),
            title: "Kimi".into(),
            text: "字".repeat(20_000),
            metadata: PageMetadata::default(),
            ..Default::default()
        };

        let result = analyzer.analyze(&page).await.unwrap();
        assert_eq!(result.slug, "kimi");

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_mode);
        assert_eq!(requests[0].temperature, 0.3);
        assert!(requests[0].user.contains("描述: 无"));
        assert_eq!(requests[0].user.matches('字').count(), PAGE_TEXT_LIMIT);
    }
}
