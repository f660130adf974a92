//! Typed view of the `products.ai_analysis` document

use serde::{Deserialize, Serialize};

/// Structured product analysis produced at ingestion time.
///
/// Every list defaults to empty so partially filled documents still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what_is: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_philosophy: Option<String>,

    #[serde(default)]
    pub target_users: Vec<String>,

    #[serde(default)]
    pub features: Vec<Feature>,

    #[serde(default)]
    pub use_cases: Vec<UseCase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_details: Option<String>,

    #[serde(default)]
    pub strengths: Vec<String>,

    #[serde(default)]
    pub weaknesses: Vec<String>,

    #[serde(default)]
    pub faqs: Vec<Faq>,

    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseCase {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_document_defaults_lists() {
        let analysis: AiAnalysis = serde_json::from_value(json!({
            "what_is": "An AI code editor",
            "features": [{ "title": "Tab completion" }]
        }))
        .unwrap();

        assert_eq!(analysis.what_is.as_deref(), Some("An AI code editor"));
        assert_eq!(analysis.features.len(), 1);
        assert_eq!(analysis.features[0].description, "");
        assert!(analysis.faqs.is_empty());
        assert!(analysis.alternatives.is_empty());
    }
}
