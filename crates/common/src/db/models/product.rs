//! Product entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::analysis::AiAnalysis;

/// Publication status of a product
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    Published,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Published => "published",
            ProductStatus::Archived => "archived",
        }
    }

    /// Parse a stored or user-supplied status
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ProductStatus::Draft),
            "published" => Some(ProductStatus::Published),
            "archived" => Some(ProductStatus::Archived),
            _ => None,
        }
    }
}

impl From<ProductStatus> for String {
    fn from(status: ProductStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stable external identifier
    #[sea_orm(column_type = "Text", unique)]
    pub slug: String,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub tagline: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub logo_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub website_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub screenshot_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub category: Option<String>,

    pub tags: Option<Vec<String>>,

    /// Structured analysis document, see [`AiAnalysis`]
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub ai_analysis: Option<Json>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub podcast_audio_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub podcast_transcript: Option<String>,

    /// Seconds
    pub podcast_duration: Option<i32>,

    pub has_deep_dive: Option<bool>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the product status as an enum; unknown values read as draft
    pub fn product_status(&self) -> ProductStatus {
        ProductStatus::parse(&self.status).unwrap_or(ProductStatus::Draft)
    }

    pub fn is_published(&self) -> bool {
        self.product_status() == ProductStatus::Published
    }

    pub fn has_deep_dive(&self) -> bool {
        self.has_deep_dive.unwrap_or(false)
    }

    /// Typed view of `ai_analysis`; malformed documents read as absent
    pub fn analysis(&self) -> Option<AiAnalysis> {
        self.ai_analysis
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::source_article::Entity", on_delete = "Cascade")]
    SourceArticles,
}

impl Related<super::source_article::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SourceArticles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
