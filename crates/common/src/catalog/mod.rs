//! Catalog utilities shared by the directory API and ingestion
//!
//! - Site category taxonomy and legacy category mapping
//! - Seeded, reproducible shuffle for the directory listing
//! - Line-based Markdown renderer for podcast transcripts

mod categories;
mod markdown;
mod shuffle;

pub use categories::{
    category_info, legacy_category, normalize_category, CategoryInfo, FALLBACK_CATEGORY,
    SITE_CATEGORIES,
};
pub use markdown::{render_transcript, TranscriptBlock};
pub use shuffle::{seeded_shuffle, SeededRandom};
