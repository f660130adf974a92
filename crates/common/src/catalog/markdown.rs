//! Podcast transcript renderer
//!
//! Transcripts are generated with a small Markdown subset. Each line maps
//! to one block; blank lines are dropped.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptBlock {
    Heading { level: u8, text: String },
    ListItem { text: String },
    /// A whole line wrapped in `**`
    Emphasis { text: String },
    Paragraph { text: String },
}

fn render_line(line: &str) -> Option<TranscriptBlock> {
    let heading = |level, text: &str| TranscriptBlock::Heading {
        level,
        text: text.to_string(),
    };

    if let Some(text) = line.strip_prefix("# ") {
        Some(heading(1, text))
    } else if let Some(text) = line.strip_prefix("## ") {
        Some(heading(2, text))
    } else if let Some(text) = line.strip_prefix("### ") {
        Some(heading(3, text))
    } else if let Some(text) = line.strip_prefix("- ") {
        Some(TranscriptBlock::ListItem { text: text.to_string() })
    } else if line.starts_with("**") && line.ends_with("**") {
        // `**` and `***` overlap their own markers and render empty
        let text = line.get(2..line.len().saturating_sub(2)).unwrap_or_default();
        Some(TranscriptBlock::Emphasis { text: text.to_string() })
    } else if !line.trim().is_empty() {
        Some(TranscriptBlock::Paragraph { text: line.to_string() })
    } else {
        None
    }
}

/// Split a transcript into display blocks
pub fn render_transcript(text: &str) -> Vec<TranscriptBlock> {
    text.lines().filter_map(render_line).collect()
}
