//! Ingestion error types

use srcent_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Crawl failed for {url}: {message}")]
    Crawl { url: String, message: String },

    #[error("Invalid analysis: {0}")]
    InvalidAnalysis(String),

    #[error("Script synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio synthesis failed: {0}")]
    Audio(String),

    #[error("No reference article could be crawled")]
    NoSources,

    #[error("Task file {path}: {message}")]
    TaskFile { path: String, message: String },

    #[error(transparent)]
    App(#[from] AppError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    pub fn crawl(url: &str, message: impl ToString) -> Self {
        IngestionError::Crawl {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;
