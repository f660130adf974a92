//! Podcast audio synthesis
//!
//! The Coze podcast workflow streams server-sent events; the audio URL is
//! taken from the last event payload that carries one. Without an API key a
//! deterministic placeholder URL is produced instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use srcent_common::config::TtsConfig;
use tracing::{debug, info, warn};

use crate::crawler::{is_http_url, truncate_chars};
use crate::errors::{IngestionError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    pub url: String,
    pub duration_secs: i32,
}

#[async_trait]
pub trait AudioSynthesizer: Send + Sync {
    async fn synthesize(&self, script: &str, slug: &str) -> Result<AudioAsset>;

    fn mode(&self) -> &'static str;
}

/// Seconds of speech for `chars` characters, rounded up
pub fn estimate_duration(chars: usize, chars_per_minute: u32) -> i32 {
    let per_minute = chars_per_minute.max(1) as usize;
    let secs = (chars * 60).div_ceil(per_minute);
    i32::try_from(secs).unwrap_or(i32::MAX)
}

/// What the workflow stream yielded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutput {
    pub podcast_url: Option<String>,
    pub duration_secs: Option<i32>,
}

/// Incremental parser for the workflow's event stream.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
    output: StreamOutput,
}

fn duration_value(value: &Value) -> Option<i32> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (secs > 0.0).then(|| secs.ceil() as i32)
}

fn is_error_code(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(_) => true,
    }
}

fn error_detail(event: &Value) -> &str {
    event
        .get("error_message")
        .or_else(|| event.get("msg"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
        }
    }

    pub fn finish(mut self) -> StreamOutput {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&String::from_utf8_lossy(&rest));
        }
        self.output
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if let Some(data) = line.strip_prefix("data:") {
            self.handle_data(data.trim());
        } else if let Some(event) = line.strip_prefix("event:") {
            match event.trim() {
                "Error" => warn!("Workflow reported an error event"),
                "Done" => debug!("Workflow finished"),
                _ => {}
            }
        }
    }

    fn handle_data(&mut self, data: &str) {
        if data.is_empty() || data == "[DONE]" {
            return;
        }
        let Ok(event) = serde_json::from_str::<Value>(data) else {
            return;
        };

        if is_error_code(event.get("error_code")) {
            let detail = error_detail(&event);
            warn!(code = %event["error_code"], detail, "Workflow error event");
            return;
        }

        let Some(content) = event
            .get("content")
            .and_then(Value::as_str)
            .and_then(|c| serde_json::from_str::<Value>(c).ok())
        else {
            return;
        };

        match content.get("output") {
            Some(Value::String(url)) if is_http_url(url) => {
                self.output.podcast_url = Some(url.clone());
            }
            Some(output @ Value::Object(_)) => {
                if let Some(url) = output
                    .get("podcast_url")
                    .and_then(Value::as_str)
                    .filter(|u| is_http_url(u))
                {
                    self.output.podcast_url = Some(url.to_string());
                }
                if let Some(secs) = output.get("duration").and_then(duration_value) {
                    self.output.duration_secs = Some(secs);
                }
            }
            _ => {}
        }

        if let Some(secs) = content.get("duration").and_then(duration_value) {
            self.output.duration_secs = Some(secs);
        }
    }
}

/// Coze podcast workflow client
pub struct CozeSynthesizer {
    client: reqwest::Client,
    api_key: String,
    config: TtsConfig,
}

impl CozeSynthesizer {
    pub fn new(api_key: String, config: TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(srcent_common::AppError::from)?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }
}

#[async_trait]
impl AudioSynthesizer for CozeSynthesizer {
    async fn synthesize(&self, script: &str, slug: &str) -> Result<AudioAsset> {
        let input = truncate_chars(script, self.config.max_chars);
        if input.len() < script.len() {
            warn!(slug, max_chars = self.config.max_chars, "Script truncated for synthesis");
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "workflow_id": self.config.workflow_id,
                "parameters": { "input": input },
            }))
            .send()
            .await
            .map_err(|e| IngestionError::Audio(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IngestionError::Audio(format!("HTTP {}: {}", status, body)));
        }

        let mut parser = StreamParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IngestionError::Audio(e.to_string()))?;
            parser.feed(&chunk);
        }
        let output = parser.finish();

        let url = output
            .podcast_url
            .ok_or_else(|| IngestionError::Audio("no podcast URL in workflow stream".to_string()))?;
        let duration_secs = output.duration_secs.unwrap_or_else(|| {
            estimate_duration(input.chars().count(), self.config.chars_per_minute)
        });

        info!(slug, url = %url, duration_secs, "Podcast audio generated");
        Ok(AudioAsset { url, duration_secs })
    }

    fn mode(&self) -> &'static str {
        "coze"
    }
}

/// Placeholder audio for environments without a TTS key
pub struct PlaceholderSynthesizer {
    base_url: String,
    chars_per_minute: u32,
}

impl PlaceholderSynthesizer {
    pub fn new(base_url: &str, chars_per_minute: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            chars_per_minute,
        }
    }
}

#[async_trait]
impl AudioSynthesizer for PlaceholderSynthesizer {
    async fn synthesize(&self, script: &str, slug: &str) -> Result<AudioAsset> {
        Ok(AudioAsset {
            url: format!("{}/podcasts/{}.mp3", self.base_url, slug),
            duration_secs: estimate_duration(script.chars().count(), self.chars_per_minute),
        })
    }

    fn mode(&self) -> &'static str {
        "placeholder"
    }
}

pub fn synthesizer_from_config(config: &TtsConfig) -> Result<Arc<dyn AudioSynthesizer>> {
    match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => Ok(Arc::new(CozeSynthesizer::new(key.to_string(), config.clone())?)),
        None => Ok(Arc::new(PlaceholderSynthesizer::new(
            &config.placeholder_base_url,
            config.chars_per_minute,
        ))),
    }
}
