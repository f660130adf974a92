//! Task files
//!
//! Product runs read `pending.json` (an array of tasks) or else `urls.txt`
//! (one URL per line). Deep-dive runs read `deep-dive-tasks.json`. An
//! explicit `--file` replaces the lookup.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::errors::{IngestionError, Result};

pub const PENDING_FILE: &str = "pending.json";
pub const URL_LIST_FILE: &str = "urls.txt";
pub const DEEP_DIVE_FILE: &str = "deep-dive-tasks.json";

/// One product page to ingest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestTask {
    pub url: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One product to produce a podcast deep dive for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepDiveTask {
    pub product_url: String,
    #[serde(default)]
    pub product_slug: Option<String>,
    #[serde(default)]
    pub source_urls: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn task_file_error(path: &Path, message: impl ToString) -> IngestionError {
    IngestionError::TaskFile {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path).map_err(|e| task_file_error(path, e))?;
    serde_json::from_str(&content).map_err(|e| task_file_error(path, e))
}

fn is_valid_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// URLs from a plain list, skipping blank lines and `#` comments
pub fn parse_url_list(content: &str) -> Vec<IngestTask> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|url| IngestTask {
            url: url.to_string(),
            ..Default::default()
        })
        .collect()
}

fn drop_invalid<T>(tasks: Vec<T>, url: impl Fn(&T) -> &str) -> Vec<T> {
    tasks
        .into_iter()
        .filter(|task| {
            let valid = is_valid_url(url(task));
            if !valid {
                warn!(url = url(task), "Skipping task with invalid URL");
            }
            valid
        })
        .collect()
}

/// Product tasks from `file`, or from the default files under `dir`
pub fn load_ingest_tasks(dir: &Path, file: Option<&Path>) -> Result<Vec<IngestTask>> {
    let path: PathBuf = match file {
        Some(file) => file.to_path_buf(),
        None => {
            let pending = dir.join(PENDING_FILE);
            let urls = dir.join(URL_LIST_FILE);
            if pending.exists() {
                pending
            } else if urls.exists() {
                urls
            } else {
                info!(dir = %dir.display(), "No task file found");
                return Ok(Vec::new());
            }
        }
    };

    let tasks = if path.extension().is_some_and(|ext| ext == "json") {
        read_json(&path)?
    } else {
        let content = std::fs::read_to_string(&path).map_err(|e| task_file_error(&path, e))?;
        parse_url_list(&content)
    };

    let tasks = drop_invalid(tasks, |t| t.url.as_str());
    info!(path = %path.display(), count = tasks.len(), "Loaded product tasks");
    Ok(tasks)
}

/// Deep-dive tasks from `file`, or from `deep-dive-tasks.json` under `dir`
pub fn load_deep_dive_tasks(dir: &Path, file: Option<&Path>) -> Result<Vec<DeepDiveTask>> {
    let path = match file {
        Some(file) => file.to_path_buf(),
        None => dir.join(DEEP_DIVE_FILE),
    };

    if file.is_none() && !path.exists() {
        info!(dir = %dir.display(), "No deep-dive task file found");
        return Ok(Vec::new());
    }

    let tasks = drop_invalid(read_json::<DeepDiveTask>(&path)?, |t| t.product_url.as_str());
    info!(path = %path.display(), count = tasks.len(), "Loaded deep-dive tasks");
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_url_list() {
        let tasks = parse_url_list("# tools\nhttps://kimi.ai\n\n  https://cursor.com  \n#https://skip.me\n");
        let urls: Vec<_> = tasks.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["https://kimi.ai", "https://cursor.com"]);
        assert!(tasks[0].slug.is_none());
    }

    #[test]
    fn test_pending_json_takes_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PENDING_FILE),
            r#"[{ "url": "https://midjourney.com", "category": "图像", "tags": ["绘画"] }]"#,
        )
        .unwrap();
        fs::write(dir.path().join(URL_LIST_FILE), "https://ignored.dev\n").unwrap();

        let tasks = load_ingest_tasks(dir.path(), None).unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url, "https://midjourney.com");
        assert_eq!(tasks[0].category.as_deref(), Some("图像"));
        assert_eq!(tasks[0].tags, vec!["绘画"]);
    }

    #[test]
    fn test_url_list_fallback_and_missing_files() {
        let dir = TempDir::new().unwrap();
        assert!(load_ingest_tasks(dir.path(), None).unwrap().is_empty());
        assert!(load_deep_dive_tasks(dir.path(), None).unwrap().is_empty());

        fs::write(dir.path().join(URL_LIST_FILE), "https://claude.ai\nnot-a-url\n").unwrap();
        let tasks = load_ingest_tasks(dir.path(), None).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url, "https://claude.ai");
    }

    #[test]
    fn test_explicit_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("batch.txt");
        fs::write(&file, "https://perplexity.ai\n").unwrap();

        let tasks = load_ingest_tasks(Path::new("/nonexistent"), Some(&file)).unwrap();
        assert_eq!(tasks[0].url, "https://perplexity.ai");

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_deep_dive_tasks(dir.path(), Some(&missing)),
            Err(IngestionError::TaskFile { .. })
        ));
    }

    #[test]
    fn test_deep_dive_tasks() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(DEEP_DIVE_FILE),
            r#"[{
                "product_slug": "cursor",
                "product_url": "https://cursor.sh",
                "source_urls": ["https://mp.weixin.qq.com/s/xxx", "https://36kr.com/p/xxx"],
                "category": "代码",
                "tags": ["AI编程", "IDE"]
            }]"#,
        )
        .unwrap();

        let tasks = load_deep_dive_tasks(dir.path(), None).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].product_slug.as_deref(), Some("cursor"));
        assert_eq!(tasks[0].source_urls.len(), 2);
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PENDING_FILE), "{ not json").unwrap();
        assert!(matches!(
            load_ingest_tasks(dir.path(), None),
            Err(IngestionError::TaskFile { .. })
        ));
    }
}
