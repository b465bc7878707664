//! Historical record sources
//!
//! A `RecordSource` yields the full text of the bulk dataset in one piece.
//! The loader owns timeouts and error classification; sources only fetch.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::config::HistoryConfig;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Provider of the bulk historical dataset.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    /// Fetch the whole dataset as text.
    async fn fetch_text(&self) -> Result<String, SourceError>;
}

/// Dataset served over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RecordSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch_text(&self) -> Result<String, SourceError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Dataset on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    /// Invalid UTF-8 is replaced rather than failing the whole file, so a
    /// corrupt row only spoils its own cells.
    async fn fetch_text(&self) -> Result<String, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// In-memory dataset. Used for tests and for replaying captured files.
#[derive(Debug, Clone)]
pub struct StaticSource {
    text: String,
}

impl StaticSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl RecordSource for StaticSource {
    fn describe(&self) -> String {
        format!("static ({} bytes)", self.text.len())
    }

    async fn fetch_text(&self) -> Result<String, SourceError> {
        Ok(self.text.clone())
    }
}

/// Build the configured source, if any.
pub fn from_history_config(config: &HistoryConfig) -> Option<Box<dyn RecordSource>> {
    if let Some(path) = &config.path {
        return Some(Box::new(FileSource::new(path.clone())));
    }
    config
        .url
        .as_ref()
        .map(|url| Box::new(HttpSource::new(url.clone())) as Box<dyn RecordSource>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::new("t,channel,value\n");
        assert_eq!(source.fetch_text().await.unwrap(), "t,channel,value\n");
        assert!(source.describe().starts_with("static"));
    }

    #[tokio::test]
    async fn test_file_source_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "time,a\n0,1\n").unwrap();

        let source = FileSource::new(file.path());
        assert_eq!(source.fetch_text().await.unwrap(), "time,a\n0,1\n");
    }

    #[tokio::test]
    async fn test_file_source_tolerates_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"time,a\n0,\xff\n").unwrap();

        let text = FileSource::new(file.path()).fetch_text().await.unwrap();
        assert_eq!(text, "time,a\n0,\u{fffd}\n");
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("missing.csv"));
        match source.fetch_text().await.unwrap_err() {
            SourceError::Io { path, .. } => assert!(path.ends_with("missing.csv")),
            err => panic!("Expected Io, got {:?}", err),
        }
    }

    #[test]
    fn test_from_history_config() {
        let mut config = HistoryConfig::default();
        assert!(from_history_config(&config).is_none());

        config.url = Some("https://example.invalid/data.csv".to_string());
        let source = from_history_config(&config).unwrap();
        assert_eq!(source.describe(), "https://example.invalid/data.csv");

        config.url = None;
        config.path = Some(PathBuf::from("/tmp/data.csv"));
        let source = from_history_config(&config).unwrap();
        assert_eq!(source.describe(), "/tmp/data.csv");
    }
}
