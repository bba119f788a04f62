//! Timeout resolution per operation class
//!
//! Every request gets a deadline derived from its method and path. An
//! explicit timeout on the descriptor always wins over the category table.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::http::error::RequestError;
use crate::http::request::{HttpMethod, RequestDescriptor};

/// Operation classes with distinct deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutCategory {
    Read,
    Write,
    Delete,
    Upload,
    Report,
    Default,
}

impl TimeoutCategory {
    /// Classify a request. Path keywords take precedence over the verb.
    pub fn classify(method: HttpMethod, path: &str) -> Self {
        let path = path.to_ascii_lowercase();

        if path.contains("upload") || path.contains("file") {
            return TimeoutCategory::Upload;
        }

        if path.contains("report") || path.contains("export") {
            return TimeoutCategory::Report;
        }

        match method {
            HttpMethod::Get => TimeoutCategory::Read,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => TimeoutCategory::Write,
            HttpMethod::Delete => TimeoutCategory::Delete,
        }
    }
}

/// Category deadlines in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutTable {
    pub read_ms: u64,
    pub write_ms: u64,
    pub delete_ms: u64,
    pub upload_ms: u64,
    pub report_ms: u64,
    /// Used for the underlying HTTP client's own ceiling
    pub default_ms: u64,
}

impl Default for TimeoutTable {
    fn default() -> Self {
        Self {
            read_ms: 8_000,
            write_ms: 15_000,
            delete_ms: 10_000,
            upload_ms: 60_000,
            report_ms: 120_000,
            default_ms: 10_000,
        }
    }
}

impl TimeoutTable {
    pub fn millis_for(&self, category: TimeoutCategory) -> u64 {
        match category {
            TimeoutCategory::Read => self.read_ms,
            TimeoutCategory::Write => self.write_ms,
            TimeoutCategory::Delete => self.delete_ms,
            TimeoutCategory::Upload => self.upload_ms,
            TimeoutCategory::Report => self.report_ms,
            TimeoutCategory::Default => self.default_ms,
        }
    }

    /// The longest configured deadline
    pub fn max_ms(&self) -> u64 {
        [
            self.read_ms,
            self.write_ms,
            self.delete_ms,
            self.upload_ms,
            self.report_ms,
            self.default_ms,
        ]
        .into_iter()
        .max()
        .unwrap_or(self.default_ms)
    }

    /// Validate timeout configuration
    pub fn validate(&self) -> Result<(), String> {
        let entries = [
            ("read_ms", self.read_ms),
            ("write_ms", self.write_ms),
            ("delete_ms", self.delete_ms),
            ("upload_ms", self.upload_ms),
            ("report_ms", self.report_ms),
            ("default_ms", self.default_ms),
        ];

        for (name, value) in entries {
            if value == 0 {
                return Err(format!("Timeout {} cannot be zero", name));
            }
        }

        Ok(())
    }
}

/// Maps descriptors to deadlines
#[derive(Debug, Clone, Default)]
pub struct TimeoutPolicy {
    table: TimeoutTable,
}

impl TimeoutPolicy {
    pub fn new(table: TimeoutTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TimeoutTable {
        &self.table
    }

    /// Resolve the timeout for a request in milliseconds
    pub fn resolve(&self, request: &RequestDescriptor) -> u64 {
        match request.explicit_timeout_ms {
            Some(explicit) => explicit,
            None => self
                .table
                .millis_for(TimeoutCategory::classify(request.method, &request.path)),
        }
    }

    pub fn resolve_duration(&self, request: &RequestDescriptor) -> Duration {
        Duration::from_millis(self.resolve(request))
    }
}

/// Run a future under a deadline. Elapsing counts as a failure with no response.
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64) -> Result<T, RequestError>
where
    F: Future<Output = Result<T, RequestError>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => result,
        Err(_) => Err(RequestError::timed_out(timeout_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_category_mapping() {
        let policy = TimeoutPolicy::default();

        assert_eq!(policy.resolve(&RequestDescriptor::get("/measures")), 8_000);
        assert_eq!(
            policy.resolve(&RequestDescriptor::post("/products", json!({}))),
            15_000
        );
        assert_eq!(policy.resolve(&RequestDescriptor::delete("/providers/3")), 10_000);
        assert_eq!(
            policy.resolve(&RequestDescriptor::post("/files/upload", json!({}))),
            60_000
        );
        assert_eq!(policy.resolve(&RequestDescriptor::get("/reports/export")), 120_000);
    }

    #[test]
    fn test_path_keywords_beat_verbs() {
        assert_eq!(
            TimeoutCategory::classify(HttpMethod::Delete, "/files/7"),
            TimeoutCategory::Upload
        );
        assert_eq!(
            TimeoutCategory::classify(HttpMethod::Post, "/sales/Export"),
            TimeoutCategory::Report
        );
        assert_eq!(
            TimeoutCategory::classify(HttpMethod::Patch, "/products/4"),
            TimeoutCategory::Write
        );
    }

    #[test]
    fn test_explicit_override() {
        let policy = TimeoutPolicy::default();
        let request = RequestDescriptor::get("/reports/export").with_timeout_ms(500);
        assert_eq!(policy.resolve(&request), 500);
        assert_eq!(policy.resolve_duration(&request), Duration::from_millis(500));
    }

    #[test]
    fn test_table_validation() {
        let mut table = TimeoutTable::default();
        assert!(table.validate().is_ok());
        assert_eq!(table.max_ms(), 120_000);

        table.write_ms = 0;
        assert!(table.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_wrapper() {
        let fast = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, RequestError>(1)
            },
            100,
        )
        .await;
        assert_eq!(fast.unwrap(), 1);

        let slow = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, RequestError>(1)
            },
            100,
        )
        .await;
        let err = slow.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.status.is_none());
    }
}
