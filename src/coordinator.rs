//! Conversion pipeline coordination.
//!
//! [`Coordinator::convert_file`] runs the full request path: size check,
//! type classification, dispatch to the worker pool, markdown cleanup,
//! and title fallback. Every attempt that passes validation is reported
//! to the injected [`StatsSink`] exactly once, success or failure.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::normalize;
use crate::stats::{ConversionRecord, StatsSink};
use crate::types::{ConversionRequest, ConversionResult, ConvertOptions};
use crate::validate;
use crate::worker::WorkerPool;

/// Ties validation, the worker pool, and the stats sink together.
pub struct Coordinator {
    config: ServiceConfig,
    pool: Arc<WorkerPool>,
    stats: Arc<dyn StatsSink>,
}

impl Coordinator {
    pub fn new(config: ServiceConfig, pool: Arc<WorkerPool>, stats: Arc<dyn StatsSink>) -> Self {
        Self { config, pool, stats }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Convert one uploaded document to normalized markdown.
    ///
    /// Validation failures (oversize, unsupported type) return before
    /// any worker is consulted and are not recorded as conversion
    /// attempts. Everything after classification is recorded.
    pub async fn convert_file(
        &self,
        content: Vec<u8>,
        filename: &str,
        options: ConvertOptions,
    ) -> Result<ConversionResult> {
        validate::check_size(content.len() as u64, self.config.max_file_size)?;
        let detected = validate::classify(&content, filename, options.mimetype.as_deref())?;

        // Caller-supplied overrides win over detection.
        let extension = options.extension.clone().or_else(|| detected.extension.clone());
        let mimetype = options.mimetype.clone().or_else(|| detected.mimetype.clone());
        let size_bytes = content.len() as u64;
        let stats_extension = extension
            .as_deref()
            .map(|e| e.trim_start_matches('.').to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let request = ConversionRequest {
            content,
            filename: filename.to_string(),
            keep_data_uris: options.keep_data_uris,
            extension,
            mimetype,
        };

        let started = Instant::now();
        let outcome = self
            .pool
            .convert(&request, self.config.request_timeout())
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.stats.record(ConversionRecord {
            filename: filename.to_string(),
            extension: stats_extension,
            size_bytes,
            duration_ms,
            success: outcome.is_ok(),
            error_type: outcome.as_ref().err().map(|e| e.error_type().to_string()),
            finished_at: chrono::Utc::now().to_rfc3339(),
        });

        let raw = outcome?;
        let markdown = normalize::normalize(Some(&raw.markdown));
        let title = raw
            .title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| normalize::extract_title(&markdown));

        Ok(ConversionResult {
            markdown,
            title,
            metadata: raw.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use crate::stats::MetricsCollector;
    use crate::worker::PoolConfig;
    use std::sync::Mutex;

    struct CountingSink(Mutex<Vec<ConversionRecord>>);

    impl StatsSink for CountingSink {
        fn record(&self, record: ConversionRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    fn coordinator_without_pool(sink: Arc<dyn StatsSink>) -> Coordinator {
        // Pool is never started: anything past validation fails with 503.
        let pool = Arc::new(WorkerPool::new(PoolConfig::with_command(
            1,
            "/bin/true",
            vec![],
        )));
        Coordinator::new(ServiceConfig::default(), pool, sink)
    }

    #[tokio::test]
    async fn oversize_rejected_before_dispatch() {
        let sink = Arc::new(CountingSink(Mutex::new(vec![])));
        let config = ServiceConfig::default().with_max_file_size(4);
        let pool = Arc::new(WorkerPool::new(PoolConfig::with_command(
            1,
            "/bin/true",
            vec![],
        )));
        let coordinator = Coordinator::new(config, pool, sink.clone());

        let err = coordinator
            .convert_file(b"hello".to_vec(), "a.txt", ConvertOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::PayloadTooLarge { .. }));
        // Validation failures are not conversion attempts
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_type_rejected_before_dispatch() {
        let sink = Arc::new(CountingSink(Mutex::new(vec![])));
        let coordinator = coordinator_without_pool(sink.clone());

        let err = coordinator
            .convert_file(b"MZ\x90\x00".to_vec(), "tool.exe", ConvertOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedType(_)));
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pool_failure_is_recorded_exactly_once() {
        let sink = Arc::new(CountingSink(Mutex::new(vec![])));
        let coordinator = coordinator_without_pool(sink.clone());

        let err = coordinator
            .convert_file(b"hello".to_vec(), "a.txt", ConvertOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::PoolNotRunning(_)));

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(!record.success);
        assert_eq!(record.extension, "txt");
        assert_eq!(record.size_bytes, 5);
        assert_eq!(record.error_type.as_deref(), Some("pool_not_running"));
    }

    #[tokio::test]
    async fn extension_override_wins_over_detection() {
        let sink = Arc::new(CountingSink(Mutex::new(vec![])));
        let coordinator = coordinator_without_pool(sink.clone());

        let options = ConvertOptions {
            extension: Some("md".to_string()),
            ..Default::default()
        };
        let _ = coordinator
            .convert_file(b"hello".to_vec(), "a.txt", options)
            .await;

        let records = sink.0.lock().unwrap();
        assert_eq!(records[0].extension, "md");
    }

    #[tokio::test]
    async fn metrics_collector_works_as_sink() {
        let collector = Arc::new(MetricsCollector::new());
        let coordinator = coordinator_without_pool(collector.clone());

        let _ = coordinator
            .convert_file(b"hello".to_vec(), "a.txt", ConvertOptions::default())
            .await;

        let snap = collector.snapshot();
        assert_eq!(snap.total_conversions, 1);
        assert_eq!(snap.failed_conversions, 1);
    }
}
