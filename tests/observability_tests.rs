#[cfg(test)]
mod tests {
    use label_measure::observability;
    use label_measure::observability_config::{presets, ObservabilityConfig};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;

    #[test]
    fn test_pipeline_metrics_are_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            observability::record_fetch_attempt();
            observability::record_fetch_outcome("downloaded", Duration::from_millis(20));
            observability::record_ocr_metrics(true, Duration::from_millis(5), 2048);
            observability::record_extraction_result("not_found");
            observability::record_batch_metrics(3, Duration::from_secs(1));
        });

        let rendered = handle.render();
        assert!(rendered.contains("fetch_attempts_total"));
        assert!(rendered.contains("fetch_outcomes_total{outcome=\"downloaded\"}"));
        assert!(rendered.contains("ocr_operations_total{result=\"success\"}"));
        assert!(rendered.contains("extraction_results_total{result=\"not_found\"}"));
        assert!(rendered.contains("batch_items_total 3"));
    }

    #[test]
    fn test_snapshot_written_to_file() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            observability::record_extraction_result("success");
        });

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("label_measure.prom");
        observability::write_metrics_snapshot(&handle, &path).expect("snapshot written");

        let content = std::fs::read_to_string(&path).expect("read snapshot");
        assert!(content.contains("extraction_results_total"));
    }

    #[tokio::test]
    async fn test_init_without_metrics_or_otlp() {
        let config = ObservabilityConfig {
            environment: "test".to_string(),
            ..presets::minimal()
        };
        let guard = observability::init_observability_with_config(&config)
            .await
            .expect("observability initializes");
        assert!(guard.metrics_handle().is_none());
        guard.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = ObservabilityConfig {
            otlp_endpoint: Some("localhost:4317".to_string()),
            ..ObservabilityConfig::default()
        };
        assert!(observability::init_observability_with_config(&config)
            .await
            .is_err());
    }
}
