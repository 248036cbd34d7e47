mod test_helpers;

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use label_measure::fetcher::{FetchError, FetchResult, ImageFetcher, PLACEHOLDER_SIZE};
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    fn routes(entries: &[(&str, Vec<u8>)]) -> HashMap<String, Vec<u8>> {
        entries
            .iter()
            .map(|(path, body)| (path.to_string(), body.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_downloads_image() {
        let body = sample_png(12, 8);
        let server = start_stub_server(routes(&[("/images/I/label.png", body.clone())])).await;
        let dir = tempfile::tempdir().expect("temp dir");
        let fetcher = ImageFetcher::new(fast_fetch_config(dir.path())).expect("fetcher");

        let result = fetcher
            .fetch(&server.url("/images/I/label.png?size=large"), dir.path())
            .await
            .expect("fetch succeeds");

        assert_eq!(result, FetchResult::Success(dir.path().join("label.png")));
        assert_eq!(std::fs::read(result.path()).expect("read image"), body);
        assert_eq!(fetcher.stats().downloads, 1);
        assert_eq!(fetcher.stats().attempts, 1);
    }

    #[tokio::test]
    async fn test_fetch_twice_transfers_once() {
        let server = start_stub_server(routes(&[("/a/same.png", sample_png(4, 4))])).await;
        let dir = tempfile::tempdir().expect("temp dir");
        let fetcher = ImageFetcher::new(fast_fetch_config(dir.path())).expect("fetcher");
        let url = server.url("/a/same.png");

        let first = fetcher.fetch(&url, dir.path()).await.expect("first fetch");
        let first_bytes = std::fs::read(first.path()).expect("read first");
        let second = fetcher.fetch(&url, dir.path()).await.expect("second fetch");
        let second_bytes = std::fs::read(second.path()).expect("read second");

        assert_eq!(first.path(), second.path());
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(server.connections(), 1);

        let stats = fetcher.stats();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.downloads, 1);
        assert_eq!(stats.reuses, 1);
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_placeholder() {
        let dir = tempfile::tempdir().expect("temp dir");
        let fetcher = ImageFetcher::new(fast_fetch_config(dir.path())).expect("fetcher");

        let result = fetcher
            .fetch(&closed_port_url("/img/gone.jpg"), dir.path())
            .await
            .expect("placeholder instead of error");

        assert!(result.is_placeholder());
        let decoded = image::open(result.path()).expect("placeholder is a valid image");
        assert_eq!(decoded.width(), PLACEHOLDER_SIZE);
        assert_eq!(decoded.height(), PLACEHOLDER_SIZE);

        let stats = fetcher.stats();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.placeholders, 1);
        assert_eq!(stats.downloads, 0);
    }

    #[tokio::test]
    async fn test_http_error_retries_then_placeholder() {
        let server = start_stub_server(HashMap::new()).await;
        let dir = tempfile::tempdir().expect("temp dir");
        let fetcher = ImageFetcher::new(fast_fetch_config(dir.path())).expect("fetcher");

        let result = fetcher
            .fetch(&server.url("/missing.png"), dir.path())
            .await
            .expect("placeholder instead of error");

        assert!(result.is_placeholder());
        assert_eq!(server.connections(), 3);
    }

    #[tokio::test]
    async fn test_no_delay_after_final_attempt() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = fast_fetch_config(dir.path());
        config.retry_count = 1;
        config.retry_delay = Duration::from_secs(30);
        config.retry_jitter = Duration::ZERO;
        let fetcher = ImageFetcher::new(config).expect("fetcher");

        let start = Instant::now();
        let result = fetcher
            .fetch(&closed_port_url("/once.png"), dir.path())
            .await
            .expect("placeholder instead of error");

        assert!(result.is_placeholder());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_delay_between_attempts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = fast_fetch_config(dir.path());
        config.retry_count = 3;
        config.retry_delay = Duration::from_millis(200);
        config.retry_jitter = Duration::ZERO;
        let fetcher = ImageFetcher::new(config).expect("fetcher");

        let start = Instant::now();
        fetcher
            .fetch(&closed_port_url("/thrice.png"), dir.path())
            .await
            .expect("placeholder instead of error");

        // Two gaps between three attempts
        assert!(start.elapsed() >= Duration::from_millis(400));
        assert_eq!(fetcher.stats().attempts, 3);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = start_stub_server(routes(&[("/big.png", vec![7u8; 64])])).await;
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = fast_fetch_config(dir.path());
        config.retry_count = 1;
        config.max_image_bytes = 16;
        let fetcher = ImageFetcher::new(config).expect("fetcher");

        let result = fetcher
            .fetch(&server.url("/big.png"), dir.path())
            .await
            .expect("placeholder instead of error");

        assert!(result.is_placeholder());
        assert_eq!(server.connections(), 1);
    }

    #[tokio::test]
    async fn test_invalid_urls_fail_fast() {
        let dir = tempfile::tempdir().expect("temp dir");
        let fetcher = ImageFetcher::new(fast_fetch_config(dir.path())).expect("fetcher");

        for url in ["", "   ", "not a url", "https://example.com/"] {
            let result = fetcher.fetch(url, dir.path()).await;
            assert!(
                matches!(result, Err(FetchError::InvalidUrl(_))),
                "expected InvalidUrl for {:?}",
                url
            );
        }

        let stats = fetcher.stats();
        assert_eq!(stats.attempts, 0);
        assert_eq!(stats.invalid_urls, 4);
    }

    #[tokio::test]
    async fn test_fetch_creates_destination_directory() {
        let server = start_stub_server(routes(&[("/x.png", sample_png(2, 2))])).await;
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("deep").join("images");
        let fetcher = ImageFetcher::new(fast_fetch_config(&nested)).expect("fetcher");

        let result = fetcher
            .fetch(&server.url("/x.png"), &nested)
            .await
            .expect("fetch succeeds");

        assert!(nested.is_dir());
        assert_eq!(result.path(), nested.join("x.png"));
    }

    #[tokio::test]
    async fn test_existing_file_is_reused_without_network() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_sample_png(&dir.path().join("cached.png"), 3, 3);
        let fetcher = ImageFetcher::new(fast_fetch_config(dir.path())).expect("fetcher");

        let result = fetcher
            .fetch(&closed_port_url("/cache/cached.png"), dir.path())
            .await
            .expect("reuse succeeds");

        assert_eq!(result, FetchResult::Success(dir.path().join("cached.png")));
        assert_eq!(fetcher.stats().attempts, 0);
    }
}
