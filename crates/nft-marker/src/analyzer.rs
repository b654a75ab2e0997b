use crate::metrics::{MetricsSink, CACHE_HIT, CACHE_MISS};
use nft_marker_cache::{Cache, Fingerprint};
use nft_marker_core::{analyze_gray, AnalysisResult, GrayImageView};
use std::sync::Arc;

/// Cache-assisted brightness / contrast analysis.
///
/// Never fails: a broken cache degrades to recomputation.
pub struct FeatureAnalyzer {
    cache: Arc<dyn Cache<Fingerprint, AnalysisResult>>,
    metrics: Arc<dyn MetricsSink>,
}

impl FeatureAnalyzer {
    pub fn new(
        cache: Arc<dyn Cache<Fingerprint, AnalysisResult>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self { cache, metrics }
    }

    /// Return the cached analysis for `fingerprint`, or compute and store it.
    pub fn analyze(&self, fingerprint: &Fingerprint, img: &GrayImageView<'_>) -> AnalysisResult {
        if let Some(hit) = self.cache.get(fingerprint) {
            self.metrics.increment(CACHE_HIT);
            log::debug!("analysis cache hit for {fingerprint}");
            return hit;
        }

        self.metrics.increment(CACHE_MISS);
        let result = analyze_gray(img);
        log::debug!(
            "analysed {}x{}: brightness {:.1}, contrast {:.1} ({})",
            img.width,
            img.height,
            result.average_brightness,
            result.contrast,
            result.quality_verdict
        );
        if let Err(e) = self.cache.set(fingerprint, result) {
            log::warn!("failed to store analysis for {fingerprint}: {e}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CounterMetrics;
    use chrono::{Duration, TimeZone, Utc};
    use nft_marker_cache::{JsonFileCache, ManualClock, MemoryCache};
    use nft_marker_core::GrayImage;

    fn striped() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, _| if (x / 4) % 2 == 0 { 30 } else { 200 })
    }

    #[test]
    fn miss_then_hit_then_miss_after_ttl() {
        let root = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap(),
        ));
        let cache: JsonFileCache<AnalysisResult> =
            JsonFileCache::under_storage_root(root.path()).with_clock(clock.clone());
        let metrics = Arc::new(CounterMetrics::new());
        let analyzer = FeatureAnalyzer::new(Arc::new(cache), metrics.clone());

        let img = striped();
        let key = Fingerprint::new("striped.png", "1", 4096);

        let first = analyzer.analyze(&key, &img.view());
        assert_eq!((metrics.get(CACHE_MISS), metrics.get(CACHE_HIT)), (1, 0));

        let second = analyzer.analyze(&key, &img.view());
        assert_eq!((metrics.get(CACHE_MISS), metrics.get(CACHE_HIT)), (1, 1));
        assert_eq!(first, second);

        clock.advance(Duration::days(7) + Duration::seconds(1));
        let third = analyzer.analyze(&key, &img.view());
        assert_eq!((metrics.get(CACHE_MISS), metrics.get(CACHE_HIT)), (2, 1));
        assert_eq!(first, third);
    }

    #[test]
    fn hit_skips_recomputation() {
        let cache: Arc<MemoryCache<Fingerprint, AnalysisResult>> = Arc::new(MemoryCache::new());
        let metrics = Arc::new(CounterMetrics::new());
        let analyzer = FeatureAnalyzer::new(cache.clone(), metrics);
        let key = Fingerprint::new("x", "1", 1);

        let planted = AnalysisResult {
            average_brightness: 1.0,
            contrast: 2.0,
            quality_verdict: nft_marker_core::QualityVerdict::Poor,
        };
        cache.set(&key, planted).unwrap();
        // The image disagrees with the planted value; a hit must not look at it.
        assert_eq!(analyzer.analyze(&key, &striped().view()), planted);
    }

    #[test]
    fn new_fingerprint_is_a_miss() {
        let cache: Arc<MemoryCache<Fingerprint, AnalysisResult>> = Arc::new(MemoryCache::new());
        let metrics = Arc::new(CounterMetrics::new());
        let analyzer = FeatureAnalyzer::new(cache, metrics.clone());
        let img = striped();

        analyzer.analyze(&Fingerprint::new("a.png", "1", 10), &img.view());
        analyzer.analyze(&Fingerprint::new("a.png", "2", 10), &img.view());
        assert_eq!(metrics.get(CACHE_MISS), 2);
        assert_eq!(metrics.get(CACHE_HIT), 0);
    }

    #[test]
    fn touched_file_is_a_miss() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("cover.png");
        let touch = |secs: u64| {
            std::fs::write(&path, b"unchanged").unwrap();
            let f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            f.set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs))
                .unwrap();
        };
        let cache: JsonFileCache<AnalysisResult> = JsonFileCache::under_storage_root(root.path());
        let metrics = Arc::new(CounterMetrics::new());
        let analyzer = FeatureAnalyzer::new(Arc::new(cache), metrics.clone());
        let img = striped();

        touch(1_700_000_000);
        let key = Fingerprint::for_file(&path).unwrap();
        analyzer.analyze(&key, &img.view());
        analyzer.analyze(&key, &img.view());
        assert_eq!((metrics.get(CACHE_MISS), metrics.get(CACHE_HIT)), (1, 1));

        touch(1_700_000_060);
        let touched = Fingerprint::for_file(&path).unwrap();
        assert_ne!(key, touched);
        analyzer.analyze(&touched, &img.view());
        assert_eq!((metrics.get(CACHE_MISS), metrics.get(CACHE_HIT)), (2, 1));
    }
}
