/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder,
    register_counter_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// タグ付けサービスのメトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // カウンター
    pub captions_classified: Counter,
    pub captions_unclassified: Counter,
    pub captions_missing: Counter,
    pub tags_written: Counter,
    pub write_chunks_committed: Counter,
    pub write_chunks_failed: Counter,

    // ヒストグラム
    pub classify_duration: Histogram,
    pub write_chunk_duration: Histogram,
}

impl Metrics {
    /// 指定したレジストリにメトリクスを登録する。
    ///
    /// # Errors
    /// 同名のメトリクスが既に登録されている場合。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            captions_classified: register_counter_with_registry!(
                "tagger_captions_classified_total",
                "Captions that received at least one tag",
                registry
            )?,
            captions_unclassified: register_counter_with_registry!(
                "tagger_captions_unclassified_total",
                "Captions with no category above the confidence threshold",
                registry
            )?,
            captions_missing: register_counter_with_registry!(
                "tagger_captions_missing_total",
                "Posts read without a caption",
                registry
            )?,
            tags_written: register_counter_with_registry!(
                "tagger_tag_writes_total",
                "Posts whose tags were written to the sink",
                registry
            )?,
            write_chunks_committed: register_counter_with_registry!(
                "tagger_write_chunks_committed_total",
                "Atomic write chunks committed to the sink",
                registry
            )?,
            write_chunks_failed: register_counter_with_registry!(
                "tagger_write_chunks_failed_total",
                "Atomic write chunks rejected by the sink",
                registry
            )?,
            classify_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "tagger_classify_batch_duration_seconds",
                    "Time spent classifying one page of posts"
                )
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
                registry
            )?,
            write_chunk_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "tagger_write_chunk_duration_seconds",
                    "Time spent committing one write chunk"
                ),
                registry
            )?,
            registry,
        })
    }

    /// 専用レジストリでメトリクスを作る。
    ///
    /// # Errors
    /// メトリクスの登録に失敗した場合。
    pub fn standalone() -> Result<Self, prometheus::Error> {
        Self::new(Arc::new(Registry::new()))
    }

    /// テキスト形式でメトリクスを出力する。
    #[must_use]
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer).ok();
        String::from_utf8(buffer).unwrap_or_default()
    }
}
