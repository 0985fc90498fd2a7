//! タグ書き込みのチャンク分割。
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::TaggingError;
use crate::observability::Metrics;
use crate::store::{TagSink, TagWrite};

/// コミット済みの書き込み量。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub posts_written: usize,
    pub chunks: usize,
}

/// 書き込みをシンクの上限以下のチャンクに分け、チャンクごとに一括書き込みする。
///
/// 1 投稿の書き込みは 1 つの [`TagWrite`] なので、チャンク境界で分割されることはない。
/// チャンク間には `delay` だけ待機する。
pub struct ChunkedTagWriter<K: TagSink> {
    sink: Arc<K>,
    chunk_size: usize,
    delay: Duration,
    metrics: Arc<Metrics>,
}

impl<K: TagSink> ChunkedTagWriter<K> {
    /// `chunk_size` はシンクの `max_batch_size` を超えないように切り詰められる。
    #[must_use]
    pub fn new(sink: Arc<K>, chunk_size: usize, delay: Duration, metrics: Arc<Metrics>) -> Self {
        let chunk_size = chunk_size.min(sink.max_batch_size()).max(1);
        Self {
            sink,
            chunk_size,
            delay,
            metrics,
        }
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 全件を書き込む。
    ///
    /// # Errors
    /// チャンクの書き込みに失敗した時点で中断し、それまでにコミットされた件数を含む
    /// [`TaggingError::ChunkWrite`] を返す。コミット済みのチャンクは取り消さない。
    pub async fn write_all(&self, writes: &[TagWrite]) -> Result<WriteSummary, TaggingError> {
        self.resume(writes, WriteSummary::default()).await
    }

    /// `progress` の続きとして書き込む。チャンク番号とコミット件数は `progress` から数える。
    ///
    /// # Errors
    /// [`Self::write_all`] と同じ。
    pub async fn resume(
        &self,
        writes: &[TagWrite],
        progress: WriteSummary,
    ) -> Result<WriteSummary, TaggingError> {
        let mut summary = progress;

        for chunk in writes.chunks(self.chunk_size) {
            let chunk_index = summary.chunks;
            if chunk_index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let started = Instant::now();
            if let Err(source) = self.sink.write_many(chunk).await {
                self.metrics.write_chunks_failed.inc();
                warn!(
                    chunk_index,
                    chunk_len = chunk.len(),
                    committed = summary.posts_written,
                    error = %source,
                    "tag write chunk failed"
                );
                return Err(TaggingError::ChunkWrite {
                    chunk_index,
                    committed: summary.posts_written,
                    source,
                });
            }
            self.metrics
                .write_chunk_duration
                .observe(started.elapsed().as_secs_f64());
            self.metrics.write_chunks_committed.inc();
            #[allow(clippy::cast_precision_loss)]
            self.metrics.tags_written.inc_by(chunk.len() as f64);

            summary.posts_written += chunk.len();
            summary.chunks += 1;
            debug!(chunk_index, chunk_len = chunk.len(), "tag write chunk committed");
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryPostStore, PostRecord};

    fn store(count: usize) -> Arc<InMemoryPostStore> {
        Arc::new(InMemoryPostStore::new(
            (0..count)
                .map(|i| PostRecord::new(format!("post-{i:03}"), Some("x")))
                .collect(),
        ))
    }

    fn writes(count: usize) -> Vec<TagWrite> {
        (0..count)
            .map(|i| TagWrite {
                post_id: format!("post-{i:03}"),
                tags: vec!["Thể thao".to_string()],
            })
            .collect()
    }

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::standalone().unwrap())
    }

    #[tokio::test]
    async fn splits_into_chunks() {
        let sink = store(7);
        let writer = ChunkedTagWriter::new(Arc::clone(&sink), 3, Duration::ZERO, metrics());
        let summary = writer.write_all(&writes(7)).await.unwrap();
        assert_eq!(
            summary,
            WriteSummary {
                posts_written: 7,
                chunks: 3
            }
        );
        assert_eq!(sink.committed_batches(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn chunk_size_is_capped_by_sink_limit() {
        let sink = Arc::new(
            InMemoryPostStore::new(vec![PostRecord::new("post-000", None)]).with_max_batch_size(2),
        );
        let writer = ChunkedTagWriter::new(sink, 500, Duration::ZERO, metrics());
        assert_eq!(writer.chunk_size(), 2);
    }

    #[tokio::test]
    async fn failure_reports_committed_posts() {
        let sink = store(5);
        sink.fail_on_batch(1);
        let writer = ChunkedTagWriter::new(Arc::clone(&sink), 2, Duration::ZERO, metrics());
        let err = writer.write_all(&writes(5)).await.unwrap_err();
        match err {
            TaggingError::ChunkWrite {
                chunk_index,
                committed,
                ..
            } => {
                assert_eq!(chunk_index, 1);
                assert_eq!(committed, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // 最初のチャンクは残る
        assert!(sink.tags_of("post-000").is_some());
        assert!(sink.tags_of("post-002").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_chunks() {
        let sink = store(4);
        let writer = ChunkedTagWriter::new(sink, 2, Duration::from_millis(100), metrics());
        let started = tokio::time::Instant::now();
        writer.write_all(&writes(4)).await.unwrap();
        // 2 チャンクの間に 1 回だけ待つ
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_continues_numbering_and_delay() {
        let sink = store(3);
        let writer = ChunkedTagWriter::new(Arc::clone(&sink), 2, Duration::from_millis(100), metrics());
        let first = writer.write_all(&writes(2)).await.unwrap();

        let started = tokio::time::Instant::now();
        let all = writes(3);
        let summary = writer.resume(&all[2..], first).await.unwrap();
        assert_eq!(
            summary,
            WriteSummary {
                posts_written: 3,
                chunks: 2
            }
        );
        // 前回の続きなので先頭チャンクの前でも待つ
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let sink = store(1);
        let writer = ChunkedTagWriter::new(Arc::clone(&sink), 2, Duration::ZERO, metrics());
        let summary = writer.write_all(&[]).await.unwrap();
        assert_eq!(summary, WriteSummary::default());
        assert_eq!(sink.total_writes(), 0);
    }
}
