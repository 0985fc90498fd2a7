//! 投稿キャプションの分類結果をタグとして書き込むサービス。
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::TaggingError;
use super::writer::{ChunkedTagWriter, WriteSummary};
use crate::classification::{ClassificationResult, PostClassifier};
use crate::evaluation::{ValidationCase, ValidationReport, validate};
use crate::observability::Metrics;
use crate::store::{PostCaption, PostSource, TagSink, TagWrite};

/// バッチ処理の読み書き単位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggingSettings {
    pub read_page_size: usize,
    pub write_chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for TaggingSettings {
    fn default() -> Self {
        Self {
            read_page_size: 20,
            write_chunk_size: 500,
            chunk_delay: Duration::from_millis(100),
        }
    }
}

/// 書き込みが行われた投稿。信頼度は保存しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedPost {
    pub post_id: String,
    pub tags: Vec<String>,
}

/// 1 投稿分の分類結果。キャプションがない投稿も空のタグで含まれる。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostClassification {
    pub post_id: String,
    pub tags: Vec<ClassificationResult>,
    /// 先頭タグの信頼度。タグがなければ 0。
    pub confidence: f32,
    pub caption_missing: bool,
}

impl PostClassification {
    #[must_use]
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|r| r.label().to_string()).collect()
    }

    fn to_write(&self) -> TagWrite {
        TagWrite {
            post_id: self.post_id.clone(),
            tags: self.tag_names(),
        }
    }
}

/// `tag_untagged_posts` の実行結果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub tagged: usize,
    pub unclassified: usize,
    pub missing_caption: usize,
    pub skipped_already_processed: usize,
    pub pages: usize,
    pub chunks: usize,
    /// タグ名ごとの付与件数。
    pub per_category: BTreeMap<String, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BackfillReport {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            scanned: 0,
            tagged: 0,
            unclassified: 0,
            missing_caption: 0,
            skipped_already_processed: 0,
            pages: 0,
            chunks: 0,
            per_category: BTreeMap::new(),
            started_at: now,
            finished_at: now,
        }
    }

    fn progress(&self) -> WriteSummary {
        WriteSummary {
            posts_written: self.tagged,
            chunks: self.chunks,
        }
    }
}

/// 投稿ソースから未タグの投稿を読み、分類してタグシンクへ書き込む。
///
/// 分類器は不変なので `Arc` で共有する。処理済みの投稿 ID はインスタンスごとに保持し、
/// 同じインスタンスでの再実行では読み飛ばす。
pub struct TaggingService<S: PostSource, K: TagSink> {
    classifier: Arc<PostClassifier>,
    source: Arc<S>,
    sink: Arc<K>,
    settings: TaggingSettings,
    metrics: Arc<Metrics>,
    processed: Mutex<HashSet<String>>,
}

impl<S: PostSource, K: TagSink> TaggingService<S, K> {
    #[must_use]
    pub fn new(
        classifier: Arc<PostClassifier>,
        source: Arc<S>,
        sink: Arc<K>,
        settings: TaggingSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            classifier,
            source,
            sink,
            settings: TaggingSettings {
                read_page_size: settings.read_page_size.max(1),
                ..settings
            },
            metrics,
            processed: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn classifier(&self) -> &PostClassifier {
        &self.classifier
    }

    #[must_use]
    pub fn settings(&self) -> &TaggingSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_processed(&self, post_id: &str) -> bool {
        self.processed.lock().contains(post_id)
    }

    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.processed.lock().len()
    }

    /// 1 投稿を分類し、タグがあれば書き込む。
    ///
    /// タグが 1 件もなければ書き込みを行わず `None` を返す。空配列は書き込まない。
    ///
    /// # Errors
    /// タグシンクへの書き込みに失敗した場合。
    #[instrument(skip(self, caption))]
    pub async fn classify_and_tag(
        &self,
        post_id: &str,
        caption: Option<&str>,
    ) -> Result<Option<TaggedPost>, TaggingError> {
        let classification = self.classify_one(post_id, caption);
        if classification.tags.is_empty() {
            debug!("no confident category; skipping write");
            return Ok(None);
        }

        let tags = classification.tag_names();
        self.sink
            .write_tags(post_id, &tags)
            .await
            .map_err(|source| TaggingError::Write {
                post_id: post_id.to_string(),
                source,
            })?;
        self.metrics.tags_written.inc();
        self.processed.lock().insert(post_id.to_string());
        debug!(?tags, "tags written");

        Ok(Some(TaggedPost {
            post_id: post_id.to_string(),
            tags,
        }))
    }

    /// 投稿ごとに分類する。出力は入力と同じ順序・同じ件数。
    #[must_use]
    pub fn classify_batch(&self, posts: &[PostCaption]) -> Vec<PostClassification> {
        posts
            .par_iter()
            .map(|post| self.classify_one(&post.id, post.caption.as_deref()))
            .collect()
    }

    /// タグ書き込みをチャンクに分けて適用する。
    ///
    /// # Errors
    /// いずれかのチャンクが失敗した場合。それより前のチャンクは書き込まれたまま残る。
    pub async fn write_tags(&self, writes: &[TagWrite]) -> Result<WriteSummary, TaggingError> {
        let summary = self.writer().write_all(writes).await?;
        self.mark_processed(writes.iter().map(|w| w.post_id.clone()));
        Ok(summary)
    }

    /// 未タグの投稿をページ単位で読み、分類結果を書き込む。
    ///
    /// `limit` は読み出す投稿数の上限。書き込みはチャンクサイズに達するたびに行い、
    /// 残りは最後にまとめて書き込む。
    ///
    /// # Errors
    /// 読み出しまたは書き込みに失敗した場合。失敗前にコミットされたチャンクは残る。
    pub async fn tag_untagged_posts(
        &self,
        limit: Option<usize>,
    ) -> Result<BackfillReport, TaggingError> {
        let writer = self.writer();
        let mut report = BackfillReport::begin();
        let mut pending: Vec<TagWrite> = Vec::new();
        let mut cursor: Option<String> = None;

        info!(
            limit,
            page_size = self.settings.read_page_size,
            chunk_size = writer.chunk_size(),
            "starting tag backfill"
        );

        loop {
            let page_size = limit.map_or(self.settings.read_page_size, |limit| {
                limit
                    .saturating_sub(report.scanned)
                    .min(self.settings.read_page_size)
            });
            if page_size == 0 {
                break;
            }

            let page = self
                .source
                .fetch_untagged(cursor.as_deref(), page_size)
                .await
                .map_err(TaggingError::SourceRead)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());
            let fetched = page.len();
            report.pages += 1;
            report.scanned += fetched;

            let fresh: Vec<PostCaption> = {
                let processed = self.processed.lock();
                page.into_iter()
                    .filter(|post| !processed.contains(&post.id))
                    .collect()
            };
            report.skipped_already_processed += fetched - fresh.len();

            let mut settled = Vec::new();
            for classification in self.classify_batch(&fresh) {
                if classification.caption_missing {
                    report.missing_caption += 1;
                    settled.push(classification.post_id);
                } else if classification.tags.is_empty() {
                    report.unclassified += 1;
                    settled.push(classification.post_id);
                } else {
                    for result in &classification.tags {
                        *report
                            .per_category
                            .entry(result.label().to_string())
                            .or_default() += 1;
                    }
                    pending.push(classification.to_write());
                }
            }
            self.mark_processed(settled);
            debug!(
                page = report.pages,
                fetched,
                pending = pending.len(),
                "page classified"
            );

            let full = pending.len() - pending.len() % writer.chunk_size();
            if full > 0 {
                let ready: Vec<TagWrite> = pending.drain(..full).collect();
                self.flush(&writer, &ready, &mut report).await?;
            }

            if fetched < page_size {
                break;
            }
        }

        if !pending.is_empty() {
            self.flush(&writer, &pending, &mut report).await?;
        }

        report.finished_at = Utc::now();
        info!(
            scanned = report.scanned,
            tagged = report.tagged,
            unclassified = report.unclassified,
            missing_caption = report.missing_caption,
            skipped = report.skipped_already_processed,
            chunks = report.chunks,
            "tag backfill finished"
        );
        Ok(report)
    }

    /// ID を指定して投稿を読み直し、分類し直す。既存のタグは上書きされる。
    ///
    /// # Errors
    /// 投稿が存在しない場合、または読み書きに失敗した場合。
    pub async fn reclassify_post(&self, post_id: &str) -> Result<Option<TaggedPost>, TaggingError> {
        let post = self
            .source
            .fetch_post(post_id)
            .await
            .map_err(TaggingError::SourceRead)?
            .ok_or_else(|| TaggingError::PostNotFound {
                post_id: post_id.to_string(),
            })?;
        self.classify_and_tag(&post.id, post.caption.as_deref())
            .await
    }

    /// ラベル付きケースに対する分類精度を計算する。
    #[must_use]
    pub fn validate(&self, cases: &[ValidationCase]) -> ValidationReport {
        validate(&self.classifier, cases)
    }

    fn classify_one(&self, post_id: &str, caption: Option<&str>) -> PostClassification {
        let caption_missing = caption.is_none_or(|c| c.trim().is_empty());
        let started = Instant::now();
        let tags = self.classifier.tags_for(caption);
        self.metrics
            .classify_duration
            .observe(started.elapsed().as_secs_f64());

        if caption_missing {
            self.metrics.captions_missing.inc();
        } else if tags.is_empty() {
            self.metrics.captions_unclassified.inc();
        } else {
            self.metrics.captions_classified.inc();
        }

        let confidence = tags.first().map_or(0.0, |r| r.confidence);
        PostClassification {
            post_id: post_id.to_string(),
            tags,
            confidence,
            caption_missing,
        }
    }

    async fn flush(
        &self,
        writer: &ChunkedTagWriter<K>,
        writes: &[TagWrite],
        report: &mut BackfillReport,
    ) -> Result<(), TaggingError> {
        let summary = writer.resume(writes, report.progress()).await?;
        report.tagged = summary.posts_written;
        report.chunks = summary.chunks;
        self.mark_processed(writes.iter().map(|w| w.post_id.clone()));
        Ok(())
    }

    fn writer(&self) -> ChunkedTagWriter<K> {
        ChunkedTagWriter::new(
            Arc::clone(&self.sink),
            self.settings.write_chunk_size,
            self.settings.chunk_delay,
            Arc::clone(&self.metrics),
        )
    }

    fn mark_processed(&self, ids: impl IntoIterator<Item = String>) {
        self.processed.lock().extend(ids);
    }
}
