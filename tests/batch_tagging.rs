// インメモリストアを使ったバッチタグ付けの結合テスト。
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use caption_tagger::classification::PostClassifier;
use caption_tagger::observability::Metrics;
use caption_tagger::pipeline::{TaggingError, TaggingService, TaggingSettings};
use caption_tagger::store::{InMemoryPostStore, PostCaption, PostRecord, PostSource};

const CAPTIONS: [&str; 4] = [
    "Tối nay đi xem phim bom tấn ở rạp",
    "Nghe nhạc concert tối qua",
    "Hôm nay trời đẹp quá",
    "Review laptop mới và smartphone",
];

fn settings() -> TaggingSettings {
    TaggingSettings {
        chunk_delay: Duration::ZERO,
        ..TaggingSettings::default()
    }
}

fn populated_store(count: usize) -> Arc<InMemoryPostStore> {
    Arc::new(InMemoryPostStore::new(
        (0..count)
            .map(|i| PostRecord::new(format!("post-{i:05}"), Some(CAPTIONS[i % CAPTIONS.len()])))
            .collect(),
    ))
}

fn service_for<S: PostSource>(
    source: Arc<S>,
    sink: Arc<InMemoryPostStore>,
    settings: TaggingSettings,
) -> (TaggingService<S, InMemoryPostStore>, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::standalone().expect("metrics"));
    let service = TaggingService::new(
        Arc::new(PostClassifier::with_builtin_dictionary()),
        source,
        sink,
        settings,
        Arc::clone(&metrics),
    );
    (service, metrics)
}

#[tokio::test]
async fn classify_and_tag_with_empty_caption_issues_no_writes() {
    let store = populated_store(1);
    let (service, metrics) = service_for(Arc::clone(&store), Arc::clone(&store), settings());

    let result = service.classify_and_tag("post-00000", Some("")).await.unwrap();

    assert!(result.is_none());
    assert_eq!(store.total_writes(), 0);
    assert!(metrics.captions_missing.get() >= 1.0);
}

#[tokio::test]
async fn large_backfill_is_written_in_capped_chunks() {
    // 4 件に 1 件は分類されない
    let store = populated_store(1600);
    let (service, metrics) = service_for(Arc::clone(&store), Arc::clone(&store), settings());

    let report = service.tag_untagged_posts(None).await.unwrap();

    assert_eq!(report.scanned, 1600);
    assert_eq!(report.tagged, 1200);
    assert_eq!(report.unclassified, 400);
    assert_eq!(report.pages, 80);
    assert_eq!(store.committed_batches(), vec![500, 500, 200]);
    assert_eq!(report.per_category.get("Phim ảnh"), Some(&400));
    assert_eq!(report.per_category.get("Âm nhạc"), Some(&400));
    assert_eq!(report.per_category.get("Công nghệ"), Some(&400));
    assert!((metrics.tags_written.get() - 1200.0).abs() < f64::EPSILON);
    assert!((metrics.write_chunks_committed.get() - 3.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn sink_limit_below_configured_chunk_size_wins() {
    let store = Arc::new(
        InMemoryPostStore::new(
            (0..10)
                .map(|i| PostRecord::new(format!("post-{i:05}"), Some(CAPTIONS[0])))
                .collect(),
        )
        .with_max_batch_size(4),
    );
    let (service, _) = service_for(Arc::clone(&store), Arc::clone(&store), settings());

    let report = service.tag_untagged_posts(None).await.unwrap();

    assert_eq!(report.tagged, 10);
    assert_eq!(store.committed_batches(), vec![4, 4, 2]);
}

#[tokio::test]
async fn chunk_failure_keeps_earlier_chunks() {
    let store = populated_store(1600);
    store.fail_on_batch(2);
    let (service, metrics) = service_for(Arc::clone(&store), Arc::clone(&store), settings());

    let err = service.tag_untagged_posts(None).await.unwrap_err();

    match &err {
        TaggingError::ChunkWrite {
            chunk_index,
            committed,
            ..
        } => {
            assert_eq!(*chunk_index, 2);
            assert_eq!(*committed, 1000);
        }
        other => panic!("unexpected error: {other}"),
    }
    let tagged = store.posts().iter().filter(|p| p.is_tagged()).count();
    assert_eq!(tagged, 1000);
    assert!((metrics.write_chunks_failed.get() - 1.0).abs() < f64::EPSILON);
}

struct FailingSource;

#[async_trait]
impl PostSource for FailingSource {
    async fn fetch_untagged(&self, _after: Option<&str>, _limit: usize) -> Result<Vec<PostCaption>> {
        bail!("source unavailable")
    }

    async fn fetch_post(&self, _post_id: &str) -> Result<Option<PostCaption>> {
        bail!("source unavailable")
    }
}

#[tokio::test]
async fn source_failure_propagates() {
    let sink = populated_store(1);
    let (service, _) = service_for(Arc::new(FailingSource), Arc::clone(&sink), settings());

    let err = service.tag_untagged_posts(None).await.unwrap_err();
    assert!(matches!(err, TaggingError::SourceRead(_)));
    assert_eq!(err.committed(), 0);

    let err = service.reclassify_post("post-00000").await.unwrap_err();
    assert!(matches!(err, TaggingError::SourceRead(_)));
    assert_eq!(sink.total_writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn chunks_are_spaced_by_configured_delay() {
    let store = populated_store(12);
    let (service, _) = service_for(
        Arc::clone(&store),
        Arc::clone(&store),
        TaggingSettings {
            read_page_size: 4,
            write_chunk_size: 3,
            chunk_delay: Duration::from_millis(100),
        },
    );

    let started = tokio::time::Instant::now();
    let report = service.tag_untagged_posts(None).await.unwrap();

    // 9 件を 3 チャンクに分けるので待機は 2 回
    assert_eq!(report.tagged, 9);
    assert_eq!(report.chunks, 3);
    assert_eq!(started.elapsed(), Duration::from_millis(200));
}
