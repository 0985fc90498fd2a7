//! プロセス内で完結する投稿ストア。CLI とテストで使う。
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::models::{PostCaption, PostRecord, TagWrite};
use super::traits::{PostSource, TagSink};

#[derive(Debug, Default)]
struct WriteLog {
    single_writes: usize,
    batch_sizes: Vec<usize>,
    fail_on_batch: Option<usize>,
}

/// ID 順に投稿を保持するインメモリストア。
#[derive(Debug)]
pub struct InMemoryPostStore {
    posts: RwLock<BTreeMap<String, PostRecord>>,
    log: Mutex<WriteLog>,
    max_batch_size: usize,
}

impl Default for InMemoryPostStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryPostStore {
    #[must_use]
    pub fn new(posts: Vec<PostRecord>) -> Self {
        Self {
            posts: RwLock::new(posts.into_iter().map(|p| (p.id.clone(), p)).collect()),
            log: Mutex::new(WriteLog::default()),
            max_batch_size: 500,
        }
    }

    /// `write_many` の上限件数を変更する。
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// `index` 番目（0 始まり）の `write_many` を失敗させる。
    pub fn fail_on_batch(&self, index: usize) {
        self.log.lock().fail_on_batch = Some(index);
    }

    /// JSON 配列ファイルから投稿を読み込む。
    ///
    /// # Errors
    /// ファイルを読めない場合、または JSON として不正な場合。
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read posts from {}", path.display()))?;
        let posts: Vec<PostRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse posts in {}", path.display()))?;
        Ok(Self::new(posts))
    }

    /// 全投稿を ID 順に返す。
    #[must_use]
    pub fn posts(&self) -> Vec<PostRecord> {
        self.posts.read().values().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, post_id: &str) -> Option<PostRecord> {
        self.posts.read().get(post_id).cloned()
    }

    #[must_use]
    pub fn tags_of(&self, post_id: &str) -> Option<Vec<String>> {
        self.posts.read().get(post_id).and_then(|p| p.tags.clone())
    }

    /// これまでに成功した `write_many` の件数列。
    #[must_use]
    pub fn committed_batches(&self) -> Vec<usize> {
        self.log.lock().batch_sizes.clone()
    }

    #[must_use]
    pub fn single_writes(&self) -> usize {
        self.log.lock().single_writes
    }

    /// 単発・一括を合わせた書き込み回数。
    #[must_use]
    pub fn total_writes(&self) -> usize {
        let log = self.log.lock();
        log.single_writes + log.batch_sizes.len()
    }
}

#[async_trait]
impl PostSource for InMemoryPostStore {
    async fn fetch_untagged(&self, after: Option<&str>, limit: usize) -> Result<Vec<PostCaption>> {
        let posts = self.posts.read();
        Ok(posts
            .values()
            .filter(|post| after.is_none_or(|cursor| post.id.as_str() > cursor))
            .filter(|post| !post.is_tagged())
            .take(limit)
            .map(PostRecord::to_caption)
            .collect())
    }

    async fn fetch_post(&self, post_id: &str) -> Result<Option<PostCaption>> {
        Ok(self.posts.read().get(post_id).map(PostRecord::to_caption))
    }
}

#[async_trait]
impl TagSink for InMemoryPostStore {
    async fn write_tags(&self, post_id: &str, tags: &[String]) -> Result<()> {
        let mut posts = self.posts.write();
        let Some(post) = posts.get_mut(post_id) else {
            bail!("post {post_id} does not exist");
        };
        post.tags = Some(tags.to_vec());
        self.log.lock().single_writes += 1;
        Ok(())
    }

    async fn write_many(&self, writes: &[TagWrite]) -> Result<()> {
        if writes.len() > self.max_batch_size {
            bail!(
                "batch of {} writes exceeds the limit of {}",
                writes.len(),
                self.max_batch_size
            );
        }

        // ロック順序は posts → log
        let mut posts = self.posts.write();
        let mut log = self.log.lock();
        if log.fail_on_batch == Some(log.batch_sizes.len()) {
            bail!("write batch {} rejected", log.batch_sizes.len());
        }

        // 1 件でも存在しなければ何も書き込まない
        if let Some(missing) = writes.iter().find(|w| !posts.contains_key(&w.post_id)) {
            bail!("post {} does not exist", missing.post_id);
        }
        for write in writes {
            if let Some(post) = posts.get_mut(&write.post_id) {
                post.tags = Some(write.tags.clone());
            }
        }
        log.batch_sizes.push(writes.len());
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryPostStore {
        InMemoryPostStore::new(vec![
            PostRecord::new("p1", Some("bóng đá")),
            PostRecord::new("p2", None),
            PostRecord {
                id: "p3".into(),
                caption: Some("phở".into()),
                tags: Some(vec!["Ăn uống".into()]),
            },
            PostRecord::new("p4", Some("phim")),
        ])
    }

    #[tokio::test]
    async fn fetch_untagged_pages_by_cursor() {
        let store = store();
        let first = store.fetch_untagged(None, 2).await.unwrap();
        assert_eq!(
            first.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["p1", "p2"]
        );
        let second = store.fetch_untagged(Some("p2"), 2).await.unwrap();
        assert_eq!(
            second.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["p4"]
        );
    }

    #[tokio::test]
    async fn write_many_is_all_or_nothing() {
        let store = store();
        let writes = vec![
            TagWrite {
                post_id: "p1".into(),
                tags: vec!["Thể thao".into()],
            },
            TagWrite {
                post_id: "missing".into(),
                tags: vec!["Phim ảnh".into()],
            },
        ];
        assert!(store.write_many(&writes).await.is_err());
        assert_eq!(store.tags_of("p1"), None);
        assert!(store.committed_batches().is_empty());
    }

    #[tokio::test]
    async fn write_many_rejects_oversized_batch() {
        let store = store().with_max_batch_size(1);
        let writes = vec![
            TagWrite {
                post_id: "p1".into(),
                tags: vec![],
            },
            TagWrite {
                post_id: "p2".into(),
                tags: vec![],
            },
        ];
        assert!(store.write_many(&writes).await.is_err());
    }

    #[tokio::test]
    async fn injected_failure_hits_requested_batch() {
        let store = store();
        store.fail_on_batch(1);
        let write = |id: &str| {
            vec![TagWrite {
                post_id: id.into(),
                tags: vec!["x".into()],
            }]
        };
        store.write_many(&write("p1")).await.unwrap();
        assert!(store.write_many(&write("p2")).await.is_err());
        assert_eq!(store.committed_batches(), vec![1]);
    }

    #[tokio::test]
    async fn write_tags_overwrites() {
        let store = store();
        store.write_tags("p3", &["Thể thao".into()]).await.unwrap();
        store.write_tags("p3", &["Thể thao".into()]).await.unwrap();
        assert_eq!(store.tags_of("p3"), Some(vec!["Thể thao".to_string()]));
        assert_eq!(store.single_writes(), 2);
        assert!(store.write_tags("nope", &[]).await.is_err());
    }

    #[test]
    fn loads_posts_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.json");
        std::fs::write(&path, r#"[{"id":"b","caption":"x"},{"id":"a","caption":null}]"#).unwrap();
        let store = InMemoryPostStore::from_json_path(&path).unwrap();
        let ids: Vec<_> = store.posts().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
