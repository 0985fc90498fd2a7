//! 分類サービスが依存する外部ストアの境界。
use anyhow::Result;
use async_trait::async_trait;

use super::models::{PostCaption, TagWrite};

/// タグ未付与の投稿を読み出す側。
#[async_trait]
pub trait PostSource: Send + Sync {
    /// `after` より後の ID を持つタグ未付与の投稿を ID 順に最大 `limit` 件返す。
    async fn fetch_untagged(&self, after: Option<&str>, limit: usize) -> Result<Vec<PostCaption>>;

    /// ID を指定して 1 件読み出す。
    async fn fetch_post(&self, post_id: &str) -> Result<Option<PostCaption>>;
}

/// タグの書き込み先。書き込みは上書きで、同じ内容を何度書いても結果は変わらない。
#[async_trait]
pub trait TagSink: Send + Sync {
    async fn write_tags(&self, post_id: &str, tags: &[String]) -> Result<()>;

    /// 複数投稿への書き込みを 1 トランザクションとして適用する。
    async fn write_many(&self, writes: &[TagWrite]) -> Result<()>;

    /// 1 回の `write_many` で扱える最大件数。
    fn max_batch_size(&self) -> usize {
        500
    }
}
