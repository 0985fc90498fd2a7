//! 保存済み投稿に対するバッチ分類とタグ書き込み。
pub mod tagging;
pub mod writer;

use thiserror::Error;

pub use tagging::{BackfillReport, PostClassification, TaggedPost, TaggingService, TaggingSettings};
pub use writer::{ChunkedTagWriter, WriteSummary};

/// バッチ処理の I/O エラー。分類そのものは失敗しない。
#[derive(Debug, Error)]
pub enum TaggingError {
    #[error("failed to read posts from source")]
    SourceRead(#[source] anyhow::Error),
    #[error("post {post_id} not found")]
    PostNotFound { post_id: String },
    #[error("failed to write tags for post {post_id}")]
    Write {
        post_id: String,
        #[source]
        source: anyhow::Error,
    },
    /// `committed` 件はすでに書き込み済みで、取り消されない。
    #[error("write chunk {chunk_index} failed after {committed} posts were committed")]
    ChunkWrite {
        chunk_index: usize,
        committed: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl TaggingError {
    /// 失敗前にコミットされた投稿数。チャンク書き込み以外の失敗では 0。
    #[must_use]
    pub fn committed(&self) -> usize {
        match self {
            Self::ChunkWrite { committed, .. } => *committed,
            _ => 0,
        }
    }
}
