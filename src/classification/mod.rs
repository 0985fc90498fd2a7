//! キャプション分類のための高水準API。
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod category;
pub mod dictionary;
pub mod matcher;
pub mod normalizer;
pub mod scoring;

pub use category::Category;
pub use dictionary::{CategoryProfile, DictionaryError, KeywordDictionary, ScoringWeights};
pub use matcher::{KeywordMatcher, Match, MatchKind};
pub use normalizer::normalize;
pub use scoring::{CategoryScore, Scorer};

/// 最小信頼度の既定値。
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;
/// 1 キャプションに付与するタグ数の上限の既定値。
pub const DEFAULT_MAX_TAGS: usize = 3;

/// 分類結果 1 件。信頼度は小数第 2 位に丸められている。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tag: Category,
    pub confidence: f32,
}

impl ClassificationResult {
    /// 保存されるタグ名。
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.tag.label()
    }
}

/// 信頼度の降順に並んだ 1 件以上の分類結果。
pub type Tags = Vec<ClassificationResult>;

/// タグを付けられなかった理由。呼び出し側にとってはいずれも「タグなし」を意味する。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Unclassified {
    #[error("caption is empty")]
    EmptyCaption,
    #[error("no category reached the minimum confidence")]
    NoConfidentCategory,
    #[error("category {category} produced a non-finite score")]
    InvalidScore { category: Category },
}

/// 分類器のしきい値設定。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierSettings {
    pub min_confidence: f32,
    pub max_tags: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_tags: DEFAULT_MAX_TAGS,
        }
    }
}

/// キーワード辞書に基づく投稿分類器。
///
/// 内部状態は構築後に変化しないため、`Arc` で共有して複数スレッドから同時に呼び出せる。
#[derive(Debug, Clone)]
pub struct PostClassifier {
    dictionary: KeywordDictionary,
    scorer: Scorer,
    settings: ClassifierSettings,
}

impl PostClassifier {
    #[must_use]
    pub fn new(dictionary: KeywordDictionary, settings: ClassifierSettings) -> Self {
        let scorer = Scorer::new(*dictionary.scoring());
        Self {
            dictionary,
            scorer,
            settings,
        }
    }

    /// 埋め込み辞書と既定しきい値で構築する。
    #[must_use]
    pub fn with_builtin_dictionary() -> Self {
        Self::new(KeywordDictionary::builtin(), ClassifierSettings::default())
    }

    #[must_use]
    pub fn dictionary(&self) -> &KeywordDictionary {
        &self.dictionary
    }

    #[must_use]
    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// キャプションを分類し、信頼度上位のタグを返す。
    ///
    /// # Errors
    /// 空のキャプション、しきい値を超えるカテゴリがない場合、スコアが有限でない場合は
    /// [`Unclassified`] を返す。いずれも「タグなし」として扱えばよい。
    pub fn classify(&self, caption: &str) -> Result<Tags, Unclassified> {
        let normalized = normalize(caption);
        if normalized.is_empty() {
            return Err(Unclassified::EmptyCaption);
        }

        let mut retained: Vec<(Category, f32)> = Vec::new();
        for profile in self.dictionary.profiles() {
            let scored = self.scorer.score_normalized(&normalized, profile);
            if !scored.is_finite() {
                return Err(Unclassified::InvalidScore {
                    category: scored.category,
                });
            }
            if scored.confidence >= self.settings.min_confidence && scored.score > 0.0 {
                retained.push((scored.category, scored.confidence));
            }
        }

        // sort_by は安定ソートなので同点はカテゴリ順のまま残る
        retained.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        retained.truncate(self.settings.max_tags);

        if retained.is_empty() {
            return Err(Unclassified::NoConfidentCategory);
        }

        debug!(
            categories = retained.len(),
            top = %retained[0].0,
            "caption classified"
        );

        Ok(retained
            .into_iter()
            .map(|(tag, confidence)| ClassificationResult {
                tag,
                confidence: round_confidence(confidence),
            })
            .collect())
    }

    /// 欠損を許すキャプションを分類し、失敗は空リストとして返す。
    #[must_use]
    pub fn tags_for(&self, caption: Option<&str>) -> Vec<ClassificationResult> {
        caption
            .map(|text| self.classify(text).unwrap_or_default())
            .unwrap_or_default()
    }

    /// 全カテゴリの採点結果（診断用）。しきい値は適用しない。
    #[must_use]
    pub fn score_all(&self, caption: &str) -> Vec<CategoryScore> {
        let normalized = normalize(caption);
        self.dictionary
            .profiles()
            .iter()
            .map(|profile| self.scorer.score_normalized(&normalized, profile))
            .collect()
    }
}

impl Default for PostClassifier {
    fn default() -> Self {
        Self::with_builtin_dictionary()
    }
}

fn round_confidence(confidence: f32) -> f32 {
    ((confidence * 100.0).round() / 100.0).clamp(0.0, 1.0)
}
