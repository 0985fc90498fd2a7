//! 正規化済みテキストに対するキーワード照合。
use serde::Serialize;

use super::normalizer::{normalize, word_len};

/// 部分一致の対象となる語の最小長（この長さを超える語のみ数える）。
const MIN_SIGNIFICANT_WORD_LEN: usize = 2;

/// 一致の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Partial,
}

/// 1 キーワードと 1 テキストの照合結果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub keyword: String,
    pub kind: MatchKind,
    pub score: f32,
}

/// 正規化を済ませたキーワード。辞書構築時に一度だけ作る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedKeyword {
    phrase: String,
    normalized: String,
    words: Vec<String>,
}

impl PreparedKeyword {
    #[must_use]
    pub fn new(phrase: &str) -> Self {
        let normalized = normalize(phrase);
        let words = normalized.split(' ').map(str::to_string).collect();
        Self {
            phrase: phrase.to_string(),
            normalized,
            words,
        }
    }

    #[must_use]
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    #[must_use]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

/// 完全一致／部分一致のスコア設定を持つ照合器。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordMatcher {
    exact_score: f32,
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self { exact_score: 1.5 }
    }
}

impl KeywordMatcher {
    #[must_use]
    pub const fn new(exact_score: f32) -> Self {
        Self { exact_score }
    }

    #[must_use]
    pub const fn exact_score(&self) -> f32 {
        self.exact_score
    }

    /// 生テキストと生キーワードを照合する。両側をそれぞれ正規化してから比較する。
    #[must_use]
    pub fn find_matches<S: AsRef<str>>(&self, text: &str, keywords: &[S]) -> Vec<Match> {
        let normalized = normalize(text);
        keywords
            .iter()
            .map(|keyword| PreparedKeyword::new(keyword.as_ref()))
            .filter_map(|keyword| self.match_keyword(&normalized, &keyword))
            .collect()
    }

    /// 正規化済みテキストと準備済みキーワード列を照合する。
    #[must_use]
    pub fn match_prepared(&self, normalized_text: &str, keywords: &[PreparedKeyword]) -> Vec<Match> {
        keywords
            .iter()
            .filter_map(|keyword| self.match_keyword(normalized_text, keyword))
            .collect()
    }

    /// 完全一致を優先し、失敗した複数語キーワードのみ部分一致を試す。
    #[must_use]
    pub fn match_keyword(&self, normalized_text: &str, keyword: &PreparedKeyword) -> Option<Match> {
        // 空キーワードは全テキストの部分文字列になるため照合しない
        if keyword.is_empty() || normalized_text.is_empty() {
            return None;
        }

        if normalized_text.contains(keyword.normalized()) {
            return Some(Match {
                keyword: keyword.phrase.clone(),
                kind: MatchKind::Exact,
                score: self.exact_score,
            });
        }

        let total = keyword.word_count();
        if total < 2 {
            return None;
        }

        let matched = keyword
            .words
            .iter()
            .filter(|word| word_len(word) > MIN_SIGNIFICANT_WORD_LEN)
            .filter(|word| normalized_text.contains(word.as_str()))
            .count();
        let required = total.div_ceil(2);
        if matched == 0 || matched < required {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let ratio = matched as f32 / total as f32;
        Some(Match {
            keyword: keyword.phrase.clone(),
            kind: MatchKind::Partial,
            score: ratio,
        })
    }
}
