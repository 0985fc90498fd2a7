//! キャプションとキーワードの正規化。
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// 照合前に取り除くストップワード（英語・ベトナム語）。
pub const STOP_WORDS: &[&str] = &[
    // 英語
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "a", "an", "is",
    "are", "was", "were", // ベトナム語
    "và", "với", "của", "tại", "trong", "trên",
];

static STOP_WORD_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STOP_WORDS.iter().copied().collect());

// 文字・数字・結合記号・アンダースコア・空白以外はすべて区切りとして扱う
static NON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\p{M}_\s]+").expect("compile non-word pattern"));

/// テキストを照合用の正規形に変換する。
///
/// 小文字化 → NFC 合成 → 記号の空白化 → 空白の圧縮 → ストップワード除去の順に処理する。
/// ベトナム語の声調記号は保持される。何度適用しても結果は変わらない。
#[must_use]
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let lowered: String = text.to_lowercase().nfc().collect();
    let spaced = NON_WORD_RE.replace_all(&lowered, " ");
    spaced
        .split_whitespace()
        .filter(|word| !STOP_WORD_SET.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 欠損している可能性のあるキャプションを正規化する。
#[must_use]
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// 型の保証されないドキュメントフィールドを正規化する。文字列以外は空文字列になる。
#[must_use]
pub fn normalize_value(value: &serde_json::Value) -> String {
    normalize_opt(value.as_str())
}

/// 部分一致判定で使う語長（Unicode スカラー値の数）。
#[must_use]
pub(crate) fn word_len(word: &str) -> usize {
    word.chars().count()
}
