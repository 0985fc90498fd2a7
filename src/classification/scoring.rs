//! カテゴリ単位のスコア計算。
use serde::Serialize;

use super::category::Category;
use super::dictionary::{CategoryProfile, Language, ScoringWeights, Tier};
use super::matcher::{KeywordMatcher, Match, PreparedKeyword};
use super::normalizer::normalize;

/// スコアに寄与した一致。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieredMatch {
    pub tier: Tier,
    pub language: Option<Language>,
    #[serde(flatten)]
    pub matched: Match,
}

/// 1 カテゴリ分の採点結果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    pub category: Category,
    /// カテゴリ重み適用後の生スコア。
    pub score: f32,
    /// `[0, 1]` に丸めた信頼度。
    pub confidence: f32,
    pub matches: Vec<TieredMatch>,
}

impl CategoryScore {
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.score.is_finite() && self.confidence.is_finite()
    }
}

/// ティア重みとカテゴリ重みで一致を集計する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorer {
    matcher: KeywordMatcher,
    weights: ScoringWeights,
}

impl Scorer {
    #[must_use]
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            matcher: KeywordMatcher::new(weights.exact_match_score),
            weights,
        }
    }

    #[must_use]
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    #[must_use]
    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    /// 生キャプションを採点する。
    #[must_use]
    pub fn score_category(&self, caption: &str, profile: &CategoryProfile) -> CategoryScore {
        self.score_normalized(&normalize(caption), profile)
    }

    /// 正規化済みテキストを採点する。全カテゴリを採点する場合の正規化は 1 回で済む。
    #[must_use]
    pub fn score_normalized(&self, normalized: &str, profile: &CategoryProfile) -> CategoryScore {
        let mut matches = Vec::new();
        let mut total = 0.0_f32;

        for (tier, set) in [
            (Tier::Primary, profile.primary()),
            (Tier::Secondary, profile.secondary()),
        ] {
            for language in [Language::Vi, Language::En] {
                total += self.collect(
                    normalized,
                    set.for_language(language),
                    tier,
                    Some(language),
                    &mut matches,
                );
            }
        }
        total += self.collect(normalized, profile.brand(), Tier::Brand, None, &mut matches);

        let score = total * profile.weight();
        let confidence = (score / self.weights.confidence_scale).clamp(0.0, 1.0);

        CategoryScore {
            category: profile.category(),
            score,
            confidence,
            matches,
        }
    }

    fn collect(
        &self,
        normalized: &str,
        keywords: &[PreparedKeyword],
        tier: Tier,
        language: Option<Language>,
        sink: &mut Vec<TieredMatch>,
    ) -> f32 {
        let tier_weight = self.weights.tier_weight(tier);
        let mut subtotal = 0.0;
        for matched in self.matcher.match_prepared(normalized, keywords) {
            subtotal += matched.score * tier_weight;
            sink.push(TieredMatch {
                tier,
                language,
                matched,
            });
        }
        subtotal
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}
