//! カテゴリ別キーワード辞書。
//!
//! 辞書は起動時に一度だけ構築され、分類中は変更されない。既定の辞書はバイナリに
//! 埋め込まれた JSON から読み込み、運用時は同じ形式のファイルで差し替えられる。
use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::category::{Category, UnknownCategory};
use super::matcher::PreparedKeyword;

const BUILTIN_DICTIONARY: &str = include_str!("default_dictionary.json");

/// キーワードの重要度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Secondary,
    Brand,
}

/// キーワードの言語。ブランド語は言語を持たない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Vi,
    En,
}

/// ティア重みと信頼度の正規化定数。
///
/// `confidence_scale` は各ティア重みと最小信頼度の閾値に連動して経験的に決めた値であり、
/// 変更する場合は閾値の意味も合わせて見直す必要がある。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub primary_weight: f32,
    pub secondary_weight: f32,
    pub brand_weight: f32,
    pub exact_match_score: f32,
    pub confidence_scale: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            primary_weight: 10.0,
            secondary_weight: 5.0,
            brand_weight: 8.0,
            exact_match_score: 1.5,
            confidence_scale: 100.0,
        }
    }
}

impl ScoringWeights {
    #[must_use]
    pub fn tier_weight(&self, tier: Tier) -> f32 {
        match tier {
            Tier::Primary => self.primary_weight,
            Tier::Secondary => self.secondary_weight,
            Tier::Brand => self.brand_weight,
        }
    }
}

/// 言語別のキーワードリスト（ファイル表現）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageKeywords {
    pub vi: Vec<String>,
    pub en: Vec<String>,
}

/// 1 カテゴリ分のファイル表現。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category: String,
    #[serde(default = "default_category_weight")]
    pub weight: f32,
    #[serde(default)]
    pub primary: LanguageKeywords,
    #[serde(default)]
    pub secondary: LanguageKeywords,
    #[serde(default)]
    pub brand: Vec<String>,
}

fn default_category_weight() -> f32 {
    1.0
}

/// 辞書ファイル全体。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DictionaryFile {
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read dictionary file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse dictionary: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
    #[error("category {0} is defined more than once")]
    DuplicateCategory(Category),
    #[error("category {category} has invalid weight {weight}")]
    InvalidWeight { category: Category, weight: f32 },
    #[error("invalid scoring weight {name}: {value}")]
    InvalidScoring { name: &'static str, value: f32 },
    #[error("keyword {keyword:?} in category {category} is empty after normalization")]
    EmptyKeyword { category: Category, keyword: String },
}

/// 正規化済みのキーワード群。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    vi: Vec<PreparedKeyword>,
    en: Vec<PreparedKeyword>,
}

impl KeywordSet {
    #[must_use]
    pub fn for_language(&self, language: Language) -> &[PreparedKeyword] {
        match language {
            Language::Vi => &self.vi,
            Language::En => &self.en,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vi.len() + self.en.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// カテゴリ 1 つ分のキーワードと重み。
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryProfile {
    category: Category,
    weight: f32,
    primary: KeywordSet,
    secondary: KeywordSet,
    brand: Vec<PreparedKeyword>,
}

impl CategoryProfile {
    /// キーワードを持たない（決して一致しない）プロファイル。
    #[must_use]
    pub fn empty(category: Category) -> Self {
        Self {
            category,
            weight: 1.0,
            primary: KeywordSet::default(),
            secondary: KeywordSet::default(),
            brand: Vec::new(),
        }
    }

    fn from_entry(category: Category, entry: &CategoryEntry) -> Result<Self, DictionaryError> {
        if !entry.weight.is_finite() || entry.weight < 0.0 {
            return Err(DictionaryError::InvalidWeight {
                category,
                weight: entry.weight,
            });
        }
        let prepare = |phrases: &[String]| -> Result<Vec<PreparedKeyword>, DictionaryError> {
            phrases
                .iter()
                .map(|phrase| {
                    let keyword = PreparedKeyword::new(phrase);
                    if keyword.is_empty() {
                        Err(DictionaryError::EmptyKeyword {
                            category,
                            keyword: phrase.clone(),
                        })
                    } else {
                        Ok(keyword)
                    }
                })
                .collect()
        };

        Ok(Self {
            category,
            weight: entry.weight,
            primary: KeywordSet {
                vi: prepare(&entry.primary.vi)?,
                en: prepare(&entry.primary.en)?,
            },
            secondary: KeywordSet {
                vi: prepare(&entry.secondary.vi)?,
                en: prepare(&entry.secondary.en)?,
            },
            brand: prepare(&entry.brand)?,
        })
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    #[must_use]
    pub fn primary(&self) -> &KeywordSet {
        &self.primary
    }

    #[must_use]
    pub fn secondary(&self) -> &KeywordSet {
        &self.secondary
    }

    #[must_use]
    pub fn brand(&self) -> &[PreparedKeyword] {
        &self.brand
    }

    #[must_use]
    pub fn keyword_count(&self) -> usize {
        self.primary.len() + self.secondary.len() + self.brand.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keyword_count() == 0
    }
}

/// 全カテゴリのプロファイルとスコア重み。`Category::ALL` の順で保持する。
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordDictionary {
    scoring: ScoringWeights,
    profiles: Vec<CategoryProfile>,
}

impl KeywordDictionary {
    /// 埋め込み済みの既定辞書。
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_DICTIONARY).expect("builtin dictionary is valid")
    }

    /// ファイル表現から辞書を構築し、検証する。
    ///
    /// # Errors
    /// 未知のカテゴリ、重複定義、不正な重み、正規化後に空となるキーワードを含む場合。
    pub fn from_file(file: &DictionaryFile) -> Result<Self, DictionaryError> {
        validate_scoring(&file.scoring)?;

        let mut seen = HashSet::new();
        let mut defined = Vec::with_capacity(file.categories.len());
        for entry in &file.categories {
            let category: Category = entry.category.parse()?;
            if !seen.insert(category) {
                return Err(DictionaryError::DuplicateCategory(category));
            }
            defined.push(CategoryProfile::from_entry(category, entry)?);
        }

        let profiles = Category::ALL
            .into_iter()
            .map(|category| {
                defined
                    .iter()
                    .find(|profile| profile.category == category)
                    .cloned()
                    .unwrap_or_else(|| CategoryProfile::empty(category))
            })
            .collect();

        Ok(Self {
            scoring: file.scoring,
            profiles,
        })
    }

    /// # Errors
    /// JSON として不正な場合、または [`KeywordDictionary::from_file`] の検証に失敗した場合。
    pub fn from_json_str(raw: &str) -> Result<Self, DictionaryError> {
        let file: DictionaryFile = serde_json::from_str(raw)?;
        Self::from_file(&file)
    }

    /// # Errors
    /// ファイルを読めない場合、または内容が不正な場合。
    pub fn from_path(path: &Path) -> Result<Self, DictionaryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DictionaryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    #[must_use]
    pub fn scoring(&self) -> &ScoringWeights {
        &self.scoring
    }

    #[must_use]
    pub fn profiles(&self) -> &[CategoryProfile] {
        &self.profiles
    }

    #[must_use]
    pub fn profile(&self, category: Category) -> Option<&CategoryProfile> {
        self.profiles
            .iter()
            .find(|profile| profile.category == category)
    }

    /// キーワードを 1 つ以上持つカテゴリ。
    pub fn populated_categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.profiles
            .iter()
            .filter(|profile| !profile.is_empty())
            .map(CategoryProfile::category)
    }
}

fn validate_scoring(scoring: &ScoringWeights) -> Result<(), DictionaryError> {
    let checks = [
        ("primary_weight", scoring.primary_weight),
        ("secondary_weight", scoring.secondary_weight),
        ("brand_weight", scoring.brand_weight),
        ("exact_match_score", scoring.exact_match_score),
    ];
    for (name, value) in checks {
        if !value.is_finite() || value < 0.0 {
            return Err(DictionaryError::InvalidScoring { name, value });
        }
    }
    if !scoring.confidence_scale.is_finite() || scoring.confidence_scale <= 0.0 {
        return Err(DictionaryError::InvalidScoring {
            name: "confidence_scale",
            value: scoring.confidence_scale,
        });
    }
    Ok(())
}
