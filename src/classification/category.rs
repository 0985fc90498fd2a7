//! 投稿に付与できるカテゴリの固定集合。
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 分類カテゴリ。宣言順が同点時の並び順になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sports,
    Movies,
    Music,
    Food,
    Technology,
    Travel,
    Fashion,
    Beauty,
    Health,
    Education,
    Business,
    Finance,
    Gaming,
    Art,
    Photography,
    Pets,
    Family,
    News,
    Lifestyle,
}

impl Category {
    /// 反復順序を固定した全カテゴリ。
    pub const ALL: [Category; 19] = [
        Category::Sports,
        Category::Movies,
        Category::Music,
        Category::Food,
        Category::Technology,
        Category::Travel,
        Category::Fashion,
        Category::Beauty,
        Category::Health,
        Category::Education,
        Category::Business,
        Category::Finance,
        Category::Gaming,
        Category::Art,
        Category::Photography,
        Category::Pets,
        Category::Family,
        Category::News,
        Category::Lifestyle,
    ];

    /// 投稿に保存されるタグ名。
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Category::Sports => "Thể thao",
            Category::Movies => "Phim ảnh",
            Category::Music => "Âm nhạc",
            Category::Food => "Ăn uống",
            Category::Technology => "Công nghệ",
            Category::Travel => "Du lịch",
            Category::Fashion => "Thời trang",
            Category::Beauty => "Làm đẹp",
            Category::Health => "Sức khỏe",
            Category::Education => "Giáo dục",
            Category::Business => "Kinh doanh",
            Category::Finance => "Tài chính",
            Category::Gaming => "Trò chơi",
            Category::Art => "Nghệ thuật",
            Category::Photography => "Nhiếp ảnh",
            Category::Pets => "Thú cưng",
            Category::Family => "Gia đình",
            Category::News => "Tin tức",
            Category::Lifestyle => "Đời sống",
        }
    }

    /// 設定ファイルで使う識別子。
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Category::Sports => "sports",
            Category::Movies => "movies",
            Category::Music => "music",
            Category::Food => "food",
            Category::Technology => "technology",
            Category::Travel => "travel",
            Category::Fashion => "fashion",
            Category::Beauty => "beauty",
            Category::Health => "health",
            Category::Education => "education",
            Category::Business => "business",
            Category::Finance => "finance",
            Category::Gaming => "gaming",
            Category::Art => "art",
            Category::Photography => "photography",
            Category::Pets => "pets",
            Category::Family => "family",
            Category::News => "news",
            Category::Lifestyle => "lifestyle",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.label() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 未知のカテゴリ識別子。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// slug とタグ名のどちらも受け付ける。
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|category| {
                category.slug().eq_ignore_ascii_case(trimmed) || category.label() == trimmed
            })
            .ok_or_else(|| UnknownCategory(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_categories_are_distinct() {
        let labels: HashSet<_> = Category::ALL.iter().map(|c| c.label()).collect();
        let slugs: HashSet<_> = Category::ALL.iter().map(|c| c.slug()).collect();
        assert_eq!(labels.len(), 19);
        assert_eq!(slugs.len(), 19);
    }

    #[test]
    fn parses_slug_and_label() {
        assert_eq!("sports".parse::<Category>(), Ok(Category::Sports));
        assert_eq!("Technology".parse::<Category>(), Ok(Category::Technology));
        assert_eq!("Ăn uống".parse::<Category>(), Ok(Category::Food));
        assert!("weather".parse::<Category>().is_err());
    }

    #[test]
    fn serde_uses_slug() {
        let json = serde_json::to_string(&Category::Movies).unwrap();
        assert_eq!(json, "\"movies\"");
        let parsed: Category = serde_json::from_str("\"music\"").unwrap();
        assert_eq!(parsed, Category::Music);
    }
}
