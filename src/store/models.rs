use serde::{Deserialize, Deserializer, Serialize};

/// 保存された投稿。タグ未付与の投稿は `tags` を持たない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_caption")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl PostRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, caption: Option<&str>) -> Self {
        Self {
            id: id.into(),
            caption: caption.map(str::to_string),
            tags: None,
        }
    }

    #[must_use]
    pub fn is_tagged(&self) -> bool {
        self.tags.is_some()
    }

    #[must_use]
    pub fn to_caption(&self) -> PostCaption {
        PostCaption {
            id: self.id.clone(),
            caption: self.caption.clone(),
        }
    }
}

// ドキュメントのキャプションは型が保証されないため、文字列以外は欠損として扱う
fn lenient_caption<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

/// 分類対象として読み出した投稿。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCaption {
    pub id: String,
    pub caption: Option<String>,
}

impl PostCaption {
    #[must_use]
    pub fn new(id: impl Into<String>, caption: Option<&str>) -> Self {
        Self {
            id: id.into(),
            caption: caption.map(str::to_string),
        }
    }
}

/// 1 投稿分のタグ書き込み。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagWrite {
    pub post_id: String,
    pub tags: Vec<String>,
}
