use serde::{Deserialize, Serialize};
use std::fmt;

/// One search result row: template variable name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Entity identifiers arrive as either JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(number) => write!(f, "{number}"),
            EntityId::Text(text) => f.write_str(text),
        }
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        EntityId::Number(value.into())
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

/// Link target for a category or article.
///
/// Articles display `name`; categories display `short_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    pub url: String,
}

impl EntityRef {
    pub fn article(id: impl Into<EntityId>, name: &str, url: &str) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.to_string()),
            short_name: None,
            url: url.to_string(),
        }
    }

    pub fn category(id: impl Into<EntityId>, short_name: &str, url: &str) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
            short_name: Some(short_name.to_string()),
            url: url.to_string(),
        }
    }
}

/// Relationships of one entity at one dataset version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionPayload {
    #[serde(default)]
    pub supercategories: Vec<EntityRef>,
    #[serde(default)]
    pub subcategories: Vec<EntityRef>,
    #[serde(default)]
    pub articles: Vec<EntityRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub categories: Vec<Row>,
    #[serde(default)]
    pub articles: Vec<Row>,
}

/// Which entity page a document represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Article,
    Category,
}

impl PageKind {
    pub const ALL: [PageKind; 2] = [PageKind::Article, PageKind::Category];

    /// Path segment under `/api/`, also the container class and data key.
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Article => "article",
            PageKind::Category => "category",
        }
    }

    pub fn container_selector(&self) -> &'static str {
        match self {
            PageKind::Article => ".article[data-article]",
            PageKind::Category => ".category[data-category]",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
