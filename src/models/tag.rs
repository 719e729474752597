//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A label attachable to articles. Names are stored lower-cased.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Build an unsaved tag with a normalized name
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: normalize_tag_name(name),
            created_at: Utc::now(),
        }
    }
}

/// Canonical stored form of a tag name: trimmed and lower-cased
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Tag with the number of articles carrying it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub article_count: i64,
}

impl TagWithCount {
    pub fn new(tag: Tag, article_count: i64) -> Self {
        Self { tag, article_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_new_normalizes_name() {
        let tag = Tag::new("  Linear Algebra ");

        assert_eq!(tag.id, 0);
        assert_eq!(tag.name, "linear algebra");
    }

    #[test]
    fn test_tag_with_count_flattens() {
        let tag = Tag::new("topology");
        let json = serde_json::to_value(TagWithCount::new(tag, 3)).unwrap();

        assert_eq!(json["name"], "topology");
        assert_eq!(json["article_count"], 3);
    }
}
