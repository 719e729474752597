//! Article search filters
//!
//! Callers resolve user input into these variants before searching; the
//! repository only ever sees a validated [`ArticleSearch`].

use serde::Serialize;

use super::tag::normalize_tag_name;

/// Reference to a single tag, by id or by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagRef {
    Id(i64),
    Name(String),
}

/// Tag restriction for a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagFilter {
    /// No restriction
    #[default]
    Any,
    ById(i64),
    /// Case-insensitive match on the tag name
    ByName(String),
    /// Articles must carry every listed tag
    All(Vec<TagRef>),
}

/// Author restriction for a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthorFilter {
    #[default]
    Any,
    /// Exactly this author
    User(i64),
    /// Substring of the author's handle
    Handle(String),
}

/// A malformed filter handed to the search builder
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search contract violation: {0}")]
    ContractViolation(String),
}

/// Complete search request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleSearch {
    pub query: Option<String>,
    pub tags: TagFilter,
    pub author: AuthorFilter,
}

impl ArticleSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn tags(mut self, tags: TagFilter) -> Self {
        self.tags = tags;
        self
    }

    pub fn author(mut self, author: AuthorFilter) -> Self {
        self.author = author;
        self
    }

    /// Trimmed, lower-cased free-text query, or `None` when blank
    pub fn normalized_query(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    /// Flatten the tag filter into the set of tags every result must carry.
    ///
    /// Names come back normalized; blank names and repeated refs are dropped.
    pub fn required_tags(&self) -> Result<Vec<TagRef>, SearchError> {
        let refs = match &self.tags {
            TagFilter::Any => Vec::new(),
            TagFilter::ById(id) => vec![TagRef::Id(*id)],
            TagFilter::ByName(name) => vec![TagRef::Name(name.clone())],
            TagFilter::All(refs) => refs.clone(),
        };

        let mut required = Vec::with_capacity(refs.len());
        for tag in refs {
            let tag = match tag {
                TagRef::Id(id) if id <= 0 => {
                    return Err(SearchError::ContractViolation(format!(
                        "tag id must be positive, got {}",
                        id
                    )))
                }
                TagRef::Id(id) => TagRef::Id(id),
                TagRef::Name(name) => {
                    let name = normalize_tag_name(&name);
                    if name.is_empty() {
                        continue;
                    }
                    TagRef::Name(name)
                }
            };
            if !required.contains(&tag) {
                required.push(tag);
            }
        }
        Ok(required)
    }

    /// Validated author restriction, `None` when it filters nothing
    pub fn author_restriction(&self) -> Result<Option<AuthorFilter>, SearchError> {
        match &self.author {
            AuthorFilter::Any => Ok(None),
            AuthorFilter::User(id) if *id <= 0 => Err(SearchError::ContractViolation(format!(
                "author id must be positive, got {}",
                id
            ))),
            AuthorFilter::User(id) => Ok(Some(AuthorFilter::User(*id))),
            AuthorFilter::Handle(handle) if handle.is_empty() => Ok(None),
            AuthorFilter::Handle(handle) => Ok(Some(AuthorFilter::Handle(handle.clone()))),
        }
    }

    /// Check every filter before any query runs
    pub fn validate(&self) -> Result<(), SearchError> {
        self.required_tags()?;
        self.author_restriction()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_search_has_no_restrictions() {
        let search = ArticleSearch::new();

        assert_eq!(search.normalized_query(), None);
        assert!(search.required_tags().unwrap().is_empty());
        assert_eq!(search.author_restriction().unwrap(), None);
    }

    #[test]
    fn test_blank_query_is_ignored() {
        assert_eq!(ArticleSearch::new().query("   ").normalized_query(), None);
        assert_eq!(
            ArticleSearch::new().query(" Fourier ").normalized_query(),
            Some("fourier".to_string())
        );
    }

    #[test]
    fn test_blank_tag_name_is_noop() {
        let search = ArticleSearch::new().tags(TagFilter::ByName("  ".to_string()));
        assert!(search.required_tags().unwrap().is_empty());

        let search = ArticleSearch::new().tags(TagFilter::All(Vec::new()));
        assert!(search.required_tags().unwrap().is_empty());
    }

    #[test]
    fn test_collection_names_are_normalized_and_deduplicated() {
        let search = ArticleSearch::new().tags(TagFilter::All(vec![
            TagRef::Name("Algebra".to_string()),
            TagRef::Name("algebra ".to_string()),
            TagRef::Id(3),
            TagRef::Id(3),
        ]));

        assert_eq!(
            search.required_tags().unwrap(),
            vec![TagRef::Name("algebra".to_string()), TagRef::Id(3)]
        );
    }

    #[test]
    fn test_non_positive_ids_violate_contract() {
        let search = ArticleSearch::new().tags(TagFilter::ById(0));
        assert!(matches!(
            search.validate(),
            Err(SearchError::ContractViolation(_))
        ));

        let search = ArticleSearch::new().tags(TagFilter::All(vec![TagRef::Id(-2)]));
        assert!(search.validate().is_err());

        let search = ArticleSearch::new().author(AuthorFilter::User(0));
        assert!(search.validate().is_err());
    }

    #[test]
    fn test_empty_handle_is_noop() {
        let search = ArticleSearch::new().author(AuthorFilter::Handle(String::new()));
        assert_eq!(search.author_restriction().unwrap(), None);

        let search = ArticleSearch::new().author(AuthorFilter::Handle("ad".to_string()));
        assert_eq!(
            search.author_restriction().unwrap(),
            Some(AuthorFilter::Handle("ad".to_string()))
        );
    }
}
