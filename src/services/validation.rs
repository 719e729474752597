//! Article validation and derivation
//!
//! Every article save goes through [`prepare_article`]: text is trimmed, the
//! length, tag and view-count rules are checked, and each text field gets its
//! rendered variant. Problems are collected per field instead of stopping at
//! the first one.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::math::{render_delimited, MathRenderer};

pub const TITLE_MIN: usize = 10;
pub const TITLE_MAX: usize = 1000;
pub const SUMMARY_MAX: usize = 1500;
pub const BODY_MIN: usize = 128;
pub const MAX_TAGS: usize = 5;
/// Longest stored image or profile picture identifier
pub const REFERENCE_MAX: usize = 255;

/// Field-scoped validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors with a single message on one field
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Messages recorded for `field`
    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Move every message of `other` into `self`
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(value)` when no error was recorded
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{} {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Record an error when an external identifier does not fit its column
pub fn check_reference(errors: &mut ValidationErrors, field: &str, value: Option<&str>) {
    if value.is_some_and(|v| v.chars().count() > REFERENCE_MAX) {
        errors.add(
            field,
            format!("is too long (maximum is {} characters)", REFERENCE_MAX),
        );
    }
}

/// Article fields as submitted, before normalization
#[derive(Debug, Clone, Default)]
pub struct ArticleDraft {
    pub title: String,
    pub summary: Option<String>,
    pub body: String,
    pub tag_ids: Vec<i64>,
    pub views: i64,
}

/// Normalized article fields ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedArticle {
    pub title: String,
    pub title_rendered: Option<String>,
    pub summary: Option<String>,
    pub summary_rendered: Option<String>,
    pub body: String,
    pub body_rendered: Option<String>,
    pub tag_ids: Vec<i64>,
    pub views: i64,
}

/// Run the full save pipeline over `draft`
pub fn prepare_article(
    draft: ArticleDraft,
    renderer: &dyn MathRenderer,
) -> Result<PreparedArticle, ValidationErrors> {
    let title = draft.title.trim().to_string();
    let body = draft.body.trim().to_string();
    let summary = draft
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut errors = ValidationErrors::new();

    check_length(&mut errors, "title", &title, Some(TITLE_MIN), Some(TITLE_MAX));
    check_length(&mut errors, "body", &body, Some(BODY_MIN), None);
    if let Some(summary) = &summary {
        check_length(&mut errors, "summary", summary, None, Some(SUMMARY_MAX));
    }
    check_tags(&mut errors, &draft.tag_ids);
    if draft.views < 0 {
        errors.add("views", "must be greater than or equal to 0");
    }

    let title_rendered = render_field(&mut errors, "title", Some(&title), renderer);
    let summary_rendered = render_field(&mut errors, "summary", summary.as_deref(), renderer);
    let body_rendered = render_field(&mut errors, "body", Some(&body), renderer);

    errors.into_result(PreparedArticle {
        title,
        title_rendered,
        summary,
        summary_rendered,
        body,
        body_rendered,
        tag_ids: draft.tag_ids,
        views: draft.views,
    })
}

fn check_length(
    errors: &mut ValidationErrors,
    field: &str,
    value: &str,
    min: Option<usize>,
    max: Option<usize>,
) {
    if value.is_empty() {
        errors.add(field, "can't be blank");
        return;
    }
    let len = value.chars().count();
    if let Some(min) = min {
        if len < min {
            errors.add(
                field,
                format!("is too short (minimum is {} characters)", min),
            );
        }
    }
    if let Some(max) = max {
        if len > max {
            errors.add(field, format!("is too long (maximum is {} characters)", max));
        }
    }
}

fn check_tags(errors: &mut ValidationErrors, tag_ids: &[i64]) {
    if tag_ids.len() > MAX_TAGS {
        errors.add("tags", format!("too many tags (maximum is {})", MAX_TAGS));
    }
    let mut seen = HashSet::with_capacity(tag_ids.len());
    if !tag_ids.iter().all(|id| seen.insert(*id)) {
        errors.add("tags", "contains duplicate tags");
    }
}

fn render_field(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    renderer: &dyn MathRenderer,
) -> Option<String> {
    let value = value?;
    match render_delimited(renderer, value) {
        Ok(rendered) => rendered,
        Err(e) => {
            errors.add(field, format!("has a math syntax error: {}", e));
            None
        }
    }
}
