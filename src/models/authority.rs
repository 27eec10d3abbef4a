//! Authority records (persons, corporate bodies, uniform titles, musical forms, subjects)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use unicode_normalization::UnicodeNormalization;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::AuthorityKind;

/// A deduplicated authority heading.
///
/// `heading` is the name (person, corporate body), title (uniform title) or term
/// (musical form, subject). `qualifier` holds the dates of a person or the
/// subordinate unit of a corporate body.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Authority {
    pub id: i32,
    pub heading: String,
    pub qualifier: Option<String>,
    pub key: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Reference to an authority from a work: either an existing id or a heading
/// that is looked up by key and created when missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuthorityRef {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub qualifier: Option<String>,
}

impl AuthorityRef {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.heading.as_deref().map_or(true, |h| h.trim().is_empty())
    }

    pub fn from_authority(a: &Authority) -> Self {
        Self {
            id: Some(a.id),
            heading: Some(a.heading.clone()),
            qualifier: a.qualifier.clone(),
        }
    }
}

/// Create or rename an authority
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AuthorityInput {
    #[validate(length(min = 1, max = 500, message = "Heading must be 1-500 characters"))]
    pub heading: String,
    #[validate(length(max = 200, message = "Qualifier must be at most 200 characters"))]
    pub qualifier: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct AuthorityQuery {
    /// Prefix or substring of the heading
    pub q: Option<String>,
    pub limit: Option<i64>,
}

/// Usage of an authority by works
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorityUsage {
    pub kind: AuthorityKind,
    pub authority: Authority,
    pub work_ids: Vec<i32>,
}

/// Builds the deduplication key of a heading.
///
/// Lowercases, strips diacritics (NFD, combining marks dropped) and collapses any run of
/// non-alphanumeric characters into a single `_`. The qualifier participates so that two
/// composers with the same name but different dates stay distinct.
pub fn authority_key(heading: &str, qualifier: Option<&str>) -> String {
    let mut raw = heading.trim().to_string();
    if let Some(q) = qualifier.map(str::trim).filter(|q| !q.is_empty()) {
        raw.push(' ');
        raw.push_str(q);
    }

    let mut key = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    key
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strips_diacritics_and_punctuation() {
        assert_eq!(authority_key("Dvořák, Antonín", Some("1841-1904")), "dvorak_antonin_1841_1904");
        assert_eq!(authority_key("  Händel, Georg Friedrich ", None), "handel_georg_friedrich");
    }

    #[test]
    fn test_key_equal_for_spelling_variants() {
        assert_eq!(authority_key("Sonatas", None), authority_key("sonatas.", None));
        assert_eq!(authority_key("Janáček, Leoš", None), authority_key("Janacek,  Leos", None));
    }

    #[test]
    fn test_key_ignores_blank_qualifier() {
        assert_eq!(authority_key("Bach", Some("  ")), "bach");
    }

    #[test]
    fn test_empty_ref() {
        assert!(AuthorityRef::default().is_empty());
        assert!(AuthorityRef { heading: Some(" ".into()), ..Default::default() }.is_empty());
        assert!(!AuthorityRef { id: Some(3), ..Default::default() }.is_empty());
    }
}
