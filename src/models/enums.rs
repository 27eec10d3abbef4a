//! Shared domain enums.
//!
//! All of them are persisted as TEXT columns using their snake_case slug.

use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};
use utoipa::ToSchema;

/// Implements slug conversions and TEXT (de)serialization for SQLx.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $slug:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $slug,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($slug => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl sqlx::Type<Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s: &str = Decode::<Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl Encode<'_, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as Encode<Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Leader values
// ---------------------------------------------------------------------------

/// Type of record (Leader/06). Only notated music is catalogued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Printed music
    Printed,
    /// Manuscript music
    Manuscript,
}

text_enum!(RecordType {
    Printed => "printed",
    Manuscript => "manuscript",
});

impl RecordType {
    pub fn leader_code(&self) -> char {
        match self {
            RecordType::Printed => 'c',
            RecordType::Manuscript => 'd',
        }
    }
}

/// Bibliographic level (Leader/07)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BibliographicLevel {
    Collection,
    /// Part of a collection (component part)
    Part,
    /// Independent work (monograph)
    Independent,
}

text_enum!(BibliographicLevel {
    Collection => "collection",
    Part => "part",
    Independent => "independent",
});

impl BibliographicLevel {
    pub fn leader_code(&self) -> char {
        match self {
            BibliographicLevel::Collection => 'c',
            BibliographicLevel::Part => 'a',
            BibliographicLevel::Independent => 'm',
        }
    }
}

// ---------------------------------------------------------------------------
// Repeatable field discriminators
// ---------------------------------------------------------------------------

/// Standard identifiers (020 / 024 / 028)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Isbn,
    Ismn,
    PublisherNumber,
}

text_enum!(IdentifierKind {
    Isbn => "isbn",
    Ismn => "ismn",
    PublisherNumber => "publisher_number",
});

impl IdentifierKind {
    pub fn tag(&self) -> &'static str {
        match self {
            IdentifierKind::Isbn => "020",
            IdentifierKind::Ismn => "024",
            IdentifierKind::PublisherNumber => "028",
        }
    }
}

/// Note fields (500 / 505 / 590)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    General,
    Contents,
    Local,
}

text_enum!(NoteKind {
    General => "general",
    Contents => "contents",
    Local => "local",
});

impl NoteKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NoteKind::General => "500",
            NoteKind::Contents => "505",
            NoteKind::Local => "590",
        }
    }
}

/// Linking entry fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// 773 host item
    Host,
    /// 774 constituent unit
    Constituent,
    /// 787 other relationship
    Related,
}

text_enum!(LinkKind {
    Host => "host",
    Constituent => "constituent",
    Related => "related",
});

impl LinkKind {
    pub fn tag(&self) -> &'static str {
        match self {
            LinkKind::Host => "773",
            LinkKind::Constituent => "774",
            LinkKind::Related => "787",
        }
    }

    /// Kind of the entry that mirrors this one in the linked record
    pub fn mirror(&self) -> Option<LinkKind> {
        match self {
            LinkKind::Host => Some(LinkKind::Constituent),
            LinkKind::Constituent => Some(LinkKind::Host),
            LinkKind::Related => None,
        }
    }
}

/// Relationship of an 856 link to the described item (second indicator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessRelationship {
    #[default]
    Resource,
    Version,
    Related,
}

text_enum!(AccessRelationship {
    Resource => "resource",
    Version => "version",
    Related => "related",
});

impl AccessRelationship {
    pub fn indicator(&self) -> char {
        match self {
            AccessRelationship::Resource => '0',
            AccessRelationship::Version => '1',
            AccessRelationship::Related => '2',
        }
    }
}

// ---------------------------------------------------------------------------
// Authorities
// ---------------------------------------------------------------------------

/// Authority vocabularies shared across works
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityKind {
    Person,
    CorporateBody,
    UniformTitle,
    MusicalForm,
    Subject,
}

text_enum!(AuthorityKind {
    Person => "person",
    CorporateBody => "corporate_body",
    UniformTitle => "uniform_title",
    MusicalForm => "musical_form",
    Subject => "subject",
});

impl AuthorityKind {
    /// Backing table. Never built from user input.
    pub fn table(&self) -> &'static str {
        match self {
            AuthorityKind::Person => "persons",
            AuthorityKind::CorporateBody => "corporate_bodies",
            AuthorityKind::UniformTitle => "uniform_titles",
            AuthorityKind::MusicalForm => "musical_forms",
            AuthorityKind::Subject => "subject_terms",
        }
    }

    /// Path segment used by the API (`/authorities/{slug}`)
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "persons" => Some(AuthorityKind::Person),
            "corporate-bodies" => Some(AuthorityKind::CorporateBody),
            "uniform-titles" => Some(AuthorityKind::UniformTitle),
            "musical-forms" => Some(AuthorityKind::MusicalForm),
            "subjects" => Some(AuthorityKind::Subject),
            _ => None,
        }
    }

    /// Whether the qualifier column is meaningful for this vocabulary
    pub fn has_qualifier(&self) -> bool {
        matches!(self, AuthorityKind::Person | AuthorityKind::CorporateBody)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Cataloger,
    Admin,
}

text_enum!(UserRole {
    Cataloger => "cataloger",
    Admin => "admin",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leader_codes() {
        assert_eq!(RecordType::Printed.leader_code(), 'c');
        assert_eq!(RecordType::Manuscript.leader_code(), 'd');
        assert_eq!(BibliographicLevel::Collection.leader_code(), 'c');
        assert_eq!(BibliographicLevel::Part.leader_code(), 'a');
        assert_eq!(BibliographicLevel::Independent.leader_code(), 'm');
    }

    #[test]
    fn test_slug_parsing() {
        assert_eq!("manuscript".parse::<RecordType>(), Ok(RecordType::Manuscript));
        assert_eq!("part".parse::<BibliographicLevel>(), Ok(BibliographicLevel::Part));
        assert!("monograph".parse::<BibliographicLevel>().is_err());
        assert_eq!(AuthorityKind::from_slug("musical-forms"), Some(AuthorityKind::MusicalForm));
        assert_eq!(AuthorityKind::from_slug("composers"), None);
    }

    #[test]
    fn test_link_mirrors() {
        assert_eq!(LinkKind::Host.mirror(), Some(LinkKind::Constituent));
        assert_eq!(LinkKind::Constituent.mirror(), Some(LinkKind::Host));
        assert_eq!(LinkKind::Related.mirror(), None);
        assert_eq!(LinkKind::Constituent.tag(), "774");
    }
}
