//! Musical work (bibliographic record) model.
//!
//! A [`WorkDraft`] is the full cataloger submission: the single-valued fields
//! plus every repeatable MARC group. It is both the create/update payload and the
//! `record` part of a stored [`Work`]; persistence spreads it over the `works` table
//! and one child table per repeatable group.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::authority::AuthorityRef;
use super::enums::{
    AccessRelationship, BibliographicLevel, IdentifierKind, LinkKind, NoteKind, RecordType,
};

/// 245 title statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct TitleStatement {
    /// $a title proper
    #[serde(default)]
    #[validate(length(max = 1000, message = "Title must be at most 1000 characters"))]
    pub title: String,
    /// $b remainder of title
    pub remainder: Option<String>,
    /// $c statement of responsibility
    pub responsibility: Option<String>,
    /// $n number of part
    pub part_number: Option<String>,
    /// $p name of part
    pub part_name: Option<String>,
}

/// 130 uniform title as main entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UniformTitleEntry {
    /// $a, deduplicated through the uniform title authority
    pub title: AuthorityRef,
    /// $m medium of performance
    pub medium: Option<String>,
    /// $n number of part / opus
    pub number: Option<String>,
    /// $r key
    pub key: Option<String>,
    /// $o arranged statement
    pub arranged: Option<String>,
}

/// Name entry (100 / 700 / 710) with its relator term ($e)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AgentEntry {
    pub authority: AuthorityRef,
    pub relator: Option<String>,
}

/// 264 production / publication statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Publication {
    pub place: Option<String>,
    pub publisher: Option<String>,
    pub date: Option<String>,
}

/// 300 physical description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PhysicalDescription {
    pub extent: Option<String>,
    pub other_details: Option<String>,
    pub dimensions: Option<String>,
}

/// 020 / 024 / 028 identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
    /// $q qualifying information
    pub qualifier: Option<String>,
    /// 028 $b source (publisher)
    pub publisher: Option<String>,
}

/// 031 musical incipit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Incipit {
    /// $a number of work
    pub work_number: Option<String>,
    /// $b number of movement
    pub movement_number: Option<String>,
    /// $c number of excerpt
    pub excerpt_number: Option<String>,
    /// $d caption or heading
    pub caption: Option<String>,
    /// $g clef
    pub clef: Option<String>,
    /// $n key signature
    pub key_signature: Option<String>,
    /// $o time signature
    pub time_signature: Option<String>,
    /// $p musical notation (Plaine & Easie)
    pub notation: Option<String>,
    /// $t text incipit
    pub text_incipit: Option<String>,
}

/// One instrument, voice or ensemble inside a 382 field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PerformancePart {
    /// $a medium of performance (or $b when soloist)
    pub instrument: String,
    /// $n number of performers of the same medium
    #[serde(default = "default_count")]
    pub count: i32,
    #[serde(default)]
    pub soloist: bool,
}

fn default_count() -> i32 {
    1
}

/// 382 medium of performance: a repeatable field with repeatable parts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PerformanceMedium {
    #[serde(default)]
    pub parts: Vec<PerformancePart>,
    /// $s total number of performers
    pub total_performers: Option<i32>,
    /// $v note
    pub note: Option<String>,
}

/// 490 series statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SeriesStatement {
    pub statement: String,
    pub volume: Option<String>,
}

/// 500 / 505 / 590 note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Note {
    pub kind: NoteKind,
    pub text: String,
}

/// 773 / 774 / 787 linking entry.
///
/// A linked entry carries `target_id`; a textual entry only describes the related
/// item by `title` and/or `control_number`. For linked entries the title and control
/// number are snapshots refreshed from the target on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkLink {
    pub kind: LinkKind,
    #[serde(default)]
    pub target_id: Option<i32>,
    /// $t
    #[serde(default)]
    pub title: Option<String>,
    /// $w
    #[serde(default)]
    pub control_number: Option<String>,
    /// $g related parts (e.g. "No. 3")
    #[serde(default)]
    pub related_parts: Option<String>,
    /// $i relationship information (787)
    #[serde(default)]
    pub relationship: Option<String>,
}

impl WorkLink {
    pub fn linked(kind: LinkKind, target_id: i32) -> Self {
        Self {
            kind,
            target_id: Some(target_id),
            title: None,
            control_number: None,
            related_parts: None,
            relationship: None,
        }
    }
}

/// 852 location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Location {
    /// $a institution code
    pub institution: String,
    /// $b sublocation or collection
    pub sublocation: Option<String>,
    /// $h shelfmark
    pub shelfmark: Option<String>,
    /// $z public note
    pub note: Option<String>,
}

/// 856 electronic location and access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ElectronicAccess {
    pub url: String,
    /// $y
    pub link_text: Option<String>,
    /// $z
    pub note: Option<String>,
    #[serde(default)]
    pub relationship: AccessRelationship,
}

/// Complete cataloger submission for a work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct WorkDraft {
    pub record_type: RecordType,
    pub bibliographic_level: BibliographicLevel,
    /// 100 composer (principal access point)
    #[serde(default)]
    pub composer: Option<AgentEntry>,
    /// 130 uniform title (principal access point)
    #[serde(default)]
    pub uniform_title: Option<UniformTitleEntry>,
    #[validate(nested)]
    pub title: TitleStatement,
    /// 250 $a
    #[serde(default)]
    pub edition: Option<String>,
    #[serde(default)]
    pub publication: Option<Publication>,
    #[serde(default)]
    pub physical_description: Option<PhysicalDescription>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub incipits: Vec<Incipit>,
    /// 041 $a language codes
    #[serde(default)]
    pub languages: Vec<String>,
    /// 044 $a country codes
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub performance_media: Vec<PerformanceMedium>,
    #[serde(default)]
    pub series: Vec<SeriesStatement>,
    #[serde(default)]
    #[validate(length(max = 200, message = "At most 200 notes are allowed"))]
    pub notes: Vec<Note>,
    /// 650 subject headings
    #[serde(default)]
    pub subjects: Vec<AuthorityRef>,
    /// 655 musical forms / genres
    #[serde(default)]
    pub forms: Vec<AuthorityRef>,
    /// 700 added personal names
    #[serde(default)]
    pub added_persons: Vec<AgentEntry>,
    /// 710 added corporate names
    #[serde(default)]
    pub added_corporate_bodies: Vec<AgentEntry>,
    #[serde(default)]
    pub links: Vec<WorkLink>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub electronic_access: Vec<ElectronicAccess>,
}

impl WorkDraft {
    /// Minimal draft, mainly useful to build records programmatically
    pub fn new(record_type: RecordType, bibliographic_level: BibliographicLevel, title: &str) -> Self {
        Self {
            record_type,
            bibliographic_level,
            composer: None,
            uniform_title: None,
            title: TitleStatement {
                title: title.to_string(),
                ..Default::default()
            },
            edition: None,
            publication: None,
            physical_description: None,
            identifiers: Vec::new(),
            incipits: Vec::new(),
            languages: Vec::new(),
            countries: Vec::new(),
            performance_media: Vec::new(),
            series: Vec::new(),
            notes: Vec::new(),
            subjects: Vec::new(),
            forms: Vec::new(),
            added_persons: Vec::new(),
            added_corporate_bodies: Vec::new(),
            links: Vec::new(),
            locations: Vec::new(),
            electronic_access: Vec::new(),
        }
    }

    pub fn links_of(&self, kind: LinkKind) -> impl Iterator<Item = &WorkLink> {
        self.links.iter().filter(move |l| l.kind == kind)
    }

    /// Ids of every record this draft links to, deduplicated
    pub fn linked_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.links.iter().filter_map(|l| l.target_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Stored work: generated identity plus the catalogued record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Work {
    pub id: i32,
    /// 001, assigned once at creation
    pub control_number: String,
    /// Home shelfmark, assigned once at creation
    pub signature: String,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub record: WorkDraft,
}

impl Work {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Row of the `works` table
#[derive(Debug, Clone, FromRow)]
pub struct WorkRow {
    pub id: i32,
    pub control_number: String,
    pub signature: String,
    pub record_type: RecordType,
    pub bibliographic_level: BibliographicLevel,
    pub composer_id: Option<i32>,
    pub composer_relator: Option<String>,
    pub uniform_title_id: Option<i32>,
    pub uniform_title_medium: Option<String>,
    pub uniform_title_number: Option<String>,
    pub uniform_title_key: Option<String>,
    pub uniform_title_arranged: Option<String>,
    pub title: String,
    pub title_remainder: Option<String>,
    pub responsibility: Option<String>,
    pub part_number: Option<String>,
    pub part_name: Option<String>,
    pub edition: Option<String>,
    pub publication_place: Option<String>,
    pub publisher: Option<String>,
    pub publication_date: Option<String>,
    pub extent: Option<String>,
    pub other_physical_details: Option<String>,
    pub dimensions: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Short work representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkSummary {
    pub id: i32,
    pub control_number: String,
    pub signature: String,
    pub record_type: RecordType,
    pub bibliographic_level: BibliographicLevel,
    pub title: String,
    pub composer: Option<String>,
    pub uniform_title: Option<String>,
    pub publication_date: Option<String>,
    pub scan_count: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// What the validator needs to know about a linked record
#[derive(Debug, Clone, FromRow)]
pub struct LinkTarget {
    pub id: i32,
    pub control_number: String,
    pub title: String,
    pub bibliographic_level: BibliographicLevel,
    pub active: bool,
    /// Target of the record's linked 773, if any
    pub host_id: Option<i32>,
    /// Number of 774 entries (linked or textual)
    pub constituent_count: i64,
}

/// Work search parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct WorkQuery {
    /// Free text over title, composer, uniform title, signature and control number
    pub q: Option<String>,
    pub composer: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub form: Option<String>,
    pub record_type: Option<RecordType>,
    pub bibliographic_level: Option<BibliographicLevel>,
    /// Include soft-deleted works (catalogers only)
    pub include_deleted: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl WorkQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 200)
    }
}
