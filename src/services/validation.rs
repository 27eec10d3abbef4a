//! MARC21 structural rules for work submissions.
//!
//! Rules common to every record run first, then the strategy selected by the
//! bibliographic level. Every violation is collected so the cataloger sees the
//! complete list in one round trip.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    error::FieldError,
    models::{
        enums::{BibliographicLevel, IdentifierKind, LinkKind, RecordType},
        work::{LinkTarget, WorkDraft, WorkLink},
    },
};

static LANGUAGE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{3}$").unwrap());
static COUNTRY_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{2,3}$").unwrap());
static WEB_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://\S+$").unwrap());

/// State of the catalog the submission is checked against
pub struct ValidationContext<'a> {
    /// Id of the record being updated (`None` on creation)
    pub work_id: Option<i32>,
    /// Links stored before this submission
    pub previous_links: &'a [WorkLink],
    /// Every record referenced by the new or previous links
    pub targets: &'a HashMap<i32, LinkTarget>,
}

impl<'a> ValidationContext<'a> {
    pub fn for_new(targets: &'a HashMap<i32, LinkTarget>) -> Self {
        Self {
            work_id: None,
            previous_links: &[],
            targets,
        }
    }
}

/// Level-specific strategy
trait LevelRules {
    fn check(&self, draft: &WorkDraft, ctx: &ValidationContext<'_>, errors: &mut Vec<FieldError>);
}

struct CollectionRules;
struct PartRules;
struct IndependentRules;

fn rules_for(level: BibliographicLevel) -> &'static dyn LevelRules {
    match level {
        BibliographicLevel::Collection => &CollectionRules,
        BibliographicLevel::Part => &PartRules,
        BibliographicLevel::Independent => &IndependentRules,
    }
}

/// Validate a submission; returns every violated rule
pub fn validate(draft: &WorkDraft, ctx: &ValidationContext<'_>) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    check_access_point(draft, &mut errors);
    check_title(draft, &mut errors);
    check_identifiers(draft, &mut errors);
    check_codes(draft, &mut errors);
    check_performance_media(draft, &mut errors);
    check_descriptive_groups(draft, &mut errors);
    check_authority_refs(draft, &mut errors);
    check_links(draft, ctx, &mut errors);
    check_host_detachment(draft, ctx, &mut errors);
    check_constituent_detachment(draft, ctx, &mut errors);

    rules_for(draft.bibliographic_level).check(draft, ctx, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ---------------------------------------------------------------------------
// Level strategies
// ---------------------------------------------------------------------------

impl LevelRules for CollectionRules {
    fn check(&self, draft: &WorkDraft, ctx: &ValidationContext<'_>, errors: &mut Vec<FieldError>) {
        if draft.links_of(LinkKind::Constituent).next().is_none() {
            errors.push(FieldError::new("774", "A collection requires at least one constituent entry"));
        }
        if draft.links_of(LinkKind::Host).next().is_some() {
            errors.push(FieldError::new("773", "A collection cannot be part of another record"));
        }

        for link in draft.links_of(LinkKind::Constituent) {
            let Some(target) = link.target_id.and_then(|id| ctx.targets.get(&id)) else {
                continue;
            };
            if target.bibliographic_level != BibliographicLevel::Part {
                errors.push(FieldError::new(
                    "774",
                    format!("{} is not catalogued as part of a collection", target.control_number),
                ));
            }
            if let Some(host_id) = target.host_id {
                if Some(host_id) != ctx.work_id {
                    errors.push(FieldError::new(
                        "774",
                        format!("{} already belongs to another collection", target.control_number),
                    ));
                }
            }
        }
    }
}

impl LevelRules for PartRules {
    fn check(&self, draft: &WorkDraft, ctx: &ValidationContext<'_>, errors: &mut Vec<FieldError>) {
        let hosts: Vec<&WorkLink> = draft.links_of(LinkKind::Host).collect();
        match hosts.len() {
            1 => {}
            0 => errors.push(FieldError::new("773", "A part requires its host collection")),
            _ => errors.push(FieldError::new("773", "A part belongs to exactly one collection")),
        }
        if draft.links_of(LinkKind::Constituent).next().is_some() {
            errors.push(FieldError::new("774", "Only collections have constituent entries"));
        }

        for link in hosts {
            if let Some(target) = link.target_id.and_then(|id| ctx.targets.get(&id)) {
                if target.bibliographic_level != BibliographicLevel::Collection {
                    errors.push(FieldError::new(
                        "773",
                        format!("{} is not catalogued as a collection", target.control_number),
                    ));
                }
            }
        }
    }
}

impl LevelRules for IndependentRules {
    fn check(&self, draft: &WorkDraft, _ctx: &ValidationContext<'_>, errors: &mut Vec<FieldError>) {
        if draft.links_of(LinkKind::Host).next().is_some() {
            errors.push(FieldError::new("773", "An independent work has no host collection"));
        }
        if draft.links_of(LinkKind::Constituent).next().is_some() {
            errors.push(FieldError::new("774", "Only collections have constituent entries"));
        }
    }
}

// ---------------------------------------------------------------------------
// Common rules
// ---------------------------------------------------------------------------

fn check_access_point(draft: &WorkDraft, errors: &mut Vec<FieldError>) {
    let has_composer = draft.composer.is_some();
    let has_uniform_title = draft.uniform_title.is_some();
    match (has_composer, has_uniform_title) {
        (true, true) => errors.push(FieldError::new(
            "100",
            "A work has either a composer (100) or a uniform title (130), not both",
        )),
        (false, false) => errors.push(FieldError::new(
            "100",
            "A composer (100) or a uniform title (130) is required",
        )),
        _ => {}
    }
}

fn check_title(draft: &WorkDraft, errors: &mut Vec<FieldError>) {
    if draft.title.title.trim().is_empty() {
        errors.push(FieldError::new("245", "Title proper ($a) is required"));
    }
}

fn check_identifiers(draft: &WorkDraft, errors: &mut Vec<FieldError>) {
    for identifier in &draft.identifiers {
        let tag = identifier.kind.tag();
        if identifier.value.trim().is_empty() {
            errors.push(FieldError::new(tag, "Identifier value is required"));
            continue;
        }
        match identifier.kind {
            IdentifierKind::Isbn | IdentifierKind::Ismn
                if draft.record_type == RecordType::Manuscript =>
            {
                errors.push(FieldError::new(tag, "Manuscripts cannot carry an ISBN or ISMN"));
            }
            IdentifierKind::Isbn if !isbn_is_valid(&identifier.value) => {
                errors.push(FieldError::new(tag, format!("Invalid ISBN: {}", identifier.value)));
            }
            IdentifierKind::Ismn if !ismn_is_valid(&identifier.value) => {
                errors.push(FieldError::new(tag, format!("Invalid ISMN: {}", identifier.value)));
            }
            _ => {}
        }
    }
}

fn check_codes(draft: &WorkDraft, errors: &mut Vec<FieldError>) {
    for code in &draft.languages {
        if !LANGUAGE_CODE.is_match(code) {
            errors.push(FieldError::new("041", format!("Invalid language code: {}", code)));
        }
    }
    for code in &draft.countries {
        if !COUNTRY_CODE.is_match(code) {
            errors.push(FieldError::new("044", format!("Invalid country code: {}", code)));
        }
    }
}

fn check_performance_media(draft: &WorkDraft, errors: &mut Vec<FieldError>) {
    for medium in &draft.performance_media {
        if medium.parts.is_empty() {
            errors.push(FieldError::new("382", "Medium of performance needs at least one instrument or voice"));
        }
        for part in &medium.parts {
            if part.instrument.trim().is_empty() {
                errors.push(FieldError::new("382", "Instrument or voice is required"));
            }
            if part.count < 1 {
                errors.push(FieldError::new("382", "Number of performers must be at least 1"));
            }
        }
        if matches!(medium.total_performers, Some(n) if n < 1) {
            errors.push(FieldError::new("382", "Total number of performers must be at least 1"));
        }
    }
}

fn check_descriptive_groups(draft: &WorkDraft, errors: &mut Vec<FieldError>) {
    for series in &draft.series {
        if series.statement.trim().is_empty() {
            errors.push(FieldError::new("490", "Series statement is required"));
        }
    }
    for note in &draft.notes {
        if note.text.trim().is_empty() {
            errors.push(FieldError::new(note.kind.tag(), "Note text is required"));
        }
    }
    for location in &draft.locations {
        if location.institution.trim().is_empty() {
            errors.push(FieldError::new("852", "Institution ($a) is required"));
        }
    }
    for access in &draft.electronic_access {
        if !WEB_URL.is_match(access.url.trim()) {
            errors.push(FieldError::new("856", format!("Not an http(s) URL: {}", access.url)));
        }
    }
}

fn check_authority_refs(draft: &WorkDraft, errors: &mut Vec<FieldError>) {
    if matches!(draft.composer, Some(ref c) if c.authority.is_empty()) {
        errors.push(FieldError::new("100", "Composer name is required"));
    }
    if matches!(draft.uniform_title, Some(ref ut) if ut.title.is_empty()) {
        errors.push(FieldError::new("130", "Uniform title is required"));
    }
    if draft.subjects.iter().any(|s| s.is_empty()) {
        errors.push(FieldError::new("650", "Subject heading is required"));
    }
    if draft.forms.iter().any(|f| f.is_empty()) {
        errors.push(FieldError::new("655", "Form or genre term is required"));
    }
    if draft.added_persons.iter().any(|p| p.authority.is_empty()) {
        errors.push(FieldError::new("700", "Personal name is required"));
    }
    if draft.added_corporate_bodies.iter().any(|c| c.authority.is_empty()) {
        errors.push(FieldError::new("710", "Corporate name is required"));
    }
}

fn check_links(draft: &WorkDraft, ctx: &ValidationContext<'_>, errors: &mut Vec<FieldError>) {
    let mut seen = HashSet::new();
    for link in &draft.links {
        let tag = link.kind.tag();
        let Some(target_id) = link.target_id else {
            let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            if blank(&link.title) && blank(&link.control_number) {
                errors.push(FieldError::new(tag, "A textual entry needs a title ($t) or control number ($w)"));
            }
            continue;
        };

        if Some(target_id) == ctx.work_id {
            errors.push(FieldError::new(tag, "A record cannot link to itself"));
            continue;
        }
        if !seen.insert((link.kind, target_id)) {
            errors.push(FieldError::new(tag, format!("Record {} is linked twice", target_id)));
        }
        match ctx.targets.get(&target_id) {
            None => errors.push(FieldError::new(tag, format!("Linked record {} does not exist", target_id))),
            Some(target) if !target.active => errors.push(FieldError::new(
                tag,
                format!("Linked record {} is deleted", target.control_number),
            )),
            Some(_) => {}
        }
    }
}

/// Dropping the link to a host must not leave that collection without constituents.
fn check_host_detachment(draft: &WorkDraft, ctx: &ValidationContext<'_>, errors: &mut Vec<FieldError>) {
    let kept: HashSet<i32> = draft
        .links_of(LinkKind::Host)
        .filter_map(|l| l.target_id)
        .collect();
    for link in ctx.previous_links.iter().filter(|l| l.kind == LinkKind::Host) {
        let Some(id) = link.target_id else { continue };
        if kept.contains(&id) {
            continue;
        }
        if let Some(host) = ctx.targets.get(&id) {
            if host.active && host.constituent_count <= 1 {
                errors.push(FieldError::new(
                    "773",
                    format!(
                        "Detaching would leave collection {} without constituents",
                        host.control_number
                    ),
                ));
            }
        }
    }
}

/// A part names its host itself: whatever level the collection is resubmitted
/// at, an attached part cannot be dropped from the collection side.
fn check_constituent_detachment(draft: &WorkDraft, ctx: &ValidationContext<'_>, errors: &mut Vec<FieldError>) {
    let kept: HashSet<i32> = draft
        .links_of(LinkKind::Constituent)
        .filter_map(|l| l.target_id)
        .collect();
    for link in ctx.previous_links.iter().filter(|l| l.kind == LinkKind::Constituent) {
        let Some(id) = link.target_id else { continue };
        if kept.contains(&id) {
            continue;
        }
        if let Some(target) = ctx.targets.get(&id) {
            if target.active && target.host_id.is_some() && target.host_id == ctx.work_id {
                errors.push(FieldError::new(
                    "774",
                    format!(
                        "{} declares this collection as its host; detach it from the part record",
                        target.control_number
                    ),
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Checksums
// ---------------------------------------------------------------------------

fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn ean13_is_valid(digits: &str) -> bool {
    if digits.len() != 13 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = digits
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let d = (b - b'0') as u32;
            if i % 2 == 0 {
                d
            } else {
                d * 3
            }
        })
        .sum();
    sum % 10 == 0
}

/// ISBN-10 or ISBN-13 check digit validation (hyphens and spaces ignored)
pub fn isbn_is_valid(value: &str) -> bool {
    let isbn = compact(value);
    match isbn.len() {
        10 => {
            let mut sum = 0u32;
            for (i, c) in isbn.chars().enumerate() {
                let d = match c {
                    '0'..='9' => c as u32 - '0' as u32,
                    'X' if i == 9 => 10,
                    _ => return false,
                };
                sum += (10 - i as u32) * d;
            }
            sum % 11 == 0
        }
        13 => (isbn.starts_with("978") || isbn.starts_with("979")) && ean13_is_valid(&isbn),
        _ => false,
    }
}

/// ISMN validation: `979-0` EAN form or legacy `M` form
pub fn ismn_is_valid(value: &str) -> bool {
    let ismn = compact(value);
    if let Some(rest) = ismn.strip_prefix('M') {
        return rest.len() == 9 && ean13_is_valid(&format!("9790{}", rest));
    }
    ismn.starts_with("9790") && ean13_is_valid(&ismn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        authority::AuthorityRef,
        work::{AgentEntry, ElectronicAccess, Identifier, PerformanceMedium, PerformancePart, UniformTitleEntry},
    };

    fn composer() -> Option<AgentEntry> {
        Some(AgentEntry {
            authority: AuthorityRef {
                id: None,
                heading: Some("Zelenka, Jan Dismas".to_string()),
                qualifier: Some("1679-1745".to_string()),
            },
            relator: None,
        })
    }

    fn draft(level: BibliographicLevel) -> WorkDraft {
        let mut d = WorkDraft::new(RecordType::Printed, level, "Sonata");
        d.composer = composer();
        d
    }

    fn target(id: i32, level: BibliographicLevel) -> LinkTarget {
        LinkTarget {
            id,
            control_number: format!("PR{:06}", id),
            title: format!("Record {}", id),
            bibliographic_level: level,
            active: true,
            host_id: None,
            constituent_count: 0,
        }
    }

    fn textual(kind: LinkKind, title: &str) -> WorkLink {
        WorkLink {
            kind,
            target_id: None,
            title: Some(title.to_string()),
            control_number: None,
            related_parts: None,
            relationship: None,
        }
    }

    fn errors_of(draft: &WorkDraft, ctx: &ValidationContext<'_>) -> Vec<FieldError> {
        validate(draft, ctx).err().unwrap_or_default()
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_independent_work() {
        let targets = HashMap::new();
        assert!(validate(&draft(BibliographicLevel::Independent), &ValidationContext::for_new(&targets)).is_ok());
    }

    #[test]
    fn test_access_point_is_exclusive() {
        let targets = HashMap::new();
        let ctx = ValidationContext::for_new(&targets);

        let mut both = draft(BibliographicLevel::Independent);
        both.uniform_title = Some(UniformTitleEntry {
            title: AuthorityRef { heading: Some("Masses".into()), ..Default::default() },
            ..Default::default()
        });
        let errors = errors_of(&both, &ctx);
        assert_eq!(fields(&errors), vec!["100"]);
        assert!(errors[0].message.contains("not both"));

        let mut neither = draft(BibliographicLevel::Independent);
        neither.composer = None;
        let errors = errors_of(&neither, &ctx);
        assert!(errors[0].message.contains("is required"));
    }

    #[test]
    fn test_uniform_title_alone_is_valid() {
        let targets = HashMap::new();
        let mut d = draft(BibliographicLevel::Independent);
        d.composer = None;
        d.uniform_title = Some(UniformTitleEntry {
            title: AuthorityRef { heading: Some("Te Deum".into()), ..Default::default() },
            ..Default::default()
        });
        assert!(validate(&d, &ValidationContext::for_new(&targets)).is_ok());
    }

    #[test]
    fn test_blank_title_and_composer() {
        let targets = HashMap::new();
        let mut d = draft(BibliographicLevel::Independent);
        d.title.title = "  ".to_string();
        d.composer = Some(AgentEntry::default());
        let errors = errors_of(&d, &ValidationContext::for_new(&targets));
        assert_eq!(fields(&errors), vec!["245", "100"]);
    }

    #[test]
    fn test_manuscript_forbids_isbn_and_ismn() {
        let targets = HashMap::new();
        let mut d = draft(BibliographicLevel::Independent);
        d.record_type = RecordType::Manuscript;
        d.identifiers = vec![
            Identifier { kind: IdentifierKind::Isbn, value: "978-0-306-40615-7".into(), qualifier: None, publisher: None },
            Identifier { kind: IdentifierKind::Ismn, value: "979-0-060-11561-5".into(), qualifier: None, publisher: None },
            Identifier { kind: IdentifierKind::PublisherNumber, value: "H. 1234".into(), qualifier: None, publisher: None },
        ];
        let errors = errors_of(&d, &ValidationContext::for_new(&targets));
        assert_eq!(fields(&errors), vec!["020", "024"]);
    }

    #[test]
    fn test_printed_identifier_checksums() {
        let targets = HashMap::new();
        let mut d = draft(BibliographicLevel::Independent);
        d.identifiers = vec![
            Identifier { kind: IdentifierKind::Isbn, value: "978-0-306-40615-7".into(), qualifier: None, publisher: None },
            Identifier { kind: IdentifierKind::Isbn, value: "978-0-306-40615-8".into(), qualifier: None, publisher: None },
        ];
        let errors = errors_of(&d, &ValidationContext::for_new(&targets));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("40615-8"));
    }

    #[test]
    fn test_checksums() {
        assert!(isbn_is_valid("0-306-40615-2"));
        assert!(isbn_is_valid("0-9752298-0-X"));
        assert!(isbn_is_valid("9780306406157"));
        assert!(!isbn_is_valid("0-306-40615-3"));
        assert!(!isbn_is_valid("12345"));
        assert!(ismn_is_valid("979-0-060-11561-5"));
        assert!(ismn_is_valid("M-060-11561-5"));
        assert!(!ismn_is_valid("979-0-060-11561-4"));
        assert!(!ismn_is_valid("978-0-306-40615-7"));
    }

    #[test]
    fn test_codes_media_and_urls() {
        let targets = HashMap::new();
        let mut d = draft(BibliographicLevel::Independent);
        d.languages = vec!["ger".into(), "DE".into()];
        d.countries = vec!["gw".into(), "germany".into()];
        d.performance_media = vec![PerformanceMedium {
            parts: vec![PerformancePart { instrument: "flute".into(), count: 0, soloist: false }],
            total_performers: Some(0),
            note: None,
        }];
        d.electronic_access = vec![ElectronicAccess {
            url: "ftp://example.org/score.pdf".into(),
            link_text: None,
            note: None,
            relationship: Default::default(),
        }];
        let errors = errors_of(&d, &ValidationContext::for_new(&targets));
        assert_eq!(fields(&errors), vec!["041", "044", "382", "382", "856"]);
    }

    #[test]
    fn test_collection_requires_constituents() {
        let targets = HashMap::new();
        let ctx = ValidationContext::for_new(&targets);

        let d = draft(BibliographicLevel::Collection);
        assert_eq!(fields(&errors_of(&d, &ctx)), vec!["774"]);

        let mut d = draft(BibliographicLevel::Collection);
        d.links = vec![textual(LinkKind::Constituent, "Sonata I"), textual(LinkKind::Host, "Anthology")];
        assert_eq!(fields(&errors_of(&d, &ctx)), vec!["773"]);

        let mut d = draft(BibliographicLevel::Collection);
        d.links = vec![textual(LinkKind::Constituent, "Sonata I")];
        assert!(validate(&d, &ctx).is_ok());
    }

    #[test]
    fn test_collection_constituent_targets() {
        let mut owned = target(5, BibliographicLevel::Part);
        owned.host_id = Some(99);
        let targets = HashMap::from([
            (4, target(4, BibliographicLevel::Independent)),
            (5, owned),
            (6, target(6, BibliographicLevel::Part)),
        ]);
        let mut d = draft(BibliographicLevel::Collection);
        d.links = vec![
            WorkLink::linked(LinkKind::Constituent, 4),
            WorkLink::linked(LinkKind::Constituent, 5),
            WorkLink::linked(LinkKind::Constituent, 6),
        ];
        let errors = errors_of(&d, &ValidationContext::for_new(&targets));
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("PR000004"));
        assert!(errors[1].message.contains("another collection"));
    }

    #[test]
    fn test_collection_cannot_drop_attached_part() {
        let mut part = target(7, BibliographicLevel::Part);
        part.host_id = Some(1);
        let targets = HashMap::from([(7, part)]);
        let previous = vec![WorkLink::linked(LinkKind::Constituent, 7)];
        let ctx = ValidationContext {
            work_id: Some(1),
            previous_links: &previous,
            targets: &targets,
        };

        let mut d = draft(BibliographicLevel::Collection);
        d.links = vec![textual(LinkKind::Constituent, "Other sonata")];
        let errors = errors_of(&d, &ctx);
        assert_eq!(fields(&errors), vec!["774"]);
        assert!(errors[0].message.contains("detach it from the part record"));

        d.links.push(WorkLink::linked(LinkKind::Constituent, 7));
        assert!(validate(&d, &ctx).is_ok());
    }

    #[test]
    fn test_relevelled_collection_cannot_drop_attached_part() {
        let mut part = target(7, BibliographicLevel::Part);
        part.host_id = Some(1);
        let targets = HashMap::from([(7, part)]);
        let previous = vec![WorkLink::linked(LinkKind::Constituent, 7)];
        let ctx = ValidationContext {
            work_id: Some(1),
            previous_links: &previous,
            targets: &targets,
        };

        let d = draft(BibliographicLevel::Independent);
        let errors = errors_of(&d, &ctx);
        assert_eq!(fields(&errors), vec!["774"]);
        assert!(errors[0].message.contains("PR000007"));

        let mut d = draft(BibliographicLevel::Part);
        d.links = vec![textual(LinkKind::Host, "Some other collection")];
        let errors = errors_of(&d, &ctx);
        assert!(fields(&errors).contains(&"774"));

        // Once the part has moved elsewhere, the collection may change level.
        let mut moved = target(7, BibliographicLevel::Part);
        moved.host_id = Some(9);
        let targets = HashMap::from([(7, moved)]);
        let ctx = ValidationContext {
            work_id: Some(1),
            previous_links: &previous,
            targets: &targets,
        };
        assert!(validate(&draft(BibliographicLevel::Independent), &ctx).is_ok());
    }

    #[test]
    fn test_part_requires_single_collection_host() {
        let targets = HashMap::from([
            (2, target(2, BibliographicLevel::Collection)),
            (3, target(3, BibliographicLevel::Independent)),
        ]);
        let ctx = ValidationContext::for_new(&targets);

        let d = draft(BibliographicLevel::Part);
        assert_eq!(fields(&errors_of(&d, &ctx)), vec!["773"]);

        let mut d = draft(BibliographicLevel::Part);
        d.links = vec![WorkLink::linked(LinkKind::Host, 2)];
        assert!(validate(&d, &ctx).is_ok());

        d.links = vec![WorkLink::linked(LinkKind::Host, 3)];
        let errors = errors_of(&d, &ctx);
        assert!(errors[0].message.contains("not catalogued as a collection"));

        d.links = vec![WorkLink::linked(LinkKind::Host, 2), textual(LinkKind::Host, "Other")];
        assert!(errors_of(&d, &ctx)[0].message.contains("exactly one"));

        d.links = vec![WorkLink::linked(LinkKind::Host, 2), textual(LinkKind::Constituent, "x")];
        assert_eq!(fields(&errors_of(&d, &ctx)), vec!["774"]);
    }

    #[test]
    fn test_independent_forbids_links_to_collections() {
        let targets = HashMap::from([(2, target(2, BibliographicLevel::Collection))]);
        let mut d = draft(BibliographicLevel::Independent);
        d.links = vec![
            WorkLink::linked(LinkKind::Host, 2),
            textual(LinkKind::Constituent, "x"),
            WorkLink::linked(LinkKind::Related, 2),
        ];
        let errors = errors_of(&d, &ValidationContext::for_new(&targets));
        assert_eq!(fields(&errors), vec!["773", "774"]);
    }

    #[test]
    fn test_link_targets_must_exist_and_be_active() {
        let mut deleted = target(8, BibliographicLevel::Independent);
        deleted.active = false;
        let targets = HashMap::from([(8, deleted)]);
        let ctx = ValidationContext {
            work_id: Some(1),
            previous_links: &[],
            targets: &targets,
        };
        let mut d = draft(BibliographicLevel::Independent);
        d.links = vec![
            WorkLink::linked(LinkKind::Related, 8),
            WorkLink::linked(LinkKind::Related, 404),
            WorkLink::linked(LinkKind::Related, 1),
            WorkLink { title: None, ..textual(LinkKind::Related, "") },
        ];
        let errors = errors_of(&d, &ctx);
        assert_eq!(errors.len(), 4);
        assert!(errors[0].message.contains("is deleted"));
        assert!(errors[1].message.contains("does not exist"));
        assert!(errors[2].message.contains("itself"));
        assert!(errors[3].message.contains("textual entry"));
    }

    #[test]
    fn test_detaching_last_part_is_refused() {
        let mut host = target(2, BibliographicLevel::Collection);
        host.constituent_count = 1;
        let mut busy_host = target(3, BibliographicLevel::Collection);
        busy_host.constituent_count = 4;
        let targets = HashMap::from([(2, host), (3, busy_host)]);

        let previous = vec![WorkLink::linked(LinkKind::Host, 2)];
        let ctx = ValidationContext { work_id: Some(1), previous_links: &previous, targets: &targets };
        let mut d = draft(BibliographicLevel::Part);
        d.links = vec![WorkLink::linked(LinkKind::Host, 3)];
        let errors = errors_of(&d, &ctx);
        assert_eq!(fields(&errors), vec!["773"]);
        assert!(errors[0].message.contains("PR000002"));

        let previous = vec![WorkLink::linked(LinkKind::Host, 3)];
        let ctx = ValidationContext { work_id: Some(1), previous_links: &previous, targets: &targets };
        let mut d = draft(BibliographicLevel::Independent);
        d.links.clear();
        assert!(validate(&d, &ctx).is_ok());
    }
}
