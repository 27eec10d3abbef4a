//! Work to MARC21 translator
//!
//! Builds a MARC21 bibliographic record (notated music) from a stored work.

use once_cell::sync::Lazy;
use regex::Regex;

use super::record::{DataField, MarcRecord};
use crate::config::CatalogingConfig;
use crate::models::{
    enums::{IdentifierKind, LinkKind, NoteKind, RecordType},
    work::{AgentEntry, WorkLink},
    Work,
};

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(1[0-9]{3}|20[0-9]{2})\b").unwrap());
static UNCERTAIN_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\?|\bca\.?|\bcirca\b|\bum\b").unwrap());

/// MARC record translator
pub struct MarcTranslator {
    organization_code: String,
    cataloging_language: String,
}

impl MarcTranslator {
    pub fn new(config: &CatalogingConfig) -> Self {
        Self {
            organization_code: config.institution_code.clone(),
            cataloging_language: config.cataloging_language.clone(),
        }
    }

    /// Translate a work into a MARC21 record
    pub fn translate(&self, work: &Work) -> MarcRecord {
        let r = &work.record;
        let mut record = MarcRecord::new(self.leader(work));

        record.add_control_field("001", work.control_number.clone());
        record.add_control_field("003", self.organization_code.clone());
        record.add_control_field("005", work.updated_at.format("%Y%m%d%H%M%S.0").to_string());
        record.add_control_field("008", fixed_length_data(work));

        for identifier in &r.identifiers {
            let field = match identifier.kind {
                IdentifierKind::Isbn => DataField::new("020", ' ', ' '),
                IdentifierKind::Ismn => DataField::new("024", '2', ' '),
                IdentifierKind::PublisherNumber => DataField::new("028", '2', '0'),
            };
            record.add_field(
                field
                    .sub('a', &identifier.value)
                    .sub_opt('b', identifier.publisher.as_deref())
                    .sub_opt('q', identifier.qualifier.as_deref()),
            );
        }

        for incipit in &r.incipits {
            let field = DataField::new("031", ' ', ' ')
                .sub_opt('a', incipit.work_number.as_deref())
                .sub_opt('b', incipit.movement_number.as_deref())
                .sub_opt('c', incipit.excerpt_number.as_deref())
                .sub_opt('d', incipit.caption.as_deref())
                .sub_opt('g', incipit.clef.as_deref())
                .sub_opt('n', incipit.key_signature.as_deref())
                .sub_opt('o', incipit.time_signature.as_deref())
                .sub_opt('p', incipit.notation.as_deref())
                .sub_opt('t', incipit.text_incipit.as_deref());
            let field = if incipit.notation.is_some() {
                field.sub('2', "pe")
            } else {
                field
            };
            record.add_field(field);
        }

        record.add_field(
            DataField::new("040", ' ', ' ')
                .sub('a', &self.organization_code)
                .sub('b', &self.cataloging_language)
                .sub('e', "rda")
                .sub('c', &self.organization_code),
        );

        record.add_field(
            r.languages
                .iter()
                .fold(DataField::new("041", '0', ' '), |f, code| f.sub('a', code)),
        );
        record.add_field(
            r.countries
                .iter()
                .fold(DataField::new("044", ' ', ' '), |f, code| f.sub('a', code)),
        );

        if let Some(ref composer) = r.composer {
            record.add_field(personal_name("100", composer));
        }

        if let Some(ref ut) = r.uniform_title {
            record.add_field(
                DataField::new("130", '0', ' ')
                    .sub_opt('a', ut.title.heading.as_deref())
                    .sub_opt('m', ut.medium.as_deref())
                    .sub_opt('n', ut.number.as_deref())
                    .sub_opt('r', ut.key.as_deref())
                    .sub_opt('o', ut.arranged.as_deref()),
            );
        }

        let has_main_entry = r.composer.is_some() || r.uniform_title.is_some();
        record.add_field(title_statement(work, has_main_entry));

        if let Some(ref edition) = r.edition {
            record.add_field(DataField::new("250", ' ', ' ').sub('a', edition));
        }

        if let Some(ref publication) = r.publication {
            // manuscripts are produced, not published
            let ind2 = match r.record_type {
                RecordType::Printed => '1',
                RecordType::Manuscript => '0',
            };
            record.add_field(
                DataField::new("264", ' ', ind2)
                    .sub_opt('a', publication.place.as_deref())
                    .sub_opt('b', publication.publisher.as_deref())
                    .sub_opt('c', publication.date.as_deref()),
            );
        }

        if let Some(ref physical) = r.physical_description {
            record.add_field(
                DataField::new("300", ' ', ' ')
                    .sub_opt('a', physical.extent.as_deref())
                    .sub_opt('b', physical.other_details.as_deref())
                    .sub_opt('c', physical.dimensions.as_deref()),
            );
        }

        record.add_field(
            DataField::new("336", ' ', ' ')
                .sub('a', "notated music")
                .sub('b', "ntm")
                .sub('2', "rdacontent"),
        );
        record.add_field(
            DataField::new("337", ' ', ' ')
                .sub('a', "unmediated")
                .sub('b', "n")
                .sub('2', "rdamedia"),
        );
        record.add_field(
            DataField::new("338", ' ', ' ')
                .sub('a', "volume")
                .sub('b', "nc")
                .sub('2', "rdacarrier"),
        );

        for medium in &r.performance_media {
            let mut field = DataField::new("382", '0', ' ');
            for part in &medium.parts {
                let code = if part.soloist { 'b' } else { 'a' };
                field = field.sub(code, &part.instrument).sub('n', &part.count.to_string());
            }
            if let Some(total) = medium.total_performers {
                field = field.sub('s', &total.to_string());
            }
            record.add_field(field.sub_opt('v', medium.note.as_deref()).sub('2', "lcmpt"));
        }

        for series in &r.series {
            record.add_field(
                DataField::new("490", '0', ' ')
                    .sub('a', &series.statement)
                    .sub_opt('v', series.volume.as_deref()),
            );
        }

        for note in &r.notes {
            let ind1 = if note.kind == NoteKind::Contents { '0' } else { ' ' };
            record.add_field(DataField::new(note.kind.tag(), ind1, ' ').sub('a', &note.text));
        }

        for subject in &r.subjects {
            record.add_field(DataField::new("650", ' ', '4').sub_opt('a', subject.heading.as_deref()));
        }
        for form in &r.forms {
            record.add_field(DataField::new("655", ' ', '4').sub_opt('a', form.heading.as_deref()));
        }

        for person in &r.added_persons {
            record.add_field(personal_name("700", person));
        }
        for body in &r.added_corporate_bodies {
            record.add_field(
                DataField::new("710", '2', ' ')
                    .sub_opt('a', body.authority.heading.as_deref())
                    .sub_opt('b', body.authority.qualifier.as_deref())
                    .sub_opt('e', body.relator.as_deref()),
            );
        }

        for link in &r.links {
            record.add_field(self.linking_entry(link));
        }

        for location in &r.locations {
            record.add_field(
                DataField::new("852", ' ', ' ')
                    .sub('a', &location.institution)
                    .sub_opt('b', location.sublocation.as_deref())
                    .sub_opt('h', location.shelfmark.as_deref())
                    .sub_opt('z', location.note.as_deref()),
            );
        }

        for access in &r.electronic_access {
            record.add_field(
                DataField::new("856", '4', access.relationship.indicator())
                    .sub('u', &access.url)
                    .sub_opt('y', access.link_text.as_deref())
                    .sub_opt('z', access.note.as_deref()),
            );
        }

        record.sort_fields();
        record
    }

    fn leader(&self, work: &Work) -> String {
        let status = if work.deleted_at.is_some() {
            'd'
        } else if work.updated_at > work.created_at {
            'c'
        } else {
            'n'
        };
        format!(
            "00000{}{}{} a2200000 i 4500",
            status,
            work.record.record_type.leader_code(),
            work.record.bibliographic_level.leader_code()
        )
    }

    fn linking_entry(&self, link: &WorkLink) -> DataField {
        let field = DataField::new(link.kind.tag(), '0', ' ');
        let field = if link.kind == LinkKind::Related {
            field.sub_opt('i', link.relationship.as_deref())
        } else {
            field
        };
        let control_number = link
            .control_number
            .as_deref()
            .filter(|cn| !cn.trim().is_empty())
            .map(|cn| {
                if link.target_id.is_some() {
                    format!("({}){}", self.organization_code, cn)
                } else {
                    cn.to_string()
                }
            });
        field
            .sub_opt('t', link.title.as_deref())
            .sub_opt('g', link.related_parts.as_deref())
            .sub_opt('w', control_number.as_deref())
    }
}

fn personal_name(tag: &str, entry: &AgentEntry) -> DataField {
    let heading = entry.authority.heading.as_deref().unwrap_or_default();
    // "Surname, Forename" is an inverted name, anything else direct order
    let ind1 = if heading.contains(',') { '1' } else { '0' };
    DataField::new(tag, ind1, ' ')
        .sub('a', heading)
        .sub_opt('d', entry.authority.qualifier.as_deref())
        .sub_opt('e', entry.relator.as_deref())
}

/// 245 with ISBD punctuation between its subfields
fn title_statement(work: &Work, has_main_entry: bool) -> DataField {
    let t = &work.record.title;
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
    let part_separator = if present(&t.part_number) { "," } else { "." };
    let mut parts: Vec<(char, String)> = vec![('a', t.title.trim().to_string())];
    let mut push = |code: char, value: Option<&str>, separator: &str| {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            if let Some(last) = parts.last_mut() {
                last.1.push_str(separator);
            }
            parts.push((code, v.to_string()));
        }
    };
    push('n', t.part_number.as_deref(), ".");
    push('p', t.part_name.as_deref(), part_separator);
    push('b', t.remainder.as_deref(), " :");
    push('c', t.responsibility.as_deref(), " /");

    if let Some(last) = parts.last_mut() {
        if !last.1.ends_with(['.', '?', '!']) {
            last.1.push('.');
        }
    }

    let ind1 = if has_main_entry { '1' } else { '0' };
    parts
        .iter()
        .fold(DataField::new("245", ind1, '0'), |f, (code, v)| f.sub(*code, v))
}

/// Date type, date 1 and date 2 (008/06-14) from a free-text publication date
fn date_fields(date: Option<&str>) -> (char, String, String) {
    let Some(date) = date else {
        return ('n', "uuuu".to_string(), "uuuu".to_string());
    };
    let years: Vec<&str> = YEAR.find_iter(date).map(|m| m.as_str()).collect();
    let uncertain = UNCERTAIN_DATE.is_match(date);
    match (years.first(), years.last()) {
        (None, _) | (_, None) => ('n', "uuuu".to_string(), "uuuu".to_string()),
        (Some(first), Some(last)) if uncertain => ('q', first.to_string(), last.to_string()),
        (Some(first), Some(last)) if first != last => ('m', first.to_string(), last.to_string()),
        (Some(first), Some(_)) => ('s', first.to_string(), "    ".to_string()),
    }
}

/// 008 for music (40 positions)
fn fixed_length_data(work: &Work) -> String {
    let r = &work.record;
    let (date_type, date1, date2) =
        date_fields(r.publication.as_ref().and_then(|p| p.date.as_deref()));

    let country = r
        .countries
        .first()
        .map(|c| format!("{:<3.3}", c))
        .unwrap_or_else(|| "xx ".to_string());
    let language = r
        .languages
        .first()
        .cloned()
        .unwrap_or_else(|| "zxx".to_string());
    let arrangement = if r
        .uniform_title
        .as_ref()
        .and_then(|ut| ut.arranged.as_ref())
        .is_some()
    {
        'b'
    } else {
        ' '
    };

    let mut f = String::with_capacity(40);
    f.push_str(&work.created_at.format("%y%m%d").to_string()); // 00-05
    f.push(date_type); // 06
    f.push_str(&date1); // 07-10
    f.push_str(&date2); // 11-14
    f.push_str(&country); // 15-17
    f.push_str("uu"); // 18-19 form of composition
    f.push('u'); // 20 format of music
    f.push('u'); // 21 music parts
    f.push(' '); // 22 target audience
    f.push(' '); // 23 form of item
    f.push_str("      "); // 24-29 accompanying matter
    f.push_str("  "); // 30-31 literary text
    f.push(' '); // 32
    f.push(arrangement); // 33 transposition and arrangement
    f.push(' '); // 34
    f.push_str(&language); // 35-37
    f.push(' '); // 38 modified record
    f.push('d'); // 39 cataloging source
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        authority::AuthorityRef,
        enums::{BibliographicLevel, RecordType},
        work::{Identifier, PerformanceMedium, PerformancePart, Publication, UniformTitleEntry},
        WorkDraft,
    };
    use chrono::{TimeZone, Utc};

    fn work(draft: WorkDraft) -> Work {
        let created = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        Work {
            id: 1,
            control_number: "PR000042".to_string(),
            signature: "Mus.pr. 42".to_string(),
            created_by: None,
            created_at: created,
            updated_at: created,
            deleted_at: None,
            record: draft,
        }
    }

    fn translator() -> MarcTranslator {
        MarcTranslator::new(&CatalogingConfig::default())
    }

    fn composer(name: &str, dates: Option<&str>) -> AgentEntry {
        AgentEntry {
            authority: AuthorityRef {
                id: Some(1),
                heading: Some(name.to_string()),
                qualifier: dates.map(String::from),
            },
            relator: Some("composer".to_string()),
        }
    }

    #[test]
    fn test_leader_and_control_fields() {
        let draft = WorkDraft::new(RecordType::Printed, BibliographicLevel::Collection, "Sonatas");
        let record = translator().translate(&work(draft));

        assert_eq!(record.leader, "00000ncc a2200000 i 4500");
        assert_eq!(record.leader.len(), 24);
        assert_eq!(record.get_control_field("001"), Some("PR000042"));
        assert_eq!(record.get_control_field("003"), Some("XX-MUS"));
        assert_eq!(record.get_control_field("005"), Some("20240305100000.0"));
    }

    #[test]
    fn test_fixed_length_data() {
        let mut draft = WorkDraft::new(RecordType::Manuscript, BibliographicLevel::Independent, "Missa");
        draft.publication = Some(Publication {
            date: Some("ca. 1740".to_string()),
            ..Default::default()
        });
        draft.languages = vec!["lat".to_string()];
        draft.countries = vec!["xr".to_string()];

        let record = translator().translate(&work(draft));
        let f008 = record.get_control_field("008").unwrap();

        assert_eq!(f008.len(), 40);
        assert_eq!(&f008[0..6], "240305");
        assert_eq!(&f008[6..15], "q17401740");
        assert_eq!(&f008[15..18], "xr ");
        assert_eq!(&f008[35..38], "lat");
        assert_eq!(&f008[39..40], "d");
    }

    #[test]
    fn test_date_fields() {
        assert_eq!(date_fields(Some("1785")), ('s', "1785".into(), "    ".into()));
        assert_eq!(date_fields(Some("1780-1790")), ('m', "1780".into(), "1790".into()));
        assert_eq!(date_fields(Some("[1802?]")), ('q', "1802".into(), "1802".into()));
        assert_eq!(date_fields(Some("s.d.")), ('n', "uuuu".into(), "uuuu".into()));
        assert_eq!(date_fields(None), ('n', "uuuu".into(), "uuuu".into()));
    }

    #[test]
    fn test_composer_and_title() {
        let mut draft = WorkDraft::new(RecordType::Printed, BibliographicLevel::Independent, "Slavonic dances");
        draft.title.remainder = Some("for piano four hands".to_string());
        draft.title.responsibility = Some("Anton Dvořák".to_string());
        draft.composer = Some(composer("Dvořák, Antonín", Some("1841-1904")));

        let record = translator().translate(&work(draft));

        let f100 = record.get_fields("100")[0];
        assert_eq!(f100.ind1, '1');
        assert_eq!(f100.get_subfield('d'), Some("1841-1904"));
        assert_eq!(f100.get_subfield('e'), Some("composer"));

        let f245 = record.get_fields("245")[0];
        assert_eq!(f245.ind1, '1');
        assert_eq!(f245.get_subfield('a'), Some("Slavonic dances :"));
        assert_eq!(f245.get_subfield('b'), Some("for piano four hands /"));
        assert_eq!(f245.get_subfield('c'), Some("Anton Dvořák."));
    }

    #[test]
    fn test_part_name_punctuation() {
        let mut draft = WorkDraft::new(RecordType::Printed, BibliographicLevel::Part, "Sonata");
        draft.title.part_number = Some("No. 2".to_string());
        draft.title.part_name = Some("Allegro".to_string());
        let record = translator().translate(&work(draft.clone()));
        let f245 = record.get_fields("245")[0];
        assert_eq!(f245.get_subfield('a'), Some("Sonata."));
        assert_eq!(f245.get_subfield('n'), Some("No. 2,"));
        assert_eq!(f245.get_subfield('p'), Some("Allegro."));

        draft.title.part_number = Some("  ".to_string());
        let record = translator().translate(&work(draft));
        let f245 = record.get_fields("245")[0];
        assert_eq!(f245.get_subfield('n'), None);
        assert_eq!(f245.get_subfield('a'), Some("Sonata."));
        assert_eq!(f245.get_subfield('p'), Some("Allegro."));
    }

    #[test]
    fn test_uniform_title_main_entry() {
        let mut draft = WorkDraft::new(RecordType::Manuscript, BibliographicLevel::Independent, "Graduale");
        draft.uniform_title = Some(UniformTitleEntry {
            title: AuthorityRef {
                id: Some(2),
                heading: Some("Graduale Romanum".to_string()),
                qualifier: None,
            },
            medium: Some("voices".to_string()),
            ..Default::default()
        });
        draft.publication = Some(Publication {
            place: Some("Praha".to_string()),
            date: Some("1650".to_string()),
            ..Default::default()
        });

        let record = translator().translate(&work(draft));

        assert!(record.get_fields("100").is_empty());
        assert_eq!(record.get_subfield("130", 'm'), Some("voices"));
        assert_eq!(record.get_fields("245")[0].ind1, '1');
        assert_eq!(record.get_fields("264")[0].ind2, '0');
    }

    #[test]
    fn test_title_without_main_entry() {
        let draft = WorkDraft::new(RecordType::Printed, BibliographicLevel::Collection, "Sammelband");
        let record = translator().translate(&work(draft));
        let f245 = record.get_fields("245")[0];
        assert_eq!(f245.ind1, '0');
        assert_eq!(f245.get_subfield('a'), Some("Sammelband."));
    }

    #[test]
    fn test_repeatable_fields() {
        let mut draft = WorkDraft::new(RecordType::Printed, BibliographicLevel::Part, "Quartet");
        draft.composer = Some(composer("Haydn, Joseph", None));
        draft.identifiers = vec![Identifier {
            kind: IdentifierKind::Ismn,
            value: "9790260000438".to_string(),
            qualifier: Some("score".to_string()),
            publisher: None,
        }];
        draft.performance_media = vec![PerformanceMedium {
            parts: vec![
                PerformancePart { instrument: "violin".to_string(), count: 2, soloist: false },
                PerformancePart { instrument: "viola".to_string(), count: 1, soloist: false },
                PerformancePart { instrument: "violoncello".to_string(), count: 1, soloist: false },
            ],
            total_performers: Some(4),
            note: None,
        }];
        draft.links = vec![WorkLink {
            kind: LinkKind::Host,
            target_id: Some(9),
            title: Some("Six quartets".to_string()),
            control_number: Some("PR000009".to_string()),
            related_parts: Some("No. 3".to_string()),
            relationship: None,
        }];

        let record = translator().translate(&work(draft));

        let f024 = record.get_fields("024")[0];
        assert_eq!(f024.ind1, '2');
        assert_eq!(f024.get_subfield('q'), Some("score"));

        let f382 = record.get_fields("382")[0];
        assert_eq!(f382.get_all_subfields('a'), vec!["violin", "viola", "violoncello"]);
        assert_eq!(f382.get_all_subfields('n'), vec!["2", "1", "1"]);
        assert_eq!(f382.get_subfield('s'), Some("4"));

        let f773 = record.get_fields("773")[0];
        assert_eq!(f773.get_subfield('t'), Some("Six quartets"));
        assert_eq!(f773.get_subfield('g'), Some("No. 3"));
        assert_eq!(f773.get_subfield('w'), Some("(XX-MUS)PR000009"));

        let tags: Vec<_> = record.data_fields.iter().map(|f| f.tag.as_str()).collect();
        let mut sorted = tags.clone();
        sorted.sort();
        assert_eq!(tags, sorted);
    }
}
