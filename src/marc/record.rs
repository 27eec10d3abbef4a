//! In-memory MARC record
//!
//! Structured representation of a record built from a work, before it is
//! serialized by [`super::writer`].

use serde::Serialize;

/// A MARC record containing leader and fields
#[derive(Debug, Clone, Serialize)]
pub struct MarcRecord {
    /// The 24-character record leader. Positions 00-04 (record length) and 12-16
    /// (base address) are filled in by the ISO 2709 writer.
    pub leader: String,
    /// Control fields (00X), in tag order
    pub control_fields: Vec<ControlField>,
    /// Data fields with indicators and subfields
    pub data_fields: Vec<DataField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlField {
    pub tag: String,
    pub value: String,
}

/// A MARC data field (010-999)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataField {
    /// Field tag (3 characters)
    pub tag: String,
    /// First indicator
    pub ind1: char,
    /// Second indicator
    pub ind2: char,
    /// Subfields
    pub subfields: Vec<Subfield>,
}

/// A MARC subfield
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subfield {
    /// Subfield code (single character)
    pub code: char,
    /// Subfield data
    pub data: String,
}

impl MarcRecord {
    pub fn new(leader: String) -> Self {
        Self {
            leader,
            control_fields: Vec::new(),
            data_fields: Vec::new(),
        }
    }

    pub fn add_control_field(&mut self, tag: &str, value: impl Into<String>) {
        self.control_fields.push(ControlField {
            tag: tag.to_string(),
            value: value.into(),
        });
    }

    /// Add a data field, dropping it when no subfield carries data
    pub fn add_field(&mut self, field: DataField) {
        if !field.subfields.is_empty() {
            self.data_fields.push(field);
        }
    }

    /// Stable sort of fields by tag: repeated fields keep their catalogued order
    pub fn sort_fields(&mut self) {
        self.control_fields.sort_by(|a, b| a.tag.cmp(&b.tag));
        self.data_fields.sort_by(|a, b| a.tag.cmp(&b.tag));
    }

    /// Get a control field value
    pub fn get_control_field(&self, tag: &str) -> Option<&str> {
        self.control_fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    /// Get a subfield value by tag and subfield code
    pub fn get_subfield(&self, tag: &str, code: char) -> Option<&str> {
        self.get_fields(tag)
            .into_iter()
            .find_map(|f| f.get_subfield(code))
    }

    /// Get all data fields with a specific tag
    pub fn get_fields(&self, tag: &str) -> Vec<&DataField> {
        self.data_fields
            .iter()
            .filter(|f| f.tag == tag)
            .collect()
    }
}

impl DataField {
    pub fn new(tag: &str, ind1: char, ind2: char) -> Self {
        Self {
            tag: tag.to_string(),
            ind1,
            ind2,
            subfields: Vec::new(),
        }
    }

    /// Append a subfield; blank values are skipped
    pub fn sub(mut self, code: char, data: &str) -> Self {
        let data = data.trim();
        if !data.is_empty() {
            self.subfields.push(Subfield {
                code,
                data: data.to_string(),
            });
        }
        self
    }

    pub fn sub_opt(self, code: char, data: Option<&str>) -> Self {
        match data {
            Some(d) => self.sub(code, d),
            None => self,
        }
    }

    /// Get a subfield value by code
    pub fn get_subfield(&self, code: char) -> Option<&str> {
        self.subfields
            .iter()
            .find(|sf| sf.code == code)
            .map(|sf| sf.data.as_str())
    }

    /// Get all subfield values for a code
    pub fn get_all_subfields(&self, code: char) -> Vec<&str> {
        self.subfields
            .iter()
            .filter(|sf| sf.code == code)
            .map(|sf| sf.data.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_subfields_are_skipped() {
        let field = DataField::new("245", '1', '0')
            .sub('a', "Sonate")
            .sub('b', "   ")
            .sub_opt('c', None);
        assert_eq!(field.subfields.len(), 1);
        assert_eq!(field.get_subfield('a'), Some("Sonate"));
    }

    #[test]
    fn test_empty_fields_are_not_added() {
        let mut record = MarcRecord::new(" ".repeat(24));
        record.add_field(DataField::new("500", ' ', ' ').sub('a', ""));
        assert!(record.data_fields.is_empty());
    }

    #[test]
    fn test_sort_keeps_repeat_order() {
        let mut record = MarcRecord::new(" ".repeat(24));
        record.add_field(DataField::new("700", '1', ' ').sub('a', "First"));
        record.add_field(DataField::new("245", '0', '0').sub('a', "Title"));
        record.add_field(DataField::new("700", '1', ' ').sub('a', "Second"));
        record.sort_fields();

        let tags: Vec<_> = record.data_fields.iter().map(|f| f.tag.as_str()).collect();
        assert_eq!(tags, vec!["245", "700", "700"]);
        assert_eq!(record.get_fields("700")[1].get_subfield('a'), Some("Second"));
        assert_eq!(record.get_subfield("700", 'a'), Some("First"));
    }
}
