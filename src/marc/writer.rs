//! MARC serializers: mnemonic text, MARC-in-JSON and ISO 2709

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::record::MarcRecord;

const FIELD_TERMINATOR: u8 = 0x1E;
const RECORD_TERMINATOR: u8 = 0x1D;
const SUBFIELD_DELIMITER: u8 = 0x1F;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarcWriteError {
    #[error("field {0} is longer than 9999 bytes")]
    FieldTooLong(String),
    #[error("record is longer than 99999 bytes")]
    RecordTooLong,
    #[error("leader must be 24 characters")]
    BadLeader,
}

/// Output format requested for a rendered record
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, utoipa::ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarcOutput {
    #[default]
    Text,
    Json,
    Iso2709,
}

/// MARCMaker mnemonic text (`=245  10$aTitle`), blanks shown as `\`
pub fn to_text(record: &MarcRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("=LDR  {}\n", record.leader.replace(' ', "\\")));
    for field in &record.control_fields {
        out.push_str(&format!("={}  {}\n", field.tag, field.value.replace(' ', "\\")));
    }
    for field in &record.data_fields {
        out.push_str(&format!(
            "={}  {}{}",
            field.tag,
            blank_as_backslash(field.ind1),
            blank_as_backslash(field.ind2)
        ));
        for sf in &field.subfields {
            out.push('$');
            out.push(sf.code);
            out.push_str(&sf.data);
        }
        out.push('\n');
    }
    out
}

fn blank_as_backslash(c: char) -> char {
    if c == ' ' {
        '\\'
    } else {
        c
    }
}

/// MARC-in-JSON
pub fn to_json(record: &MarcRecord) -> Value {
    let mut fields = Vec::with_capacity(record.control_fields.len() + record.data_fields.len());
    for field in &record.control_fields {
        let mut m = Map::new();
        m.insert(field.tag.clone(), Value::String(field.value.clone()));
        fields.push(Value::Object(m));
    }
    for field in &record.data_fields {
        let subfields: Vec<Value> = field
            .subfields
            .iter()
            .map(|sf| {
                let mut m = Map::new();
                m.insert(sf.code.to_string(), Value::String(sf.data.clone()));
                Value::Object(m)
            })
            .collect();
        let mut m = Map::new();
        m.insert(
            field.tag.clone(),
            json!({
                "ind1": field.ind1.to_string(),
                "ind2": field.ind2.to_string(),
                "subfields": subfields,
            }),
        );
        fields.push(Value::Object(m));
    }
    json!({ "leader": record.leader, "fields": fields })
}

/// ISO 2709 transmission format
pub fn to_iso2709(record: &MarcRecord) -> Result<Vec<u8>, MarcWriteError> {
    if record.leader.len() != 24 || !record.leader.is_ascii() {
        return Err(MarcWriteError::BadLeader);
    }

    let mut entries: Vec<(&str, Vec<u8>)> = Vec::new();
    for field in &record.control_fields {
        let mut data = field.value.as_bytes().to_vec();
        data.push(FIELD_TERMINATOR);
        entries.push((field.tag.as_str(), data));
    }
    for field in &record.data_fields {
        let mut data = Vec::new();
        let mut buf = [0u8; 4];
        data.extend_from_slice(field.ind1.encode_utf8(&mut buf).as_bytes());
        data.extend_from_slice(field.ind2.encode_utf8(&mut buf).as_bytes());
        for sf in &field.subfields {
            data.push(SUBFIELD_DELIMITER);
            data.extend_from_slice(sf.code.encode_utf8(&mut buf).as_bytes());
            data.extend_from_slice(sf.data.as_bytes());
        }
        data.push(FIELD_TERMINATOR);
        entries.push((field.tag.as_str(), data));
    }

    let mut directory = Vec::with_capacity(entries.len() * 12 + 1);
    let mut body = Vec::new();
    for (tag, data) in &entries {
        if data.len() > 9999 {
            return Err(MarcWriteError::FieldTooLong(tag.to_string()));
        }
        directory.extend_from_slice(format!("{}{:04}{:05}", tag, data.len(), body.len()).as_bytes());
        body.extend_from_slice(data);
    }
    directory.push(FIELD_TERMINATOR);

    let base_address = 24 + directory.len();
    let record_length = base_address + body.len() + 1;
    if record_length > 99999 {
        return Err(MarcWriteError::RecordTooLong);
    }

    let mut leader = record.leader.clone().into_bytes();
    leader[0..5].copy_from_slice(format!("{:05}", record_length).as_bytes());
    leader[12..17].copy_from_slice(format!("{:05}", base_address).as_bytes());

    let mut out = Vec::with_capacity(record_length);
    out.extend_from_slice(&leader);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&body);
    out.push(RECORD_TERMINATOR);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marc::record::DataField;

    fn sample() -> MarcRecord {
        let mut record = MarcRecord::new("00000ndc a2200000 i 4500".to_string());
        record.add_control_field("001", "MS000001");
        record.add_field(DataField::new("245", '0', '0').sub('a', "Missa").sub('c', "Zelenka"));
        record
    }

    #[test]
    fn test_text_output() {
        let text = to_text(&sample());
        assert!(text.starts_with("=LDR  00000ndc\\a2200000\\i\\4500\n"));
        assert!(text.contains("=001  MS000001\n"));
        assert!(text.contains("=245  00$aMissa$cZelenka\n"));
    }

    #[test]
    fn test_json_output() {
        let value = to_json(&sample());
        assert_eq!(value["fields"][0]["001"], "MS000001");
        assert_eq!(value["fields"][1]["245"]["ind1"], "0");
        assert_eq!(value["fields"][1]["245"]["subfields"][1]["c"], "Zelenka");
    }

    #[test]
    fn test_iso2709_layout() {
        let bytes = to_iso2709(&sample()).unwrap();

        // leader + 2 directory entries + terminator
        let base_address = 24 + 2 * 12 + 1;
        assert_eq!(&bytes[12..17], format!("{:05}", base_address).as_bytes());
        assert_eq!(&bytes[0..5], format!("{:05}", bytes.len()).as_bytes());
        assert_eq!(*bytes.last().unwrap(), RECORD_TERMINATOR);

        // first directory entry: 001, "MS000001" + terminator, offset 0
        assert_eq!(&bytes[24..36], b"001000900000");
        assert_eq!(&bytes[base_address..base_address + 8], b"MS000001");
        // 245 starts with its indicators right after the 001 terminator
        assert_eq!(&bytes[base_address + 9..base_address + 11], b"00");
        assert_eq!(bytes[base_address + 11], SUBFIELD_DELIMITER);
    }

    #[test]
    fn test_iso2709_counts_bytes_not_chars() {
        let mut record = MarcRecord::new("00000ncc a2200000 i 4500".to_string());
        record.add_field(DataField::new("100", '1', ' ').sub('a', "Dvořák"));
        let bytes = to_iso2709(&record).unwrap();
        // ind(2) + delimiter + code + "Dvořák" (8 bytes) + terminator
        assert_eq!(&bytes[24..31], b"1000013");
    }

    #[test]
    fn test_bad_leader() {
        let record = MarcRecord::new("short".to_string());
        assert_eq!(to_iso2709(&record), Err(MarcWriteError::BadLeader));
    }
}
