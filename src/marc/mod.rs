//! MARC21 record building and serialization
//!
//! Works are translated into an in-memory [`MarcRecord`] and written out as
//! mnemonic text, MARC-in-JSON or ISO 2709.

pub mod record;
pub mod translator;
pub mod writer;

pub use record::{DataField, MarcRecord, Subfield};
pub use translator::MarcTranslator;
pub use writer::MarcOutput;
