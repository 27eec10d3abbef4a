//! Data models for Musicat

pub mod authority;
pub mod enums;
pub mod scan;
pub mod user;
pub mod work;

// Re-export commonly used types
pub use authority::{Authority, AuthorityRef};
pub use enums::{AuthorityKind, BibliographicLevel, LinkKind, RecordType, UserRole};
pub use scan::Scan;
pub use user::{User, UserClaims};
pub use work::{Work, WorkDraft, WorkLink, WorkSummary};
