//! The shared session document and the store that guards it.
//!
//! - [`model`]: document, entry and note types with their status machines
//! - [`ownership`]: which role may change which field
//! - [`store`]: locked read-modify-write of `_session.json`

pub mod model;
pub mod ownership;
pub mod store;

pub use model::{
    InitiatorStatus, Note, ReviewEntry, ReviewPhase, ReviewerStatus, Role, SCHEMA_VERSION,
    SessionDocument, SeverityCounts, Verdict,
};
pub use store::{SessionSeed, SessionStore};
