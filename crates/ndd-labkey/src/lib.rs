//! LabKey query API access.
//!
//! [`LabkeyApi`] covers the three calls the pipeline makes; the helpers in
//! [`ops`] add the single-row insert and update-or-insert used when
//! identifiers are assigned.

pub mod api;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod ops;

pub use api::{LabkeyApi, Row, row, row_from_record};
pub use client::LabkeyClient;
pub use error::{LabkeyError, Result};
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryLabkey;
pub use ops::{Upsert, insert_row, next_subject_id, upsert_row};
