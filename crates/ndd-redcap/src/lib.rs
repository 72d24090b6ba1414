//! REDCap API access.
//!
//! [`RedcapApi`] is the seam the ETL, the webhook server and the transforms
//! program against; [`RedcapClient`] implements it over HTTP.

pub mod api;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod response;

pub use api::{RecordQuery, RedcapApi};
pub use client::RedcapClient;
pub use error::{RedcapError, Result};
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryRedcap;
