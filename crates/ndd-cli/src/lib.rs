//! Library side of the `ndd` binary.

pub mod logging;
