//! Offline export
//!
//! Renders a processor through an [`OfflineHost`](crate::host::OfflineHost)
//! and writes the result to disk.

pub mod wav;
