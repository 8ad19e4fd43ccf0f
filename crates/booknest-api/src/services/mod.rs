//! Write paths that span several store calls. Handlers with a single store
//! call talk to the store directly.

pub mod novels;
pub mod settings;
pub mod tags;
