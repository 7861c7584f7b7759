//! Writing support
//!
//! Serialization of the object model back to PDF syntax and the
//! incremental-update writer built on top of it.

pub mod incremental;
pub mod serializer;

pub use self::incremental::IncrementalUpdate;
pub use self::serializer::{format_pdf_date, serialize_object};
