//! Tabulated stopping powers read from one or more data files.

pub mod header;
pub mod source;
pub mod table;

pub use header::{END_OF_HEADER, read_header, write_header};
pub use source::{SourceDescriptor, StoppingSource};
pub use table::StoppingTable;
