pub mod encoder;

pub use encoder::{Document, DocumentEncoder, SourceFile};
