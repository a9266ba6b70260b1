mod loader;
pub mod raw;
pub mod error;

pub use error::ConfigError;
pub use loader::{
    load_source_document, load_storage_document, write_source_document, write_storage_document,
};
pub use raw::RawStorageDocument;
