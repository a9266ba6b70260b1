pub mod catalog;
pub mod engine;
pub mod error;
pub mod formula;
pub mod path;
pub mod transform;

pub use catalog::MappingCatalog;
pub use engine::{apply_rule, autogenerate, MappingEngine};
pub use error::MappingError;
