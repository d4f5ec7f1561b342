#![allow(unused_doc_comments)]

mod builder;
mod closure;
mod codec;
mod error;
mod expander;
mod loader;
mod reducer;
mod registry;
mod store;

pub use builder::Builder;
pub use builder::BuilderConfig;
pub use builder::StateVerticesIter;
pub use builder::StorageDsn;
pub use error::Error;
pub use error::ValidationError;
