mod document_store_actor;
mod document_store_builder;
mod document_store_error;
mod document_store_handle;
mod document_store_helpers;

pub use document_store_actor::*;
pub use document_store_builder::*;
pub use document_store_error::*;
pub use document_store_handle::*;
pub use document_store_helpers::*;
