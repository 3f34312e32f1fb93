//! Traits defined in `foldertree-core` and implemented outside the tree core.

pub mod document;

pub use document::DocumentStore;
