//! Arena-backed XML document tree.
//!
//! Nodes live in a single `Vec` and are addressed by [`NodeId`]. Children are
//! owned through index lists; the parent index is only used for traversal.
//! Detaching a node leaves its slot behind as an unreachable tombstone, so a
//! `NodeId` handed out once never points at a different node later.

pub mod document;
pub mod errors;
pub mod parser;
pub mod writer;

pub use document::{Descendants, Document, Element, NodeId, NodeKind};
pub use errors::TreeError;
pub use parser::parse;
pub use writer::{to_string, WriteOptions};
