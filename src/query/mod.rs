//! Path queries over [`Document`](crate::tree::Document) trees.
//!
//! The patch engine only depends on [`QueryResolver`]. [`PathResolver`] is the
//! bundled implementation and understands the location-path subset that XML
//! patch files use in practice: `/` and `//` steps, name tests, `*`, `.`, `..`,
//! `text()`, `comment()`, `node()`, unions with `|`, and predicates built from
//! positions, `last()`, attribute and child comparisons, `not()`, `and`, `or`.

pub mod cache;
pub mod errors;
pub mod path;
pub mod resolver;

pub use errors::QueryError;
pub use path::{Axis, Comparison, LocationPath, NodeTest, PathExpr, Predicate, Step};
pub use resolver::{PathResolver, QueryResolver};
