//! defpatch: applies hierarchical XML patch operations to base data files
//!
//! Each patch names the file it targets. For every target the base file is
//! parsed into an arena tree, every operation is resolved through a path query
//! and applied in order, and the result is pruned down to a per-file depth
//! bound before it is written under the mod directory as a partial copy.
//!
//! # Architecture
//!
//! - [`tree`]: arena document tree, XML parser and writer
//! - [`query`]: the path-query subset behind the [`QueryResolver`] trait
//! - [`patch`]: patch database, applier, preservation marks and pruner
//! - [`config`]: run configuration and per-file depth lookup
//! - [`session`]: the per-file pipeline tying the pieces together
//!
//! # Preservation
//!
//! Edits mark the touched node and its ancestors, but only inside the region
//! the pruner inspects (depth at most `MaxDepth + 1`). Marks live in a side
//! table and never reach the output.
//!
//! # Example
//!
//! ```
//! use defpatch::patch::{load_from_str, prune, DepthBound, PatchApplier, PreservationMarks};
//! use defpatch::query::PathResolver;
//! use defpatch::tree::{parse, to_string, WriteOptions};
//!
//! let database = load_from_str(
//!     r#"<Patch File="Defs.xml">
//!          <Operation Class="AttributeSet">
//!            <xpath>/Root/B</xpath>
//!            <attribute>flag</attribute>
//!            <value>yes</value>
//!          </Operation>
//!        </Patch>"#,
//! )
//! .unwrap();
//!
//! let mut document = parse("<Root><A/><B/></Root>").unwrap();
//! let bound = DepthBound::Limited(0);
//! let resolver = PathResolver::new();
//! let applier = PatchApplier::new(&resolver, bound);
//! let mut marks = PreservationMarks::new();
//! for operation in &database.entries[0].operations {
//!     applier.apply(&mut document, &mut marks, operation).unwrap();
//! }
//! prune(&mut document, marks, bound);
//!
//! let xml = to_string(&document, &WriteOptions::compact()).unwrap();
//! assert_eq!(xml, r#"<Root><B flag="yes"/></Root>"#);
//! ```

pub mod config;
pub mod output;
pub mod patch;
pub mod query;
pub mod session;
pub mod tree;

// Re-exports
pub use config::{load_for_mod, ConfigError, DepthTable, RunConfig};
pub use patch::{
    ApplyError, DepthBound, LoadError, Operation, PatchApplier, PatchDatabase, PreservationMarks,
};
pub use query::{PathResolver, QueryError, QueryResolver};
pub use session::{run, FileReport, FileStatus, RunOptions, RunReport, SessionError};
pub use tree::{Document, NodeId, TreeError};
