//! Patch database, the operation applier and the preservation pruner.

pub mod applicator;
pub mod loader;
pub mod preserve;
pub mod pruner;
pub mod schema;

pub use applicator::{ApplyError, Diagnostic, DiagnosticKind, OperationReport, PatchApplier};
pub use loader::{discover_patch_files, dump_to_string, load_from_path, load_from_str, load_mod, LoadError};
pub use preserve::{DepthBound, PreservationMarks};
pub use pruner::{prune, strip_comments, PruneReport};
pub use schema::{
    Operation, Order, PatchDatabase, PatchEntry, TargetOperations, Template, ValidationError,
    ValidationIssue,
};
