use crate::tree::{Document, Element, NodeId};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Canonical, merged list of patch entries in application order.
#[derive(Debug, Clone, Default)]
pub struct PatchDatabase {
    pub entries: Vec<PatchEntry>,
}

#[derive(Debug, Clone)]
pub struct PatchEntry {
    /// Target file, relative to the base-data directory or a bare file name.
    pub file: String,
    /// Patch file the entry was read from, when known.
    pub source: Option<PathBuf>,
    pub operations: Vec<Operation>,
}

/// All operations for one target file, in database order.
#[derive(Debug, Clone)]
pub struct TargetOperations<'a> {
    pub file: &'a str,
    pub operations: Vec<&'a Operation>,
}

impl PatchDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extend(&mut self, other: PatchDatabase) {
        self.entries.extend(other.entries);
    }

    pub fn operation_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.operations.len()).sum()
    }

    /// Groups operations by target file.
    ///
    /// Targets appear in the order their first entry appears; within a target,
    /// operations keep entry order and then in-entry order.
    pub fn targets(&self) -> Vec<TargetOperations<'_>> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut targets: Vec<TargetOperations<'_>> = Vec::new();

        for entry in &self.entries {
            let slot = *index.entry(entry.file.as_str()).or_insert_with(|| {
                targets.push(TargetOperations {
                    file: entry.file.as_str(),
                    operations: Vec::new(),
                });
                targets.len() - 1
            });
            targets[slot].operations.extend(entry.operations.iter());
        }

        targets
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Prepend,
    Append,
}

impl Order {
    /// Case-insensitive parse of `prepend` / `append`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("prepend") {
            Some(Order::Prepend)
        } else if input.eq_ignore_ascii_case("append") {
            Some(Order::Append)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Order::Prepend => "Prepend",
            Order::Append => "Append",
        }
    }
}

/// Subtree carried by `Add`, `Insert` and `Replace`.
///
/// The wrapper element stands for the `<value>` node; only its children are
/// ever imported into a target document.
#[derive(Debug, Clone)]
pub struct Template {
    document: Document,
}

impl Template {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    /// Builds a template from the children of `value` in `source`.
    pub fn from_children(source: &Document, value: NodeId) -> Self {
        let mut document = Document::new(Element::new("value"));
        let root = document.root();
        for child in source.children(value) {
            let copy = document.import(source, *child);
            document.append_child(root, copy);
        }
        Self { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn nodes(&self) -> &[NodeId] {
        self.document.children(self.document.root())
    }

    pub fn first(&self) -> Option<NodeId> {
        self.nodes().first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum Operation {
    Add {
        xpath: String,
        order: Option<Order>,
        value: Template,
    },
    Insert {
        xpath: String,
        order: Option<Order>,
        value: Template,
    },
    Remove {
        xpath: String,
    },
    Replace {
        xpath: String,
        value: Template,
    },
    AttributeAdd {
        xpath: String,
        attribute: String,
        value: String,
    },
    AttributeSet {
        xpath: String,
        attribute: String,
        value: String,
    },
    AttributeRemove {
        xpath: String,
        attribute: String,
    },
    /// A class name the engine does not know. Kept so it can be reported
    /// when its file is processed instead of failing the whole load.
    Unsupported {
        class: String,
        xpath: String,
    },
}

impl Operation {
    pub const CLASSES: [&'static str; 7] = [
        "Add",
        "Insert",
        "Remove",
        "Replace",
        "AttributeAdd",
        "AttributeSet",
        "AttributeRemove",
    ];

    pub fn xpath(&self) -> &str {
        match self {
            Operation::Add { xpath, .. }
            | Operation::Insert { xpath, .. }
            | Operation::Remove { xpath }
            | Operation::Replace { xpath, .. }
            | Operation::AttributeAdd { xpath, .. }
            | Operation::AttributeSet { xpath, .. }
            | Operation::AttributeRemove { xpath, .. }
            | Operation::Unsupported { xpath, .. } => xpath,
        }
    }

    pub fn class(&self) -> &str {
        match self {
            Operation::Add { .. } => "Add",
            Operation::Insert { .. } => "Insert",
            Operation::Remove { .. } => "Remove",
            Operation::Replace { .. } => "Replace",
            Operation::AttributeAdd { .. } => "AttributeAdd",
            Operation::AttributeSet { .. } => "AttributeSet",
            Operation::AttributeRemove { .. } => "AttributeRemove",
            Operation::Unsupported { class, .. } => class,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Operation::Unsupported { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    UnexpectedRoot {
        name: String,
    },
    UnexpectedElement {
        name: String,
    },
    MissingFile,
    MissingField {
        file: String,
        class: String,
        field: &'static str,
    },
    InvalidField {
        file: String,
        class: String,
        field: &'static str,
        value: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::UnexpectedRoot { name } => {
                write!(f, "expected <Patches> or <Patch> root, found <{name}>")
            }
            ValidationIssue::UnexpectedElement { name } => {
                write!(f, "unexpected element <{name}>")
            }
            ValidationIssue::MissingFile => write!(f, "patch is missing its 'File' attribute"),
            ValidationIssue::MissingField { file, class, field } => {
                write!(f, "{class} operation for '{file}' missing required field '{field}'")
            }
            ValidationIssue::InvalidField {
                file,
                class,
                field,
                value,
            } => write!(
                f,
                "{class} operation for '{file}' has invalid {field} '{value}'"
            ),
        }
    }
}
