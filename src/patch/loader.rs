use crate::patch::schema::{
    Operation, Order, PatchDatabase, PatchEntry, Template, ValidationError, ValidationIssue,
};
use crate::tree::{self, Document, Element, NodeId, NodeKind, TreeError, WriteOptions};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Directory under a mod that holds patch files.
pub const PATCH_DIR: &str = "Patches";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read patch file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk patch directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("malformed patch XML{}: {source}", display_path(.path))]
    Xml {
        path: Option<PathBuf>,
        #[source]
        source: TreeError,
    },

    #[error("invalid patch file{}:\n{source}", display_path(.path))]
    Validation {
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" ({})", path.display()),
        None => String::new(),
    }
}

impl LoadError {
    fn with_path(self, path: &Path) -> Self {
        let path = Some(path.to_path_buf());
        match self {
            LoadError::Xml { path: None, source } => LoadError::Xml { path, source },
            LoadError::Validation { path: None, source } => LoadError::Validation { path, source },
            other => other,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchDatabase, LoadError> {
    let document = tree::parse(input).map_err(|source| LoadError::Xml { path: None, source })?;
    let mut issues = Vec::new();
    let entries = read_database(&document, &mut issues);
    if !issues.is_empty() {
        return Err(LoadError::Validation {
            path: None,
            source: ValidationError { issues },
        });
    }
    Ok(PatchDatabase { entries })
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchDatabase, LoadError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut database = load_from_str(&contents).map_err(|error| error.with_path(path))?;
    for entry in &mut database.entries {
        entry.source = Some(path.to_path_buf());
    }
    Ok(database)
}

/// All `.xml` files under `<mod_dir>/Patches`, sorted by path.
///
/// A mod without a patch directory has no patches.
pub fn discover_patch_files(mod_dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let patches_dir = mod_dir.join(PATCH_DIR);
    if !patches_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&patches_dir) {
        let entry = entry.map_err(|source| LoadError::Walk {
            path: patches_dir.clone(),
            source,
        })?;
        let is_xml = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if entry.file_type().is_file() && is_xml {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Load and merge every patch file of a mod, in discovery order.
pub fn load_mod(mod_dir: &Path) -> Result<PatchDatabase, LoadError> {
    let mut database = PatchDatabase::new();
    for path in discover_patch_files(mod_dir)? {
        let loaded = load_from_path(&path)?;
        debug!(
            path = %path.display(),
            entries = loaded.entries.len(),
            "loaded patch file"
        );
        database.extend(loaded);
    }
    Ok(database)
}

fn read_database(document: &Document, issues: &mut Vec<ValidationIssue>) -> Vec<PatchEntry> {
    let root = document.root();
    match document.name(root) {
        Some("Patches") => document
            .child_elements(root)
            .filter_map(|child| {
                if document.name(child) == Some("Patch") {
                    read_patch(document, child, issues)
                } else {
                    issues.push(ValidationIssue::UnexpectedElement {
                        name: document.name(child).unwrap_or_default().to_string(),
                    });
                    None
                }
            })
            .collect(),
        Some("Patch") => read_patch(document, root, issues).into_iter().collect(),
        other => {
            issues.push(ValidationIssue::UnexpectedRoot {
                name: other.unwrap_or_default().to_string(),
            });
            Vec::new()
        }
    }
}

fn read_patch(document: &Document, patch: NodeId, issues: &mut Vec<ValidationIssue>) -> Option<PatchEntry> {
    let element = document.element(patch)?;
    let Some(file) = element
        .attribute("File")
        .or_else(|| element.attribute("file"))
        .map(str::trim)
        .filter(|file| !file.is_empty())
    else {
        issues.push(ValidationIssue::MissingFile);
        return None;
    };

    let mut operations = Vec::new();
    for child in document.child_elements(patch) {
        if document.name(child) != Some("Operation") {
            issues.push(ValidationIssue::UnexpectedElement {
                name: document.name(child).unwrap_or_default().to_string(),
            });
            continue;
        }
        if let Some(operation) = read_operation(document, child, file, issues) {
            operations.push(operation);
        }
    }

    Some(PatchEntry {
        file: file.to_string(),
        source: None,
        operations,
    })
}

fn read_operation(
    document: &Document,
    node: NodeId,
    file: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Operation> {
    let class = document
        .element(node)
        .and_then(|element| element.attribute("Class"))
        .unwrap_or_default()
        .trim()
        .to_string();
    let field = |name: &str| {
        document
            .child_elements(node)
            .find(|child| document.name(*child) == Some(name))
    };
    let missing = |field: &'static str| ValidationIssue::MissingField {
        file: file.to_string(),
        class: class.clone(),
        field,
    };

    if class.is_empty() {
        issues.push(missing("Class"));
        return None;
    }

    let xpath = match field("xpath").map(|id| document.text_content(id)) {
        Some(xpath) if !xpath.trim().is_empty() => xpath.trim().to_string(),
        _ => {
            issues.push(missing("xpath"));
            return None;
        }
    };

    let template = || field("value").map(|value| Template::from_children(document, value));
    let scalar = || field("value").map(|value| document.text_content(value));
    let attribute = || {
        field("attribute")
            .map(|id| document.text_content(id).trim().to_string())
            .filter(|name| !name.is_empty())
    };

    let order = match field("order").map(|id| document.text_content(id)) {
        None => None,
        Some(text) => match Order::parse(&text) {
            Some(order) => Some(order),
            None => {
                issues.push(ValidationIssue::InvalidField {
                    file: file.to_string(),
                    class: class.clone(),
                    field: "order",
                    value: text,
                });
                return None;
            }
        },
    };

    let operation = match class.as_str() {
        "Add" | "Insert" | "Replace" => {
            let Some(value) = template().filter(|value| !value.is_empty()) else {
                issues.push(missing("value"));
                return None;
            };
            match class.as_str() {
                "Add" => Operation::Add { xpath, order, value },
                "Insert" => Operation::Insert { xpath, order, value },
                _ => Operation::Replace { xpath, value },
            }
        }
        "Remove" => Operation::Remove { xpath },
        "AttributeAdd" | "AttributeSet" => {
            let Some(attribute) = attribute() else {
                issues.push(missing("attribute"));
                return None;
            };
            let Some(value) = scalar() else {
                issues.push(missing("value"));
                return None;
            };
            if class == "AttributeAdd" {
                Operation::AttributeAdd { xpath, attribute, value }
            } else {
                Operation::AttributeSet { xpath, attribute, value }
            }
        }
        "AttributeRemove" => {
            let Some(attribute) = attribute() else {
                issues.push(missing("attribute"));
                return None;
            };
            Operation::AttributeRemove { xpath, attribute }
        }
        _ => Operation::Unsupported {
            class: class.clone(),
            xpath,
        },
    };
    Some(operation)
}

/// Render the merged database as a single `<Patches>` document.
pub fn dump_to_string(database: &PatchDatabase) -> Result<String, TreeError> {
    tree::to_string(&to_document(database), &WriteOptions::default())
}

fn to_document(database: &PatchDatabase) -> Document {
    let mut document = Document::new(Element::new("Patches"));
    let root = document.root();

    for entry in &database.entries {
        let patch = document.create(NodeKind::Element(
            Element::new("Patch").with_attribute("File", entry.file.as_str()),
        ));
        document.append_child(root, patch);
        if let Some(source) = &entry.source {
            let note = document.create(NodeKind::Comment(format!(" {} ", source.display())));
            document.append_child(patch, note);
        }

        for operation in &entry.operations {
            let node = document.create(NodeKind::Element(
                Element::new("Operation").with_attribute("Class", operation.class()),
            ));
            document.append_child(patch, node);
            append_text_field(&mut document, node, "xpath", operation.xpath());

            match operation {
                Operation::Add { order, value, .. } | Operation::Insert { order, value, .. } => {
                    if let Some(order) = order {
                        append_text_field(&mut document, node, "order", order.as_str());
                    }
                    append_template(&mut document, node, value);
                }
                Operation::Replace { value, .. } => append_template(&mut document, node, value),
                Operation::AttributeAdd { attribute, value, .. }
                | Operation::AttributeSet { attribute, value, .. } => {
                    append_text_field(&mut document, node, "attribute", attribute);
                    append_text_field(&mut document, node, "value", value);
                }
                Operation::AttributeRemove { attribute, .. } => {
                    append_text_field(&mut document, node, "attribute", attribute);
                }
                Operation::Remove { .. } | Operation::Unsupported { .. } => {}
            }
        }
    }

    document
}

fn append_text_field(document: &mut Document, parent: NodeId, name: &str, text: &str) {
    let field = document.create(NodeKind::Element(Element::new(name)));
    document.append_child(parent, field);
    if !text.is_empty() {
        let text = document.create(NodeKind::Text(text.to_string()));
        document.append_child(field, text);
    }
}

fn append_template(document: &mut Document, parent: NodeId, template: &Template) {
    let value = document.import(template.document(), template.document().root());
    document.append_child(parent, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCHES: &str = r#"
<Patches>
  <Patch File="Races.xml">
    <Operation Class="Add">
      <xpath>/Defs/ThingDef[defName="Human"]/comps</xpath>
      <order>prepend</order>
      <value><li Class="CompA"/><li>text</li></value>
    </Operation>
    <Operation Class="AttributeSet">
      <xpath>/Defs/ThingDef</xpath>
      <attribute>ParentName</attribute>
      <value>BaseHuman</value>
    </Operation>
    <Operation Class="Sequence">
      <xpath>/Defs</xpath>
    </Operation>
  </Patch>
  <Patch File="Items/Misc.xml">
    <Operation Class="Remove"><xpath>/Defs/ThingDef[1]</xpath></Operation>
  </Patch>
</Patches>"#;

    #[test]
    fn loads_all_operation_shapes() {
        let db = load_from_str(PATCHES).unwrap();
        assert_eq!(db.entries.len(), 2);
        let ops = &db.entries[0].operations;
        assert_eq!(ops.len(), 3);

        match &ops[0] {
            Operation::Add { order, value, xpath } => {
                assert_eq!(*order, Some(Order::Prepend));
                assert_eq!(value.nodes().len(), 2);
                assert_eq!(xpath, r#"/Defs/ThingDef[defName="Human"]/comps"#);
            }
            other => panic!("expected Add, got {other:?}"),
        }
        match &ops[1] {
            Operation::AttributeSet { attribute, value, .. } => {
                assert_eq!(attribute, "ParentName");
                assert_eq!(value, "BaseHuman");
            }
            other => panic!("expected AttributeSet, got {other:?}"),
        }
        assert!(matches!(&ops[2], Operation::Unsupported { class, .. } if class == "Sequence"));
        assert_eq!(db.entries[1].file, "Items/Misc.xml");
    }

    #[test]
    fn accepts_single_patch_root() {
        let db = load_from_str(
            r#"<Patch File="a.xml"><Operation Class="Remove"><xpath>/A/B</xpath></Operation></Patch>"#,
        )
        .unwrap();
        assert_eq!(db.entries.len(), 1);
        assert_eq!(db.operation_count(), 1);
    }

    #[test]
    fn collects_every_validation_issue() {
        let err = load_from_str(
            r#"<Patches>
  <Patch><Operation Class="Remove"><xpath>/A</xpath></Operation></Patch>
  <Patch File="a.xml">
    <Operation Class="Add"><xpath>/A</xpath></Operation>
    <Operation Class="AttributeSet"><xpath>/A</xpath><value>1</value></Operation>
    <Operation Class="Insert"><xpath>/A</xpath><order>sideways</order><value><x/></value></Operation>
    <Operation><xpath>/A</xpath></Operation>
  </Patch>
</Patches>"#,
        )
        .unwrap_err();

        let LoadError::Validation { source, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(source.issues.len(), 5);
        assert_eq!(source.issues[0], ValidationIssue::MissingFile);
        assert!(matches!(
            &source.issues[1],
            ValidationIssue::MissingField { field: "value", .. }
        ));
        assert!(matches!(
            &source.issues[2],
            ValidationIssue::MissingField { field: "attribute", .. }
        ));
        assert!(matches!(
            &source.issues[3],
            ValidationIssue::InvalidField { field: "order", .. }
        ));
        assert!(matches!(
            &source.issues[4],
            ValidationIssue::MissingField { field: "Class", .. }
        ));
    }

    #[test]
    fn rejects_unknown_root() {
        assert!(matches!(
            load_from_str("<Defs/>"),
            Err(LoadError::Validation { .. })
        ));
    }

    #[test]
    fn dump_round_trips_through_loader() {
        let db = load_from_str(PATCHES).unwrap();
        let dumped = dump_to_string(&db).unwrap();
        let reloaded = load_from_str(&dumped).unwrap();
        assert_eq!(reloaded.operation_count(), db.operation_count());
        assert_eq!(reloaded.entries[0].operations[0].class(), "Add");
    }

    #[test]
    fn discovers_nested_patch_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let patches = dir.path().join(PATCH_DIR);
        fs::create_dir_all(patches.join("sub")).unwrap();
        fs::write(patches.join("b.xml"), "<Patches/>").unwrap();
        fs::write(patches.join("sub/a.xml"), "<Patches/>").unwrap();
        fs::write(patches.join("notes.txt"), "").unwrap();

        let files = discover_patch_files(dir.path()).unwrap();
        assert_eq!(files, vec![patches.join("b.xml"), patches.join("sub/a.xml")]);
    }

    #[test]
    fn missing_patch_dir_means_no_patches() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_mod(dir.path()).unwrap().is_empty());
    }
}
