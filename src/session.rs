//! Run pipeline - turns a mod's patch database into partial copies of base files
//!
//! A run:
//! - Checks that the base-data and mod directories exist and that the mod carries
//!   readable metadata
//! - Loads every patch file of the mod into one database
//! - Resolves each target to the base files it names
//! - Applies, prunes and serializes each file, writing the result under the mod
//!
//! Failures inside one file are recorded in that file's report and the run
//! moves on to the next file.

use crate::config::{DepthTable, RunConfig};
use crate::output::{self, OutputError, WriteOutcome};
use crate::patch::{
    self, ApplyError, DepthBound, Diagnostic, LoadError, Operation, PatchApplier, PatchDatabase,
    PreservationMarks, PruneReport,
};
use crate::query::PathResolver;
use crate::tree::{self, TreeError, WriteOptions};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Mod metadata file that must exist for a directory to count as a mod.
pub const METADATA_FILE: &str = "About/About.xml";

/// Errors that stop the whole run before any file is written.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("base-data directory does not exist: {0}")]
    MissingBaseDir(PathBuf),

    #[error("mod directory does not exist: {0}")]
    MissingModDir(PathBuf),

    #[error("mod metadata not found: {0}")]
    MissingMetadata(PathBuf),

    #[error("malformed mod metadata {path}: {source}")]
    MalformedMetadata {
        path: PathBuf,
        #[source]
        source: TreeError,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to index base-data directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to serialize patch database: {0}")]
    Dump(#[source] TreeError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Why a single file could not be produced.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("failed to read base file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to parse base file: {0}")]
    Parse(#[source] TreeError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("failed to serialize result: {0}")]
    Serialize(#[source] TreeError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub base_dir: PathBuf,
    pub mod_dir: PathBuf,
    /// Subdirectory of the mod that receives the output tree.
    pub output_prefix: Option<PathBuf>,
    pub depths: DepthTable,
    pub remove_comments: bool,
    /// Where to write the merged patch database.
    pub dump: Option<PathBuf>,
    pub dry_run: bool,
    /// Keep the serialized base next to the output, for diffing.
    pub keep_base: bool,
    pub write: WriteOptions,
}

impl RunOptions {
    pub fn new(base_dir: impl Into<PathBuf>, mod_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            mod_dir: mod_dir.into(),
            output_prefix: None,
            depths: DepthTable::default(),
            remove_comments: false,
            dump: None,
            dry_run: false,
            keep_base: false,
            write: WriteOptions::default(),
        }
    }

    /// Options seeded from a run config. A relative dump path is taken relative to the mod.
    pub fn from_config(
        base_dir: impl Into<PathBuf>,
        mod_dir: impl Into<PathBuf>,
        config: &RunConfig,
        mod_type: Option<&str>,
    ) -> Self {
        let mut options = Self::new(base_dir, mod_dir);
        options.output_prefix = config.run.output_prefix.clone();
        options.remove_comments = config.run.remove_comments;
        options.depths = DepthTable::from_config(config, mod_type);
        options.dump = config
            .run
            .dump_database
            .as_ref()
            .map(|path| options.mod_dir.join(path));
        options
    }

    /// `<mod>/<prefix?>/<base-dir name>/<relative path>`
    pub fn output_path(&self, relative: &str) -> PathBuf {
        let mut path = self.mod_dir.clone();
        if let Some(prefix) = &self.output_prefix {
            path.push(prefix);
        }
        path.push(base_dir_name(&self.base_dir));
        path.extend(relative.split('/'));
        path
    }
}

fn base_dir_name(base_dir: &Path) -> PathBuf {
    base_dir
        .file_name()
        .map(PathBuf::from)
        .or_else(|| {
            fs::canonicalize(base_dir)
                .ok()
                .and_then(|path| path.file_name().map(PathBuf::from))
        })
        .unwrap_or_else(|| PathBuf::from("base"))
}

#[derive(Debug)]
pub enum FileStatus {
    Written { bytes: usize },
    /// The output on disk already matched.
    Unchanged,
    /// Dry run: rendered but not written.
    Rendered,
    /// No base file matches the target.
    Skipped,
    Failed(FileError),
}

impl FileStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, FileStatus::Failed(_))
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Written { bytes } => write!(f, "written ({bytes} bytes)"),
            FileStatus::Unchanged => write!(f, "unchanged"),
            FileStatus::Rendered => write!(f, "rendered (dry run)"),
            FileStatus::Skipped => write!(f, "skipped (no base file)"),
            FileStatus::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

/// Outcome for one base file, or for one target that matched no base file.
#[derive(Debug)]
pub struct FileReport {
    /// Relative path under the base-data directory, or the target id when skipped.
    pub file: String,
    /// Patch targets that resolved to this file.
    pub targets: Vec<String>,
    pub output: Option<PathBuf>,
    pub bound: Option<DepthBound>,
    pub operations: usize,
    pub changed: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub prune: PruneReport,
    pub status: FileStatus,
    /// Serialized output, kept for dry runs and when the base is kept.
    pub rendered: Option<String>,
    /// Serialized, unpatched base, kept when requested.
    pub base_rendered: Option<String>,
}

impl FileReport {
    fn new(file: impl Into<String>, targets: Vec<String>, status: FileStatus) -> Self {
        Self {
            file: file.into(),
            targets,
            output: None,
            bound: None,
            operations: 0,
            changed: 0,
            diagnostics: Vec::new(),
            prune: PruneReport::default(),
            status,
            rendered: None,
            base_rendered: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub operations: usize,
    pub dump: Option<PathBuf>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.files.iter().filter(|file| file.status.is_failed()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Fail unless `<mod_dir>/About/About.xml` exists and is well-formed XML.
pub fn check_mod_metadata(mod_dir: &Path) -> Result<(), SessionError> {
    if !mod_dir.is_dir() {
        return Err(SessionError::MissingModDir(mod_dir.to_path_buf()));
    }
    let path = mod_dir.join(METADATA_FILE);
    if !path.is_file() {
        return Err(SessionError::MissingMetadata(path));
    }
    let contents = fs::read_to_string(&path).map_err(|source| SessionError::Io {
        path: path.clone(),
        source,
    })?;
    tree::parse(&contents).map_err(|source| SessionError::MalformedMetadata { path, source })?;
    Ok(())
}

/// Files under the base-data directory, addressable by relative path or bare name.
#[derive(Debug, Default)]
pub struct BaseIndex {
    paths: Vec<String>,
    by_name: HashMap<String, Vec<usize>>,
}

impl BaseIndex {
    pub fn scan(base_dir: &Path) -> Result<Self, SessionError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(base_dir) {
            let entry = entry.map_err(|source| SessionError::Walk {
                path: base_dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(base_dir) else {
                continue;
            };
            let relative: Vec<String> = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect();
            paths.push(relative.join("/"));
        }
        Ok(Self::from_paths(paths))
    }

    pub fn from_paths(mut paths: Vec<String>) -> Self {
        paths.sort();
        paths.dedup();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, path) in paths.iter().enumerate() {
            let name = path.rsplit('/').next().unwrap_or(path);
            by_name.entry(name.to_string()).or_default().push(idx);
        }
        Self { paths, by_name }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Base files a target names. Matching is case-sensitive.
    pub fn resolve(&self, target: &str) -> Vec<&str> {
        let target = target.replace('\\', "/");
        let target = target.trim_start_matches("./");
        if target.contains('/') {
            self.paths
                .binary_search_by(|path| path.as_str().cmp(target))
                .map(|idx| vec![self.paths[idx].as_str()])
                .unwrap_or_default()
        } else {
            self.by_name
                .get(target)
                .map(|indices| indices.iter().map(|&idx| self.paths[idx].as_str()).collect())
                .unwrap_or_default()
        }
    }
}

struct FileWork<'a> {
    targets: Vec<String>,
    operations: Vec<&'a Operation>,
}

/// Run the whole pipeline.
pub fn run(options: &RunOptions) -> Result<RunReport, SessionError> {
    if !options.base_dir.is_dir() {
        return Err(SessionError::MissingBaseDir(options.base_dir.clone()));
    }
    check_mod_metadata(&options.mod_dir)?;

    let database = patch::load_mod(&options.mod_dir)?;
    info!(
        entries = database.entries.len(),
        operations = database.operation_count(),
        "loaded patch database"
    );
    let index = BaseIndex::scan(&options.base_dir)?;
    debug!(files = index.len(), "indexed base-data directory");

    let mut report = run_database(options, &database, &index);

    if let Some(path) = &options.dump {
        let dump = patch::dump_to_string(&database).map_err(SessionError::Dump)?;
        if !options.dry_run {
            output::atomic_write(path, dump.as_bytes())?;
            info!(path = %path.display(), "dumped patch database");
        }
        report.dump = Some(path.clone());
    }

    Ok(report)
}

/// Apply an already loaded database against an indexed base directory.
pub fn run_database(options: &RunOptions, database: &PatchDatabase, index: &BaseIndex) -> RunReport {
    let mut report = RunReport {
        operations: database.operation_count(),
        ..RunReport::default()
    };

    // Walk entries, not grouped targets, so aliases of one file keep database order
    let mut work: BTreeMap<&str, FileWork<'_>> = BTreeMap::new();
    let mut skipped: Vec<FileReport> = Vec::new();
    let mut skipped_index: HashMap<&str, usize> = HashMap::new();
    for entry in &database.entries {
        let target = entry.file.as_str();
        let files = index.resolve(target);
        if files.is_empty() {
            debug!(target, "no base file for target, skipping");
            let slot = *skipped_index.entry(target).or_insert_with(|| {
                skipped.push(FileReport::new(target, vec![target.to_string()], FileStatus::Skipped));
                skipped.len() - 1
            });
            skipped[slot].operations += entry.operations.len();
            continue;
        }
        for file in files {
            let slot = work.entry(file).or_insert_with(|| FileWork {
                targets: Vec::new(),
                operations: Vec::new(),
            });
            slot.targets.push(target.to_string());
            slot.operations.extend(entry.operations.iter());
        }
    }
    report.files.extend(skipped);

    for (file, work) in work {
        let file_report = process_file(options, file, work);
        match &file_report.status {
            FileStatus::Failed(error) => warn!(file, %error, "file failed"),
            status => info!(file, %status, "processed file"),
        }
        report.files.push(file_report);
    }

    report
}

fn process_file(options: &RunOptions, relative: &str, work: FileWork<'_>) -> FileReport {
    let mut report = FileReport::new(relative, work.targets, FileStatus::Skipped);
    report.operations = work.operations.len();
    report.status = match produce(options, relative, &work.operations, &mut report) {
        Ok(status) => status,
        Err(error) => FileStatus::Failed(error),
    };
    report
}

fn produce(
    options: &RunOptions,
    relative: &str,
    operations: &[&Operation],
    report: &mut FileReport,
) -> Result<FileStatus, FileError> {
    let source = options.base_dir.join(relative);
    let contents = fs::read_to_string(&source).map_err(FileError::Read)?;
    let mut document = tree::parse(&contents).map_err(FileError::Parse)?;

    if options.keep_base {
        report.base_rendered =
            Some(tree::to_string(&document, &options.write).map_err(FileError::Serialize)?);
    }

    let bound = options.depths.resolve(relative);
    report.bound = Some(bound);
    debug!(file = relative, %bound, "depth bound");

    let resolver = PathResolver::new();
    let applier = PatchApplier::new(&resolver, bound);
    let mut marks = PreservationMarks::new();
    for operation in operations {
        let applied = applier.apply(&mut document, &mut marks, operation)?;
        report.changed += applied.changed;
        report.diagnostics.extend(applied.diagnostics);
    }

    report.prune = patch::prune(&mut document, marks, bound);
    if options.remove_comments {
        report.prune.comments_removed = patch::strip_comments(&mut document);
    }

    let rendered = tree::to_string(&document, &options.write).map_err(FileError::Serialize)?;
    let output = options.output_path(relative);
    report.output = Some(output.clone());

    if options.dry_run {
        report.rendered = Some(rendered);
        return Ok(FileStatus::Rendered);
    }

    let outcome = output::write_if_changed(&output, &rendered)?;
    if options.keep_base {
        report.rendered = Some(rendered);
    }
    match outcome {
        WriteOutcome::Written { bytes } => Ok(FileStatus::Written { bytes }),
        WriteOutcome::Unchanged => Ok(FileStatus::Unchanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_match_every_directory() {
        let index = BaseIndex::from_paths(vec![
            "Defs/A/Things.xml".to_string(),
            "Defs/B/Things.xml".to_string(),
            "Defs/Races.xml".to_string(),
        ]);
        assert_eq!(
            index.resolve("Things.xml"),
            vec!["Defs/A/Things.xml", "Defs/B/Things.xml"]
        );
        assert_eq!(index.resolve("Defs/Races.xml"), vec!["Defs/Races.xml"]);
        assert!(index.resolve("things.xml").is_empty());
        assert!(index.resolve("Races/Races.xml").is_empty());
    }

    #[test]
    fn backslash_targets_are_normalized() {
        let index = BaseIndex::from_paths(vec!["Defs/Races.xml".to_string()]);
        assert_eq!(index.resolve("Defs\\Races.xml"), vec!["Defs/Races.xml"]);
    }

    #[test]
    fn output_path_layout() {
        let mut options = RunOptions::new("/games/Data/Core", "/mods/MyMod");
        assert_eq!(
            options.output_path("Defs/Races.xml"),
            PathBuf::from("/mods/MyMod/Core/Defs/Races.xml")
        );
        options.output_prefix = Some(PathBuf::from("Partial"));
        assert_eq!(
            options.output_path("Defs/Races.xml"),
            PathBuf::from("/mods/MyMod/Partial/Core/Defs/Races.xml")
        );
    }

    #[test]
    fn config_dump_path_is_under_mod() {
        let config = crate::config::load_from_str("[run]\ndump_database = \"merged.xml\"\n").unwrap();
        let options = RunOptions::from_config("/base", "/mods/M", &config, None);
        assert_eq!(options.dump, Some(PathBuf::from("/mods/M/merged.xml")));
    }

    #[test]
    fn metadata_must_parse() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            check_mod_metadata(dir.path()),
            Err(SessionError::MissingMetadata(_))
        ));
        fs::create_dir_all(dir.path().join("About")).unwrap();
        fs::write(dir.path().join(METADATA_FILE), "<ModMetaData>").unwrap();
        assert!(matches!(
            check_mod_metadata(dir.path()),
            Err(SessionError::MalformedMetadata { .. })
        ));
        fs::write(dir.path().join(METADATA_FILE), "<ModMetaData/>").unwrap();
        assert!(check_mod_metadata(dir.path()).is_ok());
    }
}
