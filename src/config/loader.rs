use crate::config::schema::{InvalidConfig, RunConfig};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the mod directory when none is given explicitly.
pub const CONFIG_FILE: &str = "defpatch.toml";

/// A run config that could not be loaded, with the file it came from when known.
#[derive(Error, Debug)]
#[error("run config {}: {kind}", origin_label(.origin))]
pub struct ConfigError {
    pub origin: Option<PathBuf>,
    #[source]
    pub kind: ConfigErrorKind,
}

#[derive(Error, Debug)]
pub enum ConfigErrorKind {
    #[error("unreadable: {0}")]
    Unreadable(#[source] std::io::Error),

    #[error("not valid TOML: {0}")]
    Syntax(#[source] toml_edit::de::Error),

    #[error("rejected: {0}")]
    Rejected(#[source] InvalidConfig),
}

fn origin_label(origin: &Option<PathBuf>) -> String {
    match origin {
        Some(path) => format!("({})", path.display()),
        None => "(inline)".to_string(),
    }
}

impl ConfigError {
    fn inline(kind: ConfigErrorKind) -> Self {
        Self { origin: None, kind }
    }

    fn in_file(mut self, path: &Path) -> Self {
        self.origin.get_or_insert_with(|| path.to_path_buf());
        self
    }
}

pub fn load_from_str(input: &str) -> Result<RunConfig, ConfigError> {
    let config: RunConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::inline(ConfigErrorKind::Syntax(source)))?;
    config
        .validate()
        .map_err(|source| ConfigError::inline(ConfigErrorKind::Rejected(source)))?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<RunConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError {
        origin: Some(path.to_path_buf()),
        kind: ConfigErrorKind::Unreadable(source),
    })?;
    load_from_str(&contents).map_err(|error| error.in_file(path))
}

/// Load the explicit config, else `<mod_dir>/defpatch.toml`, else defaults.
pub fn load_for_mod(mod_dir: &Path, explicit: Option<&Path>) -> Result<RunConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    let candidate = mod_dir.join(CONFIG_FILE);
    if candidate.is_file() {
        load_from_path(candidate)
    } else {
        Ok(RunConfig::default())
    }
}
