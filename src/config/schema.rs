use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RunConfig {
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub depth: DepthSettings,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RunSettings {
    /// Subdirectory of the mod that receives the partial copies.
    #[serde(default)]
    pub output_prefix: Option<PathBuf>,
    #[serde(default)]
    pub remove_comments: bool,
    /// Selects a table under `[depth.mod_types]`.
    #[serde(default)]
    pub mod_type: Option<String>,
    /// Depth for files without a table entry. Absent means the whole file is kept.
    #[serde(default)]
    pub default_max_depth: Option<i64>,
    /// Where to write the merged patch database, relative to the mod directory.
    #[serde(default)]
    pub dump_database: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DepthSettings {
    #[serde(default)]
    pub overrides: BTreeMap<String, i64>,
    #[serde(default)]
    pub mod_types: BTreeMap<String, BTreeMap<String, i64>>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let mut issues = Vec::new();

        if let Some(value) = self.run.default_max_depth {
            if value < 0 {
                issues.push(ConfigIssue::NegativeDepth {
                    table: "run".to_string(),
                    file: "default_max_depth".to_string(),
                    value,
                });
            }
        }

        check_table("depth.overrides", &self.depth.overrides, &mut issues);
        for (mod_type, table) in &self.depth.mod_types {
            check_table(&format!("depth.mod_types.{mod_type}"), table, &mut issues);
        }

        if let Some(mod_type) = &self.run.mod_type {
            if !self.depth.mod_types.contains_key(mod_type) {
                issues.push(ConfigIssue::UnknownModType {
                    name: mod_type.clone(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(InvalidConfig { issues })
        }
    }
}

fn check_table(table: &str, entries: &BTreeMap<String, i64>, issues: &mut Vec<ConfigIssue>) {
    for (file, value) in entries {
        if file.trim().is_empty() {
            issues.push(ConfigIssue::EmptyFileName {
                table: table.to_string(),
            });
        }
        if *value < 0 {
            issues.push(ConfigIssue::NegativeDepth {
                table: table.to_string(),
                file: file.clone(),
                value: *value,
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvalidConfig {
    pub issues: Vec<ConfigIssue>,
}

impl fmt::Display for InvalidConfig {
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

impl std::error::Error for InvalidConfig {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    NegativeDepth {
        table: String,
        file: String,
        value: i64,
    },
    EmptyFileName {
        table: String,
    },
    UnknownModType {
        name: String,
    },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::NegativeDepth { table, file, value } => {
                write!(f, "[{table}] '{file}' has negative depth {value}")
            }
            ConfigIssue::EmptyFileName { table } => {
                write!(f, "[{table}] contains an empty file name")
            }
            ConfigIssue::UnknownModType { name } => {
                write!(f, "mod_type '{name}' has no [depth.mod_types.{name}] table")
            }
        }
    }
}
