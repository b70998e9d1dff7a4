//! Per-file depth lookup.

use crate::config::schema::RunConfig;
use crate::patch::DepthBound;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Resolved depth table. Keys are lowercased file names.
#[derive(Debug, Clone, Default)]
pub struct DepthTable {
    cli: HashMap<String, usize>,
    overrides: HashMap<String, usize>,
    mod_type: HashMap<String, usize>,
    default: Option<usize>,
}

impl DepthTable {
    /// Build from a validated config. Negative values have already been rejected.
    pub fn from_config(config: &RunConfig, mod_type: Option<&str>) -> Self {
        let overrides = lowercase_keys(&config.depth.overrides);
        let mod_type = mod_type
            .or(config.run.mod_type.as_deref())
            .and_then(|name| config.depth.mod_types.get(name))
            .map(lowercase_keys)
            .unwrap_or_default();
        let default = config
            .run
            .default_max_depth
            .and_then(|value| usize::try_from(value).ok());

        DepthTable {
            cli: HashMap::new(),
            overrides,
            mod_type,
            default,
        }
    }

    /// Command-line entries win over every config table.
    pub fn set_override(&mut self, file: &str, depth: usize) {
        self.cli.insert(file.to_lowercase(), depth);
    }

    /// Look up the bound for a target file id. Only the file name counts.
    pub fn resolve(&self, file: &str) -> DepthBound {
        let key = Path::new(file)
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| file.to_lowercase());

        self.cli
            .get(&key)
            .or_else(|| self.overrides.get(&key))
            .or_else(|| self.mod_type.get(&key))
            .copied()
            .or(self.default)
            .map(DepthBound::Limited)
            .unwrap_or(DepthBound::Unbounded)
    }
}

fn lowercase_keys(table: &std::collections::BTreeMap<String, i64>) -> HashMap<String, usize> {
    table
        .iter()
        .filter_map(|(file, value)| {
            usize::try_from(*value)
                .ok()
                .map(|depth| (file.to_lowercase(), depth))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthArgError {
    pub input: String,
}

impl fmt::Display for DepthArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected FILE=DEPTH with a non-negative depth, got '{}'", self.input)
    }
}

impl std::error::Error for DepthArgError {}

/// Parse a `FILE=N` command-line override.
pub fn parse_depth_override(input: &str) -> Result<(String, usize), DepthArgError> {
    let error = || DepthArgError {
        input: input.to_string(),
    };
    let (file, depth) = input.rsplit_once('=').ok_or_else(error)?;
    let file = file.trim();
    if file.is_empty() {
        return Err(error());
    }
    let depth = depth.trim().parse::<usize>().map_err(|_| error())?;
    Ok((file.to_string(), depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;

    fn table(toml: &str) -> DepthTable {
        DepthTable::from_config(&load_from_str(toml).unwrap(), None)
    }

    #[test]
    fn no_entry_means_unbounded() {
        let table = table("");
        assert_eq!(table.resolve("Defs/Things.xml"), DepthBound::Unbounded);
    }

    #[test]
    fn lookup_ignores_case_and_directories() {
        let table = table("[depth.overrides]\n\"Things.XML\" = 2\n");
        assert_eq!(table.resolve("Defs/Sub/things.xml"), DepthBound::Limited(2));
        assert_eq!(table.resolve("THINGS.xml"), DepthBound::Limited(2));
    }

    #[test]
    fn precedence_runs_cli_overrides_mod_type_default() {
        let mut table = table(
            r#"
[run]
mod_type = "standard"
default_max_depth = 0

[depth.overrides]
"a.xml" = 1

[depth.mod_types.standard]
"a.xml" = 5
"b.xml" = 2
"#,
        );
        assert_eq!(table.resolve("a.xml"), DepthBound::Limited(1));
        assert_eq!(table.resolve("b.xml"), DepthBound::Limited(2));
        assert_eq!(table.resolve("c.xml"), DepthBound::Limited(0));

        table.set_override("A.xml", 7);
        assert_eq!(table.resolve("a.xml"), DepthBound::Limited(7));
    }

    #[test]
    fn explicit_mod_type_replaces_configured_one() {
        let config = load_from_str(
            r#"
[depth.mod_types.light]
"a.xml" = 1

[depth.mod_types.heavy]
"a.xml" = 4
"#,
        )
        .unwrap();
        let table = DepthTable::from_config(&config, Some("heavy"));
        assert_eq!(table.resolve("a.xml"), DepthBound::Limited(4));
    }

    #[test]
    fn parses_cli_overrides() {
        assert_eq!(
            parse_depth_override("Races.xml=3").unwrap(),
            ("Races.xml".to_string(), 3)
        );
        assert!(parse_depth_override("Races.xml").is_err());
        assert!(parse_depth_override("=3").is_err());
        assert!(parse_depth_override("a.xml=-1").is_err());
    }
}
