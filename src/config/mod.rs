pub mod depth;
pub mod loader;
pub mod schema;

pub use depth::{parse_depth_override, DepthArgError, DepthTable};
pub use loader::{load_for_mod, load_from_path, load_from_str, ConfigError, ConfigErrorKind, CONFIG_FILE};
pub use schema::{ConfigIssue, DepthSettings, InvalidConfig, RunConfig, RunSettings};
