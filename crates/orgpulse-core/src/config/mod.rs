//! Configuration loading shared by the orgpulse crates.
//!
//! Config files are YAML with environment variable interpolation applied
//! before parsing. Crate-specific config structs live next to the code that
//! consumes them; this module only provides the loading pipeline.

mod vars;

pub use vars::interpolate;

use serde::de::DeserializeOwned;
use snafu::prelude::*;

use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Read a config file into a string.
pub fn read_config_file(path: &std::path::Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).context(ReadFileSnafu {
        path: path.display().to_string(),
    })
}

/// Parse a YAML string into a config struct, interpolating environment
/// variables first.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let text = interpolate(contents).map_err(|errors| ConfigError::EnvInterpolation {
        message: errors.join("\n"),
    })?;
    serde_yaml::from_str(&text).context(YamlParseSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        limit: usize,
    }

    #[test]
    fn parses_plain_yaml() {
        let sample: Sample = parse_yaml("name: analytics\nlimit: 10\n").unwrap();
        assert_eq!(sample.name, "analytics");
        assert_eq!(sample.limit, 10);
    }

    #[test]
    fn missing_variable_surfaces_all_names() {
        let err = parse_yaml::<Sample>("name: $ORGPULSE_TEST_NOT_SET_A\nlimit: 1\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ORGPULSE_TEST_NOT_SET_A"));
    }
}
