//! Locating and parsing configuration files

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;

use crate::configuration::LaunchConfiguration;
use crate::error::{ConfigurationError, Result};

pub const FILE_NAME: &str = "launch.json";

/// Editor settings directory searched when the project has no file of its own
pub const SETTINGS_DIRECTORY: &str = ".vscode";

const CONFIGURATIONS_KEY: &str = "configurations";

/// Result of reading one configuration file
#[derive(Debug)]
pub struct ConfigurationFile {
    pub path: PathBuf,
    /// Modification time at the moment of the read
    pub modified: Option<SystemTime>,
    /// Valid configurations, in file order
    pub configurations: Vec<LaunchConfiguration>,
}

/// Find the configuration file for `directory`, preferring the project-local one
pub fn find_file(directory: &Path) -> Option<PathBuf> {
    [
        directory.join(FILE_NAME),
        directory.join(SETTINGS_DIRECTORY).join(FILE_NAME),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

/// Read the configuration file for `directory`, if there is one
pub fn read_directory(directory: &Path) -> Result<Option<ConfigurationFile>> {
    match find_file(directory) {
        Some(path) => read_file(&path).map(Some),
        None => {
            tracing::trace!(directory = %directory.display(), "no configuration file");
            Ok(None)
        }
    }
}

#[tracing::instrument(level = "debug")]
pub fn read_file(path: &Path) -> Result<ConfigurationFile> {
    let read_error = |source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    };

    let modified = modified_time(path);
    let contents = std::fs::read_to_string(path).map_err(read_error)?;
    let configurations = parse(path, &contents)?;

    Ok(ConfigurationFile {
        path: path.to_path_buf(),
        modified,
        configurations,
    })
}

pub(crate) fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Parse the contents of the configuration file at `path`
///
/// The document is either a single configuration object or an object with a
/// `configurations` array. Entries that cannot be launched are logged and skipped.
pub fn parse(path: &Path, contents: &str) -> Result<Vec<LaunchConfiguration>> {
    let parse_error = |message: String| ConfigurationError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let value = jsonc_parser::parse_to_serde_value(contents, &Default::default())
        .map_err(|e| parse_error(e.to_string()))?;
    let Some(Value::Object(mut document)) = value else {
        return Err(parse_error("expected a JSON object".to_string()));
    };

    let entries = match document.remove(CONFIGURATIONS_KEY) {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(parse_error(format!("{CONFIGURATIONS_KEY:?} must be an array"))),
        None => vec![Value::Object(document)],
    };

    let mut configurations = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Object(object) = entry else {
            tracing::info!(path = %path.display(), "skipping configuration that is not an object");
            continue;
        };
        let configuration = LaunchConfiguration::from_object(object, path);
        match configuration.validate() {
            Ok(()) => configurations.push(configuration),
            Err(e) => tracing::info!(error = %e, "dropping configuration"),
        }
    }
    Ok(configurations)
}
