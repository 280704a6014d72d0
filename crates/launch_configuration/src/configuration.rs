use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use serde_json::{Map, Value};

use crate::error::{ConfigurationError, Result};
use crate::paths;
use crate::variables::VariableModel;

/// Key holding the path of the debug adapter executable
pub const ADAPTER_KEY: &str = "$adapter";
pub const PROGRAM_KEY: &str = "program";
pub const REQUEST_KEY: &str = "request";
pub const TYPE_KEY: &str = "type";
pub const NAME_KEY: &str = "name";

/// The only request kind the bridge knows how to start
pub const LAUNCH_REQUEST: &str = "launch";

const NONE_NAME: &str = "None";
const UNNAMED: &str = "Unnamed";

static NONE: LazyLock<Arc<LaunchConfiguration>> = LazyLock::new(|| {
    Arc::new(LaunchConfiguration {
        id: ConfigurationId::None,
        name: NONE_NAME.to_string(),
        adapter: None,
        program: None,
        request: None,
        kind: None,
        properties: Map::new(),
        source: None,
    })
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigurationId {
    /// Reserved for the sentinel meaning "no configuration applies"
    None,
    Named(String),
}

/// One named debug target read from a configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchConfiguration {
    id: ConfigurationId,
    name: String,
    adapter: Option<String>,
    program: Option<String>,
    request: Option<String>,
    kind: Option<String>,
    properties: Map<String, Value>,
    source: Option<PathBuf>,
}

impl LaunchConfiguration {
    /// The shared "None" sentinel
    pub fn none() -> Arc<Self> {
        Arc::clone(&NONE)
    }

    /// Build a configuration from one JSON object found in the file at `source`
    ///
    /// `program` and `$adapter` are rebased onto the directory holding `source`.
    pub fn from_object(object: Map<String, Value>, source: &Path) -> Self {
        let base = source.parent().unwrap_or_else(|| Path::new(""));
        let mut configuration = Self {
            id: ConfigurationId::None,
            name: String::new(),
            adapter: None,
            program: None,
            request: None,
            kind: None,
            properties: Map::new(),
            source: Some(source.to_path_buf()),
        };
        let mut name = None;

        for (key, value) in object {
            let value = match key.to_lowercase().as_str() {
                PROGRAM_KEY => {
                    let program = paths::rebase(base, &as_text(&value)).into_owned();
                    configuration.program = Some(program.clone());
                    Value::String(program)
                }
                ADAPTER_KEY => {
                    let adapter = paths::rebase(base, &as_text(&value)).into_owned();
                    configuration.adapter = Some(adapter.clone());
                    Value::String(adapter)
                }
                REQUEST_KEY => {
                    configuration.request = Some(as_text(&value));
                    value
                }
                TYPE_KEY => {
                    configuration.kind = Some(as_text(&value));
                    value
                }
                NAME_KEY => {
                    name = Some(as_text(&value));
                    value
                }
                _ => value,
            };
            configuration.properties.insert(key, value);
        }

        configuration.name = name
            .or_else(|| configuration.kind.clone())
            .unwrap_or_else(|| UNNAMED.to_string());
        configuration.id = ConfigurationId::Named(configuration.name.clone());
        configuration
    }

    pub fn id(&self) -> &ConfigurationId {
        &self.id
    }

    /// Display name: `name`, else `type`, else "Unnamed"
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_none(&self) -> bool {
        self.id == ConfigurationId::None
    }

    /// Whether this configuration's name matches `name`, ignoring case
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    /// The adapter to start: the `$adapter` path, else the `type` taken as an adapter
    /// command looked up on `PATH`
    pub fn adapter(&self) -> Option<&str> {
        self.adapter.as_deref().or(self.kind.as_deref())
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    pub fn request(&self) -> Option<&str> {
        self.request.as_deref()
    }

    /// The `type` of the configuration
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Every property of the configuration as read, including the recognised ones
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// The configuration file this was read from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Directory containing the configuration file
    pub fn directory(&self) -> Option<&Path> {
        self.source.as_deref().and_then(Path::parent)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check that the configuration can be launched
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ConfigurationError::Invalid {
            name: self.name.clone(),
            path: self.source.clone().unwrap_or_default(),
            reason: reason.to_string(),
        };

        if self.is_none() {
            return Err(invalid("the None configuration cannot be launched"));
        }
        if self.request.as_deref() != Some(LAUNCH_REQUEST) {
            return Err(invalid(&format!(
                "request must be {LAUNCH_REQUEST:?}, found {:?}",
                self.request.as_deref().unwrap_or_default()
            )));
        }
        if self.adapter().is_none_or(str::is_empty) {
            return Err(invalid("neither $adapter nor type given"));
        }
        Ok(())
    }

    /// Adapter executable path after variable substitution
    pub fn resolved_adapter(&self, variables: &VariableModel) -> Option<PathBuf> {
        let Some(adapter) = self.adapter.as_deref() else {
            return self.kind.as_deref().map(PathBuf::from);
        };
        let adapter = variables.expand(adapter);
        Some(PathBuf::from(self.rebase(&adapter).into_owned()))
    }

    /// Arguments for the adapter's `launch` request
    ///
    /// Every property except `$adapter`, with variables substituted and `program` rebased
    /// once its variables are expanded.
    pub fn launch_arguments(&self, variables: &VariableModel) -> Map<String, Value> {
        self.properties
            .iter()
            .filter(|(key, _)| !key.eq_ignore_ascii_case(ADAPTER_KEY))
            .map(|(key, value)| {
                let value = match variables.expand_value(value) {
                    Value::String(s) if key.eq_ignore_ascii_case(PROGRAM_KEY) => {
                        Value::String(self.rebase(&s).into_owned())
                    }
                    other => other,
                };
                (key.clone(), value)
            })
            .collect()
    }

    fn rebase<'a>(&self, value: &'a str) -> std::borrow::Cow<'a, str> {
        match self.directory() {
            Some(base) => paths::rebase(base, value),
            None => std::borrow::Cow::Borrowed(value),
        }
    }
}

impl fmt::Display for LaunchConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
