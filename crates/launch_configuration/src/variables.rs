//! Launch contexts and `${variable}` substitution

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid"));

/// What a launch is for: the file being debugged, and optionally the workspace it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    pub file: PathBuf,
    pub workspace_folder: Option<PathBuf>,
}

impl LaunchContext {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            workspace_folder: None,
        }
    }

    pub fn with_workspace_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.workspace_folder = Some(folder.into());
        self
    }

    /// Directory whose configuration file applies to this context
    pub fn directory(&self) -> &Path {
        self.file.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn variables(&self) -> VariableModel {
        VariableModel::from_context(self)
    }
}

/// Values available to `${name}` references in configuration strings
#[derive(Debug, Clone, Default)]
pub struct VariableModel {
    values: HashMap<String, String>,
}

impl VariableModel {
    pub fn from_context(context: &LaunchContext) -> Self {
        fn lossy(path: &Path) -> String {
            path.to_string_lossy().into_owned()
        }

        let file = &context.file;
        let workspace = context
            .workspace_folder
            .as_deref()
            .unwrap_or_else(|| context.directory());

        let mut values = HashMap::new();
        values.insert("file".to_string(), lossy(file));
        values.insert(
            "fileBasename".to_string(),
            file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        );
        values.insert(
            "fileBasenameNoExtension".to_string(),
            file.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        );
        values.insert("fileDirname".to_string(), lossy(context.directory()));
        values.insert(
            "fileExtname".to_string(),
            file.extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
        );
        values.insert("workspaceFolder".to_string(), lossy(workspace));
        values.insert(
            "workspaceFolderBasename".to_string(),
            workspace
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        if let Ok(cwd) = std::env::current_dir() {
            values.insert("cwd".to_string(), lossy(&cwd));
        }

        Self { values }
    }

    /// Add or override a variable
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(var) = name.strip_prefix("env:") {
            return Some(std::env::var(var).unwrap_or_default());
        }
        self.values.get(name).cloned()
    }

    /// Expand every `${name}` reference in `text`. Unknown references are kept verbatim.
    pub fn expand(&self, text: &str) -> String {
        VARIABLE
            .replace_all(text, |caps: &Captures| {
                let name = &caps[1];
                match self.get(name) {
                    Some(value) => value,
                    None => {
                        tracing::debug!(variable = name, "unknown variable, leaving as-is");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    /// Expand strings, and strings inside arrays. Other values pass through unchanged.
    pub fn expand_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.expand(s)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Value::String(self.expand(s)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
