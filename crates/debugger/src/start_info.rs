//! How to start a debug adapter for a launch configuration
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use launch_configuration::{LaunchConfiguration, LaunchContext, paths};
use serde_json::{Map, Value};

use crate::error::Result;

/// Picks the executable that runs an adapter
pub trait RuntimeLauncher: Send + Sync {
    /// Command and arguments that start `adapter`
    fn command_for(&self, adapter: &Path) -> (PathBuf, Vec<OsString>);
}

/// Runs `.exe` and `.dll` adapters under a managed runtime (mono); anything else is
/// started directly
#[derive(Debug, Clone, Default)]
pub struct ManagedRuntime {
    launcher: Option<PathBuf>,
}

impl ManagedRuntime {
    pub fn new(launcher: Option<PathBuf>) -> Self {
        Self { launcher }
    }

    /// Use the configured launcher, else whatever `mono` is on `PATH`
    pub fn from_config(config: &config::RuntimeConfig) -> Self {
        let configured = config
            .launcher
            .as_deref()
            .map(|launcher| paths::expand_home(launcher).into_owned());
        let launcher = configured.or_else(|| match which::which("mono") {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!(error = %e, "no mono runtime on PATH");
                None
            }
        });
        Self { launcher }
    }

    pub fn launcher(&self) -> Option<&Path> {
        self.launcher.as_deref()
    }

    fn is_managed(adapter: &Path) -> bool {
        adapter
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("exe") || e.eq_ignore_ascii_case("dll"))
    }
}

impl RuntimeLauncher for ManagedRuntime {
    fn command_for(&self, adapter: &Path) -> (PathBuf, Vec<OsString>) {
        match &self.launcher {
            Some(launcher) if Self::is_managed(adapter) => {
                (launcher.clone(), vec![adapter.as_os_str().to_owned()])
            }
            _ => (adapter.to_path_buf(), Vec::new()),
        }
    }
}

/// Everything needed to spawn an adapter and launch a configuration through it
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterStartInfo {
    pub command: PathBuf,
    pub arguments: Vec<OsString>,
    pub working_directory: Option<PathBuf>,
    pub adapter: PathBuf,
    /// Arguments of the `launch` request
    pub launch_arguments: Map<String, Value>,
}

impl AdapterStartInfo {
    /// Start `command` directly with an empty `launch` request
    pub fn new(command: impl Into<PathBuf>) -> Self {
        let command = command.into();
        Self {
            adapter: command.clone(),
            command,
            arguments: Vec::new(),
            working_directory: None,
            launch_arguments: Map::new(),
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_launch_arguments(mut self, launch_arguments: Map<String, Value>) -> Self {
        self.launch_arguments = launch_arguments;
        self
    }

    /// Resolve `configuration` for `context`: substitute variables and pick the runtime
    ///
    /// Fails for the "None" sentinel and for configurations that cannot be launched.
    #[tracing::instrument(skip_all, fields(configuration = configuration.name()))]
    pub fn from_configuration(
        configuration: &LaunchConfiguration,
        context: &LaunchContext,
        launcher: &dyn RuntimeLauncher,
    ) -> Result<Self> {
        configuration.validate()?;

        let variables = context.variables();
        let adapter = configuration
            .resolved_adapter(&variables)
            .map(|adapter| paths::expand_home(&adapter).into_owned())
            .unwrap_or_default();
        let (command, arguments) = launcher.command_for(&adapter);

        let start_info = Self {
            command,
            arguments,
            working_directory: configuration.directory().map(Path::to_path_buf),
            adapter,
            launch_arguments: configuration.launch_arguments(&variables),
        };
        tracing::debug!(%start_info, "resolved adapter start info");
        Ok(start_info)
    }
}

impl fmt::Display for AdapterStartInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command={}, Arguments=", self.command.display())?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let argument = argument.to_string_lossy();
            if argument.contains(char::is_whitespace) {
                write!(f, "\"{argument}\"")?;
            } else {
                f.write_str(&argument)?;
            }
        }
        Ok(())
    }
}
