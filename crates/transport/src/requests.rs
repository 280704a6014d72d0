//! Typed arguments for the requests the bridge sends or answers
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const INITIALIZE: &str = "initialize";
pub const LAUNCH: &str = "launch";
pub const CONFIGURATION_DONE: &str = "configurationDone";
pub const DISCONNECT: &str = "disconnect";
pub const RUN_IN_TERMINAL: &str = "runInTerminal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathFormat {
    Path,
    Uri,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    #[serde(rename = "linesStartAt1")]
    pub lines_start_at_one: bool,
    #[serde(rename = "columnsStartAt1")]
    pub columns_start_at_one: bool,
    pub path_format: PathFormat,
    pub supports_run_in_terminal_request: bool,
    pub supports_variable_paging: bool,
    pub supports_variable_type: bool,
}

impl InitializeArguments {
    /// Handshake arguments: 1-based lines and columns, plain paths, run-in-terminal
    /// support and no variable paging.
    pub fn new(adapter_id: impl Into<String>) -> Self {
        Self {
            client_id: Some("dap-bridge".to_string()),
            client_name: Some("dap-bridge".to_string()),
            adapter_id: adapter_id.into(),
            lines_start_at_one: true,
            columns_start_at_one: true,
            path_format: PathFormat::Path,
            supports_run_in_terminal_request: true,
            supports_variable_paging: false,
            supports_variable_type: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate_debuggee: Option<bool>,
}

/// Arguments of the `runInTerminal` reverse request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInTerminalArguments {
    pub kind: Option<String>,
    pub title: Option<String>,
    pub cwd: String,
    pub args: Vec<String>,
    /// A `null` value asks for the variable to be removed from the environment
    #[serde(default)]
    pub env: Option<HashMap<String, Option<String>>>,
}
