//! Typed views of response bodies
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subset of the capabilities returned by `initialize` that the bridge acts upon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: Option<bool>,
    pub supports_function_breakpoints: Option<bool>,
    pub supports_conditional_breakpoints: Option<bool>,
    pub supports_evaluate_for_hovers: Option<bool>,
    pub supports_terminate_request: Option<bool>,
    pub support_terminate_debuggee: Option<bool>,
}

impl Capabilities {
    /// Parse the `initialize` response body, treating a missing or odd body as "no capabilities"
    pub fn from_body(body: Option<&Value>) -> Self {
        match body {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not parse adapter capabilities");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn configuration_done(&self) -> bool {
        self.supports_configuration_done_request.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInTerminalResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_process_id: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capabilities_from_body() {
        let body = json!({"supportsConfigurationDoneRequest": true, "supportsStepBack": false});
        let capabilities = Capabilities::from_body(Some(&body));
        assert!(capabilities.configuration_done());
    }

    #[test]
    fn missing_body_has_no_capabilities() {
        assert!(!Capabilities::from_body(None).configuration_done());
        assert!(!Capabilities::from_body(Some(&json!("nonsense"))).configuration_done());
    }
}
