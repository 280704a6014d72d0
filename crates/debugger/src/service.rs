//! Launch orchestration
use std::sync::{Arc, Mutex, MutexGuard};

use launch_configuration::{
    ConfigurationList, LaunchConfiguration, LaunchConfigurations, LaunchContext,
};

use crate::error::{Result, SessionError};
use crate::expression::{self, DataTip};
use crate::session::{DebugAdapterSession, SessionOptions};
use crate::start_info::{AdapterStartInfo, ManagedRuntime, RuntimeLauncher};

/// Owns the configuration cache and at most one running session
///
/// Launching replaces the current session; the replaced one is stopped.
pub struct DebugAdapterService {
    configurations: LaunchConfigurations,
    launcher: Box<dyn RuntimeLauncher>,
    options: SessionOptions,
    session: Mutex<Option<Arc<DebugAdapterSession>>>,
}

impl DebugAdapterService {
    pub fn new(options: SessionOptions, launcher: impl RuntimeLauncher + 'static) -> Self {
        Self {
            configurations: LaunchConfigurations::new(),
            launcher: Box::new(launcher),
            options,
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &config::Config) -> Self {
        Self::new(
            SessionOptions::from(config),
            ManagedRuntime::from_config(&config.runtime),
        )
    }

    fn session(&self) -> MutexGuard<'_, Option<Arc<DebugAdapterSession>>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn configurations(&self, context: &LaunchContext) -> ConfigurationList {
        self.configurations.resolve(context)
    }

    pub fn active_configuration(
        &self,
        context: &LaunchContext,
        allow_none: bool,
    ) -> Option<Arc<LaunchConfiguration>> {
        self.configurations.get_active(context, allow_none)
    }

    /// Make the configuration called `name` (ignoring case) the active one
    pub fn set_active_configuration(&self, name: &str, context: &LaunchContext) -> bool {
        let list = self.configurations.resolve(context);
        match list.find(name) {
            Some(configuration) => self.configurations.set_active(configuration, context),
            None => {
                tracing::warn!(name, "no launch configuration with that name");
                false
            }
        }
    }

    /// Start a new session for `configuration`, replacing the current one
    #[tracing::instrument(skip_all, fields(configuration = configuration.name()))]
    pub fn launch(
        &self,
        configuration: &LaunchConfiguration,
        context: &LaunchContext,
    ) -> Result<Arc<DebugAdapterSession>> {
        let start_info =
            AdapterStartInfo::from_configuration(configuration, context, self.launcher.as_ref())?;
        tracing::info!(%start_info, "launching debug adapter");

        let session = Arc::new(DebugAdapterSession::new(self.options.clone()));
        let previous = self.session().replace(Arc::clone(&session));
        if let Some(previous) = previous {
            tracing::debug!("stopping previous session");
            previous.stop();
        }

        session.run(&start_info)?;
        Ok(session)
    }

    /// Launch whatever configuration is active for `context`
    pub fn launch_active(&self, context: &LaunchContext) -> Result<Arc<DebugAdapterSession>> {
        let configuration = self
            .active_configuration(context, false)
            .ok_or_else(|| SessionError::NoActiveConfiguration(context.file.clone()))?;
        self.launch(&configuration, context)
    }

    pub fn current_session(&self) -> Option<Arc<DebugAdapterSession>> {
        self.session().clone()
    }

    /// Stop the current session, if any
    pub fn stop(&self) {
        let session = self.session().take();
        if let Some(session) = session {
            session.stop();
        }
    }

    /// Expression for a hover tooltip at `offset` in `text`
    ///
    /// Only files with an active launch configuration get tooltips.
    pub fn resolve_expression(
        &self,
        context: &LaunchContext,
        text: &str,
        offset: usize,
    ) -> Option<DataTip> {
        self.active_configuration(context, false)?;
        expression::data_tip_at(text, offset)
    }
}

impl Default for DebugAdapterService {
    fn default() -> Self {
        Self::new(SessionOptions::default(), ManagedRuntime::default())
    }
}
