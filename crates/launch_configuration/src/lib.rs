//! Launch configuration management
//!
//! Reads `launch.json` style configuration files, keeps them cached per directory until
//! the file changes, tracks which configuration is active and expands `${variable}`
//! references when a configuration is about to be launched.

mod cache;
mod configuration;
mod error;
pub mod paths;
pub mod reader;
mod variables;

pub use cache::{ConfigurationList, LaunchConfigurations};
pub use configuration::{ConfigurationId, LAUNCH_REQUEST, LaunchConfiguration};
pub use error::{ConfigurationError, Result};
pub use variables::{LaunchContext, VariableModel};
