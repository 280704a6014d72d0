use std::path::PathBuf;

/// Errors raised while reading launch configurations
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// An entry that cannot be launched; dropped from the configuration list
    #[error("invalid configuration {name:?} in {}: {reason}", path.display())]
    Invalid {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error("reading {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

pub type Result<T, E = ConfigurationError> = std::result::Result<T, E>;
