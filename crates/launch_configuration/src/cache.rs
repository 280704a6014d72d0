//! Per-directory cache of configuration lists
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use crate::configuration::LaunchConfiguration;
use crate::reader::{self, ConfigurationFile};
use crate::variables::LaunchContext;

type Configurations = Arc<[Arc<LaunchConfiguration>]>;

/// Snapshot of the configurations that apply to a context
///
/// When a directory has a configuration file the list starts with the "None" sentinel and
/// has exactly one active entry. Without a file the list is empty.
#[derive(Debug, Clone)]
pub struct ConfigurationList {
    configurations: Configurations,
    active: Option<usize>,
    path: Option<PathBuf>,
}

impl ConfigurationList {
    fn empty() -> Self {
        Self {
            configurations: Arc::new([]),
            active: None,
            path: None,
        }
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LaunchConfiguration>> {
        self.configurations.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<LaunchConfiguration>> {
        self.configurations.get(index)
    }

    pub fn active(&self) -> Option<&Arc<LaunchConfiguration>> {
        self.configurations.get(self.active?)
    }

    pub fn is_active(&self, configuration: &LaunchConfiguration) -> bool {
        self.active()
            .is_some_and(|active| std::ptr::eq(Arc::as_ptr(active), configuration))
    }

    /// Look a configuration up by name, ignoring case
    pub fn find(&self, name: &str) -> Option<&Arc<LaunchConfiguration>> {
        self.configurations.iter().find(|c| c.matches_name(name))
    }

    /// The configuration file the list was read from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether both snapshots come from the same read of the configuration file
    pub fn same_read(&self, other: &ConfigurationList) -> bool {
        !self.is_empty() && Arc::ptr_eq(&self.configurations, &other.configurations)
    }
}

impl<'a> IntoIterator for &'a ConfigurationList {
    type Item = &'a Arc<LaunchConfiguration>;
    type IntoIter = std::slice::Iter<'a, Arc<LaunchConfiguration>>;

    fn into_iter(self) -> Self::IntoIter {
        self.configurations.iter()
    }
}

struct CacheEntry {
    configurations: Configurations,
    path: PathBuf,
    modified: Option<SystemTime>,
    active: usize,
}

impl CacheEntry {
    fn new(file: ConfigurationFile, previous_active: Option<&str>) -> Self {
        let configurations: Configurations = std::iter::once(LaunchConfiguration::none())
            .chain(file.configurations.into_iter().map(Arc::new))
            .collect();

        // a fresh read defaults to the first real configuration; after a re-read the
        // previous choice is kept if it survived, else the sentinel
        let active = match previous_active {
            Some(name) => configurations
                .iter()
                .position(|c| c.matches_name(name))
                .unwrap_or(0),
            None => usize::from(configurations.len() > 1),
        };

        Self {
            configurations,
            path: file.path,
            modified: file.modified,
            active,
        }
    }

    fn is_stale(&self) -> bool {
        reader::modified_time(&self.path) != self.modified
    }

    fn active_name(&self) -> Option<&str> {
        self.configurations.get(self.active).map(|c| c.name())
    }

    fn snapshot(&self) -> ConfigurationList {
        ConfigurationList {
            configurations: Arc::clone(&self.configurations),
            active: Some(self.active),
            path: Some(self.path.clone()),
        }
    }
}

/// Configuration lists keyed by source directory
///
/// An entry is re-read whenever the modification time of its file changes. Stale entries
/// are replaced as a whole; only the active marker is ever updated in place.
#[derive(Default)]
pub struct LaunchConfigurations {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl LaunchConfigurations {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| {
            tracing::warn!("configuration cache lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Configurations that apply to `context`
    pub fn resolve(&self, context: &LaunchContext) -> ConfigurationList {
        let directory = context.directory();
        let mut entries = self.entries();

        let previous_active = match entries.get(directory) {
            Some(entry) if !entry.is_stale() => return entry.snapshot(),
            Some(entry) => {
                tracing::debug!(path = %entry.path.display(), "configuration file changed, re-reading");
                entry.active_name().map(str::to_string)
            }
            None => None,
        };

        match reader::read_directory(directory) {
            Ok(Some(file)) => {
                let entry = CacheEntry::new(file, previous_active.as_deref());
                let snapshot = entry.snapshot();
                entries.insert(directory.to_path_buf(), entry);
                snapshot
            }
            Ok(None) => {
                entries.remove(directory);
                ConfigurationList::empty()
            }
            Err(e) => {
                tracing::error!(error = %e, directory = %directory.display(), "unable to read launch configurations");
                entries.remove(directory);
                ConfigurationList::empty()
            }
        }
    }

    /// Mark `configuration` as the active one for `context`
    ///
    /// Returns false, leaving the cache untouched, when `context` has not been resolved yet
    /// or the configuration is not part of its list.
    pub fn set_active(&self, configuration: &LaunchConfiguration, context: &LaunchContext) -> bool {
        let directory = context.directory();
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(directory) else {
            tracing::warn!(
                directory = %directory.display(),
                "launch configuration not found, unable to set active configuration"
            );
            return false;
        };

        let position = entry
            .configurations
            .iter()
            .position(|c| std::ptr::eq(Arc::as_ptr(c), configuration))
            .or_else(|| {
                entry
                    .configurations
                    .iter()
                    .position(|c| c.id() == configuration.id())
            });
        match position {
            Some(index) => {
                entry.active = index;
                true
            }
            None => {
                tracing::warn!(
                    name = configuration.name(),
                    path = %entry.path.display(),
                    "configuration is not part of this directory's list"
                );
                false
            }
        }
    }

    /// The active configuration for `context`
    ///
    /// With `allow_none` false, an active "None" sentinel is reported as no configuration.
    pub fn get_active(
        &self,
        context: &LaunchContext,
        allow_none: bool,
    ) -> Option<Arc<LaunchConfiguration>> {
        let active = self.resolve(context).active().cloned()?;
        if active.is_none() && !allow_none {
            return None;
        }
        Some(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_active_before_resolve_is_refused() {
        let cache = LaunchConfigurations::new();
        let context = LaunchContext::new("/nowhere/at/all.js");
        assert!(!cache.set_active(&LaunchConfiguration::none(), &context));
    }

    #[test]
    fn directory_without_file_is_empty_and_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LaunchConfigurations::new();
        let context = LaunchContext::new(dir.path().join("main.js"));

        let list = cache.resolve(&context);
        assert!(list.is_empty());
        assert!(list.active().is_none());
        assert!(cache.get_active(&context, true).is_none());
        assert!(!cache.set_active(&LaunchConfiguration::none(), &context));
    }
}
