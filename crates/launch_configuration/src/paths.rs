//! Path handling for configuration values

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Marker that opens a variable reference such as `${workspaceFolder}`
pub(crate) const TEMPLATE_MARKER: &str = "${";

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> Cow<'_, Path> {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return Cow::Owned(home.join(stripped));
        }
        tracing::warn!("cannot determine home directory, using path as-is");
    }
    Cow::Borrowed(path)
}

/// Resolve `.` and `..` components without touching the filesystem
///
/// The target of a configuration usually does not exist yet (a build output, say), so
/// canonicalising through the filesystem is not an option.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Rebase a relative path value onto `base`
///
/// Empty values, absolute paths and values still containing a variable reference are
/// returned unchanged.
pub fn rebase<'a>(base: &Path, value: &'a str) -> Cow<'a, str> {
    if value.is_empty() || value.contains(TEMPLATE_MARKER) {
        return Cow::Borrowed(value);
    }

    let path = expand_home(Path::new(value));
    if path.is_absolute() {
        return match path {
            Cow::Borrowed(_) => Cow::Borrowed(value),
            Cow::Owned(expanded) => Cow::Owned(expanded.to_string_lossy().into_owned()),
        };
    }

    let rebased = normalize(&base.join(path));
    Cow::Owned(rebased.to_string_lossy().into_owned())
}
