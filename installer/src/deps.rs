//! Runtime dependency checks.
//!
//! Recipes may declare tools the installed package needs at run time (a
//! JVM, for instance). parcel never installs them; it only looks them up on
//! `PATH` and warns about any that are missing.

use log::{debug, warn};
use std::path::PathBuf;

/// Locates executables by name.
#[cfg_attr(test, mockall::automock)]
pub trait DependencyProbe {
    /// Return the resolved path of `name`, or `None` if it is not found.
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// [`DependencyProbe`] that searches `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathProbe;

impl DependencyProbe for PathProbe {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Availability of one declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    /// The declared name.
    pub name: String,
    /// Where it was found, if anywhere.
    pub path: Option<PathBuf>,
}

impl DependencyStatus {
    /// Return true when the dependency was found.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.path.is_some()
    }
}

/// Look up each declared dependency, logging a warning for any missing one.
///
/// # Examples
///
/// ```
/// use parcel_installer::deps::{PathProbe, check_dependencies};
///
/// let statuses = check_dependencies(&PathProbe, &[]);
/// assert!(statuses.is_empty());
/// ```
#[must_use]
pub fn check_dependencies(probe: &dyn DependencyProbe, names: &[String]) -> Vec<DependencyStatus> {
    names
        .iter()
        .map(|name| {
            let path = probe.locate(name);
            match &path {
                Some(found) => debug!("runtime dependency {name} found at {}", found.display()),
                None => warn!("runtime dependency {name} not found on PATH"),
            }
            DependencyStatus {
                name: name.clone(),
                path,
            }
        })
        .collect()
}

/// Names of the dependencies that were not found.
#[must_use]
pub fn missing(statuses: &[DependencyStatus]) -> Vec<&str> {
    statuses
        .iter()
        .filter(|status| !status.is_present())
        .map(|status| status.name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn reports_present_and_missing() {
        let mut probe = MockDependencyProbe::new();
        probe
            .expect_locate()
            .with(eq("java"))
            .returning(|_| Some(PathBuf::from("/usr/bin/java")));
        probe.expect_locate().with(eq("node")).returning(|_| None);

        let statuses = check_dependencies(&probe, &["java".to_owned(), "node".to_owned()]);

        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_present());
        assert_eq!(missing(&statuses), vec!["node"]);
    }

    #[test]
    fn path_probe_misses_nonsense_names() {
        assert!(PathProbe.locate("parcel-no-such-tool-7f3a").is_none());
    }
}
