use std::fmt;
use std::fmt::Display;
use std::fmt::Formatter;

use rpmtx_types::Nevra;
use serde::{Deserialize, Serialize};

use crate::{Error, FileEntry};

/// The identity of a repository.
///
/// Two identities are reserved: [`RepoId::installed`] denotes the running
/// system's package database and [`RepoId::commandline`] packages handed in
/// as local files.
///
/// ## Examples
/// ```
/// use rpmtx_sack::RepoId;
///
/// assert!(RepoId::installed().is_installed());
/// assert!(!RepoId::new("fedora").is_installed());
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RepoId(String);

impl RepoId {
    /// Creates a repository identity from a string.
    pub fn new(id: &str) -> Self {
        RepoId(id.to_string())
    }

    /// Returns the sentinel identity of the installed database.
    pub fn installed() -> Self {
        RepoId("installed".to_string())
    }

    /// Returns the sentinel identity for packages given as local files.
    pub fn commandline() -> Self {
        RepoId("commandline".to_string())
    }

    /// Returns whether this is the installed-database sentinel.
    pub fn is_installed(&self) -> bool {
        self.0 == "installed"
    }

    /// Returns a reference to the inner string.
    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl Display for RepoId {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

/// A source of filelist metadata for one repository.
///
/// Repositories commonly ship only a "primary" subset of their packages'
/// file lists; the full lists live in separate filelist metadata that is
/// expensive to obtain. The metadata acquisition layer implements this trait
/// and the sack calls it the first time a query needs complete file data.
pub trait FilelistSource: fmt::Debug {
    /// Returns the complete file lists of the repository's packages.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be obtained; the sack
    /// forwards it to the caller.
    fn filelists(&self) -> Result<Vec<(Nevra, Vec<FileEntry>)>, Error>;
}

/// A handle to one package repository.
///
/// The handle carries the repository's identity and the knobs the
/// transaction core honors: `cost` orders repositories when the same package
/// is carried by several (lower wins), `enabled` hides the repository
/// entirely, and `gpgcheck` is forwarded to the signature-checking
/// collaborator.
#[derive(Debug)]
pub struct Repo {
    /// The repository identity.
    pub id: RepoId,
    /// The relative cost of using this repository, 1000 by default.
    pub cost: u32,
    /// Whether the repository participates in queries.
    pub enabled: bool,
    /// Whether packages from this repository require signature checks.
    pub gpgcheck: bool,
    filelists: Option<Box<dyn FilelistSource + Send>>,
}

impl Repo {
    /// Creates a new enabled repository handle with default cost.
    pub fn new(id: RepoId) -> Self {
        Repo {
            id,
            cost: 1000,
            enabled: true,
            gpgcheck: false,
            filelists: None,
        }
    }

    /// Sets the repository cost.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Disables the repository.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enables signature checking for the repository.
    pub fn with_gpgcheck(mut self) -> Self {
        self.gpgcheck = true;
        self
    }

    /// Attaches a filelist metadata source.
    pub fn with_filelists(mut self, source: Box<dyn FilelistSource + Send>) -> Self {
        self.filelists = Some(source);
        self
    }

    /// Returns the attached filelist metadata source, if any.
    pub fn filelist_source(&self) -> Option<&(dyn FilelistSource + Send)> {
        self.filelists.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_defaults() {
        let repo = Repo::new(RepoId::new("fedora"));
        assert_eq!(repo.cost, 1000);
        assert!(repo.enabled);
        assert!(!repo.gpgcheck);
        assert!(repo.filelist_source().is_none());
    }

    #[test]
    fn sentinel_ids() {
        assert_eq!(RepoId::installed().inner(), "installed");
        assert_eq!(RepoId::commandline().inner(), "commandline");
        assert!(!RepoId::commandline().is_installed());
    }
}
