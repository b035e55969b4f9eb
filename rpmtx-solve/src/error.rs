use thiserror::Error;

/// The error that can occur when computing transactions.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// An [`rpmtx_types::Error`].
    #[error(transparent)]
    Types(#[from] rpmtx_types::Error),

    /// An [`rpmtx_sack::Error`].
    #[error(transparent)]
    Sack(#[from] rpmtx_sack::Error),

    /// No provider exists for a requirement.
    #[error("Missing Dependency: {requirement} is needed by package {requirer}")]
    MissingDependency {
        /// The package carrying the unsatisfied requirement.
        requirer: String,
        /// The requirement nothing provides.
        requirement: String,
    },

    /// Two packages conflict and neither side can be updated away.
    #[error("{a} conflicts with {b}")]
    PackageConflict {
        /// The package declaring the conflict.
        a: String,
        /// The package being conflicted with.
        b: String,
        /// The conflict entry that fired.
        conflict: String,
    },

    /// The resolver hit an inconsistent state, e.g. a candidate vanished
    /// from the sack mid-pass.
    #[error("Depsolving problem for {po}: {msg}")]
    DepError {
        /// The package the resolver was working on.
        po: String,
        /// What went wrong.
        msg: String,
    },

    /// Nothing to install, or an install request that cannot be honored.
    #[error("{0}")]
    InstallError(String),

    /// Nothing to remove, or a remove request that cannot be honored.
    #[error("{0}")]
    RemoveError(String),

    /// An unknown group was referenced.
    #[error("{0}")]
    GroupsError(String),

    /// The process-wide transaction lock is held elsewhere.
    #[error("Unable to obtain the transaction lock: {0}")]
    Lock(String),

    /// A signature check failure forwarded from the verification
    /// collaborator.
    #[error("GPG check failed: {0}")]
    GpgCheck(String),

    /// A retrieval failure forwarded from the download collaborator.
    #[error("Download failed: {0}")]
    Download(String),

    /// A check failure forwarded from the RPM test-transaction
    /// collaborator.
    #[error("RPM check failed: {0}")]
    RpmCheck(String),

    /// A test-transaction failure forwarded from the transaction runner.
    #[error("Test transaction failed: {0}")]
    TestTransaction(String),
}

/// Exit codes the surrounding command-line tooling maps results to.
///
/// Consumers depend on these values; they are part of the wire contract.
pub mod exit {
    /// Everything went fine.
    pub const SUCCESS: u8 = 0;
    /// An error occurred, user abort and unresolved dependencies included.
    pub const ERROR: u8 = 1;
    /// `check-update` found updates available.
    pub const UPDATES_AVAILABLE: u8 = 100;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_format_string() {
        assert_eq!(
            "Missing Dependency: zsh >= 2 is needed by package zsh-utils-1-1.noarch",
            format!(
                "{}",
                Error::MissingDependency {
                    requirer: "zsh-utils-1-1.noarch".to_string(),
                    requirement: "zsh >= 2".to_string(),
                }
            )
        );
        assert_eq!(
            "foo conflicts with bar",
            format!(
                "{}",
                Error::PackageConflict {
                    a: "foo".to_string(),
                    b: "bar".to_string(),
                    conflict: "bar < 2".to_string(),
                }
            )
        );
    }
}
