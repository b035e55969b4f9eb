use thiserror::Error;

/// The error that can occur when working with package sacks.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// An [`rpmtx_types::Error`].
    #[error(transparent)]
    Types(#[from] rpmtx_types::Error),

    /// No package matched the given pattern.
    #[error("No match for argument: {0}")]
    NoMatches(String),

    /// A repository is referenced that the sack does not know about.
    #[error("Unknown repository: {0}")]
    UnknownRepo(String),

    /// An invalid glob pattern was supplied.
    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why the pattern could not be compiled.
        reason: String,
    },

    /// Filelist metadata could not be obtained from a repository.
    #[error("Failed to retrieve filelists for repository {repo}: {reason}")]
    Filelists {
        /// The repository the retrieval failed for.
        repo: String,
        /// The reason reported by the metadata source.
        reason: String,
    },
}
