use thiserror::Error;

/// The error that can occur when handling rpmtx types.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// An invalid package name.
    #[error("Invalid package name: {0}")]
    InvalidName(String),

    /// An invalid epoch/version/release value.
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// An invalid requirement expression.
    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    /// An invalid NEVRA string.
    #[error("Invalid package identity: {0}")]
    InvalidNevra(String),

    /// An unknown CPU architecture.
    #[error("Invalid CPU architecture: {0}")]
    InvalidArchitecture(String),

    /// An invalid checksum digest.
    #[error("Invalid checksum digest: {0}")]
    InvalidChecksum(String),
}
