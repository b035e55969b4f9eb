use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};

use crate::Error;

/// The hash function a [`Checksum`] was produced with.
#[derive(
    Clone, Copy, Debug, Deserialize, EnumString, Eq, PartialEq, Serialize, StrumDisplay,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    /// MD5, found in legacy repository metadata only.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl ChecksumKind {
    /// Returns the hex digest length of this hash function.
    pub fn digest_len(self) -> usize {
        match self {
            ChecksumKind::Md5 => 32,
            ChecksumKind::Sha1 => 40,
            ChecksumKind::Sha256 => 64,
            ChecksumKind::Sha512 => 128,
        }
    }
}

/// A package checksum as carried by repository metadata.
///
/// The core only transports checksum values; computing and verifying digests
/// is the job of the metadata acquisition layer. `is_id` marks the checksum
/// that doubles as the package's key in its repository.
///
/// ## Examples
/// ```
/// use rpmtx_types::{Checksum, ChecksumKind};
///
/// # fn main() -> Result<(), rpmtx_types::Error> {
/// let checksum = Checksum::new(ChecksumKind::Sha256, &"ab".repeat(32), true)?;
/// assert_eq!(checksum.kind, ChecksumKind::Sha256);
/// assert!(Checksum::new(ChecksumKind::Sha256, "abc", true).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Checksum {
    /// The hash function used.
    pub kind: ChecksumKind,
    /// The hex-encoded digest.
    pub digest: String,
    /// Whether this checksum identifies the package in its repository.
    pub is_id: bool,
}

impl Checksum {
    /// Creates a new [`Checksum`] after validating the hex digest.
    pub fn new(kind: ChecksumKind, digest: &str, is_id: bool) -> Result<Self, Error> {
        if digest.len() == kind.digest_len()
            && digest.bytes().all(|b| b.is_ascii_hexdigit())
        {
            Ok(Checksum {
                kind,
                digest: digest.to_ascii_lowercase(),
                is_id,
            })
        } else {
            Err(Error::InvalidChecksum(digest.to_string()))
        }
    }
}

impl FromStr for Checksum {
    type Err = Error;

    /// Creates a [`Checksum`] from a `kind:digest` string.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (kind, digest) = input
            .split_once(':')
            .ok_or_else(|| Error::InvalidChecksum(input.to_string()))?;
        let kind = ChecksumKind::from_str(kind)
            .map_err(|_| Error::InvalidChecksum(input.to_string()))?;
        Checksum::new(kind, digest, false)
    }
}

impl Display for Checksum {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{}:{}", self.kind, self.digest)
    }
}
