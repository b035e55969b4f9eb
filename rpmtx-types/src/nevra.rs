use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Architecture, Error, Evr, Name};

/// The full identity of a package: name, epoch, version, release and
/// architecture.
///
/// Two packages are *EVR-equal* iff their names match and their EVRs compare
/// equal; full equality also requires the architecture (and, for packages in
/// a sack, the origin repository tracked alongside). Field order follows the
/// classic package tuple `(name, arch, epoch, version, release)`.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use rpmtx_types::{Architecture, Nevra};
///
/// # fn main() -> Result<(), rpmtx_types::Error> {
/// let nevra = Nevra::from_str("zsh-2:5.9-3.fc40.x86_64")?;
/// assert_eq!(nevra.name, "zsh");
/// assert_eq!(nevra.arch, Architecture::X86_64);
/// assert_eq!(nevra.epoch, "2");
/// assert_eq!(nevra.version, "5.9");
/// assert_eq!(nevra.release, "3.fc40");
/// assert_eq!("zsh-2:5.9-3.fc40.x86_64", format!("{nevra}"));
///
/// // a zero epoch is implied and not displayed
/// let plain = Nevra::from_str("bash-5.2-1.noarch")?;
/// assert_eq!(plain.epoch, "0");
/// assert_eq!("bash-5.2-1.noarch", format!("{plain}"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Nevra {
    /// The package name.
    pub name: Name,
    /// The package architecture.
    pub arch: Architecture,
    /// The package epoch; `"0"` when the package does not carry one.
    pub epoch: String,
    /// The package version.
    pub version: String,
    /// The package release.
    pub release: String,
}

impl Nevra {
    /// Creates a [`Nevra`] from its parts.
    pub fn from_parts(
        name: Name,
        arch: Architecture,
        epoch: &str,
        version: &str,
        release: &str,
    ) -> Self {
        Nevra {
            name,
            arch,
            epoch: epoch.to_string(),
            version: version.to_string(),
            release: release.to_string(),
        }
    }

    /// Creates a [`Nevra`] from a `name-[epoch:]version-release.arch` string.
    pub fn new(input: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidNevra(input.to_string());

        let (rest, arch) = input.rsplit_once('.').ok_or_else(invalid)?;
        let arch = Architecture::from_str(arch)
            .map_err(|_| Error::InvalidArchitecture(arch.to_string()))?;
        let (rest, release) = rest.rsplit_once('-').ok_or_else(invalid)?;
        let (name, version) = rest.rsplit_once('-').ok_or_else(invalid)?;
        let (epoch, version) = match version.split_once(':') {
            Some((epoch, version)) => {
                if epoch.is_empty() || !epoch.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                (epoch, version)
            }
            None => ("0", version),
        };
        if version.is_empty() || release.is_empty() {
            return Err(invalid());
        }

        Ok(Nevra {
            name: Name::new(name)?,
            arch,
            epoch: epoch.to_string(),
            version: version.to_string(),
            release: release.to_string(),
        })
    }

    /// Returns the [`Evr`] of this identity.
    pub fn evr(&self) -> Evr {
        Evr::from_parts(&self.epoch, &self.version, &self.release)
    }

    /// Returns whether this identity and `other` agree on name and EVR,
    /// ignoring architecture.
    pub fn is_evr_equal(&self, other: &Nevra) -> bool {
        self.name == other.name && self.evr() == other.evr()
    }
}

impl FromStr for Nevra {
    type Err = Error;

    /// Creates a [`Nevra`] from a string.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Nevra::new(input)
    }
}

impl Display for Nevra {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{}-", self.name)?;
        if self.epoch != "0" {
            write!(fmt, "{}:", self.epoch)?;
        }
        write!(fmt, "{}-{}.{}", self.version, self.release, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    #[rstest]
    #[case("zsh-5.9-3.x86_64", "zsh", "0", "5.9", "3", Architecture::X86_64)]
    #[case("zsh-2:5.9-3.x86_64", "zsh", "2", "5.9", "3", Architecture::X86_64)]
    #[case(
        "kernel-devel-6.8.5-301.fc40.noarch",
        "kernel-devel",
        "0",
        "6.8.5",
        "301.fc40",
        Architecture::Noarch
    )]
    fn nevra_parse(
        #[case] input: &str,
        #[case] name: &str,
        #[case] epoch: &str,
        #[case] version: &str,
        #[case] release: &str,
        #[case] arch: Architecture,
    ) -> TestResult {
        let nevra = Nevra::from_str(input)?;
        assert_eq!(nevra.name, *name);
        assert_eq!(nevra.epoch, epoch);
        assert_eq!(nevra.version, version);
        assert_eq!(nevra.release, release);
        assert_eq!(nevra.arch, arch);
        Ok(())
    }

    #[rstest]
    #[case("zsh")]
    #[case("zsh.x86_64")]
    #[case("zsh-5.9.x86_64")]
    #[case("zsh-5.9-3.sparc")]
    #[case("zsh-x:5.9-3.x86_64")]
    fn nevra_parse_rejects(#[case] input: &str) {
        assert!(Nevra::from_str(input).is_err());
    }

    #[test]
    fn evr_equality_ignores_arch() -> TestResult {
        let a = Nevra::from_str("zsh-1-1.0.i386")?;
        let b = Nevra::from_str("zsh-1-1.0.x86_64")?;
        let c = Nevra::from_str("zsh-0:1-1.0.i386")?;
        assert!(a.is_evr_equal(&b));
        assert!(a.is_evr_equal(&c));
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn display_round_trip() -> TestResult {
        for input in ["zsh-5.9-3.x86_64", "zsh-2:5.9-3.i686", "p+x-1-1.noarch"] {
            assert_eq!(format!("{}", Nevra::from_str(input)?), input);
        }
        Ok(())
    }
}
