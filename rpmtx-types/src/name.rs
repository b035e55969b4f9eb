use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// The name of a package.
///
/// A `Name` wraps a `String` that is guaranteed to be non-empty, to consist
/// only of alphanumeric characters and `"-"`, `"."`, `"_"` or `"+"`, and to
/// not start with a `"-"` or a `"."`.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use rpmtx_types::Name;
///
/// assert!(Name::from_str("kernel-devel").is_ok());
/// assert!(Name::from_str("libstdc++").is_ok());
/// assert!(Name::from_str("-foo").is_err());
/// assert!(Name::from_str("").is_err());
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    /// Creates a new [`Name`] from a string.
    pub fn new(name: &str) -> Result<Self, Error> {
        let valid = !name.is_empty()
            && !name.starts_with(['-', '.'])
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '+'));
        if valid {
            Ok(Name(name.to_string()))
        } else {
            Err(Error::InvalidName(name.to_string()))
        }
    }

    /// Returns a reference to the inner string.
    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        self.inner()
    }
}

impl FromStr for Name {
    type Err = Error;

    /// Creates a [`Name`] from a string.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Name::new(input)
    }
}

impl TryFrom<String> for Name {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Name::new(&value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.inner() == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.inner() == *other
    }
}

impl Display for Name {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.inner())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("zsh", true)]
    #[case("kernel-devel", true)]
    #[case("libstdc++", true)]
    #[case("python3.12", true)]
    #[case("_underscore", true)]
    #[case("", false)]
    #[case("-dash", false)]
    #[case(".dot", false)]
    #[case("with space", false)]
    #[case("pkg/slash", false)]
    fn name_validation(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(Name::from_str(input).is_ok(), valid);
    }

    #[test]
    fn name_round_trips_serde() {
        let name = Name::new("zsh").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"zsh\"");
        assert_eq!(serde_json::from_str::<Name>(&json).unwrap(), name);
        assert!(serde_json::from_str::<Name>("\"-bad\"").is_err());
    }
}
