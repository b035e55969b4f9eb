use std::cmp::Ordering;
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use winnow::{
    ModalResult, Parser,
    ascii::multispace0,
    combinator::{alt, cut_err, eof, opt, preceded, terminated},
    error::{StrContext, StrContextValue},
    token::{rest, take_while},
};

use crate::{Error, Evr, VersionComparison, evr_cmp};

/// One provides/requires/conflicts/obsoletes entry of a package.
///
/// A `Relation` tracks a name, an optional comparison function and an
/// optional [`Evr`]. The name is not restricted to package names: file
/// requirements carry an absolute path and internal RPM capabilities use the
/// `rpmlib(...)` form.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use rpmtx_types::Relation;
///
/// # fn main() -> Result<(), rpmtx_types::Error> {
/// let plain = Relation::from_str("zsh")?;
/// assert!(plain.flag.is_none());
///
/// let versioned = Relation::from_str("zsh >= 2:5.0-1")?;
/// assert_eq!("zsh >= 2:5.0-1", format!("{versioned}"));
///
/// let file = Relation::from_str("/usr/bin/zsh")?;
/// assert!(file.is_file());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Relation {
    /// The name of the required capability, file path or package.
    pub name: String,
    /// The comparison function, if the relation is versioned.
    pub flag: Option<VersionComparison>,
    /// The version the comparison function applies to.
    pub evr: Evr,
}

impl Relation {
    /// Creates a versioned [`Relation`].
    pub fn new(name: &str, flag: VersionComparison, evr: Evr) -> Self {
        Relation {
            name: name.to_string(),
            flag: Some(flag),
            evr,
        }
    }

    /// Creates an unversioned [`Relation`] that matches any version.
    pub fn unversioned(name: &str) -> Self {
        Relation {
            name: name.to_string(),
            flag: None,
            evr: Evr::default(),
        }
    }

    /// Creates an exact-version [`Relation`], as used for self-provides.
    pub fn new_versioned(name: &str, evr: Evr) -> Self {
        Relation::new(name, VersionComparison::Equal, evr)
    }

    /// Returns whether this is a file requirement (the name is an absolute
    /// path).
    pub fn is_file(&self) -> bool {
        self.name.starts_with('/')
    }

    /// Returns whether this names an internal RPM capability, which the
    /// resolver ignores.
    pub fn is_rpmlib(&self) -> bool {
        self.name.starts_with("rpmlib(")
    }

    /// Recognizes a [`Relation`] in an input string.
    ///
    /// Consumes all input and accepts `name`, `name <op> evr` and absolute
    /// file paths.
    pub fn parser(input: &mut &str) -> ModalResult<Relation> {
        // file requirements are plain absolute paths and never carry a
        // version
        if input.starts_with('/') {
            let path = rest.parse_next(input)?;
            return Ok(Relation::unversioned(path));
        }

        let name = take_while(1.., |c: char| {
            !c.is_whitespace() && !matches!(c, '<' | '>' | '=')
        })
        .context(StrContext::Label("capability name"))
        .parse_next(input)?
        .to_string();

        multispace0.parse_next(input)?;
        if opt(eof).parse_next(input)?.is_some() {
            return Ok(Relation::unversioned(&name));
        }

        let flag = cut_err(
            alt(("<=", ">=", "<", ">", "=")).try_map(VersionComparison::from_str),
        )
        .context(StrContext::Label("comparison function"))
        .context(StrContext::Expected(StrContextValue::Description(
            "one of `<`, `<=`, `=`, `>=`, `>`",
        )))
        .parse_next(input)?;

        let evr = cut_err(terminated(
            preceded(
                multispace0,
                take_while(1.., |c: char| !c.is_whitespace()).try_map(Evr::from_str),
            ),
            (multispace0, eof),
        ))
        .context(StrContext::Label("version"))
        .parse_next(input)?;

        Ok(Relation {
            name,
            flag: Some(flag),
            evr,
        })
    }
}

impl FromStr for Relation {
    type Err = Error;

    /// Creates a [`Relation`] from a string.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Relation::parser
            .parse(input)
            .map_err(|_| Error::InvalidRequirement(input.to_string()))
    }
}

impl Display for Relation {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.name)?;
        if let Some(flag) = self.flag {
            write!(fmt, " {flag} {}", self.evr)?;
        }
        Ok(())
    }
}

/// Returns whether the version range of `prov` overlaps the version range of
/// `req`.
///
/// Name mismatches never overlap; an unversioned side always does. Partial
/// EVRs elide the missing axes from the other side before comparison, so the
/// requirement `foo = 1:3.0` is satisfied by the provide `foo = 1:3.0-15`.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use rpmtx_types::{Relation, range_compare};
///
/// # fn main() -> Result<(), rpmtx_types::Error> {
/// let req = Relation::from_str("zsh >= 2.0")?;
/// assert!(range_compare(&req, &Relation::from_str("zsh = 2.1-1")?));
/// assert!(range_compare(&req, &Relation::from_str("zsh")?));
/// assert!(!range_compare(&req, &Relation::from_str("zsh = 1.9")?));
/// assert!(!range_compare(&req, &Relation::from_str("bash = 5.0")?));
/// # Ok(())
/// # }
/// ```
pub fn range_compare(req: &Relation, prov: &Relation) -> bool {
    if req.name != prov.name {
        return false;
    }
    let (Some(req_flag), Some(prov_flag)) = (req.flag, prov.flag) else {
        // an unversioned side satisfies any range
        return true;
    };

    let mut prov_evr = prov.evr.clone();
    let mut req_evr = req.evr.clone();
    if req.evr.raw_epoch().is_none() {
        prov_evr.drop_epoch();
    }
    if req.evr.version().is_none() {
        prov_evr.drop_version();
    }
    if req.evr.release().is_none() {
        prov_evr.drop_release();
    }
    if prov.evr.release().is_none() {
        req_evr.drop_release();
    }

    use VersionComparison::*;
    match evr_cmp(&prov_evr, &req_evr) {
        Ordering::Greater => match req_flag {
            Greater | GreaterOrEqual => true,
            Equal | LessOrEqual | Less => matches!(prov_flag, Less | LessOrEqual),
        },
        Ordering::Equal => match req_flag {
            Greater => matches!(prov_flag, Greater | GreaterOrEqual),
            GreaterOrEqual => {
                matches!(prov_flag, Greater | GreaterOrEqual | Equal | LessOrEqual)
            }
            Equal => matches!(prov_flag, Equal | GreaterOrEqual | LessOrEqual),
            LessOrEqual => {
                matches!(prov_flag, Equal | LessOrEqual | Less | GreaterOrEqual)
            }
            Less => matches!(prov_flag, Less | LessOrEqual),
        },
        Ordering::Less => match req_flag {
            Greater | GreaterOrEqual | Equal => {
                matches!(prov_flag, Greater | GreaterOrEqual)
            }
            LessOrEqual | Less => true,
        },
    }
}

/// Returns whether an obsoletes `entry` covers the package identified by
/// `name` and `evr`.
///
/// Obsoletes match package names, not provides. An entry without a release
/// ignores the package's release. `<` matches like `<=`; long-standing
/// consumer behavior depends on it.
pub fn obsolete_matches(entry: &Relation, name: &str, evr: &Evr) -> bool {
    if entry.name != name {
        return false;
    }
    let Some(flag) = entry.flag else {
        return true;
    };

    let mut pkg_evr = evr.clone();
    if entry.evr.release().is_none() {
        pkg_evr.drop_release();
    }

    let ordering = evr_cmp(&pkg_evr, &entry.evr);
    match flag {
        VersionComparison::Equal => ordering.is_eq(),
        VersionComparison::Greater => ordering.is_gt(),
        VersionComparison::GreaterOrEqual => ordering.is_ge(),
        VersionComparison::Less | VersionComparison::LessOrEqual => ordering.is_le(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    #[rstest]
    #[case("zsh", Relation::unversioned("zsh"))]
    #[case("/usr/bin/zsh", Relation::unversioned("/usr/bin/zsh"))]
    #[case(
        "zsh >= 5.0",
        Relation::new("zsh", VersionComparison::GreaterOrEqual, Evr::new(None, Some("5.0"), None))
    )]
    #[case(
        "zsh>=5.0",
        Relation::new("zsh", VersionComparison::GreaterOrEqual, Evr::new(None, Some("5.0"), None))
    )]
    #[case(
        "perl = 0:1-1",
        Relation::new("perl", VersionComparison::Equal, Evr::new(Some("0"), Some("1"), Some("1")))
    )]
    #[case(
        "config(bash) = 5.2.26-1.fc40",
        Relation::new(
            "config(bash)",
            VersionComparison::Equal,
            Evr::new(None, Some("5.2.26"), Some("1.fc40"))
        )
    )]
    #[case("rpmlib(PayloadIsZstd)", Relation::unversioned("rpmlib(PayloadIsZstd)"))]
    fn relation_parse(#[case] input: &str, #[case] expected: Relation) -> TestResult {
        assert_eq!(Relation::from_str(input)?, expected);
        Ok(())
    }

    #[rstest]
    #[case("")]
    #[case("zsh >")]
    #[case("zsh !! 1.0")]
    #[case("zsh >= ")]
    #[case("zsh = 1.0 trailing")]
    fn relation_parse_rejects(#[case] input: &str) {
        assert_eq!(
            Relation::from_str(input),
            Err(Error::InvalidRequirement(input.to_string()))
        );
    }

    #[rstest]
    #[case("zsh", "zsh = 1.0-1", true)]
    #[case("zsh = 1.0", "zsh", true)]
    #[case("zsh = 1.0", "zsh = 1.0-15", true)]
    #[case("zsh = 1.0-2", "zsh = 1.0-15", false)]
    #[case("zsh >= 2.0", "zsh = 2.0-1", true)]
    #[case("zsh > 2.0", "zsh = 2.0", false)]
    #[case("zsh > 2.0", "zsh >= 2.0", true)]
    #[case("zsh < 2.0", "zsh = 1.0", true)]
    #[case("zsh < 2.0", "zsh = 2.0", false)]
    #[case("zsh <= 2.0", "zsh = 2.0", true)]
    #[case("zsh = 1.0", "zsh >= 0.5", true)]
    #[case("zsh = 1.0", "zsh < 0.5", false)]
    #[case("zsh = 3.0", "zsh = 1:3.0", true)]
    #[case("zsh = 1:3.0", "zsh = 3.0", false)]
    #[case("bash = 1.0", "zsh = 1.0", false)]
    fn range_compare_cases(
        #[case] req: &str,
        #[case] prov: &str,
        #[case] expected: bool,
    ) -> TestResult {
        let req = Relation::from_str(req)?;
        let prov = Relation::from_str(prov)?;
        assert_eq!(range_compare(&req, &prov), expected);
        Ok(())
    }

    #[rstest]
    #[case("foo", "foo", "2.0-1", true)]
    #[case("foo", "bar", "2.0-1", false)]
    #[case("foo <= 1-1.0", "foo", "1-1.0", true)]
    #[case("foo <= 1-1.0", "foo", "2-1.0", false)]
    #[case("foo < 2.0", "foo", "1.0-1", true)]
    // `<` matches the boundary exactly like `<=` does
    #[case("foo < 2.0", "foo", "2.0-1", true)]
    #[case("foo <= 2.0", "foo", "2.0-1", true)]
    #[case("foo = 2.0", "foo", "2.0-9", true)]
    #[case("foo >= 3.0", "foo", "2.0-1", false)]
    fn obsolete_matching(
        #[case] entry: &str,
        #[case] name: &str,
        #[case] evr: &str,
        #[case] expected: bool,
    ) -> TestResult {
        let entry = Relation::from_str(entry)?;
        let evr = Evr::from_str(evr)?;
        assert_eq!(obsolete_matches(&entry, name, &evr), expected);
        Ok(())
    }
}
