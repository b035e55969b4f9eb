use std::cmp::Ordering;
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString, VariantNames};

use crate::Error;

/// Compares two version labels the way `rpm` does.
///
/// A label is walked as a sequence of maximal all-numeric or all-alphabetic
/// segments; everything else separates segments. Numeric segments compare
/// numerically (leading zeros are insignificant), alphabetic segments compare
/// lexically, and a numeric segment always orders newer than an alphabetic
/// one. The `~` character sorts before anything, including the end of the
/// label, so `1.0~rc1` orders older than `1.0`.
///
/// ## Examples
/// ```
/// use std::cmp::Ordering;
///
/// use rpmtx_types::label_compare;
///
/// assert_eq!(label_compare("1.0", "1.0"), Ordering::Equal);
/// assert_eq!(label_compare("1.10", "1.9"), Ordering::Greater);
/// assert_eq!(label_compare("1.0~rc1", "1.0"), Ordering::Less);
/// // leftover content wins, unlike a `~` suffix
/// assert_eq!(label_compare("2.0a", "2.0"), Ordering::Greater);
/// ```
pub fn label_compare(one: &str, two: &str) -> Ordering {
    if one == two {
        return Ordering::Equal;
    }

    let a = one.as_bytes();
    let b = two.as_bytes();
    let mut i = 0;
    let mut j = 0;

    while i < a.len() || j < b.len() {
        // anything that is neither alphanumeric nor `~` separates segments
        while i < a.len() && !a[i].is_ascii_alphanumeric() && a[i] != b'~' {
            i += 1;
        }
        while j < b.len() && !b[j].is_ascii_alphanumeric() && b[j] != b'~' {
            j += 1;
        }

        // `~` sorts before anything, the end of the label included
        let a_tilde = i < a.len() && a[i] == b'~';
        let b_tilde = j < b.len() && b[j] == b'~';
        if a_tilde || b_tilde {
            if !a_tilde {
                return Ordering::Greater;
            }
            if !b_tilde {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i >= a.len() || j >= b.len() {
            break;
        }

        // grab the next fully numeric or fully alphabetic segment from both
        // sides, typed by whatever the left side starts with
        let isnum = a[i].is_ascii_digit();
        let segment_end = |s: &[u8], mut k: usize| {
            if isnum {
                while k < s.len() && s[k].is_ascii_digit() {
                    k += 1;
                }
            } else {
                while k < s.len() && s[k].is_ascii_alphabetic() {
                    k += 1;
                }
            }
            k
        };
        let a_end = segment_end(a, i);
        let b_end = segment_end(b, j);

        // mismatched segment types: the numeric side is newer
        if j == b_end {
            return if isnum {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let a_seg = &one[i..a_end];
        let b_seg = &two[j..b_end];
        if isnum {
            let a_trim = a_seg.trim_start_matches('0');
            let b_trim = b_seg.trim_start_matches('0');
            // more significant digits win, a lexical compare settles ties
            let ordering = a_trim
                .len()
                .cmp(&b_trim.len())
                .then_with(|| a_trim.cmp(b_trim));
            if ordering.is_ne() {
                return ordering;
            }
        } else {
            let ordering = a_seg.cmp(b_seg);
            if ordering.is_ne() {
                return ordering;
            }
        }

        i = a_end;
        j = b_end;
    }

    // all shared segments tied; leftover content wins
    if i >= a.len() && j >= b.len() {
        return Ordering::Equal;
    }
    if i >= a.len() {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// An epoch-version-release triple.
///
/// Every axis is optional so that the same value can describe both a concrete
/// package version (version always present, missing epoch meaning `0`) and
/// the version half of a requirement tuple, where an unset axis is a
/// wildcard.
///
/// The total order is RPM's: epoch first (missing compares as `"0"`), then
/// version, then release. Release only participates when both sides carry
/// one, so `1.0` and `1.0-3` compare equal.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use rpmtx_types::Evr;
///
/// # fn main() -> Result<(), rpmtx_types::Error> {
/// let plain = Evr::from_str("1.0-1")?;
/// let epoch = Evr::from_str("2:1.0-1")?;
///
/// assert!(epoch > plain);
/// assert_eq!(plain, Evr::from_str("0:1.0")?);
/// assert_eq!("2:1.0-1", format!("{epoch}"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, Serialize)]
pub struct Evr {
    epoch: Option<String>,
    version: Option<String>,
    release: Option<String>,
}

impl Evr {
    /// Creates an [`Evr`] from optional raw components.
    pub fn new(epoch: Option<&str>, version: Option<&str>, release: Option<&str>) -> Self {
        Evr {
            epoch: epoch.map(ToString::to_string),
            version: version.map(ToString::to_string),
            release: release.map(ToString::to_string),
        }
    }

    /// Creates a fully specified [`Evr`], as carried by a concrete package.
    pub fn from_parts(epoch: &str, version: &str, release: &str) -> Self {
        Evr::new(Some(epoch), Some(version), Some(release))
    }

    /// Returns the epoch, defaulting to `"0"` when unset.
    pub fn epoch(&self) -> &str {
        self.epoch.as_deref().unwrap_or("0")
    }

    /// Returns the raw epoch, if any.
    pub fn raw_epoch(&self) -> Option<&str> {
        self.epoch.as_deref()
    }

    /// Returns the version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns the release, if any.
    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    /// Returns `true` if no axis is specified.
    pub fn is_unspecified(&self) -> bool {
        self.epoch.is_none() && self.version.is_none() && self.release.is_none()
    }

    /// Unsets the epoch axis.
    pub fn drop_epoch(&mut self) {
        self.epoch = None;
    }

    /// Unsets the version axis.
    pub fn drop_version(&mut self) {
        self.version = None;
    }

    /// Unsets the release axis.
    pub fn drop_release(&mut self) {
        self.release = None;
    }
}

/// Compares two [`Evr`] values by RPM label comparison.
///
/// Epochs default to `"0"`, versions to the empty label. The release axis is
/// skipped whenever either side leaves it unset.
pub fn evr_cmp(a: &Evr, b: &Evr) -> Ordering {
    let epoch = label_compare(a.epoch(), b.epoch());
    if epoch.is_ne() {
        return epoch;
    }

    let version = label_compare(a.version().unwrap_or(""), b.version().unwrap_or(""));
    if version.is_ne() {
        return version;
    }

    match (a.release(), b.release()) {
        (Some(a_rel), Some(b_rel)) => label_compare(a_rel, b_rel),
        _ => Ordering::Equal,
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        evr_cmp(self, other)
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Evr {
    fn eq(&self, other: &Self) -> bool {
        evr_cmp(self, other).is_eq()
    }
}

impl FromStr for Evr {
    type Err = Error;

    /// Parses an [`Evr`] from `[epoch:]version[-release]` form.
    fn from_str(input: &str) -> Result<Evr, Self::Err> {
        let (epoch, rest) = match input.split_once(':') {
            Some((epoch, rest)) => {
                if epoch.is_empty() || !epoch.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::InvalidVersion(input.to_string()));
                }
                (Some(epoch), rest)
            }
            None => (None, input),
        };
        let (version, release) = match rest.rsplit_once('-') {
            Some((version, release)) => (version, Some(release)),
            None => (rest, None),
        };
        if version.is_empty()
            || version.contains(':')
            || release.is_some_and(str::is_empty)
        {
            return Err(Error::InvalidVersion(input.to_string()));
        }
        Ok(Evr::new(epoch, Some(version), release))
    }
}

impl Display for Evr {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        if let Some(epoch) = self.raw_epoch() {
            write!(fmt, "{epoch}:")?;
        }
        write!(fmt, "{}", self.version().unwrap_or(""))?;
        if let Some(release) = self.release() {
            write!(fmt, "-{release}")?;
        }
        Ok(())
    }
}

/// The comparison function of a versioned dependency relation.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use rpmtx_types::VersionComparison;
///
/// assert_eq!(
///     VersionComparison::from_str(">="),
///     Ok(VersionComparison::GreaterOrEqual)
/// );
/// // RPM header mnemonics are accepted as well
/// assert_eq!(VersionComparison::from_str("LT"), Ok(VersionComparison::Less));
/// assert_eq!("<=", format!("{}", VersionComparison::LessOrEqual));
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    EnumString,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    StrumDisplay,
    VariantNames,
)]
pub enum VersionComparison {
    /// The version must be older than the specified one (`<`).
    #[strum(to_string = "<", serialize = "LT")]
    #[serde(rename = "<")]
    Less,
    /// The version must be older than or equal to the specified one (`<=`).
    #[strum(to_string = "<=", serialize = "LE")]
    #[serde(rename = "<=")]
    LessOrEqual,
    /// The version must be equal to the specified one (`=`).
    #[strum(to_string = "=", serialize = "EQ")]
    #[serde(rename = "=")]
    Equal,
    /// The version must be newer than or equal to the specified one (`>=`).
    #[strum(to_string = ">=", serialize = "GE")]
    #[serde(rename = ">=")]
    GreaterOrEqual,
    /// The version must be newer than the specified one (`>`).
    #[strum(to_string = ">", serialize = "GT")]
    #[serde(rename = ">")]
    Greater,
}

impl VersionComparison {
    /// Returns whether an [`Ordering`] between an actual and a required
    /// version satisfies this comparison function.
    pub fn is_satisfied_by(self, ordering: Ordering) -> bool {
        match self {
            VersionComparison::Less => ordering.is_lt(),
            VersionComparison::LessOrEqual => ordering.is_le(),
            VersionComparison::Equal => ordering.is_eq(),
            VersionComparison::GreaterOrEqual => ordering.is_ge(),
            VersionComparison::Greater => ordering.is_gt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    #[rstest]
    #[case("1.0", "1.0", Ordering::Equal)]
    #[case("1.0", "2.0", Ordering::Less)]
    #[case("2.0", "1.0", Ordering::Greater)]
    #[case("2.0.1", "2.0.1", Ordering::Equal)]
    #[case("2.0", "2.0.1", Ordering::Less)]
    #[case("2.0.1", "2.0.1a", Ordering::Less)]
    #[case("5.5p1", "5.5p2", Ordering::Less)]
    #[case("5.5p10", "5.5p1", Ordering::Greater)]
    #[case("10xyz", "10.1xyz", Ordering::Less)]
    #[case("xyz10", "xyz10.1", Ordering::Less)]
    #[case("xyz.4", "8", Ordering::Less)]
    #[case("2a", "2.0", Ordering::Less)]
    #[case("fc4", "fc.4", Ordering::Equal)]
    #[case("1.0010", "1.9", Ordering::Greater)]
    #[case("1.05", "1.5", Ordering::Equal)]
    #[case("4.999.9", "5.0", Ordering::Less)]
    #[case("2.4", "2.4~rc1", Ordering::Greater)]
    #[case("2.4~rc1", "2.4~rc2", Ordering::Less)]
    #[case("2.4~rc", "2.4~rc", Ordering::Equal)]
    #[case("1.0~", "1.0", Ordering::Less)]
    #[case("1_2", "1.2", Ordering::Equal)]
    #[case("", "0", Ordering::Less)]
    fn label_compare_cases(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(label_compare(a, b), expected);
        assert_eq!(label_compare(b, a), expected.reverse());
    }

    #[rstest]
    #[case("1.0-1", "1.0-1", Ordering::Equal)]
    #[case("1.0-1", "1.0-2", Ordering::Less)]
    #[case("1.0", "1.0-2", Ordering::Equal)]
    #[case("1:1.0-1", "2.0-1", Ordering::Greater)]
    #[case("0:1.0-1", "1.0-1", Ordering::Equal)]
    #[case("01:1.0-1", "1:1.0-1", Ordering::Equal)]
    #[case("1:0.5-1", "1:0.6-1", Ordering::Less)]
    fn evr_cmp_cases(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) -> TestResult {
        let a = Evr::from_str(a)?;
        let b = Evr::from_str(b)?;
        assert_eq!(evr_cmp(&a, &b), expected);
        assert_eq!(evr_cmp(&b, &a), expected.reverse());
        Ok(())
    }

    #[rstest]
    #[case("1.0", Evr::new(None, Some("1.0"), None))]
    #[case("1.0-1", Evr::new(None, Some("1.0"), Some("1")))]
    #[case("2:1.0-1.fc40", Evr::new(Some("2"), Some("1.0"), Some("1.fc40")))]
    fn evr_parse(#[case] input: &str, #[case] expected: Evr) -> TestResult {
        let evr = Evr::from_str(input)?;
        assert_eq!(evr.raw_epoch(), expected.raw_epoch());
        assert_eq!(evr.version(), expected.version());
        assert_eq!(evr.release(), expected.release());
        assert_eq!(format!("{evr}"), input);
        Ok(())
    }

    #[rstest]
    #[case("")]
    #[case(":1.0")]
    #[case("x:1.0")]
    #[case("1.0-")]
    #[case("1:-1")]
    fn evr_parse_rejects(#[case] input: &str) {
        assert_eq!(
            Evr::from_str(input),
            Err(Error::InvalidVersion(input.to_string()))
        );
    }

    #[rstest]
    #[case(VersionComparison::Less, Ordering::Less, true)]
    #[case(VersionComparison::Less, Ordering::Equal, false)]
    #[case(VersionComparison::LessOrEqual, Ordering::Equal, true)]
    #[case(VersionComparison::Equal, Ordering::Equal, true)]
    #[case(VersionComparison::Equal, Ordering::Greater, false)]
    #[case(VersionComparison::GreaterOrEqual, Ordering::Greater, true)]
    #[case(VersionComparison::Greater, Ordering::Equal, false)]
    fn comparison_satisfaction(
        #[case] comparison: VersionComparison,
        #[case] ordering: Ordering,
        #[case] expected: bool,
    ) {
        assert_eq!(comparison.is_satisfied_by(ordering), expected);
    }

    proptest! {
        #[test]
        fn label_compare_is_antisymmetric(
            a in "[a-z0-9.~_]{0,12}",
            b in "[a-z0-9.~_]{0,12}",
        ) {
            prop_assert_eq!(label_compare(&a, &b), label_compare(&b, &a).reverse());
        }

        #[test]
        fn label_compare_is_reflexive(a in "[a-z0-9.~_]{0,12}") {
            prop_assert_eq!(label_compare(&a, &a), Ordering::Equal);
        }

        #[test]
        fn label_compare_is_transitive(
            a in "[0-9.]{0,8}",
            b in "[0-9.]{0,8}",
            c in "[0-9.]{0,8}",
        ) {
            let mut labels = [a, b, c];
            labels.sort_by(|x, y| label_compare(x, y));
            prop_assert!(label_compare(&labels[0], &labels[2]).is_le());
        }
    }
}
