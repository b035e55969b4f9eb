use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

/// CPU architecture of a package.
///
/// Members of the Architecture enum can be created from `&str`.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use rpmtx_types::Architecture;
///
/// assert_eq!(Architecture::from_str("x86_64"), Ok(Architecture::X86_64));
/// assert_eq!("i686", format!("{}", Architecture::I686));
/// assert_eq!("noarch", format!("{}", Architecture::Noarch));
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    VariantNames,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// ARMv8 64-bit
    Aarch64,
    /// AMD Athlon
    Athlon,
    /// Intel 386
    I386,
    /// Intel 486
    I486,
    /// Intel 586
    I586,
    /// Intel 686
    I686,
    /// Architecture independent
    Noarch,
    /// PowerPC
    Ppc,
    /// PowerPC 64-bit
    Ppc64,
    /// IBM System z 31-bit
    S390,
    /// IBM System z 64-bit
    S390x,
    /// Source package, never installable
    Src,
    /// Intel/AMD x86_64
    X86_64,
}

impl Architecture {
    /// Returns the next architecture down the compatibility chain.
    ///
    /// Packages of the returned architecture can run on systems of this
    /// architecture. `noarch` and `src` have no parent.
    pub fn compat_parent(self) -> Option<Architecture> {
        match self {
            Architecture::X86_64 => Some(Architecture::Athlon),
            Architecture::Athlon => Some(Architecture::I686),
            Architecture::I686 => Some(Architecture::I586),
            Architecture::I586 => Some(Architecture::I486),
            Architecture::I486 => Some(Architecture::I386),
            Architecture::I386 => Some(Architecture::Noarch),
            Architecture::Ppc64 => Some(Architecture::Ppc),
            Architecture::Ppc => Some(Architecture::Noarch),
            Architecture::S390x => Some(Architecture::S390),
            Architecture::S390 => Some(Architecture::Noarch),
            Architecture::Aarch64 => Some(Architecture::Noarch),
            Architecture::Noarch | Architecture::Src => None,
        }
    }

    /// Returns whether this architecture supports multilib, i.e. whether
    /// 64-bit and 32-bit variants of the same library may coexist on it.
    pub fn is_multilib(self) -> bool {
        matches!(
            self,
            Architecture::X86_64 | Architecture::Ppc64 | Architecture::S390x
        )
    }

    /// Returns whether packages of this architecture can be installed at all.
    pub fn is_installable(self) -> bool {
        self != Architecture::Src
    }
}

/// Returns the ordered list of architectures compatible with `canonical`.
///
/// The list starts with `canonical` itself, walks the compatibility chain and
/// always ends in [`Architecture::Noarch`].
///
/// ## Examples
/// ```
/// use rpmtx_types::{Architecture, compat_arch_list};
///
/// assert_eq!(
///     compat_arch_list(Architecture::X86_64),
///     [
///         Architecture::X86_64,
///         Architecture::Athlon,
///         Architecture::I686,
///         Architecture::I586,
///         Architecture::I486,
///         Architecture::I386,
///         Architecture::Noarch,
///     ]
/// );
/// ```
pub fn compat_arch_list(canonical: Architecture) -> Vec<Architecture> {
    let mut list = vec![canonical];
    let mut current = canonical;
    while let Some(parent) = current.compat_parent() {
        list.push(parent);
        current = parent;
    }
    if !list.contains(&Architecture::Noarch) {
        list.push(Architecture::Noarch);
    }
    list
}

/// Returns the compatibility distance from `want` to `have`.
///
/// The distance is `1` when the architectures are equal and grows by one per
/// step down the compatibility chain; smaller is closer. `None` means `have`
/// cannot satisfy `want` at all.
///
/// ## Examples
/// ```
/// use rpmtx_types::{Architecture, arch_distance};
///
/// assert_eq!(arch_distance(Architecture::X86_64, Architecture::X86_64), Some(1));
/// assert_eq!(arch_distance(Architecture::X86_64, Architecture::I686), Some(3));
/// assert_eq!(arch_distance(Architecture::I686, Architecture::X86_64), None);
/// ```
pub fn arch_distance(want: Architecture, have: Architecture) -> Option<u32> {
    let mut current = want;
    let mut distance = 1;
    loop {
        if current == have {
            return Some(distance);
        }
        current = current.compat_parent()?;
        distance += 1;
    }
}

/// Picks the best architecture out of `candidates` for a `canonical` system
/// architecture.
///
/// Candidates incompatible with `canonical` are ignored; among the rest the
/// closest by [`arch_distance`] wins, with ties broken alphabetically.
pub fn best_arch_from(
    canonical: Architecture,
    candidates: &[Architecture],
) -> Option<Architecture> {
    candidates
        .iter()
        .copied()
        .filter_map(|candidate| arch_distance(canonical, candidate).map(|d| (d, candidate)))
        .min_by(|(a_dist, a), (b_dist, b)| {
            a_dist
                .cmp(b_dist)
                .then_with(|| a.to_string().cmp(&b.to_string()))
        })
        .map(|(_, arch)| arch)
}

/// Returns the architectures that share the canonical architecture's own
/// library directories.
///
/// On multilib systems this is the 64-bit half of the pair plus `noarch`;
/// everywhere else it is the full compatibility list. Used by the
/// `multilib_policy = best` install path.
pub fn multilib_peers(canonical: Architecture) -> Vec<Architecture> {
    if canonical.is_multilib() {
        vec![canonical, Architecture::Noarch]
    } else {
        compat_arch_list(canonical)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;
    use strum::ParseError;

    use super::*;

    #[rstest]
    #[case("aarch64", Ok(Architecture::Aarch64))]
    #[case("athlon", Ok(Architecture::Athlon))]
    #[case("i386", Ok(Architecture::I386))]
    #[case("i686", Ok(Architecture::I686))]
    #[case("noarch", Ok(Architecture::Noarch))]
    #[case("ppc64", Ok(Architecture::Ppc64))]
    #[case("s390x", Ok(Architecture::S390x))]
    #[case("src", Ok(Architecture::Src))]
    #[case("x86_64", Ok(Architecture::X86_64))]
    #[case("foo", Err(ParseError::VariantNotFound))]
    fn architecture_from_string(#[case] s: &str, #[case] arch: Result<Architecture, ParseError>) {
        assert_eq!(Architecture::from_str(s), arch);
    }

    #[rstest]
    #[case(Architecture::X86_64, Architecture::X86_64, Some(1))]
    #[case(Architecture::X86_64, Architecture::Athlon, Some(2))]
    #[case(Architecture::X86_64, Architecture::I386, Some(6))]
    #[case(Architecture::X86_64, Architecture::Noarch, Some(7))]
    #[case(Architecture::I686, Architecture::I386, Some(4))]
    #[case(Architecture::I686, Architecture::X86_64, None)]
    #[case(Architecture::X86_64, Architecture::Ppc64, None)]
    #[case(Architecture::Noarch, Architecture::Noarch, Some(1))]
    fn arch_distances(
        #[case] want: Architecture,
        #[case] have: Architecture,
        #[case] expected: Option<u32>,
    ) {
        assert_eq!(arch_distance(want, have), expected);
    }

    #[rstest]
    #[case(Architecture::X86_64, true)]
    #[case(Architecture::Ppc64, true)]
    #[case(Architecture::S390x, true)]
    #[case(Architecture::I686, false)]
    #[case(Architecture::Noarch, false)]
    #[case(Architecture::Aarch64, false)]
    fn multilib_detection(#[case] arch: Architecture, #[case] expected: bool) {
        assert_eq!(arch.is_multilib(), expected);
    }

    #[rstest]
    #[case(
        Architecture::X86_64,
        &[Architecture::I686, Architecture::X86_64],
        Some(Architecture::X86_64)
    )]
    #[case(
        Architecture::X86_64,
        &[Architecture::I386, Architecture::I686],
        Some(Architecture::I686)
    )]
    #[case(
        Architecture::I686,
        &[Architecture::Noarch, Architecture::I586],
        Some(Architecture::I586)
    )]
    #[case(Architecture::I686, &[Architecture::X86_64], None)]
    #[case(Architecture::X86_64, &[], None)]
    fn best_arch_selection(
        #[case] canonical: Architecture,
        #[case] candidates: &[Architecture],
        #[case] expected: Option<Architecture>,
    ) {
        assert_eq!(best_arch_from(canonical, candidates), expected);
    }

    #[test]
    fn compat_list_ends_in_noarch() {
        for arch in [
            Architecture::X86_64,
            Architecture::I686,
            Architecture::Ppc64,
            Architecture::S390x,
            Architecture::Aarch64,
        ] {
            let list = compat_arch_list(arch);
            assert_eq!(list.first(), Some(&arch));
            assert_eq!(list.last(), Some(&Architecture::Noarch));
        }
    }
}
