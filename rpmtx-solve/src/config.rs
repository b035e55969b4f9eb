use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Which architecture variants of a matching package an unqualified install
/// request selects on multilib systems.
#[derive(Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, PartialEq, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MultilibPolicy {
    /// Prefer the packages of the system's own library directories.
    Best,
    /// Take every compatible architecture.
    All,
}

/// The membership classes of a package group.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Ord, PartialEq, PartialOrd, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GroupPackageType {
    /// Packages always installed with the group.
    Mandatory,
    /// Packages installed unless deselected.
    Default,
    /// Packages installed only on request.
    Optional,
}

/// The configuration options the transaction core honors.
///
/// Loading configuration files is the front-end's job; the core only reads
/// this value.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Consider obsoletes when updating.
    pub obsoletes: bool,
    /// Only update to packages of the exact installed architecture.
    pub exactarch: bool,
    /// Package names held to exact-architecture updates even when
    /// `exactarch` is off.
    pub exactarchlist: BTreeSet<String>,
    /// Package names that may have several versions installed side by side.
    pub installonlypkgs: BTreeSet<String>,
    /// How many versions of an install-only package to keep; `0` disables
    /// the limiter.
    pub installonly_limit: u32,
    /// Retry resolution with problematic packages skipped instead of
    /// failing the whole transaction.
    pub skip_broken: bool,
    /// The group membership classes pulled in by a group install.
    pub group_package_types: BTreeSet<GroupPackageType>,
    /// Honor conditional group packages.
    pub enable_group_conditionals: bool,
    /// Architecture selection for unqualified installs on multilib systems.
    pub multilib_policy: MultilibPolicy,
    /// Whether later group definitions replace earlier ones when composing.
    pub overwrite_groups: bool,
    /// Exclude lists to ignore: `all`, `main` or repository identities.
    pub disable_excludes: BTreeSet<String>,
    /// Glob patterns of packages to hide from the sack.
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            obsoletes: true,
            exactarch: true,
            exactarchlist: ["kernel", "kernel-smp", "kernel-devel", "glibc"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            installonlypkgs: [
                "kernel",
                "kernel-smp",
                "kernel-bigmem",
                "kernel-enterprise",
                "kernel-debug",
                "kernel-unsupported",
                "kernel-source",
                "kernel-devel",
                "kernel-PAE",
                "kernel-PAE-debug",
            ]
            .into_iter()
            .map(ToString::to_string)
            .collect(),
            installonly_limit: 0,
            skip_broken: false,
            group_package_types: BTreeSet::from([
                GroupPackageType::Mandatory,
                GroupPackageType::Default,
            ]),
            enable_group_conditionals: true,
            multilib_policy: MultilibPolicy::Best,
            overwrite_groups: false,
            disable_excludes: BTreeSet::new(),
            exclude: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn defaults_match_documented_behavior() {
        let config = Config::default();
        assert!(config.obsoletes);
        assert!(config.exactarch);
        assert!(!config.skip_broken);
        assert_eq!(config.installonly_limit, 0);
        assert!(config.installonlypkgs.contains("kernel"));
        assert!(
            config
                .group_package_types
                .contains(&GroupPackageType::Mandatory)
        );
        assert!(
            !config
                .group_package_types
                .contains(&GroupPackageType::Optional)
        );
    }

    #[test]
    fn partial_config_deserializes_over_defaults() -> TestResult {
        let config: Config = serde_json::from_str(
            r#"{"skip_broken": true, "multilib_policy": "all", "installonly_limit": 3}"#,
        )?;
        assert!(config.skip_broken);
        assert_eq!(config.multilib_policy, MultilibPolicy::All);
        assert_eq!(config.installonly_limit, 3);
        assert!(config.obsoletes);
        Ok(())
    }
}
