use std::sync::Arc;

use rpmtx_types::{Nevra, Relation};

use crate::{Error, NevraQuery, Package, PackageSack};

/// A read-only view of the installed package database.
///
/// The view wraps a [`PackageSack`] holding [`crate::PackageSource::Installed`]
/// packages. It is opened once per process by the surrounding tooling and
/// never written to by the transaction core; erasures only ever happen
/// through the external transaction runner.
#[derive(Debug, Default)]
pub struct RpmDb {
    sack: PackageSack,
}

impl RpmDb {
    /// Creates a view over the given installed packages.
    pub fn new(packages: Vec<Arc<Package>>) -> Self {
        let mut sack = PackageSack::new();
        for package in packages {
            sack.add_package(package);
        }
        RpmDb { sack }
    }

    /// Returns all installed packages.
    pub fn packages(&self) -> Vec<Arc<Package>> {
        self.sack.packages()
    }

    /// Returns the identities of all installed packages.
    pub fn simple_pkg_list(&self) -> Vec<Nevra> {
        self.sack.simple_pkg_list()
    }

    /// Returns the installed packages matching a partial NEVRA predicate.
    pub fn search_nevra(&self, query: &NevraQuery) -> Vec<Arc<Package>> {
        self.sack.search_nevra(query)
    }

    /// Returns the installed packages with exactly the given identity.
    pub fn search_pkg_tuple(&self, nevra: &Nevra) -> Vec<Arc<Package>> {
        self.sack.search_pkg_tuple(nevra)
    }

    /// Returns the installed packages satisfying the provides requirement
    /// `req`, file entries included.
    ///
    /// Installed packages always carry complete file lists, so no filelist
    /// population is ever needed here.
    pub fn get_provides(&self, req: &Relation) -> Vec<Arc<Package>> {
        self.sack.search_provides_unpopulated(req)
    }

    /// Returns the installed packages whose requires overlap `req`.
    pub fn search_requires(&self, req: &Relation) -> Vec<Arc<Package>> {
        self.sack.search_requires(req)
    }

    /// Returns whether any installed package carries the given name.
    pub fn contains_name(&self, name: &str) -> bool {
        self.sack.contains_name(name)
    }

    /// Returns whether the exact package is installed.
    pub fn contains_package(&self, package: &Package) -> bool {
        self.sack
            .search_pkg_tuple(package.nevra())
            .iter()
            .any(|installed| installed.nevra() == package.nevra())
    }

    /// Splits user patterns into exact hits, glob hits and unmatched
    /// leftovers against the installed packages.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid glob pattern.
    pub fn match_package_names(
        &self,
        patterns: &[&str],
    ) -> Result<(Vec<Arc<Package>>, Vec<Arc<Package>>, Vec<String>), Error> {
        self.sack.match_package_names(patterns)
    }

    /// Returns every file requirement carried by installed packages,
    /// paired with the requiring package.
    pub fn file_requires(&self) -> Vec<(Arc<Package>, String)> {
        let mut result = Vec::new();
        for package in self.packages() {
            for req in package.requires() {
                if req.is_file() {
                    result.push((Arc::clone(&package), req.name.clone()));
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    fn rpmdb() -> RpmDb {
        RpmDb::new(vec![
            Package::installed(Nevra::from_str("zsh-5.9-3.x86_64").unwrap())
                .file("/usr/bin/zsh")
                .requires(Relation::from_str("/bin/sh").unwrap())
                .build(),
            Package::installed(Nevra::from_str("bash-5.2-1.x86_64").unwrap())
                .provides(Relation::from_str("sh").unwrap())
                .file("/bin/sh")
                .build(),
        ])
    }

    #[rstest]
    #[case("sh", 1)]
    #[case("/bin/sh", 1)]
    #[case("/usr/bin/zsh", 1)]
    #[case("zsh", 1)]
    #[case("csh", 0)]
    fn installed_provides(#[case] req: &str, #[case] expected: usize) -> TestResult {
        assert_eq!(
            rpmdb().get_provides(&Relation::from_str(req)?).len(),
            expected
        );
        Ok(())
    }

    #[test]
    fn file_requires_are_paired_with_requirers() {
        let requires = rpmdb().file_requires();
        assert_eq!(requires.len(), 1);
        assert_eq!(requires[0].0.name().inner(), "zsh");
        assert_eq!(requires[0].1, "/bin/sh");
    }

    #[test]
    fn contains_checks() -> TestResult {
        let db = rpmdb();
        assert!(db.contains_name("zsh"));
        assert!(!db.contains_name("csh"));
        let other = Package::installed(Nevra::from_str("csh-1.0-1.x86_64")?).build();
        assert!(!db.contains_package(&other));
        Ok(())
    }
}
