use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use rpmtx_types::{Architecture, Name, Nevra, Relation, evr_cmp};

use crate::macros::regex_once;
use crate::{Error, Package, PrcoKind, Repo, RepoId, matcher};

/// The key of a package inside a sack: origin repository plus identity.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PkgKey {
    /// The origin repository of the entry.
    pub repo: RepoId,
    /// The identity of the entry.
    pub nevra: Nevra,
}

impl PkgKey {
    /// Returns the key of a package.
    pub fn of(package: &Package) -> Self {
        PkgKey {
            repo: package.repo_id(),
            nevra: package.nevra().clone(),
        }
    }
}

/// A partial NEVRA predicate; every unset field matches anything.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NevraQuery {
    /// The package name to match.
    pub name: Option<String>,
    /// The epoch to match.
    pub epoch: Option<String>,
    /// The version to match.
    pub version: Option<String>,
    /// The release to match.
    pub release: Option<String>,
    /// The architecture to match.
    pub arch: Option<Architecture>,
}

impl NevraQuery {
    /// Creates a query matching all packages of one name.
    pub fn name(name: &str) -> Self {
        NevraQuery {
            name: Some(name.to_string()),
            ..NevraQuery::default()
        }
    }

    /// Creates a query matching one exact identity.
    pub fn from_nevra(nevra: &Nevra) -> Self {
        NevraQuery {
            name: Some(nevra.name.to_string()),
            epoch: Some(nevra.epoch.clone()),
            version: Some(nevra.version.clone()),
            release: Some(nevra.release.clone()),
            arch: Some(nevra.arch),
        }
    }

    /// Restricts the query to one architecture.
    pub fn arch(mut self, arch: Architecture) -> Self {
        self.arch = Some(arch);
        self
    }

    /// Restricts the query to one epoch.
    pub fn epoch(mut self, epoch: &str) -> Self {
        self.epoch = Some(epoch.to_string());
        self
    }

    /// Restricts the query to one version.
    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Restricts the query to one release.
    pub fn release(mut self, release: &str) -> Self {
        self.release = Some(release.to_string());
        self
    }

    /// Returns whether an identity satisfies the predicate.
    pub fn matches(&self, nevra: &Nevra) -> bool {
        self.name.as_deref().is_none_or(|n| nevra.name == *n)
            && self.epoch.as_deref().is_none_or(|e| nevra.epoch == e)
            && self.version.as_deref().is_none_or(|v| nevra.version == v)
            && self.release.as_deref().is_none_or(|r| nevra.release == r)
            && self.arch.is_none_or(|a| nevra.arch == a)
    }
}

/// The textual fields covered by [`PackageSack::search_primary_fields`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrimaryField {
    /// The package name.
    Name,
    /// The one-line summary.
    Summary,
    /// The long description.
    Description,
    /// The upstream URL.
    Url,
}

/// A queryable union of per-repository package catalogs.
///
/// The sack owns the loaded metadata and answers every lookup the
/// transaction core performs. It tracks an exclude set of
/// ([`RepoId`], NEVRA) pairs and a set of wholly hidden repositories;
/// **no query ever returns an excluded entry** or an entry from a disabled
/// or all-excluded repository.
#[derive(Debug, Default)]
pub struct PackageSack {
    repos: BTreeMap<RepoId, Repo>,
    by_name: BTreeMap<Name, Vec<Arc<Package>>>,
    by_provides: BTreeMap<String, Vec<Arc<Package>>>,
    by_file: BTreeMap<String, Vec<Arc<Package>>>,
    excluded: HashSet<PkgKey>,
    excluded_repos: BTreeSet<RepoId>,
    populated: BTreeSet<RepoId>,
}

impl PackageSack {
    /// Creates an empty sack.
    pub fn new() -> Self {
        PackageSack::default()
    }

    /// Registers a repository handle.
    pub fn add_repo(&mut self, repo: Repo) {
        self.repos.insert(repo.id.clone(), repo);
    }

    /// Returns the registered repository handles.
    pub fn repos(&self) -> impl Iterator<Item = &Repo> {
        self.repos.values()
    }

    /// Adds a package to the sack, indexing its name, provides and files.
    pub fn add_package(&mut self, package: Arc<Package>) {
        for provide in package.provides() {
            index_unique(&mut self.by_provides, provide.name.clone(), &package);
        }
        index_unique(
            &mut self.by_provides,
            package.name().to_string(),
            &package,
        );
        for entry in package.all_files() {
            index_unique(&mut self.by_file, entry.path, &package);
        }
        index_unique(&mut self.by_name, package.name().clone(), &package);
    }

    /// Hides a package from every subsequent query for the rest of the
    /// session.
    pub fn del_package(&mut self, package: &Package) {
        self.excluded.insert(PkgKey::of(package));
    }

    /// Undoes a [`PackageSack::del_package`] exclusion.
    pub fn include_package(&mut self, package: &Package) {
        self.excluded.remove(&PkgKey::of(package));
    }

    /// Hides a whole repository from every subsequent query.
    pub fn exclude_repo(&mut self, repo: &RepoId) {
        self.excluded_repos.insert(repo.clone());
    }

    /// Returns whether a package is currently visible to queries.
    pub fn is_visible(&self, package: &Package) -> bool {
        let repo = package.repo_id();
        if self.excluded_repos.contains(&repo) {
            return false;
        }
        if let Some(handle) = self.repos.get(&repo) {
            if !handle.enabled {
                return false;
            }
        }
        !self.excluded.contains(&PkgKey::of(package))
    }

    /// Returns all visible packages in deterministic (name, insertion)
    /// order.
    pub fn packages(&self) -> Vec<Arc<Package>> {
        self.by_name
            .values()
            .flatten()
            .filter(|package| self.is_visible(package))
            .cloned()
            .collect()
    }

    /// Returns the identities of all visible packages.
    pub fn simple_pkg_list(&self) -> Vec<Nevra> {
        self.packages()
            .iter()
            .map(|package| package.nevra().clone())
            .collect()
    }

    /// Returns the visible packages with exactly the given identity.
    pub fn search_pkg_tuple(&self, nevra: &Nevra) -> Vec<Arc<Package>> {
        self.visible_by_name(nevra.name.inner())
            .into_iter()
            .filter(|package| package.nevra() == nevra)
            .collect()
    }

    /// Returns whether any visible package carries the given name.
    pub fn contains_name(&self, name: &str) -> bool {
        !self.visible_by_name(name).is_empty()
    }

    /// Returns whether the exact package is visible in the sack.
    pub fn contains_package(&self, package: &Package) -> bool {
        self.search_pkg_tuple(package.nevra())
            .iter()
            .any(|candidate| candidate.as_ref() == package)
    }

    /// Returns the visible packages matching a partial NEVRA predicate.
    pub fn search_nevra(&self, query: &NevraQuery) -> Vec<Arc<Package>> {
        let candidates = match query.name.as_deref() {
            Some(name) => self.visible_by_name(name),
            None => self.packages(),
        };
        candidates
            .into_iter()
            .filter(|package| query.matches(package.nevra()))
            .collect()
    }

    /// Returns the visible packages satisfying the provides requirement
    /// `req`.
    ///
    /// Explicit provides entries, the implicit self-provide and file entries
    /// are all considered. A file requirement outside the primary whitelist
    /// forces filelist metadata population first.
    ///
    /// # Errors
    ///
    /// Returns an error if filelist metadata had to be populated and a
    /// repository failed to deliver it.
    pub fn search_provides(&mut self, req: &Relation) -> Result<Vec<Arc<Package>>, Error> {
        if req.is_file() && !is_primary_path(&req.name) {
            self.populate_filelists()?;
        }
        Ok(self.search_provides_unpopulated(req))
    }

    /// Returns the visible packages satisfying `req` without considering
    /// filelist metadata that has not been populated yet.
    pub fn search_provides_unpopulated(&self, req: &Relation) -> Vec<Arc<Package>> {
        let mut result: Vec<Arc<Package>> = Vec::new();
        let mut seen: HashSet<PkgKey> = HashSet::new();

        let mut candidates: Vec<Arc<Package>> = Vec::new();
        if let Some(packages) = self.by_provides.get(&req.name) {
            candidates.extend(packages.iter().cloned());
        }
        if req.is_file() {
            if let Some(packages) = self.by_file.get(&req.name) {
                candidates.extend(packages.iter().cloned());
            }
        }

        for package in candidates {
            if !self.is_visible(&package) || !seen.insert(PkgKey::of(&package)) {
                continue;
            }
            // a file requirement without a version constraint matches every
            // owner of the path
            let matched = if req.is_file() && req.evr.is_unspecified() {
                package.provides_file(&req.name) || package.check_provides(req)
            } else {
                package.check_provides(req)
            };
            if matched {
                result.push(package);
            }
        }
        result
    }

    /// Returns the visible packages whose requires overlap `req`.
    pub fn search_requires(&self, req: &Relation) -> Vec<Arc<Package>> {
        self.scan_prco(PrcoKind::Requires, req)
    }

    /// Returns the visible packages whose conflicts overlap `req`.
    pub fn search_conflicts(&self, req: &Relation) -> Vec<Arc<Package>> {
        self.scan_prco(PrcoKind::Conflicts, req)
    }

    /// Returns the visible packages whose obsoletes overlap `req`.
    pub fn search_obsoletes(&self, req: &Relation) -> Vec<Arc<Package>> {
        self.scan_prco(PrcoKind::Obsoletes, req)
    }

    /// Returns the obsoletes entries of every visible package carrying any,
    /// keyed by identity.
    ///
    /// With `newest` only the newest EVR per (name, arch) contributes.
    pub fn return_obsoletes(&self, newest: bool) -> BTreeMap<Nevra, Vec<Relation>> {
        let packages = if newest {
            self.newest_by_name_arch_of(self.packages())
        } else {
            self.packages()
        };
        packages
            .into_iter()
            .filter(|package| !package.obsoletes().is_empty())
            .map(|package| (package.nevra().clone(), package.obsoletes().to_vec()))
            .collect()
    }

    /// Returns the visible packages owning `path`, which may be a glob.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid glob pattern or if filelist
    /// population fails.
    pub fn search_files(&mut self, path: &str) -> Result<Vec<Arc<Package>>, Error> {
        if matcher::is_glob(path) {
            self.populate_filelists()?;
            let pattern = matcher::compile_pattern(path)?;
            let mut result = Vec::new();
            let mut seen = HashSet::new();
            for (file, packages) in &self.by_file {
                if !pattern.matches(file) {
                    continue;
                }
                for package in packages {
                    if self.is_visible(package) && seen.insert(PkgKey::of(package)) {
                        result.push(Arc::clone(package));
                    }
                }
            }
            return Ok(result);
        }

        if !is_primary_path(path) {
            self.populate_filelists()?;
        }
        let mut result = Vec::new();
        if let Some(packages) = self.by_file.get(path) {
            for package in packages {
                if self.is_visible(package) {
                    result.push(Arc::clone(package));
                }
            }
        }
        Ok(result)
    }

    /// Returns the visible packages with any of `terms` as a
    /// case-insensitive substring in any of `fields`.
    pub fn search_primary_fields(
        &self,
        fields: &[PrimaryField],
        terms: &[&str],
    ) -> Vec<Arc<Package>> {
        let terms: Vec<String> = terms.iter().map(|term| term.to_lowercase()).collect();
        self.packages()
            .into_iter()
            .filter(|package| {
                fields.iter().any(|field| {
                    let value = match field {
                        PrimaryField::Name => package.name().inner().to_string(),
                        PrimaryField::Summary => package.summary().to_string(),
                        PrimaryField::Description => package.description().to_string(),
                        PrimaryField::Url => package.url().unwrap_or("").to_string(),
                    }
                    .to_lowercase();
                    terms.iter().any(|term| value.contains(term))
                })
            })
            .collect()
    }

    /// Returns the newest packages per name, every architecture achieving
    /// the newest EVR included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMatches`] when a pattern matches nothing.
    pub fn return_newest_by_name(
        &self,
        patterns: Option<&[&str]>,
    ) -> Result<Vec<Arc<Package>>, Error> {
        let packages = self.patterned_packages(patterns)?;
        Ok(newest_by_name(&packages))
    }

    /// Returns the newest package per (name, architecture).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMatches`] when a pattern matches nothing.
    pub fn return_newest_by_name_arch(
        &self,
        patterns: Option<&[&str]>,
    ) -> Result<Vec<Arc<Package>>, Error> {
        let packages = self.patterned_packages(patterns)?;
        Ok(self.newest_by_name_arch_of(packages))
    }

    /// Splits user patterns into exact hits, glob hits and unmatched
    /// leftovers against the visible packages.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid glob pattern.
    pub fn match_package_names(
        &self,
        patterns: &[&str],
    ) -> Result<(Vec<Arc<Package>>, Vec<Arc<Package>>, Vec<String>), Error> {
        matcher::match_package_names(&self.packages(), patterns)
    }

    /// Hides every package whose architecture is outside `compat`.
    ///
    /// A repository left without any compatible package is excluded wholly,
    /// so later pattern lookups do not report bogus empty matches against
    /// it.
    pub fn exclude_archs(&mut self, compat: &[Architecture]) {
        let mut kept_per_repo: HashMap<RepoId, usize> = HashMap::new();
        let mut seen_repos: BTreeSet<RepoId> = BTreeSet::new();
        let mut to_exclude = Vec::new();
        for package in self.packages() {
            let repo = package.repo_id();
            seen_repos.insert(repo.clone());
            if compat.contains(&package.arch()) {
                *kept_per_repo.entry(repo).or_insert(0) += 1;
            } else {
                debug!("excluding {package} for incompatible architecture");
                to_exclude.push(package);
            }
        }
        for package in to_exclude {
            self.del_package(&package);
        }
        for repo in seen_repos {
            if kept_per_repo.get(&repo).copied().unwrap_or(0) == 0 {
                debug!("repository {repo} has no compatible packages, excluding it wholly");
                self.excluded_repos.insert(repo);
            }
        }
    }

    /// Hides duplicates of the same identity carried by repositories of
    /// higher cost, keeping only minimum-cost copies.
    ///
    /// Does nothing when every registered repository carries the same cost.
    pub fn cost_exclude(&mut self) {
        let costs: BTreeSet<u32> = self
            .repos
            .values()
            .filter(|repo| repo.enabled)
            .map(|repo| repo.cost)
            .collect();
        if costs.len() <= 1 {
            return;
        }

        let mut by_tuple: HashMap<Nevra, Vec<Arc<Package>>> = HashMap::new();
        for package in self.packages() {
            by_tuple
                .entry(package.nevra().clone())
                .or_default()
                .push(package);
        }
        for (_, group) in by_tuple {
            if group.len() < 2 {
                continue;
            }
            let lowest = group
                .iter()
                .filter_map(|package| self.repo_cost(&package.repo_id()))
                .min()
                .unwrap_or(1000);
            for package in group {
                if self.repo_cost(&package.repo_id()).unwrap_or(1000) > lowest {
                    debug!(
                        "excluding for cost: {package} from {}",
                        package.repo_id()
                    );
                    self.del_package(&package);
                }
            }
        }
    }

    /// Hides the visible packages matching the given exclude patterns,
    /// optionally restricted to one repository.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid glob pattern.
    pub fn apply_excludes(
        &mut self,
        patterns: &[&str],
        repo: Option<&RepoId>,
    ) -> Result<(), Error> {
        if patterns.is_empty() {
            return Ok(());
        }
        let packages: Vec<Arc<Package>> = match repo {
            Some(repo) => self
                .packages()
                .into_iter()
                .filter(|package| package.repo_id() == *repo)
                .collect(),
            None => self.packages(),
        };
        let (exact, matched, _) = matcher::match_package_names(&packages, patterns)?;
        for package in exact.into_iter().chain(matched) {
            debug!("excluding {package}");
            self.del_package(&package);
        }
        Ok(())
    }

    /// Reduces a repository to the packages matching `patterns`, hiding the
    /// rest.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid glob pattern.
    pub fn include_only(&mut self, repo: &RepoId, patterns: &[&str]) -> Result<(), Error> {
        if patterns.is_empty() {
            return Ok(());
        }
        let packages: Vec<Arc<Package>> = self
            .packages()
            .into_iter()
            .filter(|package| package.repo_id() == *repo)
            .collect();
        let (exact, matched, _) = matcher::match_package_names(&packages, patterns)?;
        let keep: HashSet<PkgKey> = exact
            .iter()
            .chain(matched.iter())
            .map(|package| PkgKey::of(package))
            .collect();
        for package in packages {
            if !keep.contains(&PkgKey::of(&package)) {
                self.del_package(&package);
            }
        }
        Ok(())
    }

    /// Forces filelist metadata population for every enabled repository
    /// that has not delivered it yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filelists`] when a repository source fails.
    pub fn populate_filelists(&mut self) -> Result<(), Error> {
        let pending: Vec<RepoId> = self
            .repos
            .values()
            .filter(|repo| repo.enabled && !self.populated.contains(&repo.id))
            .map(|repo| repo.id.clone())
            .collect();

        for repo_id in pending {
            let lists = {
                let Some(repo) = self.repos.get(&repo_id) else {
                    continue;
                };
                let Some(source) = repo.filelist_source() else {
                    self.populated.insert(repo_id);
                    continue;
                };
                debug!("importing filelist information for repository {repo_id}");
                source.filelists().map_err(|error| Error::Filelists {
                    repo: repo_id.to_string(),
                    reason: error.to_string(),
                })?
            };
            for (nevra, files) in lists {
                let Some(package) = self
                    .by_name
                    .get(&nevra.name)
                    .and_then(|group| {
                        group
                            .iter()
                            .find(|package| {
                                *package.nevra() == nevra
                                    && package.repo_id() == repo_id
                            })
                            .cloned()
                    })
                else {
                    continue;
                };
                for entry in &files {
                    index_unique(&mut self.by_file, entry.path.clone(), &package);
                }
                package.add_late_files(files);
            }
            self.populated.insert(repo_id);
        }
        Ok(())
    }

    fn repo_cost(&self, repo: &RepoId) -> Option<u32> {
        self.repos.get(repo).map(|repo| repo.cost)
    }

    fn visible_by_name(&self, name: &str) -> Vec<Arc<Package>> {
        let Ok(name) = name.parse::<Name>() else {
            return Vec::new();
        };
        self.by_name
            .get(&name)
            .into_iter()
            .flatten()
            .filter(|package| self.is_visible(package))
            .cloned()
            .collect()
    }

    fn scan_prco(&self, kind: PrcoKind, req: &Relation) -> Vec<Arc<Package>> {
        self.packages()
            .into_iter()
            .filter(|package| package.in_prco_range(kind, req))
            .collect()
    }

    fn patterned_packages(&self, patterns: Option<&[&str]>) -> Result<Vec<Arc<Package>>, Error> {
        match patterns {
            None => Ok(self.packages()),
            Some(patterns) => {
                let (exact, matched, unmatched) = self.match_package_names(patterns)?;
                if let Some(missing) = unmatched.first() {
                    return Err(Error::NoMatches(missing.clone()));
                }
                let mut result = exact;
                for package in matched {
                    if !result.iter().any(|known| Arc::ptr_eq(known, &package)) {
                        result.push(package);
                    }
                }
                Ok(result)
            }
        }
    }

    fn newest_by_name_arch_of(&self, packages: Vec<Arc<Package>>) -> Vec<Arc<Package>> {
        newest_by_name_arch(&packages)
    }
}

/// Returns the newest packages per name out of a list, every architecture
/// achieving the newest EVR included.
pub fn newest_by_name(packages: &[Arc<Package>]) -> Vec<Arc<Package>> {
    let mut by_name: BTreeMap<Name, Vec<Arc<Package>>> = BTreeMap::new();
    for package in packages {
        by_name
            .entry(package.name().clone())
            .or_default()
            .push(Arc::clone(package));
    }
    let mut result = Vec::new();
    for (_, group) in by_name {
        let newest = group
            .iter()
            .map(|package| package.evr())
            .max_by(|a, b| evr_cmp(a, b));
        if let Some(newest) = newest {
            result.extend(
                group
                    .into_iter()
                    .filter(|package| evr_cmp(&package.evr(), &newest).is_eq()),
            );
        }
    }
    result
}

/// Returns the newest package per (name, architecture) out of a list.
pub fn newest_by_name_arch(packages: &[Arc<Package>]) -> Vec<Arc<Package>> {
    let mut newest: BTreeMap<(Name, Architecture), Arc<Package>> = BTreeMap::new();
    for package in packages {
        let key = (package.name().clone(), package.arch());
        match newest.get(&key) {
            Some(known) if evr_cmp(&known.evr(), &package.evr()).is_ge() => {}
            _ => {
                newest.insert(key, Arc::clone(package));
            }
        }
    }
    newest.into_values().collect()
}

/// Returns whether a path is covered by the primary metadata whitelist and
/// therefore known without filelist population.
pub fn is_primary_path(path: &str) -> bool {
    regex_once!(r"^/etc/").is_match(path)
        || regex_once!(r".*bin/.*").is_match(path)
        || regex_once!(r"^/usr/lib/sendmail$").is_match(path)
}

fn index_unique<K: Ord>(
    index: &mut BTreeMap<K, Vec<Arc<Package>>>,
    key: K,
    package: &Arc<Package>,
) {
    let entry = index.entry(key).or_default();
    if !entry.iter().any(|known| Arc::ptr_eq(known, package)) {
        entry.push(Arc::clone(package));
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;
    use crate::{FileEntry, FileKind, FilelistSource};

    fn sack() -> PackageSack {
        let fedora = RepoId::new("fedora");
        let updates = RepoId::new("updates");
        let mut sack = PackageSack::new();
        sack.add_repo(Repo::new(fedora.clone()));
        sack.add_repo(Repo::new(updates.clone()));
        for (nevra, repo) in [
            ("zsh-5.9-3.x86_64", &fedora),
            ("zsh-5.9-3.i686", &fedora),
            ("zsh-5.9-4.x86_64", &updates),
            ("bash-5.2-1.x86_64", &fedora),
        ] {
            sack.add_package(
                Package::available(Nevra::from_str(nevra).unwrap(), repo.clone())
                    .provides(Relation::from_str("sh").unwrap())
                    .file("/usr/bin/sh")
                    .build(),
            );
        }
        sack
    }

    #[test]
    fn excluded_packages_never_surface() -> TestResult {
        let mut sack = sack();
        let target = sack.search_pkg_tuple(&Nevra::from_str("bash-5.2-1.x86_64")?)[0].clone();
        sack.del_package(&target);

        assert!(!sack.contains_name("bash"));
        assert!(sack.search_nevra(&NevraQuery::name("bash")).is_empty());
        let bash_name = Name::from_str("bash")?;
        assert!(
            sack.search_provides(&Relation::from_str("/usr/bin/sh")?)?
                .iter()
                .all(|package| package.name() != &bash_name)
        );
        assert_eq!(sack.packages().len(), 3);

        sack.include_package(&target);
        assert!(sack.contains_name("bash"));
        Ok(())
    }

    #[test]
    fn provides_reflexivity() -> TestResult {
        let mut sack = sack();
        let nevra = Nevra::from_str("zsh-5.9-4.x86_64")?;
        let req = Relation::from_str("zsh = 5.9-4")?;
        let hits = sack.search_provides(&req)?;
        assert!(hits.iter().any(|package| *package.nevra() == nevra));
        Ok(())
    }

    #[rstest]
    #[case("sh", 4)]
    #[case("/usr/bin/sh", 4)]
    #[case("zsh", 3)]
    #[case("nosuch", 0)]
    fn provides_search(#[case] req: &str, #[case] expected: usize) -> TestResult {
        let mut sack = sack();
        assert_eq!(
            sack.search_provides(&Relation::from_str(req)?)?.len(),
            expected
        );
        Ok(())
    }

    #[test]
    fn newest_by_name_collapses_versions() -> TestResult {
        let sack = sack();
        let newest = sack.return_newest_by_name(Some(&["zsh"]))?;
        assert_eq!(newest.len(), 1);
        assert_eq!(*newest[0].nevra(), Nevra::from_str("zsh-5.9-4.x86_64")?);

        let by_arch = sack.return_newest_by_name_arch(Some(&["zsh"]))?;
        let mut nevras: Vec<String> = by_arch
            .iter()
            .map(|package| package.nevra().to_string())
            .collect();
        nevras.sort();
        assert_eq!(nevras, ["zsh-5.9-3.i686", "zsh-5.9-4.x86_64"]);

        assert_eq!(
            sack.return_newest_by_name(Some(&["nosuch"])),
            Err(Error::NoMatches("nosuch".to_string()))
        );
        Ok(())
    }

    #[test]
    fn arch_exclusion_hides_foreign_arches_and_empty_repos() -> TestResult {
        let mut sack = sack();
        let ppc = RepoId::new("ppc-extras");
        sack.add_repo(Repo::new(ppc.clone()));
        sack.add_package(
            Package::available(Nevra::from_str("yaboot-1.3-1.ppc")?, ppc.clone()).build(),
        );

        sack.exclude_archs(&[
            Architecture::X86_64,
            Architecture::I686,
            Architecture::Noarch,
        ]);

        assert!(!sack.contains_name("yaboot"));
        assert!(sack.excluded_repos.contains(&ppc));
        assert_eq!(sack.packages().len(), 4);
        Ok(())
    }

    #[test]
    fn cost_exclusion_keeps_cheapest_duplicate() -> TestResult {
        let cheap = RepoId::new("cheap");
        let pricey = RepoId::new("pricey");
        let mut sack = PackageSack::new();
        sack.add_repo(Repo::new(cheap.clone()).with_cost(500));
        sack.add_repo(Repo::new(pricey.clone()));
        let nevra = Nevra::from_str("zsh-5.9-3.x86_64")?;
        sack.add_package(Package::available(nevra.clone(), cheap.clone()).build());
        sack.add_package(Package::available(nevra.clone(), pricey.clone()).build());

        sack.cost_exclude();

        let remaining = sack.search_pkg_tuple(&nevra);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].repo_id(), cheap);
        Ok(())
    }

    #[derive(Debug)]
    struct StaticFilelists(Vec<(Nevra, Vec<FileEntry>)>);

    impl FilelistSource for StaticFilelists {
        fn filelists(&self) -> Result<Vec<(Nevra, Vec<FileEntry>)>, Error> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn non_primary_file_search_populates_filelists() -> TestResult {
        let repo = RepoId::new("fedora");
        let nevra = Nevra::from_str("zsh-5.9-3.x86_64")?;
        let mut sack = PackageSack::new();
        sack.add_repo(Repo::new(repo.clone()).with_filelists(Box::new(StaticFilelists(vec![(
            nevra.clone(),
            vec![FileEntry::new("/usr/share/zsh/functions", FileKind::File)],
        )]))));
        sack.add_package(
            Package::available(nevra.clone(), repo.clone())
                .file("/usr/bin/zsh")
                .build(),
        );

        // primary paths answer without population
        assert_eq!(
            sack.search_provides_unpopulated(&Relation::from_str("/usr/share/zsh/functions")?)
                .len(),
            0
        );
        // a non-primary lookup forces population
        let hits = sack.search_provides(&Relation::from_str("/usr/share/zsh/functions")?)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(*hits[0].nevra(), nevra);
        Ok(())
    }

    #[rstest]
    #[case("/etc/passwd", true)]
    #[case("/usr/bin/zsh", true)]
    #[case("/bin/sh", true)]
    #[case("/usr/sbin/useradd", true)]
    #[case("/usr/lib/sendmail", true)]
    #[case("/usr/share/doc/README", false)]
    #[case("/var/lib/rpm", false)]
    fn primary_path_whitelist(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_primary_path(path), expected);
    }

    #[test]
    fn primary_field_search() -> TestResult {
        let repo = RepoId::new("fedora");
        let mut sack = PackageSack::new();
        sack.add_repo(Repo::new(repo.clone()));
        sack.add_package(
            Package::available(Nevra::from_str("zsh-5.9-3.x86_64")?, repo.clone())
                .summary("The Z shell")
                .description("A command interpreter usable as a login shell")
                .build(),
        );

        let fields = [PrimaryField::Name, PrimaryField::Summary];
        assert_eq!(sack.search_primary_fields(&fields, &["z shell"]).len(), 1);
        assert_eq!(sack.search_primary_fields(&fields, &["login"]).len(), 0);
        assert_eq!(
            sack.search_primary_fields(&[PrimaryField::Description], &["LOGIN"])
                .len(),
            1
        );
        Ok(())
    }
}
