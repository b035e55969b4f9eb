use std::fmt::Display;
use std::fmt::Formatter;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use rpmtx_types::{
    Architecture, Checksum, Evr, Name, Nevra, Relation, VersionComparison, range_compare,
};
use strum::Display as StrumDisplay;

use crate::RepoId;

/// The kind of a file entry carried by a package.
#[derive(Clone, Copy, Debug, Eq, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum FileKind {
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// A ghost file, owned but not shipped by the package.
    Ghost,
}

/// One file entry of a package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    /// The absolute path of the entry.
    pub path: String,
    /// The kind of the entry.
    pub kind: FileKind,
}

impl FileEntry {
    /// Creates a new [`FileEntry`].
    pub fn new(path: &str, kind: FileKind) -> Self {
        FileEntry {
            path: path.to_string(),
            kind,
        }
    }
}

/// The four dependency relation lists of a package.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum PrcoKind {
    /// Capabilities the package provides.
    Provides,
    /// Capabilities the package requires.
    Requires,
    /// Capabilities the package conflicts with.
    Conflicts,
    /// Packages this package supersedes.
    Obsoletes,
}

/// Size information of a package.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PackageSizes {
    /// Size of the package file on disk.
    pub package: u64,
    /// Size of the installed payload.
    pub installed: u64,
    /// Size of the compressed archive.
    pub archive: u64,
}

/// Where a package's metadata came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PackageSource {
    /// A package available from a repository.
    Available(RepoId),
    /// A package recorded in the installed database.
    Installed,
    /// A package read from a local file on disk.
    Local(PathBuf),
}

impl PackageSource {
    /// Returns the repository identity queries report for this source.
    pub fn repo_id(&self) -> RepoId {
        match self {
            PackageSource::Available(repo) => repo.clone(),
            PackageSource::Installed => RepoId::installed(),
            PackageSource::Local(_) => RepoId::commandline(),
        }
    }

    /// Returns whether this source is the installed database.
    pub fn is_installed(&self) -> bool {
        matches!(self, PackageSource::Installed)
    }
}

/// A package and its metadata.
///
/// Packages are immutable after construction through the [`PackageBuilder`];
/// the only mutable pieces are lazily computed caches, which
/// [`Package::drop_cached_data`] clears without changing identity, and
/// supplementary file entries merged in when filelist metadata is populated.
///
/// Equality and hashing cover the NEVRA and the origin repository, so the
/// same package carried by two repositories compares unequal.
#[derive(Debug)]
pub struct Package {
    nevra: Nevra,
    source: PackageSource,
    summary: String,
    description: String,
    url: Option<String>,
    sourcerpm: Option<String>,
    provides: Vec<Relation>,
    requires: Vec<Relation>,
    conflicts: Vec<Relation>,
    obsoletes: Vec<Relation>,
    files: Vec<FileEntry>,
    sizes: PackageSizes,
    checksum: Option<Checksum>,
    extra_files: Mutex<Vec<FileEntry>>,
    full_provides: Mutex<Option<Arc<Vec<Relation>>>>,
}

impl Package {
    /// Starts building a package available from `repo`.
    pub fn available(nevra: Nevra, repo: RepoId) -> PackageBuilder {
        PackageBuilder::new(nevra, PackageSource::Available(repo))
    }

    /// Starts building a package recorded in the installed database.
    pub fn installed(nevra: Nevra) -> PackageBuilder {
        PackageBuilder::new(nevra, PackageSource::Installed)
    }

    /// Starts building a package read from a local file.
    pub fn local(nevra: Nevra, path: PathBuf) -> PackageBuilder {
        PackageBuilder::new(nevra, PackageSource::Local(path))
    }

    /// Returns the package identity.
    pub fn nevra(&self) -> &Nevra {
        &self.nevra
    }

    /// Returns the package name.
    pub fn name(&self) -> &Name {
        &self.nevra.name
    }

    /// Returns the package architecture.
    pub fn arch(&self) -> Architecture {
        self.nevra.arch
    }

    /// Returns the package epoch.
    pub fn epoch(&self) -> &str {
        &self.nevra.epoch
    }

    /// Returns the package version.
    pub fn version(&self) -> &str {
        &self.nevra.version
    }

    /// Returns the package release.
    pub fn release(&self) -> &str {
        &self.nevra.release
    }

    /// Returns the package [`Evr`].
    pub fn evr(&self) -> Evr {
        self.nevra.evr()
    }

    /// Returns where the package metadata came from.
    pub fn source(&self) -> &PackageSource {
        &self.source
    }

    /// Returns the repository identity of the package.
    pub fn repo_id(&self) -> RepoId {
        self.source.repo_id()
    }

    /// Returns whether the package is recorded in the installed database.
    pub fn is_installed(&self) -> bool {
        self.source.is_installed()
    }

    /// Returns whether this is a source package, which is never installable.
    pub fn is_source(&self) -> bool {
        self.nevra.arch == Architecture::Src
    }

    /// Returns the package summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Returns the package description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the package URL, if any.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns the source RPM file name the package was built from, if known.
    pub fn sourcerpm(&self) -> Option<&str> {
        self.sourcerpm.as_deref()
    }

    /// Returns the package sizes.
    pub fn sizes(&self) -> PackageSizes {
        self.sizes
    }

    /// Returns the package checksum, if any.
    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    /// Returns one of the four dependency relation lists.
    pub fn prco(&self, kind: PrcoKind) -> &[Relation] {
        match kind {
            PrcoKind::Provides => &self.provides,
            PrcoKind::Requires => &self.requires,
            PrcoKind::Conflicts => &self.conflicts,
            PrcoKind::Obsoletes => &self.obsoletes,
        }
    }

    /// Returns the provides entries.
    pub fn provides(&self) -> &[Relation] {
        &self.provides
    }

    /// Returns the requires entries.
    pub fn requires(&self) -> &[Relation] {
        &self.requires
    }

    /// Returns the conflicts entries.
    pub fn conflicts(&self) -> &[Relation] {
        &self.conflicts
    }

    /// Returns the obsoletes entries.
    pub fn obsoletes(&self) -> &[Relation] {
        &self.obsoletes
    }

    /// Returns the names of all provides entries plus the package name.
    pub fn provides_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.provides.iter().map(|p| p.name.clone()).collect();
        names.push(self.name().to_string());
        names
    }

    /// Returns the file entries of the given kind, filelist metadata
    /// included once populated.
    pub fn file_entries(&self, kind: FileKind) -> Vec<String> {
        let extra = self.extra_files.lock().expect("extra file lock poisoned");
        self.files
            .iter()
            .chain(extra.iter())
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Returns all file entries regardless of kind.
    pub fn all_files(&self) -> Vec<FileEntry> {
        let extra = self.extra_files.lock().expect("extra file lock poisoned");
        self.files.iter().chain(extra.iter()).cloned().collect()
    }

    /// Returns whether the package ships the given path.
    pub fn provides_file(&self, path: &str) -> bool {
        let extra = self.extra_files.lock().expect("extra file lock poisoned");
        self.files
            .iter()
            .chain(extra.iter())
            .any(|entry| entry.path == path)
    }

    /// Merges supplementary file entries obtained from filelist metadata.
    ///
    /// Entries already known are skipped. Invalidates the provides cache.
    pub fn add_late_files(&self, entries: Vec<FileEntry>) {
        {
            let mut extra = self.extra_files.lock().expect("extra file lock poisoned");
            for entry in entries {
                if !self.files.contains(&entry) && !extra.contains(&entry) {
                    extra.push(entry);
                }
            }
        }
        self.drop_cached_data();
    }

    /// Returns the relation entries of `kind` whose version range overlaps
    /// the requirement `req`.
    ///
    /// For provides, an entry that is not an exact-version one has the
    /// package's own EVR substituted into its missing fields before
    /// comparison.
    pub fn matching_prcos(&self, kind: PrcoKind, req: &Relation) -> Vec<Relation> {
        let own_evr = self.evr();
        let mut matches = Vec::new();
        for entry in self.prco(kind) {
            if entry.name != req.name {
                continue;
            }
            let mut entry = entry.clone();
            if kind == PrcoKind::Provides && entry.flag != Some(VersionComparison::Equal) {
                let evr = Evr::new(
                    entry.evr.raw_epoch().or(Some(own_evr.epoch())),
                    entry.evr.version().or(own_evr.version()),
                    entry.evr.release().or(own_evr.release()),
                );
                entry.evr = evr;
            }
            if range_compare(req, &entry) {
                matches.push(entry);
            }
        }
        matches
    }

    /// Returns whether any relation entry of `kind` satisfies the
    /// requirement range `req`.
    pub fn in_prco_range(&self, kind: PrcoKind, req: &Relation) -> bool {
        !self.matching_prcos(kind, req).is_empty()
    }

    /// Returns whether the package carries `req` in `kind`, by exact entry
    /// or by range.
    pub fn check_prco(&self, kind: PrcoKind, req: &Relation) -> bool {
        if self.prco(kind).contains(req) {
            return true;
        }
        if req.flag.is_some() {
            self.in_prco_range(kind, req)
        } else {
            self.prco(kind).iter().any(|entry| entry.name == req.name)
        }
    }

    /// Returns whether the package satisfies the provides requirement `req`,
    /// considering explicit provides, the implicit self-provide
    /// `(name, =, EVR)` and, for file requirements, the file entries.
    pub fn check_provides(&self, req: &Relation) -> bool {
        if req.is_file() && self.provides_file(&req.name) {
            return true;
        }
        if self.check_prco(PrcoKind::Provides, req) {
            return true;
        }
        req.name == self.name().inner()
            && range_compare(req, &Relation::new_versioned(self.name().inner(), self.evr()))
    }

    /// Returns the full provides set of the package: explicit entries, the
    /// self-provide and all file entries as unversioned provides.
    ///
    /// The result is computed once and cached.
    pub fn full_provides(&self) -> Arc<Vec<Relation>> {
        let mut cache = self.full_provides.lock().expect("provides cache poisoned");
        if let Some(cached) = cache.as_ref() {
            return Arc::clone(cached);
        }
        let mut full = self.provides.clone();
        full.push(Relation::new_versioned(self.name().inner(), self.evr()));
        {
            let extra = self.extra_files.lock().expect("extra file lock poisoned");
            full.extend(
                self.files
                    .iter()
                    .chain(extra.iter())
                    .map(|entry| Relation::unversioned(&entry.path)),
            );
        }
        let full = Arc::new(full);
        *cache = Some(Arc::clone(&full));
        full
    }

    /// Clears lazily computed caches without changing the package identity.
    pub fn drop_cached_data(&self) {
        *self.full_provides.lock().expect("provides cache poisoned") = None;
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.nevra == other.nevra && self.source == other.source
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nevra.hash(state);
        self.repo_id().hash(state);
    }
}

impl Display for Package {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.nevra)
    }
}

/// Builds a [`Package`].
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use rpmtx_sack::{Package, RepoId};
/// use rpmtx_types::{Nevra, Relation};
///
/// # fn main() -> Result<(), rpmtx_sack::Error> {
/// let package = Package::available(Nevra::from_str("zsh-5.9-3.x86_64")?, RepoId::new("fedora"))
///     .summary("The Z shell")
///     .provides(Relation::from_str("sh")?)
///     .file("/usr/bin/zsh")
///     .build();
/// assert_eq!(package.name(), &rpmtx_types::Name::from_str("zsh")?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PackageBuilder {
    package: Package,
}

impl PackageBuilder {
    fn new(nevra: Nevra, source: PackageSource) -> Self {
        PackageBuilder {
            package: Package {
                nevra,
                source,
                summary: String::new(),
                description: String::new(),
                url: None,
                sourcerpm: None,
                provides: Vec::new(),
                requires: Vec::new(),
                conflicts: Vec::new(),
                obsoletes: Vec::new(),
                files: Vec::new(),
                sizes: PackageSizes::default(),
                checksum: None,
                extra_files: Mutex::new(Vec::new()),
                full_provides: Mutex::new(None),
            },
        }
    }

    /// Sets the package summary.
    pub fn summary(mut self, summary: &str) -> Self {
        self.package.summary = summary.to_string();
        self
    }

    /// Sets the package description.
    pub fn description(mut self, description: &str) -> Self {
        self.package.description = description.to_string();
        self
    }

    /// Sets the package URL.
    pub fn url(mut self, url: &str) -> Self {
        self.package.url = Some(url.to_string());
        self
    }

    /// Sets the source RPM file name.
    pub fn sourcerpm(mut self, sourcerpm: &str) -> Self {
        self.package.sourcerpm = Some(sourcerpm.to_string());
        self
    }

    /// Adds a provides entry.
    pub fn provides(mut self, relation: Relation) -> Self {
        self.package.provides.push(relation);
        self
    }

    /// Adds a requires entry.
    pub fn requires(mut self, relation: Relation) -> Self {
        self.package.requires.push(relation);
        self
    }

    /// Adds a conflicts entry.
    pub fn conflicts(mut self, relation: Relation) -> Self {
        self.package.conflicts.push(relation);
        self
    }

    /// Adds an obsoletes entry.
    pub fn obsoletes(mut self, relation: Relation) -> Self {
        self.package.obsoletes.push(relation);
        self
    }

    /// Adds a regular file entry.
    pub fn file(mut self, path: &str) -> Self {
        self.package.files.push(FileEntry::new(path, FileKind::File));
        self
    }

    /// Adds a directory entry.
    pub fn dir(mut self, path: &str) -> Self {
        self.package.files.push(FileEntry::new(path, FileKind::Dir));
        self
    }

    /// Adds a ghost file entry.
    pub fn ghost(mut self, path: &str) -> Self {
        self.package
            .files
            .push(FileEntry::new(path, FileKind::Ghost));
        self
    }

    /// Sets the package sizes.
    pub fn sizes(mut self, sizes: PackageSizes) -> Self {
        self.package.sizes = sizes;
        self
    }

    /// Sets the package checksum.
    pub fn checksum(mut self, checksum: Checksum) -> Self {
        self.package.checksum = Some(checksum);
        self
    }

    /// Finishes building, returning the package behind an [`Arc`] so it can
    /// be shared between the sack and the transaction set.
    pub fn build(self) -> Arc<Package> {
        Arc::new(self.package)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    fn zsh() -> Arc<Package> {
        Package::available(
            Nevra::from_str("zsh-2:5.9-3.x86_64").unwrap(),
            RepoId::new("fedora"),
        )
        .provides(Relation::from_str("sh").unwrap())
        .provides(Relation::from_str("zsh-binary >= 5").unwrap())
        .file("/usr/bin/zsh")
        .dir("/usr/share/zsh")
        .ghost("/var/log/zsh.log")
        .build()
    }

    #[rstest]
    #[case("zsh", true)]
    #[case("zsh = 2:5.9-3", true)]
    #[case("zsh = 2:5.9", true)]
    #[case("zsh >= 2:5.0", true)]
    #[case("zsh > 2:5.9-3", false)]
    #[case("sh", true)]
    #[case("/usr/bin/zsh", true)]
    #[case("/usr/bin/bash", false)]
    #[case("bash", false)]
    fn provides_checking(#[case] req: &str, #[case] expected: bool) -> TestResult {
        let req = Relation::from_str(req)?;
        assert_eq!(zsh().check_provides(&req), expected);
        Ok(())
    }

    #[test]
    fn unversioned_provide_inherits_package_evr() -> TestResult {
        // `zsh-binary >= 5` has no EVR of its own, so the package's EVR
        // fills the missing fields before the range check
        let req = Relation::from_str("zsh-binary >= 2:5.9")?;
        let matched = zsh().matching_prcos(PrcoKind::Provides, &req);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].evr.raw_epoch(), Some("2"));
        Ok(())
    }

    #[test]
    fn file_kinds_are_separated() {
        let package = zsh();
        assert_eq!(package.file_entries(FileKind::File), ["/usr/bin/zsh"]);
        assert_eq!(package.file_entries(FileKind::Dir), ["/usr/share/zsh"]);
        assert_eq!(package.file_entries(FileKind::Ghost), ["/var/log/zsh.log"]);
    }

    #[test]
    fn late_files_extend_provides() -> TestResult {
        let package = zsh();
        assert!(!package.provides_file("/usr/share/zsh/site-functions"));
        package.add_late_files(vec![FileEntry::new(
            "/usr/share/zsh/site-functions",
            FileKind::File,
        )]);
        assert!(package.provides_file("/usr/share/zsh/site-functions"));
        assert!(package.check_provides(&Relation::from_str("/usr/share/zsh/site-functions")?));
        Ok(())
    }

    #[test]
    fn full_provides_is_cached_and_droppable() {
        let package = zsh();
        let first = package.full_provides();
        let second = package.full_provides();
        assert!(Arc::ptr_eq(&first, &second));
        package.drop_cached_data();
        let third = package.full_provides();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
    }

    #[test]
    fn equality_includes_origin() -> TestResult {
        let nevra = Nevra::from_str("zsh-5.9-3.x86_64")?;
        let a = Package::available(nevra.clone(), RepoId::new("fedora")).build();
        let b = Package::available(nevra.clone(), RepoId::new("updates")).build();
        let c = Package::installed(nevra).build();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, Package::available(a.nevra().clone(), RepoId::new("fedora")).build());
        Ok(())
    }
}
