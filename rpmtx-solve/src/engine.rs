use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rpmtx_sack::{
    NevraQuery, Package, PackageSack, RpmDb, newest_by_name, newest_by_name_arch,
};
use rpmtx_types::{
    Architecture, Nevra, Relation, best_arch_from, compat_arch_list, evr_cmp, multilib_peers,
    range_compare,
};

use crate::depsolve::{DepCheck, RES_ERROR};
use crate::transaction::{
    ProbFilter, TS_INSTALL_STATES, TS_REMOVE_STATES, TransactionData, TxMemberId, TsState,
};
use crate::{ComposedGroups, Config, Error, MultilibPolicy, Updates};

/// A cooperative cancellation flag shared with the caller.
///
/// The resolver checks the token once per member visit and once per
/// provider comparison; every transaction mutation is atomic with respect
/// to its back references, so a cancelled run leaves a coherent set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The transaction engine: package catalogs, the in-progress transaction
/// set and the dependency resolver around them.
///
/// All operations mutate the transaction plan only; executing the plan is
/// the job of an external transaction runner, which receives the finished
/// [`TransactionData`].
#[derive(Debug)]
pub struct Engine {
    pub(crate) sack: PackageSack,
    pub(crate) rpmdb: RpmDb,
    pub(crate) conf: Config,
    pub(crate) tx: TransactionData,
    pub(crate) canonical_arch: Architecture,
    up: Option<Updates>,
    groups: ComposedGroups,
    local_packages: Vec<Arc<Package>>,
    running_kernel: Option<(String, String)>,
    pub(crate) cancel: CancelToken,
    pub(crate) dep_check: DepCheck,
    pub(crate) po_with_problems: HashSet<(Arc<Package>, Option<Arc<Package>>, String)>,
    pub(crate) working_po: Option<Arc<Package>>,
    pub(crate) cheater_lookup: HashMap<String, Arc<Package>>,
    pub(crate) installed_file_requires:
        Option<(Vec<(Arc<Package>, Vec<String>)>, BTreeSet<String>)>,
}

impl Engine {
    /// Creates an engine over the given catalogs.
    ///
    /// Applies the architecture filter, cost-based duplicate pruning and
    /// the configured exclude patterns to the sack before anything else
    /// runs.
    ///
    /// # Errors
    ///
    /// Returns an error when an exclude pattern does not compile.
    pub fn new(
        mut sack: PackageSack,
        rpmdb: RpmDb,
        conf: Config,
        canonical_arch: Architecture,
    ) -> Result<Self, Error> {
        sack.exclude_archs(&compat_arch_list(canonical_arch));
        sack.cost_exclude();
        if !conf.disable_excludes.contains("all") && !conf.disable_excludes.contains("main") {
            let patterns: Vec<&str> = conf.exclude.iter().map(String::as_str).collect();
            sack.apply_excludes(&patterns, None)?;
        }

        Ok(Engine {
            sack,
            rpmdb,
            conf,
            tx: TransactionData::new(),
            canonical_arch,
            up: None,
            groups: ComposedGroups::new(),
            local_packages: Vec::new(),
            running_kernel: None,
            cancel: CancelToken::new(),
            dep_check: DepCheck::default(),
            po_with_problems: HashSet::new(),
            working_po: None,
            cheater_lookup: HashMap::new(),
            installed_file_requires: None,
        })
    }

    /// Attaches pre-parsed group metadata.
    pub fn with_groups(mut self, groups: ComposedGroups) -> Self {
        self.groups = groups;
        self
    }

    /// Records the running kernel's version and release, which the
    /// install-only limiter never erases.
    pub fn with_running_kernel(mut self, version: &str, release: &str) -> Self {
        self.running_kernel = Some((version.to_string(), release.to_string()));
        self
    }

    /// Returns a clone of the cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Returns the transaction set.
    pub fn tx(&self) -> &TransactionData {
        &self.tx
    }

    /// Returns the configuration the engine honors.
    pub fn conf(&self) -> &Config {
        &self.conf
    }

    /// Returns the `(new, old)` update pairs currently available, as
    /// `check-update` front-ends report them.
    pub fn check_updates(&mut self) -> Vec<(Nevra, Nevra)> {
        self.ensure_up();
        self.up_ref().get_updates_tuples()
    }

    /// Returns the set of identities installed on the system once the
    /// current plan applies.
    pub fn transaction_result(&self) -> BTreeSet<Nevra> {
        let mut result: BTreeSet<Nevra> = self.rpmdb.simple_pkg_list().into_iter().collect();
        for id in self.tx.member_ids() {
            let Some(member) = self.tx.member(id) else {
                continue;
            };
            if TS_REMOVE_STATES.contains(&member.output_state) {
                result.remove(member.nevra());
            }
        }
        result.extend(self.tx.installing_nevras());
        result
    }

    /// Marks a concrete package for installation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallError`] when the package cannot be
    /// installed.
    pub fn install_package(&mut self, po: Arc<Package>) -> Result<Vec<TxMemberId>, Error> {
        self.install_pkgs(vec![po])
    }

    /// Marks packages matching a user pattern for installation.
    ///
    /// `@group-id` arguments forward to [`Engine::select_group`]; patterns
    /// matching nothing are retried as a versioned capability or file
    /// requirement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallError`] when nothing is left to install.
    pub fn install(&mut self, pattern: &str) -> Result<Vec<TxMemberId>, Error> {
        if let Some(group_id) = pattern.strip_prefix('@') {
            return self.select_group(group_id);
        }

        let (exact, matched, unmatched) = self.sack.match_package_names(&[pattern])?;
        let mut pkgs = exact;
        pkgs.extend(matched);

        if !unmatched.is_empty() {
            debug!("checking for virtual provide or file-provide for {pattern}");
            match self.return_packages_by_dep(pattern) {
                Ok(dep_pkgs) if !dep_pkgs.is_empty() => {
                    pkgs.extend(self.best_packages_from_list(&dep_pkgs));
                }
                _ => warn!("No match for argument: {pattern}"),
            }
        }

        let pkgs = self.refine_install_candidates(pkgs, true);
        self.install_pkgs(pkgs)
    }

    /// Marks packages matching a partial NEVRA for installation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallError`] when the query is empty or matches
    /// nothing installable.
    pub fn install_nevra(&mut self, query: &NevraQuery) -> Result<Vec<TxMemberId>, Error> {
        if *query == NevraQuery::default() {
            return Err(Error::InstallError(
                "Nothing specified to install".to_string(),
            ));
        }
        let pkgs = self.sack.search_nevra(query);
        let pkgs = self.refine_install_candidates(pkgs, query.arch.is_none());
        self.install_pkgs(pkgs)
    }

    /// Marks everything updatable for update, obsoletes first.
    ///
    /// # Errors
    ///
    /// Returns an error when a recorded candidate has vanished from the
    /// sack.
    pub fn update_all(&mut self) -> Result<Vec<TxMemberId>, Error> {
        debug!("updating everything");
        self.ensure_up();
        let obsoletes = if self.conf.obsoletes {
            self.up_ref().get_obsoletes_tuples(true)
        } else {
            Vec::new()
        };
        let updates = self.up_ref().get_updates_tuples();

        let mut tx_return = Vec::new();
        for (obsoleting, installed) in obsoletes {
            let obsoleting_pkg = self.get_package_object(&obsoleting)?;
            let installed_pkg = self.get_installed_package_object(&installed)?;
            let id = self
                .tx
                .add_obsoleting(Arc::clone(&obsoleting_pkg), Arc::clone(&installed_pkg));
            self.tx.add_obsoleted(installed_pkg, obsoleting_pkg);
            tx_return.push(id);
        }
        for (new, old) in updates {
            if self.tx.is_obsoleted(&old) {
                debug!("not updating package that is already obsoleted: {old}");
                continue;
            }
            let updating_pkg = self.get_package_object(&new)?;
            let updated_pkg = self.get_installed_package_object(&old)?;
            let id = self.tx.add_update(updating_pkg, updated_pkg);
            tx_return.push(id);
        }
        Ok(tx_return)
    }

    /// Marks packages matching a user pattern for update; patterns matching
    /// nothing are retried as a capability or file requirement.
    ///
    /// # Errors
    ///
    /// Returns an error when a recorded candidate has vanished from the
    /// sack.
    pub fn update(&mut self, pattern: &str) -> Result<Vec<TxMemberId>, Error> {
        let (exact, matched, avail_unmatched) = self.sack.match_package_names(&[pattern])?;
        let mut availpkgs = exact;
        availpkgs.extend(matched);

        let (exact, matched, inst_unmatched) = self.rpmdb.match_package_names(&[pattern])?;
        let mut instpkgs = exact;
        instpkgs.extend(matched);

        if !avail_unmatched.is_empty() && !inst_unmatched.is_empty() {
            debug!("checking for virtual provide or file-provide for {pattern}");
            if let Ok(dep_pkgs) = self.return_packages_by_dep(pattern) {
                availpkgs.extend(self.best_packages_from_list(&dep_pkgs));
            }
            if let Ok(dep_pkgs) = self.return_installed_packages_by_dep(pattern) {
                instpkgs.extend(dep_pkgs);
            }
            if availpkgs.is_empty() && instpkgs.is_empty() {
                warn!("No match for argument: {pattern}");
            }
        }

        self.update_from_lists(&instpkgs, &availpkgs, None)
    }

    /// Marks a concrete package for update.
    ///
    /// # Errors
    ///
    /// Returns an error when a recorded candidate has vanished from the
    /// sack.
    pub fn update_package(&mut self, po: Arc<Package>) -> Result<Vec<TxMemberId>, Error> {
        if po.is_installed() {
            self.update_from_lists(&[po], &[], None)
        } else {
            self.update_from_lists(&[], &[po], None)
        }
    }

    /// Marks packages matching a partial NEVRA for update.
    ///
    /// # Errors
    ///
    /// Returns an error when a recorded candidate has vanished from the
    /// sack.
    pub fn update_nevra(&mut self, query: &NevraQuery) -> Result<Vec<TxMemberId>, Error> {
        self.update_by_query(query, None)
    }

    pub(crate) fn update_by_query(
        &mut self,
        query: &NevraQuery,
        requiring: Option<&Arc<Package>>,
    ) -> Result<Vec<TxMemberId>, Error> {
        let instpkgs = self.rpmdb.search_nevra(query);
        let availpkgs = self.sack.search_nevra(query);
        self.update_from_lists(&instpkgs, &availpkgs, requiring)
    }

    /// Marks installed packages matching a user pattern for erasure;
    /// patterns matching nothing are retried as an installed capability or
    /// file requirement.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid glob pattern.
    pub fn remove(&mut self, pattern: &str) -> Result<Vec<TxMemberId>, Error> {
        let (exact, matched, unmatched) = self.rpmdb.match_package_names(&[pattern])?;
        let mut pkgs = exact;
        pkgs.extend(matched);

        if !unmatched.is_empty() {
            match self.return_installed_packages_by_dep(pattern) {
                Ok(dep_pkgs) if !dep_pkgs.is_empty() => pkgs.extend(dep_pkgs),
                _ => warn!("No match for argument: {pattern}"),
            }
        }
        if pkgs.is_empty() {
            warn!("No package matched to remove");
        }

        Ok(pkgs
            .into_iter()
            .map(|po| self.tx.add_erase(po))
            .collect())
    }

    /// Marks a concrete installed package for erasure.
    pub fn remove_package(&mut self, po: Arc<Package>) -> Vec<TxMemberId> {
        vec![self.tx.add_erase(po)]
    }

    /// Marks installed packages matching a partial NEVRA for erasure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoveError`] when the query is empty.
    pub fn remove_nevra(&mut self, query: &NevraQuery) -> Result<Vec<TxMemberId>, Error> {
        if *query == NevraQuery::default() {
            return Err(Error::RemoveError(
                "Nothing specified to remove".to_string(),
            ));
        }
        let pkgs = self.rpmdb.search_nevra(query);
        if pkgs.is_empty() {
            warn!("No package matched to remove");
        }
        Ok(pkgs
            .into_iter()
            .map(|po| self.tx.add_erase(po))
            .collect())
    }

    /// Marks a package for erasure and immediate reinstallation of the
    /// identical NEVRA.
    ///
    /// Sets the replace-package problem filters the transaction runner
    /// needs to accept the plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoveError`] when either half matches nothing.
    pub fn reinstall(&mut self, pattern: &str) -> Result<Vec<TxMemberId>, Error> {
        for filter in [
            ProbFilter::ReplacePkg,
            ProbFilter::ReplaceNewFiles,
            ProbFilter::ReplaceOldFiles,
        ] {
            self.tx.prob_filter_flags.insert(filter);
        }

        let removed = self.remove(pattern)?;
        if removed.is_empty() {
            return Err(Error::RemoveError(
                "Problem in reinstall: no package matched to remove".to_string(),
            ));
        }
        let nevras: Vec<Nevra> = removed
            .iter()
            .filter_map(|id| self.tx.member(*id).map(|member| member.nevra().clone()))
            .collect();

        let mut members = removed;
        for nevra in nevras {
            let installed = self.install_nevra(&NevraQuery::from_nevra(&nevra))?;
            if installed.is_empty() {
                return Err(Error::RemoveError(
                    "Problem in reinstall: no package matched to install".to_string(),
                ));
            }
            members.extend(installed);
        }
        Ok(members)
    }

    /// Consumes a package built from a local file, updating or installing
    /// it per the usual rules.
    ///
    /// With `update_only` a package that is not an update of something
    /// installed is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid exclude pattern.
    pub fn install_local(
        &mut self,
        po: Arc<Package>,
        update_only: bool,
    ) -> Result<Vec<TxMemberId>, Error> {
        let installed_by_name = self
            .rpmdb
            .search_nevra(&NevraQuery::name(po.name().inner()));

        let mut installpkgs: Vec<Arc<Package>> = Vec::new();
        let mut updatepkgs: Vec<(Arc<Package>, Arc<Package>)> = Vec::new();

        if installed_by_name.is_empty() {
            if update_only {
                warn!(
                    "Package {} not installed, cannot update it; install it instead",
                    po.name()
                );
                return Ok(Vec::new());
            }
            installpkgs.push(Arc::clone(&po));
        }

        for installed_pkg in installed_by_name {
            match evr_cmp(&po.evr(), &installed_pkg.evr()) {
                std::cmp::Ordering::Greater => {
                    if self.conf.exactarchlist.contains(installed_pkg.name().inner())
                        && po.arch() != installed_pkg.arch()
                    {
                        info!("{po}: does not update installed package");
                    } else {
                        updatepkgs.push((Arc::clone(&po), installed_pkg));
                    }
                }
                std::cmp::Ordering::Equal => {
                    if po.arch() != installed_pkg.arch()
                        && (po.arch().is_multilib() || installed_pkg.arch().is_multilib())
                    {
                        installpkgs.push(Arc::clone(&po));
                    } else {
                        info!("{po}: does not update installed package");
                    }
                }
                std::cmp::Ordering::Less => {
                    info!("{po}: does not update installed package");
                }
            }
        }

        if !self.conf.exclude.is_empty() {
            let mut considered: Vec<Arc<Package>> = installpkgs.clone();
            considered.extend(updatepkgs.iter().map(|(new, _)| Arc::clone(new)));
            let patterns: Vec<&str> = self.conf.exclude.iter().map(String::as_str).collect();
            let (exact, matched, _) =
                rpmtx_sack::match_package_names(&considered, &patterns)?;
            if exact.iter().chain(matched.iter()).any(|hit| **hit == *po) {
                debug!("excluding {po}");
                return Ok(Vec::new());
            }
        }

        let mut tx_return = Vec::new();
        for local in installpkgs {
            info!("marking {local} to be installed");
            self.local_packages.push(Arc::clone(&local));
            tx_return.extend(self.install_pkgs(vec![local])?);
        }
        for (new, old) in updatepkgs {
            info!("marking {new} as an update to {old}");
            self.local_packages.push(Arc::clone(&new));
            tx_return.push(self.tx.add_update(new, old));
        }
        Ok(tx_return)
    }

    /// Marks the packages of a group for installation.
    ///
    /// Mandatory members are always pulled in, default and optional ones
    /// per the configured group package types. Conditional members install
    /// immediately when their condition is installed, and are remembered
    /// otherwise so a later install of the condition triggers them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupsError`] for an unknown group.
    pub fn select_group(&mut self, group_id: &str) -> Result<Vec<TxMemberId>, Error> {
        let Some(group) = self.groups.return_group(group_id) else {
            return Err(Error::GroupsError(format!(
                "No Group named {group_id} exists"
            )));
        };
        if group.selected {
            return Ok(Vec::new());
        }

        let mut pkgs: Vec<String> = Vec::new();
        for class in self.conf.group_package_types.clone() {
            let names = match class {
                crate::GroupPackageType::Mandatory => &group.mandatory_packages,
                crate::GroupPackageType::Default => &group.default_packages,
                crate::GroupPackageType::Optional => &group.optional_packages,
            };
            pkgs.extend(names.iter().cloned());
        }
        let conditionals = group.conditional_packages.clone();
        if let Some(group) = self.groups.return_group_mut(group_id) {
            group.selected = true;
        }

        let mut tx_return = Vec::new();
        for pkg in pkgs {
            debug!("adding package {pkg} from group {group_id}");
            match self.install_nevra(&NevraQuery::name(&pkg)) {
                Ok(members) => {
                    for id in &members {
                        self.tag_group(*id, group_id);
                    }
                    tx_return.extend(members);
                }
                Err(Error::InstallError(_)) => {
                    debug!("no package named {pkg} available to be installed");
                }
                Err(error) => return Err(error),
            }
        }

        if self.conf.enable_group_conditionals {
            for (condreq, cond) in conditionals {
                if self.is_package_installed(&cond) {
                    match self.install_nevra(&NevraQuery::name(&condreq)) {
                        Ok(members) => {
                            for id in &members {
                                self.tag_group(*id, group_id);
                            }
                            tx_return.extend(members);
                        }
                        Err(Error::InstallError(_)) => {}
                        Err(error) => return Err(error),
                    }
                    continue;
                }
                let pkgs = self.sack.search_nevra(&NevraQuery::name(&condreq));
                let pkgs = self.best_packages_from_list(&pkgs);
                if !pkgs.is_empty() {
                    if let Ok(cond) = cond.parse() {
                        self.tx.add_conditional(cond, pkgs);
                    }
                }
            }
        }

        Ok(tx_return)
    }

    /// Marks every package of a group for erasure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupsError`] for an unknown group.
    pub fn group_remove(&mut self, group_id: &str) -> Result<Vec<TxMemberId>, Error> {
        let Some(group) = self.groups.return_group(group_id) else {
            return Err(Error::GroupsError(format!(
                "No Group named {group_id} exists"
            )));
        };
        let pkgs = group.packages();

        let mut tx_return = Vec::new();
        for pkg in pkgs {
            let members = self.remove_nevra(&NevraQuery::name(&pkg))?;
            for id in &members {
                self.tag_group(*id, group_id);
            }
            tx_return.extend(members);
        }
        Ok(tx_return)
    }

    /// Unmarks a group selection: members whose only group association
    /// disappears fall out of the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupsError`] for an unknown group.
    pub fn deselect_group(&mut self, group_id: &str) -> Result<(), Error> {
        let Some(group) = self.groups.return_group_mut(group_id) else {
            return Err(Error::GroupsError(format!(
                "No Group named {group_id} exists"
            )));
        };
        group.selected = false;
        let pkgs = group.packages();

        for pkg in pkgs {
            let mut to_drop: Vec<Nevra> = Vec::new();
            for id in self.tx.match_naevr(&NevraQuery::name(&pkg)) {
                let Some(member) = self.tx.member_mut(id) else {
                    continue;
                };
                if !TS_INSTALL_STATES.contains(&member.output_state) {
                    continue;
                }
                let Some(position) = member.groups.iter().position(|g| g == group_id) else {
                    debug!("package {} was not marked in group {group_id}", member.po);
                    continue;
                };
                member.groups.remove(position);
                if member.groups.is_empty() {
                    to_drop.push(member.nevra().clone());
                }
            }
            for nevra in to_drop {
                self.tx.remove(&nevra);
            }
        }
        Ok(())
    }

    /// Returns whether a package of the given name is on the system once
    /// the current transaction applies.
    pub fn is_package_installed(&self, name: &str) -> bool {
        let installed = self.rpmdb.contains_name(name);
        let ids = self.tx.match_naevr(&NevraQuery::name(name));
        for id in &ids {
            if self.tx.member(*id).is_some_and(|member| {
                TS_INSTALL_STATES.contains(&member.output_state)
            }) {
                return true;
            }
        }
        if installed && !ids.is_empty() {
            // installed, but every member is an erase or a replacement
            return false;
        }
        installed
    }

    /// Returns the available packages satisfying a dependency expression,
    /// either versioned (`foo > 1.2`) or a file path.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable expression or a filelist
    /// retrieval failure.
    pub fn return_packages_by_dep(&mut self, depstring: &str) -> Result<Vec<Arc<Package>>, Error> {
        let req = depstring.parse::<Relation>()?;
        Ok(self.sack.search_provides(&req)?)
    }

    /// Returns the installed packages satisfying a dependency expression.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable expression.
    pub fn return_installed_packages_by_dep(
        &mut self,
        depstring: &str,
    ) -> Result<Vec<Arc<Package>>, Error> {
        let req = depstring.parse::<Relation>()?;
        Ok(self.rpmdb.get_provides(&req))
    }

    /// Resolves dependencies, applies the install-only limiter and, when
    /// configured, the skip-broken recovery.
    ///
    /// Returns the resolution code (`0` empty, `1` error, `2` resolved)
    /// and the accumulated messages.
    ///
    /// # Errors
    ///
    /// Returns an error for failures outside dependency problems, e.g.
    /// filelist retrieval.
    pub fn build_transaction(&mut self) -> Result<(u8, Vec<String>), Error> {
        let (mut rescode, mut restring) = self.resolve_deps()?;
        self.limit_installonly_pkgs();
        if self.tx.changed {
            let result = self.resolve_deps()?;
            rescode = result.0;
            restring = result.1;
        }
        if self.conf.skip_broken && rescode == RES_ERROR {
            let result = self.skip_packages_with_problems(restring)?;
            rescode = result.0;
            restring = result.1;
        }
        Ok((rescode, restring))
    }

    pub(crate) fn ensure_up(&mut self) {
        if self.up.is_some() {
            return;
        }
        debug!("building updates object");
        let mut up = Updates::new(
            self.rpmdb.simple_pkg_list(),
            self.sack.simple_pkg_list(),
            self.canonical_arch,
        );
        up.exactarch = self.conf.exactarch;
        up.exactarchlist = self.conf.exactarchlist.clone();
        if self.conf.obsoletes {
            up.set_raw_obsoletes(self.sack.return_obsoletes(true));
        }
        up.do_updates();
        if self.conf.obsoletes {
            up.do_obsoletes();
        }
        up.condense_updates();
        self.up = Some(up);
    }

    pub(crate) fn up_ref(&self) -> &Updates {
        self.up.as_ref().expect("updates index built by ensure_up")
    }

    pub(crate) fn get_package_object(&self, nevra: &Nevra) -> Result<Arc<Package>, Error> {
        for po in &self.local_packages {
            if po.nevra() == nevra {
                return Ok(Arc::clone(po));
            }
        }
        self.sack
            .search_pkg_tuple(nevra)
            .first()
            .cloned()
            .ok_or_else(|| Error::DepError {
                po: nevra.to_string(),
                msg: "package tuple could not be found in the package sack".to_string(),
            })
    }

    pub(crate) fn get_installed_package_object(
        &self,
        nevra: &Nevra,
    ) -> Result<Arc<Package>, Error> {
        self.rpmdb
            .search_pkg_tuple(nevra)
            .first()
            .cloned()
            .ok_or_else(|| Error::DepError {
                po: nevra.to_string(),
                msg: "package tuple could not be found in the installed database".to_string(),
            })
    }

    /// Returns whether several versions of the package may be installed
    /// side by side, by name or by any of its provides.
    pub fn allowed_multiple_installs(&self, po: &Package) -> bool {
        if self.conf.installonlypkgs.contains(po.name().inner()) {
            return true;
        }
        po.provides_names()
            .iter()
            .any(|name| self.conf.installonlypkgs.contains(name))
    }

    /// Picks the best packages out of a list, multilib-aware: 64-bit,
    /// 32-bit and noarch candidates are judged separately, and a newer
    /// noarch beats both halves.
    pub fn best_packages_from_list(&self, pkgs: &[Arc<Package>]) -> Vec<Arc<Package>> {
        let compat = compat_arch_list(self.canonical_arch);
        let mut multi: Vec<Arc<Package>> = Vec::new();
        let mut single: Vec<Arc<Package>> = Vec::new();
        let mut noarch: Vec<Arc<Package>> = Vec::new();
        for po in pkgs {
            if !compat.contains(&po.arch()) {
                continue;
            } else if po.arch() == Architecture::Noarch {
                noarch.push(Arc::clone(po));
            } else if po.arch().is_multilib() {
                multi.push(Arc::clone(po));
            } else {
                single.push(Arc::clone(po));
            }
        }

        let multi = self.best_package_from_list(&multi);
        let single = self.best_package_from_list(&single);
        let no = self.best_package_from_list(&noarch);

        let mut result = Vec::new();
        match (&multi, &single, &no) {
            (_, _, None) => {
                result.extend(multi);
                result.extend(single);
            }
            (Some(multi_po), _, Some(no_po)) => {
                let best = self
                    .best_package_from_list(&[Arc::clone(multi_po), Arc::clone(no_po)]);
                if best.is_some_and(|best| best.arch() == Architecture::Noarch) {
                    result.extend(no);
                } else {
                    result.extend(multi);
                    result.extend(single);
                }
            }
            (None, Some(single_po), Some(no_po)) => {
                let best = self
                    .best_package_from_list(&[Arc::clone(single_po), Arc::clone(no_po)]);
                if best.is_some_and(|best| best.arch() == Architecture::Noarch) {
                    result.extend(no);
                } else {
                    result.extend(single);
                }
            }
            (None, None, Some(_)) => result.extend(no),
        }
        result
    }

    fn best_package_from_list(&self, pkgs: &[Arc<Package>]) -> Option<Arc<Package>> {
        if pkgs.len() <= 1 {
            return pkgs.first().cloned();
        }
        let bestlist = newest_by_name_arch(pkgs);
        let mut best = Arc::clone(&bestlist[0]);
        for pkg in bestlist.iter().skip(1) {
            if pkg.name().inner().len() < best.name().inner().len() {
                best = Arc::clone(pkg);
                continue;
            }
            if pkg.name().inner().len() > best.name().inner().len() {
                continue;
            }
            let arch = best_arch_from(self.canonical_arch, &[pkg.arch(), best.arch()]);
            if arch == Some(pkg.arch()) {
                best = Arc::clone(pkg);
            }
        }
        Some(best)
    }

    fn refine_install_candidates(
        &self,
        pkgs: Vec<Arc<Package>>,
        arch_unspecified: bool,
    ) -> Vec<Arc<Package>> {
        if pkgs.is_empty() {
            return pkgs;
        }

        let mut pkgs = pkgs;
        if self.canonical_arch.is_multilib()
            && arch_unspecified
            && self.conf.multilib_policy == MultilibPolicy::Best
        {
            let peers = multilib_peers(self.canonical_arch);
            let mut covered: BTreeSet<String> = BTreeSet::new();
            let mut use_pkgs: Vec<Arc<Package>> = Vec::new();
            let mut not_added: Vec<Arc<Package>> = Vec::new();
            for pkg in pkgs {
                if peers.contains(&pkg.arch()) {
                    covered.insert(pkg.name().to_string());
                    use_pkgs.push(pkg);
                } else {
                    not_added.push(pkg);
                }
            }
            for pkg in not_added {
                if !covered.contains(pkg.name().inner()) {
                    use_pkgs.push(pkg);
                }
            }
            pkgs = use_pkgs;
        }

        let pkgs = newest_by_name(&pkgs);
        let mut by_name: BTreeMap<String, Vec<Arc<Package>>> = BTreeMap::new();
        for pkg in pkgs {
            by_name
                .entry(pkg.name().to_string())
                .or_default()
                .push(pkg);
        }
        let mut result = Vec::new();
        for group in by_name.values() {
            result.extend(self.best_packages_from_list(group));
        }
        result
    }

    fn install_pkgs(&mut self, pkgs: Vec<Arc<Package>>) -> Result<Vec<TxMemberId>, Error> {
        if pkgs.is_empty() {
            return Err(Error::InstallError(
                "No package(s) available to install".to_string(),
            ));
        }
        self.ensure_up();

        let mut tx_return = Vec::new();
        for po in pkgs {
            if po.is_source() {
                debug!("skipping source package {po}");
                continue;
            }
            if self.tx.exists(po.nevra())
                && !self
                    .tx
                    .members_with_state(Some(po.nevra()), &TS_INSTALL_STATES)
                    .is_empty()
            {
                debug!("package {po} - already in transaction set");
                tx_return.extend(self.tx.get_members(Some(po.nevra())));
                continue;
            }

            // an available package that updates something installed is an
            // update, not an install
            if self.up_ref().updating_dict().contains_key(po.nevra()) {
                tx_return.extend(self.update_package(Arc::clone(&po))?);
                continue;
            }

            if self.rpmdb.contains_package(&po)
                && self
                    .tx
                    .members_with_state(Some(po.nevra()), &TS_REMOVE_STATES)
                    .is_empty()
            {
                warn!("Package {po} already installed and latest version");
                continue;
            }

            // never install something the repositories already obsolete
            let obsoleters = self
                .up_ref()
                .check_for_obsolete(std::slice::from_ref(po.nevra()));
            if let Some(candidates) = obsoleters.get(po.nevra()) {
                let obsoleting_pkg = self.get_package_object(&candidates[0])?;
                debug!("installing {obsoleting_pkg} instead of obsoleted {po}");
                tx_return.extend(self.install_pkgs(vec![obsoleting_pkg])?);
                continue;
            }

            tx_return.push(self.tx.add_install(po));
        }
        Ok(tx_return)
    }

    pub(crate) fn update_from_lists(
        &mut self,
        instpkgs: &[Arc<Package>],
        availpkgs: &[Arc<Package>],
        requiring: Option<&Arc<Package>>,
    ) -> Result<Vec<TxMemberId>, Error> {
        self.ensure_up();
        let mut tx_return = Vec::new();

        if self.conf.obsoletes {
            for installed_pkg in instpkgs {
                let obsoleters: Vec<Nevra> = self
                    .up_ref()
                    .obsoleted_dict()
                    .get(installed_pkg.nevra())
                    .cloned()
                    .unwrap_or_default();
                for obsoleting in obsoleters {
                    let obsoleting_pkg = self.get_package_object(&obsoleting)?;
                    let id = self
                        .tx
                        .add_obsoleting(Arc::clone(&obsoleting_pkg), Arc::clone(installed_pkg));
                    self.tx
                        .add_obsoleted(Arc::clone(installed_pkg), obsoleting_pkg);
                    self.set_dep(id, requiring);
                    tx_return.push(id);
                }
            }
            for available_pkg in availpkgs {
                let obsoletees: Vec<Nevra> = self
                    .up_ref()
                    .obsoleting_dict()
                    .get(available_pkg.nevra())
                    .cloned()
                    .unwrap_or_default();
                for obsoleted in obsoletees {
                    let obsoleted_pkg = self.get_installed_package_object(&obsoleted)?;
                    let id = self
                        .tx
                        .add_obsoleting(Arc::clone(available_pkg), Arc::clone(&obsoleted_pkg));
                    self.set_dep(id, requiring);
                    tx_return.push(id);
                    if self.tx.is_obsoleted(&obsoleted) {
                        debug!("package is already obsoleted: {obsoleted}");
                    } else {
                        let old_id = self
                            .tx
                            .add_obsoleted(obsoleted_pkg, Arc::clone(available_pkg));
                        tx_return.push(old_id);
                    }
                }
            }
        }

        for available_pkg in availpkgs {
            let olds: Vec<Nevra> = self
                .up_ref()
                .updating_dict()
                .get(available_pkg.nevra())
                .cloned()
                .unwrap_or_default();
            for updated in olds {
                if self.tx.is_obsoleted(&updated) {
                    debug!("not updating package that is already obsoleted: {updated}");
                    continue;
                }
                let updated_pkg = self.get_installed_package_object(&updated)?;
                let id = self
                    .tx
                    .add_update(Arc::clone(available_pkg), updated_pkg);
                self.set_dep(id, requiring);
                tx_return.push(id);
            }
        }

        for installed_pkg in instpkgs {
            let news: Vec<Nevra> = self
                .up_ref()
                .updates_dict()
                .get(installed_pkg.nevra())
                .cloned()
                .unwrap_or_default();
            for updating in news {
                if self.tx.is_obsoleted(installed_pkg.nevra()) {
                    debug!(
                        "not updating package that is already obsoleted: {}",
                        installed_pkg.nevra()
                    );
                    continue;
                }
                let updating_pkg = self.get_package_object(&updating)?;
                let id = self
                    .tx
                    .add_update(updating_pkg, Arc::clone(installed_pkg));
                self.set_dep(id, requiring);
                tx_return.push(id);
            }
        }

        Ok(tx_return)
    }

    fn set_dep(&mut self, id: TxMemberId, requiring: Option<&Arc<Package>>) {
        if let (Some(member), Some(requiring)) = (self.tx.member_mut(id), requiring) {
            member.set_as_dep(Arc::clone(requiring));
        }
    }

    fn tag_group(&mut self, id: TxMemberId, group_id: &str) {
        if let Some(member) = self.tx.member_mut(id) {
            if !member.groups.iter().any(|g| g == group_id) {
                member.groups.push(group_id.to_string());
            }
        }
    }

    /// Caps the number of kept versions for install-only packages, erasing
    /// the oldest excess versions but never the running kernel.
    pub(crate) fn limit_installonly_pkgs(&mut self) {
        if self.conf.installonly_limit < 1 {
            return;
        }
        let limit = self.conf.installonly_limit as usize;

        let mut to_remove: Vec<Arc<Package>> = Vec::new();
        for instpkg in self.conf.installonlypkgs.clone() {
            for id in self.tx.member_ids() {
                let Some(member) = self.tx.member(id) else {
                    continue;
                };
                let po = Arc::clone(&member.po);
                let name_matches = po.name().inner() == instpkg
                    || po.provides_names().iter().any(|name| *name == instpkg);
                if !name_matches
                    || !matches!(member.ts_state, TsState::Install | TsState::Update)
                    || TS_REMOVE_STATES.contains(&member.output_state)
                {
                    continue;
                }

                let mut installed = self
                    .rpmdb
                    .search_nevra(&NevraQuery::name(po.name().inner()));
                if installed.len() + 1 <= limit {
                    continue;
                }
                let mut numleft = installed.len() + 1 - limit;
                installed.sort_by(|a, b| {
                    evr_cmp(&a.evr(), &b.evr()).then_with(|| a.nevra().cmp(b.nevra()))
                });
                for old in installed {
                    if numleft == 0 {
                        break;
                    }
                    if let Some((version, release)) = &self.running_kernel {
                        if old.version() == version && old.release() == release {
                            // never erase the running kernel
                            continue;
                        }
                    }
                    to_remove.push(old);
                    numleft -= 1;
                }
            }
        }
        for po in to_remove {
            debug!("limiting install-only versions: erasing {po}");
            self.tx.add_erase(po);
        }
    }

    fn skip_packages_with_problems(
        &mut self,
        restring: Vec<String>,
    ) -> Result<(u8, Vec<String>), Error> {
        let orig_restring = restring.clone();
        let mut rescode = RES_ERROR;
        let mut restring = restring;
        let mut count = 0usize;
        let ceiling = 4 * self.tx.len().max(1);
        let mut skipped: Vec<Arc<Package>> = Vec::new();
        let mut problem_lines: Vec<String> = Vec::new();

        while !self.po_with_problems.is_empty() && rescode == RES_ERROR {
            count += 1;
            if count > ceiling {
                debug!("skip-broken exceeded its round ceiling of {ceiling}");
                break;
            }
            debug!("skip-broken round {count}");

            let dep_tree = self.build_dep_tree();
            let start = self.tx.member_nevras();
            let mut problems: Vec<(Arc<Package>, Option<Arc<Package>>, String)> =
                self.po_with_problems.iter().cloned().collect();
            problems.sort_by(|a, b| {
                a.0.nevra().cmp(b.0.nevra()).then_with(|| a.2.cmp(&b.2))
            });

            let mut to_remove: Vec<Arc<Package>> = Vec::new();
            for (po, wpo, err) in problems {
                let line = format!("{po} from {} has depsolving problems", po.repo_id());
                if !problem_lines.contains(&line) {
                    problem_lines.push(line);
                    problem_lines.push(format!("  --> {err}"));
                }
                let culprit = if self.tx.exists(po.nevra()) {
                    Some(po)
                } else {
                    wpo
                };
                let Some(culprit) = culprit else {
                    continue;
                };
                self.collect_packages_to_remove(&culprit, &dep_tree, &mut to_remove);
                if !culprit.repo_id().is_installed() {
                    self.sack.del_package(&culprit);
                    if let Some(up) = self.up.as_mut() {
                        up.del_package(culprit.nevra());
                    }
                }
            }

            if to_remove.is_empty() {
                // nothing could be removed, the problem stays
                break;
            }
            for po in &to_remove {
                skipped.extend(self.skip_from_transaction(po));
            }

            let result = self.resolve_deps()?;
            rescode = result.0;
            restring = result.1;

            let end = self.tx.member_nevras();
            if start.difference(&end).next().is_none() {
                break;
            }
        }

        if rescode == RES_ERROR {
            info!("skip-broken could not solve problems");
            return Ok((RES_ERROR, orig_restring));
        }

        debug!("skip-broken took {count} rounds");
        let mut messages = problem_lines;
        if !skipped.is_empty() {
            messages.push("Packages skipped because of dependency problems:".to_string());
            let mut lines: Vec<String> = skipped
                .iter()
                .map(|po| format!("    {po} from {}", po.repo_id()))
                .collect();
            lines.sort();
            lines.dedup();
            messages.extend(lines);
        }
        messages.extend(restring);
        Ok((rescode, messages))
    }

    fn build_dep_tree(&self) -> HashMap<Nevra, Vec<Arc<Package>>> {
        let mut tree: HashMap<Nevra, Vec<Arc<Package>>> = HashMap::new();
        for id in self.tx.member_ids() {
            let Some(member) = self.tx.member(id) else {
                continue;
            };
            for dep in &member.depends_on {
                tree.entry(dep.nevra().clone())
                    .or_default()
                    .push(Arc::clone(&member.po));
            }
        }
        tree
    }

    fn collect_packages_to_remove(
        &self,
        po: &Arc<Package>,
        dep_tree: &HashMap<Nevra, Vec<Arc<Package>>>,
        to_remove: &mut Vec<Arc<Package>>,
    ) {
        push_unique_package(to_remove, po);
        for id in self.tx.get_members(Some(po.nevra())) {
            let Some(member) = self.tx.member(id) else {
                continue;
            };
            let linked: Vec<Arc<Package>> = member
                .updates
                .iter()
                .chain(member.obsoletes.iter())
                .cloned()
                .collect();
            for pkg in linked {
                push_unique_package(to_remove, &pkg);
                self.collect_deps_to_remove(&pkg, dep_tree, to_remove);
            }
        }
        self.collect_deps_to_remove(po, dep_tree, to_remove);
    }

    fn collect_deps_to_remove(
        &self,
        po: &Arc<Package>,
        dep_tree: &HashMap<Nevra, Vec<Arc<Package>>>,
        to_remove: &mut Vec<Arc<Package>>,
    ) {
        let dependents = dep_tree.get(po.nevra()).cloned().unwrap_or_default();
        for dep in dependents {
            if to_remove.contains(&dep) {
                continue;
            }
            for id in self.tx.get_members(Some(dep.nevra())) {
                let Some(member) = self.tx.member(id) else {
                    continue;
                };
                for pkg in member.updates.iter().chain(member.obsoletes.iter()) {
                    push_unique_package(to_remove, pkg);
                }
            }
            push_unique_package(to_remove, &dep);
            self.collect_deps_to_remove(&dep, dep_tree, to_remove);
        }
    }

    fn skip_from_transaction(&mut self, po: &Arc<Package>) -> Vec<Arc<Package>> {
        let mut skipped = Vec::new();
        if self.canonical_arch.is_multilib() {
            // cull the member on every compatible architecture of the name
            for arch in compat_arch_list(self.canonical_arch) {
                let mut nevra = po.nevra().clone();
                nevra.arch = arch;
                skipped.extend(self.remove_nevra_from_transaction(&nevra));
            }
            skipped.extend(self.remove_nevra_from_transaction(po.nevra()));
        } else {
            skipped.extend(self.remove_nevra_from_transaction(po.nevra()));
        }
        skipped
    }

    fn remove_nevra_from_transaction(&mut self, nevra: &Nevra) -> Vec<Arc<Package>> {
        if !self.tx.exists(nevra) {
            return Vec::new();
        }
        let mut skipped = Vec::new();
        for id in self.tx.get_members(Some(nevra)) {
            if let Some(member) = self.tx.member(id) {
                if !member.po.repo_id().is_installed()
                    && !skipped.contains(&member.po)
                {
                    skipped.push(Arc::clone(&member.po));
                }
            }
        }
        self.tx.remove(nevra);
        skipped
    }

    pub(crate) fn tx_new_provides(&self, req: &Relation) -> Vec<Arc<Package>> {
        self.tx.get_provides(req)
    }

    pub(crate) fn tx_old_provides(&self, req: &Relation) -> Vec<Arc<Package>> {
        self.rpmdb
            .get_provides(req)
            .into_iter()
            .filter(|po| {
                self.tx
                    .members_with_state(Some(po.nevra()), &TS_REMOVE_STATES)
                    .is_empty()
            })
            .collect()
    }

    pub(crate) fn tx_all_provides(&self, req: &Relation) -> Vec<Arc<Package>> {
        let mut result = self.tx_old_provides(req);
        for po in self.tx_new_provides(req) {
            if !result.contains(&po) {
                result.push(po);
            }
        }
        result
    }

    pub(crate) fn tx_all_requires(
        &self,
        prov: &Relation,
    ) -> Vec<(Arc<Package>, Vec<Relation>)> {
        let mut result: Vec<(Arc<Package>, Vec<Relation>)> = Vec::new();
        for po in self.rpmdb.search_requires(prov) {
            if !self
                .tx
                .members_with_state(Some(po.nevra()), &TS_REMOVE_STATES)
                .is_empty()
            {
                continue;
            }
            let matching: Vec<Relation> = po
                .requires()
                .iter()
                .filter(|req| range_compare(req, prov))
                .cloned()
                .collect();
            if !matching.is_empty() {
                result.push((po, matching));
            }
        }
        for (po, matching) in self.tx.get_requires(prov) {
            if !result.iter().any(|(known, _)| known == &po) {
                result.push((po, matching));
            }
        }
        result
    }
}

fn push_unique_package(target: &mut Vec<Arc<Package>>, po: &Arc<Package>) {
    if !target.contains(po) {
        target.push(Arc::clone(po));
    }
}
