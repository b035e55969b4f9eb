use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, info};
use rpmtx_sack::{NevraQuery, Package, PrcoKind, newest_by_name, newest_by_name_arch};
use rpmtx_types::{Nevra, Relation, VersionComparison, evr_cmp};

use crate::best_provider::compare_providers;
use crate::engine::Engine;
use crate::transaction::{
    OutputState, RelatedKind, TS_INSTALL_STATES, TS_REMOVE_STATES, TsState, TxMemberId, TxMode,
};
use crate::Error;

/// Resolution found the transaction empty.
pub const RES_EMPTY: u8 = 0;
/// Resolution ended with dependency errors.
pub const RES_ERROR: u8 = 1;
/// Dependencies were resolved.
pub const RES_OK: u8 = 2;

/// Scratch accumulator for unsatisfied requires and discovered conflicts
/// between resolver passes.
#[derive(Debug, Default)]
pub(crate) struct DepCheck {
    requires: Vec<(Arc<Package>, Relation)>,
    conflicts: Vec<(Arc<Package>, Relation)>,
}

impl DepCheck {
    pub(crate) fn clear(&mut self) {
        self.requires.clear();
        self.conflicts.clear();
    }

    fn add_requires(&mut self, po: Arc<Package>, req: Relation) {
        self.requires.push((po, req));
    }

    fn add_conflicts(&mut self, po: Arc<Package>, conflict: Relation) {
        self.conflicts.push((po, conflict));
    }
}

impl Engine {
    /// Resolves the transaction set to dependency closure.
    ///
    /// Iterates requirement, file-requirement and conflict passes until no
    /// pass makes progress, then converts install-only updates to plain
    /// installs. Returns [`RES_EMPTY`], [`RES_ERROR`] or [`RES_OK`]
    /// together with the accumulated messages; dependency problems are
    /// reported through the message list, never as an `Err`.
    ///
    /// Running the resolver twice without mutating its inputs yields the
    /// same result.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures outside dependency resolution,
    /// e.g. a filelist retrieval failure.
    pub fn resolve_deps(&mut self) -> Result<(u8, Vec<String>), Error> {
        if self.tx.is_empty() {
            return Ok((RES_EMPTY, vec!["Success - empty transaction".to_string()]));
        }

        self.dep_check.clear();
        self.po_with_problems.clear();
        self.working_po = None;
        self.tx.reset_resolved(false);
        self.ensure_up();

        let mut check_installs = false;
        let mut check_removes = false;
        let mut errors: Vec<String> = Vec::new();

        'restart: loop {
            let mut check_deps = true;
            while check_deps {
                if self.cancel.is_cancelled() {
                    return Ok((RES_ERROR, vec!["cancelled".to_string()]));
                }
                self.cheater_lookup.clear();
                let (deps, installs, removes) = self.resolve_requires(&mut errors)?;
                check_deps = deps;
                check_installs |= installs;
                check_removes |= removes;
            }

            if check_removes {
                check_removes = false;
                let mut check_deps = false;
                for (po, dep) in self.check_file_requires() {
                    let (checkdep, _missing, msgs) = self.process_req(&po, &dep)?;
                    check_deps |= checkdep;
                    errors.extend(msgs);
                }
                if check_deps {
                    debug!("restarting loop");
                    continue 'restart;
                }
            }

            if check_installs {
                check_installs = false;
                let mut check_deps = false;
                for (po, conflict, cpo) in self.check_conflicts() {
                    let (checkdep, msgs) = self.process_conflict(&po, &conflict, &cpo)?;
                    check_deps |= checkdep;
                    errors.extend(msgs);
                }
                if check_deps {
                    debug!("restarting loop");
                    continue 'restart;
                }
            }

            break;
        }

        if self.cancel.is_cancelled() {
            return Ok((RES_ERROR, vec!["cancelled".to_string()]));
        }

        self.convert_install_only_members();

        debug!(
            "dependency process ending: {} open requires, {} conflicts recorded",
            self.dep_check.requires.len(),
            self.dep_check.conflicts.len()
        );
        self.tx.changed = false;

        if !errors.is_empty() {
            let mut unique: Vec<String> = Vec::new();
            for error in errors {
                if !unique.contains(&error) {
                    unique.push(error);
                }
            }
            let mut problems: Vec<(Arc<Package>, Option<Arc<Package>>, String)> =
                self.po_with_problems.iter().cloned().collect();
            problems.sort_by(|a, b| a.0.nevra().cmp(b.0.nevra()).then_with(|| a.2.cmp(&b.2)));
            for (po, _working, err) in problems {
                info!("{po} from {} has depsolving problems", po.repo_id());
                info!("  --> {err}");
            }
            return Ok((RES_ERROR, unique));
        }

        if self.tx.is_empty() {
            Ok((RES_EMPTY, vec!["Success - empty transaction".to_string()]))
        } else {
            Ok((RES_OK, vec!["Success - deps resolved".to_string()]))
        }
    }

    /// Walks every unresolved member once, collecting and processing the
    /// requirements its installation or removal leaves open.
    fn resolve_requires(
        &mut self,
        errors: &mut Vec<String>,
    ) -> Result<(bool, bool, bool), Error> {
        let mut check_deps = false;
        let mut check_installs = false;
        let mut check_removes = false;

        for id in self.tx.unresolved_members() {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(member) = self.tx.member(id) else {
                continue;
            };
            debug!("checking deps for {member}");

            // remember who is causing the work, not just who has it: for a
            // member that only leaves the system, the package replacing it
            // is the interesting one
            self.working_po = if member.updates.is_empty() && !member.relatedto.is_empty() {
                Some(Arc::clone(&member.relatedto[0].0))
            } else {
                Some(Arc::clone(&member.po))
            };

            let install_side = TS_INSTALL_STATES.contains(&member.output_state);
            let needs = if install_side {
                check_installs = true;
                self.check_install(id)
            } else {
                check_removes = true;
                self.check_remove(id)
            };

            let mut missing_in_pkg = false;
            for (req_po, dep) in needs {
                let (checkdep, missing, msgs) = self.process_req(&req_po, &dep)?;
                check_deps |= checkdep;
                errors.extend(msgs);
                missing_in_pkg |= missing;
            }
            if !missing_in_pkg {
                self.tx.mark_resolved(id);
            }
        }

        Ok((check_deps, check_installs, check_removes))
    }

    /// Returns the unsatisfied requirements an incoming member brings in.
    ///
    /// Self-provided requirements, internal RPM capabilities, and old
    /// requirements an update inherits that the installed database still
    /// satisfies are skipped.
    fn check_install(&mut self, id: TxMemberId) -> Vec<(Arc<Package>, Relation)> {
        let Some(member) = self.tx.member(id) else {
            return Vec::new();
        };
        let po = Arc::clone(&member.po);
        let provs: Vec<Relation> = po.provides().to_vec();
        let oldreqs: Vec<Relation> = member
            .updates
            .iter()
            .flat_map(|old| old.requires().to_vec())
            .collect();

        let mut ret = Vec::new();
        let mut related: Vec<(Nevra, Arc<Package>)> = Vec::new();
        for req in po.requires() {
            if req.is_rpmlib() {
                continue;
            }
            if provs.contains(req) {
                continue;
            }
            if oldreqs.contains(req) && !self.rpmdb.get_provides(req).is_empty() {
                continue;
            }

            debug!("looking for {req} as a requirement of {po}");
            let providers = self.tx_all_provides(req);
            if providers.is_empty() {
                self.dep_check.add_requires(Arc::clone(&po), req.clone());
                ret.push((Arc::clone(&po), req.clone()));
                continue;
            }
            for provider in providers {
                if provider.name() == po.name() {
                    continue;
                }
                related.push((provider.nevra().clone(), Arc::clone(&po)));
            }
        }

        for (provider, requirer) in related {
            for mid in self
                .tx
                .members_with_state(Some(&provider), &TS_INSTALL_STATES)
            {
                if let Some(member) = self.tx.member_mut(mid) {
                    member
                        .relatedto
                        .push((Arc::clone(&requirer), RelatedKind::DependsOn));
                }
            }
        }
        ret
    }

    /// Returns the requirements stranded by a member leaving the system:
    /// everything the package alone provided that a surviving or incoming
    /// member still needs and nothing else satisfies.
    fn check_remove(&mut self, id: TxMemberId) -> Vec<(Arc<Package>, Relation)> {
        let Some(member) = self.tx.member(id) else {
            return Vec::new();
        };
        let po = Arc::clone(&member.po);
        let new_provs: Vec<Relation> = member
            .updated_by
            .iter()
            .flat_map(|new| new.provides().to_vec())
            .collect();

        let mut provs: Vec<Relation> = po.provides().to_vec();
        provs.push(Relation::new_versioned(po.name().inner(), po.evr()));

        let mut ret = Vec::new();
        for prov in provs {
            if prov.is_rpmlib() {
                continue;
            }
            if new_provs.contains(&prov) {
                continue;
            }
            for (pkg, hits) in self.tx_all_requires(&prov) {
                for req in hits {
                    if self.tx_all_provides(&req).is_empty() {
                        self.dep_check.add_requires(Arc::clone(&pkg), req.clone());
                        ret.push((Arc::clone(&pkg), req));
                    }
                }
            }
        }
        ret
    }

    /// Verifies every file requirement of surviving installed packages and
    /// incoming members, skipping those that were already unresolvable in
    /// the installed database before the transaction.
    fn check_file_requires(&mut self) -> Vec<(Arc<Package>, Relation)> {
        if self.installed_file_requires.is_none() {
            let mut per_package: Vec<(Arc<Package>, Vec<String>)> = Vec::new();
            let mut unresolved: BTreeSet<String> = BTreeSet::new();
            let mut checked: BTreeSet<String> = BTreeSet::new();
            for pkg in self.rpmdb.packages() {
                let mut files: Vec<String> = Vec::new();
                for req in pkg.requires() {
                    if !req.is_file() {
                        continue;
                    }
                    files.push(req.name.clone());
                    if checked.insert(req.name.clone())
                        && self
                            .rpmdb
                            .get_provides(&Relation::unversioned(&req.name))
                            .is_empty()
                    {
                        unresolved.insert(req.name.clone());
                    }
                }
                if !files.is_empty() {
                    per_package.push((pkg, files));
                }
            }
            self.installed_file_requires = Some((per_package, unresolved));
        }
        let (installed_reqs, installed_unresolved) = self
            .installed_file_requires
            .clone()
            .unwrap_or_default();

        let mut file_requires: BTreeSet<String> = BTreeSet::new();
        let mut reverse: BTreeMap<String, Vec<Arc<Package>>> = BTreeMap::new();

        for (po, files) in &installed_reqs {
            if !self
                .tx
                .members_with_state(Some(po.nevra()), &TS_REMOVE_STATES)
                .is_empty()
            {
                continue;
            }
            for file in files {
                file_requires.insert(file.clone());
                reverse.entry(file.clone()).or_default().push(Arc::clone(po));
            }
        }
        for broken in &installed_unresolved {
            file_requires.remove(broken);
        }

        for mid in self.tx.members_with_state(None, &TS_INSTALL_STATES) {
            let Some(member) = self.tx.member(mid) else {
                continue;
            };
            let po = Arc::clone(&member.po);
            let updates = member.updates.clone();
            for req in po.requires() {
                if !req.is_file() {
                    continue;
                }
                if installed_unresolved.contains(&req.name) {
                    // the requirement was broken before this transaction;
                    // an update inheriting it does not make it our problem
                    let already_broken = updates.iter().any(|old| {
                        old.check_prco(PrcoKind::Requires, &Relation::unversioned(&req.name))
                    });
                    if already_broken {
                        continue;
                    }
                }
                file_requires.insert(req.name.clone());
                reverse
                    .entry(req.name.clone())
                    .or_default()
                    .push(Arc::clone(&po));
            }
        }

        let mut ret = Vec::new();
        for filename in &file_requires {
            let req = Relation::unversioned(filename);
            if self.tx_old_provides(&req).is_empty() && self.tx_new_provides(&req).is_empty() {
                for po in reverse.get(filename).cloned().unwrap_or_default() {
                    ret.push((po, req.clone()));
                }
            }
        }
        ret
    }

    /// Collects conflicts between installed survivors and incoming members,
    /// in both directions.
    fn check_conflicts(&self) -> Vec<(Arc<Package>, Relation, Arc<Package>)> {
        let mut ret = Vec::new();
        for po in self.rpmdb.packages() {
            if !self
                .tx
                .members_with_state(Some(po.nevra()), &TS_REMOVE_STATES)
                .is_empty()
            {
                continue;
            }
            for conflict in po.conflicts() {
                for cpo in self.tx_new_provides(conflict) {
                    if cpo.name() == po.name() && evr_cmp(&cpo.evr(), &po.evr()).is_eq() {
                        continue;
                    }
                    ret.push((Arc::clone(&po), conflict.clone(), cpo));
                }
            }
        }
        for mid in self.tx.members_with_state(None, &TS_INSTALL_STATES) {
            let Some(member) = self.tx.member(mid) else {
                continue;
            };
            let po = Arc::clone(&member.po);
            for conflict in po.conflicts() {
                for cpo in self.tx_all_provides(conflict) {
                    if cpo.name() == po.name() && evr_cmp(&cpo.evr(), &po.evr()).is_eq() {
                        continue;
                    }
                    ret.push((Arc::clone(&po), conflict.clone(), cpo));
                }
            }
        }
        ret
    }

    /// Processes one open requirement, dispatching on whether the requirer
    /// is installed or incoming.
    ///
    /// Returns `(made_progress, missing, messages)`. Inconsistent-state
    /// errors are recorded against the member and never abort the loop.
    fn process_req(
        &mut self,
        po: &Arc<Package>,
        req: &Relation,
    ) -> Result<(bool, bool, Vec<String>), Error> {
        let mut errors = Vec::new();
        debug!("{po} requires: {req}");

        let result = if po.repo_id().is_installed() {
            self.requiring_from_installed(po, req, &mut errors)
        } else {
            self.requiring_from_transaction(po, req, &mut errors)
        };

        match result {
            Ok((check_deps, missing)) => {
                if missing {
                    let msg = errors.last().cloned().unwrap_or_default();
                    self.po_with_problems
                        .insert((Arc::clone(po), self.working_po.clone(), msg));
                }
                Ok((check_deps, missing, errors))
            }
            Err(error @ Error::DepError { .. }) => {
                // a candidate vanished from the sack mid-pass; record the
                // problem and let the loop continue
                self.po_with_problems.insert((
                    Arc::clone(po),
                    self.working_po.clone(),
                    error.to_string(),
                ));
                Ok((true, false, errors))
            }
            Err(error) => Err(error),
        }
    }

    /// Resolves an open requirement of an installed package: find what
    /// currently satisfies it and react to what the transaction does to
    /// that provider.
    fn requiring_from_installed(
        &mut self,
        po: &Arc<Package>,
        req: &Relation,
        errors: &mut Vec<String>,
    ) -> Result<(bool, bool), Error> {
        if !self
            .tx
            .members_with_state(Some(po.nevra()), &TS_REMOVE_STATES)
            .is_empty()
        {
            return Ok((false, false));
        }

        let req_key = req.to_string();
        let mut providers: Vec<Arc<Package>> = Vec::new();
        if let Some(cheater) = self.cheater_lookup.get(&req_key) {
            debug!("needed require has already been looked up, cheating");
            providers.push(Arc::clone(cheater));
        } else if self.rpmdb.contains_name(&req.name) {
            for mid in self.tx.match_naevr(&NevraQuery::name(&req.name)) {
                if let Some(member) = self.tx.member(mid) {
                    providers.push(Arc::clone(&member.po));
                }
            }
        } else {
            debug!("needed require is not a package name, looking up: {req}");
            providers = self.rpmdb.get_provides(req);
        }

        let mut needmode: Option<TxMode> = None;
        let mut needpo: Option<Arc<Package>> = None;
        for inst_po in providers {
            debug!("potential provider: {inst_po}");
            let nevra = inst_po.nevra().clone();
            let exactarch = self.conf.exactarchlist.contains(nevra.name.inner());

            let mut thismode = self.tx.get_mode(&NevraQuery::from_nevra(&nevra));
            if thismode.is_none() && exactarch {
                thismode = self
                    .tx
                    .get_mode(&NevraQuery::name(nevra.name.inner()).arch(nevra.arch));
            }
            if thismode.is_none() && !exactarch {
                thismode = self.tx.get_mode(&NevraQuery::name(nevra.name.inner()));
            }
            // a provider being obsoleted counts as being updated as far as
            // finding another provider is concerned
            if thismode.is_none() {
                let obsoleted = self
                    .tx
                    .match_naevr(&NevraQuery::from_nevra(&nevra))
                    .into_iter()
                    .any(|mid| {
                        self.tx
                            .member(mid)
                            .is_some_and(|member| !member.obsoleted_by.is_empty())
                    });
                if obsoleted {
                    thismode = Some(TxMode::Update);
                }
            }

            if let Some(mode) = thismode {
                debug!("mode is {mode} for provider of {req}: {inst_po}");
                needmode = Some(mode);
                needpo = Some(Arc::clone(&inst_po));
                self.cheater_lookup.insert(req_key.clone(), inst_po);
                break;
            }
        }
        debug!("mode for pkg providing {req}: {needmode:?}");

        match needmode {
            Some(TxMode::Erase) => {
                debug!("erasing {po}, its requirement on {} is going away", req.name);
                let id = self.tx.add_erase(Arc::clone(po));
                if let (Some(member), Some(needpo)) = (self.tx.member_mut(id), needpo) {
                    member.set_as_dep(needpo);
                }
                Ok((true, false))
            }
            Some(TxMode::Install | TxMode::Update) => {
                let length = self.tx.len();
                let query = NevraQuery::name(po.name().inner())
                    .epoch(po.epoch())
                    .version(po.version())
                    .release(po.release());
                self.update_by_query(&query, None)?;
                let removed = self
                    .tx
                    .members_with_state(Some(po.nevra()), &TS_REMOVE_STATES);
                if self.tx.len() != length && !removed.is_empty() {
                    debug!("updating {po} to resolve dep");
                    return Ok((true, false));
                }
                debug!("cannot find an update path for dep for: {req}");
                self.requiring_from_transaction(po, req, errors)
            }
            Some(TxMode::Updated | TxMode::Obsoleted) => Ok((false, false)),
            None => {
                let msg = format!(
                    "Unresolvable requirement {req} for {po} ({})",
                    po.repo_id()
                );
                debug!("{msg}");
                errors.push(msg);
                Ok((false, true))
            }
        }
    }

    /// Resolves an open requirement of an incoming package by finding a new
    /// provider in the repositories.
    fn requiring_from_transaction(
        &mut self,
        requiring_po: &Arc<Package>,
        req: &Relation,
        errors: &mut Vec<String>,
    ) -> Result<(bool, bool), Error> {
        let mut upgraded: HashMap<Nevra, Vec<Nevra>> = HashMap::new();

        let prov_pkgs = self.sack.search_provides(req)?;
        let mut filtered: Vec<Arc<Package>> = Vec::new();
        for pkg in prov_pkgs {
            debug!("potential match for {req} from {pkg}");
            // an already installed copy is pointless as a new provider
            if !self.rpmdb.search_pkg_tuple(pkg.nevra()).is_empty() {
                debug!("{pkg} is in providing packages but it is already installed, removing");
                continue;
            }

            let mut superseded = false;
            if !self.allowed_multiple_installs(&pkg) {
                let same_name_arch =
                    NevraQuery::name(pkg.name().inner()).arch(pkg.arch());
                for mid in self.tx.match_naevr(&same_name_arch) {
                    let Some(member) = self.tx.member(mid) else {
                        continue;
                    };
                    match evr_cmp(&member.po.evr(), &pkg.evr()) {
                        Ordering::Greater => {
                            debug!("potential resolving package {pkg} has newer instance in ts");
                            superseded = true;
                            break;
                        }
                        Ordering::Less => {
                            upgraded
                                .entry(pkg.nevra().clone())
                                .or_default()
                                .push(member.nevra().clone());
                        }
                        Ordering::Equal => {}
                    }
                }
                if !superseded {
                    for dbpkg in self.rpmdb.search_nevra(&same_name_arch) {
                        if evr_cmp(&dbpkg.evr(), &pkg.evr()).is_gt() {
                            debug!(
                                "potential resolving package {pkg} has newer instance installed"
                            );
                            superseded = true;
                            break;
                        }
                    }
                }
            }
            if !superseded {
                filtered.push(pkg);
            }
        }

        if filtered.is_empty() {
            let msg = Error::MissingDependency {
                requirer: format!("{requiring_po} ({})", requiring_po.repo_id()),
                requirement: req.to_string(),
            }
            .to_string();
            errors.push(msg);
            return Ok((false, true));
        }

        // if a provider is already on its way in there is nothing to do
        for pkg in &filtered {
            if matches!(
                self.tx.get_mode(&NevraQuery::from_nevra(pkg.nevra())),
                Some(TxMode::Install | TxMode::Update)
            ) {
                debug!("{pkg} already in ts, skipping this one");
                return Ok((false, false));
            }
        }

        // prefer updating an already installed package to satisfy the
        // requirement
        let length = self.tx.len();
        for pkg in newest_by_name(&filtered) {
            let query = NevraQuery::name(pkg.name().inner())
                .epoch(pkg.epoch())
                .version(pkg.version())
                .release(pkg.release());
            self.update_by_query(&query, Some(requiring_po))?;
            if self.tx.len() != length {
                return Ok((true, false));
            }
        }

        // otherwise pick the best provider among the newest candidates
        let newest = newest_by_name_arch(&filtered);
        let mut best = Arc::clone(&newest[0]);
        if newest.len() > 1 {
            let mut old_best: Option<Arc<Package>> = None;
            let mut loop_run = 0usize;
            while old_best.as_ref() != Some(&best) {
                if self.cancel.is_cancelled() {
                    break;
                }
                if loop_run >= newest.len() * 2 {
                    let msg = format!(
                        "Failure finding best provider of {} for {requiring_po}, exceeded maximum loop length",
                        req.name
                    );
                    debug!("{msg}");
                    errors.push(msg);
                    break;
                }
                loop_run += 1;
                old_best = Some(Arc::clone(&best));
                best = compare_providers(&newest, &best, requiring_po, self.canonical_arch);
            }
        }

        if !self.rpmdb.search_pkg_tuple(best.nevra()).is_empty() {
            let msg = Error::MissingDependency {
                requirer: format!("{requiring_po} ({})", requiring_po.repo_id()),
                requirement: req.name.clone(),
            }
            .to_string();
            errors.push(msg);
            return Ok((false, true));
        }

        let installed_same = self
            .rpmdb
            .search_nevra(&NevraQuery::name(best.name().inner()).arch(best.arch()));
        if let Some(installed) = installed_same.first() {
            debug!("marking {best} as update for {requiring_po}");
            let id = self.tx.add_update(Arc::clone(&best), Arc::clone(installed));
            if let Some(member) = self.tx.member_mut(id) {
                member.set_as_dep(Arc::clone(requiring_po));
            }
        } else {
            debug!("marking {best} as install for {requiring_po}");
            let id = self.tx.add_install(Arc::clone(&best));
            if let Some(member) = self.tx.member_mut(id) {
                member.set_as_dep(Arc::clone(requiring_po));
            }
            // name-arch peers the new provider supersedes are rechecked
            if let Some(olds) = upgraded.get(best.nevra()).cloned() {
                for old in olds {
                    self.tx.remove(&old);
                }
            }
        }

        Ok((true, false))
    }

    /// Attempts to relieve a conflict by updating either side; an
    /// unrelievable conflict is recorded as a problem.
    fn process_conflict(
        &mut self,
        po: &Arc<Package>,
        conflict: &Relation,
        conflicting_po: &Arc<Package>,
    ) -> Result<(bool, Vec<String>), Error> {
        let mut errors = Vec::new();
        debug!("{po} conflicts: {conflict}");
        self.dep_check
            .add_conflicts(Arc::clone(po), conflict.clone());
        let length = self.tx.len();

        if matches!(
            conflict.flag,
            Some(VersionComparison::Less | VersionComparison::LessOrEqual)
        ) {
            self.update_by_query(&NevraQuery::name(conflicting_po.name().inner()), None)?;
            if self.tx.len() != length && self.removed(conflicting_po) {
                return Ok((true, errors));
            }
        } else if matches!(
            conflict.flag,
            Some(VersionComparison::Greater | VersionComparison::GreaterOrEqual)
        ) {
            self.update_by_query(&NevraQuery::name(po.name().inner()), None)?;
            if self.tx.len() != length && self.removed(po) {
                return Ok((true, errors));
            }
        }

        self.update_by_query(&NevraQuery::name(conflicting_po.name().inner()), None)?;
        if self.tx.len() != length && self.removed(conflicting_po) {
            return Ok((true, errors));
        }
        self.update_by_query(&NevraQuery::name(po.name().inner()), None)?;
        if self.tx.len() != length && self.removed(po) {
            return Ok((true, errors));
        }

        let msg = Error::PackageConflict {
            a: po.name().to_string(),
            b: conflicting_po.name().to_string(),
            conflict: conflict.to_string(),
        }
        .to_string();
        debug!("{msg}");
        errors.push(msg.clone());
        self.po_with_problems.insert((Arc::clone(po), None, msg));
        Ok((false, errors))
    }

    fn removed(&self, po: &Package) -> bool {
        !self
            .tx
            .members_with_state(Some(po.nevra()), &TS_REMOVE_STATES)
            .is_empty()
    }

    /// Install-only packages never replace their older versions: their
    /// update members become plain installs and the members marking the old
    /// versions for removal are dropped.
    fn convert_install_only_members(&mut self) {
        for id in self.tx.member_ids() {
            let Some(member) = self.tx.member(id) else {
                continue;
            };
            if member.ts_state != TsState::Update
                || !TS_INSTALL_STATES.contains(&member.output_state)
            {
                continue;
            }
            let po = Arc::clone(&member.po);
            if !self.allowed_multiple_installs(&po) {
                continue;
            }
            debug!("{po} converted to install");
            let olds: Vec<Nevra> = member
                .updates
                .iter()
                .map(|old| old.nevra().clone())
                .collect();
            if let Some(member) = self.tx.member_mut(id) {
                member.ts_state = TsState::Install;
                member.output_state = OutputState::Install;
                member.updates.clear();
            }
            for old in olds {
                for mid in self
                    .tx
                    .members_with_state(Some(&old), &[OutputState::Updated])
                {
                    self.tx.remove_member(mid);
                }
            }
        }
    }
}
