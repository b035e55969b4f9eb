use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use log::debug;
use rpmtx_sack::{NevraQuery, Package};
use rpmtx_types::{Name, Nevra, Relation, range_compare};
use strum::Display as StrumDisplay;

/// The action a transaction member requests from the transaction runner.
#[derive(Clone, Copy, Debug, Eq, PartialEq, StrumDisplay)]
pub enum TsState {
    /// Install, keeping other versions (`i`).
    #[strum(to_string = "i")]
    Install,
    /// Install, replacing an older version (`u`).
    #[strum(to_string = "u")]
    Update,
    /// Erase (`e`).
    #[strum(to_string = "e")]
    Erase,
}

/// What a member means for the final package set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum OutputState {
    /// The package is newly installed.
    Install,
    /// The package is installed without replacing anything.
    TrueInstall,
    /// The package replaces an older installed version.
    Update,
    /// The package is the older version an update replaces.
    Updated,
    /// The package supersedes an installed package it obsoletes.
    Obsoleting,
    /// The package is superseded by an obsoleting member.
    Obsoleted,
    /// The package is erased.
    Erase,
    /// The package is merely known, with no action planned.
    Available,
}

/// The output states after which a member's package is on the system.
pub const TS_INSTALL_STATES: [OutputState; 4] = [
    OutputState::Install,
    OutputState::TrueInstall,
    OutputState::Update,
    OutputState::Obsoleting,
];

/// The output states after which a member's package is gone from the
/// system.
pub const TS_REMOVE_STATES: [OutputState; 3] = [
    OutputState::Erase,
    OutputState::Updated,
    OutputState::Obsoleted,
];

/// The mode of a member as the resolver sees it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, StrumDisplay)]
pub enum TxMode {
    /// Being installed.
    #[strum(to_string = "i")]
    Install,
    /// Being updated to.
    #[strum(to_string = "u")]
    Update,
    /// Being erased.
    #[strum(to_string = "e")]
    Erase,
    /// Being replaced by an update.
    #[strum(to_string = "ud")]
    Updated,
    /// Being replaced by an obsoleter.
    #[strum(to_string = "od")]
    Obsoleted,
}

/// Why a member relates to another package.
#[derive(Clone, Copy, Debug, Eq, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum RelatedKind {
    /// The other package depends on this member.
    DependsOn,
    /// The other package updates this member away.
    UpdatedBy,
    /// The other package obsoletes this member away.
    ObsoletedBy,
}

/// Why a member entered the transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum Reason {
    /// Directly requested by the user.
    User,
    /// Pulled in to satisfy a dependency.
    Dep,
}

/// RPM problem filters accumulated across operations and handed to the
/// transaction runner.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ProbFilter {
    /// Skip the disk-space check.
    DiskSpace,
    /// Permit replacing an already installed package of the same identity.
    ReplacePkg,
    /// Permit replacing files owned by the incoming package's older copy.
    ReplaceNewFiles,
    /// Permit replacing files owned by other installed packages.
    ReplaceOldFiles,
    /// Permit downgrades.
    OldPackage,
}

/// The identity of one transaction member inside the member arena.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TxMemberId(usize);

/// One entry of the transaction set: a planned action on one package,
/// together with the relationships that explain it.
#[derive(Clone, Debug)]
pub struct TxMember {
    /// The package the action applies to.
    pub po: Arc<Package>,
    /// The requested action.
    pub ts_state: TsState,
    /// The resulting state of the package.
    pub output_state: OutputState,
    /// Older packages this member replaces.
    pub updates: Vec<Arc<Package>>,
    /// Newer packages replacing this member's package.
    pub updated_by: Vec<Arc<Package>>,
    /// Installed packages this member supersedes.
    pub obsoletes: Vec<Arc<Package>>,
    /// Packages superseding this member's package.
    pub obsoleted_by: Vec<Arc<Package>>,
    /// Packages whose requirements pulled this member in.
    pub depends_on: Vec<Arc<Package>>,
    /// Related packages and why they relate.
    pub relatedto: Vec<(Arc<Package>, RelatedKind)>,
    /// Group identities that mentioned this package.
    pub groups: Vec<String>,
    /// Whether the member was added to satisfy a dependency rather than a
    /// direct request.
    pub is_dep: bool,
    /// Why the member entered the transaction.
    pub reason: Reason,
    /// Whether the resolver has processed this member in the current pass.
    pub resolved: bool,
}

impl TxMember {
    fn new(po: Arc<Package>, ts_state: TsState, output_state: OutputState) -> Self {
        TxMember {
            po,
            ts_state,
            output_state,
            updates: Vec::new(),
            updated_by: Vec::new(),
            obsoletes: Vec::new(),
            obsoleted_by: Vec::new(),
            depends_on: Vec::new(),
            relatedto: Vec::new(),
            groups: Vec::new(),
            is_dep: false,
            reason: Reason::User,
            resolved: false,
        }
    }

    /// Returns the identity of the member's package.
    pub fn nevra(&self) -> &Nevra {
        self.po.nevra()
    }

    /// Returns the member's mode as the resolver sees it: the requested
    /// action refined by the output state.
    pub fn mode(&self) -> TxMode {
        match self.output_state {
            OutputState::Updated => TxMode::Updated,
            OutputState::Obsoleted => TxMode::Obsoleted,
            OutputState::Erase => TxMode::Erase,
            _ => match self.ts_state {
                TsState::Install => TxMode::Install,
                TsState::Update => TxMode::Update,
                TsState::Erase => TxMode::Erase,
            },
        }
    }

    /// Marks the member as pulled in to satisfy a dependency of `po`.
    pub fn set_as_dep(&mut self, po: Arc<Package>) {
        self.is_dep = true;
        self.reason = Reason::Dep;
        self.depends_on.push(po);
    }
}

impl Display for TxMember {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{} - {}", self.po, self.output_state)
    }
}

/// The in-progress transaction plan.
///
/// Members live in an id-keyed arena with a NEVRA index; at most one member
/// exists per (NEVRA, requested action). Cross references between members
/// are held as package handles, which never point back at members, so the
/// graph stays acyclic.
#[derive(Debug, Default)]
pub struct TransactionData {
    members: BTreeMap<TxMemberId, TxMember>,
    by_nevra: BTreeMap<Nevra, Vec<TxMemberId>>,
    next_id: usize,
    /// Transaction-level RPM problem filters accumulated across operations.
    pub prob_filter_flags: BTreeSet<ProbFilter>,
    /// Pending conditional installs: once a member with the key name enters
    /// an install state, the listed packages are installed along.
    pub conditionals: BTreeMap<Name, Vec<Arc<Package>>>,
    /// Whether the set changed since the flag was last cleared.
    pub changed: bool,
}

impl TransactionData {
    /// Creates an empty transaction set.
    pub fn new() -> Self {
        TransactionData::default()
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns whether the transaction set holds no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns a member by id.
    pub fn member(&self, id: TxMemberId) -> Option<&TxMember> {
        self.members.get(&id)
    }

    /// Returns a member by id for modification.
    pub fn member_mut(&mut self, id: TxMemberId) -> Option<&mut TxMember> {
        self.members.get_mut(&id)
    }

    /// Returns all member ids in insertion order.
    pub fn member_ids(&self) -> Vec<TxMemberId> {
        self.members.keys().copied().collect()
    }

    /// Returns the identities of all members.
    pub fn member_nevras(&self) -> BTreeSet<Nevra> {
        self.members
            .values()
            .map(|member| member.nevra().clone())
            .collect()
    }

    /// Returns the identities that are on the system once the transaction
    /// applies.
    pub fn installing_nevras(&self) -> BTreeSet<Nevra> {
        self.members
            .values()
            .filter(|member| TS_INSTALL_STATES.contains(&member.output_state))
            .map(|member| member.nevra().clone())
            .collect()
    }

    /// Returns whether any member exists for the given identity.
    pub fn exists(&self, nevra: &Nevra) -> bool {
        self.by_nevra.contains_key(nevra)
    }

    /// Returns the member ids for one identity, or all members.
    pub fn get_members(&self, nevra: Option<&Nevra>) -> Vec<TxMemberId> {
        match nevra {
            Some(nevra) => self.by_nevra.get(nevra).cloned().unwrap_or_default(),
            None => self.member_ids(),
        }
    }

    /// Returns the member ids for an identity (or all) restricted to the
    /// given output states.
    pub fn members_with_state(
        &self,
        nevra: Option<&Nevra>,
        states: &[OutputState],
    ) -> Vec<TxMemberId> {
        self.get_members(nevra)
            .into_iter()
            .filter(|id| {
                self.members
                    .get(id)
                    .is_some_and(|member| states.contains(&member.output_state))
            })
            .collect()
    }

    /// Returns the member ids matching a partial NEVRA predicate.
    pub fn match_naevr(&self, query: &NevraQuery) -> Vec<TxMemberId> {
        self.members
            .iter()
            .filter(|(_, member)| query.matches(member.nevra()))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns the aggregate mode of the members matching the predicate:
    /// an update wins over an install, which wins over anything else.
    pub fn get_mode(&self, query: &NevraQuery) -> Option<TxMode> {
        let modes: Vec<TxMode> = self
            .match_naevr(query)
            .into_iter()
            .filter_map(|id| self.members.get(&id))
            .map(TxMember::mode)
            .collect();
        if modes.contains(&TxMode::Update) {
            Some(TxMode::Update)
        } else if modes.contains(&TxMode::Install) {
            Some(TxMode::Install)
        } else {
            modes.first().copied()
        }
    }

    /// Adds a fresh install member.
    pub fn add_install(&mut self, po: Arc<Package>) -> TxMemberId {
        self.add(TxMember::new(po, TsState::Install, OutputState::Install))
    }

    /// Adds an update member for `po`, replacing `oldpo`.
    ///
    /// The old package gets its own member marking it as leaving the
    /// installed set, with the reverse link recorded.
    pub fn add_update(&mut self, po: Arc<Package>, oldpo: Arc<Package>) -> TxMemberId {
        let id = self.add(TxMember::new(
            po.clone(),
            TsState::Update,
            OutputState::Update,
        ));
        if let Some(member) = self.member_mut(id) {
            if !member.updates.contains(&oldpo) {
                member.updates.push(oldpo.clone());
            }
        }
        let old_id = self.add(TxMember::new(
            oldpo,
            TsState::Erase,
            OutputState::Updated,
        ));
        if let Some(old) = self.member_mut(old_id) {
            if !old.updated_by.contains(&po) {
                old.updated_by.push(po.clone());
                old.relatedto.push((po, RelatedKind::UpdatedBy));
            }
        }
        id
    }

    /// Adds an erase member.
    pub fn add_erase(&mut self, po: Arc<Package>) -> TxMemberId {
        self.add(TxMember::new(po, TsState::Erase, OutputState::Erase))
    }

    /// Adds an obsoleting member for `po`, superseding the installed
    /// `oldpo`.
    pub fn add_obsoleting(&mut self, po: Arc<Package>, oldpo: Arc<Package>) -> TxMemberId {
        let id = self.add(TxMember::new(
            po,
            TsState::Update,
            OutputState::Obsoleting,
        ));
        if let Some(member) = self.member_mut(id) {
            if !member.obsoletes.contains(&oldpo) {
                member.obsoletes.push(oldpo);
            }
        }
        id
    }

    /// Adds the member marking `oldpo` as superseded by `obsoleting_po`.
    pub fn add_obsoleted(
        &mut self,
        oldpo: Arc<Package>,
        obsoleting_po: Arc<Package>,
    ) -> TxMemberId {
        let id = self.add(TxMember::new(
            oldpo,
            TsState::Erase,
            OutputState::Obsoleted,
        ));
        if let Some(member) = self.member_mut(id) {
            if !member.obsoleted_by.contains(&obsoleting_po) {
                member.obsoleted_by.push(obsoleting_po.clone());
                member
                    .relatedto
                    .push((obsoleting_po, RelatedKind::ObsoletedBy));
            }
        }
        id
    }

    /// Removes every member of an identity and drops all references other
    /// members hold to it.
    pub fn remove(&mut self, nevra: &Nevra) {
        let Some(ids) = self.by_nevra.remove(nevra) else {
            return;
        };
        for id in ids {
            self.members.remove(&id);
        }
        for member in self.members.values_mut() {
            member.updates.retain(|po| po.nevra() != nevra);
            member.updated_by.retain(|po| po.nevra() != nevra);
            member.obsoletes.retain(|po| po.nevra() != nevra);
            member.obsoleted_by.retain(|po| po.nevra() != nevra);
            member.depends_on.retain(|po| po.nevra() != nevra);
            member.relatedto.retain(|(po, _)| po.nevra() != nevra);
        }
        self.changed = true;
    }

    /// Removes a single member, leaving every other member's links intact.
    pub(crate) fn remove_member(&mut self, id: TxMemberId) {
        let Some(member) = self.members.remove(&id) else {
            return;
        };
        let nevra = member.nevra().clone();
        if let Some(ids) = self.by_nevra.get_mut(&nevra) {
            ids.retain(|known| *known != id);
            if ids.is_empty() {
                self.by_nevra.remove(&nevra);
            }
        }
        self.changed = true;
    }

    /// Returns whether the identity is superseded by an obsoleting member.
    pub fn is_obsoleted(&self, nevra: &Nevra) -> bool {
        !self
            .members_with_state(Some(nevra), &[OutputState::Obsoleted])
            .is_empty()
    }

    /// Returns the packages of install-state members satisfying the
    /// provides requirement `req`.
    pub fn get_provides(&self, req: &Relation) -> Vec<Arc<Package>> {
        let mut result = Vec::new();
        let mut seen: BTreeSet<Nevra> = BTreeSet::new();
        for member in self.members.values() {
            if !TS_INSTALL_STATES.contains(&member.output_state) {
                continue;
            }
            if member.po.check_provides(req) && seen.insert(member.nevra().clone()) {
                result.push(Arc::clone(&member.po));
            }
        }
        result
    }

    /// Returns install-state members requiring something the provide
    /// `prov` satisfies, with the matching requirement entries.
    pub fn get_requires(&self, prov: &Relation) -> Vec<(Arc<Package>, Vec<Relation>)> {
        let mut result = Vec::new();
        let mut seen: BTreeSet<Nevra> = BTreeSet::new();
        for member in self.members.values() {
            if !TS_INSTALL_STATES.contains(&member.output_state) {
                continue;
            }
            let matching: Vec<Relation> = member
                .po
                .requires()
                .iter()
                .filter(|req| range_compare(req, prov))
                .cloned()
                .collect();
            if !matching.is_empty() && seen.insert(member.nevra().clone()) {
                result.push((Arc::clone(&member.po), matching));
            }
        }
        result
    }

    /// Returns the ids of members the resolver has not processed yet.
    pub fn unresolved_members(&self) -> Vec<TxMemberId> {
        self.members
            .iter()
            .filter(|(_, member)| !member.resolved)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Marks a member as processed for the current resolver pass.
    pub fn mark_resolved(&mut self, id: TxMemberId) {
        if let Some(member) = self.members.get_mut(&id) {
            member.resolved = true;
        }
    }

    /// Clears the per-pass resolved flags; `hard` also drops the
    /// derivation metadata accumulated by earlier passes.
    pub fn reset_resolved(&mut self, hard: bool) {
        for member in self.members.values_mut() {
            member.resolved = false;
            if hard {
                member.depends_on.clear();
                member
                    .relatedto
                    .retain(|(_, kind)| *kind != RelatedKind::DependsOn);
            }
        }
    }

    /// Remembers packages to install once a package named `condition`
    /// enters the transaction.
    pub fn add_conditional(&mut self, condition: Name, packages: Vec<Arc<Package>>) {
        self.conditionals.entry(condition).or_default().extend(packages);
    }

    fn add(&mut self, member: TxMember) -> TxMemberId {
        // at most one member per identity and requested action
        if let Some(ids) = self.by_nevra.get(member.po.nevra()) {
            if let Some(existing) = ids.iter().copied().find(|id| {
                self.members
                    .get(id)
                    .is_some_and(|known| known.ts_state == member.ts_state)
            }) {
                debug!("Package: {} - already in transaction set", member.po);
                return existing;
            }
        }

        let id = TxMemberId(self.next_id);
        self.next_id += 1;
        let trigger = Arc::clone(&member.po);
        let install_side = TS_INSTALL_STATES.contains(&member.output_state);
        self.by_nevra
            .entry(member.po.nevra().clone())
            .or_default()
            .push(id);
        self.members.insert(id, member);
        self.changed = true;

        if install_side {
            if let Some(pending) = self.conditionals.get(trigger.name()).cloned() {
                for po in pending {
                    if self.exists(po.nevra()) {
                        continue;
                    }
                    let conditional_id = self.add_install(po);
                    if let Some(member) = self.member_mut(conditional_id) {
                        member.set_as_dep(Arc::clone(&trigger));
                    }
                }
            }
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rpmtx_sack::RepoId;
    use testresult::TestResult;

    use super::*;

    fn available(nevra: &str) -> Arc<Package> {
        Package::available(Nevra::from_str(nevra).unwrap(), RepoId::new("fedora")).build()
    }

    fn installed(nevra: &str) -> Arc<Package> {
        Package::installed(Nevra::from_str(nevra).unwrap()).build()
    }

    #[test]
    fn update_links_both_sides() -> TestResult {
        let mut tx = TransactionData::new();
        let new = available("zsh-2-1.i386");
        let old = installed("zsh-1-1.i386");
        let id = tx.add_update(Arc::clone(&new), Arc::clone(&old));

        let member = tx.member(id).unwrap();
        assert_eq!(member.mode(), TxMode::Update);
        assert_eq!(member.updates, [Arc::clone(&old)]);

        let old_ids = tx.members_with_state(Some(old.nevra()), &[OutputState::Updated]);
        assert_eq!(old_ids.len(), 1);
        let old_member = tx.member(old_ids[0]).unwrap();
        assert_eq!(old_member.ts_state, TsState::Erase);
        assert_eq!(old_member.mode(), TxMode::Updated);
        assert_eq!(old_member.updated_by, [new]);
        Ok(())
    }

    #[test]
    fn one_member_per_identity_and_action() -> TestResult {
        let mut tx = TransactionData::new();
        let po = available("zsh-2-1.i386");
        let first = tx.add_install(Arc::clone(&po));
        let second = tx.add_install(Arc::clone(&po));
        assert_eq!(first, second);
        assert_eq!(tx.len(), 1);
        Ok(())
    }

    #[test]
    fn get_mode_prefers_update_over_install() -> TestResult {
        let mut tx = TransactionData::new();
        tx.add_install(available("zsh-2-1.i386"));
        tx.add_update(available("zsh-3-1.x86_64"), installed("zsh-1-1.x86_64"));

        assert_eq!(tx.get_mode(&NevraQuery::name("zsh")), Some(TxMode::Update));
        assert_eq!(
            tx.get_mode(&NevraQuery::from_nevra(&Nevra::from_str("zsh-1-1.x86_64")?)),
            Some(TxMode::Updated)
        );
        assert_eq!(tx.get_mode(&NevraQuery::name("bash")), None);
        Ok(())
    }

    #[test]
    fn remove_drops_back_references() -> TestResult {
        let mut tx = TransactionData::new();
        let new = available("zsh-2-1.i386");
        let old = installed("zsh-1-1.i386");
        let id = tx.add_update(Arc::clone(&new), Arc::clone(&old));

        tx.remove(old.nevra());
        assert!(!tx.exists(old.nevra()));
        assert!(tx.member(id).unwrap().updates.is_empty());
        Ok(())
    }

    #[test]
    fn provides_cover_install_states_only() -> TestResult {
        let mut tx = TransactionData::new();
        tx.add_update(available("zsh-2-1.i386"), installed("zsh-1-1.i386"));

        let new_req = Relation::from_str("zsh = 2-1")?;
        let old_req = Relation::from_str("zsh = 1-1")?;
        assert_eq!(tx.get_provides(&new_req).len(), 1);
        assert!(tx.get_provides(&old_req).is_empty());
        Ok(())
    }

    #[test]
    fn conditional_installs_trigger_on_add() -> TestResult {
        let mut tx = TransactionData::new();
        let doc = available("zsh-doc-1-1.noarch");
        tx.add_conditional(Name::from_str("zsh")?, vec![Arc::clone(&doc)]);

        tx.add_install(available("zsh-2-1.i386"));
        assert!(tx.exists(doc.nevra()));
        let ids = tx.get_members(Some(doc.nevra()));
        let member = tx.member(ids[0]).unwrap();
        assert!(member.is_dep);
        assert_eq!(member.reason, Reason::Dep);
        Ok(())
    }

    #[test]
    fn obsolete_members_report_obsoleted() -> TestResult {
        let mut tx = TransactionData::new();
        let bar = available("bar-2-1.i386");
        let foo = installed("foo-1-1.i386");
        tx.add_obsoleting(Arc::clone(&bar), Arc::clone(&foo));
        tx.add_obsoleted(Arc::clone(&foo), Arc::clone(&bar));

        assert!(tx.is_obsoleted(foo.nevra()));
        assert!(!tx.is_obsoleted(bar.nevra()));
        let old_ids = tx.members_with_state(Some(foo.nevra()), &TS_REMOVE_STATES);
        assert_eq!(old_ids.len(), 1);
        assert_eq!(tx.member(old_ids[0]).unwrap().mode(), TxMode::Obsoleted);
        Ok(())
    }
}
