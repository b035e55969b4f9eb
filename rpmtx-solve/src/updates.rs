use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use rpmtx_types::{
    Architecture, Evr, Name, Nevra, Relation, best_arch_from, arch_distance, evr_cmp,
    obsolete_matches,
};

/// Precomputed update and obsolete relationships between the installed and
/// the available package sets.
///
/// The index works on identities only; the caller feeds it the full
/// installed and available NEVRA lists plus the raw obsoletes entries of
/// the available set, then runs [`Updates::do_updates`],
/// [`Updates::do_obsoletes`] and [`Updates::condense_updates`] in that
/// order.
#[derive(Debug)]
pub struct Updates {
    installed: Vec<Nevra>,
    available: Vec<Nevra>,
    canonical_arch: Architecture,
    /// Only consider updates that keep the installed architecture.
    pub exactarch: bool,
    /// Names held to exact-architecture updates regardless of
    /// [`Updates::exactarch`].
    pub exactarchlist: BTreeSet<String>,
    raw_obsoletes: BTreeMap<Nevra, Vec<Relation>>,
    updating: BTreeMap<Nevra, Vec<Nevra>>,
    updates: BTreeMap<Nevra, Vec<Nevra>>,
    obsoleting: BTreeMap<Nevra, Vec<Nevra>>,
    obsoleted: BTreeMap<Nevra, Vec<Nevra>>,
}

impl Updates {
    /// Creates an index over the given installed and available identities.
    pub fn new(
        installed: Vec<Nevra>,
        available: Vec<Nevra>,
        canonical_arch: Architecture,
    ) -> Self {
        Updates {
            installed,
            available,
            canonical_arch,
            exactarch: true,
            exactarchlist: BTreeSet::new(),
            raw_obsoletes: BTreeMap::new(),
            updating: BTreeMap::new(),
            updates: BTreeMap::new(),
            obsoleting: BTreeMap::new(),
            obsoleted: BTreeMap::new(),
        }
    }

    /// Feeds the obsoletes entries of the available set, keyed by the
    /// obsoleting identity.
    pub fn set_raw_obsoletes(&mut self, raw_obsoletes: BTreeMap<Nevra, Vec<Relation>>) {
        self.raw_obsoletes = raw_obsoletes;
    }

    /// Maps every available identity to the installed identities it
    /// updates.
    pub fn updating_dict(&self) -> &BTreeMap<Nevra, Vec<Nevra>> {
        &self.updating
    }

    /// Maps every installed identity to the available identities updating
    /// it, newest first.
    pub fn updates_dict(&self) -> &BTreeMap<Nevra, Vec<Nevra>> {
        &self.updates
    }

    /// Maps every obsoleting identity to the installed identities it
    /// supersedes.
    pub fn obsoleting_dict(&self) -> &BTreeMap<Nevra, Vec<Nevra>> {
        &self.obsoleting
    }

    /// Maps every superseded installed identity to its obsoleters.
    pub fn obsoleted_dict(&self) -> &BTreeMap<Nevra, Vec<Nevra>> {
        &self.obsoleted
    }

    /// Computes the update relationships.
    pub fn do_updates(&mut self) {
        let installed_by_name = group_by_name(&self.installed);
        let available_by_name = group_by_name(&self.available);

        let mut pairs: Vec<(Nevra, Nevra)> = Vec::new();
        for (name, installed_group) in &installed_by_name {
            let Some(available_group) = available_by_name.get(name) else {
                continue;
            };
            if installed_group.len() == 1 && available_group.len() == 1 {
                // simple case: one installed, one available version
                let old = &installed_group[0];
                if let Some(new) = self.best_candidate(old, available_group) {
                    debug!("simple update {old} -> {new}");
                    pairs.push((new, old.clone()));
                }
            } else {
                // complex case: several versions or architectures per side;
                // the newest copy per installed architecture is compared
                for old in newest_per_arch(installed_group) {
                    if let Some(new) = self.best_candidate(&old, available_group) {
                        debug!("complex update {old} -> {new}");
                        pairs.push((new, old));
                    }
                }
            }
        }

        for (new, old) in pairs {
            push_unique(self.updates.entry(old.clone()).or_default(), new.clone());
            push_unique(self.updating.entry(new).or_default(), old);
        }
        for news in self.updates.values_mut() {
            news.sort_by(|a, b| evr_cmp(&b.evr(), &a.evr()));
        }
    }

    /// Computes the obsolete relationships from the raw obsoletes entries.
    pub fn do_obsoletes(&mut self) {
        for (obsoleter, entries) in &self.raw_obsoletes {
            for entry in entries {
                for installed in &self.installed {
                    if !obsolete_matches(entry, installed.name.inner(), &installed.evr()) {
                        continue;
                    }
                    debug!("{obsoleter} obsoletes installed {installed}");
                    push_unique(
                        self.obsoleting.entry(obsoleter.clone()).or_default(),
                        installed.clone(),
                    );
                    push_unique(
                        self.obsoleted.entry(installed.clone()).or_default(),
                        obsoleter.clone(),
                    );
                }
            }
        }
    }

    /// Collapses update chains: every installed identity keeps only its
    /// highest replacement, and every `(new, old)` pair appears at most
    /// once.
    pub fn condense_updates(&mut self) {
        for (old, news) in &mut self.updates {
            if news.len() <= 1 {
                continue;
            }
            news.sort_by(|a, b| evr_cmp(&b.evr(), &a.evr()));
            let dropped: Vec<Nevra> = news.split_off(1);
            for new in dropped {
                if let Some(olds) = self.updating.get_mut(&new) {
                    olds.retain(|known| known != old);
                    if olds.is_empty() {
                        self.updating.remove(&new);
                    }
                }
            }
        }
    }

    /// Returns all `(new, old)` update pairs.
    pub fn get_updates_tuples(&self) -> Vec<(Nevra, Nevra)> {
        let mut tuples = Vec::new();
        for (old, news) in &self.updates {
            for new in news {
                tuples.push((new.clone(), old.clone()));
            }
        }
        tuples
    }

    /// Returns all `(obsoleter, obsoletee)` pairs; with `newest` only the
    /// highest obsoleter per obsoletee is reported.
    pub fn get_obsoletes_tuples(&self, newest: bool) -> Vec<(Nevra, Nevra)> {
        let mut by_obsoletee: BTreeMap<Nevra, Vec<Nevra>> = BTreeMap::new();
        for (obsoleter, obsoletees) in &self.obsoleting {
            for obsoletee in obsoletees {
                by_obsoletee
                    .entry(obsoletee.clone())
                    .or_default()
                    .push(obsoleter.clone());
            }
        }

        let mut tuples = Vec::new();
        for (obsoletee, mut obsoleters) in by_obsoletee {
            obsoleters.sort_by(|a, b| evr_cmp(&b.evr(), &a.evr()).then_with(|| a.cmp(b)));
            if newest {
                obsoleters.truncate(1);
            }
            for obsoleter in obsoleters {
                tuples.push((obsoleter, obsoletee.clone()));
            }
        }
        tuples
    }

    /// Returns which of the given identities are obsoleted by something in
    /// the available set, mapped to their obsoleters newest first.
    pub fn check_for_obsolete(&self, nevras: &[Nevra]) -> BTreeMap<Nevra, Vec<Nevra>> {
        let mut result: BTreeMap<Nevra, Vec<Nevra>> = BTreeMap::new();
        for nevra in nevras {
            for (obsoleter, entries) in &self.raw_obsoletes {
                if obsoleter == nevra {
                    continue;
                }
                if entries
                    .iter()
                    .any(|entry| obsolete_matches(entry, nevra.name.inner(), &nevra.evr()))
                {
                    result.entry(nevra.clone()).or_default().push(obsoleter.clone());
                }
            }
        }
        for obsoleters in result.values_mut() {
            obsoleters.sort_by(|a, b| evr_cmp(&b.evr(), &a.evr()).then_with(|| a.cmp(b)));
        }
        result
    }

    /// Drops an available identity from the index, as skip-broken does when
    /// it culls a problematic candidate.
    pub fn del_package(&mut self, nevra: &Nevra) {
        self.available.retain(|known| known != nevra);
        self.raw_obsoletes.remove(nevra);
        if let Some(olds) = self.updating.remove(nevra) {
            for old in olds {
                if let Some(news) = self.updates.get_mut(&old) {
                    news.retain(|known| known != nevra);
                    if news.is_empty() {
                        self.updates.remove(&old);
                    }
                }
            }
        }
        if let Some(obsoletees) = self.obsoleting.remove(nevra) {
            for obsoletee in obsoletees {
                if let Some(obsoleters) = self.obsoleted.get_mut(&obsoletee) {
                    obsoleters.retain(|known| known != nevra);
                    if obsoleters.is_empty() {
                        self.obsoleted.remove(&obsoletee);
                    }
                }
            }
        }
    }

    fn is_exact(&self, name: &Name) -> bool {
        self.exactarch || self.exactarchlist.contains(name.inner())
    }

    /// Picks the replacement for one installed identity out of an available
    /// group of the same name.
    ///
    /// Under exact-architecture rules only same-architecture (or noarch)
    /// candidates qualify; `noarch` on the installed side is always exempt,
    /// as an architecture has to be picked from scratch then. Among the
    /// candidates achieving the highest EVR the installed architecture wins,
    /// then the best architecture for the canonical one.
    fn best_candidate(&self, old: &Nevra, available_group: &[Nevra]) -> Option<Nevra> {
        let old_evr = old.evr();
        let exact = self.is_exact(&old.name) && old.arch != Architecture::Noarch;

        let pool: Vec<&Nevra> = available_group
            .iter()
            .filter(|candidate| evr_cmp(&candidate.evr(), &old_evr).is_gt())
            .filter(|candidate| {
                if exact {
                    candidate.arch == old.arch || candidate.arch == Architecture::Noarch
                } else {
                    compatible_arch_change(old.arch, candidate.arch)
                }
            })
            .collect();

        let best_evr: Evr = pool
            .iter()
            .map(|candidate| candidate.evr())
            .max_by(|a, b| evr_cmp(a, b))?;
        let achieving: Vec<&Nevra> = pool
            .into_iter()
            .filter(|candidate| evr_cmp(&candidate.evr(), &best_evr).is_eq())
            .collect();

        if let Some(same) = achieving.iter().find(|candidate| candidate.arch == old.arch) {
            return Some((*same).clone());
        }
        let archs: Vec<Architecture> = achieving.iter().map(|candidate| candidate.arch).collect();
        let best_arch = best_arch_from(self.canonical_arch, &archs)
            .or_else(|| archs.first().copied())?;
        achieving
            .into_iter()
            .find(|candidate| candidate.arch == best_arch)
            .cloned()
    }
}

/// Returns whether an update may move a package from one architecture to
/// another.
///
/// `noarch` transitions in either direction are always possible; between
/// real architectures the two must be compatible one way or the other.
fn compatible_arch_change(old: Architecture, new: Architecture) -> bool {
    old == Architecture::Noarch
        || new == Architecture::Noarch
        || arch_distance(old, new).is_some()
        || arch_distance(new, old).is_some()
}

fn group_by_name(nevras: &[Nevra]) -> BTreeMap<Name, Vec<Nevra>> {
    let mut groups: BTreeMap<Name, Vec<Nevra>> = BTreeMap::new();
    for nevra in nevras {
        groups.entry(nevra.name.clone()).or_default().push(nevra.clone());
    }
    groups
}

fn newest_per_arch(nevras: &[Nevra]) -> Vec<Nevra> {
    let mut newest: BTreeMap<Architecture, Nevra> = BTreeMap::new();
    for nevra in nevras {
        match newest.get(&nevra.arch) {
            Some(known) if evr_cmp(&known.evr(), &nevra.evr()).is_ge() => {}
            _ => {
                newest.insert(nevra.arch, nevra.clone());
            }
        }
    }
    newest.into_values().collect()
}

fn push_unique(target: &mut Vec<Nevra>, nevra: Nevra) {
    if !target.contains(&nevra) {
        target.push(nevra);
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    fn nevras(inputs: &[&str]) -> Vec<Nevra> {
        inputs
            .iter()
            .map(|input| Nevra::from_str(input).unwrap())
            .collect()
    }

    fn index(installed: &[&str], available: &[&str], arch: Architecture) -> Updates {
        let mut up = Updates::new(nevras(installed), nevras(available), arch);
        up.do_updates();
        up
    }

    #[test]
    fn simple_update_is_recorded() {
        let up = index(&["zsh-1-1.i386"], &["zsh-2-1.i386"], Architecture::I386);
        assert_eq!(
            up.get_updates_tuples(),
            [(
                Nevra::from_str("zsh-2-1.i386").unwrap(),
                Nevra::from_str("zsh-1-1.i386").unwrap()
            )]
        );
    }

    #[test]
    fn older_available_is_not_an_update() {
        let up = index(&["zsh-2-1.i386"], &["zsh-1-1.i386"], Architecture::I386);
        assert!(up.get_updates_tuples().is_empty());
    }

    #[rstest]
    // noarch installs may move to the best real architecture
    #[case("zsh-1-1.noarch", &["zsh-2-1.i386", "zsh-2-1.x86_64"], "zsh-2-1.x86_64")]
    #[case("zsh-1-1.noarch", &["zsh-2-1.i386"], "zsh-2-1.i386")]
    // real architectures may move to noarch
    #[case("zsh-1-1.i386", &["zsh-2-1.noarch"], "zsh-2-1.noarch")]
    // exact architecture keeps the installed one
    #[case("zsh-1-1.i386", &["zsh-2-1.i386", "zsh-2-1.x86_64"], "zsh-2-1.i386")]
    fn arch_transitions(
        #[case] installed: &str,
        #[case] available: &[&str],
        #[case] expected: &str,
    ) -> TestResult {
        let up = index(&[installed], available, Architecture::X86_64);
        assert_eq!(
            up.get_updates_tuples(),
            [(Nevra::from_str(expected)?, Nevra::from_str(installed)?)]
        );
        Ok(())
    }

    #[test]
    fn exactarch_skips_cross_arch_updates() {
        let mut up = Updates::new(
            nevras(&["zsh-1-1.i386"]),
            nevras(&["zsh-2-1.x86_64"]),
            Architecture::X86_64,
        );
        up.do_updates();
        assert!(up.get_updates_tuples().is_empty());

        let mut relaxed = Updates::new(
            nevras(&["zsh-1-1.i386"]),
            nevras(&["zsh-2-1.x86_64"]),
            Architecture::X86_64,
        );
        relaxed.exactarch = false;
        relaxed.do_updates();
        assert_eq!(relaxed.get_updates_tuples().len(), 1);
    }

    #[test]
    fn multilib_pairs_update_pairwise() -> TestResult {
        let up = index(
            &["zsh-1-1.i386", "zsh-1-1.x86_64"],
            &["zsh-2-1.i386", "zsh-2-1.x86_64"],
            Architecture::X86_64,
        );
        let mut tuples = up.get_updates_tuples();
        tuples.sort();
        assert_eq!(
            tuples,
            [
                (
                    Nevra::from_str("zsh-2-1.i386")?,
                    Nevra::from_str("zsh-1-1.i386")?
                ),
                (
                    Nevra::from_str("zsh-2-1.x86_64")?,
                    Nevra::from_str("zsh-1-1.x86_64")?
                ),
            ]
        );
        Ok(())
    }

    #[test]
    fn install_only_peers_compare_newest_only() {
        // two installed kernels, the newer one already matching the best
        // available: nothing to update
        let up = index(
            &["kernel-1-1.x86_64", "kernel-2-1.x86_64"],
            &["kernel-2-1.x86_64"],
            Architecture::X86_64,
        );
        assert!(up.get_updates_tuples().is_empty());
    }

    #[test]
    fn condense_keeps_highest_new() -> TestResult {
        let mut up = index(
            &["zsh-1-1.noarch"],
            &["zsh-2-1.noarch", "zsh-3-1.noarch"],
            Architecture::X86_64,
        );
        // both available versions beat the installed one before condensing
        // only for multi-version groups; force the state and condense
        up.updates
            .entry(Nevra::from_str("zsh-1-1.noarch")?)
            .or_default()
            .push(Nevra::from_str("zsh-2-1.noarch")?);
        up.updating
            .entry(Nevra::from_str("zsh-2-1.noarch")?)
            .or_default()
            .push(Nevra::from_str("zsh-1-1.noarch")?);
        up.condense_updates();

        assert_eq!(
            up.get_updates_tuples(),
            [(
                Nevra::from_str("zsh-3-1.noarch")?,
                Nevra::from_str("zsh-1-1.noarch")?
            )]
        );
        assert!(!up.updating_dict().contains_key(&Nevra::from_str("zsh-2-1.noarch")?));
        Ok(())
    }

    #[test]
    fn obsoletes_walk_matches_ranges() -> TestResult {
        let mut up = Updates::new(
            nevras(&["foo-1-1.i386"]),
            nevras(&["bar-2-1.i386"]),
            Architecture::I386,
        );
        up.set_raw_obsoletes(BTreeMap::from([(
            Nevra::from_str("bar-2-1.i386")?,
            vec![Relation::from_str("foo <= 1-1")?],
        )]));
        up.do_obsoletes();

        assert_eq!(
            up.get_obsoletes_tuples(false),
            [(
                Nevra::from_str("bar-2-1.i386")?,
                Nevra::from_str("foo-1-1.i386")?
            )]
        );
        assert_eq!(
            up.obsoleted_dict()
                .get(&Nevra::from_str("foo-1-1.i386")?)
                .map(Vec::len),
            Some(1)
        );
        Ok(())
    }

    #[test]
    fn newest_obsoleter_wins() -> TestResult {
        let mut up = Updates::new(
            nevras(&["foo-1-1.i386"]),
            nevras(&["bar-1-1.i386", "bar-2-1.i386"]),
            Architecture::I386,
        );
        up.set_raw_obsoletes(BTreeMap::from([
            (
                Nevra::from_str("bar-1-1.i386")?,
                vec![Relation::from_str("foo")?],
            ),
            (
                Nevra::from_str("bar-2-1.i386")?,
                vec![Relation::from_str("foo")?],
            ),
        ]));
        up.do_obsoletes();

        assert_eq!(up.get_obsoletes_tuples(false).len(), 2);
        assert_eq!(
            up.get_obsoletes_tuples(true),
            [(
                Nevra::from_str("bar-2-1.i386")?,
                Nevra::from_str("foo-1-1.i386")?
            )]
        );
        Ok(())
    }

    #[test]
    fn del_package_unlinks_everything() -> TestResult {
        let mut up = index(&["zsh-1-1.i386"], &["zsh-2-1.i386"], Architecture::I386);
        up.del_package(&Nevra::from_str("zsh-2-1.i386")?);
        assert!(up.get_updates_tuples().is_empty());
        assert!(up.updating_dict().is_empty());
        Ok(())
    }

    #[test]
    fn check_for_obsolete_reports_candidates() -> TestResult {
        let mut up = Updates::new(vec![], nevras(&["bar-2-1.i386"]), Architecture::I386);
        up.set_raw_obsoletes(BTreeMap::from([(
            Nevra::from_str("bar-2-1.i386")?,
            vec![Relation::from_str("foo <= 1-1")?],
        )]));

        let target = Nevra::from_str("foo-1-1.i386")?;
        let hits = up.check_for_obsolete(std::slice::from_ref(&target));
        assert_eq!(
            hits.get(&target).map(Vec::as_slice),
            Some([Nevra::from_str("bar-2-1.i386")?].as_slice())
        );
        assert!(
            up.check_for_obsolete(&[Nevra::from_str("foo-2-1.i386")?])
                .is_empty()
        );
        Ok(())
    }
}
