use std::sync::Arc;

use log::trace;
use rpmtx_sack::{Package, PrcoKind};
use rpmtx_types::{Architecture, arch_distance, best_arch_from};

/// Returns how many leading characters two package names share, with a
/// floor of `2` so that trivially short overlaps do not dominate.
fn common_prefix_len(x: &str, y: &str) -> usize {
    let num = x.len().min(y.len());
    for (offset, (a, b)) in x.bytes().zip(y.bytes()).enumerate() {
        if a != b {
            return offset.max(2);
        }
    }
    num.max(2)
}

/// Returns whether two packages were built from the same source RPM.
fn common_sourcerpm(x: &Package, y: &Package) -> bool {
    match (x.sourcerpm(), y.sourcerpm()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Picks the better provider between the current `best` and each other
/// candidate, for a requirement of `requirer`.
///
/// The tie-break rules, first difference wins:
///
/// 1. a candidate obsoleting the current best wins, unless the best
///    obsoletes it back (mutually obsoleting providers are doom, but
///    keeping the best breaks the oscillation);
/// 2. smaller architecture distance to the requirer; an incompatible best
///    is abandoned outright on multilib systems;
/// 3. sharing the requirer's source RPM;
/// 4. a longer common name prefix with the requirer;
/// 5. a shorter package name;
/// 6. the better architecture, on `noarch` requirers only.
///
/// Callers iterate this function until the result stops changing.
pub(crate) fn compare_providers(
    candidates: &[Arc<Package>],
    best: &Arc<Package>,
    requirer: &Package,
    canonical_arch: Architecture,
) -> Arc<Package> {
    for po in candidates {
        if po == best {
            continue;
        }

        // if the best is obsoleted by the candidate the obsoleter wins,
        // unless they obsolete each other
        let mut po_obsoletes_best = false;
        for obs in po.obsoletes() {
            if best.in_prco_range(PrcoKind::Provides, obs) {
                po_obsoletes_best = true;
                break;
            }
        }
        if po_obsoletes_best {
            for obs in best.obsoletes() {
                if po.in_prco_range(PrcoKind::Provides, obs) {
                    trace!("best {best} obsoletes po {po}");
                    return Arc::clone(best);
                }
            }
            trace!("po {po} obsoletes best {best}");
            return Arc::clone(po);
        }
        for obs in best.obsoletes() {
            if po.in_prco_range(PrcoKind::Provides, obs) {
                trace!("best {best} obsoletes po {po}");
                return Arc::clone(best);
            }
        }

        if requirer.arch() != Architecture::Noarch {
            let best_dist = arch_distance(requirer.arch(), best.arch());
            if canonical_arch.is_multilib() && best_dist.is_none() {
                // the best's architecture cannot serve the requirer at all
                trace!("better arch in po {po}");
                return Arc::clone(po);
            }

            let po_dist = arch_distance(requirer.arch(), po.arch());
            if let Some(po_dist) = po_dist {
                if best_dist.is_some_and(|best_dist| best_dist > po_dist) {
                    trace!("better arch in po {po}");
                    return Arc::clone(po);
                }
            }
            if best_dist == po_dist {
                let candidate_shares = common_sourcerpm(requirer, po);
                let best_shares = common_sourcerpm(requirer, best);
                if candidate_shares && !best_shares {
                    trace!("po {po} shares a sourcerpm with {requirer}");
                    return Arc::clone(po);
                }
                if best_shares && !candidate_shares {
                    trace!("best {best} shares a sourcerpm with {requirer}");
                    return Arc::clone(best);
                }

                let candidate_prefix =
                    common_prefix_len(requirer.name().inner(), po.name().inner());
                let best_prefix =
                    common_prefix_len(requirer.name().inner(), best.name().inner());
                if candidate_prefix > best_prefix {
                    trace!("po {po} shares more of the name prefix with {requirer}");
                    return Arc::clone(po);
                }
                if candidate_prefix == best_prefix
                    && po.name().inner().len() < best.name().inner().len()
                {
                    trace!("po {po} has a shorter name than best {best}");
                    return Arc::clone(po);
                }
            }
        } else {
            let candidate_shares = common_sourcerpm(requirer, po);
            let best_shares = common_sourcerpm(requirer, best);
            let candidate_prefix = common_prefix_len(requirer.name().inner(), po.name().inner());
            let best_prefix = common_prefix_len(requirer.name().inner(), best.name().inner());
            if candidate_shares && !best_shares {
                trace!("po {po} shares a sourcerpm with {requirer}");
                return Arc::clone(po);
            }
            if best_shares && !candidate_shares {
                trace!("best {best} shares a sourcerpm with {requirer}");
                return Arc::clone(best);
            }
            if candidate_prefix > best_prefix {
                trace!("po {po} shares more of the name prefix with {requirer}");
                return Arc::clone(po);
            }
            if candidate_prefix < best_prefix {
                trace!("best {best} shares more of the name prefix with {requirer}");
                return Arc::clone(best);
            }
            if po.name().inner().len() < best.name().inner().len() {
                trace!("po {po} has a shorter name than best {best}");
                return Arc::clone(po);
            }
            if po.name().inner().len() == best.name().inner().len() {
                let arch = best_arch_from(canonical_arch, &[po.arch(), best.arch()]);
                if arch == Some(po.arch()) && arch != Some(best.arch()) {
                    trace!("better arch in po {po}");
                    return Arc::clone(po);
                }
            }
        }
    }

    Arc::clone(best)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rpmtx_sack::RepoId;
    use rpmtx_types::{Nevra, Relation};
    use testresult::TestResult;

    use super::*;

    fn pkg(nevra: &str) -> Arc<Package> {
        Package::available(Nevra::from_str(nevra).unwrap(), RepoId::new("fedora")).build()
    }

    fn pick(
        candidates: &[Arc<Package>],
        requirer: &Package,
        canonical: Architecture,
    ) -> Arc<Package> {
        let mut best = Arc::clone(&candidates[0]);
        let mut old_best: Option<Arc<Package>> = None;
        let mut runs = 0;
        while old_best.as_ref() != Some(&best) {
            assert!(runs < candidates.len() * 2, "provider loop did not settle");
            runs += 1;
            old_best = Some(Arc::clone(&best));
            best = compare_providers(candidates, &best, requirer, canonical);
        }
        best
    }

    #[test]
    fn obsoleter_beats_obsoletee() -> TestResult {
        let old = Package::available(Nevra::from_str("libfoo-1-1.x86_64")?, RepoId::new("fedora"))
            .provides(Relation::from_str("libfoo = 1-1")?)
            .build();
        let new = Package::available(
            Nevra::from_str("libfoo2-1-1.x86_64")?,
            RepoId::new("fedora"),
        )
        .obsoletes(Relation::from_str("libfoo")?)
        .build();
        let requirer = pkg("app-1-1.x86_64");

        let candidates = vec![Arc::clone(&old), Arc::clone(&new)];
        assert_eq!(pick(&candidates, &requirer, Architecture::X86_64), new);
        Ok(())
    }

    #[test]
    fn mutual_obsoletes_keep_the_current_best() -> TestResult {
        let a = Package::available(Nevra::from_str("aaa-1-1.x86_64")?, RepoId::new("fedora"))
            .provides(Relation::from_str("aaa = 1-1")?)
            .obsoletes(Relation::from_str("bbb")?)
            .build();
        let b = Package::available(Nevra::from_str("bbb-1-1.x86_64")?, RepoId::new("fedora"))
            .provides(Relation::from_str("bbb = 1-1")?)
            .obsoletes(Relation::from_str("aaa")?)
            .build();
        let requirer = pkg("app-1-1.x86_64");

        let candidates = vec![Arc::clone(&a), Arc::clone(&b)];
        // starting from either side the loop settles on the start
        assert_eq!(pick(&candidates, &requirer, Architecture::X86_64), a);
        Ok(())
    }

    #[test]
    fn closer_arch_wins() {
        let near = pkg("provider-1-1.x86_64");
        let far = pkg("provider32-1-1.i686");
        let requirer = pkg("app-1-1.x86_64");

        let candidates = vec![Arc::clone(&far), Arc::clone(&near)];
        assert_eq!(pick(&candidates, &requirer, Architecture::X86_64), near);
    }

    #[test]
    fn shared_sourcerpm_wins_on_arch_tie() -> TestResult {
        let kin = Package::available(Nevra::from_str("app-libs-1-1.x86_64")?, RepoId::new("fedora"))
            .sourcerpm("app-1-1.src.rpm")
            .build();
        let stranger = Package::available(
            Nevra::from_str("alternative-1-1.x86_64")?,
            RepoId::new("fedora"),
        )
        .sourcerpm("other-1-1.src.rpm")
        .build();
        let requirer = Package::available(Nevra::from_str("app-1-1.x86_64")?, RepoId::new("fedora"))
            .sourcerpm("app-1-1.src.rpm")
            .build();

        let candidates = vec![Arc::clone(&stranger), Arc::clone(&kin)];
        assert_eq!(pick(&candidates, &requirer, Architecture::X86_64), kin);
        Ok(())
    }

    #[test]
    fn noarch_requirer_prefers_name_prefix_then_shorter_name() {
        let close = pkg("tool-extra-1-1.x86_64");
        let other = pkg("unrelated-1-1.x86_64");
        let requirer = pkg("tool-1-1.noarch");

        let candidates = vec![Arc::clone(&other), Arc::clone(&close)];
        assert_eq!(pick(&candidates, &requirer, Architecture::X86_64), close);

        let long = pkg("implementation-big-1-1.noarch");
        let short = pkg("impl-1-1.noarch");
        let candidates = vec![Arc::clone(&long), Arc::clone(&short)];
        assert_eq!(pick(&candidates, &requirer, Architecture::X86_64), short);
    }

    #[test]
    fn determinism_for_identical_inputs() {
        let a = pkg("aa-1-1.x86_64");
        let b = pkg("ab-1-1.x86_64");
        let requirer = pkg("app-1-1.x86_64");
        let candidates = vec![Arc::clone(&a), Arc::clone(&b)];

        let first = pick(&candidates, &requirer, Architecture::X86_64);
        for _ in 0..5 {
            assert_eq!(pick(&candidates, &requirer, Architecture::X86_64), first);
        }
    }
}
