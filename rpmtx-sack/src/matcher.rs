use std::collections::HashMap;
use std::sync::Arc;

use glob::Pattern;

use crate::{Error, Package};

/// Returns whether a user pattern contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', ']'])
}

/// Compiles a user pattern, mapping failures to [`Error::InvalidPattern`].
pub(crate) fn compile_pattern(pattern: &str) -> Result<Pattern, Error> {
    Pattern::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: source.to_string(),
    })
}

/// Builds the lookup dictionary of every string a package can be addressed
/// by: `name`, `name.arch`, `name-version`, `name-version-release`,
/// `name-version-release.arch`, `epoch:name-version-release.arch` and
/// `name-epoch:version-release.arch`.
pub(crate) fn build_pkg_ref_dict(
    packages: &[Arc<Package>],
) -> HashMap<String, Vec<Arc<Package>>> {
    let mut dict: HashMap<String, Vec<Arc<Package>>> = HashMap::new();
    for package in packages {
        let nevra = package.nevra();
        let (n, a, e, v, r) = (
            nevra.name.inner(),
            nevra.arch,
            &nevra.epoch,
            &nevra.version,
            &nevra.release,
        );
        let keys = [
            n.to_string(),
            format!("{n}.{a}"),
            format!("{n}-{v}"),
            format!("{n}-{v}-{r}"),
            format!("{n}-{v}-{r}.{a}"),
            format!("{e}:{n}-{v}-{r}.{a}"),
            format!("{n}-{e}:{v}-{r}.{a}"),
        ];
        for key in keys {
            let entry = dict.entry(key).or_default();
            if !entry.iter().any(|known| Arc::ptr_eq(known, package)) {
                entry.push(Arc::clone(package));
            }
        }
    }
    dict
}

/// Splits user patterns into literal hits, glob hits and leftovers against a
/// package list.
///
/// Returns `(exact, matched, unmatched)`: packages whose lookup strings
/// equal a pattern literally, packages hit by a glob pattern, and the
/// patterns that matched nothing.
pub fn match_package_names(
    packages: &[Arc<Package>],
    patterns: &[&str],
) -> Result<(Vec<Arc<Package>>, Vec<Arc<Package>>, Vec<String>), Error> {
    let dict = build_pkg_ref_dict(packages);
    let mut exact = Vec::new();
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();

    for pattern in patterns {
        if let Some(hits) = dict.get(*pattern) {
            push_unique(&mut exact, hits);
            continue;
        }
        if is_glob(pattern) {
            let compiled = compile_pattern(pattern)?;
            let mut hit_any = false;
            for (key, hits) in &dict {
                if compiled.matches(key) {
                    push_unique(&mut matched, hits);
                    hit_any = true;
                }
            }
            if hit_any {
                continue;
            }
        }
        unmatched.push((*pattern).to_string());
    }

    Ok((exact, matched, unmatched))
}

fn push_unique(target: &mut Vec<Arc<Package>>, hits: &[Arc<Package>]) {
    for hit in hits {
        if !target.iter().any(|known| Arc::ptr_eq(known, hit)) {
            target.push(Arc::clone(hit));
        }
    }
}
