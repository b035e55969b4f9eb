//! Group expansion and local-install scenarios.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use rpmtx_sack::{Package, PackageBuilder, PackageSack, Repo, RepoId, RpmDb};
use rpmtx_solve::{ComposedGroups, Config, Engine, Error, PackageGroup, RES_OK};
use rpmtx_types::{Architecture, Nevra, Relation};
use testresult::TestResult;

fn repo() -> RepoId {
    RepoId::new("test-repo")
}

fn available(nevra: &str) -> PackageBuilder {
    Package::available(Nevra::from_str(nevra).unwrap(), repo())
}

fn installed(nevra: &str) -> PackageBuilder {
    Package::installed(Nevra::from_str(nevra).unwrap())
}

fn engine_with_groups(
    installed: Vec<Arc<Package>>,
    available: Vec<Arc<Package>>,
    groups: ComposedGroups,
    conf: Config,
) -> Engine {
    let mut sack = PackageSack::new();
    sack.add_repo(Repo::new(repo()));
    for po in available {
        sack.add_package(po);
    }
    Engine::new(sack, RpmDb::new(installed), conf, Architecture::I386)
        .unwrap()
        .with_groups(groups)
}

fn shells_group() -> ComposedGroups {
    let mut group = PackageGroup::new("shells", "Shells");
    group.mandatory_packages.push("bash".to_string());
    group.default_packages.push("zsh".to_string());
    group.optional_packages.push("fish".to_string());
    group
        .conditional_packages
        .push(("zsh-doc".to_string(), "zsh".to_string()));
    let mut groups = ComposedGroups::new();
    groups.add_group(group, false);
    groups
}

fn shells_packages() -> Vec<Arc<Package>> {
    ["bash-1-1.i386", "zsh-1-1.i386", "fish-1-1.i386", "zsh-doc-1-1.i386"]
        .into_iter()
        .map(|nevra| available(nevra).build())
        .collect()
}

fn result_set(engine: &Engine) -> Vec<String> {
    engine
        .transaction_result()
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn group_selection_honors_package_types_and_conditionals() -> TestResult {
    let mut engine =
        engine_with_groups(vec![], shells_packages(), shells_group(), Config::default());
    engine.select_group("shells")?;
    let (code, messages) = engine.build_transaction()?;

    assert_eq!(code, RES_OK, "{messages:?}");
    // mandatory and default members come in, the optional one does not;
    // the conditional fires because zsh ends up installed
    assert_eq!(
        result_set(&engine),
        ["bash-1-1.i386", "zsh-1-1.i386", "zsh-doc-1-1.i386"]
    );
    Ok(())
}

#[test]
fn at_prefixed_install_forwards_to_group_selection() -> TestResult {
    let mut engine =
        engine_with_groups(vec![], shells_packages(), shells_group(), Config::default());
    engine.install("@shells")?;
    assert!(!engine.tx().is_empty());
    Ok(())
}

#[test]
fn unknown_group_is_an_error() {
    let mut engine =
        engine_with_groups(vec![], shells_packages(), shells_group(), Config::default());
    assert!(matches!(
        engine.select_group("nosuch"),
        Err(Error::GroupsError(_))
    ));
    assert!(matches!(
        engine.group_remove("nosuch"),
        Err(Error::GroupsError(_))
    ));
}

#[test]
fn pending_conditional_fires_on_later_install() -> TestResult {
    // zsh is neither installed nor part of the group request, so the
    // conditional is remembered; a later zsh install triggers it
    let mut groups = shells_group();
    if let Some(group) = groups.return_group_mut("shells") {
        group.default_packages.clear();
    }
    let mut engine = engine_with_groups(vec![], shells_packages(), groups, Config::default());
    engine.select_group("shells")?;
    assert!(
        !engine
            .tx()
            .exists(&Nevra::from_str("zsh-doc-1-1.i386")?)
    );

    engine.install("zsh")?;
    assert!(engine.tx().exists(&Nevra::from_str("zsh-doc-1-1.i386")?));
    Ok(())
}

#[test]
fn conditionals_can_be_disabled() -> TestResult {
    let mut conf = Config::default();
    conf.enable_group_conditionals = false;
    let mut engine = engine_with_groups(vec![], shells_packages(), shells_group(), conf);
    engine.select_group("shells")?;
    let (code, _) = engine.build_transaction()?;

    assert_eq!(code, RES_OK);
    assert_eq!(result_set(&engine), ["bash-1-1.i386", "zsh-1-1.i386"]);
    Ok(())
}

#[test]
fn deselect_drops_members_with_no_other_group() -> TestResult {
    let mut engine =
        engine_with_groups(vec![], shells_packages(), shells_group(), Config::default());
    engine.select_group("shells")?;
    assert!(!engine.tx().is_empty());

    engine.deselect_group("shells")?;
    assert!(
        !engine.tx().exists(&Nevra::from_str("bash-1-1.i386")?),
        "members whose only group association disappears fall out"
    );
    Ok(())
}

#[test]
fn group_remove_erases_installed_members() -> TestResult {
    let mut engine = engine_with_groups(
        vec![
            installed("bash-1-1.i386").build(),
            installed("zsh-1-1.i386").build(),
        ],
        vec![],
        shells_group(),
        Config::default(),
    );
    engine.group_remove("shells")?;
    let (code, messages) = engine.build_transaction()?;

    assert_eq!(code, RES_OK, "{messages:?}");
    assert_eq!(result_set(&engine), Vec::<String>::new());
    Ok(())
}

#[test]
fn local_package_installs_or_updates() -> TestResult {
    let mut engine = engine_with_groups(
        vec![installed("zsh-1-1.i386").build()],
        vec![],
        ComposedGroups::new(),
        Config::default(),
    );

    // a newer local copy updates the installed one
    let local = Package::local(
        Nevra::from_str("zsh-2-1.i386")?,
        PathBuf::from("/tmp/zsh-2-1.i386.rpm"),
    )
    .build();
    engine.install_local(Arc::clone(&local), false)?;
    let (code, messages) = engine.build_transaction()?;
    assert_eq!(code, RES_OK, "{messages:?}");
    assert_eq!(result_set(&engine), ["zsh-2-1.i386"]);
    Ok(())
}

#[test]
fn local_package_update_only_skips_fresh_installs() -> TestResult {
    let mut engine = engine_with_groups(
        vec![],
        vec![],
        ComposedGroups::new(),
        Config::default(),
    );
    let local = Package::local(
        Nevra::from_str("zsh-2-1.i386")?,
        PathBuf::from("/tmp/zsh-2-1.i386.rpm"),
    )
    .build();

    let members = engine.install_local(local, true)?;
    assert!(members.is_empty());
    assert!(engine.tx().is_empty());
    Ok(())
}

#[test]
fn older_local_package_is_ignored() -> TestResult {
    let mut engine = engine_with_groups(
        vec![installed("zsh-2-1.i386").build()],
        vec![],
        ComposedGroups::new(),
        Config::default(),
    );
    let local = Package::local(
        Nevra::from_str("zsh-1-1.i386")?,
        PathBuf::from("/tmp/zsh-1-1.i386.rpm"),
    )
    .build();

    let members = engine.install_local(local, false)?;
    assert!(members.is_empty());
    Ok(())
}

#[test]
fn local_requirements_resolve_from_repositories() -> TestResult {
    let mut engine = engine_with_groups(
        vec![],
        vec![
            available("libfoo-1-1.i386")
                .provides(Relation::from_str("libfoo = 1-1")?)
                .build(),
        ],
        ComposedGroups::new(),
        Config::default(),
    );
    let local = Package::local(
        Nevra::from_str("app-1-1.i386")?,
        PathBuf::from("/tmp/app-1-1.i386.rpm"),
    )
    .requires(Relation::from_str("libfoo")?)
    .build();

    engine.install_local(local, false)?;
    let (code, messages) = engine.build_transaction()?;
    assert_eq!(code, RES_OK, "{messages:?}");
    assert_eq!(result_set(&engine), ["app-1-1.i386", "libfoo-1-1.i386"]);
    Ok(())
}
