#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod error;
pub use error::Error;

mod macros;

mod matcher;
pub use matcher::{is_glob, match_package_names};

mod package;
pub use package::{
    FileEntry, FileKind, Package, PackageBuilder, PackageSizes, PackageSource, PrcoKind,
};

mod repo;
pub use repo::{FilelistSource, Repo, RepoId};

mod rpmdb;
pub use rpmdb::RpmDb;

mod sack;
pub use sack::{
    NevraQuery, PackageSack, PkgKey, PrimaryField, is_primary_path, newest_by_name,
    newest_by_name_arch,
};
