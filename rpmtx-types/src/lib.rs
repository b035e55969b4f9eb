#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod arch;
pub use arch::{Architecture, arch_distance, best_arch_from, compat_arch_list, multilib_peers};

mod checksum;
pub use checksum::{Checksum, ChecksumKind};

mod error;
pub use error::Error;

mod name;
pub use name::Name;

mod nevra;
pub use nevra::Nevra;

mod relation;
pub use relation::{Relation, obsolete_matches, range_compare};

mod version;
pub use version::{Evr, VersionComparison, evr_cmp, label_compare};
