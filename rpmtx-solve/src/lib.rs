#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod best_provider;

mod config;
pub use config::{Config, GroupPackageType, MultilibPolicy};

mod depsolve;
pub use depsolve::{RES_EMPTY, RES_ERROR, RES_OK};

mod engine;
pub use engine::{CancelToken, Engine};

mod error;
pub use error::{Error, exit};

mod groups;
pub use groups::{ComposedGroups, PackageGroup};

mod lock;
pub use lock::PidLock;

mod transaction;
pub use transaction::{
    OutputState, ProbFilter, Reason, RelatedKind, TS_INSTALL_STATES, TS_REMOVE_STATES,
    TransactionData, TsState, TxMember, TxMemberId, TxMode,
};

mod updates;
pub use updates::Updates;
