//! Replicated ledger engine for a value-transfer network.
//!
//! A ledger is an immutable-once-accepted snapshot of account balances and
//! the transactions that produced it from its parent, chained by header
//! hash. Account state and transactions live in two authenticated maps
//! ([`shamap::ShaMap`]) whose Merkle roots are committed in the header.
//!
//! Typical flow: construct a [`ledger::Ledger`] genesis, `close` it to open
//! the next ledger, feed transactions through
//! [`ledger::Ledger::apply_transaction`], close again, and hand the closed
//! ledger to [`storage::LedgerStore::save_accepted`]. Accepted ledgers are
//! rehydrated by hash or sequence with their map contents loaded lazily
//! from the node blob store.

pub mod config;
pub mod errors;
pub mod ledger;
pub mod serializer;
pub mod shamap;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use errors::{LedgerError, LedgerResult};
pub use ledger::{Ledger, TransResult, LEDGER_HEADER_LEN};
pub use serializer::Serializer;
pub use shamap::{NodeSource, NodeType, NodeWriter, ShaMap};
pub use storage::LedgerStore;
pub use types::{AccountId, AccountState, Hash256, TransStatus, Transaction};
