//! Bet lifecycle execution.
//!
//! This crate owns every rule about bets: validation of new and edited bets,
//! the OPEN → LOCKED → RESOLVED state machine, pick recording, resolution,
//! stake settlement and proof submission. It also answers the read queries
//! (feed, explore, pending stakes, stats) over the same entity store.
//!
//! ## Execution model
//! Writes are staged in a [`Layer`] over a [`State`] and applied in one call
//! to [`State::apply`], so a rejected operation leaves the store untouched
//! and a resolution commits the bet together with every stake it creates.
//! [`Engine`] serializes writers of the same bet and stamps every operation
//! with the time of its [`Clock`].
//!
//! ## Deadlines
//! A bet whose deadline has passed is treated as LOCKED by every read and
//! every write, whether or not the transition has been persisted yet.
//! [`Engine::sweep_expired`] persists it.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stake_execution::{Engine, Memory, StaticDirectory, SystemClock};
//!
//! let engine = Engine::new(
//!     Memory::default(),
//!     Arc::new(StaticDirectory::default()),
//!     Arc::new(SystemClock),
//! );
//! let bet = engine.create_bet("host", &request)?;
//! engine.record_pick("alice", &bet.id, &bet.options[0].id).await?;
//! ```

pub mod blob;
pub mod clock;
pub mod directory;
pub mod engine;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod locks;
pub mod metrics;
pub mod query;
pub mod settlement;
pub mod state;
pub mod validation;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod lifecycle_tests;

mod layer;

pub use blob::{proof_object_key, BlobStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::{can_view, Directory, StaticDirectory};
pub use engine::Engine;
pub use error::{Error, Result};
pub use event::Event;
pub use layer::Layer;
pub use lifecycle::{Lifecycle, TransitionResult};
pub use metrics::{LifecycleMetrics, LifecycleSnapshot};
pub use settlement::{partition, Partition, ProofFile};
pub use state::{Key, Memory, Prefix, State, Status, Value};
