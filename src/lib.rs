//! # Pubsync
//!
//! Lifetime-bounded publish/subscribe synchronization over named-data
//! packet networks.
//!
//! Pubsync keeps a set of named, signed publications loosely consistent
//! among an arbitrary group of peers. Each peer summarizes its active set
//! in an Invertible Bloom Lookup Table (IBLT) carried inside a sync request
//! name; a single round trip tells a peer which publications to hand over.
//! Publications expire by a lifetime bound, so no delete messages exist.
//!
//! ## Features
//!
//! - **IBLT set sketch**: insert, erase, cell-wise difference, and peel
//!   decoding, with a zlib-compressed wire encoding
//! - **Sans-IO engine**: a deterministic state machine driven by events,
//!   with timers as data
//! - **Replay resistance**: publisher timestamps bound each publication's
//!   lifetime and are covered by the signature
//! - **Tokio driver** (feature `async`): runs the engine over any packet
//!   transport
//!
//! ## Example
//!
//! ```rust
//! use std::time::Instant;
//! use pubsync::{InEvent, Name, SyncBuilder, SyncPubsub};
//!
//! let config = SyncBuilder::new(Name::from("/demo/sync"))
//!     .expected_entries(32)
//!     .build();
//! let mut engine = SyncPubsub::new(config);
//!
//! // The host confirms prefix registration, then carries out the
//! // engine's outputs: send packets, schedule timers.
//! for out in engine.handle(InEvent::RegisterConfirmed, Instant::now()) {
//!     println!("{out:?}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

#[cfg(feature = "async")]
pub mod driver;
mod engine;
mod error;
pub mod hash;
mod iblt;
mod name;
mod publication;
pub mod wire;

pub use engine::{
    ClockFn, Command, FilterPubsCb, InEvent, IsExpiredCb, OutEvent, SyncBuilder, SyncConfig,
    SyncPubsub, SyncStats, Timer, UpdateCb, DEFAULT_EXPECTED_ENTRIES, DEFAULT_MAX_CLOCK_SKEW,
    DEFAULT_MAX_PAYLOAD, DEFAULT_PUB_LIFETIME, DEFAULT_REQUEST_LIFETIME,
};
pub use error::{PubsyncError, Result};
pub use iblt::{Iblt, Peeled};
pub use name::{Component, Name};
pub use publication::{AcceptAll, Blake3Signer, Publication, Signer, Validator};
pub use wire::ChecksumValidator;
