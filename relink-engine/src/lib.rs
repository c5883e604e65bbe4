//! relink-engine - subscription/order reference repair
//!
//! Four independent layers keep a subscription's parent order and owning
//! customer consistent, each triggered at a different point in the lifecycle:
//!
//! - [`normalizer::RowNormalizer`]: fills empty references in the write
//!   payload before a new subscription is committed
//! - [`verifier::PostCreateVerifier`]: read-after-write check right after
//!   checkout creates the subscription
//! - [`backstop::LifecycleBackstop`]: sweep of every subscription under an
//!   order once that order is paid
//! - [`pairing::PairingService`]: administrator-driven link of an orphan,
//!   with [`orphan::OrphanMatcher`] suggesting the likely order
//!
//! [`engine::RepairEngine`] wires all of them over the [`store`] traits.

pub mod backstop;
pub mod engine;
pub mod entitlement;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod model;
pub mod normalizer;
pub mod orphan;
pub mod pairing;
pub mod payload;
pub mod resolver;
pub mod sqlite;
pub mod store;
pub mod verifier;

pub use engine::{EngineSettings, OrphanSuggestion, RepairEngine, Stores};
pub use error::{PairingError, RepairError};
pub use pairing::{PairingReceipt, PairingRequest, PairingResponse};
