//! Exchange gateway contract and bundled implementations.
//!
//! Every exchange integration implements [`ExchangeGateway`]: position
//! sync against the exchange's authoritative account state, plus order
//! lookup and cancellation. Wire protocols and authentication live in the
//! gateway implementations, never in the runtime.
//!
//! # Module Structure
//!
//! - [`gateway`]: the trait, error taxonomy, and sync result type
//! - [`paper`]: simulated-order gateway that marks positions locally
//! - [`scripted`]: programmable gateway for tests

mod gateway;
mod paper;
mod scripted;

pub use gateway::{ExchangeGateway, ExchangeSyncResult, GatewayError};
pub use paper::PaperGateway;
pub use scripted::{ScriptedGateway, SyncOutcome};
