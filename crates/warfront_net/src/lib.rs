//! # Warfront Net
//!
//! Keeps several peers on one [`warfront_core`] world without a dedicated
//! server.
//!
//! - [`protocol`]: JSON wire messages and addressing
//! - [`sync`]: optimistic apply-then-broadcast session with host migration
//! - [`phantom`]: bot-driven host for rooms with no human host
//! - [`persistence`]: snapshot stores for the phantom host
//! - [`runner`]: tokio tick loop and the stdio transport
//!
//! Nothing here touches the simulation rules; every state change still
//! goes through the core resolver and tick.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod error;
pub mod ids;
pub mod persistence;
pub mod phantom;
pub mod protocol;
pub mod runner;
pub mod sync;

pub use config::HostConfig;
pub use error::{NetError, Result};
pub use phantom::PhantomHost;
pub use protocol::{Envelope, PeerId, WireMessage};
pub use sync::SyncSession;
