//! rumormesh — a gossip-based cluster membership and data dissemination
//! engine.
//!
//! Nodes exchange small, fixed-format UDP datagrams to build an eventually
//! consistent view of cluster membership and to rumor-mill application
//! payloads to the rest of the cluster. The core state machine
//! ([`engine::GossipEngine`]) is strictly single-threaded and synchronous:
//! the host drives it via `process_receive`, `process_send`, and `tick`.
//! Socket I/O, the clock, and the RNG are injected through the [`ports`]
//! traits so the engine can be exercised deterministically in tests.

pub mod codec;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod member;
pub mod message;
pub mod ports;
pub mod vector_clock;

pub use config::EngineConfig;
pub use engine::{GossipEngine, GossipState};
pub use error::{Error, Result};
pub use member::{Member, MemberId, MemberSet};
pub use message::{Message, MessageHeader, MessageType};
pub use ports::{Clock, Rng, Transport};
pub use vector_clock::{Comparison, VectorClock, VectorRecord};
