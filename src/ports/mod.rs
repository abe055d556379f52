//! Collaborator traits the gossip core is generic over: socket I/O, the
//! monotonic clock, and the random source. Keeping these as traits rather
//! than concrete types is what lets `GossipEngine` be driven deterministically
//! in tests (`ChannelTransport` + `FixedClock` + `StepRng`) while a production
//! binary wires in `UdpTransport` + `SystemClock` + `OsRng`.

mod clock;
mod rng;
mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use rng::{OsRng, Rng, StepRng};
pub use transport::{ChannelNetwork, ChannelTransport, Transport, UdpTransport};
