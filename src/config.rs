//! Compile-time tunables and the small amount of runtime configuration a
//! host may reasonably want to override.

/// Wire protocol version. Bump on breaking wire format changes.
pub const PROTOCOL_VERSION: u16 = 1;

/// Magic bytes identifying a rumormesh datagram. Prevents cross-talk with
/// other protocols sharing the same port range.
pub const PROTOCOL_MAGIC: [u8; 5] = *b"ptcs\0";

/// Maximum size of any single datagram, header included.
pub const MESSAGE_MAX_SIZE: usize = 512;

/// Minimum time between retransmission attempts of an un-acked envelope.
pub const MESSAGE_RETRY_INTERVAL_MS: u64 = 10_000;

/// Number of send attempts before an acked-type envelope is abandoned.
pub const MESSAGE_RETRY_ATTEMPTS: u8 = 3;

/// Members per MEMBER_LIST chunk when syncing the full set to a newcomer.
pub const MEMBER_LIST_SYNC_SIZE: usize = 10;

/// Number of random peers a DATA message is fanned out to.
pub const MESSAGE_RUMOR_FACTOR: usize = 3;

/// Capacity of the outbound envelope / output-buffer pool.
pub const MAX_OUTPUT_MESSAGES: usize = 100;

/// Suggested interval between host calls to `GossipEngine::tick`.
pub const GOSSIP_TICK_INTERVAL_MS: u64 = 1_000;

/// Capacity of a vector clock's record ring.
pub const MAX_VECTOR_SIZE: usize = 20;

/// Byte width of a MemberId.
pub const MEMBER_ID_SIZE: usize = 12;

/// Initial capacity of a freshly created member set.
pub const MEMBERS_INITIAL_CAPACITY: usize = 32;

/// Load factor past which a member set's capacity is doubled.
pub const MEMBERS_LOAD_FACTOR: f64 = 0.75;

/// Growth factor applied to member set capacity.
pub const MEMBERS_EXTENSION_FACTOR: usize = 2;

/// Runtime configuration supplied by the host at `GossipEngine::create` time.
pub struct EngineConfig {
    /// Override the bound-in capacity of the output buffer pool. Present
    /// mainly so tests can exercise buffer-pool saturation without waiting
    /// for 100 messages.
    pub max_output_messages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_output_messages: MAX_OUTPUT_MESSAGES,
        }
    }
}
