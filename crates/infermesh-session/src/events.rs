use infermesh_core::SessionStatus;

/// Typed lifecycle events emitted by a session's main task.
///
/// Consumed over a broadcast receiver; listeners that fall behind lose
/// the oldest events, never the ordering.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Ready { server_version: String },
    StatusChanged(SessionStatus),
    Chunk { message_index: u64, token: String },
    StreamEnd { message_index: u64, total_tokens: u64 },
    CheckpointNotice { checkpoint_index: u64, proof_hash_hex: String, token_range_end: u64 },
    HostError { code: String, message: String, retryable: bool },
    Closed { reason: String },
}
