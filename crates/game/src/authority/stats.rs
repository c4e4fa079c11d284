#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityStats {
    pub packets_received: u64,
    pub inputs_applied: u64,
    pub snapshots_sent: u64,
    pub decode_failures: u64,
    pub unknown_kinds: u64,
    /// Event and RPC packets, which have no handler yet.
    pub reserved_kinds: u64,
    /// Well-formed packets a client should never send.
    pub unexpected_kinds: u64,
    /// Inputs from peers without a session.
    pub orphan_inputs: u64,
    /// Inputs at or below the last tick applied for that player.
    pub stale_inputs: u64,
}
