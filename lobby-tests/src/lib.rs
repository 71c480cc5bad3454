//! Wire-level integration tests for the lobby server.
//!
//! The harness starts the real server on an ephemeral port and drives real
//! TCP clients speaking the binary protocol, so every scenario exercises
//! the codec, the session framing and the fan-out router end to end.

#[cfg(test)]
mod harness;
