//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` backs the coordinator with the real monotonic clock and hands
//! out session identifiers from the OS cryptographic RNG. Behaviour is
//! therefore not reproducible; tests that need determinism supply their own
//! `Environment`.

use roomcast_core::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Session identifiers are the only thing that
/// keeps a stale connection from evicting its replacement, and there is no
/// sensible fallback source.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
