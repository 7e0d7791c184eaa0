//! Sender configuration

use crate::network::sender::DEFAULT_TIMEOUT_SECS;

/// Configuration for building a [`PacketSender`](crate::PacketSender).
///
/// The receive timeout is seconds plus microseconds, both non-negative,
/// and is fixed for the sender's lifetime.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Interface to send through when the caller names none; `None` picks
    /// the first usable interface.
    pub interface: Option<String>,
    /// Receive timeout, whole seconds.
    pub timeout_secs: i64,
    /// Receive timeout, additional microseconds.
    pub timeout_usecs: i64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            interface: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            timeout_usecs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_two_seconds() {
        let config = SenderConfig::default();
        assert_eq!(config.timeout_secs, 2);
        assert_eq!(config.timeout_usecs, 0);
        assert!(config.interface.is_none());
    }
}
