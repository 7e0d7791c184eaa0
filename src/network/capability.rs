//! Raw socket privilege detection
//!
//! Raw channels need `CAP_NET_RAW` (or root, or Administrator); failed
//! opens from missing privilege dominate real-world failures, so the
//! binary probes up front and explains what is wrong instead of dumping a
//! bare `EPERM`.

use std::sync::OnceLock;

/// Cached result of the capability check.
static CAPABILITY: OnceLock<RawSocketCapability> = OnceLock::new();

/// Result of the raw socket capability check.
#[derive(Debug, Clone)]
pub struct RawSocketCapability {
    pub available: bool,
    pub reason: String,
    pub is_root: bool,
}

impl RawSocketCapability {
    /// A human-readable explanation of the capability status.
    pub fn explanation(&self) -> String {
        if self.available {
            if self.is_root {
                "Running as root - raw sockets available".to_string()
            } else {
                "Raw sockets available (CAP_NET_RAW or equivalent)".to_string()
            }
        } else {
            format!(
                "Raw sockets unavailable: {}. Try: sudo setcap cap_net_raw+ep <binary>",
                self.reason
            )
        }
    }
}

/// Check whether raw sockets can be created in this process. The result is
/// computed once and cached.
pub fn check_raw_socket_capability() -> RawSocketCapability {
    CAPABILITY.get_or_init(do_capability_check).clone()
}

#[cfg(unix)]
fn do_capability_check() -> RawSocketCapability {
    use nix::unistd::Uid;

    if Uid::effective().is_root() {
        return RawSocketCapability {
            available: true,
            reason: "running as root".to_string(),
            is_root: true,
        };
    }

    // Creating a probe socket is the only reliable check for an
    // unprivileged process with file capabilities.
    match try_create_raw_socket() {
        Ok(()) => RawSocketCapability {
            available: true,
            reason: "raw socket creation succeeded".to_string(),
            is_root: false,
        },
        Err(err) => RawSocketCapability {
            available: false,
            reason: format!("raw socket creation failed: {err}"),
            is_root: false,
        },
    }
}

#[cfg(not(unix))]
fn do_capability_check() -> RawSocketCapability {
    match try_create_raw_socket() {
        Ok(()) => RawSocketCapability {
            available: true,
            reason: "raw socket creation succeeded".to_string(),
            is_root: false,
        },
        Err(err) => RawSocketCapability {
            available: false,
            reason: format!("raw socket creation failed: {err} (run as Administrator)"),
            is_root: false,
        },
    }
}

fn try_create_raw_socket() -> std::io::Result<()> {
    use socket2::{Domain, Protocol, Socket, Type};

    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_check_is_stable() {
        let first = check_raw_socket_capability();
        let second = check_raw_socket_capability();
        assert_eq!(first.available, second.available);
        assert_eq!(first.reason, second.reason);
    }

    #[test]
    fn test_explanation_mentions_remedy_when_unavailable() {
        let capability = RawSocketCapability {
            available: false,
            reason: "Operation not permitted".to_string(),
            is_root: false,
        };
        assert!(capability.explanation().contains("setcap"));
    }
}
