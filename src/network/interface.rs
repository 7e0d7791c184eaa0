//! Network interface identity
//!
//! The engine only needs an interface's name (for binding capture devices)
//! and OS index (for link-layer addressing and per-interface channel keys).
//! Enumeration and address resolution stay with the caller; lookup goes
//! through `pnet`.

use pnet::datalink;

use crate::network::errors::ChannelError;

/// Name plus OS index of a network interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkInterface {
    name: String,
    index: u32,
}

impl NetworkInterface {
    /// Look up an interface by name.
    pub fn from_name(name: &str) -> Result<Self, ChannelError> {
        datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .map(|iface| NetworkInterface {
                name: iface.name,
                index: iface.index,
            })
            .ok_or_else(|| ChannelError::UnknownInterface(name.to_string()))
    }

    /// Pick a default interface: the first one that is up, not loopback,
    /// and has an address; falling back to any non-loopback interface and
    /// finally to loopback.
    pub fn first_usable() -> Result<Self, ChannelError> {
        let all = datalink::interfaces();
        let picked = all
            .iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .or_else(|| all.iter().find(|iface| !iface.is_loopback()))
            .or_else(|| all.first())
            .ok_or_else(|| ChannelError::UnknownInterface("<default>".to_string()))?;
        Ok(NetworkInterface {
            name: picked.name.clone(),
            index: picked.index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS interface index, used to key per-interface channels.
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_interface_name_fails() {
        let err = NetworkInterface::from_name("definitely-not-an-iface0").unwrap_err();
        assert!(matches!(err, ChannelError::UnknownInterface(_)));
    }

    #[test]
    fn test_first_usable_resolves_something() {
        // Every test environment has at least a loopback interface.
        let iface = NetworkInterface::first_usable().unwrap();
        assert!(!iface.name().is_empty());
    }

    #[test]
    fn test_lookup_roundtrip() {
        let iface = NetworkInterface::first_usable().unwrap();
        let again = NetworkInterface::from_name(iface.name()).unwrap();
        assert_eq!(iface, again);
    }
}
