//! Link-layer channel backends
//!
//! Raw frame transmission and capture differ per platform: Linux has one
//! process-wide packet socket multiplexing every interface, the BSDs hand
//! out one `/dev/bpf*` device per interface, and a libpcap build drives a
//! per-interface capture handle instead. All three expose the same
//! contract (open, write a frame, hand out a readable descriptor, close)
//! so the channel pool never sees variant-specific details.

use std::os::fd::RawFd;

use pnet::datalink::MacAddr;

use crate::network::errors::ChannelError;
use crate::network::interface::NetworkInterface;
use crate::network::socket_kind::SocketKind;

/// Default scratch-buffer size for one raw read, matching a full Ethernet
/// frame with headroom.
pub const DEFAULT_READ_LEN: usize = 2048;

/// Uniform contract over the platform link-layer backends.
pub trait LinkLayer {
    /// Open the channel for `iface`, if not already open. Idempotent.
    fn open(&mut self, iface: &NetworkInterface) -> Result<(), ChannelError>;

    /// Whether a live channel exists for `iface`.
    fn is_open(&self, iface: &NetworkInterface) -> bool;

    /// Readable/writable descriptor for `iface`'s channel.
    fn fd(&self, iface: &NetworkInterface) -> Result<RawFd, ChannelError>;

    /// Transmit one serialized frame. The channel must already be open.
    fn send_frame(
        &mut self,
        iface: &NetworkInterface,
        dest: MacAddr,
        frame: &[u8],
    ) -> Result<(), ChannelError>;

    /// Close exactly one channel, failing if none is open for `iface`.
    fn close(&mut self, iface: &NetworkInterface) -> Result<(), ChannelError>;

    /// Close every remaining channel, swallowing individual failures.
    fn close_all(&mut self);

    /// Size of the scratch buffer one read from this channel may fill.
    fn read_len(&self, iface: &NetworkInterface) -> usize {
        let _ = iface;
        DEFAULT_READ_LEN
    }
}

/// Close a raw descriptor, surfacing the OS error.
pub(crate) fn close_raw_fd(fd: RawFd, kind: SocketKind) -> Result<(), ChannelError> {
    if unsafe { libc::close(fd) } == -1 {
        Err(ChannelError::close(kind, std::io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

/// Backend selected for this build.
#[cfg(feature = "pcap")]
pub type PlatformLinkLayer = PcapHandles;
#[cfg(all(not(feature = "pcap"), any(target_os = "linux", target_os = "android")))]
pub type PlatformLinkLayer = PacketSocket;
#[cfg(all(
    not(feature = "pcap"),
    any(
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly",
        target_os = "macos",
        target_os = "ios"
    )
))]
pub type PlatformLinkLayer = BpfDevices;

// ---------------------------------------------------------------------------
// Linux: one process-wide AF_PACKET socket bound to all interfaces.
// ---------------------------------------------------------------------------

#[cfg(all(not(feature = "pcap"), any(target_os = "linux", target_os = "android")))]
mod packet_socket {
    use std::io;
    use std::mem;
    use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

    use pnet::datalink::MacAddr;

    use super::{close_raw_fd, LinkLayer};
    use crate::network::errors::ChannelError;
    use crate::network::interface::NetworkInterface;
    use crate::network::socket_kind::SocketKind;

    /// A single `AF_PACKET`/`SOCK_RAW` socket shared by every interface;
    /// the destination interface is picked per send via `sockaddr_ll`.
    #[derive(Debug, Default)]
    pub struct PacketSocket {
        fd: Option<OwnedFd>,
    }

    impl PacketSocket {
        fn link_addr(iface: &NetworkInterface, dest: MacAddr) -> libc::sockaddr_ll {
            let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as u16;
            addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
            addr.sll_ifindex = iface.index() as i32;
            addr.sll_halen = 6;
            addr.sll_addr[..6].copy_from_slice(&dest.octets());
            addr
        }
    }

    impl LinkLayer for PacketSocket {
        fn open(&mut self, _iface: &NetworkInterface) -> Result<(), ChannelError> {
            if self.fd.is_some() {
                return Ok(());
            }
            let fd = unsafe {
                libc::socket(
                    libc::AF_PACKET,
                    libc::SOCK_RAW,
                    i32::from((libc::ETH_P_ALL as u16).to_be()),
                )
            };
            if fd < 0 {
                return Err(ChannelError::open(
                    SocketKind::LinkLayer,
                    io::Error::last_os_error(),
                ));
            }
            tracing::debug!(fd, "opened packet socket");
            self.fd = Some(unsafe { OwnedFd::from_raw_fd(fd) });
            Ok(())
        }

        fn is_open(&self, _iface: &NetworkInterface) -> bool {
            self.fd.is_some()
        }

        fn fd(&self, _iface: &NetworkInterface) -> Result<RawFd, ChannelError> {
            self.fd
                .as_ref()
                .map(AsRawFd::as_raw_fd)
                .ok_or(ChannelError::InvalidChannel(SocketKind::LinkLayer))
        }

        fn send_frame(
            &mut self,
            iface: &NetworkInterface,
            dest: MacAddr,
            frame: &[u8],
        ) -> Result<(), ChannelError> {
            let fd = self.fd(iface)?;
            let addr = Self::link_addr(iface, dest);
            let written = unsafe {
                libc::sendto(
                    fd,
                    frame.as_ptr() as *const libc::c_void,
                    frame.len(),
                    0,
                    &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            if written < 0 {
                return Err(ChannelError::write(
                    SocketKind::LinkLayer,
                    io::Error::last_os_error(),
                ));
            }
            if written as usize != frame.len() {
                return Err(ChannelError::write(
                    SocketKind::LinkLayer,
                    format!("partial write: {written} of {} bytes", frame.len()),
                ));
            }
            Ok(())
        }

        fn close(&mut self, _iface: &NetworkInterface) -> Result<(), ChannelError> {
            let fd = self
                .fd
                .take()
                .ok_or(ChannelError::InvalidChannel(SocketKind::LinkLayer))?;
            close_raw_fd(fd.into_raw_fd(), SocketKind::LinkLayer)
        }

        fn close_all(&mut self) {
            // Dropping the descriptor closes it; failures are irrelevant at
            // teardown.
            self.fd = None;
        }
    }
}

#[cfg(all(not(feature = "pcap"), any(target_os = "linux", target_os = "android")))]
pub use packet_socket::PacketSocket;

// ---------------------------------------------------------------------------
// BSD: one /dev/bpf* device per interface.
// ---------------------------------------------------------------------------

#[cfg(all(
    not(feature = "pcap"),
    any(
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly",
        target_os = "macos",
        target_os = "ios"
    )
))]
mod bpf_devices {
    use std::collections::HashMap;
    use std::fs::OpenOptions;
    use std::io;
    use std::mem;
    use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

    use pnet::datalink::MacAddr;

    use super::{close_raw_fd, LinkLayer, DEFAULT_READ_LEN};
    use crate::network::errors::ChannelError;
    use crate::network::interface::NetworkInterface;
    use crate::network::socket_kind::SocketKind;

    /// Highest /dev/bpfN node probed before giving up.
    const BPF_PROBE_LIMIT: u32 = 256;

    struct BpfChannel {
        fd: OwnedFd,
        buffer_size: usize,
    }

    /// Per-interface BPF capture devices, keyed by interface index.
    #[derive(Default)]
    pub struct BpfDevices {
        channels: HashMap<u32, BpfChannel>,
    }

    fn probe_device() -> Result<OwnedFd, ChannelError> {
        for n in 0..BPF_PROBE_LIMIT {
            match OpenOptions::new()
                .read(true)
                .write(true)
                .open(format!("/dev/bpf{n}"))
            {
                Ok(file) => return Ok(file.into()),
                Err(err) if err.raw_os_error() == Some(libc::EBUSY) => continue,
                Err(err) => return Err(ChannelError::open(SocketKind::LinkLayer, err)),
            }
        }
        Err(ChannelError::open(
            SocketKind::LinkLayer,
            "no available /dev/bpf device",
        ))
    }

    impl LinkLayer for BpfDevices {
        fn open(&mut self, iface: &NetworkInterface) -> Result<(), ChannelError> {
            if self.channels.contains_key(&iface.index()) {
                return Ok(());
            }
            let fd = probe_device()?;

            let mut req: libc::ifreq = unsafe { mem::zeroed() };
            let name = iface.name().as_bytes();
            let len = name.len().min(req.ifr_name.len() - 1);
            for (dst, src) in req.ifr_name.iter_mut().zip(&name[..len]) {
                *dst = *src as libc::c_char;
            }
            if unsafe { libc::ioctl(fd.as_raw_fd(), libc::BIOCSETIF, &req) } < 0 {
                return Err(ChannelError::open(
                    SocketKind::LinkLayer,
                    io::Error::last_os_error(),
                ));
            }

            // Deliver frames as they arrive instead of waiting for a full
            // buffer.
            let immediate: libc::c_uint = 1;
            if unsafe { libc::ioctl(fd.as_raw_fd(), libc::BIOCIMMEDIATE, &immediate) } < 0 {
                return Err(ChannelError::open(
                    SocketKind::LinkLayer,
                    io::Error::last_os_error(),
                ));
            }

            let mut buffer_size: libc::c_uint = 0;
            if unsafe { libc::ioctl(fd.as_raw_fd(), libc::BIOCGBLEN, &mut buffer_size) } < 0 {
                return Err(ChannelError::open(
                    SocketKind::LinkLayer,
                    io::Error::last_os_error(),
                ));
            }

            tracing::debug!(iface = iface.name(), fd = fd.as_raw_fd(), buffer_size, "opened bpf device");
            self.channels.insert(
                iface.index(),
                BpfChannel {
                    fd,
                    buffer_size: buffer_size as usize,
                },
            );
            Ok(())
        }

        fn is_open(&self, iface: &NetworkInterface) -> bool {
            self.channels.contains_key(&iface.index())
        }

        fn fd(&self, iface: &NetworkInterface) -> Result<RawFd, ChannelError> {
            self.channels
                .get(&iface.index())
                .map(|channel| channel.fd.as_raw_fd())
                .ok_or(ChannelError::InvalidChannel(SocketKind::LinkLayer))
        }

        fn send_frame(
            &mut self,
            iface: &NetworkInterface,
            _dest: MacAddr,
            frame: &[u8],
        ) -> Result<(), ChannelError> {
            // The frame already carries its link-layer destination; BPF
            // writes take the whole frame as-is.
            let fd = self.fd(iface)?;
            let written =
                unsafe { libc::write(fd, frame.as_ptr() as *const libc::c_void, frame.len()) };
            if written < 0 {
                return Err(ChannelError::write(
                    SocketKind::LinkLayer,
                    io::Error::last_os_error(),
                ));
            }
            if written as usize != frame.len() {
                return Err(ChannelError::write(
                    SocketKind::LinkLayer,
                    format!("partial write: {written} of {} bytes", frame.len()),
                ));
            }
            Ok(())
        }

        fn close(&mut self, iface: &NetworkInterface) -> Result<(), ChannelError> {
            let channel = self
                .channels
                .remove(&iface.index())
                .ok_or(ChannelError::InvalidChannel(SocketKind::LinkLayer))?;
            close_raw_fd(channel.fd.into_raw_fd(), SocketKind::LinkLayer)
        }

        fn close_all(&mut self) {
            self.channels.clear();
        }

        fn read_len(&self, iface: &NetworkInterface) -> usize {
            self.channels
                .get(&iface.index())
                .map(|channel| channel.buffer_size)
                .unwrap_or(DEFAULT_READ_LEN)
        }
    }
}

#[cfg(all(
    not(feature = "pcap"),
    any(
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly",
        target_os = "macos",
        target_os = "ios"
    )
))]
pub use bpf_devices::BpfDevices;

// ---------------------------------------------------------------------------
// libpcap: one promiscuous capture handle per interface.
// ---------------------------------------------------------------------------

#[cfg(feature = "pcap")]
mod pcap_handles {
    use std::collections::HashMap;
    use std::os::fd::{AsRawFd, RawFd};

    use pnet::datalink::MacAddr;

    use super::LinkLayer;
    use crate::network::errors::ChannelError;
    use crate::network::interface::NetworkInterface;
    use crate::network::socket_kind::SocketKind;

    /// Per-interface libpcap capture handles, keyed by interface index.
    #[derive(Default)]
    pub struct PcapHandles {
        handles: HashMap<u32, pcap::Capture<pcap::Active>>,
    }

    impl LinkLayer for PcapHandles {
        fn open(&mut self, iface: &NetworkInterface) -> Result<(), ChannelError> {
            if self.handles.contains_key(&iface.index()) {
                return Ok(());
            }
            let capture = pcap::Capture::from_device(iface.name())
                .and_then(|inactive| inactive.promisc(true).immediate_mode(true).open())
                .map_err(|err| ChannelError::open(SocketKind::LinkLayer, err))?;
            tracing::debug!(iface = iface.name(), "opened pcap capture handle");
            self.handles.insert(iface.index(), capture);
            Ok(())
        }

        fn is_open(&self, iface: &NetworkInterface) -> bool {
            self.handles.contains_key(&iface.index())
        }

        fn fd(&self, iface: &NetworkInterface) -> Result<RawFd, ChannelError> {
            self.handles
                .get(&iface.index())
                .map(|capture| capture.as_raw_fd())
                .ok_or(ChannelError::InvalidChannel(SocketKind::LinkLayer))
        }

        fn send_frame(
            &mut self,
            iface: &NetworkInterface,
            _dest: MacAddr,
            frame: &[u8],
        ) -> Result<(), ChannelError> {
            let capture = self
                .handles
                .get_mut(&iface.index())
                .ok_or(ChannelError::InvalidChannel(SocketKind::LinkLayer))?;
            capture
                .sendpacket(frame)
                .map_err(|err| ChannelError::write(SocketKind::LinkLayer, err))
        }

        fn close(&mut self, iface: &NetworkInterface) -> Result<(), ChannelError> {
            // libpcap reports nothing on close; dropping the handle is it.
            self.handles
                .remove(&iface.index())
                .map(drop)
                .ok_or(ChannelError::InvalidChannel(SocketKind::LinkLayer))
        }

        fn close_all(&mut self) {
            self.handles.clear();
        }

        fn read_len(&self, _iface: &NetworkInterface) -> usize {
            65_536
        }
    }
}

#[cfg(feature = "pcap")]
pub use pcap_handles::PcapHandles;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_unopened_raw_fd_reports_error() {
        // -1 is never a valid descriptor.
        let err = close_raw_fd(-1, SocketKind::LinkLayer).unwrap_err();
        assert!(matches!(err, ChannelError::Close { .. }));
    }
}
