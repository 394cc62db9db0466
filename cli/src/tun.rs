//! Linux TUN device adapter: opens (or creates) a TUN interface and exposes
//! it through `acoustic_ip_core::TunDevice`.
//!
//! This is a direct `ioctl(TUNSETIFF)` port; no crate in the dependency
//! stack offers a TUN abstraction, so we talk to `/dev/net/tun` the way the
//! kernel documents it, via `libc`. Requires `CAP_NET_ADMIN` (or root).

use acoustic_ip_core::{AcousticIpError, Result, TunDevice};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

const IFNAMSIZ: usize = 16;
const IFF_TUN: libc::c_short = 0x0001;
const IFF_NO_PI: libc::c_short = 0x1000;
// From <linux/if_tun.h>; stable ioctl request number on Linux.
const TUNSETIFF: libc::c_ulong = 0x4004_54CA;

#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; IFNAMSIZ],
    ifr_flags: libc::c_short,
    _padding: [u8; 22],
}

/// A real Linux TUN interface, opened or created under the given name
/// (e.g. `"tun0"`).
pub struct LinuxTun {
    file: File,
}

impl LinuxTun {
    pub fn open(name: &str) -> Result<Self> {
        if name.len() >= IFNAMSIZ {
            return Err(AcousticIpError::DeviceOpen(format!(
                "interface name {name:?} is too long (max {} bytes)",
                IFNAMSIZ - 1
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/net/tun")
            .map_err(|err| AcousticIpError::DeviceOpen(format!("open /dev/net/tun: {err}")))?;

        let mut ifr_name = [0 as libc::c_char; IFNAMSIZ];
        for (dst, src) in ifr_name.iter_mut().zip(name.bytes()) {
            *dst = src as libc::c_char;
        }
        let mut ifr = IfReq { ifr_name, ifr_flags: IFF_TUN | IFF_NO_PI, _padding: [0; 22] };

        let ret = unsafe { libc::ioctl(file.as_raw_fd(), TUNSETIFF, &mut ifr as *mut IfReq) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            return Err(AcousticIpError::DeviceOpen(format!("ioctl TUNSETIFF on {name:?}: {err}")));
        }

        Ok(Self { file })
    }

    /// Duplicates the underlying file descriptor so the transmit and
    /// receive workers can each own a handle to the same TUN queue without
    /// sharing a `&mut self` across threads.
    pub fn try_clone(&self) -> Result<Self> {
        let file = self
            .file
            .try_clone()
            .map_err(|err| AcousticIpError::DeviceOpen(format!("clone TUN fd: {err}")))?;
        Ok(Self { file })
    }
}

impl TunDevice for LinuxTun {
    fn read_packet(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }

    fn write_packet(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }
}
