//! Direct queries on a block device descriptor.
//!
//! These are fallbacks and auxiliary data only; sysfs is the primary topology source. All three
//! are stateless.

use std::io;
use std::os::fd::RawFd;

use nix::errno::Errno;
use serde::Serialize;

use crate::error::{Result, TopologyError};
use crate::scan::Scanner;

/// Buffer size the kernel's `scsi_ioctl_get_pci` copies out.
const SLOT_NAME_SIZE: usize = 21;

mod raw {
    use nix::{ioctl_none, ioctl_read_bad};

    /// `struct scsi_idlun` from `scsi/scsi_ioctl.h`.
    #[repr(C)]
    #[derive(Default)]
    pub struct ScsiIdlun {
        pub dev_id: u32,
        pub host_unique_id: u32,
    }

    ioctl_none! {
        /// `NVME_IOCTL_ID` from `linux/nvme_ioctl.h`.
        nvme_ioctl_id, b'N', 0x40
    }
    ioctl_read_bad! {
        scsi_ioctl_get_idlun, 0x5382, ScsiIdlun
    }
    ioctl_read_bad! {
        scsi_ioctl_get_pci, 0x5387, [u8; super::SLOT_NAME_SIZE]
    }
}

fn check_fd(fd: RawFd) -> Result<()> {
    if fd < 0 {
        return Err(TopologyError::InvalidArgument("negative file descriptor"));
    }
    Ok(())
}

fn os_error(request: &str, errno: Errno) -> TopologyError {
    TopologyError::io(format!("ioctl {request}"), io::Error::from(errno))
}

/// Namespace id of an NVMe namespace block device.
pub fn nvme_namespace_id(fd: RawFd) -> Result<u32> {
    check_fd(fd)?;
    // SAFETY: NVME_IOCTL_ID takes no argument and returns the namespace id or -1.
    let nsid = unsafe { raw::nvme_ioctl_id(fd) }.map_err(|e| os_error("NVME_IOCTL_ID", e))?;
    Ok(nsid as u32)
}

/// Host/channel/id/lun reported by the legacy SCSI id ioctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScsiIdLun {
    pub host: u8,
    pub channel: u8,
    pub id: u8,
    pub lun: u8,
}

impl ScsiIdLun {
    /// Decodes the packed `dev_id` word: `host << 24 | channel << 16 | lun << 8 | id`.
    pub fn from_dev_id(v: u32) -> Self {
        Self {
            host: ((v >> 24) & 0xff) as u8,
            channel: ((v >> 16) & 0xff) as u8,
            lun: ((v >> 8) & 0xff) as u8,
            id: (v & 0xff) as u8,
        }
    }
}

pub fn scsi_idlun(fd: RawFd) -> Result<ScsiIdLun> {
    check_fd(fd)?;
    let mut idlun = raw::ScsiIdlun::default();
    // SAFETY: the kernel writes a `struct scsi_idlun` (two u32s) to the pointer.
    unsafe { raw::scsi_ioctl_get_idlun(fd, &mut idlun) }
        .map_err(|e| os_error("SCSI_IOCTL_GET_IDLUN", e))?;
    tracing::trace!(dev_id = idlun.dev_id, host_unique_id = idlun.host_unique_id, "scsi idlun");
    Ok(ScsiIdLun::from_dev_id(idlun.dev_id))
}

/// PCI bus/device/function as reported by the legacy SCSI PCI ioctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PciSlot {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

/// Parses the `bus:device:function` hex triplet at the start of a slot name.
pub fn parse_pci_slot(text: &str) -> Result<PciSlot> {
    let mut s = Scanner::new(text.trim_start());
    let slot = s.attempt(|s| {
        let bus: u32 = s.hex(8)?;
        s.literal(":")?;
        let device: u32 = s.hex(8)?;
        s.literal(":")?;
        let function: u32 = s.hex(8)?;
        Some(PciSlot {
            bus: (bus & 0xff) as u8,
            device: (device & 0xff) as u8,
            function: (function & 0xff) as u8,
        })
    });
    slot.ok_or(TopologyError::InvalidArgument(
        "SCSI PCI slot is not a bus:device:function triplet",
    ))
}

/// PCI slot of the SCSI host adapter. Older kernels report `b:d:f`; newer ones report the full
/// PCI device name, which does not parse as a triplet and is rejected.
pub fn scsi_pci_slot(fd: RawFd) -> Result<PciSlot> {
    check_fd(fd)?;
    let mut buf = [0u8; SLOT_NAME_SIZE];
    // SAFETY: the kernel copies at most SLOT_NAME_SIZE bytes into `buf`.
    unsafe { raw::scsi_ioctl_get_pci(fd, &mut buf) }
        .map_err(|e| os_error("SCSI_IOCTL_GET_PCI", e))?;

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let text = std::str::from_utf8(&buf[..len])
        .map_err(|_| TopologyError::InvalidArgument("SCSI PCI slot is not UTF-8"))?;
    parse_pci_slot(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_id_unpacking() {
        assert_eq!(
            ScsiIdLun::from_dev_id(0x0301_0502),
            ScsiIdLun {
                host: 3,
                channel: 1,
                lun: 5,
                id: 2
            }
        );
        assert_eq!(ScsiIdLun::from_dev_id(0), ScsiIdLun { host: 0, channel: 0, lun: 0, id: 0 });
    }

    #[test]
    fn pci_slot_triplets() {
        assert_eq!(
            parse_pci_slot("00:1f:2").unwrap(),
            PciSlot {
                bus: 0,
                device: 0x1f,
                function: 2
            }
        );
        // The domain-prefixed name of newer kernels parses as domain:bus:device.
        assert_eq!(
            parse_pci_slot("0000:03:00.0").unwrap(),
            PciSlot {
                bus: 0,
                device: 3,
                function: 0
            }
        );
    }

    #[test]
    fn malformed_pci_slot_is_invalid_argument() {
        for text in ["", "host0", "00:1f", "zz:00:00"] {
            let err = parse_pci_slot(text).unwrap_err();
            assert!(matches!(err, TopologyError::InvalidArgument(_)), "{text:?}");
        }
    }

    #[test]
    fn negative_descriptors_are_rejected_before_the_ioctl() {
        assert!(matches!(scsi_idlun(-1), Err(TopologyError::InvalidArgument(_))));
        assert!(matches!(scsi_pci_slot(-1), Err(TopologyError::InvalidArgument(_))));
        assert!(matches!(nvme_namespace_id(-1), Err(TopologyError::InvalidArgument(_))));
    }

    #[test]
    fn ioctls_on_a_regular_file_report_the_os_error() {
        let file = tempfile::tempfile().unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&file);
        let err = scsi_idlun(fd).unwrap_err();
        assert!(err.raw_os_error().is_some(), "{err}");
    }
}
