//! Runs a descriptor through classification and, for SCSI disks, the sysfs topology walk.

use std::io;
use std::os::fd::{AsFd, AsRawFd};

use nix::libc;
use nix::sys::stat;

use crate::address;
use crate::classify;
use crate::error::{Result, TopologyError};
use crate::ioctl;
use crate::majors::DynamicMajorCache;
use crate::model::{DiskAddress, DiskInfo, InterfaceType};
use crate::pci;
use crate::sysfs::SysfsRoot;

/// Where a descriptor's device number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSource {
    /// The descriptor is the block device node itself (`st_rdev`).
    BlockDevice,
    /// The descriptor is a regular file; the number is its filesystem's backing device (`st_dev`).
    RegularFile,
}

/// Splits a Linux `dev_t` into major and minor.
pub fn split_dev(dev: libc::dev_t) -> (u64, u64) {
    (stat::major(dev), stat::minor(dev))
}

/// Device number of the block device behind `fd`.
///
/// Minors above 255 are reported as [`TopologyError::UnsupportedDevice`]: no legacy range or
/// dynamic family the classifier knows allocates them.
pub fn device_number(fd: impl AsFd) -> Result<(u64, u8, DeviceSource)> {
    let st = stat::fstat(fd.as_fd().as_raw_fd())
        .map_err(|errno| TopologyError::io("fstat", io::Error::from(errno)))?;

    let (dev, source) = match st.st_mode & libc::S_IFMT {
        libc::S_IFBLK => (st.st_rdev, DeviceSource::BlockDevice),
        libc::S_IFREG => (st.st_dev, DeviceSource::RegularFile),
        _ => {
            return Err(TopologyError::InvalidArgument(
                "descriptor is neither a block device nor a regular file",
            ))
        }
    };

    let (major, minor) = split_dev(dev);
    let minor = u8::try_from(minor)
        .map_err(|_| TopologyError::UnsupportedDevice { major, minor })?;
    Ok((major, minor, source))
}

/// Resolves block devices to their hardware topology.
///
/// Owns the dynamic-major memo, so one resolver should be reused for the queries of a run.
/// Resolution takes `&mut self`; wrap the resolver in a lock to share it between threads.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    sysfs: SysfsRoot,
    majors: DynamicMajorCache,
}

impl Resolver {
    pub fn new(sysfs: SysfsRoot) -> Self {
        Self::with_cache(sysfs, DynamicMajorCache::new())
    }

    /// Resolver over [`SysfsRoot::from_env`].
    pub fn from_env() -> Self {
        Self::new(SysfsRoot::from_env())
    }

    pub fn with_cache(sysfs: SysfsRoot, majors: DynamicMajorCache) -> Self {
        Self { sysfs, majors }
    }

    pub fn sysfs(&self) -> &SysfsRoot {
        &self.sysfs
    }

    pub fn resolve_dynamic_major(&mut self, name: &str, is_block: bool) -> Option<u32> {
        self.majors.resolve(&self.sysfs, name, is_block)
    }

    /// Interface family and disk/partition numbers of `major:minor`, without PCI topology.
    pub fn classify(&mut self, major: u64, minor: u8) -> Result<DiskInfo> {
        classify::classify(major, minor, &mut self.majors, &self.sysfs)
    }

    /// Adds the PCI root, bridge chain and bus address of `info`'s device.
    pub fn blockdev_pci_fill(&self, info: DiskInfo) -> Result<DiskInfo> {
        let link_path = format!("/sys/dev/block/{}", info.dev_id());
        let link = self.sysfs.read_link(&link_path)?;

        let walk = pci::walk_pci_chain(&link)?;
        tracing::debug!(
            root = %walk.root,
            hops = walk.chain.len(),
            remainder = walk.remainder,
            "walked PCI chain"
        );

        let mut info = info;
        info.pci_root = walk.root;
        info.pci_chain = walk.chain;
        address::resolve_address(walk.remainder, info, &self.sysfs)
    }

    /// Full topology of `major:minor`. SCSI-family devices additionally get their PCI chain and
    /// bus address.
    pub fn disk_info_from_dev(&mut self, major: u64, minor: u8) -> Result<DiskInfo> {
        let info = self.classify(major, minor)?;
        tracing::debug!(
            dev = %info.dev_id(),
            interface = %info.interface_type,
            disk = info.disk_number,
            partition = info.partition_number,
            "classified device"
        );

        if info.interface_type == InterfaceType::Scsi {
            return self.blockdev_pci_fill(info);
        }
        Ok(info)
    }

    /// Full topology of the block device behind `fd`, or of the device holding the filesystem
    /// when `fd` is a regular file.
    pub fn disk_info_from_fd(&mut self, fd: impl AsFd) -> Result<DiskInfo> {
        let fd = fd.as_fd();
        let (major, minor, source) = device_number(fd)?;
        let mut info = self.disk_info_from_dev(major, minor)?;

        if info.interface_type == InterfaceType::Nvme && source == DeviceSource::BlockDevice {
            match ioctl::nvme_namespace_id(fd.as_raw_fd()) {
                Ok(namespace_id) => info.address = DiskAddress::Nvme { namespace_id },
                Err(err) => tracing::debug!(dev = %info.dev_id(), "no NVMe namespace id: {err}"),
            }
        }
        Ok(info)
    }
}
