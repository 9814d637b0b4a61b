//! Hardware topology of Linux block devices, for building EFI device paths.
//!
//! Linux names and numbers disks independently of how firmware enumerates buses, so a boot
//! entry cannot be written from a device node alone. Given a descriptor for a block device (or a
//! file on one) this crate works out:
//!
//! - the interface family, from the device number ([`classify`]);
//! - the PCI root complex and bridge chain down to the controller ([`pci`]);
//! - the bus address on that controller: SCSI, SATA port/PMP/devno or SAS address ([`address`]).
//!
//! Everything is read from `/proc/devices` and sysfs, resolved under a [`SysfsRoot`] so tests can
//! supply a synthetic tree. [`ioctl`] holds the descriptor-level probes used as fallbacks.
//!
//! ```no_run
//! use efidisk_topology::Resolver;
//!
//! let disk = std::fs::File::open("/dev/sda1")?;
//! let info = Resolver::from_env().disk_info_from_fd(&disk)?;
//! println!("{} on {:?}", info.interface_type, info.pci_controller());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod address;
pub mod classify;
mod error;
pub mod ioctl;
pub mod majors;
mod model;
pub mod pci;
mod resolver;
mod scan;
pub mod sysfs;

pub use address::{probe_bus, resolve_address, BusGrammar, BusMatch};
pub use classify::{classify, LEGACY_RANGES};
pub use error::{Result, TopologyError};
pub use majors::DynamicMajorCache;
pub use model::{
    DiskAddress, DiskInfo, InterfaceType, PciAddress, PciRoot, SasAddress, SataAddress,
    ScsiAddress,
};
pub use pci::{walk_pci_chain, PciWalk};
pub use resolver::{device_number, split_dev, DeviceSource, Resolver};
pub use sysfs::SysfsRoot;
