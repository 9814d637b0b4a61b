//! The resolution result and the address records it carries.

use core::fmt;

use serde::Serialize;

/// Bus interface family of a block device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    #[default]
    Unknown,
    Ata,
    Atapi,
    Scsi,
    Sata,
    Sas,
    Nvme,
    I2o,
    Virtblk,
}

impl InterfaceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ata => "ata",
            Self::Atapi => "atapi",
            Self::Scsi => "scsi",
            Self::Sata => "sata",
            Self::Sas => "sas",
            Self::Nvme => "nvme",
            Self::I2o => "i2o",
            Self::Virtblk => "virtblk",
        }
    }

    /// Whether `self` may be replaced by `next` once set.
    ///
    /// The only refinement is a SCSI-emulated disk turning out to sit on a SATA or SAS link.
    pub fn can_refine_to(self, next: Self) -> bool {
        self == next || (self == Self::Scsi && matches!(next, Self::Sata | Self::Sas))
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PCI root complex a device hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PciRoot {
    pub domain: u16,
    pub bus: u8,
}

impl PciRoot {
    /// Value held until the PCI-chain walker succeeds.
    pub const UNSET: Self = Self {
        domain: 0xffff,
        bus: 0xff,
    };

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }
}

impl Default for PciRoot {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Display for PciRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pci{:04x}:{:02x}", self.domain, self.bus)
    }
}

/// One `domain:bus:device.function` hop in the PCI hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScsiAddress {
    pub bus: u32,
    pub device: u32,
    pub target: u32,
    pub lun: u32,
}

/// SATA disk address: the SCSI address libata emulates plus the ATA link coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SataAddress {
    pub scsi_bus: u32,
    pub scsi_device: u32,
    pub scsi_target: u32,
    pub scsi_lun: u32,
    /// Zero-based; sysfs reports it one-based.
    pub ata_port: u32,
    pub ata_pmp: u32,
    pub ata_devno: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SasAddress {
    pub scsi_bus: u32,
    pub scsi_device: u32,
    pub scsi_target: u32,
    pub scsi_lun: u64,
    pub sas_address: u64,
}

/// Interface-specific address of the disk. Which variant is meaningful follows from
/// [`DiskInfo::interface_type`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiskAddress {
    #[default]
    None,
    Scsi(ScsiAddress),
    Sata(SataAddress),
    Sas(SasAddress),
    Nvme { namespace_id: u32 },
}

/// Complete physical attachment path of a block device.
///
/// Built fresh per resolution and owned by the caller. Fields a stage could not resolve keep
/// their defaults: [`PciRoot::UNSET`], an empty chain, [`DiskAddress::None`] and empty names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskInfo {
    pub major: u64,
    pub minor: u8,
    pub interface_type: InterfaceType,
    pub controller_number: u32,
    pub disk_number: u32,
    pub partition_number: u32,
    pub pci_root: PciRoot,
    /// Bridge hops from the root complex; the last one is the disk controller.
    pub pci_chain: Vec<PciAddress>,
    pub address: DiskAddress,
    pub disk_name: String,
    pub part_name: String,
}

impl DiskInfo {
    pub fn new(major: u64, minor: u8) -> Self {
        Self {
            major,
            minor,
            interface_type: InterfaceType::Unknown,
            controller_number: 0,
            disk_number: 0,
            partition_number: 0,
            pci_root: PciRoot::UNSET,
            pci_chain: Vec::new(),
            address: DiskAddress::None,
            disk_name: String::new(),
            part_name: String::new(),
        }
    }

    /// The terminal controller of the PCI chain.
    pub fn pci_controller(&self) -> Option<&PciAddress> {
        self.pci_chain.last()
    }

    /// `major:minor` as used under `/sys/dev/block`.
    pub fn dev_id(&self) -> String {
        format!("{}:{}", self.major, self.minor)
    }
}
