//! Classification of a device number into an interface family and disk/partition index.
//!
//! Most families are recognised from major ranges the kernel froze long ago. NVMe and
//! virtio-block get their majors at runtime and are looked up in `/proc/devices`.

use crate::error::{Result, TopologyError};
use crate::majors::DynamicMajorCache;
use crate::model::{DiskInfo, InterfaceType};
use crate::sysfs::SysfsRoot;

/// How a range derives disk, partition and controller numbers from the minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinorLayout {
    /// 6 partition bits and one disk-select bit; two disks per controller.
    Ide { controller_base: u32 },
    /// 4 partition bits; 16 disks per major counted from `major_base`.
    Sixteen { major_base: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyRange {
    pub first: u64,
    pub last: u64,
    pub interface_type: InterfaceType,
    pub layout: MinorLayout,
}

impl LegacyRange {
    const fn new(first: u64, last: u64, interface_type: InterfaceType, layout: MinorLayout) -> Self {
        Self {
            first,
            last,
            interface_type,
            layout,
        }
    }

    pub fn contains(&self, major: u64) -> bool {
        (self.first..=self.last).contains(&major)
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    fn apply(&self, info: &mut DiskInfo) {
        let minor = u32::from(info.minor);
        let offset = (info.major - self.first) as u32;
        info.interface_type = self.interface_type;
        match self.layout {
            MinorLayout::Ide { controller_base } => {
                info.disk_number = (minor >> 6) & 1;
                info.controller_number = offset + controller_base + info.disk_number;
                info.partition_number = minor & 0x3f;
            }
            MinorLayout::Sixteen { major_base } => {
                info.disk_number = 16 * (info.major - major_base) as u32 + (minor >> 4);
                info.partition_number = minor & 0xf;
            }
        }
    }
}

/// Statically allocated block majors, in the order they are checked.
pub static LEGACY_RANGES: &[LegacyRange] = &[
    LegacyRange::new(3, 3, InterfaceType::Ata, MinorLayout::Ide { controller_base: 0 }),
    LegacyRange::new(22, 22, InterfaceType::Ata, MinorLayout::Ide { controller_base: 2 }),
    LegacyRange::new(33, 34, InterfaceType::Ata, MinorLayout::Ide { controller_base: 4 }),
    LegacyRange::new(56, 57, InterfaceType::Ata, MinorLayout::Ide { controller_base: 8 }),
    LegacyRange::new(88, 91, InterfaceType::Ata, MinorLayout::Ide { controller_base: 12 }),
    LegacyRange::new(80, 87, InterfaceType::I2o, MinorLayout::Sixteen { major_base: 80 }),
    LegacyRange::new(8, 8, InterfaceType::Scsi, MinorLayout::Sixteen { major_base: 8 }),
    LegacyRange::new(65, 71, InterfaceType::Scsi, MinorLayout::Sixteen { major_base: 64 }),
    LegacyRange::new(128, 135, InterfaceType::Scsi, MinorLayout::Sixteen { major_base: 128 }),
];

/// Block device families whose major is assigned at runtime, in probe order.
pub const DYNAMIC_FAMILIES: [(&str, InterfaceType); 2] = [
    ("nvme", InterfaceType::Nvme),
    ("virtblk", InterfaceType::Virtblk),
];

/// Classifies a static major, or returns `None` if no legacy range covers it.
pub fn classify_legacy(major: u64, minor: u8) -> Option<DiskInfo> {
    let range = LEGACY_RANGES.iter().find(|r| r.contains(major))?;
    let mut info = DiskInfo::new(major, minor);
    range.apply(&mut info);
    Some(info)
}

/// Classifies `major:minor`, consulting the dynamic-major registry when no legacy range matches.
///
/// Only the interface family and disk/partition/controller numbers are filled in.
pub fn classify(
    major: u64,
    minor: u8,
    majors: &mut DynamicMajorCache,
    sysfs: &SysfsRoot,
) -> Result<DiskInfo> {
    if let Some(info) = classify_legacy(major, minor) {
        return Ok(info);
    }

    for (name, interface_type) in DYNAMIC_FAMILIES {
        let Some(dynamic) = majors.resolve(sysfs, name, true) else {
            continue;
        };
        if u64::from(dynamic) != major {
            continue;
        }

        let mut info = DiskInfo::new(major, minor);
        info.interface_type = interface_type;
        if interface_type == InterfaceType::Virtblk {
            info.disk_number = u32::from(minor >> 4);
            info.partition_number = u32::from(minor & 0xf);
        }
        return Ok(info);
    }

    Err(TopologyError::UnsupportedDevice {
        major,
        minor: u64::from(minor),
    })
}
