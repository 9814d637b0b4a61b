#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::symlink;
use std::path::PathBuf;

use efidisk_topology::SysfsRoot;
use tempfile::TempDir;

/// A throwaway directory laid out like the parts of `/sys` and `/proc` the resolver reads.
pub struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> SysfsRoot {
        SysfsRoot::new(self.dir.path())
    }

    pub fn path(&self, abs: &str) -> PathBuf {
        self.dir.path().join(abs.trim_start_matches('/'))
    }

    pub fn mkdir(&self, abs: &str) -> &Self {
        fs::create_dir_all(self.path(abs)).unwrap();
        self
    }

    pub fn write(&self, abs: &str, contents: &str) -> &Self {
        let path = self.path(abs);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        self
    }

    /// Symlinks need not resolve; only their target text is read.
    pub fn symlink(&self, abs: &str, target: &str) -> &Self {
        let path = self.path(abs);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        symlink(target, path).unwrap();
        self
    }

    pub fn dev_block(&self, major: u64, minor: u8, target: &str) -> &Self {
        self.symlink(&format!("/sys/dev/block/{major}:{minor}"), target)
    }

    pub fn ata_device(&self, name: &str) -> &Self {
        self.mkdir(&format!("/sys/class/ata_device/{name}"))
    }

    pub fn ata_port_no(&self, print_id: u32, contents: &str) -> &Self {
        self.write(&format!("/sys/class/ata_port/ata{print_id}/port_no"), contents)
    }

    pub fn proc_devices(&self, listing: &str) -> &Self {
        self.write("/proc/devices", listing)
    }
}

pub const SATA_LINK: &str =
    "../../devices/pci0000:00/0000:00:1f.2/ata1/host0/target0:0:0/0:0:0:0/block/sda/sda1";

pub const SAS_LINK: &str = "../../devices/pci0000:00/0000:00:01.0/0000:01:00.0/host4/port-4:0/end_device-4:0/target4:0:0/4:0:0:0/block/sdc/sdc1";

pub const USB_LINK: &str =
    "../../devices/pci0000:00/0000:00:14.0/usb2/2-1/2-1:1.0/host6/target6:0:0/6:0:0:0/block/sdb/sdb1";

pub const PROC_DEVICES: &str = "Character devices:
  1 mem
 10 misc
243 nvme
250 virtblk

Block devices:
  7 loop
  8 sd
 65 sd
252 virtblk
253 device-mapper
254 nvme
";
