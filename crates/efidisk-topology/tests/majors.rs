mod common;

use common::*;
use efidisk_topology::{DiskAddress, DynamicMajorCache, InterfaceType, Resolver, TopologyError};

#[test]
fn repeated_queries_read_the_registry_once() {
    let sys = FakeSysfs::new();
    sys.proc_devices(PROC_DEVICES);
    let root = sys.root();
    let mut cache = DynamicMajorCache::new();

    assert_eq!(cache.resolve(&root, "virtblk", true), Some(252));
    std::fs::remove_file(sys.path("/proc/devices")).unwrap();

    // Served from the memo; the registry is gone.
    assert_eq!(cache.resolve(&root, "virtblk", true), Some(252));
    assert_eq!(cache.resolve(&root, "virtblk", true), Some(252));

    // A different class is a different query.
    assert_eq!(cache.resolve(&root, "virtblk", false), None);
    // ... and it replaced the only slot.
    assert_eq!(cache.resolve(&root, "virtblk", true), None);
}

#[test]
fn misses_are_memoized_too() {
    let sys = FakeSysfs::new();
    let root = sys.root();
    let mut cache = DynamicMajorCache::new();

    assert_eq!(cache.resolve(&root, "nvme", true), None);
    sys.proc_devices(PROC_DEVICES);
    assert_eq!(cache.resolve(&root, "nvme", true), None);

    cache.clear();
    assert_eq!(cache.resolve(&root, "nvme", true), Some(254));
}

#[test]
fn dynamic_families_are_classified() {
    let sys = FakeSysfs::new();
    sys.proc_devices(PROC_DEVICES);
    let mut resolver = Resolver::new(sys.root());

    let info = resolver.disk_info_from_dev(252, 0x13).unwrap();
    assert_eq!(info.interface_type, InterfaceType::Virtblk);
    assert_eq!((info.disk_number, info.partition_number), (1, 3));
    assert!(info.pci_root.is_unset());

    let info = resolver.disk_info_from_dev(254, 1).unwrap();
    assert_eq!(info.interface_type, InterfaceType::Nvme);
    assert_eq!((info.disk_number, info.partition_number), (0, 0));
    assert_eq!(info.address, DiskAddress::None);
}

#[test]
fn unknown_major_is_unsupported() {
    let sys = FakeSysfs::new();
    sys.proc_devices(PROC_DEVICES);

    let err = Resolver::new(sys.root())
        .disk_info_from_dev(253, 0)
        .unwrap_err();
    assert!(
        matches!(err, TopologyError::UnsupportedDevice { major: 253, minor: 0 }),
        "{err}"
    );
}

#[test]
fn character_section_does_not_classify_block_devices() {
    let sys = FakeSysfs::new();
    sys.proc_devices(PROC_DEVICES);

    // 250 is virtblk only as a character major.
    let err = Resolver::new(sys.root())
        .disk_info_from_dev(250, 0)
        .unwrap_err();
    assert!(matches!(err, TopologyError::UnsupportedDevice { .. }), "{err}");
}
