//! Bus-specific addressing parsed from the sysfs path below the PCI controller.
//!
//! The remainder left by [`crate::pci::walk_pci_chain`] carries no explicit bus tag, so the
//! family is picked by probing [`BusGrammar::PROBE_ORDER`]. A probe that does not recognise the
//! prefix is not an error; once a prefix committed the parse to a family, any later mismatch is.
//! A disk address silently left at zero would produce a firmware device path pointing at the
//! wrong disk.

use crate::error::{Result, TopologyError};
use crate::model::{DiskAddress, DiskInfo, InterfaceType, SasAddress, SataAddress, ScsiAddress};
use crate::scan::Scanner;
use crate::sysfs::SysfsRoot;

const ATA_DEVICE_CLASS: &str = "/sys/class/ata_device";

/// Bus families recognisable from the sysfs path below the PCI controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusGrammar {
    /// `ata<print_id>/host<n>/target<a>:<b>:<c>/<emulated scsi>/block/<disk>/<part>`
    Sata,
    /// `host<n>/port-<..>/end_device-<..>/target<..>/<b>:<d>:<t>:<l>/block/<disk>/<part>`
    Sas,
}

/// Result of a grammar that recognised its prefix and parsed the whole remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMatch {
    pub consumed: usize,
    pub interface_type: InterfaceType,
    pub address: DiskAddress,
    pub disk_name: String,
    pub part_name: String,
}

impl BusGrammar {
    /// Grammars in the order they are tried.
    pub const PROBE_ORDER: [Self; 2] = [Self::Sata, Self::Sas];

    /// Whether `remainder` commits the parse to this family.
    ///
    /// SAS needs the `port-` segment: a `host<n>/target...` path on a SAS HBA (a RAID volume, for
    /// one) is left to the plain-SCSI fallback.
    pub fn matches(self, remainder: &str) -> bool {
        match self {
            Self::Sata => remainder.starts_with("ata"),
            Self::Sas => is_sas_port_path(remainder),
        }
    }

    /// Parses `remainder` as this family and fetches the attributes the path does not carry.
    pub fn parse(self, remainder: &str, sysfs: &SysfsRoot) -> Result<BusMatch> {
        match self {
            Self::Sata => {
                let path = parse_sata_path(remainder)?;
                let port = ata_port_info(sysfs, path.print_id)?;
                Ok(BusMatch {
                    consumed: path.consumed,
                    interface_type: InterfaceType::Sata,
                    address: DiskAddress::Sata(SataAddress {
                        scsi_bus: path.scsi_bus,
                        scsi_device: path.scsi_device,
                        scsi_target: path.scsi_target,
                        scsi_lun: path.scsi_lun,
                        ata_port: port.port,
                        ata_pmp: port.pmp,
                        ata_devno: port.devno,
                    }),
                    disk_name: path.disk_name.to_string(),
                    part_name: path.part_name.to_string(),
                })
            }
            Self::Sas => {
                let path = parse_sas_path(remainder)?;
                let sas_address = read_sas_address(sysfs, path.disk_name)?;
                Ok(BusMatch {
                    consumed: path.consumed,
                    interface_type: InterfaceType::Sas,
                    address: DiskAddress::Sas(SasAddress {
                        scsi_bus: path.scsi_bus,
                        scsi_device: path.scsi_device,
                        scsi_target: path.scsi_target,
                        scsi_lun: path.scsi_lun,
                        sas_address,
                    }),
                    disk_name: path.disk_name.to_string(),
                    part_name: path.part_name.to_string(),
                })
            }
        }
    }
}

/// Tries each grammar in [`BusGrammar::PROBE_ORDER`].
///
/// `Ok(None)` means no family recognised the remainder.
pub fn probe_bus(remainder: &str, sysfs: &SysfsRoot) -> Result<Option<BusMatch>> {
    for grammar in BusGrammar::PROBE_ORDER {
        if grammar.matches(remainder) {
            tracing::debug!(?grammar, remainder, "bus grammar matched");
            return grammar.parse(remainder, sysfs).map(Some);
        }
    }
    Ok(None)
}

/// Adds bus addressing for the device at `remainder` to `info`.
///
/// When no grammar matches and `info` was classified as SCSI, the address is taken from the
/// disk's `device` link instead.
pub fn resolve_address(remainder: &str, mut info: DiskInfo, sysfs: &SysfsRoot) -> Result<DiskInfo> {
    if let Some(found) = probe_bus(remainder, sysfs)? {
        if info.interface_type != InterfaceType::Unknown
            && !info.interface_type.can_refine_to(found.interface_type)
        {
            return Err(TopologyError::malformed(
                remainder,
                "bus path contradicts the classified interface",
            ));
        }
        tracing::debug!(
            consumed = found.consumed,
            interface = %found.interface_type,
            disk = %found.disk_name,
            "resolved bus address"
        );
        info.interface_type = found.interface_type;
        info.address = found.address;
        info.disk_name = found.disk_name;
        info.part_name = found.part_name;
        return Ok(info);
    }

    if info.interface_type == InterfaceType::Scsi {
        return resolve_plain_scsi(info, sysfs);
    }
    Ok(info)
}

/// `block/<disk>` or `block/<disk>/<part>`, which must end the path.
fn parse_block_tail<'a>(s: &mut Scanner<'a>) -> Option<(&'a str, &'a str)> {
    s.attempt(|s| {
        s.literal("block/")?;
        let disk = s.segment()?;
        let part = if s.literal("/").is_some() {
            s.segment()?
        } else {
            ""
        };
        s.is_empty().then_some((disk, part))
    })
}

/// Three `:`-separated decimals; the last one is parsed as `L`.
fn parse_colon_triplet<L: std::str::FromStr>(s: &mut Scanner<'_>) -> Option<(u32, u32, L)> {
    s.attempt(|s| {
        let a = s.dec()?;
        s.literal(":")?;
        let b = s.dec()?;
        s.literal(":")?;
        let c = s.dec()?;
        Some((a, b, c))
    })
}

fn parse_scsi_quad<L: std::str::FromStr>(s: &mut Scanner<'_>) -> Option<(u32, u32, u32, L)> {
    s.attempt(|s| {
        let (a, b, c) = parse_colon_triplet::<u32>(s)?;
        s.literal(":")?;
        let d = s.dec()?;
        Some((a, b, c, d))
    })
}

/// Text fields of a SATA device path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SataPath<'a> {
    pub print_id: u32,
    pub scsi_bus: u32,
    pub scsi_device: u32,
    pub scsi_target: u32,
    pub scsi_lun: u32,
    pub disk_name: &'a str,
    pub part_name: &'a str,
    pub consumed: usize,
}

/// Parses `ata1/host0/target0:0:0/0:0:0:0/block/sda/sda1`.
///
/// The `host` number is the SCSI bus and the `target` triplet is device, target and lun. The
/// emulated SCSI address after it is checked and dropped.
pub fn parse_sata_path(remainder: &str) -> Result<SataPath<'_>> {
    let bad = |reason| TopologyError::malformed(remainder, reason);
    let mut s = Scanner::new(remainder);

    let (print_id, scsi_bus) = s
        .attempt(|s| {
            s.literal("ata")?;
            let print_id = s.dec()?;
            s.literal("/host")?;
            let bus = s.dec()?;
            s.literal("/")?;
            Some((print_id, bus))
        })
        .ok_or_else(|| bad("expected ata<print_id>/host<n>/"))?;

    let (scsi_device, scsi_target, scsi_lun) = s
        .attempt(|s| {
            s.literal("target")?;
            let triplet = parse_colon_triplet::<u32>(s)?;
            s.literal("/")?;
            Some(triplet)
        })
        .ok_or_else(|| bad("expected target<bus>:<device>:<lun>/"))?;

    s.attempt(|s| {
        parse_scsi_quad::<u64>(s)?;
        s.literal("/")
    })
    .ok_or_else(|| bad("expected emulated <bus>:<device>:<target>:<lun>/"))?;

    let (disk_name, part_name) =
        parse_block_tail(&mut s).ok_or_else(|| bad("expected block/<disk>/<part> at the end"))?;

    Ok(SataPath {
        print_id,
        scsi_bus,
        scsi_device,
        scsi_target,
        scsi_lun,
        disk_name,
        part_name,
        consumed: s.consumed(),
    })
}

/// ATA link coordinates of a libata port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtaPortInfo {
    /// Zero-based port number.
    pub port: u32,
    pub pmp: u32,
    pub devno: u32,
}

/// Parses an `/sys/class/ata_device` entry name into `(print_id, pmp, devno)`.
///
/// `dev1.0` is device 0 on a host link; `dev1.2.0` is the device behind port-multiplier port 2.
pub fn parse_ata_device_name(name: &str) -> Option<(u32, u32, u32)> {
    let mut s = Scanner::new(name);
    s.literal("dev")?;
    let print_id = s.dec()?;
    s.literal(".")?;
    let second = s.dec()?;
    let third = if s.literal(".").is_some() {
        Some(s.dec()?)
    } else {
        None
    };
    if !s.is_empty() {
        return None;
    }
    Some(match third {
        Some(devno) => (print_id, second, devno),
        None => (print_id, 0, second),
    })
}

/// Looks up port, port-multiplier and device number of the ATA port `ata<print_id>`.
pub fn ata_port_info(sysfs: &SysfsRoot, print_id: u32) -> Result<AtaPortInfo> {
    let names = sysfs
        .read_dir_names(ATA_DEVICE_CLASS)
        .map_err(|e| TopologyError::lookup(ATA_DEVICE_CLASS, e))?;

    let mut found = None;
    for name in &names {
        let (id, pmp, devno) = parse_ata_device_name(name).ok_or_else(|| {
            TopologyError::lookup(
                format!("{ATA_DEVICE_CLASS}/{name}"),
                "unrecognised ata_device entry name",
            )
        })?;
        if id == print_id {
            found = Some((pmp, devno));
            break;
        }
    }
    let (pmp, devno) = found.ok_or_else(|| {
        TopologyError::lookup(
            format!("{ATA_DEVICE_CLASS}/dev{print_id}.*"),
            "no device entry for this port",
        )
    })?;

    let attr = format!("/sys/class/ata_port/ata{print_id}/port_no");
    let text = sysfs
        .read_attr(&attr)
        .map_err(|e| TopologyError::lookup(attr.as_str(), e))?;
    let port_no: u32 = text
        .trim()
        .parse()
        .map_err(|e| TopologyError::lookup(attr.as_str(), e))?;
    let port = port_no
        .checked_sub(1)
        .ok_or_else(|| TopologyError::lookup(attr.as_str(), "port numbers start at 1"))?;

    Ok(AtaPortInfo { port, pmp, devno })
}

/// Whether `remainder` starts with `host<n>/port-`.
fn is_sas_port_path(remainder: &str) -> bool {
    let mut s = Scanner::new(remainder);
    s.attempt(|s| {
        s.literal("host")?;
        s.dec::<u32>()?;
        s.literal("/")?;
        s.starts_with("port-").then_some(())
    })
    .is_some()
}

/// Text fields of a SAS device path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasPath<'a> {
    pub host: u32,
    pub scsi_bus: u32,
    pub scsi_device: u32,
    pub scsi_target: u32,
    pub scsi_lun: u64,
    pub disk_name: &'a str,
    pub part_name: &'a str,
    pub consumed: usize,
}

/// `<a>:<b>` with an optional `:<c>`, all discarded.
fn skip_sas_phy_id(s: &mut Scanner<'_>) -> Option<()> {
    s.attempt(|s| {
        s.dec::<u32>()?;
        s.literal(":")?;
        s.dec::<u32>()?;
        let _ = s.attempt(|s| {
            s.literal(":")?;
            s.dec::<u32>()
        });
        Some(())
    })
}

/// Parses `host4/port-4:0/end_device-4:0/target4:0:0/4:0:0:0/block/sdc/sdc1`.
///
/// Port and end-device identifiers may carry a third `:<n>` component behind an expander; it is
/// accepted and dropped.
pub fn parse_sas_path(remainder: &str) -> Result<SasPath<'_>> {
    let bad = |reason| TopologyError::malformed(remainder, reason);
    let mut s = Scanner::new(remainder);

    let host = s
        .attempt(|s| {
            s.literal("host")?;
            let host = s.dec()?;
            s.literal("/port-")?;
            skip_sas_phy_id(s)?;
            s.literal("/")?;
            Some(host)
        })
        .ok_or_else(|| bad("expected host<n>/port-<a>:<b>[:<c>]/"))?;

    s.attempt(|s| {
        s.literal("end_device-")?;
        skip_sas_phy_id(s)?;
        s.literal("/")
    })
    .ok_or_else(|| bad("expected end_device-<a>:<b>[:<c>]/"))?;

    s.attempt(|s| {
        s.literal("target")?;
        parse_colon_triplet::<u64>(s)?;
        s.literal("/")
    })
    .ok_or_else(|| bad("expected target<bus>:<device>:<lun>/"))?;

    let (scsi_bus, scsi_device, scsi_target, scsi_lun) = s
        .attempt(|s| {
            let quad = parse_scsi_quad::<u64>(s)?;
            s.literal("/")?;
            Some(quad)
        })
        .ok_or_else(|| bad("expected <bus>:<device>:<target>:<lun>/"))?;

    let (disk_name, part_name) =
        parse_block_tail(&mut s).ok_or_else(|| bad("expected block/<disk>/<part> at the end"))?;

    Ok(SasPath {
        host,
        scsi_bus,
        scsi_device,
        scsi_target,
        scsi_lun,
        disk_name,
        part_name,
        consumed: s.consumed(),
    })
}

/// Parses a `sas_address` attribute such as `0x5000c500a1b2c3d4`.
pub fn parse_sas_address(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

fn read_sas_address(sysfs: &SysfsRoot, disk_name: &str) -> Result<u64> {
    let attr = format!("/sys/class/block/{disk_name}/device/sas_address");
    let text = sysfs
        .read_attr(&attr)
        .map_err(|e| TopologyError::lookup(attr.as_str(), e))?;
    parse_sas_address(&text)
        .ok_or_else(|| TopologyError::lookup(attr.as_str(), format!("not a hex address: {text:?}")))
}

/// Disk and partition name of `major:minor`, from the last two segments of its
/// `/sys/dev/block` link. A whole-disk node yields an empty partition name.
pub fn disk_name_for_dev(sysfs: &SysfsRoot, major: u64, minor: u8) -> Result<(String, String)> {
    let link_path = format!("/sys/dev/block/{major}:{minor}");
    let link = sysfs.read_link(&link_path)?;

    let (parent, last) = link
        .rsplit_once('/')
        .ok_or_else(|| TopologyError::malformed(&link, "no parent directory in link"))?;
    let (_, grandparent) = parent
        .rsplit_once('/')
        .ok_or_else(|| TopologyError::malformed(&link, "no grandparent directory in link"))?;
    if last.is_empty() || grandparent.is_empty() {
        return Err(TopologyError::malformed(&link, "empty device name in link"));
    }

    if grandparent == "block" {
        Ok((last.to_string(), String::new()))
    } else {
        Ok((grandparent.to_string(), last.to_string()))
    }
}

/// Parses the `<bus>:<device>:<target>:<lun>` last segment of a disk's `device` link.
pub fn parse_scsi_device_link(link: &str) -> Option<ScsiAddress> {
    let last = link.rsplit('/').next()?;
    let mut s = Scanner::new(last);
    let (bus, device, target, lun) = parse_scsi_quad::<u32>(&mut s)?;
    s.is_empty().then_some(ScsiAddress {
        bus,
        device,
        target,
        lun,
    })
}

/// SCSI disks on buses without a dedicated grammar (USB storage, virtio-scsi, ...).
///
/// Not finding the disk's name or `device` link leaves `info` as it is; a `device` link that
/// exists but does not end in a SCSI address is an error.
fn resolve_plain_scsi(mut info: DiskInfo, sysfs: &SysfsRoot) -> Result<DiskInfo> {
    let (disk_name, part_name) = match disk_name_for_dev(sysfs, info.major, info.minor) {
        Ok(names) => names,
        Err(err) => {
            tracing::warn!(dev = %info.dev_id(), "cannot derive SCSI disk name: {err}");
            return Ok(info);
        }
    };

    let device_link = format!("/sys/class/block/{disk_name}/device");
    let link = match sysfs.read_link(&device_link) {
        Ok(link) => link,
        Err(err) => {
            tracing::warn!(disk = %disk_name, "cannot read SCSI device link: {err}");
            return Ok(info);
        }
    };

    let address = parse_scsi_device_link(&link).ok_or_else(|| {
        TopologyError::malformed(&link, "expected <bus>:<device>:<target>:<lun> as last segment")
    })?;
    tracing::debug!(disk = %disk_name, ?address, "resolved plain SCSI address");

    info.address = DiskAddress::Scsi(address);
    info.disk_name = disk_name;
    info.part_name = part_name;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sata_path_fields() {
        let path = parse_sata_path("ata1/host0/target0:0:0/0:0:0:0/block/sda/sda1").unwrap();
        assert_eq!(
            path,
            SataPath {
                print_id: 1,
                scsi_bus: 0,
                scsi_device: 0,
                scsi_target: 0,
                scsi_lun: 0,
                disk_name: "sda",
                part_name: "sda1",
                consumed: 45,
            }
        );

        let path = parse_sata_path("ata7/host6/target6:0:0/6:0:0:0/block/sdb/sdb12").unwrap();
        assert_eq!((path.print_id, path.scsi_bus), (7, 6));
        assert_eq!(path.part_name, "sdb12");
    }

    #[test]
    fn sata_whole_disk() {
        let path = parse_sata_path("ata2/host1/target1:0:0/1:0:0:0/block/sdb").unwrap();
        assert_eq!(path.disk_name, "sdb");
        assert_eq!(path.part_name, "");
    }

    #[test]
    fn committed_sata_path_rejects_partial_matches() {
        for remainder in [
            "ata1/host0",
            "ata1/host0/target0:0/0:0:0:0/block/sda/sda1",
            "ata1/host0/target0:0:0/0:0:0/block/sda/sda1",
            "ata1/host0/target0:0:0/0:0:0:0/sda/sda1",
            "ata1/host0/target0:0:0/0:0:0:0/block/sda/sda1/holders",
            "ata_port/ata1",
        ] {
            let err = parse_sata_path(remainder).unwrap_err();
            assert!(
                matches!(err, TopologyError::MalformedTopology { .. }),
                "{remainder}: {err}"
            );
        }
    }

    #[test]
    fn sas_path_fields() {
        let path =
            parse_sas_path("host4/port-4:0/end_device-4:0/target4:0:0/4:0:0:0/block/sdc/sdc1")
                .unwrap();
        assert_eq!(path.host, 4);
        assert_eq!(
            (path.scsi_bus, path.scsi_device, path.scsi_target, path.scsi_lun),
            (4, 0, 0, 0)
        );
        assert_eq!((path.disk_name, path.part_name), ("sdc", "sdc1"));
    }

    #[test]
    fn sas_expander_components_are_tolerated() {
        let path = parse_sas_path(
            "host2/port-2:0:1/end_device-2:0:1/target2:0:5/2:0:5:281474976710656/block/sdq/sdq3",
        )
        .unwrap();
        assert_eq!(path.scsi_target, 5);
        assert_eq!(path.scsi_lun, 1 << 48);
        assert_eq!(path.part_name, "sdq3");
    }

    #[test]
    fn committed_sas_path_rejects_partial_matches() {
        for remainder in [
            "host4/port-4/end_device-4:0/target4:0:0/4:0:0:0/block/sdc/sdc1",
            "host4/port-4:0/target4:0:0/4:0:0:0/block/sdc/sdc1",
            "host4/port-4:0/end_device-4:0/target4:0:0/block/sdc/sdc1",
            "host4/port-4:0/end_device-4:0/target4:0:0/4:0:0:0/block/",
        ] {
            let err = parse_sas_path(remainder).unwrap_err();
            assert!(
                matches!(err, TopologyError::MalformedTopology { .. }),
                "{remainder}: {err}"
            );
        }
    }

    #[test]
    fn sas_prefix_detection() {
        assert!(is_sas_port_path("host4/port-4:0/x"));
        assert!(!is_sas_port_path("host0/target0:0:0/0:0:0:0"));
        assert!(!is_sas_port_path("hostx/port-"));
        assert!(!is_sas_port_path("usb1/1-1"));
    }

    #[test]
    fn ata_device_names() {
        assert_eq!(parse_ata_device_name("dev1.0"), Some((1, 0, 0)));
        assert_eq!(parse_ata_device_name("dev3.1"), Some((3, 0, 1)));
        assert_eq!(parse_ata_device_name("dev5.2.0"), Some((5, 2, 0)));
        assert_eq!(parse_ata_device_name("dev5"), None);
        assert_eq!(parse_ata_device_name("dev5.2.0x"), None);
        assert_eq!(parse_ata_device_name("link5"), None);
    }

    #[test]
    fn sas_addresses() {
        assert_eq!(
            parse_sas_address("0x5000c500a1b2c3d4\n"),
            Some(0x5000_c500_a1b2_c3d4)
        );
        assert_eq!(parse_sas_address("500605b0000272b4"), Some(0x5006_05b0_0002_72b4));
        assert_eq!(parse_sas_address("0x"), None);
        assert_eq!(parse_sas_address("unknown"), None);
    }

    #[test]
    fn scsi_device_links() {
        assert_eq!(
            parse_scsi_device_link("../../../2:0:1:3"),
            Some(ScsiAddress {
                bus: 2,
                device: 0,
                target: 1,
                lun: 3
            })
        );
        assert_eq!(parse_scsi_device_link("../../../virtio3"), None);
        assert_eq!(parse_scsi_device_link("../../../2:0:1"), None);
    }
}
