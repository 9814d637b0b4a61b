//! Parsing of the PCI part of a `/sys/dev/block/<major>:<minor>` link target.
//!
//! A SATA disk behind an AHCI controller looks like
//!
//! ```text
//! ../../devices/pci0000:00/0000:00:1f.2/ata1/host0/target0:0:0/0:0:0:0/block/sda/sda1
//!               ^root      ^hop         ^remainder for the bus resolver
//! ```
//!
//! and a SAS disk behind a bridge has more than one hop:
//!
//! ```text
//! ../../devices/pci0000:00/0000:00:01.0/0000:01:00.0/host4/port-4:0/...
//! ```

use crate::error::{Result, TopologyError};
use crate::model::{PciAddress, PciRoot};
use crate::scan::Scanner;

const ROOT_PREFIX: &str = "../../devices/pci";

/// PCI topology at the head of a sysfs device path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciWalk<'a> {
    pub root: PciRoot,
    /// Bridge hops from the root; never empty, and the last hop is the controller.
    pub chain: Vec<PciAddress>,
    /// Text after the last hop, left for the bus-family resolver.
    pub remainder: &'a str,
}

impl PciWalk<'_> {
    pub fn controller(&self) -> Option<&PciAddress> {
        self.chain.last()
    }
}

fn parse_root(s: &mut Scanner<'_>) -> Option<PciRoot> {
    s.attempt(|s| {
        s.literal(ROOT_PREFIX)?;
        let domain = s.hex_exact(4)?;
        s.literal(":")?;
        let bus = s.hex_exact(2)?;
        s.literal("/")?;
        Some(PciRoot { domain, bus })
    })
}

fn parse_hop(s: &mut Scanner<'_>) -> Option<PciAddress> {
    s.attempt(|s| {
        let domain = s.hex(usize::MAX)?;
        s.literal(":")?;
        let bus = s.hex(usize::MAX)?;
        s.literal(":")?;
        let device = s.hex(usize::MAX)?;
        s.literal(".")?;
        let function = s.hex(usize::MAX)?;
        s.literal("/")?;
        Some(PciAddress {
            domain,
            bus,
            device,
            function,
        })
    })
}

/// Splits a sysfs device link target into its PCI root, bridge chain and the remainder.
///
/// Fails with [`TopologyError::MalformedTopology`] if the target does not start at a PCI root
/// complex or no bridge hop follows it.
pub fn walk_pci_chain(link: &str) -> Result<PciWalk<'_>> {
    let mut s = Scanner::new(link);
    let root = parse_root(&mut s).ok_or_else(|| {
        TopologyError::malformed(link, "expected ../../devices/pci<domain>:<bus>/")
    })?;

    let mut chain = Vec::new();
    while let Some(hop) = parse_hop(&mut s) {
        chain.push(hop);
    }
    if chain.is_empty() {
        return Err(TopologyError::malformed(
            link,
            "no <domain>:<bus>:<device>.<function>/ hop after the PCI root",
        ));
    }

    Ok(PciWalk {
        root,
        chain,
        remainder: s.rest(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sata_disk_behind_one_hop() {
        let walk = walk_pci_chain(
            "../../devices/pci0000:00/0000:00:1f.2/ata1/host0/target0:0:0/0:0:0:0/block/sda/sda1",
        )
        .unwrap();
        assert_eq!(walk.root, PciRoot { domain: 0, bus: 0 });
        assert_eq!(
            walk.chain,
            vec![PciAddress {
                domain: 0,
                bus: 0,
                device: 0x1f,
                function: 2
            }]
        );
        assert_eq!(
            walk.remainder,
            "ata1/host0/target0:0:0/0:0:0:0/block/sda/sda1"
        );
    }

    #[test]
    fn bridge_chain_is_kept_in_order() {
        let walk = walk_pci_chain(
            "../../devices/pci0001:80/0001:80:01.0/0001:81:00.0/host4/port-4:0/end_device-4:0",
        )
        .unwrap();
        assert_eq!(walk.root, PciRoot { domain: 1, bus: 0x80 });
        assert_eq!(walk.chain.len(), 2);
        assert_eq!(walk.chain[0].to_string(), "0001:80:01.0");
        assert_eq!(walk.controller().unwrap().to_string(), "0001:81:00.0");
        assert_eq!(walk.remainder, "host4/port-4:0/end_device-4:0");
    }

    #[test]
    fn hex_looking_bus_segment_is_not_a_hop() {
        // `ata1` starts with a hex digit; it must not be mistaken for a hop.
        let walk = walk_pci_chain("../../devices/pci0000:00/0000:00:17.0/ata3/host2").unwrap();
        assert_eq!(walk.chain.len(), 1);
        assert_eq!(walk.remainder, "ata3/host2");
    }

    #[test]
    fn missing_pci_root_is_malformed() {
        for link in [
            "../../devices/platform/host0/target0:0:0/0:0:0:0/block/sda",
            "../../devices/virtual/block/loop0",
            "devices/pci0000:00/0000:00:1f.2/ata1",
            "../../devices/pci000:00/0000:00:1f.2/ata1",
            "../../devices/pci0000:000/0000:00:1f.2/ata1",
        ] {
            let err = walk_pci_chain(link).unwrap_err();
            assert!(
                matches!(err, TopologyError::MalformedTopology { .. }),
                "{link}: {err}"
            );
        }
    }

    #[test]
    fn root_without_hops_is_malformed() {
        let err = walk_pci_chain("../../devices/pci0000:00/usb1/1-1").unwrap_err();
        assert!(matches!(err, TopologyError::MalformedTopology { .. }));
    }

    #[test]
    fn out_of_range_hop_fields_stop_the_chain() {
        let err = walk_pci_chain("../../devices/pci0000:00/0000:100:00.0/host0").unwrap_err();
        assert!(matches!(err, TopologyError::MalformedTopology { .. }));
    }
}
