//! Lookup of dynamically assigned major numbers in `/proc/devices`.

use crate::sysfs::SysfsRoot;

/// Location of the kernel's device-number registry.
pub const PROC_DEVICES: &str = "/proc/devices";

const CHAR_SECTION: &str = "Character devices:";
const BLOCK_SECTION: &str = "Block devices:";

/// Finds the major registered for `name` in the block or character section of a registry
/// listing.
///
/// The name has to match a line's name exactly; `nvme` does not match `nvme-generic`. An
/// unterminated last line ends the scan, since it can only come from a torn read.
pub fn parse_proc_devices(listing: &str, name: &str, is_block: bool) -> Option<u32> {
    let mut in_block = false;
    let mut rest = listing;
    while let Some(nl) = rest.find('\n') {
        let line = &rest[..nl];
        rest = &rest[nl + 1..];

        match line {
            BLOCK_SECTION => {
                in_block = true;
                continue;
            }
            CHAR_SECTION => {
                in_block = false;
                continue;
            }
            _ => {}
        }
        if in_block != is_block {
            continue;
        }

        let Some((major, entry)) = line.trim_start().split_once(' ') else {
            continue;
        };
        let Ok(major) = major.parse::<u32>() else {
            continue;
        };
        if entry.trim_start_matches(' ') == name {
            return Some(major);
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CachedMajor {
    name: String,
    is_block: bool,
    major: Option<u32>,
}

/// Single-slot memo of the most recent dynamic-major query.
///
/// Callers only probe a couple of family names per run, so one slot is enough to avoid
/// re-reading the registry for repeated queries. The cache belongs to whoever owns it; there is
/// no process-wide instance.
#[derive(Debug, Clone, Default)]
pub struct DynamicMajorCache {
    last: Option<CachedMajor>,
}

impl DynamicMajorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Major currently assigned to `name`, or `None` when the registry is unreadable or lists
    /// no such family.
    pub fn resolve(&mut self, sysfs: &SysfsRoot, name: &str, is_block: bool) -> Option<u32> {
        if let Some(hit) = &self.last {
            if hit.is_block == is_block && hit.name == name {
                return hit.major;
            }
        }

        let major = match sysfs.read_attr(PROC_DEVICES) {
            Ok(listing) => parse_proc_devices(&listing, name, is_block),
            Err(err) => {
                tracing::debug!("cannot read {PROC_DEVICES}: {err}");
                None
            }
        };
        tracing::trace!(name, is_block, ?major, "dynamic major lookup");

        self.last = Some(CachedMajor {
            name: name.to_string(),
            is_block,
            major,
        });
        major
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}
