#![forbid(unsafe_code)]

use std::fmt;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use efidisk_topology::ioctl::{self, PciSlot, ScsiIdLun};
use efidisk_topology::{DiskAddress, DiskInfo, Resolver, SysfsRoot};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "efidisk-info")]
#[command(about = "Show the hardware topology of a block device, or of the disk holding a file")]
struct Cli {
    /// Block device node, or any file on the filesystem to inspect.
    path: PathBuf,

    /// Directory `/sys` and `/proc` are read from (default: $EFIDISK_ROOT, then /).
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// Also run the legacy SCSI id/lun and PCI slot ioctls on PATH.
    #[arg(long)]
    scsi_probes: bool,
}

#[derive(Debug, Serialize)]
struct ScsiProbes {
    idlun: std::result::Result<ScsiIdLun, String>,
    pci_slot: std::result::Result<PciSlot, String>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    disk: &'a DiskInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    scsi_probes: Option<ScsiProbes>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let sysfs = cli.root.map(SysfsRoot::new).unwrap_or_else(SysfsRoot::from_env);
    tracing::debug!(root = %sysfs.root().display(), "using sysfs root");

    let file = File::open(&cli.path).with_context(|| format!("open {}", cli.path.display()))?;
    let disk = Resolver::new(sysfs)
        .disk_info_from_fd(&file)
        .with_context(|| format!("resolve topology of {}", cli.path.display()))?;

    let scsi_probes = cli.scsi_probes.then(|| {
        let fd = file.as_raw_fd();
        ScsiProbes {
            idlun: ioctl::scsi_idlun(fd).map_err(|e| e.to_string()),
            pci_slot: ioctl::scsi_pci_slot(fd).map_err(|e| e.to_string()),
        }
    });

    let report = Report {
        disk: &disk,
        scsi_probes,
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let disk = self.disk;
        writeln!(f, "device:      {}", disk.dev_id())?;
        writeln!(f, "interface:   {}", disk.interface_type)?;
        writeln!(
            f,
            "numbers:     controller {} disk {} partition {}",
            disk.controller_number, disk.disk_number, disk.partition_number
        )?;
        if !disk.disk_name.is_empty() {
            if disk.part_name.is_empty() {
                writeln!(f, "name:        {}", disk.disk_name)?;
            } else {
                writeln!(f, "name:        {} ({})", disk.disk_name, disk.part_name)?;
            }
        }
        if !disk.pci_root.is_unset() {
            writeln!(f, "pci root:    {}", disk.pci_root)?;
        }
        if !disk.pci_chain.is_empty() {
            let hops: Vec<String> = disk.pci_chain.iter().map(ToString::to_string).collect();
            writeln!(f, "pci chain:   {}", hops.join(" -> "))?;
        }
        match disk.address {
            DiskAddress::None => {}
            DiskAddress::Scsi(a) => {
                writeln!(f, "scsi:        {}:{}:{}:{}", a.bus, a.device, a.target, a.lun)?;
            }
            DiskAddress::Sata(a) => {
                writeln!(
                    f,
                    "scsi:        {}:{}:{}:{}",
                    a.scsi_bus, a.scsi_device, a.scsi_target, a.scsi_lun
                )?;
                writeln!(
                    f,
                    "ata:         port {} pmp {} devno {}",
                    a.ata_port, a.ata_pmp, a.ata_devno
                )?;
            }
            DiskAddress::Sas(a) => {
                writeln!(
                    f,
                    "scsi:        {}:{}:{}:{}",
                    a.scsi_bus, a.scsi_device, a.scsi_target, a.scsi_lun
                )?;
                writeln!(f, "sas address: {:#018x}", a.sas_address)?;
            }
            DiskAddress::Nvme { namespace_id } => writeln!(f, "nvme nsid:   {namespace_id}")?,
        }

        if let Some(probes) = &self.scsi_probes {
            match &probes.idlun {
                Ok(v) => writeln!(
                    f,
                    "scsi idlun:  host {} channel {} id {} lun {}",
                    v.host, v.channel, v.id, v.lun
                )?,
                Err(err) => writeln!(f, "scsi idlun:  {err}")?,
            }
            match &probes.pci_slot {
                Ok(v) => writeln!(
                    f,
                    "scsi pci:    {:02x}:{:02x}.{:x}",
                    v.bus, v.device, v.function
                )?,
                Err(err) => writeln!(f, "scsi pci:    {err}")?,
            }
        }
        Ok(())
    }
}
