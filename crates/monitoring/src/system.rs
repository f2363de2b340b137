//! Host introspection for the node process and its data directory

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use sysinfo::{DiskExt, PidExt, ProcessExt, System, SystemExt};

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessStats {
    pub cpu_percent: f64,
    pub memory_rss_mb: f64,
    pub open_files: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_percent: f64,
}

impl DiskUsage {
    /// Builds usage from byte counts, rounding to two decimals
    pub fn from_bytes(total: u64, available: u64) -> Self {
        let used = total.saturating_sub(available);
        let free_percent = if total == 0 {
            0.0
        } else {
            available as f64 / total as f64 * 100.0
        };
        Self {
            total_gb: round2(total as f64 / GIB),
            used_gb: round2(used as f64 / GIB),
            free_percent: round2(free_percent),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Process and filesystem lookups; both return `None` for a soft miss
pub trait SystemProbe: Send + Sync {
    fn process(&self, name: &str) -> Option<ProcessStats>;

    fn disk_usage(&self, path: &Path) -> Option<DiskUsage>;
}

/// [`SystemProbe`] backed by `sysinfo`.
///
/// CPU usage is computed between two refreshes, so the `System` is kept and
/// refreshed on every call; the first sample for a process reads 0.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl SystemProbe for SysinfoProbe {
    fn process(&self, name: &str) -> Option<ProcessStats> {
        let mut system = self.system.lock();
        system.refresh_processes();
        let process = system.processes_by_exact_name(name).next()?;
        Some(ProcessStats {
            cpu_percent: f64::from(process.cpu_usage()),
            memory_rss_mb: process.memory() as f64 / MIB,
            open_files: open_descriptor_count(process.pid().as_u32()) as f64,
        })
    }

    fn disk_usage(&self, path: &Path) -> Option<DiskUsage> {
        if !path.exists() {
            return None;
        }
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut system = self.system.lock();
        system.refresh_disks_list();
        let mounts: Vec<(PathBuf, u64, u64)> = system
            .disks()
            .iter()
            .map(|disk| {
                (
                    disk.mount_point().to_path_buf(),
                    disk.total_space(),
                    disk.available_space(),
                )
            })
            .collect();
        let (_, total, available) = longest_mount_prefix(&target, &mounts)?;
        Some(DiskUsage::from_bytes(*total, *available))
    }
}

/// The mount whose path is the longest prefix of `target`
pub fn longest_mount_prefix<'a>(
    target: &Path,
    mounts: &'a [(PathBuf, u64, u64)],
) -> Option<&'a (PathBuf, u64, u64)> {
    mounts
        .iter()
        .filter(|(mount, _, _)| target.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
}

#[cfg(target_os = "linux")]
fn open_descriptor_count(pid: u32) -> usize {
    std::fs::read_dir(format!("/proc/{pid}/fd"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn open_descriptor_count(_pid: u32) -> usize {
    0
}
