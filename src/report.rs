//! Plain-text end-of-run report.

use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, TimeZone};
use sysinfo::{Disk, Disks, System};

use crate::sequencer::RunSummary;

const RULE: &str = "========================================";
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Free and total space of one volume, in GiB
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSpace {
    pub name: String,
    pub free_gb: f64,
    pub total_gb: f64,
}

/// Snapshot of the host, printed at the top of the report
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub os: String,
    pub host: String,
    pub memory_free_gb: f64,
    pub memory_total_gb: f64,
    /// None when the volume could not be found
    pub disk: Option<DiskSpace>,
    pub cpu_count: usize,
    pub cpu_percent: f32,
}

impl SystemInfo {
    /// Sample the host. Blocks for the CPU usage sampling interval.
    pub fn gather(drive: &str) -> Self {
        let mut system = System::new_all();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_cpu_usage();

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let os = System::long_os_version()
            .unwrap_or_else(|| format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH));

        Self {
            os,
            host,
            memory_free_gb: system.available_memory() as f64 / GIB,
            memory_total_gb: system.total_memory() as f64 / GIB,
            disk: disk_space(drive),
            cpu_count: system.cpus().len(),
            cpu_percent: system.global_cpu_usage(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let disk = match &self.disk {
            Some(disk) => format!(
                "Disk {}: {:.1}GB free / {:.1}GB total ({:.1}% free)",
                disk.name,
                disk.free_gb,
                disk.total_gb,
                percent(disk.free_gb, disk.total_gb)
            ),
            None => "Disk: N/A".to_string(),
        };
        vec![
            format!("OS: {}", self.os),
            format!("Host: {}", self.host),
            format!(
                "RAM: {:.1}GB free / {:.1}GB total ({:.1}% free)",
                self.memory_free_gb,
                self.memory_total_gb,
                percent(self.memory_free_gb, self.memory_total_gb)
            ),
            disk,
            format!("CPU: {} cores ({:.1}% usage)", self.cpu_count, self.cpu_percent),
        ]
    }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

/// The volume `drive` names, else the root filesystem, else the first disk
fn disk_space(drive: &str) -> Option<DiskSpace> {
    let disks = Disks::new_with_refreshed_list();
    let wanted = drive.to_lowercase();

    let (disk, name) = match disks.list().iter().find(|d| mount_of(d).starts_with(&wanted)) {
        Some(disk) => (disk, drive.trim_end_matches(':').to_uppercase()),
        None => {
            let disk = disks
                .list()
                .iter()
                .find(|d| d.mount_point() == Path::new("/"))
                .or_else(|| disks.list().first())?;
            (disk, disk.mount_point().display().to_string())
        }
    };

    Some(DiskSpace {
        name,
        free_gb: disk.available_space() as f64 / GIB,
        total_gb: disk.total_space() as f64 / GIB,
    })
}

fn mount_of(disk: &Disk) -> String {
    disk.mount_point().to_string_lossy().to_lowercase()
}

/// Render the report: header, per-step outcomes, then the captured transcript
pub fn render<Tz>(
    summary: &RunSummary,
    transcript: &str,
    system: &SystemInfo,
    generated_at: &DateTime<Tz>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Windows Health Check Tool - Report");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out);
    let _ = writeln!(out, "System Information:");
    for line in system.lines() {
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Results:");
    let _ = writeln!(out, "{RULE}");
    if summary.reports.is_empty() {
        let _ = writeln!(out, "(no diagnostics ran)");
    }
    for (i, report) in summary.reports.iter().enumerate() {
        let outcome = summary.effective_outcome(i).unwrap_or(report.outcome());
        let _ = writeln!(
            out,
            "{:<24} {:<18} exit {:>3}  {:>6.1}s  {}",
            report.display_name,
            outcome.label(),
            report.result.exit_code,
            report.result.duration.as_secs_f64(),
            report.classification.message
        );
    }
    for id in &summary.skipped {
        let _ = writeln!(out, "{:<24} skipped (unknown tool)", id);
    }
    if summary.cancelled {
        let _ = writeln!(out, "Run stopped before completion.");
    }
    let overall = summary.overall();
    let _ = writeln!(out, "Overall: {}", overall.label());
    let _ = writeln!(out);

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Execution Output:");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "{}", transcript.trim_end());
    let _ = writeln!(out);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "End of Report");
    let _ = writeln!(out, "{RULE}");
    out
}
