//! Frequency inspection through the Linux cpufreq sysfs interface.
//!
//! Measurements are only comparable across runs when every core is locked
//! to the same frequency, so inspection fails unless all cores use the
//! `userspace` or `performance` governor and agree on the frequency.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::BencherError;

/// Core count and the single frequency (kHz) all cores run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuInfo {
    pub count: usize,
    pub frequency_khz: u64,
}

pub trait FrequencyInspector {
    fn inspect(&self) -> Result<CpuInfo, BencherError>;
}

/// Reads `<root>/devices/system/cpu/...`. `root` is `/sys` in production.
#[derive(Debug, Clone)]
pub struct SysfsInspector {
    root: PathBuf,
}

impl SysfsInspector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn cpu_dir(&self) -> PathBuf {
        self.root.join("devices").join("system").join("cpu")
    }

    fn read_trimmed(path: &Path) -> Result<String, BencherError> {
        std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| BencherError::Frequency(format!("{}: {}", path.display(), e)))
    }

    fn read_khz(path: &Path) -> Result<u64, BencherError> {
        let text = Self::read_trimmed(path)?;
        text.parse().map_err(|_| {
            BencherError::Frequency(format!("{}: not a frequency: {:?}", path.display(), text))
        })
    }

    /// Ids of the online cpus, ascending.
    fn core_ids(&self) -> Result<Vec<usize>, BencherError> {
        let cpu_dir = self.cpu_dir();
        if let Ok(online) = std::fs::read_to_string(cpu_dir.join("online"))
            && let Some(ids) = parse_cpu_list(&online)
        {
            return Ok(ids);
        }

        let entries = std::fs::read_dir(&cpu_dir)
            .map_err(|e| BencherError::Frequency(format!("{}: {}", cpu_dir.display(), e)))?;
        let mut ids: Vec<usize> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("cpu"))
                    .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
                    .and_then(|n| n.parse().ok())
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn core_frequency(&self, cpu: usize) -> Result<u64, BencherError> {
        let freq_dir = self.cpu_dir().join(format!("cpu{}", cpu)).join("cpufreq");
        let governor = Self::read_trimmed(&freq_dir.join("scaling_governor"))?;
        match governor.as_str() {
            "userspace" => Self::read_khz(&freq_dir.join("scaling_cur_freq")),
            "performance" => Self::read_khz(&freq_dir.join("scaling_max_freq")),
            other => Err(BencherError::Frequency(format!(
                "cpu {} uses governor '{}'; expected 'userspace' or 'performance'",
                cpu, other
            ))),
        }
    }
}

impl FrequencyInspector for SysfsInspector {
    fn inspect(&self) -> Result<CpuInfo, BencherError> {
        let ids = self.core_ids()?;
        let Some((&first_cpu, rest)) = ids.split_first() else {
            return Err(BencherError::Frequency(format!(
                "no cpus found under {}",
                self.cpu_dir().display()
            )));
        };

        let first = self.core_frequency(first_cpu)?;
        for &cpu in rest {
            let freq = self.core_frequency(cpu)?;
            if freq != first {
                return Err(BencherError::Frequency(format!(
                    "not all cpus are configured the same (cpu {}: {} kHz, cpu {}: {} kHz)",
                    first_cpu, first, cpu, freq
                )));
            }
        }

        let count = ids.len();
        tracing::debug!(count, frequency_khz = first, "cpu frequency verified");
        Ok(CpuInfo {
            count,
            frequency_khz: first,
        })
    }
}

/// Expand a kernel cpu list such as `0-3,6,8-9` into sorted, distinct ids.
fn parse_cpu_list(list: &str) -> Option<Vec<usize>> {
    let list = list.trim();
    if list.is_empty() {
        return None;
    }
    let mut ids = Vec::new();
    for part in list.split(',') {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.trim().parse().ok()?;
                let hi: usize = hi.trim().parse().ok()?;
                if hi < lo {
                    return None;
                }
                ids.extend(lo..=hi);
            }
            None => ids.push(part.trim().parse().ok()?),
        }
    }
    ids.sort_unstable();
    ids.dedup();
    Some(ids)
}

/// A frequency scaled to the largest fitting unit, e.g. `3.6 GHz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frequency {
    whole: u64,
    /// Fractional digits with trailing zeros removed; may be empty.
    fraction: String,
    unit: &'static str,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fraction.is_empty() {
            write!(f, "{} {}", self.whole, self.unit)
        } else {
            write!(f, "{}.{} {}", self.whole, self.fraction, self.unit)
        }
    }
}

pub fn normalize_frequency(khz: u64) -> Frequency {
    let (divisor, width, unit) = if khz >= 1_000_000 {
        (1_000_000, 6, "GHz")
    } else if khz >= 1_000 {
        (1_000, 3, "MHz")
    } else {
        return Frequency {
            whole: khz,
            fraction: String::new(),
            unit: "kHz",
        };
    };

    let fraction = format!("{:0width$}", khz % divisor, width = width);
    Frequency {
        whole: khz / divisor,
        fraction: fraction.trim_end_matches('0').to_string(),
        unit,
    }
}

/// The one-line run header: `<command> (<count> x <freq>, <isa>)`.
pub fn format_header(command: &str, info: &CpuInfo, isa: &str) -> String {
    format!(
        "{} ({} x {}, {})",
        command,
        info.count,
        normalize_frequency(info.frequency_khz),
        isa
    )
}
