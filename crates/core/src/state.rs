use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of operating-system resource usage.
#[derive(Debug, Clone, Serialize)]
pub struct OsSnapshot {
    /// Local wall-clock time at which the snapshot was taken.
    pub taken_at: DateTime<Local>,
    /// Processors available to this process.
    pub available_processors: u32,
    /// Processors currently online on the machine, if known.
    pub online_processors: Option<u32>,
    /// System-wide CPU load in `[0, 1]`, or a negative sentinel.
    pub system_cpu_load: f64,
    /// CPU load of this process in `[0, 1]`, or a negative sentinel.
    pub process_cpu_load: f64,
    /// Mean of the recent valid system loads, `None` before the first one.
    pub system_cpu_average: Option<f64>,
    pub load_average: LoadAverage,
    pub memory: MemoryUsage,
    /// Cumulative per-processor accounting, if the platform provides it.
    pub processors: Option<ProcessorStats>,
    /// Resource usage of this process, if it could be read.
    pub process: Option<ProcessUsage>,
}

/// Resource usage of the monitored process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessUsage {
    /// Cumulative CPU time in nanoseconds, from the last good CPU sample.
    pub cpu_time_ns: Option<i64>,
    /// Resident set size in bytes.
    pub physical_memory: u64,
    /// Virtual address space size in bytes.
    pub virtual_memory: u64,
    pub open_files: Option<u64>,
    pub open_files_limit: Option<u64>,
}

/// Cumulative time one processor (or all of them) spent in each state,
/// in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorUsage {
    /// Processor number; `None` for the machine-wide total.
    pub id: Option<u32>,
    /// User time, including niced processes.
    pub user: i64,
    /// Kernel time, including interrupt servicing.
    pub system: i64,
    pub idle: i64,
    /// Time idle while waiting for I/O.
    pub wait: i64,
    /// Everything that is neither idle nor waiting.
    pub busy: i64,
}

/// Machine-wide and per-processor accounting from one reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub total: ProcessorUsage,
    pub per_cpu: Vec<ProcessorUsage>,
}

impl ProcessorStats {
    /// Number of processors that reported accounting.
    #[must_use]
    pub fn online(&self) -> u32 {
        u32::try_from(self.per_cpu.len()).unwrap_or(u32::MAX)
    }
}

/// Run-queue load averages over 1, 5 and 15 minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one:     f64,
    pub five:    f64,
    pub fifteen: f64,
}

/// Physical memory and swap figures, all in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_physical:     u64,
    pub free_physical:      u64,
    pub available_physical: u64,
    pub total_swap:         u64,
    pub free_swap:          u64,
}

impl MemoryUsage {
    /// Physical memory in use as a fraction in `[0, 1]`.
    #[must_use]
    pub fn used_fraction(&self) -> f64 {
        if self.total_physical == 0 {
            return 0.0;
        }
        let used = self.total_physical.saturating_sub(self.available_physical);
        used as f64 / self.total_physical as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_fraction_of_empty_memory_is_zero() {
        assert_eq!(MemoryUsage::default().used_fraction(), 0.0);
    }

    #[test]
    fn used_fraction_counts_unavailable_memory() {
        let mem = MemoryUsage {
            total_physical: 1000,
            available_physical: 250,
            ..MemoryUsage::default()
        };
        assert!((mem.used_fraction() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn online_counts_per_cpu_entries() {
        let stats = ProcessorStats {
            total: ProcessorUsage::default(),
            per_cpu: vec![
                ProcessorUsage { id: Some(0), ..ProcessorUsage::default() },
                ProcessorUsage { id: Some(1), ..ProcessorUsage::default() },
            ],
        };
        assert_eq!(stats.online(), 2);
        assert_eq!(ProcessorStats::default().online(), 0);
    }
}
