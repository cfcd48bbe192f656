use crate::cpu::CpuHistory;
use crate::estimator::CpuLoadEstimator;
use crate::memory::read_memory;
use crate::source::{
    available_processors, read_processor_stats, ProcessCpuSource, SampleSource, SystemCpuSource,
    PROC_STAT,
};
use chrono::Local;
use mx_core::{
    CpuLoad, LoadAverage, MemoryUsage, MxError, OsSnapshot, ProcessUsage, ProcessorStats, Result,
    MINIMUM_INTERVAL_NS,
};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

type BoxedSource = Box<dyn SampleSource + Send>;

/// Settings for an [`OperatingSystemMonitor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOptions {
    /// Minimum interval for both CPU load estimators, in nanoseconds.
    pub minimum_interval_ns: i64,
    /// Report missing CPU history as `0.0` in snapshots.
    pub cpu_load_compatibility: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            minimum_interval_ns: MINIMUM_INTERVAL_NS,
            cpu_load_compatibility: false,
        }
    }
}

/// Operating-system readings for one owner.
///
/// Each CPU load estimator sits behind its own lock, so concurrent callers
/// of the same reading are serialized while system and process readings
/// proceed independently.
pub struct OperatingSystemMonitor {
    system:     Mutex<CpuLoadEstimator<BoxedSource>>,
    process:    Mutex<CpuLoadEstimator<BoxedSource>>,
    sys:        Mutex<System>,
    pid:        Option<Pid>,
    stat_path:  PathBuf,
    compatible: bool,
}

impl OperatingSystemMonitor {
    /// Monitor the host (`/proc/stat`) and the current process.
    pub fn new(options: &MonitorOptions) -> Result<Self> {
        let process = ProcessCpuSource::new().map_err(|e| MxError::System(e.to_string()))?;
        Ok(Self::with_sources(SystemCpuSource::new(), process, options))
    }

    /// Monitor with caller-supplied sample sources.
    pub fn with_sources(
        system: impl SampleSource + Send + 'static,
        process: impl SampleSource + Send + 'static,
        options: &MonitorOptions,
    ) -> Self {
        let estimator = |source: BoxedSource| {
            Mutex::new(CpuLoadEstimator::with_minimum_interval(
                source,
                options.minimum_interval_ns,
            ))
        };
        Self {
            system:     estimator(Box::new(system)),
            process:    estimator(Box::new(process)),
            sys:        Mutex::new(System::new()),
            pid:        sysinfo::get_current_pid().ok(),
            stat_path:  PathBuf::from(PROC_STAT),
            compatible: options.cpu_load_compatibility,
        }
    }

    /// Read per-processor accounting from an alternative stat file.
    pub fn with_stat_path(mut self, path: impl AsRef<Path>) -> Self {
        self.stat_path = path.as_ref().to_path_buf();
        self
    }

    /// Recent CPU load of the whole machine.
    pub fn system_cpu_load(&self) -> CpuLoad {
        measure(&self.system, "system")
    }

    /// Recent CPU load of this process, relative to the processors it may
    /// run on.
    pub fn process_cpu_load(&self) -> CpuLoad {
        measure(&self.process, "process")
    }

    pub fn available_processors(&self) -> u32 {
        available_processors().unsigned_abs()
    }

    pub fn memory(&self) -> MemoryUsage {
        let mut sys = self.sys.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_memory();
        read_memory(&sys)
    }

    pub fn load_average(&self) -> LoadAverage {
        let avg = System::load_average();
        LoadAverage {
            one:     avg.one,
            five:    avg.five,
            fifteen: avg.fifteen,
        }
    }

    /// Cumulative CPU time of this process, in nanoseconds, as of the last
    /// good process sample.
    pub fn process_cpu_time(&self) -> Option<i64> {
        let est = self.process.lock().ok()?;
        est.last_sample().map(|s| s.cpu_time)
    }

    /// Memory and file-descriptor usage of this process.
    pub fn process_usage(&self) -> Option<ProcessUsage> {
        let pid = self.pid?;
        let cpu_time_ns = self.process_cpu_time();

        let mut sys = self.sys.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let process = sys.process(pid)?;

        Some(ProcessUsage {
            cpu_time_ns,
            physical_memory:  process.memory(),
            virtual_memory:   process.virtual_memory(),
            open_files:       process.open_files().map(|n| n as u64),
            open_files_limit: process.open_files_limit().map(|n| n as u64),
        })
    }

    /// Cumulative machine-wide and per-processor accounting.
    pub fn processor_stats(&self) -> Option<ProcessorStats> {
        match read_processor_stats(&self.stat_path) {
            Ok(stats) => Some(stats),
            Err(e) => {
                debug!("processor accounting unavailable: {e}");
                None
            }
        }
    }

    /// Processors currently online on the machine.
    pub fn online_processors(&self) -> Option<u32> {
        self.processor_stats().map(|s| s.online())
    }

    /// Take every reading once. Valid system loads are added to `history`.
    pub fn snapshot(&self, history: &mut CpuHistory) -> OsSnapshot {
        let system_load = self.system_cpu_load();
        if let Some(load) = system_load.load() {
            history.push(load);
        }
        let process_load = self.process_cpu_load();
        debug!(?system_load, ?process_load, "CPU readings");
        let processors = self.processor_stats();

        OsSnapshot {
            taken_at:             Local::now(),
            available_processors: self.available_processors(),
            online_processors:    processors.as_ref().map(ProcessorStats::online),
            system_cpu_load:      system_load.reported(self.compatible),
            process_cpu_load:     process_load.reported(self.compatible),
            system_cpu_average:   history.average(),
            load_average:         self.load_average(),
            memory:               self.memory(),
            processors,
            process:              self.process_usage(),
        }
    }
}

fn measure(estimator: &Mutex<CpuLoadEstimator<BoxedSource>>, which: &str) -> CpuLoad {
    match estimator.lock() {
        Ok(mut est) => est.sample(),
        Err(_) => {
            warn!("{which} CPU load estimator lock poisoned");
            CpuLoad::InternalError
        }
    }
}
