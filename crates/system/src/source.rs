//! Platform sources of cumulative CPU-time samples.
//!
//! The estimator only sees the [`SampleSource`] trait; the two concrete
//! sources here read system-wide accounting from `/proc/stat` and the current
//! process's accounting through `sysinfo`.

use mx_core::sample::{self, Sample};
use mx_core::{ProcessorStats, ProcessorUsage};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use thiserror::Error;
use tracing::debug;

/// Clock ticks per second used by `/proc/stat` on every mainstream kernel.
const USER_HZ: i64 = 100;
const NANOS_PER_TICK: i64 = 1_000_000_000 / USER_HZ;
const NANOS_PER_MILLI: i64 = 1_000_000;

/// Hard failures of a sample source.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse CPU accounting: {0}")]
    Parse(String),

    #[error("process accounting unavailable: {0}")]
    Process(String),
}

/// Something that can be asked for a fresh CPU-time sample.
pub trait SampleSource {
    /// Take a sample now. Platform limitations are reported through the
    /// sample's negative status; `Err` is reserved for outright failures.
    fn current_sample(&mut self) -> Result<Sample, SampleError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn current_sample(&mut self) -> Result<Sample, SampleError> {
        (**self).current_sample()
    }
}

/// Nanoseconds elapsed since `origin`, saturating at `i64::MAX`.
fn monotonic_nanos(origin: Instant) -> i64 {
    i64::try_from(origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

/// Map an I/O failure to a status code when it means "not on this
/// platform" or "not allowed".
fn status_for_io_error(err: &io::Error) -> Option<i32> {
    match err.kind() {
        io::ErrorKind::NotFound => Some(sample::UNSUPPORTED),
        io::ErrorKind::PermissionDenied => Some(sample::INSUFFICIENT_PRIVILEGE),
        _ => None,
    }
}

/// Default location of the kernel's CPU accounting.
pub const PROC_STAT: &str = "/proc/stat";

/// Parse the tick counters of one `cpu` or `cpuN` line.
fn parse_cpu_line(id: Option<u32>, fields: &str) -> Result<ProcessorUsage, SampleError> {
    let fields = fields
        .split_whitespace()
        .map(|f| {
            f.parse::<i64>()
                .map_err(|e| SampleError::Parse(format!("bad cpu field '{f}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // user nice system idle [iowait irq softirq steal guest guest_nice]
    if fields.len() < 4 {
        return Err(SampleError::Parse(format!(
            "cpu line too short: expected at least 4 fields, got {}",
            fields.len()
        )));
    }
    let field = |idx: usize| fields.get(idx).copied().unwrap_or(0);
    let nanos = |idxs: &[usize]| {
        idxs.iter()
            .try_fold(0i64, |acc, &idx| acc.checked_add(field(idx)))
            .and_then(|ticks| ticks.checked_mul(NANOS_PER_TICK))
            .ok_or_else(|| SampleError::Parse("cpu time overflows".to_string()))
    };

    Ok(ProcessorUsage {
        id,
        user:   nanos(&[0, 1])?,
        system: nanos(&[2, 5, 6])?,
        idle:   nanos(&[3])?,
        wait:   nanos(&[4])?,
        busy:   nanos(&[0, 1, 2, 5, 6, 7])?,
    })
}

/// Parse the aggregate and per-processor lines of `/proc/stat` content.
pub fn parse_processor_stats(content: &str) -> Result<ProcessorStats, SampleError> {
    let mut total = None;
    let mut per_cpu = Vec::new();

    for line in content.lines() {
        let Some(rest) = line.strip_prefix("cpu") else {
            continue;
        };
        if let Some(fields) = rest.strip_prefix(' ') {
            total = Some(parse_cpu_line(None, fields)?);
            continue;
        }
        let (number, fields) = rest.split_once(' ').unwrap_or((rest, ""));
        if let Ok(id) = number.parse::<u32>() {
            per_cpu.push(parse_cpu_line(Some(id), fields)?);
        }
    }

    let total = total.ok_or_else(|| SampleError::Parse("no aggregate cpu line".to_string()))?;
    if per_cpu.is_empty() {
        return Err(SampleError::Parse("no per-cpu lines".to_string()));
    }
    Ok(ProcessorStats { total, per_cpu })
}

/// Read and parse a `/proc/stat` style file.
pub fn read_processor_stats(path: impl AsRef<Path>) -> Result<ProcessorStats, SampleError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| SampleError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_processor_stats(&content)
}

/// Build a sample from `/proc/stat` content.
///
/// Busy time is the aggregate `cpu` line minus idle and iowait, converted
/// from ticks to nanoseconds. The processor count is the number of `cpuN`
/// lines, i.e. the processors currently online.
pub fn parse_proc_stat(content: &str, timestamp: i64) -> Result<Sample, SampleError> {
    let stats = parse_processor_stats(content)?;
    let cpus = i32::try_from(stats.per_cpu.len()).unwrap_or(i32::MAX);
    Ok(Sample::new(timestamp, stats.total.busy, cpus))
}

/// System-wide CPU accounting read from `/proc/stat`.
#[derive(Debug)]
pub struct SystemCpuSource {
    path:   PathBuf,
    origin: Instant,
}

impl SystemCpuSource {
    pub fn new() -> Self {
        Self::with_path(PROC_STAT)
    }

    /// Read from an alternative stat file.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path:   path.as_ref().to_path_buf(),
            origin: Instant::now(),
        }
    }
}

impl Default for SystemCpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SystemCpuSource {
    fn current_sample(&mut self) -> Result<Sample, SampleError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if let Some(status) = status_for_io_error(&e) {
                    debug!(path = %self.path.display(), status, "system CPU accounting unavailable");
                    return Ok(Sample::with_status(status));
                }
                return Err(SampleError::Read {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        parse_proc_stat(&content, monotonic_nanos(self.origin))
    }
}

/// CPU accounting of the current process.
///
/// The processor count in each sample is the number of processors this
/// process may run on (affinity mask and CPU quota), so the process load is
/// relative to the capacity the process can actually use. [`SystemCpuSource`]
/// instead counts every online processor on the machine.
pub struct ProcessCpuSource {
    sys:    System,
    pid:    Pid,
    origin: Instant,
}

impl ProcessCpuSource {
    pub fn new() -> Result<Self, SampleError> {
        let pid = sysinfo::get_current_pid().map_err(|e| SampleError::Process(e.to_string()))?;
        Ok(Self {
            sys: System::new(),
            pid,
            origin: Instant::now(),
        })
    }
}

impl SampleSource for ProcessCpuSource {
    fn current_sample(&mut self) -> Result<Sample, SampleError> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu(),
        );
        let timestamp = monotonic_nanos(self.origin);

        let process = self
            .sys
            .process(self.pid)
            .ok_or_else(|| SampleError::Process(format!("pid {} not found", self.pid)))?;

        let cpu_millis = i64::try_from(process.accumulated_cpu_time())
            .map_err(|_| SampleError::Process("cpu time overflows".to_string()))?;
        let cpu_time = cpu_millis
            .checked_mul(NANOS_PER_MILLI)
            .ok_or_else(|| SampleError::Process("cpu time overflows".to_string()))?;

        Ok(Sample::new(timestamp, cpu_time, available_processors()))
    }
}

/// Processors available to this process, at least one.
pub fn available_processors() -> i32 {
    std::thread::available_parallelism()
        .map(|n| i32::try_from(n.get()).unwrap_or(i32::MAX))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_FIXTURE: &str = "cpu  100 10 40 800 20 5 5 0 0 0
cpu0 50 5 20 400 10 3 2 0 0 0
cpu1 50 5 20 400 10 2 3 0 0 0
intr 4287231 0 0 0
ctxt 1234567
btime 1234567890
processes 12345
procs_running 2
procs_blocked 0";

    #[test]
    fn parses_busy_time_and_processor_count() {
        let sample = parse_proc_stat(STAT_FIXTURE, 42).unwrap();
        assert_eq!(sample.timestamp, 42);
        assert_eq!(sample.number_of_cpus, 2);
        // user + nice + system + irq + softirq + steal = 160 ticks
        assert_eq!(sample.cpu_time, 160 * NANOS_PER_TICK);
        assert!(sample.is_ok());
    }

    #[test]
    fn short_lines_default_missing_fields_to_zero() {
        let sample = parse_proc_stat("cpu 1 2 3 4\ncpu0 1 2 3 4\n", 0).unwrap();
        assert_eq!(sample.cpu_time, 6 * NANOS_PER_TICK);
    }

    #[test]
    fn missing_aggregate_line_is_a_parse_error() {
        let err = parse_proc_stat("cpu0 1 2 3 4\n", 0).unwrap_err();
        assert!(matches!(err, SampleError::Parse(_)));
    }

    #[test]
    fn garbage_field_is_a_parse_error() {
        assert!(parse_proc_stat("cpu 1 x 3 4\ncpu0 1 2 3 4\n", 0).is_err());
    }

    #[test]
    fn missing_stat_file_reports_unsupported() {
        let mut source = SystemCpuSource::with_path("/nonexistent/proc/stat");
        let sample = source.current_sample().unwrap();
        assert_eq!(sample.status, sample::UNSUPPORTED);
    }

    #[test]
    fn io_errors_map_to_status_codes() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(status_for_io_error(&denied), Some(sample::INSUFFICIENT_PRIVILEGE));
        let other = io::Error::from(io::ErrorKind::Interrupted);
        assert_eq!(status_for_io_error(&other), None);
    }

    #[test]
    fn available_processors_is_positive() {
        assert!(available_processors() >= 1);
    }

    #[test]
    fn splits_time_per_processor_and_state() {
        let stats = parse_processor_stats(STAT_FIXTURE).unwrap();
        assert_eq!(stats.online(), 2);
        assert_eq!(stats.total.id, None);
        assert_eq!(stats.total.user, 110 * NANOS_PER_TICK);
        assert_eq!(stats.total.system, 50 * NANOS_PER_TICK);
        assert_eq!(stats.total.idle, 800 * NANOS_PER_TICK);
        assert_eq!(stats.total.wait, 20 * NANOS_PER_TICK);

        let cpu1 = stats.per_cpu[1];
        assert_eq!(cpu1.id, Some(1));
        assert_eq!(cpu1.busy, (50 + 5 + 20 + 2 + 3) * NANOS_PER_TICK);
        assert_eq!(cpu1.idle, 400 * NANOS_PER_TICK);
    }

    #[test]
    fn missing_per_cpu_lines_is_a_parse_error() {
        let err = parse_processor_stats("cpu 1 2 3 4\nintr 0\n").unwrap_err();
        assert!(matches!(err, SampleError::Parse(_)));
    }

    #[test]
    fn reads_processor_stats_from_file() {
        let path = std::env::temp_dir().join(format!("mxstat-stat-{}", std::process::id()));
        std::fs::write(&path, STAT_FIXTURE).unwrap();
        let stats = read_processor_stats(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(stats.unwrap().per_cpu.len(), 2);
    }

    #[test]
    fn missing_processor_stats_file_is_a_read_error() {
        let err = read_processor_stats("/nonexistent/proc/stat").unwrap_err();
        assert!(matches!(err, SampleError::Read { .. }));
    }

    #[test]
    fn process_samples_count_usable_processors() {
        let mut source = ProcessCpuSource::new().unwrap();
        let sample = source.current_sample().unwrap();
        assert_eq!(sample.number_of_cpus, available_processors());
        assert!(sample.cpu_time >= 0);
    }
}
