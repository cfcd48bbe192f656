/// Status reported by a source that produced a usable reading.
pub const STATUS_OK: i32 = 0;
/// The caller lacks the privilege needed to read CPU accounting data.
pub const INSUFFICIENT_PRIVILEGE: i32 = -2;
/// CPU accounting is not available on this platform.
pub const UNSUPPORTED: i32 = -3;

/// A point-in-time reading of cumulative CPU consumption.
///
/// `timestamp` is nanoseconds on a monotonic clock and `cpu_time` is the
/// cumulative busy time in nanoseconds, summed over every processor the
/// source accounts for. A negative `status` means the other fields carry no
/// information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp:      i64,
    pub cpu_time:       i64,
    pub number_of_cpus: i32,
    pub status:         i32,
}

impl Sample {
    pub fn new(timestamp: i64, cpu_time: i64, number_of_cpus: i32) -> Self {
        Self {
            timestamp,
            cpu_time,
            number_of_cpus,
            status: STATUS_OK,
        }
    }

    /// A reading that only carries a status code.
    pub fn with_status(status: i32) -> Self {
        Self {
            timestamp: 0,
            cpu_time: 0,
            number_of_cpus: 0,
            status,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status >= STATUS_OK
    }
}
