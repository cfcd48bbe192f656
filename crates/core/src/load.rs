//! CPU load readings and the sentinel values used to report them.

/// Smallest interval, in nanoseconds, over which a load is computed.
pub const MINIMUM_INTERVAL_NS: i64 = 10_000_000;

/// Reported when there is not enough valid history yet.
pub const ERROR_VALUE: f64 = -1.0;
/// Reported when the platform refuses access to CPU accounting.
pub const INSUFFICIENT_PRIVILEGE: f64 = -2.0;
/// Reported when the platform has no CPU accounting at all.
pub const UNSUPPORTED: f64 = -3.0;
/// Reported when the sample source itself failed.
pub const INTERNAL_ERROR: f64 = -4.0;

/// Outcome of one CPU load measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuLoad {
    /// Fraction of total processor capacity used, in `[0, 1]`.
    Load(f64),
    /// No interval qualified yet; calling again later may succeed.
    NotYetAvailable,
    /// The source reported a negative status, passed through verbatim.
    Unavailable(i32),
    /// The source failed outright.
    InternalError,
}

impl CpuLoad {
    /// Numeric reading, with sentinels for the non-load variants.
    #[must_use]
    pub fn value(self) -> f64 {
        match self {
            CpuLoad::Load(v)         => v,
            CpuLoad::NotYetAvailable => ERROR_VALUE,
            CpuLoad::Unavailable(s)  => f64::from(s),
            CpuLoad::InternalError   => INTERNAL_ERROR,
        }
    }

    /// Like [`CpuLoad::value`], but in compatibility mode a missing history
    /// reads as idle (`0.0`) instead of [`ERROR_VALUE`].
    #[must_use]
    pub fn reported(self, compatible: bool) -> f64 {
        match self {
            CpuLoad::NotYetAvailable if compatible => 0.0,
            other => other.value(),
        }
    }

    #[must_use]
    pub fn load(self) -> Option<f64> {
        match self {
            CpuLoad::Load(v) => Some(v),
            _ => None,
        }
    }
}
