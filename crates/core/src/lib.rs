pub mod error;
pub mod load;
pub mod sample;
pub mod state;

pub use error::{MxError, Result};
pub use load::{CpuLoad, MINIMUM_INTERVAL_NS};
pub use sample::Sample;
pub use state::{
    LoadAverage, MemoryUsage, OsSnapshot, ProcessUsage, ProcessorStats, ProcessorUsage,
};
