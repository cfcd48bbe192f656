use mx_core::MemoryUsage;
use sysinfo::System;

/// Read physical memory and swap figures from a refreshed [`System`].
pub fn read_memory(sys: &System) -> MemoryUsage {
    MemoryUsage {
        total_physical:     sys.total_memory(),
        free_physical:      sys.free_memory(),
        available_physical: sys.available_memory(),
        total_swap:         sys.total_swap(),
        free_swap:          sys.free_swap(),
    }
}

/// Format a byte count as a human-readable string (e.g. `"7.3 GiB"`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1 << 30, "GiB"), (1 << 20, "MiB"), (1 << 10, "KiB")];

    UNITS
        .iter()
        .find(|(size, _)| bytes >= *size)
        .map(|(size, unit)| format!("{:.1} {unit}", bytes as f64 / *size as f64))
        .unwrap_or_else(|| format!("{bytes} B"))
}
