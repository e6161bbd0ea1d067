//! Worker-count heuristics
//!
//! Pools sized exactly to the hardware starve when tasks block on I/O, so
//! the default adds headroom that scales down as core counts grow.

/// Biases a hardware thread count upward to tolerate blocking tasks.
///
/// Machines reporting a single hardware thread still get two workers; small
/// machines (up to 8) get two extra, mid-sized machines (up to 64) four
/// extra, and anything larger eight extra.
pub fn bias_thread_count(hardware_threads: usize) -> usize {
    match hardware_threads {
        0 | 1 => 2,
        2..=8 => hardware_threads + 2,
        9..=64 => hardware_threads + 4,
        _ => hardware_threads + 8,
    }
}

/// Resolves a requested worker count.
///
/// A non-zero request is honored exactly; zero selects the biased hardware
/// count from [`bias_thread_count`].
pub fn select_thread_count(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        bias_thread_count(num_cpus::get())
    }
}

/// Returns the hardware thread count, raised to at least `min`.
pub fn max_threads(min: usize) -> usize {
    num_cpus::get().max(min)
}
