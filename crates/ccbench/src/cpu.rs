//! Local CPU utilisation sampling.

use std::thread;
use std::time::Duration;

use sysinfo::System;

pub struct CpuSampler {
    system: System,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Global CPU usage (%) measured over `window`.
    ///
    /// Blocks for at least `window`, or the minimum interval sysinfo needs
    /// between refreshes if that is longer.
    pub fn sample(&mut self, window: Duration) -> f32 {
        self.system.refresh_cpu_usage();
        thread::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        self.system.refresh_cpu_usage();
        self.system.global_cpu_usage()
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_a_percentage() {
        let mut sampler = CpuSampler::new();
        let usage = sampler.sample(Duration::from_millis(10));
        assert!((0.0..=100.0).contains(&usage), "usage {usage}");
    }
}
