use tracing::debug;

use super::error::{Query, ResourceQueryError};
use super::platform::{MetricsProvider, Platform};
use super::snapshot::{UsageReport, UsageSnapshot};

/// Best-effort CPU and memory load of one process.
///
/// Holds no state between calls; every query goes straight to the provider.
#[derive(Clone, Debug, Default)]
pub struct ResourceSampler<P = Platform> {
    provider: P,
}

impl ResourceSampler<Platform> {
    pub fn current_process() -> Self {
        Self::new(Platform::current())
    }
}

impl<P: MetricsProvider> ResourceSampler<P> {
    pub fn new(provider: P) -> Self {
        ResourceSampler { provider }
    }

    /// Sum of per-thread CPU percentages over non-idle threads.
    ///
    /// Not normalized by core count, so several busy threads push it past 100.
    /// Threads that fail to report are skipped.
    pub fn cpu_usage_percent(&self) -> Result<f64, ResourceQueryError> {
        let _span = tracing::debug_span!("sampler.cpu_usage_percent").entered();

        let sample = self.provider.thread_sample()?;
        let total = sample.total_percent();
        debug!(
            threads = sample.len(),
            unreported = sample.unreported_count(),
            total,
            "sampled thread table"
        );
        Ok(total)
    }

    /// Resident size as a percentage of host physical memory.
    pub fn memory_usage_percent(&self) -> Result<f64, ResourceQueryError> {
        let _span = tracing::debug_span!("sampler.memory_usage_percent").entered();

        let resident = self.provider.resident_size()?;
        let physical = self.provider.physical_memory()?;
        if physical == 0 {
            return Err(ResourceQueryError::unknown(Query::PhysicalMemory));
        }
        debug!(resident, physical, "sampled task memory");
        Ok(resident as f64 * 100.0 / physical as f64)
    }

    /// Both readings, each with its own outcome.
    pub fn usage_report(&self) -> UsageReport {
        UsageReport {
            cpu: self.cpu_usage_percent(),
            memory: self.memory_usage_percent(),
        }
    }

    /// Both readings; a failed query reads as `0.0` for its field only.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        let report = self.usage_report();
        report.log_failures();
        report.snapshot()
    }
}
