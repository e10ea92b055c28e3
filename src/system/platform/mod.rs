use sysinfo::System;

use super::error::{Query, ResourceQueryError};

/// Scheduling info one thread reported.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThreadSchedInfo {
    /// Share of one core, 1.0 meaning fully busy.
    pub usage_fraction: f64,
    pub idle: bool,
}

impl ThreadSchedInfo {
    pub fn cpu_percent(&self) -> f64 {
        if self.idle {
            0.0
        } else {
            self.usage_fraction * 100.0
        }
    }
}

/// Threads seen by one enumeration. `None` marks a thread that was listed
/// but failed to report its scheduling info.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThreadCpuSample {
    threads: Vec<Option<ThreadSchedInfo>>,
}

impl ThreadCpuSample {
    pub fn push(&mut self, info: ThreadSchedInfo) {
        self.threads.push(Some(info));
    }

    pub fn push_unreported(&mut self) {
        self.threads.push(None);
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn reported(&self) -> impl Iterator<Item = &ThreadSchedInfo> {
        self.threads.iter().flatten()
    }

    pub fn unreported_count(&self) -> usize {
        self.threads.iter().filter(|t| t.is_none()).count()
    }

    /// Sum of per-thread percentages, skipping unreported and idle threads.
    pub fn total_percent(&self) -> f64 {
        // fold from +0.0; `sum` starts at -0.0 for an empty table
        self.reported()
            .map(ThreadSchedInfo::cpu_percent)
            .fold(0.0, |total, pct| total + pct)
    }
}

impl FromIterator<Option<ThreadSchedInfo>> for ThreadCpuSample {
    fn from_iter<I: IntoIterator<Item = Option<ThreadSchedInfo>>>(iter: I) -> Self {
        Self {
            threads: iter.into_iter().collect(),
        }
    }
}

/// OS introspection for one process. The value itself is the process handle.
pub trait MetricsProvider {
    fn thread_sample(&self) -> Result<ThreadCpuSample, ResourceQueryError>;

    /// Resident set size in bytes.
    fn resident_size(&self) -> Result<u64, ResourceQueryError>;

    /// Physical memory of the host in bytes.
    fn physical_memory(&self) -> Result<u64, ResourceQueryError> {
        host_physical_memory()
    }
}

impl<P: MetricsProvider + ?Sized> MetricsProvider for &P {
    fn thread_sample(&self) -> Result<ThreadCpuSample, ResourceQueryError> {
        (**self).thread_sample()
    }

    fn resident_size(&self) -> Result<u64, ResourceQueryError> {
        (**self).resident_size()
    }

    fn physical_memory(&self) -> Result<u64, ResourceQueryError> {
        (**self).physical_memory()
    }
}

pub fn host_physical_memory() -> Result<u64, ResourceQueryError> {
    let mut sys = System::new();
    sys.refresh_memory();
    match sys.total_memory() {
        0 => Err(ResourceQueryError::unknown(Query::PhysicalMemory)),
        total => Ok(total),
    }
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
mod unsupported;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as platform_impl;
#[cfg(target_os = "macos")]
use macos as platform_impl;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
use unsupported as platform_impl;
#[cfg(target_os = "windows")]
use windows as platform_impl;

/// Provider for the platform this crate was built for.
pub use platform_impl::Platform;
