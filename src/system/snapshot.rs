use tracing::warn;

use super::error::ResourceQueryError;

/// One instantaneous (CPU%, memory%) pair for the current process.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UsageSnapshot {
    /// Sum of per-thread usage; can exceed 100 when several threads run at once.
    pub cpu_percent: f64,
    /// Resident size over physical memory.
    pub memory_percent: f64,
}

/// Per-field outcome of a sample, before failures are zeroed.
#[derive(Clone, Debug, PartialEq)]
pub struct UsageReport {
    pub cpu: Result<f64, ResourceQueryError>,
    pub memory: Result<f64, ResourceQueryError>,
}

impl UsageReport {
    /// Failed fields read as `0.0`.
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            cpu_percent: self.cpu.as_ref().copied().unwrap_or(0.0),
            memory_percent: self.memory.as_ref().copied().unwrap_or(0.0),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.cpu.is_err() || self.memory.is_err()
    }

    /// Warn about every field that will be zeroed.
    pub fn log_failures(&self) {
        if let Err(err) = &self.cpu {
            warn!(error = %err, "cpu usage unavailable, reporting 0");
        }
        if let Err(err) = &self.memory {
            warn!(error = %err, "memory usage unavailable, reporting 0");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::error::Query;

    #[test]
    fn failed_fields_zero_independently() {
        let report = UsageReport {
            cpu: Err(ResourceQueryError::new(Query::ThreadEnumeration, 5)),
            memory: Ok(12.5),
        };
        let snapshot = report.snapshot();
        assert_eq!(snapshot.cpu_percent, 0.0);
        assert_eq!(snapshot.memory_percent, 12.5);
        assert!(report.is_degraded());
    }

    #[test]
    fn healthy_report_is_not_degraded() {
        let report = UsageReport {
            cpu: Ok(140.0),
            memory: Ok(3.0),
        };
        assert!(!report.is_degraded());
        assert_eq!(
            report.snapshot(),
            UsageSnapshot {
                cpu_percent: 140.0,
                memory_percent: 3.0,
            }
        );
    }
}
