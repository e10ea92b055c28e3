use super::{MetricsProvider, ThreadCpuSample};
use crate::system::error::{Query, ResourceQueryError};

/// Stand-in for targets without process introspection; every query fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct Platform;

impl Platform {
    pub fn current() -> Self {
        Platform
    }
}

impl MetricsProvider for Platform {
    fn thread_sample(&self) -> Result<ThreadCpuSample, ResourceQueryError> {
        Err(ResourceQueryError::unknown(Query::ThreadEnumeration))
    }

    fn resident_size(&self) -> Result<u64, ResourceQueryError> {
        Err(ResourceQueryError::unknown(Query::TaskMemory))
    }
}
