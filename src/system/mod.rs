pub mod error;
pub mod platform;
pub mod sampler;
pub mod snapshot;

pub use error::{Query, ResourceQueryError};
pub use platform::{MetricsProvider, Platform, ThreadCpuSample, ThreadSchedInfo};
pub use sampler::ResourceSampler;
pub use snapshot::{UsageReport, UsageSnapshot};
