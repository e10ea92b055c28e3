pub mod bridge;
pub mod config;
pub mod logging;
pub mod system;

pub use bridge::{BridgeReply, MethodCall, ResourceMonitorPlugin};
pub use system::{ResourceQueryError, ResourceSampler, UsageReport, UsageSnapshot};
