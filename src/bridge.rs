//! Method-channel adapter between a host application and the sampler.
//!
//! The host sends one [`MethodCall`] and gets one [`BridgeReply`]. Over stdio
//! both travel as single-line JSON documents.

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::system::{MetricsProvider, Platform, ResourceQueryError, ResourceSampler};

pub const CHANNEL: &str = "resource_monitor";
pub const GET_RESOURCE_USAGE: &str = "getResourceUsage";
pub const CPU_KEY: &str = "cpuInUseByApp";
pub const MEMORY_KEY: &str = "memoryInUseByApp";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Channel the call was sent on; absent means this plugin's channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        MethodCall {
            channel: None,
            method: method.into(),
            arguments: Value::Null,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// The method name is not one this channel answers.
    Unavailable,
    /// Building the reply failed.
    ResourceMonitorError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::ResourceMonitorError => "RESOURCE_MONITOR_ERROR",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeError {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl BridgeError {
    fn new(code: ErrorCode, message: String) -> Self {
        BridgeError {
            code: code.as_str().to_string(),
            message,
            details: None,
        }
    }

    pub fn unrecognized(method: &str) -> Self {
        Self::new(
            ErrorCode::Unavailable,
            format!("could not recognize call for: {method}"),
        )
    }

    pub fn unknown_channel(channel: &str) -> Self {
        Self::new(
            ErrorCode::Unavailable,
            format!("no handler registered on channel: {channel}"),
        )
    }

    pub fn undecodable(reason: &serde_json::Error) -> Self {
        Self::new(
            ErrorCode::Unavailable,
            format!("could not decode call: {reason}"),
        )
    }

    pub fn resource_monitor(reason: &ReplyError) -> Self {
        Self::new(
            ErrorCode::ResourceMonitorError,
            format!("failed to retrieve resource usage: {reason}"),
        )
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.as_str()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeReply {
    Result(Map<String, Value>),
    Error(BridgeError),
}

impl BridgeReply {
    pub fn error(&self) -> Option<&BridgeError> {
        match self {
            BridgeReply::Error(err) => Some(err),
            BridgeReply::Result(_) => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ReplyError {
    #[error("{key} reading {value} is not a finite number")]
    NonFinite { key: &'static str, value: f64 },
}

/// Answers `getResourceUsage` on the `resource_monitor` channel.
#[derive(Clone, Debug)]
pub struct ResourceMonitorPlugin<P = Platform> {
    sampler: ResourceSampler<P>,
    channel: String,
    report_unavailable: bool,
}

impl Default for ResourceMonitorPlugin<Platform> {
    fn default() -> Self {
        Self::new(ResourceSampler::current_process())
    }
}

impl<P: MetricsProvider> ResourceMonitorPlugin<P> {
    pub fn new(sampler: ResourceSampler<P>) -> Self {
        ResourceMonitorPlugin {
            sampler,
            channel: CHANNEL.to_string(),
            report_unavailable: false,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Send `null` instead of `0.0` for a reading whose query failed.
    pub fn with_report_unavailable(mut self, enabled: bool) -> Self {
        self.report_unavailable = enabled;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn handle(&self, call: &MethodCall) -> BridgeReply {
        let _span = tracing::debug_span!("bridge.handle", method = %call.method).entered();

        if let Some(channel) = &call.channel
            && *channel != self.channel
        {
            debug!(%channel, "call for another channel");
            return BridgeReply::Error(BridgeError::unknown_channel(channel));
        }

        match call.method.as_str() {
            GET_RESOURCE_USAGE => match self.resource_usage() {
                Ok(usage) => BridgeReply::Result(usage),
                Err(err) => {
                    warn!(error = %err, "could not build resource usage reply");
                    BridgeReply::Error(BridgeError::resource_monitor(&err))
                }
            },
            other => {
                debug!("unrecognized method");
                BridgeReply::Error(BridgeError::unrecognized(other))
            }
        }
    }

    fn resource_usage(&self) -> Result<Map<String, Value>, ReplyError> {
        let report = self.sampler.usage_report();
        report.log_failures();

        let mut usage = Map::new();
        if self.report_unavailable {
            usage.insert(CPU_KEY.into(), optional_reading(CPU_KEY, &report.cpu)?);
            usage.insert(MEMORY_KEY.into(), optional_reading(MEMORY_KEY, &report.memory)?);
        } else {
            let snapshot = report.snapshot();
            usage.insert(CPU_KEY.into(), reading(CPU_KEY, snapshot.cpu_percent)?);
            usage.insert(MEMORY_KEY.into(), reading(MEMORY_KEY, snapshot.memory_percent)?);
        }
        Ok(usage)
    }

    /// Answer one call per input line until EOF. Returns the number of replies written.
    pub fn serve<R: BufRead, W: Write>(&self, input: R, mut output: W) -> io::Result<usize> {
        let mut replies = 0;
        let mut input = input;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            // Raw bytes: a line that is not UTF-8 is a bad call, not a broken stream.
            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            let reply = match serde_json::from_slice::<MethodCall>(line) {
                Ok(call) => self.handle(&call),
                Err(err) => {
                    warn!(error = %err, "could not decode call");
                    BridgeReply::Error(BridgeError::undecodable(&err))
                }
            };

            serde_json::to_writer(&mut output, &reply)?;
            output.write_all(b"\n")?;
            output.flush()?;
            replies += 1;
        }
        Ok(replies)
    }
}

fn reading(key: &'static str, value: f64) -> Result<Value, ReplyError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or(ReplyError::NonFinite { key, value })
}

fn optional_reading(
    key: &'static str,
    value: &Result<f64, ResourceQueryError>,
) -> Result<Value, ReplyError> {
    match value {
        Ok(value) => reading(key, *value),
        Err(_) => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_wire_names() {
        assert_eq!(ErrorCode::Unavailable.as_str(), "UNAVAILABLE");
        assert_eq!(
            ErrorCode::ResourceMonitorError.as_str(),
            "RESOURCE_MONITOR_ERROR"
        );
    }

    #[test]
    fn non_finite_reading_is_rejected() {
        let err = reading(CPU_KEY, f64::NAN).unwrap_err();
        assert!(matches!(err, ReplyError::NonFinite { key: CPU_KEY, .. }));
        assert!(reading(MEMORY_KEY, f64::INFINITY).is_err());
        assert_eq!(reading(CPU_KEY, 1.5).unwrap(), serde_json::json!(1.5));
    }

    #[test]
    fn call_without_arguments_decodes() {
        let call: MethodCall = serde_json::from_str(r#"{"method":"getResourceUsage"}"#).unwrap();
        assert_eq!(call, MethodCall::new(GET_RESOURCE_USAGE));
    }

    #[test]
    fn reply_is_externally_tagged() {
        let reply = BridgeReply::Error(BridgeError::unrecognized("nope"));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["error"]["code"], "UNAVAILABLE");
        assert!(json["error"]["details"].is_null());
    }

    #[test]
    fn live_plugin_answers_usage() {
        let plugin = ResourceMonitorPlugin::default();
        let BridgeReply::Result(usage) = plugin.handle(&MethodCall::new(GET_RESOURCE_USAGE))
        else {
            panic!("expected a result reply");
        };
        assert!(usage[CPU_KEY].as_f64().unwrap() >= 0.0);
        let memory = usage[MEMORY_KEY].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&memory));
    }
}
