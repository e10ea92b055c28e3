use std::fmt;

use thiserror::Error;

/// Which OS query a [`ResourceQueryError`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Query {
    ThreadEnumeration,
    TaskMemory,
    PhysicalMemory,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::ThreadEnumeration => write!(f, "thread enumeration"),
            Query::TaskMemory => write!(f, "task memory info"),
            Query::PhysicalMemory => write!(f, "physical memory size"),
        }
    }
}

/// An underlying platform call failed.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("{query} failed (os status {os_status_code})")]
pub struct ResourceQueryError {
    pub query: Query,
    /// Raw status from the platform: errno, `kern_return_t` or `GetLastError()`.
    /// `-1` when the failure did not come with a status of its own.
    pub os_status_code: i32,
}

impl ResourceQueryError {
    pub const UNKNOWN_STATUS: i32 = -1;

    pub fn new(query: Query, os_status_code: i32) -> Self {
        Self {
            query,
            os_status_code,
        }
    }

    pub fn unknown(query: Query) -> Self {
        Self::new(query, Self::UNKNOWN_STATUS)
    }

    pub fn from_io(query: Query, err: &std::io::Error) -> Self {
        Self::new(
            query,
            err.raw_os_error().unwrap_or(Self::UNKNOWN_STATUS),
        )
    }
}
