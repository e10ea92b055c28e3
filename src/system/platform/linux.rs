use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{MetricsProvider, ThreadCpuSample, ThreadSchedInfo};
use crate::system::error::{Query, ResourceQueryError};

const DEFAULT_PROC_ROOT: &str = "/proc";
const FALLBACK_CLOCK_TICKS: f64 = 100.0;
const FALLBACK_PAGE_SIZE: u64 = 4096;

/// Reads the calling process through procfs (`<root>/self`).
#[derive(Clone, Debug)]
pub struct Platform {
    proc_root: PathBuf,
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl Platform {
    pub fn current() -> Self {
        Self::with_proc_root(DEFAULT_PROC_ROOT)
    }

    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Platform {
            proc_root: proc_root.into(),
        }
    }

    fn self_dir(&self) -> PathBuf {
        self.proc_root.join("self")
    }
}

impl MetricsProvider for Platform {
    fn thread_sample(&self) -> Result<ThreadCpuSample, ResourceQueryError> {
        let enumeration_failed =
            |e: io::Error| ResourceQueryError::from_io(Query::ThreadEnumeration, &e);

        let entries = fs::read_dir(self.self_dir().join("task")).map_err(enumeration_failed)?;
        let uptime_secs =
            read_uptime(&self.proc_root.join("uptime")).map_err(enumeration_failed)?;
        let ticks = clock_ticks_per_second();

        let mut sample = ThreadCpuSample::default();
        for entry in entries {
            // Threads can exit between listing and reading their stat.
            let stat = entry
                .ok()
                .and_then(|e| fs::read_to_string(e.path().join("stat")).ok())
                .and_then(|contents| ThreadStat::parse(&contents));
            match stat {
                Some(stat) => sample.push(stat.sched_info(uptime_secs, ticks)),
                None => sample.push_unreported(),
            }
        }
        Ok(sample)
    }

    fn resident_size(&self) -> Result<u64, ResourceQueryError> {
        let contents = fs::read_to_string(self.self_dir().join("statm"))
            .map_err(|e| ResourceQueryError::from_io(Query::TaskMemory, &e))?;
        // statm: size resident shared text lib data dt, all in pages
        let resident_pages: u64 = contents
            .split_whitespace()
            .nth(1)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ResourceQueryError::unknown(Query::TaskMemory))?;
        Ok(resident_pages.saturating_mul(page_size()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ThreadStat {
    state: char,
    utime: u64,
    stime: u64,
    starttime: u64,
}

impl ThreadStat {
    fn parse(contents: &str) -> Option<Self> {
        // comm field may contain spaces and parens, so find the closing )
        let after_comm = contents.rfind(')')? + 1;
        let fields: Vec<&str> = contents[after_comm..].split_whitespace().collect();
        // Fields after comm: state(0) ... utime(11) stime(12) ... starttime(19)
        Some(ThreadStat {
            state: fields.first()?.chars().next()?,
            utime: fields.get(11)?.parse().ok()?,
            stime: fields.get(12)?.parse().ok()?,
            starttime: fields.get(19)?.parse().ok()?,
        })
    }

    /// Lifetime average: CPU time over wall time since the thread started.
    /// Capped at one core; tick rounding can overshoot for young threads.
    fn sched_info(&self, uptime_secs: f64, ticks: f64) -> ThreadSchedInfo {
        let cpu_secs = (self.utime + self.stime) as f64 / ticks;
        let alive_secs = uptime_secs - self.starttime as f64 / ticks;
        let usage_fraction = if alive_secs > 0.0 {
            (cpu_secs / alive_secs).min(1.0)
        } else {
            0.0
        };
        ThreadSchedInfo {
            usage_fraction,
            idle: self.state == 'I',
        }
    }
}

fn read_uptime(path: &Path) -> io::Result<f64> {
    let contents = fs::read_to_string(path)?;
    contents
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed uptime"))
}

fn clock_ticks_per_second() -> f64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as f64
    } else {
        FALLBACK_CLOCK_TICKS
    }
}

fn page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        FALLBACK_PAGE_SIZE
    }
}
