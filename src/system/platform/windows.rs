use std::mem;

use windows_sys::Win32::{
    Foundation::{CloseHandle, FILETIME, GetLastError, HANDLE, INVALID_HANDLE_VALUE},
    System::{
        Diagnostics::ToolHelp::{
            CreateToolhelp32Snapshot, TH32CS_SNAPTHREAD, THREADENTRY32, Thread32First,
            Thread32Next,
        },
        ProcessStatus::{K32GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS},
        SystemInformation::GetSystemTimeAsFileTime,
        Threading::{
            GetCurrentProcessId, GetThreadTimes, OpenProcess, OpenThread,
            PROCESS_QUERY_LIMITED_INFORMATION, THREAD_QUERY_LIMITED_INFORMATION,
        },
    },
};

use super::{MetricsProvider, ThreadCpuSample, ThreadSchedInfo};
use crate::system::error::{Query, ResourceQueryError};

/// Reads one process by id, normally the calling one.
#[derive(Clone, Copy, Debug)]
pub struct Platform {
    process_id: u32,
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl Platform {
    pub fn current() -> Self {
        Self::for_process(unsafe { GetCurrentProcessId() })
    }

    pub fn for_process(process_id: u32) -> Self {
        Platform { process_id }
    }
}

/// Closes the wrapped handle on drop.
struct HandleGuard(HANDLE);

impl HandleGuard {
    fn new(handle: HANDLE) -> Option<Self> {
        if handle.is_null() || handle == INVALID_HANDLE_VALUE {
            None
        } else {
            Some(HandleGuard(handle))
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

fn last_error(query: Query) -> ResourceQueryError {
    ResourceQueryError::new(query, unsafe { GetLastError() } as i32)
}

/// FILETIME in 100ns units.
fn filetime_ticks(ft: &FILETIME) -> u64 {
    (u64::from(ft.dwHighDateTime) << 32) | u64::from(ft.dwLowDateTime)
}

fn now_ticks() -> u64 {
    let mut now: FILETIME = unsafe { mem::zeroed() };
    unsafe { GetSystemTimeAsFileTime(&mut now) };
    filetime_ticks(&now)
}

fn thread_sched_info(thread_id: u32, now: u64) -> Option<ThreadSchedInfo> {
    let thread =
        HandleGuard::new(unsafe { OpenThread(THREAD_QUERY_LIMITED_INFORMATION, 0, thread_id) })?;
    let mut creation: FILETIME = unsafe { mem::zeroed() };
    let mut exit: FILETIME = unsafe { mem::zeroed() };
    let mut kernel: FILETIME = unsafe { mem::zeroed() };
    let mut user: FILETIME = unsafe { mem::zeroed() };
    let ok = unsafe { GetThreadTimes(thread.0, &mut creation, &mut exit, &mut kernel, &mut user) };
    if ok == 0 {
        return None;
    }
    let cpu = filetime_ticks(&kernel) + filetime_ticks(&user);
    let alive = now.saturating_sub(filetime_ticks(&creation));
    let usage_fraction = if alive > 0 {
        (cpu as f64 / alive as f64).min(1.0)
    } else {
        0.0
    };
    // Windows has no idle flag for user threads.
    Some(ThreadSchedInfo {
        usage_fraction,
        idle: false,
    })
}

impl MetricsProvider for Platform {
    fn thread_sample(&self) -> Result<ThreadCpuSample, ResourceQueryError> {
        let snapshot = HandleGuard::new(unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) })
            .ok_or_else(|| last_error(Query::ThreadEnumeration))?;

        let mut entry: THREADENTRY32 = unsafe { mem::zeroed() };
        entry.dwSize = mem::size_of::<THREADENTRY32>() as u32;
        if unsafe { Thread32First(snapshot.0, &mut entry) } == 0 {
            return Err(last_error(Query::ThreadEnumeration));
        }

        let now = now_ticks();
        let mut sample = ThreadCpuSample::default();
        loop {
            if entry.th32OwnerProcessID == self.process_id {
                match thread_sched_info(entry.th32ThreadID, now) {
                    Some(info) => sample.push(info),
                    None => sample.push_unreported(),
                }
            }
            if unsafe { Thread32Next(snapshot.0, &mut entry) } == 0 {
                break;
            }
        }
        Ok(sample)
    }

    fn resident_size(&self) -> Result<u64, ResourceQueryError> {
        let process = HandleGuard::new(unsafe {
            OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, self.process_id)
        })
        .ok_or_else(|| last_error(Query::TaskMemory))?;

        let mut counters: PROCESS_MEMORY_COUNTERS = unsafe { mem::zeroed() };
        let size = mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
        counters.cb = size;
        if unsafe { K32GetProcessMemoryInfo(process.0, &mut counters, size) } == 0 {
            return Err(last_error(Query::TaskMemory));
        }
        Ok(counters.WorkingSetSize as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_reports_threads_and_memory() {
        let platform = Platform::current();
        let sample = platform.thread_sample().unwrap();
        assert!(sample.reported().count() >= 1);
        assert!(platform.resident_size().unwrap() > 0);
    }

    #[test]
    fn filetime_combines_halves() {
        let ft = FILETIME {
            dwLowDateTime: 5,
            dwHighDateTime: 1,
        };
        assert_eq!(filetime_ticks(&ft), (1u64 << 32) + 5);
    }
}
