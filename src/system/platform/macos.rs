// libc marks its mach bindings deprecated in favour of the mach2 crate.
#![allow(deprecated)]

use std::{mem, ptr, slice};

use libc::{
    KERN_SUCCESS, MACH_TASK_BASIC_INFO, MACH_TASK_BASIC_INFO_COUNT, TH_FLAGS_IDLE,
    TH_USAGE_SCALE, THREAD_BASIC_INFO, THREAD_BASIC_INFO_COUNT, integer_t, kern_return_t,
    mach_msg_type_number_t, mach_port_t, mach_task_basic_info, thread_act_t, thread_basic_info,
};

use super::{MetricsProvider, ThreadCpuSample, ThreadSchedInfo};
use crate::system::error::{Query, ResourceQueryError};

/// Reads a mach task, normally `mach_task_self()`.
#[derive(Clone, Copy, Debug)]
pub struct Platform {
    task: mach_port_t,
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl Platform {
    pub fn current() -> Self {
        Self::for_task(unsafe { libc::mach_task_self() })
    }

    pub fn for_task(task: mach_port_t) -> Self {
        Platform { task }
    }
}

/// Thread ports handed out by `task_threads`. The array and every port right
/// are released on drop.
struct ThreadList {
    task: mach_port_t,
    threads: *mut thread_act_t,
    count: mach_msg_type_number_t,
}

impl ThreadList {
    fn acquire(task: mach_port_t) -> Result<Self, kern_return_t> {
        let mut threads: *mut thread_act_t = ptr::null_mut();
        let mut count: mach_msg_type_number_t = 0;
        let kr = unsafe { libc::task_threads(task, &mut threads, &mut count) };
        if kr != KERN_SUCCESS {
            return Err(kr);
        }
        Ok(ThreadList {
            task,
            threads,
            count,
        })
    }

    fn ports(&self) -> &[thread_act_t] {
        if self.threads.is_null() {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.threads, self.count as usize) }
    }
}

impl Drop for ThreadList {
    fn drop(&mut self) {
        if self.threads.is_null() {
            return;
        }
        for &port in self.ports() {
            unsafe { libc::mach_port_deallocate(self.task, port) };
        }
        let size = self.count as usize * mem::size_of::<thread_act_t>();
        unsafe {
            libc::vm_deallocate(
                self.task,
                self.threads as libc::vm_address_t,
                size as libc::vm_size_t,
            )
        };
    }
}

fn thread_sched_info(thread: thread_act_t) -> Option<ThreadSchedInfo> {
    let mut info: thread_basic_info = unsafe { mem::zeroed() };
    let mut count = THREAD_BASIC_INFO_COUNT;
    let kr = unsafe {
        libc::thread_info(
            thread,
            THREAD_BASIC_INFO as _,
            &mut info as *mut thread_basic_info as *mut integer_t,
            &mut count,
        )
    };
    if kr != KERN_SUCCESS {
        return None;
    }
    Some(ThreadSchedInfo {
        usage_fraction: f64::from(info.cpu_usage) / f64::from(TH_USAGE_SCALE),
        idle: info.flags & TH_FLAGS_IDLE != 0,
    })
}

impl MetricsProvider for Platform {
    fn thread_sample(&self) -> Result<ThreadCpuSample, ResourceQueryError> {
        let list = ThreadList::acquire(self.task)
            .map_err(|kr| ResourceQueryError::new(Query::ThreadEnumeration, kr))?;
        Ok(list.ports().iter().map(|&t| thread_sched_info(t)).collect())
    }

    fn resident_size(&self) -> Result<u64, ResourceQueryError> {
        let mut info: mach_task_basic_info = unsafe { mem::zeroed() };
        let mut count = MACH_TASK_BASIC_INFO_COUNT;
        let kr = unsafe {
            libc::task_info(
                self.task,
                MACH_TASK_BASIC_INFO as _,
                &mut info as *mut mach_task_basic_info as *mut integer_t,
                &mut count,
            )
        };
        if kr != KERN_SUCCESS {
            return Err(ResourceQueryError::new(Query::TaskMemory, kr));
        }
        Ok(info.resident_size)
    }
}
