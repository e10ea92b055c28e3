#![cfg(target_os = "linux")]

use std::fs;
use std::path::PathBuf;

use resource_monitor::system::{MetricsProvider, Platform, Query, ResourceSampler};

fn clock_ticks() -> u64 {
    (unsafe { libc::sysconf(libc::_SC_CLK_TCK) }) as u64
}

fn page_size() -> u64 {
    (unsafe { libc::sysconf(libc::_SC_PAGESIZE) }) as u64
}

fn stat_line(tid: u32, state: char, utime: u64, stime: u64, starttime: u64) -> String {
    format!(
        "{tid} (worker (pool)) {state} 1 1 1 0 -1 0 0 0 0 0 {utime} {stime} 0 0 20 0 3 0 {starttime} 0 0\n"
    )
}

/// Throwaway procfs tree, removed on drop.
struct FakeProc {
    root: PathBuf,
}

impl FakeProc {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "resource_monitor_procfs_{}_{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("self/task")).unwrap();
        FakeProc { root }
    }

    fn write(&self, rel: &str, contents: &str) {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn platform(&self) -> Platform {
        Platform::with_proc_root(&self.root)
    }
}

impl Drop for FakeProc {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

#[test]
fn thread_table_sums_lifetime_averages() {
    let ticks = clock_ticks();
    let proc = FakeProc::new("threads");
    proc.write("uptime", "1000.00 4000.00\n");
    // 2s of CPU over 10s alive => 20%
    proc.write("self/task/100/stat", &stat_line(100, 'R', ticks, ticks, 990 * ticks));
    // 3s over 20s => 15%
    proc.write("self/task/101/stat", &stat_line(101, 'S', 3 * ticks, 0, 980 * ticks));
    // idle threads count for nothing
    proc.write("self/task/102/stat", &stat_line(102, 'I', 50 * ticks, 0, 0));
    // listed but vanished before its stat was read
    fs::create_dir_all(proc.root.join("self/task/103")).unwrap();

    let sample = proc.platform().thread_sample().unwrap();
    assert_eq!(sample.len(), 4);
    assert_eq!(sample.unreported_count(), 1);

    let cpu = ResourceSampler::new(proc.platform()).cpu_usage_percent().unwrap();
    assert!((cpu - 35.0).abs() < 1e-6, "cpu was {cpu}");
}

#[test]
fn empty_task_dir_reads_zero() {
    let proc = FakeProc::new("empty");
    proc.write("uptime", "1000.00 4000.00\n");
    let cpu = ResourceSampler::new(proc.platform()).cpu_usage_percent().unwrap();
    assert_eq!(cpu, 0.0);
    assert!(cpu.is_sign_positive());
}

#[test]
fn resident_size_is_statm_pages() {
    let proc = FakeProc::new("statm");
    proc.write("self/statm", "5000 1234 300 10 0 800 0\n");
    assert_eq!(proc.platform().resident_size().unwrap(), 1234 * page_size());
}

#[test]
fn malformed_statm_fails_without_errno() {
    let proc = FakeProc::new("bad_statm");
    proc.write("self/statm", "garbage\n");
    let err = proc.platform().resident_size().unwrap_err();
    assert_eq!(err.query, Query::TaskMemory);
    assert_eq!(err.os_status_code, -1);
}

#[test]
fn missing_uptime_fails_enumeration() {
    let proc = FakeProc::new("no_uptime");
    let err = proc.platform().thread_sample().unwrap_err();
    assert_eq!(err.query, Query::ThreadEnumeration);
    assert_eq!(err.os_status_code, libc::ENOENT);

    let snapshot = ResourceSampler::new(proc.platform()).usage_snapshot();
    assert_eq!(snapshot.cpu_percent, 0.0);
}
