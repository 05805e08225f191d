use super::{ProcessCollector, ProcessSample, ProcessSamples};
use crate::config::DEFAULT_SAMPLE_WINDOW_MS;
use crate::error::{CollectorError, ProcessAccessError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Clone, Copy)]
struct CpuSample {
    total_ticks: u64, // utime + stime
    start_time: u64,
    timestamp: Instant,
}

/// The fields of `/proc/<pid>/stat` the sampler needs.
#[derive(Debug, PartialEq)]
struct StatFields<'a> {
    name: &'a str,
    utime: u64,
    stime: u64,
    start_time: u64,
}

impl StatFields<'_> {
    fn total_ticks(&self) -> u64 {
        self.utime + self.stime
    }
}

/// `comm` may itself contain spaces and parentheses, so split on the last `)`.
fn parse_stat(content: &str) -> Option<StatFields<'_>> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let name = &content[open + 1..close];
    // rest[0] is field 3 (state)
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if rest.len() < 20 {
        return None;
    }
    Some(StatFields {
        name,
        utime: rest[11].parse().ok()?,
        stime: rest[12].parse().ok()?,
        start_time: rest[19].parse().ok()?,
    })
}

fn parse_real_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

fn load_users(passwd: &Path) -> HashMap<u32, String> {
    let content = fs::read_to_string(passwd).unwrap_or_default();
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split(':');
            let name = parts.next()?;
            let uid = parts.nth(1)?.parse().ok()?;
            Some((uid, name.to_string()))
        })
        .collect()
}

fn clock_ticks() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        100
    }
}

struct ProcReader {
    root: PathBuf,
    clock_ticks: u64,
    users: HashMap<u32, String>,
}

impl ProcReader {
    fn read(&self, pid: u32, file: &str) -> Result<Vec<u8>, ProcessAccessError> {
        fs::read(self.root.join(pid.to_string()).join(file))
            .map_err(|e| ProcessAccessError::from_io(pid, &e))
    }

    fn read_text(&self, pid: u32, file: &str) -> Result<String, ProcessAccessError> {
        let bytes = self.read(pid, file)?;
        String::from_utf8(bytes).map_err(|_| ProcessAccessError::Malformed(pid))
    }

    fn cpu_sample(&self, pid: u32) -> Result<CpuSample, ProcessAccessError> {
        let stat = self.read_text(pid, "stat")?;
        let fields = parse_stat(&stat).ok_or(ProcessAccessError::Malformed(pid))?;
        Ok(CpuSample {
            total_ticks: fields.total_ticks(),
            start_time: fields.start_time,
            timestamp: Instant::now(),
        })
    }

    /// CPU counters for every numeric entry under the proc root.
    fn snapshot(&self) -> Result<HashMap<u32, CpuSample>, CollectorError> {
        let entries = fs::read_dir(&self.root).map_err(|source| CollectorError::ProcUnavailable {
            path: self.root.clone(),
            source,
        })?;

        let mut samples = HashMap::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            match self.cpu_sample(pid) {
                Ok(sample) => {
                    samples.insert(pid, sample);
                }
                Err(e) => trace!("skipping process in snapshot: {}", e),
            }
        }
        Ok(samples)
    }

    fn read_sample(&self, pid: u32, baseline: &CpuSample) -> Result<ProcessSample, ProcessAccessError> {
        let stat = self.read_text(pid, "stat")?;
        let fields = parse_stat(&stat).ok_or(ProcessAccessError::Malformed(pid))?;
        if fields.start_time != baseline.start_time {
            // pid was recycled inside the window
            return Err(ProcessAccessError::Vanished(pid));
        }

        let elapsed = baseline.timestamp.elapsed().as_secs_f64();
        let tick_delta = fields.total_ticks().saturating_sub(baseline.total_ticks);
        let cpu_percent = if elapsed > 0.0 {
            let cpu_seconds = tick_delta as f64 / self.clock_ticks as f64;
            (cpu_seconds / elapsed) * 100.0
        } else {
            0.0
        };

        let status = self.read_text(pid, "status")?;
        let uid = parse_real_uid(&status).ok_or(ProcessAccessError::Malformed(pid))?;
        let username = self
            .users
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| uid.to_string());

        let cmdline = self
            .read(pid, "cmdline")?
            .split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");

        Ok(ProcessSample {
            pid,
            name: fields.name.to_string(),
            username,
            cmdline,
            cpu_percent,
        })
    }
}

/// Samples CPU usage by diffing one `/proc` snapshot against a second read
/// taken after a single shared window. A tick costs one window regardless of
/// process count. Percentages are relative to one CPU, as `top` reports them.
pub struct LinuxProcessCollector {
    root: PathBuf,
    passwd: PathBuf,
    clock_ticks: u64,
    window: Duration,
}

impl LinuxProcessCollector {
    pub fn new(window: Duration) -> Self {
        Self::with_proc_root("/proc", window)
    }

    pub fn with_proc_root(root: impl Into<PathBuf>, window: Duration) -> Self {
        Self {
            root: root.into(),
            passwd: PathBuf::from("/etc/passwd"),
            clock_ticks: clock_ticks(),
            window,
        }
    }

    /// Resolve uids against `passwd` instead of `/etc/passwd`.
    pub fn with_passwd(mut self, passwd: impl Into<PathBuf>) -> Self {
        self.passwd = passwd.into();
        self
    }

    /// A reader with the user table as it stands now, so accounts added while
    /// the agent runs resolve on the next tick.
    fn reader(&self) -> ProcReader {
        ProcReader {
            root: self.root.clone(),
            clock_ticks: self.clock_ticks,
            users: load_users(&self.passwd),
        }
    }

    /// Measure a single process over one window.
    pub async fn sample_process(&self, pid: u32) -> Result<ProcessSample, ProcessAccessError> {
        let reader = self.reader();
        let baseline = reader.cpu_sample(pid)?;
        tokio::time::sleep(self.window).await;
        reader.read_sample(pid, &baseline)
    }
}

impl Default for LinuxProcessCollector {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SAMPLE_WINDOW_MS))
    }
}

#[async_trait::async_trait]
impl ProcessCollector for LinuxProcessCollector {
    async fn sample(&self) -> Result<ProcessSamples, CollectorError> {
        let reader = self.reader();
        let baseline = reader.snapshot()?;
        debug!("Sampling {} processes over {:?}", baseline.len(), self.window);
        tokio::time::sleep(self.window).await;

        Ok(Box::new(baseline.into_iter().filter_map(
            move |(pid, prev)| match reader.read_sample(pid, &prev) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    trace!("skipping process: {}", e);
                    None
                }
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_line(pid: u32, comm: &str, utime: u64, stime: u64, start: u64) -> String {
        format!(
            "{pid} ({comm}) R 1 {pid} {pid} 0 -1 4194560 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 {start} 1000 200 18446744073709551615"
        )
    }

    #[test]
    fn parses_stat_with_awkward_comm() {
        let line = stat_line(42, "tmux: server (1)", 250, 50, 9000);
        let fields = parse_stat(&line).unwrap();
        assert_eq!(fields.name, "tmux: server (1)");
        assert_eq!(fields.utime, 250);
        assert_eq!(fields.stime, 50);
        assert_eq!(fields.start_time, 9000);
        assert_eq!(fields.total_ticks(), 300);
    }

    #[test]
    fn rejects_truncated_stat() {
        assert!(parse_stat("42 (short) R 1 2 3").is_none());
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn reads_real_uid_from_status() {
        let status = "Name:\tbash\nState:\tS (sleeping)\nUid:\t1000\t0\t0\t0\nGid:\t1000\t1000\t1000\t1000\n";
        assert_eq!(parse_real_uid(status), Some(1000));
        assert_eq!(parse_real_uid("Name:\tbash\n"), None);
    }

    fn write_fake_process(root: &Path, pid: u32, comm: &str, uid: u32, cmdline: &[u8]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stat"), stat_line(pid, comm, 10, 5, 777)).unwrap();
        fs::write(dir.join("status"), format!("Name:\t{comm}\nUid:\t{uid}\t{uid}\t{uid}\t{uid}\n")).unwrap();
        fs::write(dir.join("cmdline"), cmdline).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn samples_fake_proc_tree_and_skips_broken_entries() {
        let root = tempfile::tempdir().unwrap();
        write_fake_process(root.path(), 101, "worker", 4_000_000_000, b"/usr/bin/worker\0--fast\0");
        fs::create_dir_all(root.path().join("self")).unwrap();
        let broken = root.path().join("202");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("stat"), "not a stat line").unwrap();

        let collector = LinuxProcessCollector::with_proc_root(root.path(), Duration::from_millis(100));
        let samples: Vec<_> = collector.sample().await.unwrap().collect();

        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert_eq!(sample.pid, 101);
        assert_eq!(sample.name, "worker");
        assert_eq!(sample.username, "4000000000");
        assert_eq!(sample.cmdline, "/usr/bin/worker --fast");
        assert_eq!(sample.cpu_percent, 0.0);
    }

    #[tokio::test]
    async fn missing_proc_root_is_a_collector_error() {
        let root = tempfile::tempdir().unwrap();
        let collector = LinuxProcessCollector::with_proc_root(root.path().join("absent"), Duration::from_millis(1));
        assert!(matches!(
            collector.sample().await,
            Err(CollectorError::ProcUnavailable { .. })
        ));
    }

    #[test]
    fn process_removed_after_snapshot_is_vanished() {
        let root = tempfile::tempdir().unwrap();
        write_fake_process(root.path(), 55, "short-lived", 0, b"");
        let collector = LinuxProcessCollector::with_proc_root(root.path(), Duration::from_millis(1));
        let baseline = collector.reader().cpu_sample(55).unwrap();

        fs::remove_dir_all(root.path().join("55")).unwrap();
        assert_eq!(
            collector.reader().read_sample(55, &baseline),
            Err(ProcessAccessError::Vanished(55))
        );
    }

    #[test]
    fn recycled_pid_is_vanished() {
        let root = tempfile::tempdir().unwrap();
        write_fake_process(root.path(), 56, "old", 0, b"");
        let collector = LinuxProcessCollector::with_proc_root(root.path(), Duration::from_millis(1));
        let baseline = collector.reader().cpu_sample(56).unwrap();

        let dir = root.path().join("56");
        fs::write(dir.join("stat"), stat_line(56, "new", 0, 0, 888)).unwrap();
        assert_eq!(
            collector.reader().read_sample(56, &baseline),
            Err(ProcessAccessError::Vanished(56))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn users_added_after_start_resolve_on_next_sample() {
        let root = tempfile::tempdir().unwrap();
        write_fake_process(root.path(), 303, "batch", 4_100_000_000, b"batch\0");
        let passwd = root.path().join("passwd");
        fs::write(&passwd, "root:x:0:0:root:/root:/bin/sh\n").unwrap();

        let collector = LinuxProcessCollector::with_proc_root(root.path(), Duration::from_millis(10))
            .with_passwd(&passwd);
        let before: Vec<_> = collector.sample().await.unwrap().collect();
        assert_eq!(before[0].username, "4100000000");

        fs::write(
            &passwd,
            "root:x:0:0:root:/root:/bin/sh\nbatchjob:x:4100000000:100::/home/batchjob:/bin/sh\n",
        )
        .unwrap();
        let after: Vec<_> = collector.sample().await.unwrap().collect();
        assert_eq!(after[0].username, "batchjob");
    }
}
