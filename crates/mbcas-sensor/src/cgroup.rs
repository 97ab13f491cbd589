use crate::source::DemandSource;
use async_trait::async_trait;
use mbcas_core::{MbcasError, Result};
use mbcas_core::types::Sample;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Instant;

const MILLICORES_PER_CORE: f64 = 1000.0;

/// Reads cgroup v2 CPU accounting for managed pods and caches the resolved
/// per-pod cgroup path so steady-state ticks skip the filesystem walk.
pub struct CgroupReader {
    cgroup_root: PathBuf,
    handles: RwLock<HashMap<String, PathBuf>>,
}

impl CgroupReader {
    pub fn new(cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Sample cumulative CPU usage, throttling and PSI pressure for a pod.
    /// The cgroup path is resolved once and reused until a read comes back
    /// `NotFound`, at which point it is re-resolved on the next call.
    pub fn sample(&self, uid: &str) -> Result<Sample> {
        let cached = self.handles.read().unwrap().get(uid).cloned();

        let path = match cached {
            Some(p) if p.join("cpu.stat").exists() => p,
            _ => {
                let resolved = self.resolve_path(uid)?;
                self.handles.write().unwrap().insert(uid.to_string(), resolved.clone());
                resolved
            }
        };

        let stat = read_cpu_stat(&path)?;
        let pressure_some = read_pressure_some(&path).unwrap_or(0.0);

        Ok(Sample {
            cpu_usage_ns: stat.usage_usec.saturating_mul(1_000),
            throttled_ns: stat.throttled_usec.saturating_mul(1_000),
            nr_throttled: stat.nr_throttled,
            pressure_some,
            timestamp: Instant::now(),
        })
    }

    /// Recover an externally set CPU ceiling from `cpu.max`, for diagnostics
    /// only. The enforced ceiling is whatever the reconciler last applied.
    pub fn read_cpu_limit_mc(&self, uid: &str) -> Option<f64> {
        let path = self.handles.read().unwrap().get(uid).cloned()?;
        read_cpu_max(&path)
    }

    /// Drop cached handles for pods no longer present on the node.
    pub fn cleanup(&self, live_uids: &HashSet<String>) {
        self.handles.write().unwrap().retain(|uid, _| live_uids.contains(uid));
    }

    fn resolve_path(&self, uid: &str) -> Result<PathBuf> {
        if !self.cgroup_root.exists() {
            return Err(MbcasError::fatal(
                format!("cgroup root {} does not exist", self.cgroup_root.display()),
                "run the agent on a host with cgroup v2 mounted at the configured root",
            ));
        }

        let target = format!("pod{}", uid);
        search_dir(&self.cgroup_root, &target)
            .ok_or_else(|| MbcasError::not_found(format!("cgroup for pod {}", uid)))
    }
}

#[async_trait]
impl DemandSource for CgroupReader {
    // Reads are a handful of small file reads against procfs-like cgroup
    // files; fast enough to run inline rather than on a blocking pool.
    async fn sample(&self, uid: &str) -> Result<Sample> {
        CgroupReader::sample(self, uid)
    }
}

struct CpuStat {
    usage_usec: u64,
    throttled_usec: u64,
    nr_throttled: u64,
}

fn read_cpu_stat(cgroup_path: &Path) -> Result<CpuStat> {
    let stat_path = cgroup_path.join("cpu.stat");
    let content = fs::read_to_string(&stat_path).map_err(|e| classify_io_error(&stat_path, e))?;

    let mut usage_usec = None;
    let mut throttled_usec = 0u64;
    let mut nr_throttled = 0u64;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("usage_usec") => usage_usec = fields.next().and_then(|v| v.parse().ok()),
            Some("throttled_usec") => throttled_usec = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0),
            Some("nr_throttled") => nr_throttled = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0),
            _ => {}
        }
    }

    Ok(CpuStat {
        usage_usec: usage_usec.ok_or_else(|| MbcasError::transient(stat_path.display().to_string(), "missing usage_usec field"))?,
        throttled_usec,
        nr_throttled,
    })
}

/// Parse the `some avg10=` field of `cpu.pressure` as a 0..1 fraction.
fn read_pressure_some(cgroup_path: &Path) -> Option<f64> {
    let content = fs::read_to_string(cgroup_path.join("cpu.pressure")).ok()?;
    content
        .lines()
        .find(|line| line.starts_with("some"))
        .and_then(|line| line.split_whitespace().find(|tok| tok.starts_with("avg10=")))
        .and_then(|tok| tok.trim_start_matches("avg10=").parse::<f64>().ok())
        .map(|pct| pct / 100.0)
}

/// Parse `cpu.max` ("$QUOTA $PERIOD", "max" meaning unlimited) into millicores.
fn read_cpu_max(cgroup_path: &Path) -> Option<f64> {
    let content = fs::read_to_string(cgroup_path.join("cpu.max")).ok()?;
    let mut parts = content.split_whitespace();
    let quota = parts.next()?;
    let period: f64 = parts.next()?.parse().ok()?;
    if quota == "max" || period <= 0.0 {
        return None;
    }
    let quota: f64 = quota.parse().ok()?;
    Some((quota / period) * MILLICORES_PER_CORE)
}

fn classify_io_error(path: &Path, err: io::Error) -> MbcasError {
    match err.kind() {
        io::ErrorKind::NotFound => MbcasError::not_found(path.display().to_string()),
        io::ErrorKind::PermissionDenied => MbcasError::fatal(
            format!("permission denied reading {}", path.display()),
            "grant the agent read access to the pod cgroup hierarchy",
        ),
        _ => MbcasError::transient(path.display().to_string(), err.to_string()),
    }
}

fn search_dir(dir: &Path, target_name: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = path.file_name()?.to_str()?;
        if name == target_name {
            return Some(path);
        }
        if name.starts_with("pod") || name == "burstable" || name == "besteffort" || name == "guaranteed" {
            if let Some(found) = search_dir(&path, target_name) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_cpu_stat(dir: &Path, usage_usec: u64, throttled_usec: u64, nr_throttled: u64) {
        fs::write(
            dir.join("cpu.stat"),
            format!(
                "usage_usec {}\nuser_usec 0\nsystem_usec 0\nnr_periods 10\nnr_throttled {}\nthrottled_usec {}\n",
                usage_usec, nr_throttled, throttled_usec
            ),
        )
        .unwrap();
    }

    #[test]
    fn sample_reads_and_caches_resolved_path() {
        let tmp = tempfile::tempdir().unwrap();
        let pod_dir = tmp.path().join("burstable").join("poduid-1");
        fs::create_dir_all(&pod_dir).unwrap();
        write_cpu_stat(&pod_dir, 500_000, 1_000, 2);

        let reader = CgroupReader::new(tmp.path());
        let sample = reader.sample("uid-1").unwrap();
        assert_eq!(sample.cpu_usage_ns, 500_000_000);
        assert_eq!(sample.throttled_ns, 1_000_000);
        assert_eq!(sample.nr_throttled, 2);

        assert!(reader.handles.read().unwrap().contains_key("uid-1"));
    }

    #[test]
    fn missing_cgroup_root_is_fatal() {
        let reader = CgroupReader::new("/nonexistent/cgroup/root/for/mbcas/tests");
        let err = reader.sample("uid-1").unwrap_err();
        assert!(matches!(err.kind(), mbcas_core::ErrorKind::Fatal));
    }

    #[test]
    fn missing_pod_cgroup_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let reader = CgroupReader::new(tmp.path());
        let err = reader.sample("absent-uid").unwrap_err();
        assert!(matches!(err.kind(), mbcas_core::ErrorKind::NotFound));
    }

    #[test]
    fn cleanup_drops_handles_for_absent_pods() {
        let tmp = tempfile::tempdir().unwrap();
        let pod_dir = tmp.path().join("poduid-1");
        fs::create_dir_all(&pod_dir).unwrap();
        write_cpu_stat(&pod_dir, 100, 0, 0);

        let reader = CgroupReader::new(tmp.path());
        reader.sample("uid-1").unwrap();
        assert!(reader.handles.read().unwrap().contains_key("uid-1"));

        reader.cleanup(&HashSet::new());
        assert!(!reader.handles.read().unwrap().contains_key("uid-1"));
    }
}
