//! Probe attachment and shared-library discovery.
//!
//! Kernel probes are mandatory: a failed attach rolls back everything
//! already attached so the kernel's probe table is left clean. Tracepoints
//! and user-space probes are best-effort; a kernel without the hook or a
//! container without the library just loses that event class.

use std::path::PathBuf;

/// Host locations of libc, multiple architectures and multilib layouts.
const LIBC_HOST_PATHS: &[&str] = &[
    "/lib/x86_64-linux-gnu/libc.so.6",
    "/lib64/libc.so.6",
    "/lib/libc.so.6",
    "/usr/lib/x86_64-linux-gnu/libc.so.6",
    "/usr/lib64/libc.so.6",
    "/usr/lib/libc.so.6",
    "/lib/aarch64-linux-gnu/libc.so.6",
    "/usr/lib/aarch64-linux-gnu/libc.so.6",
];

/// Paths tried inside a container rootfs, relative to its root.
const LIBC_CONTAINER_PATHS: &[&str] = &[
    "lib/x86_64-linux-gnu/libc.so.6",
    "lib64/libc.so.6",
    "lib/libc.so.6",
    "usr/lib/x86_64-linux-gnu/libc.so.6",
    "usr/lib64/libc.so.6",
    "usr/lib/libc.so.6",
];

const LIBPQ_HOST_PATHS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu/libpq.so.5",
    "/usr/lib64/libpq.so.5",
    "/usr/lib/libpq.so.5",
    "/usr/lib/aarch64-linux-gnu/libpq.so.5",
];

const LIBPQ_CONTAINER_PATHS: &[&str] = &[
    "usr/lib/x86_64-linux-gnu/libpq.so.5",
    "usr/lib64/libpq.so.5",
    "usr/lib/libpq.so.5",
];

const LIBMYSQL_HOST_PATHS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu/libmysqlclient.so.21",
    "/usr/lib64/libmysqlclient.so.21",
    "/usr/lib/libmysqlclient.so.21",
    "/usr/lib/aarch64-linux-gnu/libmysqlclient.so.21",
];

const LIBMYSQL_CONTAINER_PATHS: &[&str] = &[
    "usr/lib/x86_64-linux-gnu/libmysqlclient.so.21",
    "usr/lib64/libmysqlclient.so.21",
    "usr/lib/libmysqlclient.so.21",
];

/// First existing libc, searching host paths then (for a known container)
/// its rootfs and the pid-1 mount namespace view. Empty string on a miss.
pub fn find_libc_path(container_id: &str) -> String {
    find_library_path(container_id, LIBC_HOST_PATHS, LIBC_CONTAINER_PATHS)
}

/// First existing libpq, same fallback shape as libc.
pub fn find_libpq_path(container_id: &str) -> String {
    find_library_path(container_id, LIBPQ_HOST_PATHS, LIBPQ_CONTAINER_PATHS)
}

/// First existing libmysqlclient, same fallback shape as libc.
pub fn find_libmysql_path(container_id: &str) -> String {
    find_library_path(container_id, LIBMYSQL_HOST_PATHS, LIBMYSQL_CONTAINER_PATHS)
}

fn find_library_path(container_id: &str, host: &[&str], container: &[&str]) -> String {
    for path in host {
        if is_regular_file(path) {
            return (*path).to_string();
        }
    }

    if !container_id.is_empty() {
        for candidate in container_candidate_paths(container_id, container) {
            if is_regular_file(&candidate.to_string_lossy()) {
                return candidate.to_string_lossy().into_owned();
            }
        }
    }

    String::new()
}

/// Candidate library locations for a container: docker rootfs variants when
/// that rootfs exists, then the pid-1 mount namespace view.
fn container_candidate_paths(container_id: &str, rel_paths: &[&str]) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(rel_paths.len() * 2);

    let docker_root = PathBuf::from(format!(
        "/var/lib/docker/containers/{container_id}/rootfs"
    ));
    if docker_root.exists() {
        for rel in rel_paths {
            candidates.push(docker_root.join(rel));
        }
    }

    for rel in rel_paths {
        candidates.push(PathBuf::from("/proc/1/root").join(rel));
    }

    candidates
}

fn is_regular_file(path: &str) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(feature = "bpf")]
pub use attach::{attach_all_probes, attach_kernel_probes, attach_tracepoints, ProbeSet};

#[cfg(feature = "bpf")]
mod attach {
    use aya::programs::kprobe::KProbeLink;
    use aya::programs::trace_point::TracePointLink;
    use aya::programs::uprobe::UProbeLink;
    use aya::programs::{KProbe, TracePoint, UProbe};
    use aya::Ebpf;

    use super::{find_libc_path, find_libmysql_path, find_libpq_path};
    use crate::tracer::errors::TracerError;

    /// Kernel probe programs and their target symbols. Programs whose name
    /// starts with `kretprobe_` carry return-probe sections in the object;
    /// aya attaches them with return semantics automatically.
    const KERNEL_PROBES: &[(&str, &str)] = &[
        ("kprobe_tcp_connect", "tcp_v4_connect"),
        ("kretprobe_tcp_connect", "tcp_v4_connect"),
        ("kprobe_tcp_v6_connect", "tcp_v6_connect"),
        ("kretprobe_tcp_v6_connect", "tcp_v6_connect"),
        ("kprobe_tcp_sendmsg", "tcp_sendmsg"),
        ("kretprobe_tcp_sendmsg", "tcp_sendmsg"),
        ("kprobe_tcp_recvmsg", "tcp_recvmsg"),
        ("kretprobe_tcp_recvmsg", "tcp_recvmsg"),
        ("kprobe_udp_sendmsg", "udp_sendmsg"),
        ("kretprobe_udp_sendmsg", "udp_sendmsg"),
        ("kprobe_udp_recvmsg", "udp_recvmsg"),
        ("kretprobe_udp_recvmsg", "udp_recvmsg"),
        ("kprobe_vfs_write", "vfs_write"),
        ("kretprobe_vfs_write", "vfs_write"),
        ("kprobe_vfs_read", "vfs_read"),
        ("kretprobe_vfs_read", "vfs_read"),
        ("kprobe_vfs_fsync", "vfs_fsync"),
        ("kretprobe_vfs_fsync", "vfs_fsync"),
    ];

    /// Best-effort tracepoint programs: (program, group, name).
    const TRACEPOINTS: &[(&str, &str, &str)] = &[
        ("tracepoint_sched_switch", "sched", "sched_switch"),
        ("tracepoint_tcp_set_state", "tcp", "tcp_set_state"),
        ("tracepoint_page_fault_user", "exceptions", "page_fault_user"),
        ("tracepoint_oom_kill_process", "oom", "oom_kill_process"),
    ];

    enum ProbeLink {
        KProbe(KProbeLink),
        TracePoint(TracePointLink),
        UProbe(UProbeLink),
    }

    /// Owned attachment handles. Dropping the set detaches every probe in
    /// reverse attachment order.
    pub struct ProbeSet {
        links: Vec<(String, ProbeLink)>,
    }

    impl ProbeSet {
        pub fn new() -> Self {
            Self { links: Vec::new() }
        }

        pub fn len(&self) -> usize {
            self.links.len()
        }

        pub fn is_empty(&self) -> bool {
            self.links.is_empty()
        }

        fn push(&mut self, name: &str, link: ProbeLink) {
            self.links.push((name.to_string(), link));
        }
    }

    impl Default for ProbeSet {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for ProbeSet {
        fn drop(&mut self) {
            // LIFO: detach the most recently attached probe first.
            while let Some((name, link)) = self.links.pop() {
                drop(link);
                tracing::debug!(probe = %name, "detached");
            }
        }
    }

    /// Attach every probe kind: mandatory kernel probes, best-effort
    /// tracepoints, best-effort user probes.
    pub fn attach_all_probes(ebpf: &mut Ebpf, container_id: &str) -> Result<ProbeSet, TracerError> {
        let mut set = attach_kernel_probes(ebpf)?;
        attach_tracepoints(ebpf, &mut set);
        attach_dns_probes(ebpf, container_id, &mut set);
        attach_lock_probes(ebpf, container_id, &mut set);
        attach_db_probes(ebpf, container_id, &mut set);
        Ok(set)
    }

    /// Attach the kernel probe table. Any failure detaches everything
    /// attached so far before the error propagates.
    pub fn attach_kernel_probes(ebpf: &mut Ebpf) -> Result<ProbeSet, TracerError> {
        let mut set = ProbeSet::new();

        for (prog_name, symbol) in KERNEL_PROBES {
            // A program absent from the object means this build of the
            // probe object does not cover the symbol; skip it.
            if ebpf.program(prog_name).is_none() {
                continue;
            }

            let link = attach_one_kprobe(ebpf, prog_name, symbol).map_err(|source| {
                // `set` drops here, rolling back in reverse order.
                TracerError::AttachFailed {
                    program: (*prog_name).to_string(),
                    symbol: (*symbol).to_string(),
                    source,
                }
            })?;
            set.push(prog_name, ProbeLink::KProbe(link));
            tracing::debug!(program = prog_name, symbol, "attached kernel probe");
        }

        tracing::info!(count = set.len(), "kernel probes attached");
        Ok(set)
    }

    fn attach_one_kprobe(
        ebpf: &mut Ebpf,
        prog_name: &str,
        symbol: &str,
    ) -> anyhow::Result<KProbeLink> {
        let prog: &mut KProbe = ebpf
            .program_mut(prog_name)
            .ok_or_else(|| anyhow::anyhow!("program '{prog_name}' not found"))?
            .try_into()?;
        prog.load()?;
        let link_id = prog.attach(symbol, 0)?;
        Ok(prog.take_link(link_id)?)
    }

    /// Attach the tracepoint table. Missing hooks and permission problems
    /// are expected on some kernels and only logged.
    pub fn attach_tracepoints(ebpf: &mut Ebpf, set: &mut ProbeSet) {
        for (prog_name, group, name) in TRACEPOINTS {
            if ebpf.program(prog_name).is_none() {
                continue;
            }

            match attach_one_tracepoint(ebpf, prog_name, group, name) {
                Ok(link) => {
                    set.push(prog_name, ProbeLink::TracePoint(link));
                    tracing::debug!(group, name, "attached tracepoint");
                }
                Err(e) => {
                    let text = format!("{e:#}");
                    if text.contains("permission denied") || text.contains("not found") {
                        tracing::debug!(group, name, error = %text, "tracepoint unavailable");
                    } else {
                        tracing::warn!(group, name, error = %text, "tracepoint attach failed");
                    }
                }
            }
        }
    }

    fn attach_one_tracepoint(
        ebpf: &mut Ebpf,
        prog_name: &str,
        group: &str,
        name: &str,
    ) -> anyhow::Result<TracePointLink> {
        let prog: &mut TracePoint = ebpf
            .program_mut(prog_name)
            .ok_or_else(|| anyhow::anyhow!("program '{prog_name}' not found"))?
            .try_into()?;
        prog.load()?;
        let link_id = prog.attach(group, name)?;
        Ok(prog.take_link(link_id)?)
    }

    /// Attach getaddrinfo entry/return probes on libc for DNS tracking.
    pub fn attach_dns_probes(ebpf: &mut Ebpf, container_id: &str, set: &mut ProbeSet) {
        let libc = find_libc_path(container_id);
        if libc.is_empty() {
            tracing::warn!("DNS tracking unavailable: libc not found");
            return;
        }

        attach_uprobe_pair(ebpf, &libc, "getaddrinfo", set);
    }

    /// Attach pthread_mutex_lock entry/return probes on libc for lock
    /// contention tracking.
    pub fn attach_lock_probes(ebpf: &mut Ebpf, container_id: &str, set: &mut ProbeSet) {
        let libc = find_libc_path(container_id);
        if libc.is_empty() {
            tracing::warn!("lock contention tracking unavailable: libc not found");
            return;
        }

        attach_uprobe_pair(ebpf, &libc, "pthread_mutex_lock", set);
    }

    /// Attach DB query boundary probes on libpq and libmysqlclient.
    pub fn attach_db_probes(ebpf: &mut Ebpf, container_id: &str, set: &mut ProbeSet) {
        let libpq = find_libpq_path(container_id);
        if !libpq.is_empty() {
            attach_uprobe_pair(ebpf, &libpq, "PQexec", set);
        }

        let libmysql = find_libmysql_path(container_id);
        if !libmysql.is_empty() {
            attach_uprobe_pair(ebpf, &libmysql, "mysql_real_query", set);
        }

        if libpq.is_empty() && libmysql.is_empty() {
            tracing::debug!("DB query tracking unavailable: no client library found");
        }
    }

    /// Attach `uprobe_<symbol>` and `uretprobe_<symbol>` to a library.
    /// Either failing is non-fatal.
    fn attach_uprobe_pair(ebpf: &mut Ebpf, library: &str, symbol: &str, set: &mut ProbeSet) {
        for prog_name in [format!("uprobe_{symbol}"), format!("uretprobe_{symbol}")] {
            if ebpf.program(&prog_name).is_none() {
                continue;
            }

            match attach_one_uprobe(ebpf, &prog_name, library, symbol) {
                Ok(link) => {
                    set.push(&prog_name, ProbeLink::UProbe(link));
                    tracing::debug!(program = %prog_name, library, symbol, "attached user probe");
                }
                Err(e) => {
                    tracing::warn!(
                        program = %prog_name,
                        library,
                        symbol,
                        error = %format!("{e:#}"),
                        "user probe attach failed"
                    );
                }
            }
        }
    }

    fn attach_one_uprobe(
        ebpf: &mut Ebpf,
        prog_name: &str,
        library: &str,
        symbol: &str,
    ) -> anyhow::Result<UProbeLink> {
        let prog: &mut UProbe = ebpf
            .program_mut(prog_name)
            .ok_or_else(|| anyhow::anyhow!("program '{prog_name}' not found"))?
            .try_into()?;
        prog.load()?;
        let link_id = prog.attach(Some(symbol), 0, library, None)?;
        Ok(prog.take_link(link_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_libc_path_does_not_panic() {
        // Result depends on the host; only the contract matters.
        let path = find_libc_path("");
        if !path.is_empty() {
            assert!(path.ends_with("libc.so.6"));
        }
    }

    #[test]
    fn test_find_db_library_paths_do_not_panic() {
        let _ = find_libpq_path("");
        let _ = find_libmysql_path("nonexistent-container");
    }

    #[test]
    fn test_container_candidates_include_proc_root() {
        let candidates = container_candidate_paths("abc123", LIBC_CONTAINER_PATHS);
        assert!(!candidates.is_empty());
        assert!(candidates
            .iter()
            .any(|p| p.starts_with("/proc/1/root")));
    }

    #[test]
    fn test_container_candidates_skip_missing_docker_rootfs() {
        let candidates = container_candidate_paths("definitely-not-a-container", LIBC_CONTAINER_PATHS);
        // Without the docker rootfs on disk only the pid-1 view remains.
        assert_eq!(candidates.len(), LIBC_CONTAINER_PATHS.len());
    }
}
