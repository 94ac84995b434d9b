//! Agent wiring: resolve the target, attach probes, ingest, report.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cgroup::{find_cgroup_path, ContainerRef};
use crate::config::Config;

/// The capture target after resolution.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// Full container id; empty when targeting a raw cgroup path.
    pub container_id: String,
    /// Cgroup directory scoping the traced processes; empty accepts all.
    pub cgroup_path: String,
}

/// Resolve the capture target from a container reference or an explicit
/// cgroup path. The explicit path wins when both are given; with neither,
/// the agent traces the whole host.
pub fn resolve_target(
    cfg: &Config,
    container_ref: Option<&str>,
    cgroup_override: Option<&str>,
) -> Result<ResolvedTarget> {
    if let Some(path) = cgroup_override {
        return Ok(ResolvedTarget {
            container_id: String::new(),
            cgroup_path: path.to_string(),
        });
    }

    let Some(reference) = container_ref else {
        tracing::warn!("no container reference or cgroup path; tracing all processes");
        return Ok(ResolvedTarget {
            container_id: String::new(),
            cgroup_path: String::new(),
        });
    };

    let parsed = ContainerRef::parse(reference)?;
    let cgroup_path = find_cgroup_path(Path::new(&cfg.cgroup_base), &parsed.id)
        .with_context(|| format!("resolving cgroup for container {}", parsed.id))?;

    tracing::info!(
        container_id = %parsed.id,
        cgroup_path = %cgroup_path,
        runtime = %parsed.runtime,
        "resolved capture target"
    );

    Ok(ResolvedTarget {
        container_id: parsed.id,
        cgroup_path,
    })
}

/// Placeholder run for builds without the `bpf` feature.
#[cfg(not(feature = "bpf"))]
pub async fn run_capture(
    _cfg: Config,
    _target: ResolvedTarget,
    _cancel: tokio_util::sync::CancellationToken,
) -> Result<crate::diagnose::Diagnostician> {
    anyhow::bail!("this build has no BPF support; rebuild with --features bpf")
}

#[cfg(feature = "bpf")]
pub use capture::run_capture;

#[cfg(feature = "bpf")]
mod capture {
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::{Context, Result};
    use aya::maps::RingBuf;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::ResolvedTarget;
    use crate::cache;
    use crate::cgroup::filter::CgroupFilter;
    use crate::config::Config;
    use crate::diagnose::Diagnostician;
    use crate::resolver::PathResolver;
    use crate::tracer::ingest::{EventPipeline, Ingester};
    use crate::tracer::loader::load_probe_object;
    use crate::tracer::probes::attach_all_probes;

    /// Full capture session: load, attach, ingest until cancellation or the
    /// configured duration, then detach and hand back the finished session.
    pub async fn run_capture(
        cfg: Config,
        target: ResolvedTarget,
        cancel: CancellationToken,
    ) -> Result<Diagnostician> {
        let name_cache = cache::init_global_cache(&cfg.cache, &cfg.proc_base);
        let cleanup_task = name_cache.spawn_cleanup();

        let filter = Arc::new(CgroupFilter::new(
            cfg.proc_base.clone(),
            &target.cgroup_path,
        ));
        let resolver = Arc::new(PathResolver::with_proc_base(
            cfg.cache.ttl,
            cfg.proc_base.clone(),
        ));

        let mut ebpf = load_probe_object().context("loading probe object")?;
        let probes = attach_all_probes(&mut ebpf, &target.container_id)
            .context("attaching probes")?;
        tracing::info!(probes = probes.len(), "capture started");

        let events_map = ebpf
            .take_map("events")
            .ok_or_else(|| anyhow::anyhow!("events map not found in probe object"))?;
        let ring = RingBuf::try_from(events_map).context("opening event ring buffer")?;

        let pipeline = EventPipeline::new(
            filter,
            Arc::clone(&name_cache),
            Arc::clone(&resolver),
            cfg.default_sampling_rate,
        );

        let (tx, mut rx) = mpsc::channel(cfg.channel_capacity);
        let reader_cancel = cancel.child_token();
        let reader = tokio::spawn(Ingester::new(ring, pipeline).run(reader_cancel.clone(), tx));

        // Collect until the window closes or the caller cancels; then keep
        // draining until the reader drops its sender.
        let mut session = Diagnostician::with_thresholds(&cfg.thresholds);
        // A zero duration means "run until interrupted".
        let window_duration = if cfg.capture_duration.is_zero() {
            std::time::Duration::from_secs(86_400 * 365)
        } else {
            cfg.capture_duration
        };
        let window = tokio::time::sleep(window_duration);
        tokio::pin!(window);
        let mut window_open = true;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => session.add_event(event),
                        None => break,
                    }
                }
                _ = cancel.cancelled(), if !reader_cancel.is_cancelled() => {
                    reader_cancel.cancel();
                }
                _ = &mut window, if window_open => {
                    tracing::info!("capture window elapsed");
                    window_open = false;
                    reader_cancel.cancel();
                }
            }
        }

        reader.await.context("joining ring buffer reader")?;

        // Detach within the configured deadline. Dropping the probe set and
        // the loaded object detaches links in reverse attachment order.
        let detach_started = Instant::now();
        let deadline = cfg.detach_deadline;
        let detach = tokio::task::spawn_blocking(move || {
            drop(probes);
            drop(ebpf);
        });
        match tokio::time::timeout(deadline, detach).await {
            Ok(joined) => joined.context("joining detach task")?,
            Err(_) => {
                tracing::warn!(
                    elapsed_ms = detach_started.elapsed().as_millis() as u64,
                    "probe detach exceeded deadline; continuing shutdown"
                );
            }
        }

        name_cache.close();
        let _ = cleanup_task.await;

        session.finish();
        tracing::info!(events = session.events().len(), "capture finished");
        Ok(session)
    }
}
