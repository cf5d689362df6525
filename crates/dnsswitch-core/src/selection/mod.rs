//! Latency selection engine
//!
//! Drives the `LatencyProber` across every server of one or more profiles,
//! aggregates the samples and picks the fastest profile.
//!
//! ## Fan-out
//!
//! Every probe of an invocation (each profile, each server, each repeat) is
//! one job. A fixed pool of at most `max_concurrent_probes` workers pulls
//! jobs from a shared cursor, so the number of tasks does not grow with the
//! repeat count. Each worker hands back job indices with their samples;
//! samples are slotted into place only after every worker has finished, so
//! aggregation is a pure function of the collected samples.
//!
//! ## Aggregation
//!
//! ```text
//! server average  = mean RTT of successful samples (none => unreachable)
//! profile average = mean of reachable server averages (none => excluded)
//! winner          = strictly smallest profile average, first one on ties
//! ```

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::profile::Profile;
use crate::traits::{LatencyProber, ProbeOutcome, ProbeSample};

/// Average latency over a set of samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    /// Server address or profile name the result describes
    pub subject: String,
    /// Mean RTT; `None` when nothing succeeded
    pub average: Option<Duration>,
    /// Successful samples (servers, for a profile)
    pub success_count: usize,
    /// All samples (servers, for a profile)
    pub attempt_count: usize,
}

/// Samples and average for one server
#[derive(Debug, Clone, Serialize)]
pub struct ServerReport {
    pub server: IpAddr,
    #[serde(skip)]
    pub samples: Vec<ProbeSample>,
    pub aggregate: AggregateResult,
}

impl ServerReport {
    fn from_samples(server: IpAddr, samples: Vec<ProbeSample>) -> Self {
        let successes: Vec<Duration> = samples
            .iter()
            .filter(|s| s.is_success())
            .map(|s| s.rtt)
            .collect();

        let aggregate = AggregateResult {
            subject: server.to_string(),
            average: mean(&successes),
            success_count: successes.len(),
            attempt_count: samples.len(),
        };

        Self {
            server,
            samples,
            aggregate,
        }
    }
}

/// Per-server reports and average for one profile
#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub profile: String,
    pub servers: Vec<ServerReport>,
    pub aggregate: AggregateResult,
}

impl ProfileReport {
    pub(crate) fn from_servers(profile: &str, servers: Vec<ServerReport>) -> Self {
        let averages: Vec<Duration> = servers
            .iter()
            .filter_map(|s| s.aggregate.average)
            .collect();

        let aggregate = AggregateResult {
            subject: profile.to_string(),
            average: mean(&averages),
            success_count: averages.len(),
            attempt_count: servers.len(),
        };

        Self {
            profile: profile.to_string(),
            servers,
            aggregate,
        }
    }
}

/// Outcome of ranking profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Selection {
    /// Profile with the strictly smallest average
    Fastest { profile: String, average: Duration },
    /// No profile had a single reachable server
    NoViableCandidate,
}

/// Result of an automatic selection
#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    /// One report per input profile, in input order
    pub profiles: Vec<ProfileReport>,
    pub selection: Selection,
}

/// Concurrent prober and aggregator
pub struct SelectionEngine {
    prober: Arc<dyn LatencyProber>,
    test_domain: String,
    timeout: Duration,
    max_concurrent_probes: usize,
}

/// One probe to run: (profile index, server index, server)
type Job = (usize, usize, IpAddr);

impl SelectionEngine {
    /// Create an engine probing `test_domain` with the given settings
    pub fn new(
        prober: Arc<dyn LatencyProber>,
        test_domain: impl Into<String>,
        config: &ProbeConfig,
    ) -> Self {
        Self {
            prober,
            test_domain: test_domain.into(),
            timeout: config.timeout(),
            max_concurrent_probes: config.max_concurrent_probes.max(1),
        }
    }

    /// Probe a single server `repeat` times
    pub async fn test_server(&self, server: IpAddr, repeat: usize) -> ServerReport {
        let probe = Profile::new(server.to_string(), vec![server]);
        let mut reports = self.probe_profiles(std::slice::from_ref(&probe), repeat).await;
        match reports.pop().and_then(|mut r| r.servers.pop()) {
            Some(report) => report,
            None => ServerReport::from_samples(server, Vec::new()),
        }
    }

    /// Probe every server of one profile `repeat` times
    pub async fn test_profile(&self, profile: &Profile, repeat: usize) -> ProfileReport {
        let mut reports = self.probe_profiles(std::slice::from_ref(profile), repeat).await;
        reports
            .pop()
            .unwrap_or_else(|| ProfileReport::from_servers(&profile.name, Vec::new()))
    }

    /// Probe every profile and pick the fastest
    pub async fn select(&self, profiles: &[Profile], repeat: usize) -> SelectionReport {
        let reports = self.probe_profiles(profiles, repeat).await;
        let selection = pick_fastest(&reports);

        match &selection {
            Selection::Fastest { profile, average } => {
                info!("Fastest profile: {} ({:?} average)", profile, average)
            }
            Selection::NoViableCandidate => warn!("No profile had a reachable server"),
        }

        SelectionReport {
            profiles: reports,
            selection,
        }
    }

    /// Probe every server of every profile `repeat` times, concurrently
    ///
    /// A repeat count of 0 is treated as 1.
    pub async fn probe_profiles(&self, profiles: &[Profile], repeat: usize) -> Vec<ProfileReport> {
        let repeat = repeat.max(1);

        let mut jobs: Vec<Job> = Vec::new();
        for (p, profile) in profiles.iter().enumerate() {
            for (s, server) in profile.servers.iter().enumerate() {
                for _ in 0..repeat {
                    jobs.push((p, s, *server));
                }
            }
        }

        debug!(
            "Probing {} profile(s), {} job(s), at most {} in flight",
            profiles.len(),
            jobs.len(),
            self.max_concurrent_probes
        );

        let collected = self.run_jobs(&jobs).await;

        // Reduce: slot each sample back under its profile/server
        let mut grouped: Vec<Vec<Vec<ProbeSample>>> = profiles
            .iter()
            .map(|p| vec![Vec::with_capacity(repeat); p.servers.len()])
            .collect();

        for (index, sample) in collected.into_iter().enumerate() {
            let (p, s, server) = jobs[index];
            let sample = sample.unwrap_or_else(|| {
                ProbeSample::new(
                    server,
                    Duration::ZERO,
                    ProbeOutcome::ProtocolError("probe task failed".to_string()),
                )
            });
            grouped[p][s].push(sample);
        }

        profiles
            .iter()
            .zip(grouped)
            .map(|(profile, per_server)| {
                let servers = profile
                    .servers
                    .iter()
                    .zip(per_server)
                    .map(|(server, samples)| ServerReport::from_samples(*server, samples))
                    .collect();
                ProfileReport::from_servers(&profile.name, servers)
            })
            .collect()
    }

    /// Run all jobs on a bounded worker pool, returning samples by job index
    ///
    /// A slot stays `None` only if its worker did not complete.
    async fn run_jobs(&self, jobs: &[Job]) -> Vec<Option<ProbeSample>> {
        let servers: Arc<[IpAddr]> = jobs.iter().map(|(_, _, server)| *server).collect();
        let cursor = Arc::new(AtomicUsize::new(0));
        let workers = self.max_concurrent_probes.min(jobs.len());
        let mut tasks = JoinSet::new();

        for _ in 0..workers {
            let servers = Arc::clone(&servers);
            let cursor = Arc::clone(&cursor);
            let prober = Arc::clone(&self.prober);
            let test_domain = self.test_domain.clone();
            let timeout = self.timeout;

            tasks.spawn(async move {
                let mut done = Vec::new();
                loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(server) = servers.get(index).copied() else {
                        break;
                    };
                    done.push((index, prober.measure(server, &test_domain, timeout).await));
                }
                done
            });
        }

        let mut results: Vec<Option<ProbeSample>> = vec![None; jobs.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => {
                    for (index, sample) in done {
                        results[index] = Some(sample);
                    }
                }
                Err(e) => warn!("Probe worker failed: {}", e),
            }
        }
        results
    }
}

/// Pick the profile with the strictly smallest average
///
/// Unreachable profiles are skipped; on equal averages the earlier profile
/// is kept.
pub fn pick_fastest(reports: &[ProfileReport]) -> Selection {
    let mut best: Option<(&str, Duration)> = None;

    for report in reports {
        let Some(average) = report.aggregate.average else {
            continue;
        };
        match best {
            Some((_, best_average)) if average >= best_average => {}
            _ => best = Some((report.profile.as_str(), average)),
        }
    }

    match best {
        Some((profile, average)) => Selection::Fastest {
            profile: profile.to_string(),
            average,
        },
        None => Selection::NoViableCandidate,
    }
}

fn mean(values: &[Duration]) -> Option<Duration> {
    if values.is_empty() {
        return None;
    }
    let total: Duration = values.iter().sum();
    Some(total / values.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Fixed per-server outcome; unknown servers time out
    struct FixedProber {
        rtts: HashMap<IpAddr, Duration>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FixedProber {
        fn new(rtts: &[(&str, u64)]) -> Self {
            Self {
                rtts: rtts
                    .iter()
                    .map(|(ip, ms)| (ip.parse().unwrap(), Duration::from_millis(*ms)))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LatencyProber for FixedProber {
        async fn measure(&self, server: IpAddr, _: &str, timeout: Duration) -> ProbeSample {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.rtts.get(&server) {
                Some(rtt) => ProbeSample::new(server, *rtt, ProbeOutcome::Success),
                None => ProbeSample::new(server, timeout, ProbeOutcome::Timeout),
            }
        }
    }

    fn profile(name: &str, servers: &[&str]) -> Profile {
        Profile::new(name, servers.iter().map(|s| s.parse().unwrap()).collect())
    }

    fn engine(prober: Arc<dyn LatencyProber>, max: usize) -> SelectionEngine {
        let config = ProbeConfig {
            max_concurrent_probes: max,
            ..ProbeConfig::default()
        };
        SelectionEngine::new(prober, "example.com", &config)
    }

    #[test]
    fn test_mean_of_nothing_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(
            mean(&[Duration::from_millis(10), Duration::from_millis(20)]),
            Some(Duration::from_millis(15))
        );
    }

    #[tokio::test]
    async fn test_zero_repeat_probes_once() {
        let prober = Arc::new(FixedProber::new(&[("1.1.1.1", 5)]));
        let report = engine(prober, 4)
            .test_server("1.1.1.1".parse().unwrap(), 0)
            .await;

        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.aggregate.attempt_count, 1);
        assert_eq!(report.aggregate.average, Some(Duration::from_millis(5)));
    }

    #[tokio::test]
    async fn test_reports_keep_input_order() {
        let prober = Arc::new(FixedProber::new(&[("1.1.1.1", 30), ("8.8.8.8", 10), ("9.9.9.9", 20)]));
        let profiles = vec![
            profile("a", &["1.1.1.1"]),
            profile("b", &["8.8.8.8", "9.9.9.9"]),
        ];

        let reports = engine(prober, 2).probe_profiles(&profiles, 3).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].profile, "a");
        assert_eq!(reports[1].servers[0].server, "8.8.8.8".parse::<IpAddr>().unwrap());
        assert_eq!(reports[1].servers[1].samples.len(), 3);
        assert_eq!(reports[1].aggregate.average, Some(Duration::from_millis(15)));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let prober = Arc::new(FixedProber::new(&[("1.1.1.1", 1)]));
        let profiles = vec![profile("a", &["1.1.1.1", "1.0.0.1"])];

        let reports = engine(prober.clone(), 3).probe_profiles(&profiles, 10).await;

        assert!(prober.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 20);
        assert!(reports[0].servers.iter().all(|s| s.samples.len() == 10));
    }

    #[tokio::test]
    async fn test_large_repeat_uses_fixed_worker_pool() {
        let prober = Arc::new(FixedProber::new(&[("1.1.1.1", 1)]));
        let profiles = vec![profile("a", &["1.1.1.1"])];

        let reports = engine(prober.clone(), 2).probe_profiles(&profiles, 500).await;

        assert_eq!(reports[0].servers[0].samples.len(), 500);
        assert!(reports[0].servers[0].samples.iter().all(ProbeSample::is_success));
        assert!(prober.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_pick_fastest_skips_unreachable() {
        let reports = vec![
            ProfileReport::from_servers(
                "dead",
                vec![ServerReport::from_samples(
                    "10.0.0.1".parse().unwrap(),
                    vec![ProbeSample::new(
                        "10.0.0.1".parse().unwrap(),
                        Duration::from_millis(1),
                        ProbeOutcome::Timeout,
                    )],
                )],
            ),
            ProfileReport::from_servers("empty", Vec::new()),
        ];

        assert_eq!(reports[0].aggregate.average, None);
        assert_eq!(pick_fastest(&reports), Selection::NoViableCandidate);
    }
}
