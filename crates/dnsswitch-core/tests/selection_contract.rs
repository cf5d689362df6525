//! Contract Test: Latency Selection
//!
//! Constraints verified:
//! - Failed samples never contribute to an average
//! - Equal averages resolve to the earlier profile
//! - No reachable server anywhere is an outcome, not an error
//! - Automatic selection applies the winner when asked, and keeps its
//!   results when applying fails
//!
//! If this test fails, profile ranking is unreliable.

mod common;

use common::*;
use dnsswitch_core::selection::{Selection, SelectionEngine};
use dnsswitch_core::{ApplyOutcome, DnsSwitcher, Error, MemoryProfileStore, Profile, ProbeConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;

fn engine(prober: ScriptedProber) -> SelectionEngine {
    SelectionEngine::new(Arc::new(prober), "example.com", &ProbeConfig::default())
}

fn profile(name: &str, list: &[&str]) -> Profile {
    Profile::new(name, ips(list))
}

#[tokio::test]
async fn failing_server_is_excluded_from_profile_average() {
    let prober = ScriptedProber::new().succeed("192.0.2.1", 10).refuse("192.0.2.2");
    let report = engine(prober)
        .test_profile(&profile("ab", &["192.0.2.1", "192.0.2.2"]), 3)
        .await;

    assert_eq!(report.aggregate.average, Some(Duration::from_millis(10)));
    assert_eq!(report.aggregate.success_count, 1);
    assert_eq!(report.aggregate.attempt_count, 2);

    let failed = &report.servers[1];
    assert_eq!(failed.aggregate.average, None);
    assert_eq!(failed.samples.len(), 3);
    assert!(failed.samples.iter().all(|s| !s.is_success()));
}

#[tokio::test]
async fn repeated_server_counts_once_in_profile_average() {
    let prober = ScriptedProber::new().succeed("192.0.2.1", 10).succeed("192.0.2.2", 40);
    let report = engine(prober)
        .test_profile(&profile("dup", &["192.0.2.1", "192.0.2.1", "192.0.2.2"]), 2)
        .await;

    assert_eq!(report.servers.len(), 2);
    assert_eq!(report.aggregate.average, Some(Duration::from_millis(25)));
}

#[tokio::test]
async fn tie_goes_to_earlier_profile() {
    let prober = ScriptedProber::new()
        .succeed("192.0.2.1", 20)
        .succeed("192.0.2.2", 20)
        .succeed("192.0.2.3", 30);
    let profiles = vec![
        profile("slow", &["192.0.2.3"]),
        profile("first", &["192.0.2.1"]),
        profile("second", &["192.0.2.2"]),
    ];

    let report = engine(prober).select(&profiles, 2).await;

    assert_eq!(
        report.selection,
        Selection::Fastest {
            profile: "first".to_string(),
            average: Duration::from_millis(20),
        }
    );
    assert_eq!(report.profiles.len(), 3);
    assert_eq!(report.profiles[0].profile, "slow");
}

#[tokio::test]
async fn all_failing_is_no_viable_candidate() {
    let prober = ScriptedProber::new().refuse("192.0.2.1");
    let profiles = vec![profile("dead", &["192.0.2.1"]), profile("silent", &["192.0.2.9"])];

    let report = engine(prober).select(&profiles, 2).await;

    assert_eq!(report.selection, Selection::NoViableCandidate);
    assert!(report.profiles.iter().all(|p| p.aggregate.average.is_none()));
}

#[tokio::test]
async fn every_repeat_of_every_server_is_probed() {
    let prober = Arc::new(ScriptedProber::new().succeed("192.0.2.1", 5));
    let engine = SelectionEngine::new(prober.clone(), "example.com", &ProbeConfig::default());
    let profiles = vec![
        profile("a", &["192.0.2.1", "192.0.2.2"]),
        profile("b", &["192.0.2.3"]),
    ];

    engine.probe_profiles(&profiles, 4).await;

    assert_eq!(prober.call_count(), 12);
}

#[tokio::test]
async fn auto_select_applies_winner() {
    let dir = tempfile::tempdir().unwrap();
    let configurator = RecordingConfigurator::new(&["Ethernet"]);
    let store = MemoryProfileStore::with_profiles(vec![
        profile("far", &["192.0.2.1"]),
        profile("near", &["192.0.2.2", "192.0.2.3"]),
    ]);
    let prober = ScriptedProber::new()
        .succeed("192.0.2.1", 40)
        .succeed("192.0.2.2", 5)
        .refuse("192.0.2.3");

    let switcher = DnsSwitcher::new(
        minimal_config(dir.path()),
        Arc::new(store),
        Arc::new(prober),
        Arc::new(configurator.clone()),
    )
    .unwrap();

    let result = switcher.auto_select(Some(2), true, None).await.unwrap();

    assert!(matches!(
        &result.report.selection,
        Selection::Fastest { profile, .. } if profile == "near"
    ));
    assert!(matches!(result.applied, Some(Ok(ApplyOutcome::Applied { .. }))));
    assert_eq!(configurator.dns_of("Ethernet"), servers(&["192.0.2.2", "192.0.2.3"]));
}

#[tokio::test]
async fn auto_select_refuses_ambiguous_interface_before_probing() {
    let dir = tempfile::tempdir().unwrap();
    let configurator = RecordingConfigurator::new(&["Ethernet", "Wi-Fi"]);
    let prober = Arc::new(ScriptedProber::new().succeed("192.0.2.1", 5));
    let store = MemoryProfileStore::with_profiles(vec![profile("only", &["192.0.2.1"])]);

    let switcher = DnsSwitcher::new(
        minimal_config(dir.path()),
        Arc::new(store),
        prober.clone(),
        Arc::new(configurator.clone()),
    )
    .unwrap();

    let err = assert_err!(switcher.auto_select(Some(2), true, None).await);

    assert!(matches!(err, Error::AmbiguousInterface { .. }));
    assert_eq!(prober.call_count(), 0);
    assert_eq!(configurator.mutating_call_count(), 0);
}

#[tokio::test]
async fn failed_apply_keeps_selection_report() {
    let dir = tempfile::tempdir().unwrap();
    let configurator = RecordingConfigurator::new(&["Ethernet"]).failing_primary();
    let store = MemoryProfileStore::with_profiles(vec![
        profile("far", &["192.0.2.1"]),
        profile("near", &["192.0.2.2"]),
    ]);
    let prober = ScriptedProber::new().succeed("192.0.2.1", 30).succeed("192.0.2.2", 5);

    let switcher = DnsSwitcher::new(
        minimal_config(dir.path()),
        Arc::new(store),
        Arc::new(prober),
        Arc::new(configurator.clone()),
    )
    .unwrap();

    let result = switcher.auto_select(Some(1), true, None).await.unwrap();

    assert_eq!(result.report.profiles.len(), 2);
    assert!(matches!(
        &result.report.selection,
        Selection::Fastest { profile, .. } if profile == "near"
    ));
    assert!(matches!(
        result.applied,
        Some(Err(Error::ConfigurationStepFailed { .. }))
    ));
}

#[tokio::test]
async fn auto_select_without_candidates_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let configurator = RecordingConfigurator::new(&["Ethernet"]);
    let store = MemoryProfileStore::with_profiles(vec![profile("dead", &["192.0.2.1"])]);

    let switcher = DnsSwitcher::new(
        minimal_config(dir.path()),
        Arc::new(store),
        Arc::new(ScriptedProber::new()),
        Arc::new(configurator.clone()),
    )
    .unwrap();

    let result = switcher.auto_select(None, true, None).await.unwrap();

    assert_eq!(result.report.selection, Selection::NoViableCandidate);
    assert!(result.applied.is_none());
    assert_eq!(configurator.mutating_call_count(), 0);
}

#[tokio::test]
async fn test_target_accepts_profile_or_address() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryProfileStore::with_profiles(vec![profile("quad9", &["9.9.9.9", "149.112.112.112"])]);
    let prober = ScriptedProber::new().succeed("9.9.9.9", 12).succeed("192.0.2.7", 3);

    let switcher = DnsSwitcher::new(
        minimal_config(dir.path()),
        Arc::new(store),
        Arc::new(prober),
        Arc::new(RecordingConfigurator::new(&["Ethernet"])),
    )
    .unwrap();

    let by_name = switcher.test_target("quad9", None).await.unwrap();
    assert_eq!(by_name.servers.len(), 2);
    assert_eq!(by_name.aggregate.average, Some(Duration::from_millis(12)));

    let by_address = switcher.test_target("192.0.2.7", Some(3)).await.unwrap();
    assert_eq!(by_address.servers[0].samples.len(), 3);

    assert!(matches!(
        switcher.test_target("not a target", None).await,
        Err(Error::InvalidArgument(_))
    ));
}
