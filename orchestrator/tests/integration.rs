//! End-to-end experiments against fake tools
//!
//! The scheme, the tunnel manager and the emulated link are shell scripts,
//! so these runs exercise process supervision, the manager protocol and
//! log reconciliation without network emulation installed.

use std::time::Duration;

use orchestrator::core::{RunMetadata, StatsFile};

mod common;
use common::{read_pids, wait_for_pids, wait_until_gone, ExperimentFixture};

#[tokio::test]
async fn test_tunnel_run_produces_logs_stats_and_metadata() {
    let fixture = ExperimentFixture::new();
    let mut experiment = fixture.experiment(fixture.local_config(1, 1));

    let report = experiment.run().await.unwrap();
    assert!(report.all_succeeded(), "{:?}", report.runs);
    assert_eq!(report.runs.len(), 1);

    let data = fixture.data_dir();
    let datalink = std::fs::read_to_string(data.join("cubic_datalink_run1.log")).unwrap();
    assert_eq!(
        datalink,
        "# init timestamp: 1000.000\n\
         0.000 # 1500\n\
         0.000 + 1500 1\n\
         5.000 + 1500 1\n\
         10.000 - 1500 10.000 1\n\
         15.000 - 1500 10.000 1\n"
    );
    assert!(data.join("cubic_acklink_run1.log").exists());

    let stats = std::fs::read_to_string(StatsFile::for_run(&data, "cubic", 1).path()).unwrap();
    assert!(stats.contains("Start at: "));
    assert!(stats.contains("End at: "));

    let metadata = RunMetadata::load(&RunMetadata::path(&data)).await.unwrap();
    assert_eq!(metadata.scheme_list().unwrap(), vec!["cubic".to_string()]);
    assert_eq!(metadata.flows, 1);
    assert_eq!(metadata.uplink_trace.as_deref(), Some("12mbps.trace"));
}

/// Managers and the scheme processes they started are gone after a run
#[tokio::test]
async fn test_successful_run_leaves_no_processes() {
    let fixture = ExperimentFixture::new();
    let mut experiment = fixture.experiment(fixture.local_config(1, 1));

    let report = experiment.run().await.unwrap();
    assert!(report.all_succeeded(), "{:?}", report.runs);

    let pids: Vec<i32> = read_pids(&fixture.scheme_pids)
        .into_iter()
        .chain(read_pids(&fixture.manager_pids))
        .collect();
    assert_eq!(pids.len(), 4, "two scheme sides and two managers");
    for pid in pids {
        assert!(wait_until_gone(pid).await, "process {pid} survived the run");
    }
}

/// Dropping a run midway (as on SIGINT) tears down everything it owns
#[tokio::test]
async fn test_interrupted_run_leaves_no_processes() {
    let fixture = ExperimentFixture::new();
    let mut experiment = fixture.experiment(fixture.local_config(1, 60));

    let mut run = Box::pin(experiment.run());
    let scheme_pids = tokio::select! {
        _ = &mut run => panic!("run finished before it was interrupted"),
        pids = wait_for_pids(&fixture.scheme_pids, 2) => pids,
    };
    drop(run);

    let manager_pids = read_pids(&fixture.manager_pids);
    assert_eq!(manager_pids.len(), 2);
    for pid in scheme_pids.into_iter().chain(manager_pids) {
        assert!(wait_until_gone(pid).await, "process {pid} survived the interrupt");
    }
}

/// Without tunnels both sides run directly and stop at the runtime
#[tokio::test]
async fn test_direct_run_stops_at_runtime() {
    let fixture = ExperimentFixture::new();
    let mut experiment = fixture.experiment(fixture.local_config(0, 1));

    let report = tokio::time::timeout(Duration::from_secs(20), experiment.run())
        .await
        .unwrap()
        .unwrap();
    assert!(report.all_succeeded(), "{:?}", report.runs);

    let pids = read_pids(&fixture.scheme_pids);
    assert_eq!(pids.len(), 2);
    for pid in pids {
        assert!(wait_until_gone(pid).await, "scheme process {pid} outlived the runtime");
    }

    let data = fixture.data_dir();
    assert!(data.join("cubic_mm_datalink_run1.log").exists());
    let stats = std::fs::read_to_string(StatsFile::for_run(&data, "cubic", 1).path()).unwrap();
    assert!(stats.starts_with("Start at: "));
}

/// A failed run is reported and the experiment moves on to the next one
#[tokio::test]
async fn test_failed_run_does_not_stop_the_experiment() {
    let fixture = ExperimentFixture::new();
    let mut config = fixture.local_config(3, 20);
    config.interval = 11;
    config.run_times = 2;
    let mut experiment = fixture.experiment(config);

    let report = experiment.run().await.unwrap();
    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.failures().count(), 2);
    assert!(read_pids(&fixture.scheme_pids).is_empty());
    assert!(!StatsFile::for_run(&fixture.data_dir(), "cubic", 1).path().exists());
}
