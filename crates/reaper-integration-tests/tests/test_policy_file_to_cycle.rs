//! # Policy File to Cycle
//!
//! Loads a YAML policy file and environment-style settings through the CLI
//! layer, assembles the controller, and runs it against a mock fleet.

use std::sync::Arc;

use chrono::{Duration, Utc};

use reaper_cli::commands::{assemble, exit_code, EXIT_OK, EXIT_RETRIEVAL};
use reaper_cli::settings::Settings;
use reaper_core::{Instance, NotificationSink};
use reaper_provider::mock::{MockInventory, RecordingSink};

const POLICIES: &str = r#"
- instanceType: g5.xlarge
  maxRuntimeHours: 4
- name: "ci-runner-*"
  tags:
    Team: platform
  maxRuntimeHours: 12
- maxRuntimeHours: 168
"#;

fn settings(path: &str, extra: &[(&'static str, &'static str)]) -> Settings {
    let path = path.to_string();
    let extra = extra.to_vec();
    Settings::from_lookup(move |key| match key {
        "CONFIG_PATH" => Some(path.clone()),
        "AWS_REGION" => Some("us-east-1".into()),
        _ => extra
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string()),
    })
    .unwrap()
}

#[tokio::test]
async fn yaml_policies_drive_a_live_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policies.yaml");
    std::fs::write(&path, POLICIES).unwrap();

    let s = settings(
        path.to_str().unwrap(),
        &[("DRY_RUN", "false"), ("TERMINATION_CONCURRENCY", "4")],
    );
    let policies = s.load_policies().unwrap();
    assert_eq!(policies.len(), 3);

    let now = Utc::now();
    let fleet = Arc::new(MockInventory::single_page(vec![
        Instance::running("i-gpu", "g5.xlarge", now - Duration::hours(5)),
        Instance::running("i-ci", "c5.large", now - Duration::hours(13))
            .with_tag("Name", "ci-runner-7")
            .with_tag("Team", "platform"),
        Instance::running("i-ci-other", "c5.large", now - Duration::hours(13))
            .with_tag("Name", "ci-runner-8")
            .with_tag("Team", "data"),
        Instance::running("i-old", "m5.large", now - Duration::hours(200)),
    ]));
    let sink = Arc::new(RecordingSink::new());

    let controller = assemble(
        &s,
        policies,
        fleet.clone(),
        Some(sink.clone() as Arc<dyn NotificationSink>),
        false,
    );
    let outcome = controller.run_cycle().await;
    assert_eq!(exit_code(&outcome), EXIT_OK);

    let mut terminated: Vec<String> = fleet
        .terminated()
        .iter()
        .map(|id| id.as_str().to_string())
        .collect();
    terminated.sort();
    assert_eq!(terminated, ["i-ci", "i-gpu", "i-old"]);
    assert!(sink.messages()[0].body.starts_with("Found 3 long-running instances:"));
}

#[tokio::test]
async fn retrieval_failure_yields_exit_code_two() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policies.json");
    std::fs::write(&path, r#"[{"maxRuntimeHours": 1}]"#).unwrap();

    let s = settings(path.to_str().unwrap(), &[]);
    let fleet = Arc::new(MockInventory::single_page(vec![]).failing_on_page(1, "throttled"));
    let controller = assemble(&s, s.load_policies().unwrap(), fleet, None, false);

    assert_eq!(exit_code(&controller.run_cycle().await), EXIT_RETRIEVAL);
}
