//! Test: Step Ordering - subsets always run in ascending id order

use crate::helpers::*;
use secboot::core::{ConfigError, PipelineError, StepId, StepSelection};

/// [7, 3, 1] executes as [1, 3, 7]
#[tokio::test]
async fn test_subset_runs_in_ascending_order() {
    let pipeline = TestPipeline::new();

    let report = pipeline.run_steps(&pipeline.default_config(), &[7, 3, 1]).await;

    assert_execution_order(&report, &[1, 3, 7]);
    assert_eq!(pipeline.started_steps(), vec![1, 3, 7]);
    assert_step_completed(&report, 1);
    assert_step_completed(&report, 3);
    // Steps 2, 4, 5 and 6 were not selected, so export lacks their outputs
    assert_step_failed(&report, 7, "missing artifacts from step 2");
}

#[tokio::test]
async fn test_duplicates_collapse() {
    let pipeline = TestPipeline::new();

    let report = pipeline
        .run_steps(&pipeline.default_config(), &[6, 3, 6, 3, 6])
        .await;

    assert_run_completed(&report);
    assert_execution_order(&report, &[3, 6]);
    assert_eq!(pipeline.started_steps(), vec![3, 6]);

    let downloads = pipeline
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Download(_)))
        .count();
    assert_eq!(downloads, pipeline.tools.firmware.archives.len());
}

#[tokio::test]
async fn test_keys_and_numbers_select_the_same_steps() {
    let pipeline = TestPipeline::new();
    let registry = pipeline.runner.registry();

    let by_key = StepSelection::parse(&["configs", "firmware"], registry).unwrap();
    let by_number = StepSelection::parse(&["6", "3"], registry).unwrap();

    assert_eq!(by_key, by_number);
    assert_eq!(
        by_key.resolve(registry).unwrap(),
        vec![StepId(3), StepId(6)]
    );
}

#[tokio::test]
async fn test_unknown_step_is_rejected_before_running() {
    let pipeline = TestPipeline::new();

    let err = StepSelection::parse(&["3", "deploy"], pipeline.runner.registry()).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownStep(ref s) if s == "deploy"));

    let report = pipeline.run_steps(&pipeline.default_config(), &[3, 9]).await;
    assert_run_failed(&report);
    assert!(report.steps.is_empty());
    assert!(matches!(
        report.failure,
        Some(PipelineError::Config(ConfigError::UnknownStep(_)))
    ));
    assert!(pipeline.calls().is_empty());
}
