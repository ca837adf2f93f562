//! Test: Failure Handling - the first failure aborts the rest of the selection

use crate::helpers::*;
use secboot::core::{BoardVariant, BootMedia, Dependency, PipelineError, StepId, StepSelection};

/// A failed build stops the run; later steps never start
#[tokio::test]
async fn test_build_failure_aborts_remaining_steps() {
    let pipeline = TestPipeline::failing_build("bl31");

    let report = pipeline
        .run(&pipeline.default_config(), StepSelection::All)
        .await;

    assert_run_failed(&report);
    assert!(!report.is_success());
    assert_step_completed(&report, 1);
    assert_step_failed(&report, 2, "build of bl31 failed");
    for id in 3..=7 {
        assert_step_pending(&report, id);
    }
    assert_eq!(pipeline.started_steps(), vec![1, 2]);
    assert!(matches!(
        report.failure,
        Some(PipelineError::ExternalTool { step: StepId(2), .. })
    ));

    let calls = pipeline.calls();
    assert!(!calls.iter().any(|c| matches!(c, Call::Download(_))));
    assert!(!calls.iter().any(Call::is_signing));
}

/// Missing host tools fail the step before its action runs
#[tokio::test]
async fn test_missing_dependency_fails_before_action() {
    let pipeline = TestPipeline::missing_tools(&["bison"]);

    let report = pipeline.run_steps(&pipeline.default_config(), &[1, 6]).await;

    assert_run_failed(&report);
    assert_step_failed(&report, 1, "executable `bison`");
    assert_step_pending(&report, 6);
    assert!(pipeline.calls().is_empty(), "no provider may be called");

    match report.failure {
        Some(PipelineError::MissingDependency { step, dependency, .. }) => {
            assert_eq!(step, StepId(1));
            assert_eq!(dependency, Dependency::executable("bison"));
        }
        other => panic!("expected a missing dependency, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_python_module() {
    let pipeline = TestPipeline::missing_tools(&["spsdk"]);
    let config = pipeline.default_config();

    assert_run_completed(&pipeline.run_steps(&config, &[4]).await);
    let report = pipeline.run_steps(&config, &[5]).await;

    assert_step_failed(&report, 5, "module `spsdk`");
}

/// Precondition failures are reported before dependencies are probed
#[tokio::test]
async fn test_precondition_checked_before_dependencies() {
    let pipeline = TestPipeline::missing_tools(&["nxpimage", "nxpcrypto"]);

    let report = pipeline.run_steps(&pipeline.default_config(), &[5]).await;

    assert_step_failed(&report, 5, "missing artifacts from step 4 (Set up signing toolkit)");
    assert!(pipeline.calls().is_empty());
}

/// Export refuses configs written for another boot media
#[tokio::test]
async fn test_export_rejects_configs_from_other_media() {
    let pipeline = TestPipeline::new();
    let emmc = pipeline.config(BoardVariant::Frdm, BootMedia::Emmc, false);
    let sd = pipeline.config(BoardVariant::Frdm, BootMedia::Sd, false);

    assert_run_completed(&pipeline.run_steps(&emmc, &[1, 2, 3, 4, 5, 6]).await);
    pipeline.clear_calls();

    let report = pipeline.run_steps(&sd, &[7]).await;

    assert_step_failed(&report, 7, "from step 6 (Write image configuration) do not match");
    match &report.failure {
        Some(PipelineError::StaleArtifact { producer, stale, .. }) => {
            assert_eq!(*producer, StepId(6));
            assert_eq!(stale.len(), 1);
            assert!(stale[0].ends_with("bootable_image.yaml"));
        }
        other => panic!("expected stale configs, got {:?}", other),
    }
    assert!(!pipeline.calls().iter().any(Call::is_signing));

    let rerun = pipeline.run_steps(&sd, &[6, 7]).await;
    assert_run_completed(&rerun);
}
