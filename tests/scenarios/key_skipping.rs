//! Test: Key Skipping - runs that reuse or lack SRK keys

use crate::helpers::*;
use secboot::core::{PipelineError, StepId, StepSelection};
use secboot::execution::ExecutionEvent;

/// --all-no-keys on an empty workspace: step 5 skipped, step 7 stops on its precondition
#[tokio::test]
async fn test_all_no_keys_with_empty_keys_directory() {
    let pipeline = TestPipeline::new();
    let mut config = pipeline.default_config();
    config.skip_key_generation = true;

    let report = pipeline.run(&config, StepSelection::All).await;

    assert_run_failed(&report);
    for id in [1, 2, 3, 4, 6] {
        assert_step_completed(&report, id);
    }
    assert_step_skipped(&report, 5);
    assert_step_failed(&report, 7, "missing artifacts from step 5 (Generate SRK keys)");
    assert_step_failed(&report, 7, "srk0_priv.pem");

    match &report.failure {
        Some(PipelineError::Precondition {
            step,
            producer,
            missing,
            ..
        }) => {
            assert_eq!(*step, StepId(7));
            assert_eq!(*producer, StepId(5));
            assert!(missing.iter().all(|p| p.starts_with(pipeline.workspace.keys())));
        }
        other => panic!("expected a precondition failure, got {:?}", other),
    }
}

/// Step 7 fails before the signing provider sees any export or verification call
#[tokio::test]
async fn test_skipped_keys_block_signing_calls() {
    let pipeline = TestPipeline::new();
    let mut config = pipeline.default_config();
    config.skip_key_generation = true;

    pipeline.run(&config, StepSelection::All).await;

    let calls = pipeline.calls();
    assert!(!calls.iter().any(|c| matches!(c, Call::GenerateKey(_) | Call::SrkTable(_))));
    assert!(!calls.iter().any(|c| matches!(c, Call::Export(_) | Call::VerifyImage(_))));
}

#[tokio::test]
async fn test_skip_warning_names_missing_keys() {
    let pipeline = TestPipeline::new();
    let mut config = pipeline.default_config();
    config.skip_key_generation = true;

    pipeline.run_steps(&config, &[5]).await;

    let skipped = pipeline.events().into_iter().find_map(|e| match e {
        ExecutionEvent::StepSkipped { missing, .. } => Some(missing),
        _ => None,
    });
    let missing = skipped.expect("step 5 should emit a skip event");
    assert!(missing.contains(&pipeline.workspace.keys().join("srk0_priv.pem")));
    assert!(missing.contains(&pipeline.workspace.keys().join("srk3_pub.pem")));
}

/// Skipping is fine once keys exist from an earlier run
#[tokio::test]
async fn test_skip_with_existing_keys_completes() {
    let pipeline = TestPipeline::new();
    assert_run_completed(
        &pipeline
            .run(&pipeline.default_config(), StepSelection::All)
            .await,
    );
    pipeline.clear_calls();

    let mut config = pipeline.default_config();
    config.skip_key_generation = true;
    let report = pipeline.run(&config, StepSelection::All).await;

    assert_run_completed(&report);
    assert_step_skipped(&report, 5);
    assert_step_completed(&report, 7);
    assert!(!pipeline
        .calls()
        .iter()
        .any(|c| matches!(c, Call::GenerateKey(_) | Call::VerifyKey(_))));
}
