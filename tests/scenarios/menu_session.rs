//! Test: Menu Session - one dispatch per session, reported like a CLI run

use crate::helpers::*;
use secboot::cli::menu::run_interactive;
use secboot::cli::output::Console;
use secboot::core::RunReport;
use std::sync::Arc;

fn quiet_console() -> Arc<Console> {
    Arc::new(Console::with_writer(Box::new(std::io::sink()), false, None).unwrap())
}

async fn session(pipeline: &TestPipeline, input: &'static [u8]) -> Option<RunReport> {
    run_interactive(
        &pipeline.runner,
        &pipeline.workspace,
        pipeline.default_config(),
        input,
        quiet_console(),
    )
    .await
    .unwrap()
}

/// Picking step 7 on an empty workspace ends the session with a failed run
#[tokio::test]
async fn test_failing_menu_selection_reports_failure() {
    let pipeline = TestPipeline::new();

    let report = session(&pipeline, b"7\n").await.expect("a run was dispatched");

    assert_run_failed(&report);
    assert!(!report.is_success());
    assert_step_failed(&report, 7, "missing artifacts from step 1");
    assert!(pipeline.calls().is_empty());
}

/// Input after the first dispatch is never read as another menu choice
#[tokio::test]
async fn test_session_ends_after_one_run() {
    let pipeline = TestPipeline::new();

    let report = session(&pipeline, b"6\n3\na\n").await.unwrap();

    assert_run_completed(&report);
    assert_execution_order(&report, &[6]);
    assert_eq!(pipeline.started_steps(), vec![6]);
    assert!(pipeline.calls().is_empty());
}

#[tokio::test]
async fn test_settings_apply_to_the_dispatched_run() {
    let pipeline = TestPipeline::new();

    let report = session(&pipeline, b"m sd\n6\n").await.unwrap();

    assert_run_completed(&report);
    let bootable = std::fs::read_to_string(
        pipeline
            .workspace
            .outputs()
            .join("config/bootable_image.yaml"),
    )
    .unwrap();
    assert!(bootable.contains("memory_type: sd"));
}

#[tokio::test]
async fn test_quit_and_end_of_input_run_nothing() {
    let pipeline = TestPipeline::new();

    assert!(session(&pipeline, b"p\nq\n").await.is_none());
    assert!(session(&pipeline, b"").await.is_none());
    assert!(pipeline.started_steps().is_empty());
}
