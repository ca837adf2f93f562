//! Test: Full Run - every step against an empty workspace

use crate::helpers::*;
use secboot::core::{BoardVariant, BootMedia, StepSelection};

/// frdm + emmc, steps 1-7: the bootable image is exported and verified for eMMC
#[tokio::test]
async fn test_full_run_produces_verified_image() {
    let pipeline = TestPipeline::new();
    let config = pipeline.config(BoardVariant::Frdm, BootMedia::Emmc, false);

    let report = pipeline.run_steps(&config, &[1, 2, 3, 4, 5, 6, 7]).await;

    assert_run_completed(&report);
    for id in 1..=7 {
        assert_step_completed(&report, id);
    }
    assert!(pipeline.workspace.outputs().join("flash.bin").exists());

    let calls = pipeline.calls();
    assert_eq!(
        calls.last(),
        Some(&Call::VerifyImage(BootMedia::Emmc)),
        "verification should be the last provider call"
    );
}

#[tokio::test]
async fn test_full_run_exports_in_order() {
    let pipeline = TestPipeline::new();
    let report = pipeline
        .run(&pipeline.default_config(), StepSelection::All)
        .await;
    assert_run_completed(&report);

    let exports: Vec<String> = pipeline
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Export(name) => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(
        exports,
        vec!["spl_container.bin", "uboot_container.bin", "flash.bin"]
    );
}

#[tokio::test]
async fn test_full_run_stages_inputs_and_keys() {
    let pipeline = TestPipeline::new();
    let report = pipeline
        .run(&pipeline.default_config(), StepSelection::All)
        .await;
    assert_run_completed(&report);

    let inputs = pipeline.workspace.inputs();
    for name in ["u-boot.bin", "u-boot-spl.bin", "bl31.bin", "mx93a1-ahab-container.img"] {
        assert!(inputs.join(name).exists(), "missing input {}", name);
    }
    assert_eq!(pipeline.tools.firmware.ddr_images().len(), 4);
    for name in pipeline.tools.firmware.ddr_images() {
        assert!(inputs.join(&name).exists(), "missing DDR firmware {}", name);
    }

    let keys = pipeline.workspace.keys();
    for index in 0..4 {
        assert!(keys.join(format!("srk{}_priv.pem", index)).exists());
        assert!(keys.join(format!("srk{}_pub.pem", index)).exists());
    }
    let hash = std::fs::read_to_string(keys.join("srk_hash.txt")).unwrap();
    assert_eq!(hash.trim(), "5a".repeat(32));
    let fuses = std::fs::read_to_string(keys.join("srk_fuses.txt")).unwrap();
    assert_eq!(fuses.lines().count(), 8);
    assert!(fuses.starts_with("fuse prog -y 16 0 0x5a5a5a5a"));

    assert!(pipeline.calls().contains(&Call::SrkTable(4)));
}

/// Boot media flows through to the configs and the verification call
#[tokio::test]
async fn test_full_run_for_sd_card() {
    let pipeline = TestPipeline::new();
    let config = pipeline.config(BoardVariant::Evk, BootMedia::Sd, false);

    let report = pipeline.run(&config, StepSelection::All).await;

    assert_run_completed(&report);
    assert!(pipeline.calls().contains(&Call::VerifyImage(BootMedia::Sd)));

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
async fn test_events_follow_run_lifecycle() {
    use secboot::execution::ExecutionEvent;

    let pipeline = TestPipeline::new();
    let report = pipeline.run_steps(&pipeline.default_config(), &[6]).await;
    assert_run_completed(&report);

    let events = pipeline.events();
    assert!(matches!(events.first(), Some(ExecutionEvent::RunStarted { total: 1, .. })));
    assert!(matches!(
        events.get(1),
        Some(ExecutionEvent::StepStarted { position: 1, total: 1, .. })
    ));
    assert!(matches!(events.get(2), Some(ExecutionEvent::StepCompleted { .. })));
    assert!(matches!(events.last(), Some(ExecutionEvent::RunFinished { .. })));
}
