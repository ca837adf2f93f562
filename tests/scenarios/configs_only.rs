//! Test: Configs Only - step 6 has no preconditions

use crate::helpers::*;
use secboot::core::{BoardVariant, BootMedia};

/// Default config, steps [6] on an empty workspace: three config files
#[tokio::test]
async fn test_configs_on_empty_workspace() {
    let pipeline = TestPipeline::new();

    let report = pipeline.run_steps(&pipeline.default_config(), &[6]).await;

    assert_run_completed(&report);
    assert_execution_order(&report, &[6]);
    assert_step_completed(&report, 6);

    let config_dir = pipeline.workspace.outputs().join("config");
    for name in ["spl_container.yaml", "uboot_container.yaml", "bootable_image.yaml"] {
        assert!(config_dir.join(name).is_file(), "missing {}", name);
    }
    assert!(pipeline.calls().is_empty(), "writing configs needs no provider");
}

#[tokio::test]
async fn test_configs_reference_workspace_artifacts() {
    let pipeline = TestPipeline::new();
    let config = pipeline.config(BoardVariant::Frdm, BootMedia::Emmc, false);

    assert_run_completed(&pipeline.run_steps(&config, &[6]).await);

    let outputs = pipeline.workspace.outputs();
    let spl = std::fs::read_to_string(outputs.join("config/spl_container.yaml")).unwrap();
    let inputs = pipeline.workspace.inputs();
    assert!(spl.contains(&inputs.join("u-boot-spl.bin").display().to_string()));
    assert!(spl.contains(&pipeline.workspace.keys().join("srk0_priv.pem").display().to_string()));
    assert!(spl.contains("family: mimx9352"));

    let bootable = std::fs::read_to_string(outputs.join("config/bootable_image.yaml")).unwrap();
    assert!(bootable.contains("memory_type: emmc"));
}
