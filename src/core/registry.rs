//! Step registry - the ordered, numbered set of pipeline steps

use crate::core::{
    config::ToolSettings,
    error::PipelineError,
    step::{Artifact, ArtifactRef, Dependency, Step, StepAction, StepId},
    workspace::Workspace,
};
use std::collections::HashSet;

pub const UBOOT_BIN: &str = "u-boot.bin";
pub const UBOOT_SPL_BIN: &str = "u-boot-spl.bin";
pub const BL31_BIN: &str = "bl31.bin";
pub const SRK_TABLE_BIN: &str = "srk_table.bin";
pub const SRK_HASH_TXT: &str = "srk_hash.txt";
pub const SRK_FUSES_TXT: &str = "srk_fuses.txt";
pub const CONFIG_DIR: &str = "config";
pub const SPL_CONTAINER_YAML: &str = "config/spl_container.yaml";
pub const UBOOT_CONTAINER_YAML: &str = "config/uboot_container.yaml";
pub const BOOTABLE_IMAGE_YAML: &str = "config/bootable_image.yaml";
pub const SPL_CONTAINER_BIN: &str = "spl_container.bin";
pub const UBOOT_CONTAINER_BIN: &str = "uboot_container.bin";
pub const FLASH_BIN: &str = "flash.bin";
pub const NXPIMAGE: &str = "nxpimage";
pub const NXPCRYPTO: &str = "nxpcrypto";

/// Private and public key file names of SRK slot `index`
pub fn srk_key_names(index: usize) -> (String, String) {
    (
        format!("srk{}_priv.pem", index),
        format!("srk{}_pub.pem", index),
    )
}

/// Immutable, id-ordered collection of steps
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<Step>,
}

impl StepRegistry {
    /// Build a registry, rejecting duplicate ids and forward references
    pub fn new(mut steps: Vec<Step>) -> Result<Self, PipelineError> {
        steps.sort_by_key(|s| s.id);

        let mut ids = HashSet::new();
        let mut keys = HashSet::new();
        for step in &steps {
            if !ids.insert(step.id) {
                return Err(PipelineError::Registry(format!("duplicate step id {}", step.id)));
            }
            if !keys.insert(step.key) {
                return Err(PipelineError::Registry(format!(
                    "duplicate step key `{}`",
                    step.key
                )));
            }
        }

        for step in &steps {
            for required in &step.requires {
                if required.producer >= step.id {
                    return Err(PipelineError::Registry(format!(
                        "step {} requires {} from step {}, which does not run before it",
                        step.id, required.artifact.path, required.producer
                    )));
                }
                let declared = steps
                    .iter()
                    .find(|s| s.id == required.producer)
                    .is_some_and(|p| p.produces.contains(&required.artifact));
                if !declared {
                    return Err(PipelineError::Registry(format!(
                        "step {} requires {}, which step {} does not produce",
                        step.id, required.artifact.path, required.producer
                    )));
                }
            }
        }

        Ok(Self { steps })
    }

    /// The i.MX 93 secure-boot pipeline
    pub fn standard(tools: &ToolSettings, workspace: &Workspace) -> Result<Self, PipelineError> {
        tools.validate()?;
        let venv_tool = |name: &str| workspace.venv_bin(name).to_string_lossy().into_owned();
        let venv_python = venv_tool("python");

        let firmware: Vec<Artifact> = tools
            .firmware
            .input_names()
            .into_iter()
            .map(Artifact::inputs)
            .collect();

        let mut keys = Vec::new();
        for index in 0..tools.signing.srk_count {
            let (private, public) = srk_key_names(index);
            keys.push(Artifact::keys(private));
            keys.push(Artifact::keys(public));
        }

        let configs = vec![
            Artifact::outputs(SPL_CONTAINER_YAML),
            Artifact::outputs(UBOOT_CONTAINER_YAML),
            Artifact::outputs(BOOTABLE_IMAGE_YAML),
        ];

        let uboot_outputs = vec![Artifact::inputs(UBOOT_BIN), Artifact::inputs(UBOOT_SPL_BIN)];
        let atf_outputs = vec![Artifact::inputs(BL31_BIN)];
        let signing_tools = vec![
            Artifact::root(format!("venv/bin/{}", NXPIMAGE)),
            Artifact::root(format!("venv/bin/{}", NXPCRYPTO)),
        ];

        let mut key_outputs = keys.clone();
        key_outputs.extend([
            Artifact::keys(SRK_TABLE_BIN),
            Artifact::keys(SRK_HASH_TXT),
            Artifact::keys(SRK_FUSES_TXT),
        ]);

        let from = |producer: u8, artifacts: &[Artifact]| -> Vec<ArtifactRef> {
            artifacts
                .iter()
                .map(|artifact| ArtifactRef {
                    producer: StepId(producer),
                    artifact: artifact.clone(),
                })
                .collect()
        };

        let mut export_requires = from(1, &uboot_outputs);
        export_requires.extend(from(2, &atf_outputs));
        export_requires.extend(from(3, &firmware));
        export_requires.extend(from(4, &signing_tools[..1]));
        export_requires.extend(from(5, &keys));
        export_requires.extend(from(6, &configs));

        let steps = vec![
            Step {
                id: StepId(1),
                key: "uboot",
                name: "Build U-Boot",
                requires: vec![],
                produces: uboot_outputs.clone(),
                dependencies: vec![
                    Dependency::executable("git"),
                    Dependency::executable("make"),
                    Dependency::executable("bison"),
                    Dependency::executable("flex"),
                    Dependency::executable(tools.cross_gcc()),
                ],
                action: StepAction::BuildBootloader,
            },
            Step {
                id: StepId(2),
                key: "atf",
                name: "Build ARM Trusted Firmware",
                requires: vec![],
                produces: atf_outputs.clone(),
                dependencies: vec![
                    Dependency::executable("git"),
                    Dependency::executable("make"),
                    Dependency::executable(tools.cross_gcc()),
                ],
                action: StepAction::BuildTrustedFirmware,
            },
            Step {
                id: StepId(3),
                key: "firmware",
                name: "Fetch ELE and DDR firmware",
                requires: vec![],
                produces: firmware.clone(),
                dependencies: vec![Dependency::executable("sh")],
                action: StepAction::FetchFirmware,
            },
            Step {
                id: StepId(4),
                key: "signing-env",
                name: "Set up signing toolkit",
                requires: vec![],
                produces: signing_tools.clone(),
                dependencies: vec![Dependency::executable(tools.signing.python.clone())],
                action: StepAction::PrepareSigningEnv,
            },
            Step {
                id: StepId(5),
                key: "keys",
                name: "Generate SRK keys",
                requires: from(4, &signing_tools),
                produces: key_outputs,
                dependencies: vec![
                    Dependency::module(venv_python, tools.signing.package.clone()),
                    Dependency::executable(venv_tool(NXPCRYPTO)),
                    Dependency::executable(venv_tool(NXPIMAGE)),
                ],
                action: StepAction::GenerateKeys,
            },
            Step {
                id: StepId(6),
                key: "configs",
                name: "Write image configuration",
                requires: vec![],
                produces: configs,
                dependencies: vec![],
                action: StepAction::WriteImageConfigs,
            },
            Step {
                id: StepId(7),
                key: "export",
                name: "Export signed image",
                requires: export_requires,
                produces: vec![
                    Artifact::outputs(SPL_CONTAINER_BIN),
                    Artifact::outputs(UBOOT_CONTAINER_BIN),
                    Artifact::outputs(FLASH_BIN),
                ],
                dependencies: vec![Dependency::executable(venv_tool(NXPIMAGE))],
                action: StepAction::ExportImage,
            },
        ];

        Self::new(steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// All ids in ascending order
    pub fn ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|s| s.id).collect()
    }

    /// Find a step by number (`5`) or key (`keys`), case-insensitively
    pub fn lookup(&self, value: &str) -> Option<StepId> {
        let value = value.trim();
        if let Ok(number) = value.parse::<u8>() {
            return self.get(StepId(number)).map(|s| s.id);
        }
        self.steps
            .iter()
            .find(|s| s.key.eq_ignore_ascii_case(value))
            .map(|s| s.id)
    }
}
