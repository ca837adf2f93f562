//! Declarative image packaging configuration
//!
//! These documents are consumed by the signing toolkit. The pipeline only
//! writes them; it never builds a container itself.

use crate::core::{
    config::{PipelineConfig, ToolSettings},
    registry::{
        srk_key_names, BL31_BIN, BOOTABLE_IMAGE_YAML, FLASH_BIN, SPL_CONTAINER_BIN,
        SPL_CONTAINER_YAML, UBOOT_BIN, UBOOT_CONTAINER_BIN, UBOOT_CONTAINER_YAML, UBOOT_SPL_BIN,
    },
    workspace::Workspace,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

const SPL_LOAD_ADDRESS: u64 = 0x2049_A000;
const BL31_LOAD_ADDRESS: u64 = 0x204E_0000;
const UBOOT_LOAD_ADDRESS: u64 = 0x8020_0000;
const CORE_ID: &str = "cortex-a55";
const HASH_TYPE: &str = "sha384";

/// AHAB container set description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub family: String,
    pub revision: String,
    pub target_memory: String,
    pub output: PathBuf,
    pub containers: Vec<ContainerEntry>,
}

/// Exactly one of the fields is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_container: Option<BinaryContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<SignedContainer>,
}

/// Pre-built, vendor-signed container included as is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryContainer {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedContainer {
    pub srk_set: String,
    pub used_srk_id: u8,
    pub srk_revoke_mask: u8,
    pub fuse_version: u8,
    pub sw_version: u16,
    pub signing_key: PathBuf,
    pub images: Vec<ImageEntry>,
    pub srk_table: SrkTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub image_path: PathBuf,
    pub load_address: String,
    pub entry_point: String,
    pub image_type: String,
    pub core_id: String,
    pub is_encrypted: bool,
    pub hash_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrkTable {
    pub srk_array: Vec<PathBuf>,
}

/// Bootable image layout for one boot medium
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootableImageConfig {
    pub family: String,
    pub revision: String,
    pub memory_type: String,
    pub primary_image_container_set: PathBuf,
    pub secondary_image_container_set: PathBuf,
}

/// The three documents the export step consumes, in export order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfigSet {
    pub spl: ContainerConfig,
    pub uboot: ContainerConfig,
    pub bootable: BootableImageConfig,
}

impl ImageConfigSet {
    /// Configuration for the selected board and boot medium
    pub fn standard(config: &PipelineConfig, tools: &ToolSettings, workspace: &Workspace) -> Self {
        let signing = &tools.signing;
        let inputs = workspace.inputs();
        let outputs = workspace.outputs();

        let srk_array: Vec<PathBuf> = (0..signing.srk_count)
            .map(|i| workspace.keys().join(srk_key_names(i).1))
            .collect();
        let signing_key = workspace.keys().join(srk_key_names(0).0);

        let signed = |images: Vec<ImageEntry>| SignedContainer {
            srk_set: "oem".to_string(),
            used_srk_id: 0,
            srk_revoke_mask: 0,
            fuse_version: 0,
            sw_version: 0,
            signing_key: signing_key.clone(),
            images,
            srk_table: SrkTable {
                srk_array: srk_array.clone(),
            },
        };

        let mut spl_images = vec![ImageEntry::executable(
            inputs.join(UBOOT_SPL_BIN),
            SPL_LOAD_ADDRESS,
        )];
        spl_images.extend(
            tools
                .firmware
                .ddr_images()
                .into_iter()
                .map(|name| ImageEntry::data(inputs.join(name))),
        );

        let mut spl_containers = Vec::new();
        if let Some(ele) = tools.firmware.ele_container() {
            spl_containers.push(ContainerEntry {
                binary_container: Some(BinaryContainer {
                    path: inputs.join(ele),
                }),
                container: None,
            });
        }
        spl_containers.push(ContainerEntry {
            binary_container: None,
            container: Some(signed(spl_images)),
        });

        let spl = ContainerConfig {
            family: signing.family.clone(),
            revision: signing.revision.clone(),
            target_memory: "standard".to_string(),
            output: outputs.join(SPL_CONTAINER_BIN),
            containers: spl_containers,
        };

        let uboot = ContainerConfig {
            family: signing.family.clone(),
            revision: signing.revision.clone(),
            target_memory: "standard".to_string(),
            output: outputs.join(UBOOT_CONTAINER_BIN),
            containers: vec![ContainerEntry {
                binary_container: None,
                container: Some(signed(vec![
                    ImageEntry::executable(inputs.join(BL31_BIN), BL31_LOAD_ADDRESS),
                    ImageEntry::executable(inputs.join(UBOOT_BIN), UBOOT_LOAD_ADDRESS),
                ])),
            }],
        };

        let bootable = BootableImageConfig {
            family: signing.family.clone(),
            revision: signing.revision.clone(),
            memory_type: config.boot_media.as_str().to_string(),
            primary_image_container_set: spl.output.clone(),
            secondary_image_container_set: uboot.output.clone(),
        };

        Self {
            spl,
            uboot,
            bootable,
        }
    }

    /// Final image path
    pub fn image_path(workspace: &Workspace) -> PathBuf {
        workspace.outputs().join(FLASH_BIN)
    }

    /// Config file locations in export order
    pub fn paths(workspace: &Workspace) -> [PathBuf; 3] {
        let outputs = workspace.outputs();
        [
            outputs.join(SPL_CONTAINER_YAML),
            outputs.join(UBOOT_CONTAINER_YAML),
            outputs.join(BOOTABLE_IMAGE_YAML),
        ]
    }

    /// Write all three documents under `workspace`, returning their paths
    pub fn write(&self, workspace: &Workspace) -> io::Result<Vec<PathBuf>> {
        let [spl_path, uboot_path, bootable_path] = Self::paths(workspace);
        write_yaml(&spl_path, &self.spl)?;
        write_yaml(&uboot_path, &self.uboot)?;
        write_yaml(&bootable_path, &self.bootable)?;
        Ok(vec![spl_path, uboot_path, bootable_path])
    }

    /// Documents under `workspace` that are unreadable or differ from this set
    pub fn stale_documents(&self, workspace: &Workspace) -> Vec<PathBuf> {
        let [spl_path, uboot_path, bootable_path] = Self::paths(workspace);
        let mut stale = Vec::new();
        if read_yaml::<ContainerConfig>(&spl_path).as_ref() != Some(&self.spl) {
            stale.push(spl_path);
        }
        if read_yaml::<ContainerConfig>(&uboot_path).as_ref() != Some(&self.uboot) {
            stale.push(uboot_path);
        }
        if read_yaml::<BootableImageConfig>(&bootable_path).as_ref() != Some(&self.bootable) {
            stale.push(bootable_path);
        }
        stale
    }
}

impl ImageEntry {
    fn executable(path: PathBuf, address: u64) -> Self {
        Self {
            image_path: path,
            load_address: hex_address(address),
            entry_point: hex_address(address),
            image_type: "executable".to_string(),
            core_id: CORE_ID.to_string(),
            is_encrypted: false,
            hash_type: HASH_TYPE.to_string(),
        }
    }

    fn data(path: PathBuf) -> Self {
        Self {
            image_path: path,
            load_address: hex_address(0),
            entry_point: hex_address(0),
            image_type: "data".to_string(),
            core_id: CORE_ID.to_string(),
            is_encrypted: false,
            hash_type: HASH_TYPE.to_string(),
        }
    }
}

fn hex_address(address: u64) -> String {
    format!("{:#010X}", address).replacen("0X", "0x", 1)
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let yaml = std::fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&yaml).ok()
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let yaml = serde_yaml::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, yaml)
}
