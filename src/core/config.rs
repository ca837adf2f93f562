//! Pipeline configuration: defaults, settings file, environment and CLI layers

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_WORKSPACE: &str = "SECBOOT_WORKSPACE";
pub const ENV_BOARD: &str = "SECBOOT_BOARD";
pub const ENV_BOOT_MEDIA: &str = "SECBOOT_BOOT_MEDIA";
pub const ENV_SKIP_KEYS: &str = "SECBOOT_SKIP_KEYS";
pub const ENV_PAUSE: &str = "SECBOOT_PAUSE";
pub const ENV_LOG_FILE: &str = "SECBOOT_LOG_FILE";
pub const ENV_CONFIG: &str = "SECBOOT_CONFIG";
pub const ENV_NO_COLOR: &str = "NO_COLOR";
pub const ENV_CROSS_COMPILE: &str = "CROSS_COMPILE";

/// Target board; selects the U-Boot defconfig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardVariant {
    Frdm,
    Evk,
}

impl BoardVariant {
    pub const ALL: [BoardVariant; 2] = [BoardVariant::Frdm, BoardVariant::Evk];

    /// Normalize a user-supplied alias
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match canonical_token(value).as_str() {
            "frdm" | "frdmimx93" | "imx93frdm" | "frdmmcimx93" => Ok(BoardVariant::Frdm),
            "evk" | "imx93evk" | "mcimx93evk" | "imx9311x11evk" => Ok(BoardVariant::Evk),
            _ => Err(ConfigError::InvalidVariant {
                field: "board variant",
                value: value.to_string(),
                expected: "frdm, evk",
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoardVariant::Frdm => "frdm",
            BoardVariant::Evk => "evk",
        }
    }

    pub fn uboot_defconfig(self) -> &'static str {
        match self {
            BoardVariant::Frdm => "imx93_11x11_frdm_defconfig",
            BoardVariant::Evk => "imx93_11x11_evk_defconfig",
        }
    }
}

impl fmt::Display for BoardVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage the bootable image is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootMedia {
    Emmc,
    Sd,
}

impl BootMedia {
    pub const ALL: [BootMedia; 2] = [BootMedia::Emmc, BootMedia::Sd];

    /// Normalize a user-supplied alias
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match canonical_token(value).as_str() {
            "emmc" | "mmc" | "sdemmc" => Ok(BootMedia::Emmc),
            "sd" | "sdcard" | "microsd" => Ok(BootMedia::Sd),
            _ => Err(ConfigError::InvalidVariant {
                field: "boot media",
                value: value.to_string(),
                expected: "emmc, sd",
            }),
        }
    }

    /// Memory type recorded in the packaging configuration
    pub fn as_str(self) -> &'static str {
        match self {
            BootMedia::Emmc => "emmc",
            BootMedia::Sd => "sd",
        }
    }
}

impl fmt::Display for BootMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase with separators removed, so `SD_EMMC`, `sd-emmc` and `sdemmc` agree
fn canonical_token(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolved configuration for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub workspace_root: PathBuf,
    pub board: BoardVariant,
    pub boot_media: BootMedia,
    pub skip_key_generation: bool,
    pub pause_between_steps: bool,
    pub log_file: Option<PathBuf>,
    pub color_enabled: bool,
}

/// One configuration layer; unset fields fall through to the layer below
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub workspace: Option<PathBuf>,
    pub board: Option<String>,
    pub boot_media: Option<String>,
    pub skip_key_generation: Option<bool>,
    pub pause_between_steps: Option<bool>,
    pub log_file: Option<PathBuf>,
    pub color: Option<bool>,
}

impl ConfigOverrides {
    /// Built-in defaults
    pub fn builtin() -> Self {
        Self {
            workspace: Some(PathBuf::from("workspace")),
            board: Some(BoardVariant::Frdm.as_str().to_string()),
            boot_media: Some(BootMedia::Emmc.as_str().to_string()),
            skip_key_generation: Some(false),
            pause_between_steps: Some(false),
            log_file: None,
            color: Some(true),
        }
    }

    /// Overrides taken from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Overrides taken from `(name, value)` pairs
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut overrides = Self::default();
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                ENV_WORKSPACE => overrides.workspace = Some(PathBuf::from(value)),
                ENV_BOARD => overrides.board = Some(value),
                ENV_BOOT_MEDIA => overrides.boot_media = Some(value),
                ENV_SKIP_KEYS => {
                    overrides.skip_key_generation = Some(parse_flag(ENV_SKIP_KEYS, &value)?)
                }
                ENV_PAUSE => overrides.pause_between_steps = Some(parse_flag(ENV_PAUSE, &value)?),
                ENV_LOG_FILE => overrides.log_file = Some(PathBuf::from(value)),
                ENV_NO_COLOR => overrides.color = Some(false),
                _ => {}
            }
        }
        Ok(overrides)
    }

    /// Layer `upper` on top of `self`; fields set in `upper` win
    pub fn overlay(self, upper: &ConfigOverrides) -> Self {
        Self {
            workspace: upper.workspace.clone().or(self.workspace),
            board: upper.board.clone().or(self.board),
            boot_media: upper.boot_media.clone().or(self.boot_media),
            skip_key_generation: upper.skip_key_generation.or(self.skip_key_generation),
            pause_between_steps: upper.pause_between_steps.or(self.pause_between_steps),
            log_file: upper.log_file.clone().or(self.log_file),
            color: upper.color.or(self.color),
        }
    }
}

/// Parse an environment flag such as `1`, `yes` or `off`
pub fn parse_flag(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}

/// Merge the three layers (explicit > environment > defaults) and normalize variants
pub fn resolve(
    defaults: &ConfigOverrides,
    environment: &ConfigOverrides,
    explicit: &ConfigOverrides,
) -> Result<PipelineConfig, ConfigError> {
    let merged = ConfigOverrides::builtin()
        .overlay(defaults)
        .overlay(environment)
        .overlay(explicit);

    let board = match merged.board.as_deref() {
        Some(value) => BoardVariant::parse(value)?,
        None => BoardVariant::Frdm,
    };
    let boot_media = match merged.boot_media.as_deref() {
        Some(value) => BootMedia::parse(value)?,
        None => BootMedia::Emmc,
    };

    Ok(PipelineConfig {
        workspace_root: merged.workspace.unwrap_or_else(|| PathBuf::from("workspace")),
        board,
        boot_media,
        skip_key_generation: merged.skip_key_generation.unwrap_or(false),
        pause_between_steps: merged.pause_between_steps.unwrap_or(false),
        log_file: merged.log_file,
        color_enabled: merged.color.unwrap_or(true),
    })
}

/// Git repository reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub url: String,
    pub branch: String,
}

/// A self-extracting vendor firmware archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareArchive {
    pub url: String,
    /// Paths inside the extracted directory, copied into `inputs/` by file name
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareSettings {
    pub archives: Vec<FirmwareArchive>,
    /// Acceptance flag handed to the self-extracting archives
    pub accept_eula: bool,
}

impl Default for FirmwareSettings {
    fn default() -> Self {
        Self {
            archives: vec![
                FirmwareArchive {
                    url: "https://www.nxp.com/lgfiles/NMG/MAD/YOCTO/firmware-ele-imx-1.3.0-17945fc.bin"
                        .to_string(),
                    files: vec!["mx93a1-ahab-container.img".to_string()],
                },
                FirmwareArchive {
                    url: "https://www.nxp.com/lgfiles/NMG/MAD/YOCTO/firmware-imx-8.26-d4c33ab.bin"
                        .to_string(),
                    files: vec![
                        "firmware/ddr/synopsys/lpddr4_dmem_1d_v202201.bin".to_string(),
                        "firmware/ddr/synopsys/lpddr4_dmem_2d_v202201.bin".to_string(),
                        "firmware/ddr/synopsys/lpddr4_imem_1d_v202201.bin".to_string(),
                        "firmware/ddr/synopsys/lpddr4_imem_2d_v202201.bin".to_string(),
                    ],
                },
            ],
            accept_eula: true,
        }
    }
}

impl FirmwareSettings {
    /// File names the firmware step places in `inputs/`, in archive order
    pub fn input_names(&self) -> Vec<String> {
        self.archives
            .iter()
            .flat_map(|a| a.files.iter())
            .map(|f| file_name(f))
            .collect()
    }

    /// Name of the ELE (EdgeLock enclave) container among the firmware files
    pub fn ele_container(&self) -> Option<String> {
        self.input_names().into_iter().find(|n| n.ends_with(".img"))
    }

    /// DDR training firmware among the firmware files
    pub fn ddr_images(&self) -> Vec<String> {
        self.input_names()
            .into_iter()
            .filter(|n| n.starts_with("lpddr"))
            .collect()
    }
}

/// Final path component of a `/`-separated path or URL
pub fn file_name(path: &str) -> String {
    let trimmed = path.split(['?', '#']).next().unwrap_or(path);
    trimmed
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// Slots in an AHAB SRK table
pub const MAX_SRK_KEYS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSettings {
    /// Interpreter used to create the workspace venv
    pub python: String,
    /// Package installed into the venv
    pub package: String,
    pub family: String,
    pub revision: String,
    pub curve: String,
    /// Number of SRK key pairs, 1 to [`MAX_SRK_KEYS`]
    pub srk_count: usize,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            package: "spsdk".to_string(),
            family: "mimx9352".to_string(),
            revision: "a1".to_string(),
            curve: "secp384r1".to_string(),
            srk_count: 4,
        }
    }
}

/// Settings for the external collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Cross compiler prefix, e.g. `aarch64-linux-gnu-`
    pub cross_compile: String,
    pub uboot: RepoRef,
    pub atf: RepoRef,
    pub firmware: FirmwareSettings,
    pub signing: SigningSettings,
    /// Upper bound for any single external command
    pub command_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            cross_compile: "aarch64-linux-gnu-".to_string(),
            uboot: RepoRef {
                url: "https://github.com/nxp-imx/uboot-imx.git".to_string(),
                branch: "lf_v2024.04".to_string(),
            },
            atf: RepoRef {
                url: "https://github.com/nxp-imx/imx-atf.git".to_string(),
                branch: "lf_v2.10".to_string(),
            },
            firmware: FirmwareSettings::default(),
            signing: SigningSettings::default(),
            command_timeout_secs: 7200,
        }
    }
}

impl ToolSettings {
    /// Apply `CROSS_COMPILE` from the environment, if set
    pub fn with_cross_compile(mut self, cross_compile: Option<String>) -> Self {
        if let Some(prefix) = cross_compile.filter(|p| !p.trim().is_empty()) {
            self.cross_compile = prefix;
        }
        self
    }

    /// Reject settings no pipeline can be built from
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SRK_KEYS).contains(&self.signing.srk_count) {
            return Err(ConfigError::InvalidValue {
                field: "tools.signing.srk_count",
                value: self.signing.srk_count.to_string(),
            });
        }
        Ok(())
    }

    /// The cross compiler's `gcc` driver
    pub fn cross_gcc(&self) -> String {
        format!("{}gcc", self.cross_compile)
    }
}

/// Optional YAML settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    /// Defaults layered between the built-in ones and the environment
    pub defaults: ConfigOverrides,
    pub tools: ToolSettings,
}

impl SettingsFile {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SettingsFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::InvalidSettings(message) => ConfigError::SettingsFile {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
        settings.tools.validate()?;
        Ok(settings)
    }
}
