//! Test utilities for secboot: recording fake providers and a run harness
#![allow(dead_code)]

use async_trait::async_trait;
use secboot::core::config::{file_name, FirmwareSettings, RepoRef};
use secboot::core::{
    BootMedia, BoardVariant, PipelineConfig, RunReport, RunStatus, StepId, StepRegistry,
    StepSelection, StepState, ToolSettings, Workspace,
};
use secboot::execution::{
    DependencyChecker, ExecutionEvent, NoPause, PipelineRunner, StepExecutor, ToolProbe,
};
use secboot::provider::{
    BuildTarget, ExportRequest, FirmwareProvider, ImageMetadata, KeyPair, ProviderError,
    Providers, SigningProvider, SrkDigest, ToolchainProvider,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A provider call, as recorded by the fakes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Clone(String),
    Build(String),
    Download(String),
    Extract(String),
    PrepareEnvironment,
    GenerateKey(String),
    VerifyKey(String),
    SrkTable(usize),
    Export(String),
    VerifyImage(BootMedia),
}

impl Call {
    /// Calls that go to the signing toolkit
    pub fn is_signing(&self) -> bool {
        matches!(
            self,
            Call::PrepareEnvironment
                | Call::GenerateKey(_)
                | Call::VerifyKey(_)
                | Call::SrkTable(_)
                | Call::Export(_)
                | Call::VerifyImage(_)
        )
    }
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

fn record(log: &CallLog, call: Call) {
    log.lock().unwrap().push(call);
}

fn touch(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Fake `git` + `make`: creates checkouts and canned build outputs
pub struct FakeToolchain {
    calls: CallLog,
    fail_build: Option<String>,
}

#[async_trait]
impl ToolchainProvider for FakeToolchain {
    async fn clone_repo(&self, repo: &RepoRef, dest: &Path) -> Result<PathBuf, ProviderError> {
        record(&self.calls, Call::Clone(repo.url.clone()));
        std::fs::create_dir_all(dest.join(".git"))?;
        Ok(dest.to_path_buf())
    }

    async fn build(&self, source: &Path, target: &BuildTarget) -> Result<Vec<PathBuf>, ProviderError> {
        record(&self.calls, Call::Build(target.name.clone()));
        if self.fail_build.as_deref() == Some(target.name.as_str()) {
            return Err(ProviderError::Build {
                target: target.name.clone(),
                message: "make exited with code 2".to_string(),
            });
        }
        let mut outputs = Vec::new();
        for output in &target.outputs {
            let path = source.join(output);
            touch(&path, target.name.as_bytes())?;
            outputs.push(path);
        }
        Ok(outputs)
    }
}

/// Fake downloads whose self-extraction yields the configured firmware files
pub struct FakeFirmware {
    calls: CallLog,
    settings: FirmwareSettings,
}

#[async_trait]
impl FirmwareProvider for FakeFirmware {
    async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, ProviderError> {
        record(&self.calls, Call::Download(url.to_string()));
        let path = dir.join(file_name(url));
        touch(&path, b"archive")?;
        Ok(path)
    }

    async fn self_extract(&self, archive: &Path, accept_eula: bool) -> Result<PathBuf, ProviderError> {
        record(&self.calls, Call::Extract(name_of(archive)));
        if !accept_eula {
            return Err(ProviderError::LicenseNotAccepted {
                archive: archive.to_path_buf(),
            });
        }
        let dir = archive.with_extension("");
        let name = name_of(archive);
        for entry in &self.settings.archives {
            if file_name(&entry.url) == name {
                for file in &entry.files {
                    touch(&dir.join(file), b"firmware")?;
                }
            }
        }
        Ok(dir)
    }
}

/// Fake SPSDK: writes keys, tables and images without any cryptography
pub struct FakeSigning {
    calls: CallLog,
}

#[async_trait]
impl SigningProvider for FakeSigning {
    async fn prepare_environment(&self, workspace: &Workspace) -> Result<(), ProviderError> {
        record(&self.calls, Call::PrepareEnvironment);
        for tool in ["python", "nxpimage", "nxpcrypto"] {
            touch(&workspace.venv_bin(tool), b"#!/bin/sh\n")?;
        }
        Ok(())
    }

    async fn generate_key_pair(
        &self,
        _curve: &str,
        private: &Path,
        public: &Path,
    ) -> Result<KeyPair, ProviderError> {
        record(&self.calls, Call::GenerateKey(name_of(private)));
        touch(private, b"private")?;
        touch(public, b"public")?;
        Ok(KeyPair {
            private: private.to_path_buf(),
            public: public.to_path_buf(),
        })
    }

    async fn verify_key_pair(&self, private: &Path, _public: &Path) -> Result<bool, ProviderError> {
        record(&self.calls, Call::VerifyKey(name_of(private)));
        Ok(true)
    }

    async fn srk_table(&self, public_keys: &[PathBuf], table: &Path) -> Result<SrkDigest, ProviderError> {
        record(&self.calls, Call::SrkTable(public_keys.len()));
        touch(table, b"srk table")?;
        Ok(SrkDigest([0x5a; 32]))
    }

    async fn export_image(&self, request: &ExportRequest) -> Result<PathBuf, ProviderError> {
        record(&self.calls, Call::Export(name_of(&request.output)));
        if !request.config.exists() {
            return Err(ProviderError::UnexpectedOutput {
                tool: "nxpimage".to_string(),
                message: format!("{} not found", request.config.display()),
            });
        }
        touch(&request.output, b"image")?;
        Ok(request.output.clone())
    }

    async fn verify_image(&self, _image: &Path, metadata: &ImageMetadata) -> Result<(), ProviderError> {
        record(&self.calls, Call::VerifyImage(metadata.media));
        Ok(())
    }
}

/// Host probe that finds every tool except the listed ones
#[derive(Default)]
pub struct FakeProbe {
    missing: Vec<String>,
}

impl FakeProbe {
    pub fn missing(names: &[&str]) -> Self {
        Self {
            missing: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ToolProbe for FakeProbe {
    fn has_executable(&self, name: &str) -> bool {
        !self.missing.iter().any(|m| name.ends_with(m.as_str()))
    }

    async fn can_import(&self, _interpreter: &str, module: &str) -> bool {
        !self.missing.iter().any(|m| m == module)
    }
}

/// A runner wired to fakes over a temporary workspace
pub struct TestPipeline {
    pub dir: TempDir,
    pub workspace: Workspace,
    pub tools: ToolSettings,
    pub runner: PipelineRunner,
    calls: CallLog,
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl TestPipeline {
    pub fn new() -> Self {
        Self::build(None, FakeProbe::default())
    }

    /// Harness whose toolchain fails to build `target`
    pub fn failing_build(target: &str) -> Self {
        Self::build(Some(target.to_string()), FakeProbe::default())
    }

    /// Harness on a host lacking the given tools
    pub fn missing_tools(names: &[&str]) -> Self {
        Self::build(None, FakeProbe::missing(names))
    }

    fn build(fail_build: Option<String>, probe: FakeProbe) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::ensure(dir.path().join("workspace")).unwrap();
        let tools = ToolSettings::default();
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));

        let providers = Providers {
            toolchain: Arc::new(FakeToolchain {
                calls: calls.clone(),
                fail_build,
            }),
            firmware: Arc::new(FakeFirmware {
                calls: calls.clone(),
                settings: tools.firmware.clone(),
            }),
            signing: Arc::new(FakeSigning {
                calls: calls.clone(),
            }),
        };

        let registry = StepRegistry::standard(&tools, &workspace).unwrap();
        let runner = PipelineRunner::new(
            registry,
            StepExecutor::new(providers),
            DependencyChecker::new(Arc::new(probe)),
            tools.clone(),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        runner.add_event_handler(move |event| sink.lock().unwrap().push(event.clone()));

        Self {
            dir,
            workspace,
            tools,
            runner,
            calls,
            events,
        }
    }

    pub fn config(&self, board: BoardVariant, media: BootMedia, skip_keys: bool) -> PipelineConfig {
        PipelineConfig {
            workspace_root: self.workspace.root().to_path_buf(),
            board,
            boot_media: media,
            skip_key_generation: skip_keys,
            pause_between_steps: false,
            log_file: None,
            color_enabled: false,
        }
    }

    pub fn default_config(&self) -> PipelineConfig {
        self.config(BoardVariant::Frdm, BootMedia::Emmc, false)
    }

    pub async fn run(&self, config: &PipelineConfig, selection: StepSelection) -> RunReport {
        self.runner
            .run(config, &self.workspace, &selection, &NoPause)
            .await
    }

    pub async fn run_steps(&self, config: &PipelineConfig, ids: &[u8]) -> RunReport {
        self.run(config, StepSelection::subset(ids.iter().map(|i| StepId(*i))))
            .await
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Ids from `StepStarted` events, in order
    pub fn started_steps(&self) -> Vec<u8> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StepStarted { id, .. } => Some(id.0),
                _ => None,
            })
            .collect()
    }

    /// Every file below the workspace root, relative and sorted
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        collect_files(self.workspace.root(), self.workspace.root(), &mut paths);
        paths.sort();
        paths
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
}

// ============================================================================
// Assertion helpers
// ============================================================================

pub fn assert_run_completed(report: &RunReport) {
    assert_eq!(
        report.status,
        RunStatus::Completed,
        "Run should have completed, failure: {:?}",
        report.failure
    );
}

pub fn assert_run_failed(report: &RunReport) {
    assert_eq!(report.status, RunStatus::Failed, "Run should have failed");
    assert!(report.failure.is_some());
}

pub fn assert_step_completed(report: &RunReport, id: u8) {
    match report.state_of(StepId(id)) {
        Some(StepState::Completed { .. }) => {}
        other => panic!("Step {} should be completed, got {:?}", id, other),
    }
}

pub fn assert_step_skipped(report: &RunReport, id: u8) {
    match report.state_of(StepId(id)) {
        Some(StepState::Skipped { .. }) => {}
        other => panic!("Step {} should be skipped, got {:?}", id, other),
    }
}

pub fn assert_step_failed(report: &RunReport, id: u8, error_contains: &str) {
    match report.state_of(StepId(id)) {
        Some(StepState::Failed { error, .. }) => assert!(
            error.contains(error_contains),
            "Step {} error should contain '{}', got: {}",
            id,
            error_contains,
            error
        ),
        other => panic!("Step {} should be failed, got {:?}", id, other),
    }
}

pub fn assert_step_pending(report: &RunReport, id: u8) {
    assert_eq!(
        report.state_of(StepId(id)),
        Some(&StepState::Pending),
        "Step {} should not have run",
        id
    );
}

pub fn assert_execution_order(report: &RunReport, expected: &[u8]) {
    let order: Vec<u8> = report.steps.iter().map(|r| r.id.0).collect();
    assert_eq!(order, expected, "Selected steps should run in this order");
}
