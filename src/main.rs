use anyhow::{Context, Result};
use secboot::cli::logging;
use secboot::cli::menu::{run_interactive, LinePause};
use secboot::cli::output::{format_report, format_step_list, separator, Console, CROSS};
use secboot::cli::{Cli, RunMode};
use secboot::core::config::{
    self, ConfigOverrides, SettingsFile, ENV_CONFIG, ENV_CROSS_COMPILE,
};
use secboot::core::{
    ConfigError, PipelineConfig, RunReport, StepRegistry, StepSelection, ToolSettings, Workspace,
};
use secboot::execution::{DependencyChecker, NoPause, PipelineRunner, StepExecutor};
use secboot::provider::Providers;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::debug;

const EXIT_FAILED: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::from_args();

    let (config, tools) = match load_configuration(&cli) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}{}", CROSS, e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if let Err(e) = logging::init(cli.verbose, config.color_enabled) {
        eprintln!("{}Failed to set logging subscriber: {}", CROSS, e);
    }
    debug!("Resolved configuration: {:?}", config);

    let console = match Console::new(config.color_enabled, config.log_file.as_deref()) {
        Ok(console) => Arc::new(console),
        Err(e) => {
            eprintln!("{}cannot open log file: {}", CROSS, e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match execute(&cli, config, tools, console.clone()).await {
        Ok(code) => code,
        Err(e) => {
            console.error(&format!("{:#}", e));
            ExitCode::from(EXIT_FAILED)
        }
    }
}

/// Built-in defaults, settings file, environment, then command line
fn load_configuration(cli: &Cli) -> Result<(PipelineConfig, ToolSettings), ConfigError> {
    let settings_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));
    let settings = match settings_path {
        Some(path) => SettingsFile::from_file(path)?,
        None => SettingsFile::default(),
    };

    let environment = ConfigOverrides::from_env()?;
    let config = config::resolve(&settings.defaults, &environment, &cli.explicit_overrides())?;
    let tools = settings
        .tools
        .with_cross_compile(std::env::var(ENV_CROSS_COMPILE).ok());
    Ok((config, tools))
}

async fn execute(
    cli: &Cli,
    config: PipelineConfig,
    tools: ToolSettings,
    console: Arc<Console>,
) -> Result<ExitCode> {
    if let RunMode::List { json } = cli.mode() {
        let workspace = Workspace::locate(&config.workspace_root)
            .context("Failed to resolve workspace path")?;
        let registry = StepRegistry::standard(&tools, &workspace)?;
        if json {
            console.plain(&serde_json::to_string_pretty(registry.steps())?);
        } else {
            for line in format_step_list(&registry) {
                console.plain(&line);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let workspace = Workspace::ensure(&config.workspace_root).with_context(|| {
        format!(
            "Failed to prepare workspace {}",
            config.workspace_root.display()
        )
    })?;
    let registry = StepRegistry::standard(&tools, &workspace)?;
    console.info(&format!(
        "Workspace {} (board {}, boot media {})",
        workspace.root().display(),
        config.board,
        config.boot_media
    ));

    let selection = match cli.mode() {
        RunMode::Steps(values) => match StepSelection::parse(&values, &registry) {
            Ok(selection) => Some(selection),
            Err(e) => {
                console.error(&e.to_string());
                return Ok(ExitCode::from(EXIT_USAGE));
            }
        },
        RunMode::All => Some(StepSelection::All),
        _ => None,
    };

    let providers = Providers::production(&tools, &workspace);
    let runner = PipelineRunner::new(
        registry,
        StepExecutor::new(providers),
        DependencyChecker::host(),
        tools,
    );
    let events = console.clone();
    runner.add_event_handler(move |event| events.event(event));

    let input = BufReader::new(tokio::io::stdin());

    let Some(selection) = selection else {
        let report = run_interactive(&runner, &workspace, config, input, console.clone())
            .await
            .context("Failed to read menu input")?;
        return Ok(match report {
            Some(report) => {
                print_summary(&console, &report);
                exit_code(&report)
            }
            None => ExitCode::SUCCESS,
        });
    };

    let report = if config.pause_between_steps && std::io::stdin().is_terminal() {
        let pause = LinePause::new(input, console.clone());
        runner.run(&config, &workspace, &selection, &pause).await
    } else {
        runner.run(&config, &workspace, &selection, &NoPause).await
    };
    print_summary(&console, &report);
    Ok(exit_code(&report))
}

fn exit_code(report: &RunReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    }
}

fn print_summary(console: &Console, report: &RunReport) {
    console.plain(&separator());
    for line in format_report(report) {
        console.plain(&line);
    }
    if let Some(failure) = &report.failure {
        if failure.step().is_none() {
            console.error(&failure.to_string());
        }
    }
}
