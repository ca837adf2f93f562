//! Interactive menu and the line-based pause gate

use crate::{
    cli::output::{separator, style, Console},
    core::{
        BoardVariant, BootMedia, PipelineConfig, RunReport, Step, StepId, StepRegistry,
        StepSelection, Workspace,
    },
    execution::{PauseGate, PipelineRunner},
};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// A parsed menu choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    RunAll,
    RunAllNoKeys,
    TogglePause,
    /// `None` cycles to the next variant
    SetBoard(Option<BoardVariant>),
    SetBootMedia(Option<BootMedia>),
    RunStep(StepId),
    Quit,
}

/// What the operator decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    Run {
        config: PipelineConfig,
        selection: StepSelection,
    },
    Quit,
}

/// Parse one input line; `None` for anything unrecognized
pub fn parse_choice(input: &str, registry: &StepRegistry) -> Option<MenuAction> {
    let mut words = input.split_whitespace();
    let command = words.next()?;
    let argument = words.next();
    if words.next().is_some() {
        return None;
    }

    match (command.to_ascii_lowercase().as_str(), argument) {
        ("a", None) => Some(MenuAction::RunAll),
        ("n", None) => Some(MenuAction::RunAllNoKeys),
        ("p", None) => Some(MenuAction::TogglePause),
        ("q", None) => Some(MenuAction::Quit),
        ("b", None) => Some(MenuAction::SetBoard(None)),
        ("b", Some(value)) => BoardVariant::parse(value)
            .ok()
            .map(|b| MenuAction::SetBoard(Some(b))),
        ("m", None) => Some(MenuAction::SetBootMedia(None)),
        ("m", Some(value)) => BootMedia::parse(value)
            .ok()
            .map(|m| MenuAction::SetBootMedia(Some(m))),
        (_, None) => registry.lookup(command).map(MenuAction::RunStep),
        _ => None,
    }
}

fn next_board(board: BoardVariant) -> BoardVariant {
    match board {
        BoardVariant::Frdm => BoardVariant::Evk,
        BoardVariant::Evk => BoardVariant::Frdm,
    }
}

fn next_media(media: BootMedia) -> BootMedia {
    match media {
        BootMedia::Emmc => BootMedia::Sd,
        BootMedia::Sd => BootMedia::Emmc,
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Menu text for the current settings
pub fn render_menu(registry: &StepRegistry, config: &PipelineConfig) -> Vec<String> {
    let mut lines = vec![
        separator(),
        format!(
            "{}  board: {}  boot media: {}  pause: {}",
            style("i.MX 93 secure boot").bold(),
            style(config.board).cyan(),
            style(config.boot_media).cyan(),
            style(on_off(config.pause_between_steps)).cyan()
        ),
        separator(),
    ];
    lines.extend(registry.steps().iter().map(|s: &Step| {
        format!("  {:>2}  {:<12} {}", s.id, style(s.key).cyan(), s.name)
    }));
    lines.push(String::new());
    lines.extend(
        [
            "   a  run all steps",
            "   n  run all steps, skipping key generation",
            "   p  toggle pause between steps",
            "   b  set board (b [frdm|evk])",
            "   m  set boot media (m [emmc|sd])",
            "   q  quit",
        ]
        .iter()
        .map(|l| l.to_string()),
    );
    lines
}

/// Show the menu until the operator picks a run or quits
///
/// Settings changes apply to `config`, which the caller keeps between runs.
/// End of input quits.
pub async fn run_menu<R>(
    reader: &mut R,
    console: &Console,
    registry: &StepRegistry,
    config: &mut PipelineConfig,
) -> io::Result<MenuOutcome>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        for line in render_menu(registry, config) {
            console.plain(&line);
        }
        console.plain("Select a step number or key, or an option:");

        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            return Ok(MenuOutcome::Quit);
        }

        let Some(action) = parse_choice(&input, registry) else {
            console.warn(&format!("Invalid choice `{}`", input.trim()));
            continue;
        };

        match action {
            MenuAction::RunAll => {
                return Ok(MenuOutcome::Run {
                    config: config.clone(),
                    selection: StepSelection::All,
                })
            }
            MenuAction::RunAllNoKeys => {
                let mut run_config = config.clone();
                run_config.skip_key_generation = true;
                return Ok(MenuOutcome::Run {
                    config: run_config,
                    selection: StepSelection::All,
                });
            }
            MenuAction::RunStep(id) => {
                return Ok(MenuOutcome::Run {
                    config: config.clone(),
                    selection: StepSelection::subset([id]),
                })
            }
            MenuAction::TogglePause => {
                config.pause_between_steps = !config.pause_between_steps;
                console.info(&format!(
                    "Pause between steps {}",
                    on_off(config.pause_between_steps)
                ));
            }
            MenuAction::SetBoard(board) => {
                config.board = board.unwrap_or_else(|| next_board(config.board));
                console.info(&format!("Board set to {}", config.board));
            }
            MenuAction::SetBootMedia(media) => {
                config.boot_media = media.unwrap_or_else(|| next_media(config.boot_media));
                console.info(&format!("Boot media set to {}", config.boot_media));
            }
            MenuAction::Quit => return Ok(MenuOutcome::Quit),
        }
    }
}

/// One interactive session: menu, then at most one dispatched run
///
/// The same input feeds the menu and the pause prompts. Returns `None` when the
/// operator quits without running anything.
pub async fn run_interactive<R>(
    runner: &PipelineRunner,
    workspace: &Workspace,
    mut config: PipelineConfig,
    input: R,
    console: Arc<Console>,
) -> io::Result<Option<RunReport>>
where
    R: AsyncBufRead + Unpin + Send,
{
    let pause = LinePause::new(input, console.clone());
    let outcome = {
        let mut reader = pause.lock().await;
        run_menu(&mut *reader, &console, runner.registry(), &mut config).await?
    };

    match outcome {
        MenuOutcome::Quit => Ok(None),
        MenuOutcome::Run { config, selection } => {
            let report = runner.run(&config, workspace, &selection, &pause).await;
            Ok(Some(report))
        }
    }
}

/// Waits for one line of input between steps
pub struct LinePause<R> {
    reader: Mutex<R>,
    console: Arc<Console>,
}

impl<R: AsyncBufRead + Unpin + Send> LinePause<R> {
    pub fn new(reader: R, console: Arc<Console>) -> Self {
        Self {
            reader: Mutex::new(reader),
            console,
        }
    }

    /// Borrow the input, e.g. for the menu
    pub async fn lock(&self) -> MutexGuard<'_, R> {
        self.reader.lock().await
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> PauseGate for LinePause<R> {
    async fn wait(&self, finished: &Step, next: &Step) {
        self.console.plain(&format!(
            "Step {} done. Press Enter to continue with step {} ({})",
            finished.id, next.id, next.name
        ));
        let mut line = String::new();
        let mut reader = self.reader.lock().await;
        // End of input continues without waiting
        match reader.read_line(&mut line).await {
            Ok(0) => debug!("Input closed; continuing with step {}", next.id),
            Ok(_) => {}
            Err(e) => debug!("Failed to read pause input: {}", e),
        }
    }
}
