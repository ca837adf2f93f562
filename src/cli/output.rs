//! Console output: leveled messages, optional log file, event rendering

use crate::{
    core::{RunReport, RunStatus, Step, StepRegistry, StepState},
    execution::ExecutionEvent,
};
use console::{Emoji, Style};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[ OK ] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[FAIL] ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[INFO] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Ok,
}

impl Level {
    fn prefix(self) -> Emoji<'static, 'static> {
        match self {
            Level::Info => INFO,
            Level::Warn => WARN,
            Level::Error => CROSS,
            Level::Ok => CHECK,
        }
    }

    fn style(self) -> Style {
        match self {
            Level::Info => Style::new().cyan(),
            Level::Warn => Style::new().yellow(),
            Level::Error => Style::new().red().bold(),
            Level::Ok => Style::new().green(),
        }
    }
}

struct Sinks {
    terminal: Box<dyn Write + Send>,
    log_file: Option<File>,
}

/// Serialized writer for operator-facing output
///
/// Every line goes to the terminal and, when configured, to the log file with
/// ANSI sequences removed. Both writes happen under one lock so lines keep
/// their issue order in both sinks.
pub struct Console {
    color: bool,
    sinks: Mutex<Sinks>,
}

impl Console {
    /// Console on stdout, appending to `log_file` if given
    pub fn new(color: bool, log_file: Option<&Path>) -> io::Result<Self> {
        Self::with_writer(Box::new(io::stdout()), color, log_file)
    }

    pub fn with_writer(
        terminal: Box<dyn Write + Send>,
        color: bool,
        log_file: Option<&Path>,
    ) -> io::Result<Self> {
        let log_file = match log_file {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Some(OpenOptions::new().create(true).append(true).open(path)?)
            }
            None => None,
        };
        Ok(Self {
            color,
            sinks: Mutex::new(Sinks { terminal, log_file }),
        })
    }

    pub fn color_enabled(&self) -> bool {
        self.color
    }

    /// Write one prefixed message
    pub fn log(&self, level: Level, message: &str) {
        let text = format!("{}{}", level.prefix(), message);
        let line = if self.color {
            level.style().force_styling(true).apply_to(text).to_string()
        } else {
            console::strip_ansi_codes(&text).into_owned()
        };
        self.write_line(&line);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    pub fn ok(&self, message: &str) {
        self.log(Level::Ok, message);
    }

    /// Write text without a prefix (menus, prompts, listings)
    pub fn plain(&self, text: &str) {
        let text = if self.color {
            text.to_string()
        } else {
            console::strip_ansi_codes(text).into_owned()
        };
        self.write_line(&text);
    }

    /// Render a runner event
    pub fn event(&self, event: &ExecutionEvent) {
        let (level, message) = format_execution_event(event);
        self.log(level, &message);
    }

    fn write_line(&self, line: &str) {
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        // Console output is best effort; a closed stdout must not abort a build
        let _ = writeln!(sinks.terminal, "{}", line);
        let _ = sinks.terminal.flush();
        if let Some(file) = sinks.log_file.as_mut() {
            let _ = writeln!(file, "{}", console::strip_ansi_codes(line));
            let _ = file.flush();
        }
    }
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Level and text for an execution event
pub fn format_execution_event(event: &ExecutionEvent) -> (Level, String) {
    match event {
        ExecutionEvent::RunStarted { run_id, total } => (
            Level::Info,
            format!(
                "{}Starting run {} ({} step{})",
                ROCKET,
                style(&run_id.to_string()[..8]).dim(),
                total,
                if *total == 1 { "" } else { "s" }
            ),
        ),
        ExecutionEvent::StepStarted {
            id,
            name,
            position,
            total,
        } => (
            Level::Info,
            format!("[{}/{}] Step {}: {}", position, total, id, style(name).bold()),
        ),
        ExecutionEvent::StepSkipped {
            id,
            name,
            reason,
            missing,
        } => {
            if missing.is_empty() {
                (
                    Level::Info,
                    format!("{}Step {} ({}) skipped: {}", SKIP, id, name, reason),
                )
            } else {
                let files: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
                (
                    Level::Warn,
                    format!(
                        "Step {} ({}) skipped: {}; not present: {}",
                        id,
                        name,
                        reason,
                        files.join(", ")
                    ),
                )
            }
        }
        ExecutionEvent::StepCompleted { id, name } => {
            (Level::Ok, format!("Step {} ({}) completed", id, name))
        }
        ExecutionEvent::StepFailed { id, name, error } => {
            // Step errors already open with `step N (name)`
            let own = format!("step {} ({})", id, name);
            let message = match error.strip_prefix(&own) {
                Some(rest) => format!("Step {} ({}){}", id, name, rest),
                None => format!("Step {} ({}) failed: {}", id, name, error),
            };
            (Level::Error, message)
        }
        ExecutionEvent::RunFinished { run_id, status } => {
            let short = &run_id.to_string()[..8];
            match status {
                RunStatus::Completed => (Level::Ok, format!("Run {} completed", short)),
                RunStatus::Failed => (Level::Error, format!("Run {} failed", short)),
                other => (Level::Info, format!("Run {} {:?}", short, other)),
            }
        }
    }
}

/// Horizontal rule sized to the terminal
pub fn separator() -> String {
    let width = term_size::dimensions().map(|(w, _)| w).unwrap_or(80).min(100);
    "─".repeat(width)
}

/// One line per registered step
pub fn format_step_list(registry: &StepRegistry) -> Vec<String> {
    registry.steps().iter().map(format_step_line).collect()
}

fn format_step_line(step: &Step) -> String {
    format!(
        "  {} {:<12} {}",
        style(format!("{}.", step.id)).bold(),
        style(step.key).cyan(),
        step.name
    )
}

/// Final per-step summary of a run
pub fn format_report(report: &RunReport) -> Vec<String> {
    report
        .steps
        .iter()
        .map(|record| {
            let detail = match &record.state {
                StepState::Skipped { reason } => format!(" ({})", reason),
                StepState::Completed {
                    started_at,
                    completed_at,
                } => format!(
                    " ({}s)",
                    (*completed_at - *started_at).num_seconds().max(0)
                ),
                _ => String::new(),
            };
            format!(
                "  {}. {:<32} {}{}",
                record.id,
                record.name,
                format_step_state(&record.state),
                style(detail).dim()
            )
        })
        .collect()
}
