use std::ffi::OsStr;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use injectkit_installer::InjectionStep;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(
    plain_requested: bool,
    no_color: Option<&OsStr>,
    stdout_is_terminal: bool,
) -> OutputStyle {
    let no_color = no_color.is_some_and(|value| !value.is_empty());
    if plain_requested || no_color || !stdout_is_terminal {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn current_output_style(plain_requested: bool) -> OutputStyle {
    resolve_output_style(
        plain_requested,
        std::env::var_os("NO_COLOR").as_deref(),
        std::io::stdout().is_terminal(),
    )
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let badge = match status {
                "ok" => "[OK]",
                "warn" => "[WARN]",
                "error" => "[ERR]",
                _ => "[..]",
            };
            format!("{badge} {message}")
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct InjectionProgress {
    style: OutputStyle,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!();
            println!("{}", colorize(section_style(), &format!("== {title} ==")));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_injection(self) -> InjectionProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let total = InjectionStep::ALL.len() as u64;
            let progress_bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {pos}/{len} {elapsed_precise}",
            ) {
                progress_bar.set_style(style.tick_chars(".oO@* ").progress_chars("=>-"));
            }
            progress_bar.set_message("check");
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        InjectionProgress {
            style: self.style,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl InjectionProgress {
    pub(crate) fn step(&mut self, step: InjectionStep) {
        match &self.progress_bar {
            Some(progress_bar) => {
                progress_bar.set_message(step.as_str());
                progress_bar.set_position(step.position() - 1);
            }
            None => println!("{}", render_status_line(self.style, "step", step_message(step))),
        }
    }

    pub(crate) fn finish(mut self, succeeded: bool) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };
        progress_bar.finish_and_clear();
        if succeeded {
            println!(
                "{} complete in {}",
                colorize(progress_label_style(), "inject"),
                format_elapsed(self.started_at.elapsed())
            );
        }
    }
}

pub(crate) fn step_message(step: InjectionStep) -> &'static str {
    match step {
        InjectionStep::WaitForArchiveUnlock => "waiting for the archive to be released",
        InjectionStep::Unpack => "unpacking archive",
        InjectionStep::WaitForTargetUnlock => "waiting for the target file to be released",
        InjectionStep::MutateTarget => "writing script to target file",
        InjectionStep::Pack => "packing archive",
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
