use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use injectkit_core::ArchiveCodec;
use injectkit_installer::LockProbe;
use injectkit_updates::ScriptSource;

use crate::flows::{run_check_command, run_install_command, run_reinstall_command, Pipeline};
use crate::render::TerminalRenderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShellCommand {
    Install,
    Reinstall,
    Check,
    Quit,
    Empty,
    Unknown(String),
}

pub(crate) fn parse_shell_command(line: &str) -> ShellCommand {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => ShellCommand::Empty,
        "i" | "install" => ShellCommand::Install,
        "r" | "reinstall" => ShellCommand::Reinstall,
        "c" | "check" => ShellCommand::Check,
        "q" | "quit" | "exit" => ShellCommand::Quit,
        _ => ShellCommand::Unknown(trimmed.to_string()),
    }
}

pub(crate) fn shell_help_lines() -> Vec<String> {
    vec![
        "i  install the script if an update is available".to_string(),
        "r  reinstall the recorded script".to_string(),
        "c  check again for script updates".to_string(),
        "q  quit".to_string(),
    ]
}

/// Reads commands until `q` or end of input. Command failures are reported
/// and the loop keeps going.
pub(crate) fn run_shell<S, C, P, R, W>(
    pipeline: &mut Pipeline<S, C, P>,
    renderer: TerminalRenderer,
    mut input: R,
    mut prompt: W,
) -> Result<()>
where
    S: ScriptSource,
    C: ArchiveCodec,
    P: LockProbe,
    R: BufRead,
    W: Write,
{
    renderer.print_section("commands");
    renderer.print_lines(&shell_help_lines());

    let mut line = String::new();
    loop {
        write!(prompt, "> ").context("failed writing shell prompt")?;
        prompt.flush().context("failed flushing shell prompt")?;

        line.clear();
        let read = input
            .read_line(&mut line)
            .context("failed reading shell input")?;
        if read == 0 {
            return Ok(());
        }

        match parse_shell_command(&line) {
            ShellCommand::Install => {
                run_install_command(pipeline, renderer);
            }
            ShellCommand::Reinstall => {
                run_reinstall_command(pipeline, renderer);
            }
            ShellCommand::Check => {
                run_check_command(pipeline, renderer, true);
            }
            ShellCommand::Quit => return Ok(()),
            ShellCommand::Empty => {}
            ShellCommand::Unknown(value) => {
                renderer.print_status("warn", &format!("unknown command '{value}'"));
            }
        }
    }
}
