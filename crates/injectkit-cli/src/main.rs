mod completion;
mod config;
mod flows;
mod render;
mod shell;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use injectkit_asar::AsarCodec;
use injectkit_core::InjectionTarget;
use injectkit_installer::{default_state_dir, FileLockWaiter, ScriptInjector, StateLayout};
use injectkit_updates::{HttpScriptSource, LocalStateStore};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::completion::{write_completions_script, CliCompletionShell};
use crate::config::{load_config, InjectkitConfig};
use crate::flows::{
    format_doctor_lines, run_check_command, run_install_command, run_reinstall_command, Pipeline,
};
use crate::render::{current_output_style, TerminalRenderer};
use crate::shell::run_shell;

#[derive(Parser, Debug)]
#[command(name = "injectkit")]
#[command(about = "Keeps a startup script injected into a packaged desktop client")]
#[command(long_about = None)]
struct Cli {
    /// Directory holding the local script state and config.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Installation directory containing the client archive.
    #[arg(long, global = true)]
    archive_dir: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Check {
        #[arg(long)]
        force: bool,
    },
    Install,
    Reinstall,
    Shell,
    Doctor,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

struct Settings {
    state: StateLayout,
    config_path: PathBuf,
    config: InjectkitConfig,
    target: Option<InjectionTarget>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let renderer = TerminalRenderer::new(current_output_style(cli.plain));

    match run_cli(cli, renderer) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            renderer.print_status("error", &format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).compact())
        .init();
}

fn run_cli(cli: Cli, renderer: TerminalRenderer) -> Result<bool> {
    if let Some(Commands::Completions { shell }) = cli.command {
        write_completions_script(shell, &mut io::stdout().lock())?;
        return Ok(true);
    }

    let settings = resolve_settings(&cli)?;
    let mut pipeline = build_pipeline(&settings)?;

    let succeeded = match cli.command.unwrap_or(Commands::Shell) {
        Commands::Check { force } => run_check_command(&mut pipeline, renderer, force),
        Commands::Install => run_install_command(&mut pipeline, renderer),
        Commands::Reinstall => run_reinstall_command(&mut pipeline, renderer),
        Commands::Doctor => {
            let recorded = pipeline.store().read();
            renderer.print_lines(&format_doctor_lines(
                &settings.state,
                &settings.config_path,
                pipeline.source().url(),
                pipeline.target(),
                recorded.as_ref(),
            ));
            true
        }
        Commands::Shell => {
            if !run_check_command(&mut pipeline, renderer, false) {
                return Ok(false);
            }
            run_shell(
                &mut pipeline,
                renderer,
                io::stdin().lock(),
                io::stdout(),
            )?;
            true
        }
        Commands::Completions { .. } => true,
    };

    Ok(succeeded)
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let state_root = match &cli.state_dir {
        Some(dir) => dir.clone(),
        None => default_state_dir()?,
    };
    let state = StateLayout::new(state_root);
    let config_path = cli.config.clone().unwrap_or_else(|| state.config_path());
    let config = load_config(&config_path)?;

    let archive_dir = cli
        .archive_dir
        .clone()
        .or_else(|| config.layout.archive_dir.clone());
    let target = match archive_dir {
        Some(dir) => Some(InjectionTarget::from_archive_dir(
            &dir,
            &config.target_layout()?,
        )),
        None => None,
    };

    Ok(Settings {
        state,
        config_path,
        config,
        target,
    })
}

fn build_pipeline(settings: &Settings) -> Result<Pipeline<HttpScriptSource, AsarCodec>> {
    let config = &settings.config;
    let source = HttpScriptSource::new(
        &config.source.url,
        &config.source.user_agent,
        config.source_timeout(),
    )?;
    let injector = ScriptInjector::new(
        AsarCodec,
        FileLockWaiter::new(config.lock_poll_interval()),
        config.lock_max_wait(),
        config.injection_wrapper()?,
    );

    Ok(Pipeline::new(
        source,
        LocalStateStore::new(settings.state.script_state_path()),
        injector,
        settings.target.clone(),
    ))
}
