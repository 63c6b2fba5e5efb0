mod api;
mod diagnostics;
mod driver;
mod logging;
mod time_provider;
mod time_software;
mod timetable;
mod ui;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::{Arc, mpsc};

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use clap::{ArgAction, Parser};
use tracing::info;

use crate::api::{ApiControls, ApiDisplay, ApiServer, ApiServerConfig, timetable_view};
use crate::driver::Driver;
use crate::logging::{LogTarget, init_tracing};
use crate::time_provider::{TimingSourceKind, select_provider};
use crate::timetable::model::{Timetable, load_timetable_file};
use crate::timetable::validate::{log_report, validate};
use crate::ui::plain::PlainDisplay;
use crate::ui::terminal::{InputThread, TerminalDisplay};

#[derive(Parser, Debug)]
#[command(
    name = "lessonclock",
    version,
    about = "Weekly timetable clock with a live countdown to the end of the current block"
)]
struct Cli {
    #[arg(long, default_value = "timetable.json")]
    timetable: PathBuf,

    /// Pretend it is this local time (YYYY-MM-DDTHH:MM[:SS]) in the timetable zone.
    #[arg(long, value_parser = parse_local_datetime)]
    at: Option<NaiveDateTime>,

    /// Correction from an external time-sync source, added to every reading.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    clock_offset_ms: i64,

    /// Evaluate a single tick, print it and exit.
    #[arg(long)]
    once: bool,

    #[arg(long)]
    validate: bool,

    #[arg(long)]
    diagnostics: bool,

    /// Stop after this many ticks.
    #[arg(long)]
    ticks: Option<u64>,

    /// Line output instead of the full-screen display.
    #[arg(long)]
    plain: bool,

    #[arg(long, default_value = "0.0.0.0")]
    api_bind: String,

    #[arg(long, default_value_t = 8099)]
    api_port: u16,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    api_enabled: bool,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.ticks == Some(0) {
        bail!("--ticks must be greater than zero");
    }

    let one_shot = cli.once || cli.validate || cli.diagnostics;
    let full_screen = !one_shot && !cli.plain && io::stdout().is_terminal();
    let log_target = match (cli.log_file.as_deref(), full_screen) {
        (Some(path), _) => LogTarget::File(path),
        (None, true) => LogTarget::Discard,
        (None, false) => LogTarget::Stderr,
    };
    init_tracing(&cli.log_level, log_target)?;

    let config = load_timetable_file(&cli.timetable)
        .with_context(|| format!("failed to load {}", cli.timetable.display()))?;
    let timetable = Timetable::load(&config.entries)
        .with_context(|| format!("invalid timetable {}", cli.timetable.display()))?;
    info!(
        path = %cli.timetable.display(),
        version = config.version,
        "timetable file loaded"
    );
    let settings = config.settings;
    let report = validate(&timetable);
    log_report(&report, &timetable, &settings);

    if cli.validate {
        for line in report.summary(&timetable, &settings) {
            println!("{line}");
        }
        return Ok(());
    }

    let kind = match cli.at {
        Some(at) if one_shot => TimingSourceKind::FrozenAt(at),
        Some(at) => TimingSourceKind::StartAt(at),
        None => TimingSourceKind::System,
    };
    let selected = select_provider(kind, &settings.zone, cli.clock_offset_ms)?;
    if let Some(note) = selected.correction_note.as_deref() {
        info!("{note}");
    }

    if cli.diagnostics {
        diagnostics::run_diagnostics(&selected, &timetable, &settings, &report)?;
        return Ok(());
    }

    if cli.once {
        let mut driver = Driver::new(timetable, settings.clone(), selected.provider);
        driver.add_sink(Box::new(PlainDisplay::new(io::stdout(), settings)));
        driver.start();
        if driver.tick().skipped {
            bail!("unable to read the clock");
        }
        return Ok(());
    }

    let (commands, command_rx) = mpsc::channel();
    let api_server = if cli.api_enabled {
        let server = ApiServer::start(
            ApiServerConfig {
                bind_addr: cli.api_bind.clone(),
                port: cli.api_port,
            },
            ApiControls {
                commands: commands.clone(),
                correction: selected.correction.clone(),
            },
        )
        .with_context(|| {
            format!(
                "failed to start local API at {}:{}",
                cli.api_bind, cli.api_port
            )
        })?;
        if let Some(addr) = server.local_addr() {
            info!(%addr, "display state served at http://{addr}/v1/state");
        }
        Some(server)
    } else {
        None
    };

    let views = timetable_view(&timetable, &settings);
    let mut driver = Driver::new(timetable, settings.clone(), selected.provider);
    if let Some(server) = &api_server {
        server
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("failed to lock API state"))?
            .set_timetable(views);
        driver.add_sink(Box::new(ApiDisplay::new(
            Arc::clone(&server.state),
            settings.clone(),
            selected.label,
        )?));
    }

    let input = if full_screen {
        driver.add_sink(Box::new(TerminalDisplay::enter(
            settings,
            selected.label,
        )?));
        Some(InputThread::spawn(commands.clone())?)
    } else {
        driver.add_sink(Box::new(PlainDisplay::new(io::stdout(), settings)));
        None
    };
    drop(commands);

    let result = driver.run(&command_rx, cli.ticks);

    drop(input);
    drop(driver);
    drop(api_server);
    let ticks = result?;
    info!(ticks, "lessonclock stopped");
    Ok(())
}

fn parse_local_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| format!("expected YYYY-MM-DDTHH:MM[:SS], got '{raw}'"))
}
