use std::io::{self, Stdout};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind, KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::{debug, warn};

use crate::driver::{ActivityUpdate, DisplaySink, DriverCommand, DriverState};
use crate::timetable::model::TimetableSettings;
use crate::ui::render::{ActivityView, ScreenModel, draw};

const INPUT_POLL: Duration = Duration::from_millis(250);

/// Full-screen display. Owns the terminal until dropped.
pub struct TerminalDisplay {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    settings: TimetableSettings,
    source_label: &'static str,
    clock: String,
    date: String,
    activity: ActivityView,
    paused: bool,
}

impl TerminalDisplay {
    pub fn enter(settings: TimetableSettings, source_label: &'static str) -> Result<Self> {
        enable_raw_mode().context("failed to enable raw terminal mode")?;
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen, EnableFocusChange) {
            let _ = disable_raw_mode();
            return Err(err).context("failed to enter alternate screen");
        }
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let activity = ActivityView::idle(&settings);
        Ok(Self {
            terminal,
            settings,
            source_label,
            clock: String::new(),
            date: String::new(),
            activity,
            paused: false,
        })
    }

    fn redraw(&mut self) -> Result<()> {
        let zone_label = self.settings.zone.label();
        let model = ScreenModel {
            clock: &self.clock,
            date: &self.date,
            activity: &self.activity,
            source_label: self.source_label,
            zone_label,
            paused: self.paused,
        };
        self.terminal.draw(|frame| draw(frame, &model))?;
        Ok(())
    }
}

impl DisplaySink for TerminalDisplay {
    fn show_clock(&mut self, text: &str) -> Result<()> {
        self.clock = text.to_string();
        self.redraw()
    }

    fn show_date(&mut self, text: &str) -> Result<()> {
        // Always followed by a clock or activity redraw in the same tick.
        self.date = text.to_string();
        Ok(())
    }

    fn show_activity(&mut self, update: &ActivityUpdate<'_>) -> Result<()> {
        self.activity = ActivityView::from_update(update, &self.settings);
        self.redraw()
    }

    fn show_state(&mut self, state: DriverState) -> Result<()> {
        self.paused = state == DriverState::Idle;
        self.redraw()
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            DisableFocusChange,
            LeaveAlternateScreen
        );
        let _ = self.terminal.show_cursor();
    }
}

/// Translates key presses and focus changes into driver commands.
pub struct InputThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputThread {
    pub fn spawn(commands: Sender<DriverCommand>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("lessonclock-input".to_string())
            .spawn(move || {
                if let Err(err) = input_loop(&commands, &thread_stop) {
                    warn!("terminal input stopped: {err:#}");
                    let _ = commands.send(DriverCommand::Stop);
                }
            })
            .context("failed to spawn input thread")?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for InputThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn input_loop(commands: &Sender<DriverCommand>, stop: &AtomicBool) -> Result<()> {
    let mut paused = false;
    while !stop.load(Ordering::Relaxed) {
        if !event::poll(INPUT_POLL)? {
            continue;
        }
        let Some(command) = command_for_event(event::read()?, &mut paused) else {
            continue;
        };
        debug!(?command, "input command");
        let stopping = command == DriverCommand::Stop;
        if commands.send(command).is_err() || stopping {
            break;
        }
    }
    Ok(())
}

fn command_for_event(event: Event, paused: &mut bool) -> Option<DriverCommand> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(DriverCommand::Stop),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(DriverCommand::Stop)
            }
            KeyCode::Char('r') => Some(DriverCommand::Refresh),
            KeyCode::Char('p') => {
                *paused = !*paused;
                Some(if *paused {
                    DriverCommand::Pause
                } else {
                    DriverCommand::Resume
                })
            }
            _ => None,
        },
        Event::FocusLost => {
            *paused = true;
            Some(DriverCommand::Pause)
        }
        Event::FocusGained => {
            *paused = false;
            Some(DriverCommand::Resume)
        }
        Event::Resize(_, _) => Some(DriverCommand::Refresh),
        _ => None,
    }
}
