use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use clap::{Parser, Subcommand};
use crossterm::event::{Event, KeyCode};
use tracing_subscriber::filter::LevelFilter;

use overlay_widgets::constants::MAX_INSTANCES;
use overlay_widgets::drivers::console::{ConsoleInputDriver, ConsoleOutputDriver};
use overlay_widgets::drivers::{InputDriver, OutputDriver};
use overlay_widgets::event_loop::{ControlFlow, EventLoop};
use overlay_widgets::instance::KEY_COLOR;
use overlay_widgets::store::{JsonFileStore, ScalarStore, StateStore};
use overlay_widgets::surface::{HeadlessSurfaces, TerminalSurfaces};
use overlay_widgets::{
    Bounds, Command, InstanceId, LifecycleCoordinator, ManagerConfig, Mode, OverlayError,
    OverlayHost, PointerEvent, PresenceFlag, SettingValue, tracing_sub,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(name = "overlay-widgets", version, about = "Floating clock, timer and randomizer overlays")]
struct Cli {
    /// Directory holding persisted instances.
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,
    #[arg(long, default_value_t = MAX_INSTANCES)]
    max_instances: usize,
    /// Log destination. The terminal host defaults to a file in the store.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Show the overlays in this terminal (default).
    Run,
    /// Print how many overlays are live.
    Status,
    /// Print every persisted instance as JSON.
    List,
    /// Add an overlay.
    Add,
    /// Remove an overlay and its record.
    Remove { id: InstanceId },
    /// Change a setting. `mode` switches the widget variant.
    Set {
        id: InstanceId,
        key: String,
        value: String,
    },
    /// Remove every overlay.
    StopAll,
}

fn main() -> Result<(), Box<dyn Error>> {
    let Cli {
        store,
        max_instances,
        log_file,
        log_level,
        command,
    } = Cli::parse();
    let store_dir = store.unwrap_or_else(default_store_dir);
    let command = command.unwrap_or(CliCommand::Run);

    let log_file = match (&command, log_file) {
        (_, Some(path)) => Some(path),
        (CliCommand::Run, None) => Some(store_dir.join("overlay-widgets.log")),
        _ => None,
    };
    tracing_sub::init(log_file.as_deref(), log_level)?;

    let store = Arc::new(JsonFileStore::open(&store_dir)?);
    let config = ManagerConfig::default().with_max_instances(max_instances);

    match command {
        CliCommand::Run => run_terminal(store, config),
        CliCommand::Status => {
            let live = store.load_live_count()?;
            let stored = store.load_all()?.len();
            println!("live: {live}");
            println!("stored: {stored}");
            Ok(())
        }
        CliCommand::List => {
            for state in store.load_all()? {
                println!("{}", serde_json::to_string(&state)?);
            }
            Ok(())
        }
        CliCommand::Add => one_shot(store, config, |c| run(c, Command::AddInstance)),
        CliCommand::Remove { id } => one_shot(store, config, |c| run(c, Command::RemoveInstance(id))),
        CliCommand::Set { id, key, value } => one_shot(store, config, |c| {
            let command = if key == "mode" {
                let mode: Mode = value.parse()?;
                Command::SwitchMode { id, mode }
            } else {
                let value = c.parse_setting(id, &key, &value)?;
                Command::UpdateSetting { id, key, value }
            };
            run(c, command)
        }),
        CliCommand::StopAll => one_shot(store, config, |c| run(c, Command::StopAll)),
    }
}

fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("overlay-widgets"))
        .unwrap_or_else(|| PathBuf::from(".overlay-widgets"))
}

fn run(coordinator: &LifecycleCoordinator, command: Command) -> Result<(), Box<dyn Error>> {
    let outcome = coordinator.dispatch(command)?;
    println!("{outcome:?}");
    Ok(())
}

/// Restore stored instances into a headless host, apply `apply`, let the
/// host finish the resulting surface work and persist the result.
fn one_shot<F>(store: Arc<JsonFileStore>, config: ManagerConfig, apply: F) -> Result<(), Box<dyn Error>>
where
    F: FnOnce(&LifecycleCoordinator) -> Result<(), Box<dyn Error>>,
{
    let (coordinator, queue) = LifecycleCoordinator::new(
        config.without_live_count(),
        store.clone(),
        store,
        Box::new(PresenceFlag::new()),
    )?;
    let mut host = OverlayHost::new(coordinator.clone(), queue, HeadlessSurfaces::new());
    coordinator.restore()?;
    host.pump();
    let result = apply(&coordinator);
    host.pump();
    host.suspend();
    result
}

fn run_terminal(store: Arc<JsonFileStore>, config: ManagerConfig) -> Result<(), Box<dyn Error>> {
    let mut output = ConsoleOutputDriver::new()?;
    let config = config.with_screen(output.size()?);
    let presence = PresenceFlag::new();
    let (coordinator, queue) = LifecycleCoordinator::new(
        config,
        store.clone(),
        store,
        Box::new(presence.clone()),
    )?;
    coordinator.start()?;
    let mut host = OverlayHost::new(coordinator.clone(), queue, TerminalSurfaces::new());

    output.enter()?;
    let mut input = ConsoleInputDriver::new();
    input.set_mouse_capture(true)?;
    let mut event_loop = EventLoop::new(input, FRAME_INTERVAL);

    let result = event_loop.run(|event| {
        match event {
            None => {
                host.pump();
                if host.surfaces_mut().tick(Instant::now()) {
                    output.bell()?;
                }
                if !presence.is_held() && coordinator.live_count() == 0 {
                    return Ok(ControlFlow::Quit);
                }
                let surfaces = host.surfaces();
                output.draw(|frame| surfaces.render(frame, Local::now(), Instant::now()))?;
            }
            Some(Event::Key(key)) => match key.code {
                KeyCode::Char('a') => report(coordinator.dispatch(Command::AddInstance)),
                KeyCode::Char('x') => {
                    if let Some(id) = topmost(&host) {
                        report(coordinator.dispatch(Command::RemoveInstance(id)));
                    }
                }
                KeyCode::Char('m') => {
                    if let Some(id) = topmost(&host)
                        && let Some(machine) = coordinator.registry().machine(id)
                    {
                        let mode = machine.snapshot().mode.next();
                        report(coordinator.dispatch(Command::SwitchMode { id, mode }));
                    }
                }
                KeyCode::Char('c') => {
                    if let Some(id) = topmost(&host)
                        && let Some(machine) = coordinator.registry().machine(id)
                    {
                        let color = machine.snapshot().color().next_in_palette();
                        report(coordinator.dispatch(Command::UpdateSetting {
                            id,
                            key: KEY_COLOR.to_string(),
                            value: SettingValue::Color(color),
                        }));
                    }
                }
                KeyCode::Char('s') => report(coordinator.dispatch(Command::StopAll)),
                KeyCode::Char('q') | KeyCode::Esc => {
                    host.suspend();
                    return Ok(ControlFlow::Quit);
                }
                _ => {}
            },
            Some(Event::Mouse(mouse)) => {
                if let Some(pointer) = PointerEvent::from_mouse(&mouse) {
                    host.handle_pointer(pointer);
                }
            }
            Some(Event::FocusLost) => {
                host.handle_pointer(PointerEvent::cancel());
            }
            Some(Event::Resize(cols, rows)) => {
                host.set_bounds(Some(Bounds::new(u32::from(cols), u32::from(rows))));
            }
            Some(_) => {}
        }
        Ok(ControlFlow::Continue)
    });

    output.exit()?;
    coordinator.flush();
    result?;
    Ok(())
}

fn topmost(host: &OverlayHost<TerminalSurfaces>) -> Option<InstanceId> {
    let surface = host.surfaces().topmost()?;
    host.presenter().registry().instance_for_surface(surface)
}

fn report<T: std::fmt::Debug>(result: Result<T, OverlayError>) {
    match result {
        Ok(outcome) => tracing::debug!(?outcome, "command applied"),
        Err(err @ OverlayError::CapacityExceeded { .. }) => tracing::warn!(error = %err, "add rejected"),
        Err(err) => tracing::warn!(error = %err, "command failed"),
    }
}
