use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::palette::palette::{Color, Palette, ReturnFormat};

/// Inbound requests for the palette worker
#[derive(Debug, Clone)]
pub enum PaletteCommand {
    Create {
        id: String,
        colors: Vec<Color>,
        duration: Option<f64>,
        return_format: ReturnFormat,
    },
    Set {
        id: String,
        options: PaletteOptions,
    },
    Remove {
        id: String,
    },
    StartLoop,
    StopLoop,
}

/// Partial palette fields shallow-merged by a `Set` command
#[derive(Debug, Clone, Default)]
pub struct PaletteOptions {
    pub colors: Option<Vec<Color>>,
    pub time_period: Option<f64>,
    pub use_bpm: Option<bool>,
    pub bpm_division: Option<f64>,
    pub bpm: Option<f64>,
    pub return_format: Option<ReturnFormat>,
}

/// Outbound notifications from the palette worker
#[derive(Debug, Clone, PartialEq)]
pub enum PaletteEvent {
    Created {
        id: String,
    },
    Update {
        id: String,
        current_step: String,
        current_color: usize,
    },
}

/// Handle to the isolated palette animation worker
///
/// The worker runs on its own task with its own fixed-rate timer and owns all
/// palette state; the engine talks to it exclusively through ordered
/// asynchronous messages. Dropping the handle shuts the worker down.
pub struct PaletteWorker {
    commands: UnboundedSender<PaletteCommand>,
    events: UnboundedReceiver<PaletteEvent>,
    _task: JoinHandle<()>,
}

impl PaletteWorker {
    /// Spawn the worker; must be called within a tokio runtime
    pub fn spawn(tick_rate: f64) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let tick = Duration::from_secs_f64(1.0 / tick_rate.max(1.0));
        let task = tokio::spawn(run(command_rx, event_tx, tick));

        Self {
            commands: command_tx,
            events: event_rx,
            _task: task,
        }
    }

    pub fn create_palette(
        &self,
        id: impl Into<String>,
        colors: Vec<Color>,
        duration: Option<f64>,
        return_format: ReturnFormat,
    ) {
        self.send(PaletteCommand::Create {
            id: id.into(),
            colors,
            duration,
            return_format,
        });
    }

    pub fn set_palette(&self, id: impl Into<String>, options: PaletteOptions) {
        self.send(PaletteCommand::Set { id: id.into(), options });
    }

    pub fn remove_palette(&self, id: impl Into<String>) {
        self.send(PaletteCommand::Remove { id: id.into() });
    }

    pub fn start_loop(&self) {
        self.send(PaletteCommand::StartLoop);
    }

    pub fn stop_loop(&self) {
        self.send(PaletteCommand::StopLoop);
    }

    /// Drain every event the worker has emitted so far without blocking
    pub fn drain_events(&mut self) -> Vec<PaletteEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Await the next event; test helper
    pub async fn recv_event(&mut self) -> Option<PaletteEvent> {
        self.events.recv().await
    }

    fn send(&self, command: PaletteCommand) {
        if self.commands.send(command).is_err() {
            warn!("palette worker is gone; command dropped");
        }
    }
}

async fn run(
    mut commands: UnboundedReceiver<PaletteCommand>,
    events: UnboundedSender<PaletteEvent>,
    tick: Duration,
) {
    let mut palettes: HashMap<String, Palette> = HashMap::new();
    // The timer starts running immediately, matching a freshly-loaded worker
    let mut running = true;
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                handle_command(command, &mut palettes, &mut running, &events);
            }
            _ = interval.tick(), if running => {
                for palette in palettes.values_mut() {
                    // Palettes without colors yield nothing and emit no update
                    if let Some(step) = palette.next_step() {
                        let _ = events.send(PaletteEvent::Update {
                            id: palette.id().to_string(),
                            current_step: step,
                            current_color: palette.current_color,
                        });
                    }
                }
            }
        }
    }

    debug!("palette worker shut down with {} palettes", palettes.len());
}

fn handle_command(
    command: PaletteCommand,
    palettes: &mut HashMap<String, Palette>,
    running: &mut bool,
    events: &UnboundedSender<PaletteEvent>,
) {
    match command {
        PaletteCommand::Create { id, colors, duration, return_format } => {
            let palette = Palette::new(colors, duration, id.clone(), return_format);
            palettes.insert(id.clone(), palette);
            let _ = events.send(PaletteEvent::Created { id });
        }

        PaletteCommand::Set { id, options } => {
            let Some(palette) = palettes.get_mut(&id) else {
                debug!(palette = %id, "set for unknown palette ignored");
                return;
            };

            if let Some(colors) = options.colors {
                palette.colors = colors;
            }
            if let Some(time_period) = options.time_period {
                palette.time_period = time_period;
            }
            if let Some(use_bpm) = options.use_bpm {
                palette.use_bpm = use_bpm;
            }
            if let Some(bpm_division) = options.bpm_division {
                palette.bpm_division = bpm_division;
            }
            if let Some(bpm) = options.bpm {
                palette.bpm = bpm;
            }
            if let Some(return_format) = options.return_format {
                palette.return_format = return_format;
            }
        }

        PaletteCommand::Remove { id } => {
            palettes.remove(&id);
        }

        // Both are idempotent; stopping preserves palette state so a later
        // start resumes from the preserved index and elapsed time
        PaletteCommand::StartLoop => *running = true,
        PaletteCommand::StopLoop => *running = false,
    }
}
