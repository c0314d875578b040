//! Line-oriented console dashboard.
//!
//! Prints readings and connection changes as they arrive and takes commands
//! from stdin. It never falls back to the simulator: if the device goes away
//! the dashboard says so and waits for `connect`.

use crate::bridge::{Bridge, BridgeEvent, ConnectionState};
use crate::codec::Reading;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

/// Servo angle for an open gate.
pub const GATE_OPEN_ANGLE: i64 = 180;
/// Servo angle for a closed gate.
pub const GATE_CLOSED_ANGLE: i64 = 0;

const HELP: &str = "\
Commands:
  connect       open the serial device
  disconnect    close it
  toggle        connect or disconnect, whichever applies
  open-gate     move the servo to 180
  close-gate    move the servo to 0
  angle <n>     move the servo to n (0-180)
  status        show the connection state
  history       summarize the recent readings
  help          show this text
  quit          disconnect and exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect,
    Disconnect,
    Toggle,
    Angle(i64),
    Status,
    History,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("Unknown command {0:?}; type `help` for the list")]
    Unknown(String),
    #[error("`angle` needs a value, e.g. `angle 90`")]
    MissingAngle,
    #[error("Invalid angle {0:?}")]
    InvalidAngle(String),
}

impl FromStr for ConsoleCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let command = match verb.as_str() {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "toggle" => Self::Toggle,
            "open-gate" | "open" => Self::Angle(GATE_OPEN_ANGLE),
            "close-gate" | "close" => Self::Angle(GATE_CLOSED_ANGLE),
            "angle" => {
                let raw = words.next().ok_or(CommandParseError::MissingAngle)?;
                let angle = raw
                    .parse()
                    .map_err(|_| CommandParseError::InvalidAngle(raw.to_string()))?;
                Self::Angle(angle)
            }
            "status" => Self::Status,
            "history" => Self::History,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// What the dashboard currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub distance_cm: Option<u32>,
    pub motion_detected: Option<bool>,
    pub connection: ConnectionState,
}

impl DisplayState {
    /// Fold one event in. Leaving `Connected` resets the readouts to `---`.
    pub fn apply(&mut self, event: &BridgeEvent) {
        match event {
            BridgeEvent::Reading(reading) => self.show(reading),
            BridgeEvent::State(change) => {
                if !change.state.is_connected() {
                    self.distance_cm = None;
                    self.motion_detected = None;
                }
                self.connection = change.state.clone();
            }
        }
    }

    fn show(&mut self, reading: &Reading) {
        self.distance_cm = Some(reading.distance_cm);
        self.motion_detected = Some(reading.motion_detected);
    }

    pub fn render(&self) -> String {
        let distance = self
            .distance_cm
            .map_or_else(|| "---".to_string(), |d| d.to_string());
        let motion = match self.motion_detected {
            Some(true) => "DETECTED",
            Some(false) => "NO",
            None => "---",
        };
        format!("Distance: {distance} cm | Motion: {motion}")
    }
}

/// Whether the input loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Run one command against the bridge, reporting the outcome to `out`.
///
/// Bridge errors are printed, not returned; only a failing `out` is an error.
pub fn execute(bridge: &Bridge, command: ConsoleCommand, out: &mut impl Write) -> io::Result<Flow> {
    match command {
        ConsoleCommand::Connect => connect(bridge, out)?,
        ConsoleCommand::Disconnect => bridge.close(),
        ConsoleCommand::Toggle => {
            if bridge.current_state().is_active() {
                bridge.close();
            } else {
                connect(bridge, out)?;
            }
        }
        ConsoleCommand::Angle(angle) => match bridge.send(angle) {
            Ok(_) => writeln!(out, "Sent servo position {angle}")?,
            Err(err) => writeln!(out, "Cannot send command: {err}")?,
        },
        ConsoleCommand::Status => {
            let stats = bridge.stats();
            writeln!(out, "{}", bridge.current_state())?;
            writeln!(
                out,
                "{} readings, {} lines skipped, {} sessions",
                stats.readings_accepted, stats.lines_rejected, stats.sessions_started
            )?;
        }
        ConsoleCommand::History => {
            let snapshot = bridge.history_snapshot();
            let distances = snapshot.distances();
            match (distances.iter().min(), distances.iter().max()) {
                (Some(min), Some(max)) => writeln!(
                    out,
                    "{} of {} readings, distance {min}-{max} cm, motion at {} points",
                    snapshot.len(),
                    snapshot.capacity,
                    snapshot.motion_indices().len()
                )?,
                _ => writeln!(out, "No readings yet")?,
            }
        }
        ConsoleCommand::Help => writeln!(out, "{HELP}")?,
        ConsoleCommand::Quit => {
            bridge.close();
            return Ok(Flow::Quit);
        }
    }
    Ok(Flow::Continue)
}

fn connect(bridge: &Bridge, out: &mut impl Write) -> io::Result<()> {
    if let Err(err) = bridge.open() {
        writeln!(out, "Cannot connect: {err}")?;
    }
    Ok(())
}

/// Drive the dashboard until `quit` or end of input.
///
/// Blocks the calling thread; events are printed from a helper thread.
pub fn run(bridge: Bridge, input: impl BufRead) -> io::Result<()> {
    let mut subscription = bridge.subscribe();
    let subscriber = subscription.id();

    let printer = thread::Builder::new()
        .name("console-printer".into())
        .spawn(move || {
            let mut display = DisplayState::default();
            let stdout = io::stdout();
            while let Some(event) = subscription.blocking_recv() {
                display.apply(&event);
                let mut out = stdout.lock();
                let written = match &event {
                    BridgeEvent::State(change) => writeln!(out, "[{}] {}", change.state, change.detail)
                        .and_then(|_| writeln!(out, "{}", display.render())),
                    BridgeEvent::Reading(_) => writeln!(out, "{}", display.render()),
                };
                if written.is_err() {
                    break;
                }
            }
            debug!("Console printer stopped");
        })?;

    let mut stdout = io::stdout();
    writeln!(stdout, "{}", DisplayState::default().render())?;
    writeln!(stdout, "Type `help` for commands.")?;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(err) => {
                writeln!(stdout, "{err}")?;
                continue;
            }
        };
        if execute(&bridge, command, &mut stdout)? == Flow::Quit {
            break;
        }
    }

    bridge.close();
    bridge.unsubscribe(subscriber);
    if printer.join().is_err() {
        warn!("Console printer panicked");
    }
    Ok(())
}
