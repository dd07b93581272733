//! Client for an external UCI-speaking engine process.
//!
//! The engine runs as a child process and is driven over its stdin/stdout,
//! one command per line. Queries are strictly request/response: the caller
//! blocks until the engine answers, and only one query is in flight at a time.
//!
//! Stdout is read on a helper thread that forwards lines over a channel, so
//! the handshake and searches can wait with a deadline instead of blocking
//! forever on a silent engine.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};

use crate::board::{BoardSize, Color};
use crate::error::{Error, Result};
use crate::fen::set_turn;
use crate::movegen::{BISHOP_DIRECTIONS, KING_OFFSETS, KNIGHT_OFFSETS, ROOK_DIRECTIONS};
use crate::pieces::{Movement, PieceCatalog, PieceDefinition};

/// What the engine reports as its best move when it has none.
pub const NO_MOVE: &str = "(none)";

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period for the engine to exit after `quit` before it is killed.
const QUIT_GRACE: Duration = Duration::from_secs(2);
const QUIT_POLL: Duration = Duration::from_millis(50);

/// Anything that can answer "what would you play here".
pub trait MoveOracle {
    /// Best move for `color` in `fen`, or `None` when it cannot be determined.
    fn best_move(&mut self, fen: &str, depth: u32, color: Color) -> Option<String>;

    /// Whether the oracle can still answer. A `None` from an oracle that is no
    /// longer ready means "unknown", not "no legal move".
    fn is_ready(&self) -> bool {
        true
    }

    /// Releases whatever the oracle holds. Safe to call more than once.
    fn shutdown(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Ready,
    Stopped,
}

/// How to launch the engine process.
#[derive(Debug, Clone)]
pub struct EngineLaunch {
    pub executable: PathBuf,
    /// Defaults to the directory holding the executable.
    pub working_dir: Option<PathBuf>,
    /// Startup arguments, e.g. `["load", "variants.ini"]`.
    pub args: Vec<String>,
    /// Rule variant selected with `UCI_Variant` after the handshake.
    pub variant: Option<String>,
    pub handshake_timeout: Duration,
    /// How long to wait for `bestmove`. `None` waits indefinitely.
    pub search_timeout: Option<Duration>,
}

impl EngineLaunch {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: None,
            args: Vec::new(),
            variant: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            search_timeout: None,
        }
    }
}

struct EngineIo {
    child: Option<Child>,
    stdin: Box<dyn Write + Send>,
    lines: Receiver<String>,
}

pub struct EngineClient {
    state: EngineState,
    io: Option<EngineIo>,
    size: BoardSize,
    search_timeout: Option<Duration>,
}

impl EngineClient {
    /// `size` bounds the slider ranges sent when registering custom pieces.
    pub fn new(size: BoardSize) -> Self {
        Self {
            state: EngineState::NotStarted,
            io: None,
            size,
            search_timeout: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// Spawns the engine and runs the `uci` / `isready` handshake.
    ///
    /// # Errors
    /// Returns `Error::Protocol` if the process cannot be spawned, or if it
    /// exits or stays silent before answering `readyok`.
    pub fn start(&mut self, launch: &EngineLaunch) -> Result<()> {
        if self.is_ready() {
            return Err(Error::Protocol("engine is already running".to_string()));
        }

        info!("Starting engine process: {:?} {:?}", launch.executable, launch.args);
        let mut command = Command::new(&launch.executable);
        command
            .args(&launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let working_dir = launch.working_dir.clone().or_else(|| {
            launch
                .executable
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(PathBuf::from)
        });
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            Error::Protocol(format!("failed to start engine {:?}: {}", launch.executable, e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Protocol("engine has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Protocol("engine has no stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(BufReader::new(stderr));
        }

        let lines = spawn_line_reader(BufReader::new(stdout))?;
        self.io = Some(EngineIo {
            child: Some(child),
            stdin: Box::new(stdin),
            lines,
        });
        self.search_timeout = launch.search_timeout;
        self.handshake(launch.variant.as_deref(), launch.handshake_timeout)
    }

    /// Runs the handshake over already-open streams instead of a child
    /// process. Used for in-process engines and tests.
    pub fn attach<R, W>(
        &mut self,
        reader: R,
        writer: W,
        variant: Option<&str>,
        handshake_timeout: Duration,
    ) -> Result<()>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        if self.is_ready() {
            return Err(Error::Protocol("engine is already running".to_string()));
        }
        self.io = Some(EngineIo {
            child: None,
            stdin: Box::new(writer),
            lines: spawn_line_reader(reader)?,
        });
        self.handshake(variant, handshake_timeout)
    }

    pub fn set_search_timeout(&mut self, timeout: Option<Duration>) {
        self.search_timeout = timeout;
    }

    fn handshake(&mut self, variant: Option<&str>, timeout: Duration) -> Result<()> {
        match self.await_ready(timeout) {
            Ok(()) => {
                self.state = EngineState::Ready;
            }
            Err(e) => {
                error!("Engine handshake failed: {}", e);
                self.release();
                return Err(e);
            }
        }

        if let Some(variant) = variant {
            self.send_command(&format!("setoption name UCI_Variant value {}", variant))?;
        }
        info!("Engine ready{}", variant.map(|v| format!(" (variant {})", v)).unwrap_or_default());
        Ok(())
    }

    fn await_ready(&mut self, timeout: Duration) -> Result<()> {
        self.write_line("uci")?;
        self.write_line("isready")?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.recv_line(Some(remaining)) {
                LineResult::Line(line) if line.contains("readyok") => return Ok(()),
                LineResult::Line(_) => continue,
                LineResult::Closed => {
                    return Err(Error::Protocol("engine closed before sending readyok".to_string()))
                }
                LineResult::TimedOut => {
                    return Err(Error::Protocol("engine did not answer isready in time".to_string()))
                }
            }
        }
    }

    /// Writes one command line and flushes it. Nothing is awaited.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::Protocol(format!("engine not ready, dropped command {:?}", command)));
        }
        self.write_line(command)
    }

    fn write_line(&mut self, command: &str) -> Result<()> {
        let io = self
            .io
            .as_mut()
            .ok_or_else(|| Error::Protocol("engine is not running".to_string()))?;
        debug!("[engine-stdin] {}", command);
        writeln!(io.stdin, "{}", command)?;
        io.stdin.flush()?;
        Ok(())
    }

    fn recv_line(&mut self, timeout: Option<Duration>) -> LineResult {
        let Some(io) = self.io.as_ref() else {
            return LineResult::Closed;
        };
        match timeout {
            Some(timeout) => match io.lines.recv_timeout(timeout) {
                Ok(line) => LineResult::Line(line),
                Err(RecvTimeoutError::Timeout) => LineResult::TimedOut,
                Err(RecvTimeoutError::Disconnected) => LineResult::Closed,
            },
            None => match io.lines.recv() {
                Ok(line) => LineResult::Line(line),
                Err(_) => LineResult::Closed,
            },
        }
    }

    /// Asks the engine for its best move in `fen` with `color` to move.
    ///
    /// Returns `None` if the engine is not running, the stream closes before a
    /// `bestmove` line arrives, or the search times out. The last two also
    /// stop the client, since a running search cannot be cancelled otherwise.
    pub fn get_best_move(&mut self, fen: &str, depth: u32, color: Color) -> Option<String> {
        if fen.trim().is_empty() {
            error!("FEN is empty");
            return None;
        }
        if !self.is_ready() {
            warn!("engine not ready, cannot search {}", fen);
            return None;
        }

        let fen = set_turn(fen, color);
        let sent = self
            .send_command(&format!("position fen {}", fen))
            .and_then(|_| self.send_command(&format!("go depth {}", depth)));
        if let Err(e) = sent {
            error!("failed to send search to engine, stopping engine: {}", e);
            self.shutdown();
            return None;
        }

        loop {
            match self.recv_line(self.search_timeout) {
                LineResult::Line(line) if line.starts_with("bestmove") => {
                    return line.split_whitespace().nth(1).map(str::to_string);
                }
                LineResult::Line(_) => continue,
                LineResult::Closed => {
                    warn!("engine output closed before bestmove, stopping engine");
                    self.shutdown();
                    return None;
                }
                LineResult::TimedOut => {
                    warn!("engine search timed out, stopping engine");
                    self.shutdown();
                    return None;
                }
            }
        }
    }

    /// Sends one custom piece definition to the engine.
    pub fn register_custom_piece(&mut self, definition: &PieceDefinition) -> Result<()> {
        let descriptor = piece_descriptor(definition, self.size);
        self.send_command(&format!(
            "setoption name CustomPiece value {}={}",
            definition.symbol(),
            descriptor
        ))?;
        info!("Registered custom piece {} = {}", definition, descriptor);
        Ok(())
    }

    /// Registers every non-standard piece of `catalog`. Returns how many
    /// were sent.
    pub fn register_custom_pieces(&mut self, catalog: &PieceCatalog) -> Result<usize> {
        let mut registered = 0;
        for definition in catalog.custom_pieces() {
            self.register_custom_piece(definition)?;
            registered += 1;
        }
        if registered == 0 {
            debug!("no custom pieces to register");
        }
        Ok(registered)
    }

    /// Sends `quit` and releases the process. A no-op on a client that was
    /// never started or is already stopped.
    pub fn shutdown(&mut self) {
        if self.io.is_none() {
            return;
        }
        if let Err(e) = self.write_line("quit") {
            warn!("Failed to send quit command to engine: {}", e);
        }
        self.release();
        self.state = EngineState::Stopped;
    }

    fn release(&mut self) {
        let Some(io) = self.io.take() else {
            return;
        };
        let EngineIo { child, stdin, lines } = io;
        drop(stdin);
        drop(lines);

        let Some(mut child) = child else {
            return;
        };
        let deadline = Instant::now() + QUIT_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!("Engine process exited with status: {}", status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(QUIT_POLL),
                Ok(None) => break,
                Err(e) => {
                    warn!("Error waiting for engine process: {}", e);
                    break;
                }
            }
        }

        warn!("Engine did not exit gracefully, force-killing");
        if let Err(e) = child.kill() {
            warn!("Failed to kill engine process: {}", e);
        }
        match child.wait() {
            Ok(status) => info!("Engine process exited with status: {}", status),
            Err(e) => warn!("Failed to reap engine process: {}", e),
        }
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl MoveOracle for EngineClient {
    fn best_move(&mut self, fen: &str, depth: u32, color: Color) -> Option<String> {
        self.get_best_move(fen, depth, color)
    }

    fn is_ready(&self) -> bool {
        EngineClient::is_ready(self)
    }

    fn shutdown(&mut self) {
        EngineClient::shutdown(self);
    }
}

enum LineResult {
    Line(String),
    Closed,
    TimedOut,
}

fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("engine-stdout".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                trace!("[engine-stdout] {}", line);
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

// Drain stderr to avoid deadlocks when the pipe buffer fills up
fn drain_stderr<R: BufRead + Send + 'static>(reader: R) {
    let spawned = thread::Builder::new()
        .name("engine-stderr".to_string())
        .spawn(move || {
            for line in reader.lines().map_while(|line| line.ok()) {
                warn!("[engine-stderr] {}", line);
            }
        });
    if let Err(e) = spawned {
        warn!("could not watch engine stderr: {}", e);
    }
}

/// Movement descriptor sent with `CustomPiece`: `|`-separated `file,rank`
/// offsets followed by `:<value>`. Sliders list every distance up to the
/// longest ray the board allows.
pub fn piece_descriptor(definition: &PieceDefinition, size: BoardSize) -> String {
    let mut moves = Vec::new();
    let movement = definition.movement;

    if movement.contains(Movement::ROOK) {
        for dist in 1..=size.orthogonal_reach() {
            for &(df, dr) in &ROOK_DIRECTIONS {
                moves.push(format!("{},{}", df * dist, dr * dist));
            }
        }
    }
    if movement.contains(Movement::BISHOP) {
        for dist in 1..=size.diagonal_reach() {
            for &(df, dr) in &BISHOP_DIRECTIONS {
                moves.push(format!("{},{}", df * dist, dr * dist));
            }
        }
    }
    if movement.contains(Movement::KNIGHT) {
        moves.extend(KNIGHT_OFFSETS.iter().map(|(df, dr)| format!("{},{}", df, dr)));
    }
    if movement.contains(Movement::PAWN) {
        moves.extend(["0,1", "1,1", "-1,1"].map(String::from));
    }
    if movement.contains(Movement::KING) {
        moves.extend(KING_OFFSETS.iter().map(|(df, dr)| format!("{},{}", df, dr)));
    }

    if moves.is_empty() {
        warn!("{} has no movement, registering a single forward step", definition);
        moves.push("0,1".to_string());
    }

    format!("{}:{}", moves.join("|"), definition.value)
}
