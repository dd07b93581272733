//! TOML configuration: board, engine, extra pieces and starting pockets.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{BoardSize, Color, Pocket};
use crate::engine::EngineLaunch;
use crate::error::{Error, Result};
use crate::fen::Notation;
use crate::pieces::{Movement, PieceCatalog, PieceDefinition, STANDARD_SYMBOLS};
use crate::validator::DEFAULT_VALIDATION_DEPTH;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_width() -> i32 {
    8
}

fn default_height() -> i32 {
    8
}

fn default_variant() -> String {
    "chesslike".to_string()
}

fn default_validation_depth() -> u32 {
    DEFAULT_VALIDATION_DEPTH
}

fn default_search_depth() -> u32 {
    10
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    #[serde(default)]
    pub pieces: Vec<PieceConfig>,
    #[serde(default)]
    pub pocket: PocketConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoardConfig {
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    /// Board field of a FEN; the board starts empty when absent.
    #[serde(default)]
    pub setup: Option<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            setup: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_variant")]
    pub variant: String,
    /// Regenerated from the piece catalog before the engine starts.
    #[serde(default)]
    pub variant_file: Option<PathBuf>,
    #[serde(default = "default_validation_depth")]
    pub validation_depth: u32,
    #[serde(default = "default_search_depth")]
    pub search_depth: u32,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// 0 waits indefinitely for `bestmove`.
    #[serde(default)]
    pub search_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PieceConfig {
    pub name: String,
    pub symbol: char,
    pub value: i32,
    #[serde(default)]
    pub is_king: bool,
    #[serde(default)]
    pub movement: MovementConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MovementConfig {
    pub rook: bool,
    pub bishop: bool,
    pub knight: bool,
    pub pawn: bool,
    pub king: bool,
}

impl From<MovementConfig> for Movement {
    fn from(config: MovementConfig) -> Self {
        let mut movement = Movement::empty();
        movement.set(Movement::ROOK, config.rook);
        movement.set(Movement::BISHOP, config.bishop);
        movement.set(Movement::KNIGHT, config.knight);
        movement.set(Movement::PAWN, config.pawn);
        movement.set(Movement::KING, config.king);
        movement
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PocketConfig {
    #[serde(default)]
    pub white: Vec<char>,
    #[serde(default)]
    pub black: Vec<char>,
}

impl Config {
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let size = self
            .board_size()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(setup) = &self.board.setup {
            Notation::new(size)
                .decode(setup)
                .map_err(|e| ConfigError::Invalid(format!("board setup: {}", e)))?;
        }

        if let Some(engine) = &self.engine {
            if engine.validation_depth == 0 || engine.search_depth == 0 {
                return Err(ConfigError::Invalid("engine depths must be at least 1".to_string()));
            }
        }

        let known = |symbol: &char| {
            let symbol = symbol.to_ascii_uppercase();
            STANDARD_SYMBOLS.contains(&symbol)
                || self
                    .pieces
                    .iter()
                    .any(|p| p.symbol.to_ascii_uppercase() == symbol)
        };
        if let Some(symbol) = self
            .pocket
            .white
            .iter()
            .chain(&self.pocket.black)
            .find(|s| !known(*s))
        {
            return Err(ConfigError::Invalid(format!(
                "pocket symbol '{}' is not a known piece",
                symbol
            )));
        }
        Ok(())
    }

    pub fn board_size(&self) -> Result<BoardSize> {
        BoardSize::new(self.board.width, self.board.height)
    }

    /// Standard pieces followed by the configured ones. Catalog issues are
    /// logged by the catalog itself and do not fail the build.
    pub fn catalog(&self) -> PieceCatalog {
        let mut catalog = PieceCatalog::standard();
        for piece in &self.pieces {
            let mut definition =
                PieceDefinition::new(piece.name.clone(), piece.symbol, piece.movement.into(), piece.value);
            definition.is_king = piece.is_king;
            catalog.register(definition);
        }
        catalog
    }

    pub fn pocket(&self, catalog: &PieceCatalog) -> Result<Pocket> {
        let mut pocket = Pocket::new();
        for (color, symbols) in [
            (Color::White, &self.pocket.white),
            (Color::Black, &self.pocket.black),
        ] {
            for &symbol in symbols {
                let definition = catalog.get(symbol).ok_or(Error::UnknownPiece(symbol))?;
                pocket.add(color, definition);
            }
        }
        Ok(pocket)
    }

    pub fn engine_launch(&self) -> Option<EngineLaunch> {
        let engine = self.engine.as_ref()?;
        Some(EngineLaunch {
            executable: engine.path.clone(),
            working_dir: engine.working_dir.clone(),
            args: engine.args.clone(),
            variant: Some(engine.variant.clone()),
            handshake_timeout: Duration::from_millis(engine.handshake_timeout_ms),
            search_timeout: match engine.search_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        })
    }
}
