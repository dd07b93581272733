pub mod board;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod fen;
pub mod game;
pub mod movegen;
pub mod pieces;
pub mod validator;
pub mod variants;

pub use board::{Board, BoardSize, Color, Coord, PlacedPiece, Pocket};
pub use config::{Config, ConfigError};
pub use console::Console;
pub use engine::{piece_descriptor, EngineClient, EngineLaunch, EngineState, MoveOracle, NO_MOVE};
pub use error::{Error, Result};
pub use fen::{set_turn, Notation};
pub use game::{Game, GameEvent, GameState, Outcome};
pub use movegen::{MoveGenerator, Reach};
pub use pieces::{CatalogIssue, Movement, PieceCatalog, PieceDefinition};
pub use validator::{ChessGameState, Classification, GameStateValidator};
pub use variants::VariantFile;
