use thiserror::Error;

use crate::board::{BoardSize, Coord};
use crate::game::GameState;
use crate::pieces::CatalogIssue;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(CatalogIssue),

    #[error("board size {width}x{height} is outside 1x1..=26x9")]
    InvalidSize { width: i32, height: i32 },

    #[error("coordinate {coord} is outside the {size} board")]
    OutOfRange { coord: Coord, size: BoardSize },

    #[error("malformed notation {notation:?}: {reason}")]
    Format { notation: String, reason: &'static str },

    #[error("square {0} is already occupied")]
    Occupied(Coord),

    #[error("no piece on {0}")]
    EmptySquare(Coord),

    #[error("piece on {from} cannot reach {to}")]
    IllegalMove { from: Coord, to: Coord },

    #[error("it is not that side's turn")]
    WrongTurn,

    #[error("no '{0}' left in the pocket")]
    NotInPocket(char),

    #[error("unknown piece symbol '{0}'")]
    UnknownPiece(char),

    #[error("game is not being played (state: {0:?})")]
    GameNotPlaying(GameState),

    #[error("engine protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn format(notation: &str, reason: &'static str) -> Self {
        Error::Format {
            notation: notation.to_string(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
