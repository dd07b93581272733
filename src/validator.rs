//! Position classification: check, checkmate and stalemate.
//!
//! Whether the king is attacked is decided locally from the pieces' attack
//! sets. Whether any legal move exists is left to the engine, since only the
//! engine knows the full rules of the active variant.

use std::fmt;

use log::{error, warn};

use crate::board::{Board, Color, Coord, PlacedPiece, Pocket};
use crate::engine::{MoveOracle, NO_MOVE};
use crate::error::{Error, Result};
use crate::fen::Notation;
use crate::movegen::MoveGenerator;

/// Depth used to ask the engine whether any legal move exists.
pub const DEFAULT_VALIDATION_DEPTH: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChessGameState {
    Normal,
    Check,
    Checkmate,
    Stalemate,
}

impl fmt::Display for ChessGameState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ChessGameState::Normal => "Normal",
            ChessGameState::Check => "Check",
            ChessGameState::Checkmate => "Checkmate",
            ChessGameState::Stalemate => "Stalemate",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub state: ChessGameState,
    /// Enemy pieces attacking the king of the side to move.
    pub attackers: Vec<PlacedPiece>,
}

impl Classification {
    fn normal() -> Self {
        Self {
            state: ChessGameState::Normal,
            attackers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameStateValidator {
    generator: MoveGenerator,
    depth: u32,
}

impl Default for GameStateValidator {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDATION_DEPTH)
    }
}

impl GameStateValidator {
    pub fn new(depth: u32) -> Self {
        Self {
            generator: MoveGenerator::new(),
            depth: depth.max(1),
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Classifies the position for `color` to move.
    ///
    /// Never fails: a missing king, a missing or stopped engine or an empty
    /// FEN all come back as `Normal`, since they usually mean the board is
    /// still being set up.
    pub fn classify(
        &self,
        board: &Board,
        pocket: &Pocket,
        color: Color,
        engine: Option<&mut dyn MoveOracle>,
    ) -> Classification {
        let fen = Notation::new(board.size()).encode(board, pocket, color);
        self.classify_position(board, &fen, color, engine)
    }

    /// Plays `notation` (coordinate or drop notation) for `mover` and
    /// classifies the result for the side that must reply. The engine is
    /// asked about the successor FEN; the caller's board is left as is.
    pub fn classify_after_move(
        &self,
        board: &Board,
        pocket: &Pocket,
        mover: Color,
        notation: &str,
        engine: Option<&mut dyn MoveOracle>,
    ) -> Result<Classification> {
        let codec = Notation::new(board.size());
        let fen = codec.fen_after_move(&codec.encode(board, pocket, mover), notation, mover)?;

        let mut board = board.clone();
        if codec.is_drop_notation(notation) {
            let (symbol, to) = codec.parse_drop(notation)?;
            let definition = pocket
                .clone()
                .take(mover, symbol)
                .ok_or(Error::NotInPocket(symbol))?;
            board.place(definition, to, mover)?;
        } else {
            let (from, to) = codec.parse_move(notation)?;
            board.move_piece(from, to)?;
        }

        Ok(self.classify_position(&board, &fen, mover.opposite(), engine))
    }

    fn classify_position(
        &self,
        board: &Board,
        fen: &str,
        color: Color,
        engine: Option<&mut dyn MoveOracle>,
    ) -> Classification {
        if board.find_king(color).is_none() {
            error!("cannot classify position: {} has no king", color);
            return Classification::normal();
        }
        if fen.is_empty() {
            warn!("cannot classify position: FEN is empty");
            return Classification::normal();
        }

        let Some(engine) = engine else {
            warn!("cannot classify position: no engine available");
            return Classification::normal();
        };
        if !engine.is_ready() {
            warn!("cannot classify position: engine is not running");
            return Classification::normal();
        }

        let best_move = engine.best_move(fen, self.depth, color);
        if best_move.is_none() && !engine.is_ready() {
            warn!("cannot classify position: engine stopped before answering");
            return Classification::normal();
        }
        let has_legal_moves = matches!(best_move.as_deref(), Some(mv) if !mv.is_empty() && mv != NO_MOVE);

        let attackers = self.is_in_check(board, color);
        let state = match (has_legal_moves, attackers.is_empty()) {
            (false, false) => ChessGameState::Checkmate,
            (false, true) => ChessGameState::Stalemate,
            (true, false) => ChessGameState::Check,
            (true, true) => ChessGameState::Normal,
        };

        Classification { state, attackers }
    }

    /// Enemy pieces whose attack set contains the king of `color`. Empty when
    /// there is no such king.
    pub fn is_in_check(&self, board: &Board, color: Color) -> Vec<PlacedPiece> {
        let Some(king) = board.find_king(color) else {
            error!("{} king not found", color);
            return Vec::new();
        };

        board
            .pieces_of(color.opposite())
            .filter(|piece| {
                self.generator
                    .reachable(board, piece)
                    .attacks
                    .contains(&king.coord())
            })
            .cloned()
            .collect()
    }
}

/// King-safety filter for a step of `king` to `target`.
///
/// Unsafe when a non-king enemy piece (other than one standing on `target`,
/// which would be captured) can move to or attack `target`, or when `target`
/// touches the enemy king. Only unfiltered reach sets are consulted, so two
/// kings never evaluate each other recursively.
pub fn is_king_move_safe(
    generator: &MoveGenerator,
    board: &Board,
    king: &PlacedPiece,
    target: Coord,
) -> bool {
    let enemy = king.color().opposite();

    let attacked = board
        .pieces_of(enemy)
        .filter(|piece| piece.id() != king.id() && piece.coord() != target && !piece.is_king())
        .any(|piece| generator.reachable_unfiltered(board, piece).contains(target));
    if attacked {
        return false;
    }

    match board.find_king(enemy) {
        Some(enemy_king) => enemy_king.coord().distance(target) > 1,
        None => true,
    }
}
