use std::collections::BTreeSet;

use crate::board::{Board, Coord, PlacedPiece};
use crate::pieces::Movement;
use crate::validator;

pub const ROOK_DIRECTIONS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
pub const BISHOP_DIRECTIONS: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
pub const KNIGHT_OFFSETS: [(i32, i32); 8] = [
    (1, 2), (2, 1), (2, -1), (1, -2),
    (-1, -2), (-2, -1), (-2, 1), (-1, 2),
];
pub const KING_OFFSETS: [(i32, i32); 8] = [
    (0, 1), (0, -1), (-1, 0), (1, 0),
    (1, 1), (1, -1), (-1, 1), (-1, -1),
];

/// Destinations of a single piece: quiet moves onto empty squares and
/// captures of enemy pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reach {
    pub movable: BTreeSet<Coord>,
    pub attacks: BTreeSet<Coord>,
}

impl Reach {
    pub fn contains(&self, coord: Coord) -> bool {
        self.movable.contains(&coord) || self.attacks.contains(&coord)
    }

    pub fn is_empty(&self) -> bool {
        self.movable.is_empty() && self.attacks.is_empty()
    }
}

enum Target {
    Empty,
    Enemy,
    Blocked,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MoveGenerator;

impl MoveGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Movable and attackable cells for `piece`. King steps only include
    /// destinations that pass the king-safety filter.
    pub fn reachable(&self, board: &Board, piece: &PlacedPiece) -> Reach {
        self.compute(board, piece, true)
    }

    /// Same as [`reachable`](Self::reachable) but without the king-safety
    /// filter. The filter itself is built on this so it never recurses.
    pub fn reachable_unfiltered(&self, board: &Board, piece: &PlacedPiece) -> Reach {
        self.compute(board, piece, false)
    }

    fn compute(&self, board: &Board, piece: &PlacedPiece, king_safety: bool) -> Reach {
        let mut reach = Reach::default();
        let movement = piece.definition().movement;
        let size = board.size();

        if movement.contains(Movement::ROOK) {
            self.slide(board, piece, &ROOK_DIRECTIONS, size.orthogonal_reach(), &mut reach);
        }
        if movement.contains(Movement::BISHOP) {
            self.slide(board, piece, &BISHOP_DIRECTIONS, size.diagonal_reach(), &mut reach);
        }
        if movement.contains(Movement::KNIGHT) {
            for &(df, dr) in &KNIGHT_OFFSETS {
                let next = piece.coord().offset(df, dr);
                match self.target(board, piece, next) {
                    Target::Empty => {
                        reach.movable.insert(next);
                    }
                    Target::Enemy => {
                        reach.attacks.insert(next);
                    }
                    Target::Blocked => {}
                }
            }
        }
        if movement.contains(Movement::PAWN) {
            self.pawn_steps(board, piece, &mut reach);
        }
        if movement.contains(Movement::KING) {
            self.king_steps(board, piece, king_safety, &mut reach);
        }

        reach
    }

    fn target(&self, board: &Board, piece: &PlacedPiece, coord: Coord) -> Target {
        if !board.size().contains(coord) {
            return Target::Blocked;
        }
        match board.piece_at(coord) {
            None => Target::Empty,
            Some(other) if other.color() != piece.color() => Target::Enemy,
            Some(_) => Target::Blocked,
        }
    }

    fn slide(
        &self,
        board: &Board,
        piece: &PlacedPiece,
        directions: &[(i32, i32)],
        max_steps: i32,
        reach: &mut Reach,
    ) {
        let start = piece.coord();
        for &(df, dr) in directions {
            for dist in 1..=max_steps {
                let next = start.offset(df * dist, dr * dist);
                if !board.size().contains(next) {
                    break;
                }
                match board.piece_at(next) {
                    None => {
                        reach.movable.insert(next);
                    }
                    Some(other) => {
                        if other.color() != piece.color() {
                            reach.attacks.insert(next);
                        }
                        // Anything on the ray blocks the rest of it
                        break;
                    }
                }
            }
        }
    }

    fn pawn_steps(&self, board: &Board, piece: &PlacedPiece, reach: &mut Reach) {
        let forward = piece.color().forward();
        let start = piece.coord();

        let single = start.offset(0, forward);
        if board.size().contains(single) && board.is_empty_at(single) {
            reach.movable.insert(single);

            let double = start.offset(0, 2 * forward);
            if piece.move_count() == 0 && board.size().contains(double) && board.is_empty_at(double) {
                reach.movable.insert(double);
            }
        }

        // Diagonals are capture-only
        for df in [-1, 1] {
            let diagonal = start.offset(df, forward);
            if let Target::Enemy = self.target(board, piece, diagonal) {
                reach.attacks.insert(diagonal);
            }
        }
    }

    fn king_steps(&self, board: &Board, piece: &PlacedPiece, king_safety: bool, reach: &mut Reach) {
        for &(df, dr) in &KING_OFFSETS {
            let next = piece.coord().offset(df, dr);
            let set = match self.target(board, piece, next) {
                Target::Empty => &mut reach.movable,
                Target::Enemy => &mut reach.attacks,
                Target::Blocked => continue,
            };
            if !king_safety || validator::is_king_move_safe(self, board, piece, next) {
                set.insert(next);
            }
        }
    }
}
