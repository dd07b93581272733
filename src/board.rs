use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::pieces::PieceDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Rank direction pawns of this colour advance in.
    pub fn forward(&self) -> i32 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    pub fn fen_char(&self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Color::White => write!(f, "White"),
            Color::Black => write!(f, "Black"),
        }
    }
}

/// Zero-based (file, rank) pair. `a1` is (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub file: i32,
    pub rank: i32,
}

impl Coord {
    pub const fn new(file: i32, rank: i32) -> Self {
        Self { file, rank }
    }

    pub fn offset(&self, df: i32, dr: i32) -> Coord {
        Coord::new(self.file + df, self.rank + dr)
    }

    /// Chebyshev distance.
    pub fn distance(&self, other: Coord) -> i32 {
        (self.file - other.file)
            .abs()
            .max((self.rank - other.rank).abs())
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if (0..26).contains(&self.file) && self.rank >= 0 {
            write!(f, "{}{}", (b'a' + self.file as u8) as char, self.rank + 1)
        } else {
            write!(f, "({}, {})", self.file, self.rank)
        }
    }
}

/// Files are lettered `a..=z` and ranks are single digits, so every square
/// name is exactly two characters.
pub const MAX_WIDTH: i32 = 26;
pub const MAX_HEIGHT: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardSize {
    width: i32,
    height: i32,
}

impl BoardSize {
    /// # Errors
    /// `Error::InvalidSize` unless `1 <= width <= 26` and `1 <= height <= 9`.
    pub fn new(width: i32, height: i32) -> Result<Self> {
        if !(1..=MAX_WIDTH).contains(&width) || !(1..=MAX_HEIGHT).contains(&height) {
            return Err(Error::InvalidSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.file >= 0 && coord.file < self.width && coord.rank >= 0 && coord.rank < self.height
    }

    pub fn check(&self, coord: Coord) -> Result<()> {
        if self.contains(coord) {
            Ok(())
        } else {
            Err(Error::OutOfRange { coord, size: *self })
        }
    }

    /// Longest orthogonal ray on this board.
    pub fn orthogonal_reach(&self) -> i32 {
        self.width.max(self.height) - 1
    }

    /// Longest diagonal ray on this board.
    pub fn diagonal_reach(&self) -> i32 {
        self.width.min(self.height) - 1
    }
}

impl Default for BoardSize {
    fn default() -> Self {
        Self {
            width: 8,
            height: 8,
        }
    }
}

impl fmt::Display for BoardSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A piece deployed on the board. Only the board mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedPiece {
    id: u32,
    definition: Arc<PieceDefinition>,
    coord: Coord,
    color: Color,
    move_count: u32,
}

impl PlacedPiece {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn definition(&self) -> &PieceDefinition {
        &self.definition
    }

    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn move_count(&self) -> u32 {
        self.move_count
    }

    pub fn is_king(&self) -> bool {
        self.definition.is_king
    }

    /// Notation symbol: uppercase for White, lowercase for Black.
    pub fn fen_symbol(&self) -> char {
        match self.color {
            Color::White => self.definition.symbol().to_ascii_uppercase(),
            Color::Black => self.definition.symbol().to_ascii_lowercase(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Board {
    size: BoardSize,
    pieces: BTreeMap<Coord, PlacedPiece>,
    next_id: u32,
}

impl Board {
    pub fn new(size: BoardSize) -> Self {
        Self {
            size,
            pieces: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn size(&self) -> BoardSize {
        self.size
    }

    pub fn piece_at(&self, coord: Coord) -> Option<&PlacedPiece> {
        if !self.size.contains(coord) {
            return None;
        }
        self.pieces.get(&coord)
    }

    pub fn is_empty_at(&self, coord: Coord) -> bool {
        self.piece_at(coord).is_none()
    }

    pub fn pieces(&self) -> impl Iterator<Item = &PlacedPiece> {
        self.pieces.values()
    }

    pub fn pieces_of(&self, color: Color) -> impl Iterator<Item = &PlacedPiece> {
        self.pieces.values().filter(move |p| p.color == color)
    }

    pub fn find_king(&self, color: Color) -> Option<&PlacedPiece> {
        self.pieces_of(color).find(|p| p.is_king())
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn place(
        &mut self,
        definition: Arc<PieceDefinition>,
        coord: Coord,
        color: Color,
    ) -> Result<&PlacedPiece> {
        self.size.check(coord)?;
        if self.pieces.contains_key(&coord) {
            return Err(Error::Occupied(coord));
        }

        let id = self.next_id;
        self.next_id += 1;
        debug!("placing {} {} on {}", color, definition, coord);
        let piece = PlacedPiece {
            id,
            definition,
            coord,
            color,
            move_count: 0,
        };
        let placed = self.pieces.entry(coord).or_insert(piece);
        Ok(&*placed)
    }

    pub fn remove(&mut self, coord: Coord) -> Result<PlacedPiece> {
        self.size.check(coord)?;
        let piece = self.pieces.remove(&coord).ok_or(Error::EmptySquare(coord))?;
        debug!("removed {} {} from {}", piece.color, piece.definition, coord);
        Ok(piece)
    }

    /// Moves the piece on `from` to `to`, removing whatever stood on `to`
    /// first. Returns the captured piece, if any.
    pub fn move_piece(&mut self, from: Coord, to: Coord) -> Result<Option<PlacedPiece>> {
        self.size.check(from)?;
        self.size.check(to)?;
        if from == to {
            return Err(Error::IllegalMove { from, to });
        }
        let mut piece = self.pieces.remove(&from).ok_or(Error::EmptySquare(from))?;

        let captured = self.pieces.remove(&to);
        piece.coord = to;
        piece.move_count += 1;
        debug!("moved {} {} from {} to {}", piece.color, piece.definition, from, to);
        self.pieces.insert(to, piece);
        Ok(captured)
    }

    pub fn clear(&mut self) {
        self.pieces.clear();
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut result = String::new();
        for rank in (0..self.size.height()).rev() {
            for file in 0..self.size.width() {
                match self.pieces.get(&Coord::new(file, rank)) {
                    Some(piece) => result.push(piece.fen_symbol()),
                    None => result.push('.'),
                }
                if file < self.size.width() - 1 {
                    result.push(' ');
                }
            }
            result.push('\n');
        }
        write!(f, "{}", result)
    }
}

/// Per-colour reserve of pieces that can be dropped onto empty squares.
#[derive(Debug, Clone, Default)]
pub struct Pocket {
    white: Vec<Arc<PieceDefinition>>,
    black: Vec<Arc<PieceDefinition>>,
}

impl Pocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, color: Color, definition: Arc<PieceDefinition>) {
        self.side_mut(color).push(definition);
    }

    /// Removes one piece with the given symbol (case-insensitive).
    pub fn take(&mut self, color: Color, symbol: char) -> Option<Arc<PieceDefinition>> {
        let symbol = symbol.to_ascii_uppercase();
        let side = self.side_mut(color);
        let index = side.iter().position(|p| p.symbol() == symbol)?;
        Some(side.remove(index))
    }

    pub fn pieces(&self, color: Color) -> &[Arc<PieceDefinition>] {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.white.is_empty() && self.black.is_empty()
    }

    fn side_mut(&mut self, color: Color) -> &mut Vec<Arc<PieceDefinition>> {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }
}
