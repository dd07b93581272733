//! Piece types: movement capabilities, definitions and the catalog they are
//! registered in.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use log::error;
use thiserror::Error;

bitflags! {
    /// Movement capabilities. A piece moves as the union of every flag it carries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Movement: u8 {
        const ROOK = 1 << 0;
        const BISHOP = 1 << 1;
        const KNIGHT = 1 << 2;
        const PAWN = 1 << 3;
        const KING = 1 << 4;
    }
}

impl Movement {
    /// Letters used in variant rule files, e.g. `RB` for a queen.
    pub fn letters(&self) -> String {
        let mut letters = String::new();
        for (flag, letter) in [
            (Movement::ROOK, 'R'),
            (Movement::BISHOP, 'B'),
            (Movement::KNIGHT, 'N'),
            (Movement::KING, 'K'),
            (Movement::PAWN, 'P'),
        ] {
            if self.contains(flag) {
                letters.push(letter);
            }
        }
        letters
    }
}

/// Symbols of the orthodox pieces. Anything else is a custom piece as far as
/// the engine is concerned.
pub const STANDARD_SYMBOLS: [char; 6] = ['P', 'N', 'B', 'R', 'Q', 'K'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceDefinition {
    pub name: String,
    symbol: char,
    pub movement: Movement,
    pub value: i32,
    pub is_king: bool,
}

impl PieceDefinition {
    pub fn new(name: impl Into<String>, symbol: char, movement: Movement, value: i32) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.to_ascii_uppercase(),
            movement,
            value,
            is_king: false,
        }
    }

    pub fn king(mut self) -> Self {
        self.is_king = true;
        self
    }

    /// Identity symbol, always uppercase. Colour only shows up in notation.
    pub fn symbol(&self) -> char {
        self.symbol
    }

    pub fn is_standard(&self) -> bool {
        STANDARD_SYMBOLS.contains(&self.symbol)
    }
}

impl fmt::Display for PieceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogIssue {
    #[error("duplicate symbol '{symbol}' used by {first} and {second}")]
    DuplicateSymbol {
        symbol: char,
        first: String,
        second: String,
    },
    #[error("{name} ({symbol}) has no movement capability")]
    NoMovement { name: String, symbol: char },
    #[error("{name} uses '{symbol}', which is not an ASCII letter")]
    InvalidSymbol { name: String, symbol: char },
}

/// Registered piece definitions, kept in registration order.
///
/// Problems found while registering are logged and returned, but the entry is
/// kept so the problem stays visible to whoever loaded it.
#[derive(Debug, Clone, Default)]
pub struct PieceCatalog {
    pieces: Vec<Arc<PieceDefinition>>,
}

impl PieceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut catalog = Self::new();
        for definition in [
            PieceDefinition::new("Pawn", 'P', Movement::PAWN, 1),
            PieceDefinition::new("Knight", 'N', Movement::KNIGHT, 3),
            PieceDefinition::new("Bishop", 'B', Movement::BISHOP, 3),
            PieceDefinition::new("Rook", 'R', Movement::ROOK, 5),
            PieceDefinition::new("Queen", 'Q', Movement::ROOK | Movement::BISHOP, 9),
            PieceDefinition::new("King", 'K', Movement::KING, 0).king(),
        ] {
            catalog.register(definition);
        }
        catalog
    }

    pub fn register(&mut self, definition: PieceDefinition) -> Vec<CatalogIssue> {
        let issues = self.issues_for(&definition, self.pieces.iter());
        for issue in &issues {
            error!("piece catalog: {}", issue);
        }
        self.pieces.push(Arc::new(definition));
        issues
    }

    fn issues_for<'a>(
        &self,
        definition: &PieceDefinition,
        earlier: impl Iterator<Item = &'a Arc<PieceDefinition>>,
    ) -> Vec<CatalogIssue> {
        let mut issues = Vec::new();
        if !definition.symbol.is_ascii_alphabetic() {
            issues.push(CatalogIssue::InvalidSymbol {
                name: definition.name.clone(),
                symbol: definition.symbol,
            });
        }
        if definition.movement.is_empty() {
            issues.push(CatalogIssue::NoMovement {
                name: definition.name.clone(),
                symbol: definition.symbol,
            });
        }
        if let Some(first) = earlier
            .into_iter()
            .find(|p| p.symbol == definition.symbol)
        {
            issues.push(CatalogIssue::DuplicateSymbol {
                symbol: definition.symbol,
                first: first.name.clone(),
                second: definition.name.clone(),
            });
        }
        issues
    }

    /// Re-checks every entry against the ones registered before it.
    pub fn validate(&self) -> Vec<CatalogIssue> {
        self.pieces
            .iter()
            .enumerate()
            .flat_map(|(i, p)| self.issues_for(p, self.pieces[..i].iter()))
            .collect()
    }

    /// Case-insensitive lookup; the first registration wins on duplicates.
    pub fn get(&self, symbol: char) -> Option<Arc<PieceDefinition>> {
        let symbol = symbol.to_ascii_uppercase();
        self.pieces.iter().find(|p| p.symbol == symbol).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PieceDefinition>> {
        self.pieces.iter()
    }

    pub fn custom_pieces(&self) -> impl Iterator<Item = &Arc<PieceDefinition>> {
        let mut seen = HashSet::new();
        self.pieces
            .iter()
            .filter(move |p| !p.is_standard() && seen.insert(p.symbol))
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}
