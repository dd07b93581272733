//! Variant rule file handed to the engine at startup.
//!
//! The file declares one `customPieceN = <symbol>:<value>:<letters>` line per
//! custom piece under a section named after the variant.

use std::fmt;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::Result;
use crate::pieces::PieceCatalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomPieceLine {
    pub symbol: char,
    pub value: i32,
    pub letters: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantFile {
    name: String,
    pieces: Vec<CustomPieceLine>,
}

impl VariantFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pieces: Vec::new(),
        }
    }

    /// Collects every custom piece of `catalog`, in registration order.
    pub fn from_catalog(name: impl Into<String>, catalog: &PieceCatalog) -> Self {
        let mut file = Self::new(name);
        for definition in catalog.custom_pieces() {
            file.pieces.push(CustomPieceLine {
                symbol: definition.symbol(),
                value: definition.value,
                letters: definition.movement.letters(),
            });
        }
        file
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pieces(&self) -> &[CustomPieceLine] {
        &self.pieces
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string())?;
        info!(
            "Wrote variant file {:?} with {} custom piece(s)",
            path,
            self.pieces.len()
        );
        Ok(())
    }
}

impl fmt::Display for VariantFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[{}]", self.name)?;
        for (i, piece) in self.pieces.iter().enumerate() {
            writeln!(
                f,
                "customPiece{} = {}:{}:{}",
                i + 1,
                piece.symbol,
                piece.value,
                piece.letters
            )?;
        }
        Ok(())
    }
}
