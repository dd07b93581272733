//! FEN dialect with a bracketed pocket field, plus square, move and drop
//! notation.
//!
//! A full position reads `<ranks>[pocket] <turn> - - 0 1`. Ranks run from
//! the top of the board down, empty runs are written as decimal counts, and
//! the pocket lists White's pieces in uppercase followed by Black's in
//! lowercase.

use crate::board::{Board, BoardSize, Color, Coord, Pocket};
use crate::error::{Error, Result};
use crate::pieces::PieceCatalog;

/// Fields appended after the turn token when a FEN is completed.
pub const TRAILER: &str = "- - 0 1";

/// One cell of a decoded board field: the coloured symbol, or `None` when empty.
pub type SymbolGrid = Vec<Vec<Option<char>>>;

/// Dimension-aware codec. Every square it reads or writes is checked against
/// the board size it was built for.
#[derive(Debug, Clone, Copy)]
pub struct Notation {
    size: BoardSize,
}

impl Notation {
    pub fn new(size: BoardSize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> BoardSize {
        self.size
    }

    /// Complete FEN for `board` with `turn` to move.
    pub fn encode(&self, board: &Board, pocket: &Pocket, turn: Color) -> String {
        let mut fen = self.board_field(board);
        let pocket = pocket_field(pocket);
        if !pocket.is_empty() {
            fen.push('[');
            fen.push_str(&pocket);
            fen.push(']');
        }
        set_turn(&fen, turn)
    }

    pub fn board_field(&self, board: &Board) -> String {
        let mut grid = vec![vec![None; self.size.width() as usize]; self.size.height() as usize];
        for piece in board.pieces() {
            let coord = piece.coord();
            if self.size.contains(coord) {
                grid[coord.rank as usize][coord.file as usize] = Some(piece.fen_symbol());
            }
        }
        self.grid_to_field(&grid)
    }

    /// Writes a grid indexed `[rank][file]` (rank 0 at the bottom) as a
    /// board field.
    pub fn grid_to_field(&self, grid: &SymbolGrid) -> String {
        let mut ranks = Vec::with_capacity(grid.len());
        for row in grid.iter().rev() {
            let mut rank = String::new();
            let mut empty = 0;
            for cell in row {
                match cell {
                    Some(symbol) => {
                        if empty > 0 {
                            rank.push_str(&empty.to_string());
                            empty = 0;
                        }
                        rank.push(*symbol);
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                rank.push_str(&empty.to_string());
            }
            ranks.push(rank);
        }
        ranks.join("/")
    }

    /// Decodes the board field of `fen` into a grid indexed `[rank][file]`,
    /// rank 0 being the bottom rank. Pocket and trailing fields are ignored.
    pub fn decode(&self, fen: &str) -> Result<SymbolGrid> {
        let field = board_part(fen);
        let ranks: Vec<&str> = field.split('/').collect();
        if ranks.len() != self.size.height() as usize {
            return Err(Error::format(fen, "wrong number of ranks"));
        }

        let width = self.size.width() as usize;
        let mut grid = vec![vec![None; width]; ranks.len()];
        for (i, rank) in ranks.iter().enumerate() {
            let row = &mut grid[ranks.len() - 1 - i];
            let mut file = 0usize;
            let mut run = 0usize;
            for c in rank.chars() {
                if let Some(digit) = c.to_digit(10) {
                    run = run
                        .checked_mul(10)
                        .and_then(|run| run.checked_add(digit as usize))
                        .filter(|run| file + run <= width)
                        .ok_or_else(|| Error::format(fen, "rank is wider than the board"))?;
                    continue;
                }
                file += run;
                run = 0;
                if !c.is_ascii_alphabetic() {
                    return Err(Error::format(fen, "unexpected character in board field"));
                }
                if file >= width {
                    return Err(Error::format(fen, "rank is wider than the board"));
                }
                row[file] = Some(c);
                file += 1;
            }
            file += run;
            if file != width {
                return Err(Error::format(fen, "rank does not match the board width"));
            }
        }
        Ok(grid)
    }

    /// Builds a board from the board field of `fen`, resolving symbols
    /// through `catalog`. Uppercase symbols are White.
    pub fn board_from_fen(&self, fen: &str, catalog: &PieceCatalog) -> Result<Board> {
        let grid = self.decode(fen)?;
        let mut board = Board::new(self.size);
        for (rank, row) in grid.iter().enumerate() {
            for (file, cell) in row.iter().enumerate() {
                if let Some(symbol) = *cell {
                    let definition = catalog.get(symbol).ok_or(Error::UnknownPiece(symbol))?;
                    board.place(
                        definition,
                        Coord::new(file as i32, rank as i32),
                        color_of(symbol),
                    )?;
                }
            }
        }
        Ok(board)
    }

    /// Reads the bracketed pocket field of `fen`, if any.
    pub fn parse_pocket(&self, fen: &str, catalog: &PieceCatalog) -> Result<Pocket> {
        let mut pocket = Pocket::new();
        for symbol in pocket_part(fen)?.chars() {
            let definition = catalog.get(symbol).ok_or(Error::UnknownPiece(symbol))?;
            pocket.add(color_of(symbol), definition);
        }
        Ok(pocket)
    }

    pub fn format_square(&self, coord: Coord) -> Result<String> {
        self.size.check(coord)?;
        let file = (b'a' + coord.file as u8) as char;
        let rank = (b'1' + coord.rank as u8) as char;
        Ok(format!("{}{}", file, rank))
    }

    pub fn parse_square(&self, square: &str) -> Result<Coord> {
        let chars: Vec<char> = square.chars().collect();
        let [file, rank] = chars[..] else {
            return Err(Error::format(square, "square must be two characters"));
        };
        if !file.is_ascii_lowercase() || !rank.is_ascii_digit() {
            return Err(Error::format(square, "square must be a file letter and a rank digit"));
        }

        let coord = Coord::new(file as i32 - 'a' as i32, rank as i32 - '1' as i32);
        self.size.check(coord)?;
        Ok(coord)
    }

    /// Parses `<from><to>` coordinate notation such as `e2e4`. Anything after
    /// the fourth character (a promotion suffix) is ignored.
    pub fn parse_move(&self, notation: &str) -> Result<(Coord, Coord)> {
        let chars: Vec<char> = notation.chars().collect();
        if chars.len() < 4 {
            return Err(Error::format(notation, "move must be at least four characters"));
        }

        let from: String = chars[0..2].iter().collect();
        let to: String = chars[2..4].iter().collect();
        let from = self
            .parse_square(&from)
            .map_err(|_| Error::format(notation, "invalid from-square"))?;
        let to = self
            .parse_square(&to)
            .map_err(|_| Error::format(notation, "invalid to-square"))?;
        Ok((from, to))
    }

    pub fn format_move(&self, from: Coord, to: Coord) -> Result<String> {
        Ok(format!("{}{}", self.format_square(from)?, self.format_square(to)?))
    }

    pub fn is_drop_notation(&self, notation: &str) -> bool {
        notation.contains('@')
    }

    /// Parses drop notation such as `P@e4`.
    pub fn parse_drop(&self, notation: &str) -> Result<(char, Coord)> {
        let parts: Vec<&str> = notation.split('@').collect();
        let [symbol, square] = parts[..] else {
            return Err(Error::format(notation, "drop must be <symbol>@<square>"));
        };

        let mut symbol_chars = symbol.trim().chars();
        let (Some(symbol), None) = (symbol_chars.next(), symbol_chars.next()) else {
            return Err(Error::format(notation, "drop symbol must be one character"));
        };
        let to = self
            .parse_square(square.trim())
            .map_err(|_| Error::format(notation, "invalid drop square"))?;
        Ok((symbol, to))
    }

    /// FEN after `mover` plays `notation` on `fen`, with the other side to
    /// move. Only piece placement (and the pocket, for drops) changes; the
    /// castling and counter fields are carried over.
    ///
    /// # Errors
    /// `Error::Occupied` for a drop onto a piece or a move onto a piece of
    /// the same colour.
    pub fn fen_after_move(&self, fen: &str, notation: &str, mover: Color) -> Result<String> {
        let mut grid = self.decode(fen)?;
        let mut pocket: String = pocket_part(fen)?.to_string();

        if self.is_drop_notation(notation) {
            let (symbol, to) = self.parse_drop(notation)?;
            let symbol = match mover {
                Color::White => symbol.to_ascii_uppercase(),
                Color::Black => symbol.to_ascii_lowercase(),
            };
            let target = &mut grid[to.rank as usize][to.file as usize];
            if target.is_some() {
                return Err(Error::Occupied(to));
            }
            let index = pocket.find(symbol).ok_or(Error::NotInPocket(symbol))?;
            pocket.remove(index);
            *target = Some(symbol);
        } else {
            let (from, to) = self.parse_move(notation)?;
            if from == to {
                return Err(Error::IllegalMove { from, to });
            }
            let moving = grid[from.rank as usize][from.file as usize]
                .take()
                .ok_or(Error::EmptySquare(from))?;
            let target = &mut grid[to.rank as usize][to.file as usize];
            if matches!(*target, Some(occupant) if color_of(occupant) == color_of(moving)) {
                return Err(Error::Occupied(to));
            }
            *target = Some(moving);
        }

        let fields: Vec<&str> = fen.split_whitespace().collect();
        let castling = fields.get(2).copied().unwrap_or("-");
        let halfmove = fields.get(4).copied().unwrap_or("0");
        let fullmove = fields.get(5).copied().unwrap_or("1");

        let mut next = self.grid_to_field(&grid);
        if !pocket.is_empty() {
            next.push_str(&format!("[{}]", pocket));
        }
        Ok(format!(
            "{} {} {} - {} {}",
            next,
            mover.opposite().fen_char(),
            castling,
            halfmove,
            fullmove
        ))
    }
}

/// Pocket contents without brackets: White's symbols uppercased, then
/// Black's lowercased, each in the order they were added.
pub fn pocket_field(pocket: &Pocket) -> String {
    let white = pocket
        .pieces(Color::White)
        .iter()
        .map(|p| p.symbol().to_ascii_uppercase());
    let black = pocket
        .pieces(Color::Black)
        .iter()
        .map(|p| p.symbol().to_ascii_lowercase());
    white.chain(black).collect()
}

/// Forces the turn field of `fen` to `color`.
///
/// A bare board field gets the whole trailer appended; otherwise only the
/// turn token is replaced and every other field is kept as written.
pub fn set_turn(fen: &str, color: Color) -> String {
    let fen = fen.trim_end();
    if fen.is_empty() {
        return String::new();
    }

    let turn = color.fen_char().to_string();
    let mut parts: Vec<&str> = fen.split_whitespace().collect();
    if parts.len() == 1 {
        return format!("{} {} {}", parts[0], turn, TRAILER);
    }
    parts[1] = &turn;
    parts.join(" ")
}

fn color_of(symbol: char) -> Color {
    if symbol.is_ascii_uppercase() {
        Color::White
    } else {
        Color::Black
    }
}

fn board_part(fen: &str) -> &str {
    let field = fen.split_whitespace().next().unwrap_or("");
    match field.find('[') {
        Some(index) => &field[..index],
        None => field,
    }
}

fn pocket_part(fen: &str) -> Result<&str> {
    let field = fen.split_whitespace().next().unwrap_or("");
    let Some(open) = field.find('[') else {
        return Ok("");
    };
    let close = field[open..]
        .find(']')
        .ok_or_else(|| Error::format(fen, "unterminated pocket field"))?;
    Ok(&field[open + 1..open + close])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn standard() -> Notation {
        Notation::new(BoardSize::default())
    }

    #[test]
    fn test_encode_lone_king() {
        let catalog = PieceCatalog::standard();
        let mut board = Board::new(BoardSize::default());
        board
            .place(catalog.get('K').unwrap(), Coord::new(4, 0), Color::White)
            .unwrap();

        assert_eq!(
            standard().encode(&board, &Pocket::new(), Color::White),
            "8/8/8/8/8/8/8/4K3 w - - 0 1"
        );
    }

    #[test]
    fn test_encode_with_pocket() {
        let catalog = PieceCatalog::standard();
        let mut board = Board::new(BoardSize::default());
        board
            .place(catalog.get('k').unwrap(), Coord::new(4, 7), Color::Black)
            .unwrap();
        let mut pocket = Pocket::new();
        pocket.add(Color::Black, catalog.get('n').unwrap());
        pocket.add(Color::White, catalog.get('Q').unwrap());
        pocket.add(Color::White, catalog.get('p').unwrap());

        assert_eq!(
            standard().encode(&board, &pocket, Color::Black),
            "4k3/8/8/8/8/8/8/8[QPn] b - - 0 1"
        );
    }

    #[test]
    fn test_start_position_round_trip() {
        let catalog = PieceCatalog::standard();
        let start = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";
        let notation = standard();

        let board = notation.board_from_fen(start, &catalog).unwrap();
        assert_eq!(board.len(), 32);
        assert_eq!(board.piece_at(Coord::new(4, 0)).unwrap().fen_symbol(), 'K');
        assert_eq!(board.piece_at(Coord::new(3, 7)).unwrap().fen_symbol(), 'q');
        assert_eq!(notation.board_field(&board), start);

        let grid = notation.decode(start).unwrap();
        assert_eq!(grid[0][0], Some('R'));
        assert_eq!(grid[7][4], Some('k'));
        assert_eq!(grid[3][3], None);
    }

    #[test]
    fn test_random_boards_round_trip() {
        let catalog = PieceCatalog::standard();
        let symbols = ['P', 'N', 'B', 'R', 'Q', 'K'];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let size = BoardSize::new(rng.gen_range(1..=12), rng.gen_range(1..=9)).unwrap();
            let notation = Notation::new(size);
            let mut board = Board::new(size);
            for rank in 0..size.height() {
                for file in 0..size.width() {
                    if rng.gen_bool(0.3) {
                        let symbol = symbols[rng.gen_range(0..symbols.len())];
                        let color = if rng.gen_bool(0.5) { Color::White } else { Color::Black };
                        board
                            .place(catalog.get(symbol).unwrap(), Coord::new(file, rank), color)
                            .unwrap();
                    }
                }
            }

            let grid = notation
                .decode(&notation.encode(&board, &Pocket::new(), Color::White))
                .unwrap();
            for rank in 0..size.height() {
                for file in 0..size.width() {
                    let expected = board.piece_at(Coord::new(file, rank)).map(|p| p.fen_symbol());
                    assert_eq!(grid[rank as usize][file as usize], expected);
                }
            }
        }
    }

    #[test]
    fn test_wide_board_uses_multi_digit_runs() {
        let catalog = PieceCatalog::standard();
        let notation = Notation::new(BoardSize::new(12, 2).unwrap());
        let mut board = Board::new(notation.size());
        board
            .place(catalog.get('R').unwrap(), Coord::new(11, 0), Color::White)
            .unwrap();

        assert_eq!(notation.board_field(&board), "12/11R");
        assert_eq!(notation.decode("12/11R").unwrap()[0][11], Some('R'));
    }

    #[test]
    fn test_decode_rejects_bad_fields() {
        let notation = standard();
        assert!(notation.decode("8/8/8").is_err());
        assert!(notation.decode("9/8/8/8/8/8/8/8").is_err());
        assert!(notation.decode("7/8/8/8/8/8/8/8").is_err());
        assert!(notation.decode("8/8/8/8/8/8/8/7*").is_err());
        assert!(matches!(
            notation.decode("99999999999999999999999/8/8/8/8/8/8/8"),
            Err(Error::Format { reason: "rank is wider than the board", .. })
        ));
        assert!(notation.decode("8/8/8/8/8/8/8/8[Q] w - - 0 1").is_ok());
    }

    #[test]
    fn test_parse_move() {
        let notation = standard();
        assert_eq!(
            notation.parse_move("e2e4").unwrap(),
            (Coord::new(4, 1), Coord::new(4, 3))
        );
        assert_eq!(
            notation.parse_move("a7a8q").unwrap(),
            (Coord::new(0, 6), Coord::new(0, 7))
        );
        assert!(matches!(notation.parse_move("e2e"), Err(Error::Format { .. })));
        assert!(matches!(notation.parse_move("i2e4"), Err(Error::Format { .. })));
        assert!(matches!(notation.parse_move("e2e9"), Err(Error::Format { .. })));
        assert!(Notation::new(BoardSize::new(5, 5).unwrap()).parse_move("e2f3").is_err());
    }

    #[test]
    fn test_parse_drop() {
        let notation = standard();
        assert!(notation.is_drop_notation("P@e4"));
        assert!(!notation.is_drop_notation("e2e4"));
        assert_eq!(notation.parse_drop("P@e4").unwrap(), ('P', Coord::new(4, 3)));
        assert_eq!(notation.parse_drop("n@a1").unwrap(), ('n', Coord::new(0, 0)));
        assert!(notation.parse_drop("Pe4").is_err());
        assert!(notation.parse_drop("PN@e4").is_err());
        assert!(notation.parse_drop("@e4").is_err());
        assert!(notation.parse_drop("P@z9").is_err());
        assert!(notation.parse_drop("P@e4@e5").is_err());
    }

    #[test]
    fn test_square_bijection() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let size = BoardSize::new(rng.gen_range(1..=26), rng.gen_range(1..=9)).unwrap();
            let notation = Notation::new(size);
            for rank in 0..size.height() {
                for file in 0..size.width() {
                    let coord = Coord::new(file, rank);
                    let square = notation.format_square(coord).unwrap();
                    assert_eq!(notation.parse_square(&square).unwrap(), coord);
                }
            }
            assert!(matches!(
                notation.format_square(Coord::new(size.width(), 0)),
                Err(Error::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_square_range_errors() {
        let notation = Notation::new(BoardSize::new(6, 6).unwrap());
        assert!(matches!(notation.parse_square("g1"), Err(Error::OutOfRange { .. })));
        assert!(matches!(notation.parse_square("a7"), Err(Error::OutOfRange { .. })));
        assert!(matches!(notation.parse_square("a0"), Err(Error::OutOfRange { .. })));
        assert!(matches!(notation.parse_square("A1"), Err(Error::Format { .. })));
        assert!(matches!(notation.parse_square("a"), Err(Error::Format { .. })));
        assert!(matches!(
            notation.format_square(Coord::new(-1, 0)),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_set_turn_shapes() {
        assert_eq!(set_turn("8/8/8/8/8/8/8/4K3", Color::Black), "8/8/8/8/8/8/8/4K3 b - - 0 1");
        assert_eq!(set_turn("8/8/8/8/8/8/8/4K3 w", Color::Black), "8/8/8/8/8/8/8/4K3 b");
        assert_eq!(
            set_turn("4k3/8/8/8/8/8/8/4K3[Qq] w KQkq e3 12 40", Color::Black),
            "4k3/8/8/8/8/8/8/4K3[Qq] b KQkq e3 12 40"
        );
        assert_eq!(set_turn("", Color::White), "");
        assert_eq!(set_turn("4k3/8/8/8/8/8/8/4K3  w", Color::Black), "4k3/8/8/8/8/8/8/4K3 b");
        assert_eq!(set_turn(" 8/8/8/8/8/8/8/4K3", Color::White), "8/8/8/8/8/8/8/4K3 w - - 0 1");
    }

    #[test]
    fn test_fen_after_move() {
        let notation = standard();
        let fen = "4k3/8/8/8/8/8/4P3/4K3[Nn] w - - 3 10";

        assert_eq!(
            notation.fen_after_move(fen, "e2e4", Color::White).unwrap(),
            "4k3/8/8/8/4P3/8/8/4K3[Nn] b - - 3 10"
        );
        assert_eq!(
            notation.fen_after_move(fen, "n@e5", Color::Black).unwrap(),
            "4k3/8/8/4n3/8/8/4P3/4K3[N] w - - 3 10"
        );
        assert!(notation.fen_after_move(fen, "a1a2", Color::White).is_err());
        assert!(notation.fen_after_move(fen, "Q@a1", Color::White).is_err());
    }

    #[test]
    fn test_fen_after_move_keeps_occupants() {
        let notation = standard();
        let fen = "4k3/8/8/8/8/8/4P3/4K3[Nn] w - - 0 1";

        assert!(matches!(
            notation.fen_after_move(fen, "N@e2", Color::White),
            Err(Error::Occupied(_))
        ));
        assert!(matches!(
            notation.fen_after_move(fen, "e1e2", Color::White),
            Err(Error::Occupied(_))
        ));
        assert_eq!(
            notation.fen_after_move(fen, "e8e2", Color::Black).unwrap(),
            "8/8/8/8/8/8/4k3/4K3[Nn] w - - 0 1"
        );
    }
}
