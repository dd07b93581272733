//! Game session: owns the position, enforces turn order and reports what
//! happened to subscribers.

use std::fmt;

use log::{debug, info, warn};

use crate::board::{Board, Color, Coord, PlacedPiece, Pocket};
use crate::config::Config;
use crate::engine::{MoveOracle, NO_MOVE};
use crate::error::{Error, Result};
use crate::fen::Notation;
use crate::movegen::{MoveGenerator, Reach};
use crate::pieces::{PieceCatalog, PieceDefinition};
use crate::validator::{ChessGameState, Classification, GameStateValidator};

pub const DEFAULT_SEARCH_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    NotStarted,
    Playing,
    Paused,
    GameOver,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            GameState::NotStarted => "not started",
            GameState::Playing => "playing",
            GameState::Paused => "paused",
            GameState::GameOver => "game over",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Winner(Color),
    Draw,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Winner(color) => write!(f, "{} wins", color),
            Outcome::Draw => write!(f, "draw"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    MoveApplied {
        color: Color,
        from: Coord,
        to: Coord,
        captured: Option<char>,
    },
    PieceDropped {
        color: Color,
        symbol: char,
        to: Coord,
    },
    TurnChanged {
        turn: Color,
        turn_count: u32,
    },
    ChessStateChanged(ChessGameState),
    GameEnded(Outcome),
}

type Listener = Box<dyn FnMut(&GameEvent)>;

pub struct Game {
    catalog: PieceCatalog,
    board: Board,
    pocket: Pocket,
    codec: Notation,
    generator: MoveGenerator,
    validator: GameStateValidator,
    engine: Option<Box<dyn MoveOracle>>,
    search_depth: u32,
    turn: Color,
    turn_count: u32,
    state: GameState,
    classification: ChessGameState,
    attackers: Vec<PlacedPiece>,
    outcome: Option<Outcome>,
    listeners: Vec<Listener>,
}

impl Game {
    pub fn new(catalog: PieceCatalog, board: Board, pocket: Pocket) -> Self {
        Self {
            catalog,
            codec: Notation::new(board.size()),
            board,
            pocket,
            generator: MoveGenerator::new(),
            validator: GameStateValidator::default(),
            engine: None,
            search_depth: DEFAULT_SEARCH_DEPTH,
            turn: Color::White,
            turn_count: 0,
            state: GameState::NotStarted,
            classification: ChessGameState::Normal,
            attackers: Vec::new(),
            outcome: None,
            listeners: Vec::new(),
        }
    }

    /// Builds the catalog, starting position and pockets from `config`.
    /// The engine is attached separately with [`set_engine`](Self::set_engine).
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = config.catalog();
        let size = config.board_size()?;
        let board = match &config.board.setup {
            Some(setup) => Notation::new(size).board_from_fen(setup, &catalog)?,
            None => Board::new(size),
        };
        let pocket = config.pocket(&catalog)?;

        let mut game = Self::new(catalog, board, pocket);
        if let Some(engine) = &config.engine {
            game.validator = GameStateValidator::new(engine.validation_depth);
            game.search_depth = engine.search_depth.max(1);
        }
        Ok(game)
    }

    pub fn set_engine(&mut self, engine: Box<dyn MoveOracle>) {
        if let Some(mut previous) = self.engine.replace(engine) {
            previous.shutdown();
        }
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn set_search_depth(&mut self, depth: u32) {
        self.search_depth = depth.max(1);
    }

    pub fn catalog(&self) -> &PieceCatalog {
        &self.catalog
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn pocket(&self) -> &Pocket {
        &self.pocket
    }

    pub fn notation(&self) -> Notation {
        self.codec
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Classification of the current position for the side to move.
    pub fn classification(&self) -> ChessGameState {
        self.classification
    }

    pub fn attackers(&self) -> &[PlacedPiece] {
        &self.attackers
    }

    pub fn fen(&self) -> String {
        self.codec.encode(&self.board, &self.pocket, self.turn)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&GameEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Adds a piece type at runtime. The entry stays registered even when it
    /// has problems; the first one is reported.
    pub fn register_piece(&mut self, definition: PieceDefinition) -> Result<()> {
        match self.catalog.register(definition).into_iter().next() {
            Some(issue) => Err(Error::Configuration(issue)),
            None => Ok(()),
        }
    }

    /// Places a piece during setup. Only allowed before the game starts.
    pub fn place(&mut self, symbol: char, coord: Coord, color: Color) -> Result<()> {
        if self.state != GameState::NotStarted {
            return Err(Error::GameNotPlaying(self.state));
        }
        let definition = self.catalog.get(symbol).ok_or(Error::UnknownPiece(symbol))?;
        self.board.place(definition, coord, color)?;
        Ok(())
    }

    pub fn start(&mut self) -> bool {
        if self.state != GameState::NotStarted {
            warn!("cannot start a game that is {}", self.state);
            return false;
        }
        self.state = GameState::Playing;
        info!("Game started, {} to move", self.turn);
        self.classify();
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        self.state = GameState::Paused;
        info!("Game paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != GameState::Paused {
            return false;
        }
        self.state = GameState::Playing;
        info!("Game resumed");
        true
    }

    /// Ends the session. Later calls keep the first outcome.
    pub fn end_game(&mut self, outcome: Outcome) {
        if self.state == GameState::GameOver {
            return;
        }
        self.state = GameState::GameOver;
        self.outcome = Some(outcome);
        info!("Game over: {}", outcome);
        self.emit(GameEvent::GameEnded(outcome));
    }

    /// Cells the piece on `coord` can move to or capture on.
    pub fn reach(&self, coord: Coord) -> Result<Reach> {
        self.board.size().check(coord)?;
        let piece = self.board.piece_at(coord).ok_or(Error::EmptySquare(coord))?;
        Ok(self.generator.reachable(&self.board, piece))
    }

    /// Plays a move in coordinate (`e2e4`) or drop (`N@e4`) notation.
    pub fn play(&mut self, notation: &str) -> Result<()> {
        if self.codec.is_drop_notation(notation) {
            let (symbol, to) = self.codec.parse_drop(notation)?;
            self.drop_piece(symbol, to)
        } else {
            let (from, to) = self.codec.parse_move(notation)?;
            self.make_move(from, to).map(|_| ())
        }
    }

    /// Moves the side to move's piece from `from` to `to`. Returns the
    /// captured piece, if any.
    pub fn make_move(&mut self, from: Coord, to: Coord) -> Result<Option<PlacedPiece>> {
        self.ensure_playing()?;
        self.board.size().check(from)?;
        self.board.size().check(to)?;

        let piece = self.board.piece_at(from).ok_or(Error::EmptySquare(from))?;
        if piece.color() != self.turn {
            return Err(Error::WrongTurn);
        }
        if !self.generator.reachable(&self.board, piece).contains(to) {
            return Err(Error::IllegalMove { from, to });
        }

        let captured = self.board.move_piece(from, to)?;
        self.emit(GameEvent::MoveApplied {
            color: self.turn,
            from,
            to,
            captured: captured.as_ref().map(PlacedPiece::fen_symbol),
        });
        self.finish_turn();
        Ok(captured)
    }

    /// Deploys a pocket piece of the side to move onto an empty cell.
    pub fn drop_piece(&mut self, symbol: char, to: Coord) -> Result<()> {
        self.ensure_playing()?;
        self.board.size().check(to)?;
        if !self.board.is_empty_at(to) {
            return Err(Error::Occupied(to));
        }

        let definition = self
            .pocket
            .take(self.turn, symbol)
            .ok_or(Error::NotInPocket(symbol))?;
        let symbol = self.board.place(definition, to, self.turn)?.fen_symbol();
        self.emit(GameEvent::PieceDropped {
            color: self.turn,
            symbol,
            to,
        });
        self.finish_turn();
        Ok(())
    }

    /// Asks the engine for the side to move's best move and plays it.
    pub fn engine_move(&mut self) -> Result<String> {
        self.ensure_playing()?;
        let fen = self.fen();
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| Error::Protocol("no engine attached".to_string()))?;

        let best = engine
            .best_move(&fen, self.search_depth, self.turn)
            .filter(|mv| !mv.is_empty() && mv != NO_MOVE)
            .ok_or_else(|| Error::Protocol(format!("engine has no move in {}", fen)))?;
        info!("Engine plays {} for {}", best, self.turn);
        self.play(&best)?;
        Ok(best)
    }

    /// Releases the engine, if any.
    pub fn shutdown(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.shutdown();
        }
    }

    fn ensure_playing(&self) -> Result<()> {
        match self.state {
            GameState::Playing => Ok(()),
            state => Err(Error::GameNotPlaying(state)),
        }
    }

    fn finish_turn(&mut self) {
        self.turn = self.turn.opposite();
        self.turn_count += 1;
        info!("Turn {}: {} to move", self.turn_count, self.turn);
        self.emit(GameEvent::TurnChanged {
            turn: self.turn,
            turn_count: self.turn_count,
        });
        self.classify();
    }

    fn classify(&mut self) {
        let engine: Option<&mut dyn MoveOracle> = match self.engine.as_mut() {
            Some(engine) => Some(&mut **engine),
            None => None,
        };
        let Classification { state, attackers } =
            self.validator.classify(&self.board, &self.pocket, self.turn, engine);
        debug!("{} to move: {} ({} attacker(s))", self.turn, state, attackers.len());

        self.attackers = attackers;
        if state != self.classification {
            self.classification = state;
            self.emit(GameEvent::ChessStateChanged(state));
        }

        match state {
            ChessGameState::Checkmate => self.end_game(Outcome::Winner(self.turn.opposite())),
            ChessGameState::Stalemate => self.end_game(Outcome::Draw),
            ChessGameState::Normal | ChessGameState::Check => {}
        }
    }

    fn emit(&mut self, event: GameEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardSize;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replies from a queue, then keeps saying there is a move.
    struct ScriptedOracle {
        replies: VecDeque<Option<String>>,
        queries: Rc<RefCell<Vec<(String, u32)>>>,
    }

    impl MoveOracle for ScriptedOracle {
        fn best_move(&mut self, fen: &str, depth: u32, _color: Color) -> Option<String> {
            self.queries.borrow_mut().push((fen.to_string(), depth));
            self.replies
                .pop_front()
                .unwrap_or_else(|| Some("a1a1".to_string()))
        }
    }

    fn scripted(replies: &[Option<&str>]) -> (Box<dyn MoveOracle>, Rc<RefCell<Vec<(String, u32)>>>) {
        let queries = Rc::new(RefCell::new(Vec::new()));
        let oracle = ScriptedOracle {
            replies: replies.iter().map(|r| r.map(str::to_string)).collect(),
            queries: Rc::clone(&queries),
        };
        (Box::new(oracle), queries)
    }

    fn sq(name: &str) -> Coord {
        Notation::new(BoardSize::default()).parse_square(name).unwrap()
    }

    fn game(pieces: &[(char, &str, Color)]) -> Game {
        let mut game = Game::new(
            PieceCatalog::standard(),
            Board::new(BoardSize::default()),
            Pocket::new(),
        );
        for &(symbol, at, color) in pieces {
            game.place(symbol, sq(at), color).unwrap();
        }
        game
    }

    fn record(game: &mut Game) -> Rc<RefCell<Vec<GameEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        game.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    #[test]
    fn test_session_lifecycle() {
        let mut game = game(&[('K', "e1", Color::White), ('K', "e8", Color::Black)]);
        assert_eq!(game.state(), GameState::NotStarted);
        assert!(matches!(game.play("e1e2"), Err(Error::GameNotPlaying(GameState::NotStarted))));
        assert!(!game.pause());

        assert!(game.start());
        assert!(!game.start());
        assert!(game.pause());
        assert!(matches!(game.play("e1e2"), Err(Error::GameNotPlaying(GameState::Paused))));
        assert!(game.resume());
        game.play("e1e2").unwrap();

        game.end_game(Outcome::Draw);
        game.end_game(Outcome::Winner(Color::White));
        assert_eq!(game.outcome(), Some(Outcome::Draw));
        assert!(!game.resume());
        assert!(game.place('Q', sq("d1"), Color::White).is_err());
    }

    #[test]
    fn test_moves_follow_turn_and_reach() {
        let mut game = game(&[
            ('K', "e1", Color::White),
            ('P', "e2", Color::White),
            ('K', "e8", Color::Black),
            ('P', "d7", Color::Black),
        ]);
        let events = record(&mut game);
        game.start();

        assert!(matches!(game.play("d7d5"), Err(Error::WrongTurn)));
        assert!(matches!(game.play("e2e5"), Err(Error::IllegalMove { .. })));
        assert!(matches!(game.play("c3c4"), Err(Error::EmptySquare(_))));
        assert!(matches!(game.play("e2"), Err(Error::Format { .. })));
        assert_eq!(game.turn_count(), 0);

        game.play("e2e4").unwrap();
        assert_eq!(game.turn(), Color::Black);
        game.play("d7d5").unwrap();
        let captured = game.make_move(sq("e4"), sq("d5")).unwrap();
        assert_eq!(captured.map(|p| p.fen_symbol()), Some('p'));
        assert_eq!(game.turn_count(), 3);
        assert_eq!(game.fen(), "4k3/8/8/3P4/8/8/8/4K3 b - - 0 1");

        let events = events.borrow();
        assert_eq!(
            events[0],
            GameEvent::MoveApplied {
                color: Color::White,
                from: sq("e2"),
                to: sq("e4"),
                captured: None,
            }
        );
        assert_eq!(
            events[1],
            GameEvent::TurnChanged {
                turn: Color::Black,
                turn_count: 1
            }
        );
        assert!(events.contains(&GameEvent::MoveApplied {
            color: Color::White,
            from: sq("e4"),
            to: sq("d5"),
            captured: Some('p'),
        }));
    }

    #[test]
    fn test_drop_consumes_pocket() {
        let catalog = PieceCatalog::standard();
        let mut pocket = Pocket::new();
        pocket.add(Color::White, catalog.get('N').unwrap());
        let mut game = Game::new(catalog, Board::new(BoardSize::default()), pocket);
        game.place('K', sq("e1"), Color::White).unwrap();
        game.place('K', sq("e8"), Color::Black).unwrap();
        game.start();

        assert!(matches!(game.play("N@e1"), Err(Error::Occupied(_))));
        assert!(matches!(game.play("Q@d4"), Err(Error::NotInPocket('Q'))));
        assert_eq!(game.fen(), "4k3/8/8/8/8/8/8/4K3[N] w - - 0 1");

        game.play("n@d4").unwrap();
        assert!(game.pocket().is_empty());
        assert_eq!(game.board().piece_at(sq("d4")).unwrap().fen_symbol(), 'N');
        assert_eq!(game.turn(), Color::Black);
    }

    #[test]
    fn test_rook_check_is_reported() {
        let mut game = game(&[
            ('K', "e1", Color::White),
            ('R', "a2", Color::White),
            ('K', "g8", Color::Black),
        ]);
        let (oracle, queries) = scripted(&[Some("e1d1"), Some("g8h7")]);
        game.set_engine(oracle);
        let events = record(&mut game);
        game.start();
        assert_eq!(game.classification(), ChessGameState::Normal);

        game.play("a2a8").unwrap();
        assert_eq!(game.classification(), ChessGameState::Check);
        assert_eq!(game.attackers().len(), 1);
        assert_eq!(game.attackers()[0].fen_symbol(), 'R');
        assert_eq!(game.state(), GameState::Playing);
        assert!(events
            .borrow()
            .contains(&GameEvent::ChessStateChanged(ChessGameState::Check)));

        let queries = queries.borrow();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1], ("R5k1/8/8/8/8/8/8/4K3 b - - 0 1".to_string(), 1));
    }

    #[test]
    fn test_checkmate_ends_game() {
        let mut game = game(&[
            ('K', "g6", Color::White),
            ('R', "a2", Color::White),
            ('K', "g8", Color::Black),
        ]);
        let (oracle, _) = scripted(&[Some("a2a3"), Some(NO_MOVE)]);
        game.set_engine(oracle);
        let events = record(&mut game);
        game.start();

        game.play("a2a8").unwrap();
        assert_eq!(game.classification(), ChessGameState::Checkmate);
        assert_eq!(game.state(), GameState::GameOver);
        assert_eq!(game.outcome(), Some(Outcome::Winner(Color::White)));
        assert_eq!(
            events.borrow().last(),
            Some(&GameEvent::GameEnded(Outcome::Winner(Color::White)))
        );
        assert!(game.play("g8h8").is_err());
    }

    #[test]
    fn test_stalemate_is_a_draw() {
        let mut game = game(&[
            ('K', "f7", Color::White),
            ('Q', "g5", Color::White),
            ('K', "h8", Color::Black),
        ]);
        let (oracle, _) = scripted(&[Some("g5g6"), None]);
        game.set_engine(oracle);
        game.start();

        game.play("g5g6").unwrap();
        assert_eq!(game.classification(), ChessGameState::Stalemate);
        assert_eq!(game.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn test_engine_move() {
        let mut game = game(&[
            ('K', "e1", Color::White),
            ('P', "e2", Color::White),
            ('K', "e8", Color::Black),
        ]);
        assert!(game.start());
        assert!(matches!(game.engine_move(), Err(Error::Protocol(_))));

        let (oracle, queries) = scripted(&[Some("e2e4"), Some("e8d7"), Some(NO_MOVE)]);
        game.set_engine(oracle);
        game.set_search_depth(6);

        assert_eq!(game.engine_move().unwrap(), "e2e4");
        assert_eq!(game.turn(), Color::Black);
        assert_eq!(queries.borrow()[0], ("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1".to_string(), 6));

        // Classification consumed "e8d7"; the next search gets the sentinel
        assert!(matches!(game.engine_move(), Err(Error::Protocol(_))));
        assert_eq!(game.turn(), Color::Black);
    }

    #[test]
    fn test_reach_and_register_piece() {
        let mut game = game(&[('N', "b1", Color::White)]);
        let reach = game.reach(sq("b1")).unwrap();
        assert_eq!(reach.movable.len(), 3);
        assert!(matches!(game.reach(sq("c3")), Err(Error::EmptySquare(_))));
        assert!(matches!(
            game.reach(Coord::new(8, 0)),
            Err(Error::OutOfRange { .. })
        ));

        let duplicate = PieceDefinition::new("Nightrider", 'N', crate::pieces::Movement::KNIGHT, 4);
        assert!(matches!(game.register_piece(duplicate), Err(Error::Configuration(_))));
        assert_eq!(game.catalog().len(), 7);
    }

    #[test]
    fn test_from_config() {
        let config = Config::parse(
            "[board]\nwidth = 6\nheight = 6\nsetup = \"k5/6/6/6/6/5K\"\n\n[engine]\npath = \"sf\"\nsearch_depth = 4\n\n[pocket]\nblack = [\"q\"]\n",
        )
        .unwrap();
        let game = Game::from_config(&config).unwrap();
        assert_eq!(game.board().size(), BoardSize::new(6, 6).unwrap());
        assert_eq!(game.board().len(), 2);
        assert_eq!(game.fen(), "k5/6/6/6/6/5K[q] w - - 0 1");
        assert!(!game.has_engine());
    }
}
