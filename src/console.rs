use crate::board::Coord;
use crate::fen::Notation;
use crate::game::{Game, GameState};
use crate::validator::ChessGameState;
use anyhow::Result;
use std::collections::BTreeSet;
use std::io::{BufRead, Write};

const HELP: &str = "\
commands:
  board             print the board
  fen               print the position as FEN
  reach <sq>        cells the piece on <sq> can reach
  move <uci>        play a move, e.g. move e2e4 (the word move is optional)
  drop <S@sq>       drop a pocket piece, e.g. drop N@e4
  engine            let the engine play for the side to move
  state             session and position state
  start | pause | resume
  quit
";

pub struct Console {
    game: Game,
}

impl Console {
    pub fn new(game: Game) -> Self {
        Console { game }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    pub fn run(&mut self, input: impl BufRead, mut output: impl Write) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            let command = line.trim();
            if command == "quit" {
                break;
            }

            let response = self.handle_command(command)?;
            write!(output, "{}", response)?;
            output.flush()?;
        }
        self.game.shutdown();
        Ok(())
    }

    pub fn handle_command(&mut self, command: &str) -> Result<String> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        if parts.is_empty() {
            return Ok("".to_string());
        }

        match parts[0] {
            "help" => Ok(HELP.to_string()),
            "board" => Ok(self.game.board().to_string()),
            "fen" => Ok(format!("{}\n", self.game.fen())),
            "state" => Ok(self.handle_state()),
            "reach" => Ok(self.handle_reach(&parts[1..])),
            "move" | "drop" => match parts.get(1) {
                Some(notation) => Ok(self.handle_play(notation)),
                None => Ok(format!("usage: {} <notation>\n", parts[0])),
            },
            "engine" => Ok(self.handle_engine()),
            "start" => Ok(self.transition(Game::start, "started")),
            "pause" => Ok(self.transition(Game::pause, "paused")),
            "resume" => Ok(self.transition(Game::resume, "resumed")),
            "quit" => Ok("".to_string()),
            notation if notation.len() >= 4 => Ok(self.handle_play(notation)),
            other => Ok(format!("unknown command: {}\n", other)),
        }
    }

    fn transition(&mut self, action: fn(&mut Game) -> bool, done: &str) -> String {
        if action(&mut self.game) {
            let mut response = format!("{}\n", done);
            self.push_position_state(&mut response);
            response
        } else {
            format!("error: game is {}\n", self.game.state())
        }
    }

    fn handle_state(&self) -> String {
        let mut response = format!(
            "state: {}, {} to move, turn {}, position: {}\n",
            self.game.state(),
            self.game.turn(),
            self.game.turn_count(),
            self.game.classification()
        );
        if let Some(outcome) = self.game.outcome() {
            response.push_str(&format!("result: {}\n", outcome));
        }
        response
    }

    fn handle_reach(&self, parts: &[&str]) -> String {
        let Some(square) = parts.first() else {
            return "usage: reach <square>\n".to_string();
        };
        let notation = self.game.notation();
        let reach = match notation
            .parse_square(square)
            .and_then(|coord| self.game.reach(coord))
        {
            Ok(reach) => reach,
            Err(e) => return format!("error: {}\n", e),
        };

        format!(
            "movable: {}\nattacks: {}\n",
            squares(&notation, &reach.movable),
            squares(&notation, &reach.attacks)
        )
    }

    fn handle_play(&mut self, notation: &str) -> String {
        match self.game.play(notation) {
            Ok(()) => {
                let mut response = format!("ok {}\n", notation);
                self.push_position_state(&mut response);
                response
            }
            Err(e) => format!("error: {}\n", e),
        }
    }

    fn handle_engine(&mut self) -> String {
        match self.game.engine_move() {
            Ok(best) => {
                let mut response = format!("engine plays {}\n", best);
                self.push_position_state(&mut response);
                response
            }
            Err(e) => format!("error: {}\n", e),
        }
    }

    fn push_position_state(&self, response: &mut String) {
        match self.game.classification() {
            ChessGameState::Normal => {}
            state => response.push_str(&format!("{}\n", state)),
        }
        if self.game.state() == GameState::GameOver {
            if let Some(outcome) = self.game.outcome() {
                response.push_str(&format!("game over: {}\n", outcome));
            }
        }
    }
}

fn squares(notation: &Notation, cells: &BTreeSet<Coord>) -> String {
    cells
        .iter()
        .filter_map(|c| notation.format_square(*c).ok())
        .collect::<Vec<_>>()
        .join(" ")
}
