//! Interactive command parsing and the state-dependent prompt.

use crate::chess::Position;
use crate::protocol::ChessPacket;
use crate::session::{Lobby, Session, SessionState};

impl Session {
    pub(crate) fn handle_input(&mut self, input: &str) {
        let new_state = match self.state {
            SessionState::Menu => self.menu_input(input),
            SessionState::Lobby => self.lobby_input(input),
            SessionState::MyTurn => self.my_turn_input(input),
            SessionState::TheirTurn => self.their_turn_input(input),
            SessionState::Exiting => self.state,
        };

        if new_state != self.state {
            self.change_state(new_state);
        }
    }

    pub(crate) fn print_prompt(&self) {
        match self.state {
            SessionState::Menu => {
                println!(".start <name> - Starts a new game");
                println!(".list - Lists existing games");
                println!(".join <name> - Joins existing games");
            }
            SessionState::Lobby => {
                if self.lobby.hosting {
                    println!(".start - Starts the game (requires other player)");
                }
                println!(".leave - Leaves the game");
            }
            SessionState::MyTurn => {
                self.game.print();
                println!();
                println!("IT IS YOUR TURN, YOU ARE {}", self.game.turn());
                println!(".move <src> <dest> - Moves a piece, eg .move a4 b3");
                println!(".forfeit - Forfeits the game");
            }
            SessionState::TheirTurn => {
                self.game.print();
                println!();
                println!("IT IS THEIR TURN, THEY ARE {}", self.game.turn());
                println!(".forfeit - Forfeits the game");
            }
            SessionState::Exiting => {}
        }
    }

    fn menu_input(&mut self, input: &str) -> SessionState {
        let mut words = input.split_whitespace();
        match words.next() {
            Some(".start") => {
                let Some(name) = words.next() else {
                    println!("Please enter a name for the lobby. eg. .start thegame");
                    return SessionState::Menu;
                };

                self.lobby = Lobby::create(name.to_string());
                let packet = ChessPacket::LobbyCreated {
                    name: name.to_string(),
                };
                if self.broadcast_packet(&packet).is_err() {
                    println!("Error creating the lobby.");
                    return SessionState::Menu;
                }

                SessionState::Lobby
            }
            Some(".list") => {
                println!("Asking once for lobbies...");
                if self.broadcast_packet(&ChessPacket::LobbyListRequest).is_err() {
                    println!("Error asking for lobbies.");
                }
                SessionState::Menu
            }
            Some(".join") => {
                let Some(name) = words.next() else {
                    println!("Please enter a name for the lobby. eg. .join thegame");
                    return SessionState::Menu;
                };

                println!("Attempting to join...");
                let packet = ChessPacket::LobbyJoinRequest {
                    name: name.to_string(),
                };
                if self.broadcast_packet(&packet).is_err() {
                    println!("Error joining.");
                }
                SessionState::Menu
            }
            _ => {
                println!("Invalid command.");
                SessionState::Menu
            }
        }
    }

    fn lobby_input(&mut self, input: &str) -> SessionState {
        match input.split_whitespace().next() {
            Some(".start") => {
                if !self.lobby.hosting {
                    println!("You are not the host!");
                    return SessionState::Lobby;
                }
                if !self.connection.is_active() {
                    println!("There isn't a second player!");
                    return SessionState::Lobby;
                }

                println!("Attempting to start game...");
                self.lobby.ready = true;
                if self.send_packet(&ChessPacket::LobbyStartRequest).is_err() {
                    println!("Error starting the game.");
                }
                SessionState::Lobby
            }
            Some(".leave") => {
                if self.connection.is_active() {
                    log::info!("connection is active, terminating it");
                    self.connection.close();
                }

                self.lobby = Lobby::default();
                SessionState::Menu
            }
            _ => {
                println!("Invalid command.");
                SessionState::Lobby
            }
        }
    }

    fn my_turn_input(&mut self, input: &str) -> SessionState {
        let mut words = input.split_whitespace();
        match words.next() {
            Some(".move") => {
                let (Some(src), Some(dest)) = (words.next(), words.next()) else {
                    println!("Please enter a move in the correct format");
                    return SessionState::MyTurn;
                };
                let (Some(src), Some(dest)) = (parse_square(src), parse_square(dest)) else {
                    println!("Please enter a move in the correct format");
                    return SessionState::MyTurn;
                };

                if let Err(reason) = self.game.move_piece(src, dest) {
                    println!("{reason}");
                    return SessionState::MyTurn;
                }

                // The move stuck, so the turn passes to the other side
                self.game.switch_turn();

                let packet = ChessPacket::MovePiece { src, dest };
                if self.send_packet(&packet).is_err() {
                    println!("Error moving the piece.");
                    return SessionState::MyTurn;
                }
                SessionState::TheirTurn
            }
            Some(".forfeit") => self.forfeit_input(),
            _ => {
                println!("Invalid command.");
                SessionState::MyTurn
            }
        }
    }

    fn their_turn_input(&mut self, input: &str) -> SessionState {
        match input.split_whitespace().next() {
            Some(".forfeit") => self.forfeit_input(),
            _ => {
                println!("Invalid command.");
                SessionState::TheirTurn
            }
        }
    }

    fn forfeit_input(&mut self) -> SessionState {
        if self.send_packet(&ChessPacket::Forfeit).is_err() {
            println!("Error forfeiting.");
        }
        println!("You have forfeit the match.");
        SessionState::Menu
    }
}

/// Parses a square like `e2`: a file letter in `a`-`h` followed by a row
/// digit in `0`-`7`.
fn parse_square(s: &str) -> Option<Position> {
    let mut chars = s.chars();
    let letter = chars.next()?;
    let digit = chars.next()?;
    if chars.next().is_some() {
        return None;
    }

    let x = letter as i32 - 'a' as i32;
    let y = digit.to_digit(10)? as i32;
    if !(0..8).contains(&x) || !(0..8).contains(&y) {
        return None;
    }

    Some(Position {
        x: x as usize,
        y: y as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squares_parse_to_board_positions() {
        assert_eq!(parse_square("a0"), Some(Position { x: 0, y: 0 }));
        assert_eq!(parse_square("e2"), Some(Position { x: 4, y: 2 }));
        assert_eq!(parse_square("h7"), Some(Position { x: 7, y: 7 }));
    }

    #[test]
    fn bad_squares_are_rejected() {
        assert_eq!(parse_square(""), None);
        assert_eq!(parse_square("a"), None);
        assert_eq!(parse_square("i3"), None);
        assert_eq!(parse_square("a8"), None);
        assert_eq!(parse_square("a-1"), None);
        assert_eq!(parse_square("aa1"), None);
        assert_eq!(parse_square("4a"), None);
    }
}
