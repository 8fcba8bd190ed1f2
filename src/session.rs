use std::time::Instant;

use crossbeam_channel::{select, Receiver, Sender};

use crate::broadcast::BroadcastDedup;
use crate::chess::{GameState, Position};
use crate::connection::Connection;
use crate::error::{ProtocolError, Result};
use crate::frame::MacAddr;
use crate::layering;
use crate::protocol::ChessPacket;
use crate::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Menu,
    Lobby,
    MyTurn,
    TheirTurn,
    Exiting,
}

/// The lobby we are hosting. Guests keep the default value: their view of
/// the lobby lives on the host's side of the connection.
#[derive(Debug, Clone, Default)]
pub struct Lobby {
    pub name: String,
    pub hosting: bool,
    pub ready: bool,
}

impl Lobby {
    pub fn create(name: String) -> Self {
        Self {
            name,
            hosting: true,
            ready: false,
        }
    }
}

/// The single-threaded heart of the client.
///
/// Owns everything mutable: the chess state, the one connection, the
/// broadcast dedup map and the menu/lobby/turn state machine. The worker
/// threads only ever talk to it through channels, so nothing here needs a
/// lock.
pub struct Session {
    pub(crate) identity: Identity,
    pub(crate) state: SessionState,
    pub(crate) game: GameState,
    pub(crate) lobby: Lobby,
    pub(crate) connection: Connection,
    pub(crate) dedup: BroadcastDedup,
    pub(crate) send_tx: Sender<Vec<u8>>,
}

impl Session {
    pub fn new(identity: Identity, send_tx: Sender<Vec<u8>>) -> Self {
        Self {
            identity,
            state: SessionState::Menu,
            game: GameState::new(),
            lobby: Lobby::default(),
            connection: Connection::new(identity.id, identity.mac, send_tx.clone()),
            dedup: BroadcastDedup::new(identity.id),
            send_tx,
        }
    }

    /// Multiplexes the three event sources until the session exits. Events
    /// are handled in arrival order; each source is sequential on its own.
    pub fn run(
        mut self,
        input_rx: Receiver<String>,
        recv_rx: Receiver<Vec<u8>>,
        tick_rx: Receiver<()>,
    ) {
        self.print_prompt();

        while self.state != SessionState::Exiting {
            select! {
                recv(input_rx) -> line => match line {
                    Ok(line) => self.handle_input(&line),
                    // stdin is gone, time to leave
                    Err(_) => self.state = SessionState::Exiting,
                },
                recv(recv_rx) -> frame => match frame {
                    Ok(frame) => self.handle_frame(&frame),
                    Err(_) => self.state = SessionState::Exiting,
                },
                recv(tick_rx) -> tick => match tick {
                    Ok(()) => self.tick(),
                    Err(_) => self.state = SessionState::Exiting,
                },
            }
        }
    }

    pub(crate) fn handle_frame(&mut self, data: &[u8]) {
        let now = Instant::now();
        match layering::handle_frame(
            data,
            &mut self.connection,
            &mut self.dedup,
            self.identity.mac,
            now,
        ) {
            Ok((status_changed, packet)) => {
                if let Some((packet, source)) = packet {
                    self.handle_packet(packet, source);
                }
                if status_changed {
                    self.handle_connection_change();
                }
            }
            // Not ours; the segment is full of other people's traffic
            Err(ProtocolError::IncorrectEtherType(_)) => {}
            Err(err) => log::debug!("error receiving packet: {err}"),
        }
    }

    fn handle_packet(&mut self, packet: ChessPacket, source: MacAddr) {
        let new_state = match packet {
            ChessPacket::LobbyCreated { name } => self.on_lobby_created(&name),
            ChessPacket::LobbyListRequest => self.on_lobby_list_request(),
            ChessPacket::LobbyInfo { name } => self.on_lobby_info(&name),
            ChessPacket::LobbyJoinRequest { name } => self.on_lobby_join_request(&name, source),
            ChessPacket::LobbyStartRequest => self.on_lobby_start_request(),
            ChessPacket::LobbyStartAccept => self.on_lobby_start_accept(),
            ChessPacket::MovePiece { src, dest } => self.on_move_piece(src, dest),
            ChessPacket::Forfeit => self.on_forfeit(),
        };

        if new_state != self.state {
            self.change_state(new_state);
        }
    }

    fn on_lobby_created(&mut self, name: &str) -> SessionState {
        if self.state == SessionState::Menu {
            println!("New lobby created: {name}");
        }
        self.state
    }

    fn on_lobby_list_request(&mut self) -> SessionState {
        // Only an open lobby has anything to advertise
        if self.lobby.hosting && !self.connection.is_active() {
            let info = ChessPacket::LobbyInfo {
                name: self.lobby.name.clone(),
            };
            if self.broadcast_packet(&info).is_err() {
                println!("Error broadcasting lobby info.");
            }
        }
        self.state
    }

    fn on_lobby_info(&mut self, name: &str) -> SessionState {
        if self.state == SessionState::Menu {
            println!("Lobby available at: {name}");
        }
        self.state
    }

    fn on_lobby_join_request(&mut self, name: &str, source: MacAddr) -> SessionState {
        if self.lobby.hosting && !self.connection.is_active() && name == self.lobby.name {
            println!("Peer {source} is trying to join your game.");

            // Once the handshake completes the game is ready to start
            if let Err(err) = self.connection.open(source, Instant::now()) {
                log::debug!("error opening connection: {err}");
            }
        }
        self.state
    }

    fn on_lobby_start_request(&mut self) -> SessionState {
        if !self.lobby.hosting {
            // Tell the host we are good to go
            if let Err(err) = self.send_packet(&ChessPacket::LobbyStartAccept) {
                log::debug!("error accepting the game start: {err}");
            }

            self.game = GameState::new();
            return SessionState::TheirTurn;
        }
        self.state
    }

    fn on_lobby_start_accept(&mut self) -> SessionState {
        if self.lobby.hosting && self.lobby.ready {
            println!("Game is starting");
            self.game = GameState::new();
            return SessionState::MyTurn;
        }
        self.state
    }

    fn on_move_piece(&mut self, src: Position, dest: Position) -> SessionState {
        // The peer validated this on their side before sending
        if let Err(err) = self.game.move_piece(src, dest) {
            log::debug!("peer move rejected: {err}");
        }
        self.game.switch_turn();
        SessionState::MyTurn
    }

    fn on_forfeit(&mut self) -> SessionState {
        println!("The other user has forfeit.");
        self.lobby.hosting = false;
        self.connection.close();
        SessionState::Menu
    }

    fn handle_connection_change(&mut self) {
        if self.connection.is_active() {
            if let Some(peer) = self.connection.peer() {
                println!("Got a new connection with {peer}, entering the lobby");
            }
            self.change_state(SessionState::Lobby);
        } else {
            println!("Other side closed the connection.");
            if matches!(self.state, SessionState::MyTurn | SessionState::TheirTurn)
                || !self.lobby.hosting
            {
                // The lobby has closed with the connection, purge all state
                self.lobby = Lobby::default();
                self.change_state(SessionState::Menu);
            } else {
                self.print_prompt();
            }
        }
    }

    /// Periodic connection maintenance: loss detection first, then whatever
    /// the window and ack queue have for the wire.
    fn tick(&mut self) {
        if !self.connection.is_active() {
            return;
        }

        let now = Instant::now();
        if self.connection.check_loss(now) {
            println!("Connection timed out.");
            self.change_state(SessionState::Menu);
            return;
        }

        let mut packets = self.connection.get_packets(now);
        packets.extend(self.connection.get_ack_packets());

        for packet in packets {
            match layering::package_transport(&packet, &self.connection, self.identity.mac) {
                Ok(data) => {
                    if self.send_tx.send(data).is_err() {
                        return;
                    }
                }
                Err(err) => log::debug!("error packaging transport packet: {err}"),
            }
        }
    }

    pub(crate) fn change_state(&mut self, state: SessionState) {
        self.state = state;
        self.print_prompt();
    }

    /// Queues a packet on the reliable channel; it goes out on the next
    /// tick.
    pub(crate) fn send_packet(&mut self, packet: &ChessPacket) -> Result<()> {
        let data = layering::package_chess(packet, &self.connection)?;
        self.connection.queue_packet(data);
        Ok(())
    }

    pub(crate) fn broadcast_packet(&self, packet: &ChessPacket) -> Result<()> {
        let data =
            layering::package_chess_broadcast(packet, self.identity.id, self.identity.mac)?;
        self.send_tx
            .send(data)
            .map_err(|_| ProtocolError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastPacket;
    use crate::frame::EthernetFrame;
    use crossbeam_channel::{unbounded, Receiver};
    use uuid::Uuid;

    fn test_session() -> (Session, Receiver<Vec<u8>>) {
        let (tx, rx) = unbounded();
        let identity = Identity {
            id: Uuid::new_v4(),
            mac: MacAddr([0x02, 0, 0, 0, 0, 0x0A]),
        };
        (Session::new(identity, tx), rx)
    }

    #[test]
    fn starting_a_lobby_broadcasts_and_enters_the_lobby() {
        let (mut session, rx) = test_session();
        session.handle_input(".start game1");

        assert_eq!(session.state, SessionState::Lobby);
        assert!(session.lobby.hosting);
        assert_eq!(session.lobby.name, "game1");

        let frame = EthernetFrame::decode(&rx.try_recv().unwrap()).unwrap();
        assert!(frame.dest.is_broadcast());
        let broadcast = BroadcastPacket::deserialize(&frame.payload).unwrap();
        let packet = ChessPacket::deserialize(broadcast.payload()).unwrap();
        assert_eq!(
            packet,
            ChessPacket::LobbyCreated {
                name: "game1".into()
            }
        );
    }

    #[test]
    fn start_without_a_name_stays_in_the_menu() {
        let (mut session, rx) = test_session();
        session.handle_input(".start");
        assert_eq!(session.state, SessionState::Menu);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn list_request_is_answered_only_while_hosting_unconnected() {
        let (mut session, rx) = test_session();
        session.handle_input(".start game1");
        rx.try_recv().unwrap(); // the LobbyCreated broadcast

        session.handle_packet(ChessPacket::LobbyListRequest, MacAddr([9; 6]));
        let frame = EthernetFrame::decode(&rx.try_recv().unwrap()).unwrap();
        let broadcast = BroadcastPacket::deserialize(&frame.payload).unwrap();
        let packet = ChessPacket::deserialize(broadcast.payload()).unwrap();
        assert_eq!(
            packet,
            ChessPacket::LobbyInfo {
                name: "game1".into()
            }
        );

        // A guest has nothing to advertise
        let (mut guest, guest_rx) = test_session();
        guest.handle_packet(ChessPacket::LobbyListRequest, MacAddr([9; 6]));
        assert!(guest_rx.try_recv().is_err());
    }

    #[test]
    fn matching_join_request_opens_a_connection() {
        let (mut session, _rx) = test_session();
        session.handle_input(".start game1");

        let joiner = MacAddr([0x02, 0, 0, 0, 0, 0x0B]);
        session.handle_packet(
            ChessPacket::LobbyJoinRequest {
                name: "game1".into(),
            },
            joiner,
        );
        assert!(session.connection.is_active());
        assert_eq!(session.connection.peer(), Some(joiner));

        // A request for some other lobby is ignored
        let (mut other, _rx) = test_session();
        other.handle_input(".start game2");
        other.handle_packet(
            ChessPacket::LobbyJoinRequest {
                name: "game1".into(),
            },
            joiner,
        );
        assert!(!other.connection.is_active());
    }

    #[test]
    fn guest_accepts_a_start_request_and_waits_for_the_host() {
        let (mut guest, _rx) = test_session();
        guest.state = SessionState::Lobby;

        guest.handle_packet(ChessPacket::LobbyStartRequest, MacAddr([9; 6]));
        assert_eq!(guest.state, SessionState::TheirTurn);
    }

    #[test]
    fn host_starts_once_the_guest_accepts() {
        let (mut host, _rx) = test_session();
        host.handle_input(".start game1");
        host.handle_packet(
            ChessPacket::LobbyJoinRequest {
                name: "game1".into(),
            },
            MacAddr([9; 6]),
        );
        host.handle_input(".start");
        assert!(host.lobby.ready);

        host.handle_packet(ChessPacket::LobbyStartAccept, MacAddr([9; 6]));
        assert_eq!(host.state, SessionState::MyTurn);
    }

    #[test]
    fn start_accept_is_ignored_when_not_ready() {
        let (mut host, _rx) = test_session();
        host.handle_input(".start game1");
        host.handle_packet(ChessPacket::LobbyStartAccept, MacAddr([9; 6]));
        assert_eq!(host.state, SessionState::Lobby);
    }

    #[test]
    fn peer_move_hands_the_turn_to_us() {
        let (mut session, _rx) = test_session();
        session.state = SessionState::TheirTurn;

        session.handle_packet(
            ChessPacket::MovePiece {
                src: Position { x: 4, y: 6 },
                dest: Position { x: 4, y: 4 },
            },
            MacAddr([9; 6]),
        );
        assert_eq!(session.state, SessionState::MyTurn);
    }

    #[test]
    fn forfeit_returns_us_to_the_menu() {
        let (mut session, _rx) = test_session();
        session.state = SessionState::TheirTurn;
        session.lobby = Lobby::create("game1".into());

        session.handle_packet(ChessPacket::Forfeit, MacAddr([9; 6]));
        assert_eq!(session.state, SessionState::Menu);
        assert!(!session.lobby.hosting);
    }

    #[test]
    fn established_connection_enters_the_lobby() {
        let (mut session, _rx) = test_session();
        session
            .connection
            .open(MacAddr([9; 6]), Instant::now())
            .unwrap();
        session.handle_connection_change();
        assert_eq!(session.state, SessionState::Lobby);
    }

    #[test]
    fn closed_connection_mid_game_returns_to_the_menu() {
        let (mut session, _rx) = test_session();
        session.state = SessionState::MyTurn;
        session.handle_connection_change();
        assert_eq!(session.state, SessionState::Menu);
    }

    #[test]
    fn host_keeps_the_lobby_when_the_guest_leaves() {
        let (mut session, _rx) = test_session();
        session.handle_input(".start game1");
        session.handle_connection_change();
        assert_eq!(session.state, SessionState::Lobby);
        assert!(session.lobby.hosting);
    }
}
