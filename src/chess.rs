use thiserror::Error;

/// A square on the board. `x` is the column (file), `y` the row, both in
/// [0, 8). Row 0 is black's back rank; white starts on rows 6 and 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    White,
    Black,
}

impl Colour {
    pub fn opposite(self) -> Colour {
        match self {
            Colour::White => Colour::Black,
            Colour::Black => Colour::White,
        }
    }
}

impl std::fmt::Display for Colour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Colour::White => write!(f, "WHITE"),
            Colour::Black => write!(f, "BLACK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    fn letter(self) -> char {
        match self {
            PieceKind::King => 'K',
            PieceKind::Queen => 'Q',
            PieceKind::Rook => 'R',
            PieceKind::Bishop => 'B',
            // H for horse, K is taken
            PieceKind::Knight => 'H',
            PieceKind::Pawn => 'P',
        }
    }

    /// Whether pieces of this kind are blocked by anything standing on
    /// their path. Only the knight jumps.
    fn blocked_by_path(self) -> bool {
        self != PieceKind::Knight
    }
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    kind: PieceKind,
    colour: Colour,
    has_moved: bool,
}

impl Piece {
    fn new(kind: PieceKind, colour: Colour) -> Self {
        Self {
            kind,
            colour,
            has_moved: false,
        }
    }

    fn representation(&self) -> String {
        let colour = match self.colour {
            Colour::White => 'w',
            Colour::Black => 'b',
        };
        format!("{colour}{}", self.kind.letter())
    }

    fn can_move(&self, movement: &Movement) -> bool {
        match self.kind {
            // Kings can only move one square
            PieceKind::King => movement.distance() <= 1,
            PieceKind::Queen => movement.is_diagonal() || movement.is_cardinal(),
            PieceKind::Rook => movement.is_cardinal(),
            PieceKind::Bishop => movement.is_diagonal(),
            // L shapes: two in one direction, one in the other
            PieceKind::Knight => {
                let (dx, dy) = movement.deltas();
                (dx.abs() == 2 && dy.abs() == 1) || (dx.abs() == 1 && dy.abs() == 2)
            }
            PieceKind::Pawn => self.pawn_can_move(movement),
        }
    }

    fn pawn_can_move(&self, movement: &Movement) -> bool {
        let (_, dy) = movement.deltas();
        let distance = movement.distance();

        // Two squares only off the starting rank
        if self.has_moved && distance > 1 {
            return false;
        }
        if !self.has_moved && distance > 2 {
            return false;
        }
        if distance == 2 && movement.is_diagonal() {
            return false;
        }

        // Diagonal exactly when capturing
        if movement.takes != movement.is_diagonal() {
            return false;
        }

        // Forward only: up the board for white, down for black
        match self.colour {
            Colour::White => dy < 0,
            Colour::Black => dy > 0,
        }
    }
}

struct Movement {
    from: Position,
    to: Position,
    takes: bool,
}

impl Movement {
    fn deltas(&self) -> (i32, i32) {
        (
            self.to.x as i32 - self.from.x as i32,
            self.to.y as i32 - self.from.y as i32,
        )
    }

    fn is_diagonal(&self) -> bool {
        let (dx, dy) = self.deltas();
        dx.abs() == dy.abs()
    }

    fn is_cardinal(&self) -> bool {
        let (dx, dy) = self.deltas();
        dx == 0 || dy == 0
    }

    /// Chebyshev distance; meaningful for every piece but the knight.
    fn distance(&self) -> i32 {
        let (dx, dy) = self.deltas();
        dx.abs().max(dy.abs())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MoveError {
    #[error("There is no piece there")]
    EmptySquare,
    #[error("That is not your piece")]
    NotYourPiece,
    #[error("Would collide with your own piece")]
    OwnPieceCollision,
    #[error("That piece cannot move there")]
    CannotMoveThere,
    #[error("There is a piece in that path")]
    PathBlocked,
    #[error("That move results in check")]
    ResultsInCheck,
}

struct Board {
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    fn starting() -> Self {
        let mut squares: [[Option<Piece>; 8]; 8] = Default::default();

        let back_rank = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];
        for (x, kind) in back_rank.into_iter().enumerate() {
            squares[0][x] = Some(Piece::new(kind, Colour::Black));
            squares[7][x] = Some(Piece::new(kind, Colour::White));
        }
        for x in 0..8 {
            squares[1][x] = Some(Piece::new(PieceKind::Pawn, Colour::Black));
            squares[6][x] = Some(Piece::new(PieceKind::Pawn, Colour::White));
        }

        Self { squares }
    }

    fn at(&self, pos: Position) -> Option<&Piece> {
        self.squares[pos.y][pos.x].as_ref()
    }

    fn print(&self) {
        println!("   a  b  c  d  e  f  g  h");
        for (y, row) in self.squares.iter().enumerate() {
            print!("{y} ");
            for square in row {
                match square {
                    Some(piece) => print!("{} ", piece.representation()),
                    None => print!(" . "),
                }
            }
            println!();
        }
    }
}

/// The rules engine. The session feeds it both local and remote moves; turn
/// switching is a separate step so the caller controls when it happens.
pub struct GameState {
    board: Board,
    turn: Colour,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            board: Board::starting(),
            turn: Colour::White,
        }
    }

    pub fn turn(&self) -> Colour {
        self.turn
    }

    pub fn switch_turn(&mut self) {
        self.turn = self.turn.opposite();
    }

    pub fn print(&self) {
        self.board.print();
    }

    /// Validates and applies a move for the side whose turn it is.
    pub fn move_piece(&mut self, source: Position, dest: Position) -> Result<(), MoveError> {
        let piece = *self.board.at(source).ok_or(MoveError::EmptySquare)?;
        if piece.colour != self.turn {
            return Err(MoveError::NotYourPiece);
        }

        let colliding = self.board.at(dest).copied();
        // Landing on an enemy piece is a capture; on our own, illegal
        if colliding.is_some_and(|other| other.colour == piece.colour) {
            return Err(MoveError::OwnPieceCollision);
        }

        let movement = Movement {
            from: source,
            to: dest,
            takes: colliding.is_some(),
        };
        if !piece.can_move(&movement) {
            return Err(MoveError::CannotMoveThere);
        }
        if piece.kind.blocked_by_path() && self.path_blocked(&movement) {
            return Err(MoveError::PathBlocked);
        }

        // Apply the move, then take it back if it leaves our king exposed
        self.board.squares[dest.y][dest.x] = Some(piece);
        self.board.squares[source.y][source.x] = None;

        if self.king_in_check() {
            self.board.squares[source.y][source.x] = Some(piece);
            self.board.squares[dest.y][dest.x] = colliding;
            return Err(MoveError::ResultsInCheck);
        }

        // Pawns lose their double step once they have moved
        if let Some(moved) = self.board.squares[dest.y][dest.x].as_mut() {
            moved.has_moved = true;
        }

        Ok(())
    }

    /// Whether anything standing strictly between `from` and `to` blocks the
    /// movement. Callers have already validated the move, so the path is a
    /// straight or diagonal line.
    fn path_blocked(&self, movement: &Movement) -> bool {
        let (dx, dy) = movement.deltas();
        let step_x = dx.signum();
        let step_y = dy.signum();

        let mut x = movement.from.x as i32 + step_x;
        let mut y = movement.from.y as i32 + step_y;
        while (x, y) != (movement.to.x as i32, movement.to.y as i32) {
            if self.board.squares[y as usize][x as usize].is_some() {
                return true;
            }
            x += step_x;
            y += step_y;
        }

        false
    }

    fn king_in_check(&self) -> bool {
        let Some(king) = self.find_king() else {
            return false;
        };

        for y in 0..8 {
            for x in 0..8 {
                let Some(enemy) = self.board.at(Position { x, y }) else {
                    continue;
                };
                if enemy.colour == self.turn {
                    continue;
                }

                let attack = Movement {
                    from: Position { x, y },
                    to: king,
                    takes: true,
                };
                if enemy.can_move(&attack)
                    && (!enemy.kind.blocked_by_path() || !self.path_blocked(&attack))
                {
                    return true;
                }
            }
        }

        false
    }

    fn find_king(&self) -> Option<Position> {
        for y in 0..8 {
            for x in 0..8 {
                if let Some(piece) = self.board.at(Position { x, y }) {
                    if piece.kind == PieceKind::King && piece.colour == self.turn {
                        return Some(Position { x, y });
                    }
                }
            }
        }
        None
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
