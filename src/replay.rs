//! Per-game replay: turns the parser's SAN stream into book entries.

use crate::entry::{self, BookEntry};
use crate::position::{self, SanMatch};
use shakmaty::{Chess, Color, Position};

/// Replay one game's zero-delimited SAN buffer, appending an entry per
/// concrete move. `fen` selects the starting position (empty means the
/// standard start). A token that cannot be resolved abandons the rest of
/// the game; everything recorded up to that point is kept.
pub fn replay_game(
    sans: &[u8],
    fen: &[u8],
    game_ofs: u64,
    result: u8,
    table: &mut Vec<BookEntry>,
    fixed: &mut u64,
) {
    let mut pos = if fen.is_empty() {
        Chess::default()
    } else {
        match position::from_fen(fen) {
            Some(p) => p,
            None => {
                eprintln!("Bad FEN: '{}'", String::from_utf8_lossy(fen));
                return;
            }
        }
    };

    // The upper 2 bits of `learn` carry the game result so that sorted
    // entries allow counting result statistics; the rest is the 8-byte
    // aligned offset of the game in the archive.
    let learn = entry::pack_learn(result, game_ofs);

    for token in sans.split(|&b| b == 0).filter(|t| !t.is_empty()) {
        match position::san_to_move(&pos, token, fixed) {
            SanMatch::Move(m) => {
                table.push(BookEntry {
                    key: position::key(&pos),
                    mv: position::to_polyglot(&m),
                    weight: 1,
                    learn,
                });
                pos.play_unchecked(&m);
            }
            SanMatch::Null => {
                pos = match pos.swap_turn() {
                    Ok(p) => p,
                    // Passing while in check has no legal continuation.
                    Err(_) => return,
                };
            }
            SanMatch::None => {
                let sep = if pos.turn() == Color::White { "" } else { ".." };
                eprintln!(
                    "Wrong move notation: {}{}",
                    sep,
                    String::from_utf8_lossy(token)
                );
                return;
            }
        }
    }
}
