//! Table-driven PGN parser.
//!
//! A pushdown state machine walking the memory-mapped archive one byte at
//! a time. Nothing is copied out of the input except SAN characters and an
//! optional FEN, accumulated in small per-game buffers; at each game
//! boundary the buffered moves are replayed into the entry table.
//!
//! The machine is deliberately forgiving: games with a missing result,
//! an unterminated brace comment, or embedded junk commit what was read
//! and resync at the next game. A `Fail` action logs a diagnostic and
//! leaves the state unchanged, so later bytes are re-evaluated against
//! the same state rather than resyncing heuristically.

use crate::entry::{self, BookEntry};
use crate::replay;
use crate::tables::{Action, State, TABLES};

/// Aggregate counters reported after a full parse.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub games: u64,
    pub moves: u64,
    /// SAN tokens that only resolved through notation repair.
    pub fixed: u64,
}

/// Capacity reserved for the per-game FEN buffer; longer tags are truncated.
const FEN_BUF: usize = 256;
/// Capacity reserved for the flat per-game SAN buffer.
const SAN_BUF: usize = 8192;
/// Maximum nesting depth saved across tags, comments and variations.
const STACK_DEPTH: usize = 16;
/// Bytes of context included in parse diagnostics.
const CONTEXT_BYTES: usize = 50;

/// Parse a whole PGN archive, appending one entry per replayed move to
/// `table`. Malformed input never aborts the run.
pub fn parse_pgn(data: &[u8], table: &mut Vec<BookEntry>, stats: &mut Stats) {
    let mut stack = [State::Header; STACK_DEPTH];
    let mut sp = 0usize;
    let mut fen: Vec<u8> = Vec::with_capacity(FEN_BUF);
    let mut sans: Vec<u8> = Vec::with_capacity(SAN_BUF);
    let mut game_ofs: u64 = 0;
    let mut result = entry::RESULT_UNKNOWN;
    let mut white_to_move = true;
    let mut state = State::Header;

    let mut i = 0usize;
    while i < data.len() {
        let token = TABLES.token(data[i]);

        match TABLES.action(state, token) {
            Action::Continue => {}

            Action::Fail => diagnostic(state, data, i),

            Action::GameStart => {
                if i >= 1 && matches_at(data, i - 1, b"[Event ") {
                    // Rewind so the bracket is re-read from HEADER.
                    i -= 1;
                    state = State::Header;
                    continue;
                }
            }

            Action::OpenTag => {
                push(&mut stack, &mut sp, state);
                if matches_at(data, i + 1, b"FEN \"") {
                    i += 5;
                    state = State::FenTag;
                } else if matches_at(data, i + 1, b"Variant ")
                    && !matches_at(data, i + 9, b"\"Standard\"")
                {
                    sp = sp.saturating_sub(1); // pop, we are inside brackets
                    state = State::SkipGame;
                } else {
                    state = State::Tag;
                }
            }

            Action::OpenBraceComment => {
                push(&mut stack, &mut sp, state);
                state = State::BraceComment;
            }

            Action::ReadFen => {
                if fen.len() < FEN_BUF {
                    fen.push(data[i]);
                }
            }

            Action::CloseFenTag => {
                state = State::Tag;
                if fen.windows(3).any(|w| w == b" b ") {
                    white_to_move = false;
                }
            }

            Action::OpenVariation => {
                push(&mut stack, &mut sp, state);
                state = State::Variation;
            }

            Action::StartNag => {
                push(&mut stack, &mut sp, state);
                state = State::Nag;
            }

            Action::PopState => {
                if sp > 0 {
                    sp -= 1;
                    state = stack[sp];
                }
            }

            Action::StartMoveNumber => state = State::MoveNumber,

            Action::StartNextSan => state = State::NextSan,

            Action::CastleOrResult => {
                if data.get(i + 2) != Some(&b'0') {
                    // A result like 0-1, not a castle like 0-0.
                    result = result_code(data, i);
                    state = State::Result;
                } else {
                    sans.push(data[i]);
                    state = State::ReadSan;
                }
            }

            Action::StartReadSan => {
                sans.push(data[i]);
                state = State::ReadSan;
            }

            Action::ReadMoveChar => sans.push(data[i]),

            Action::EndMove => {
                sans.push(0);
                stats.moves += 1;
                // After a White move the same move number continues with
                // Black's SAN; after a Black move the next number starts.
                state = if white_to_move { State::NextSan } else { State::NextMove };
                white_to_move = !white_to_move;
            }

            Action::StartResult => {
                result = result_code(data, i);
                state = State::Result;
            }

            Action::EndGame => {
                if data[i] != b'\n' {
                    // Spaces inside a result like 1/2 - 1/2.
                    state = State::Result;
                } else {
                    commit_game(
                        &mut sans, &mut fen, &mut result, &mut white_to_move, game_ofs,
                        table, stats,
                    );
                    game_ofs = (i + 1) as u64; // beginning of the next game
                    sp = 0;
                    state = State::Header;
                }
            }

            Action::TagInBrace => {
                // A missed closing brace: only the start of the next game
                // re-syncs, any other bracket stays inside the comment.
                if matches_at(data, i, b"[Event ") {
                    missing_result(
                        &mut sans, &mut fen, &mut result, &mut white_to_move, &mut game_ofs,
                        i, &mut stack, &mut sp, &mut state, table, stats,
                    );
                }
            }

            Action::MissingResult => {
                missing_result(
                    &mut sans, &mut fen, &mut result, &mut white_to_move, &mut game_ofs,
                    i, &mut stack, &mut sp, &mut state, table, stats,
                );
            }
        }

        i += 1;
    }

    // Force accounting of a pending last game: no newline at EOF, missing
    // result, missing closing brace, and so on.
    if state != State::Header && state != State::SkipGame && !sans.is_empty() {
        replay::replay_game(&sans, &fen, game_ofs, result, table, &mut stats.fixed);
        stats.games += 1;
    }
}

/// Commit the buffered game and reset per-game state.
fn commit_game(
    sans: &mut Vec<u8>,
    fen: &mut Vec<u8>,
    result: &mut u8,
    white_to_move: &mut bool,
    game_ofs: u64,
    table: &mut Vec<BookEntry>,
    stats: &mut Stats,
) {
    replay::replay_game(sans, fen, game_ofs, *result, table, &mut stats.fixed);
    stats.games += 1;
    *result = entry::RESULT_UNKNOWN;
    sans.clear();
    fen.clear();
    *white_to_move = true;
}

/// The next game's tag arrived while this game was still waiting for a
/// result: commit what we have and fast-forward into the tag.
#[allow(clippy::too_many_arguments)]
fn missing_result(
    sans: &mut Vec<u8>,
    fen: &mut Vec<u8>,
    result: &mut u8,
    white_to_move: &mut bool,
    game_ofs: &mut u64,
    i: usize,
    stack: &mut [State; STACK_DEPTH],
    sp: &mut usize,
    state: &mut State,
    table: &mut Vec<BookEntry>,
    stats: &mut Stats,
) {
    commit_game(sans, fen, result, white_to_move, *game_ofs, table, stats);
    *game_ofs = i as u64;
    *sp = 0;
    push(stack, sp, State::Header);
    *state = State::Tag;
}

/// Result codes are derived from the byte that triggered `StartResult`
/// (`/`, `*`, `0` or `-`) plus up to two preceding bytes, skipping one
/// space to tolerate results written like `1 - 0`.
fn result_code(data: &[u8], i: usize) -> u8 {
    let prev = |n: usize| i.checked_sub(n).map(|j| data[j]);
    match data[i] {
        b'/' => entry::DRAW,
        b'0' => entry::BLACK_WIN,
        b'-' => {
            if prev(1) == Some(b'1') || (prev(1) == Some(b' ') && prev(2) == Some(b'1')) {
                entry::WHITE_WIN
            } else if prev(1) == Some(b'0') || (prev(1) == Some(b' ') && prev(2) == Some(b'0')) {
                entry::BLACK_WIN
            } else {
                entry::RESULT_UNKNOWN
            }
        }
        _ => entry::RESULT_UNKNOWN,
    }
}

#[inline]
fn matches_at(data: &[u8], at: usize, pattern: &[u8]) -> bool {
    data.get(at..at + pattern.len()).map_or(false, |s| s == pattern)
}

fn push(stack: &mut [State; STACK_DEPTH], sp: &mut usize, state: State) {
    if *sp < STACK_DEPTH {
        stack[*sp] = state;
        *sp += 1;
    }
}

fn diagnostic(state: State, data: &[u8], i: usize) {
    let end = (i + CONTEXT_BYTES).min(data.len());
    eprintln!(
        "Wrong {}: '{}'",
        state.name(),
        String::from_utf8_lossy(&data[i..end])
    );
}
