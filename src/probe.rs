//! Book probing: binary search by position key, then per-move aggregation
//! over the run of matching records.

use crate::entry::{self, BookEntry, ENTRY_SIZE};
use anyhow::{bail, Result};
use serde::Serialize;

/// One candidate move at the probed position.
///
/// The result counts only carry information for books built in full mode;
/// a dedup book keeps a single record per move, so every candidate shows
/// one game in one bucket.
#[derive(Debug, Serialize)]
pub struct Candidate {
    #[serde(rename = "move")]
    pub mv: String,
    pub weight: u16,
    pub games: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    #[serde(rename = "pgn offsets")]
    pub pgn_offsets: Vec<u64>,
}

/// Full `find` output: the probed position and its candidate moves.
#[derive(Debug, Serialize)]
pub struct FindReport {
    pub fen: String,
    pub key: u64,
    pub moves: Vec<Candidate>,
}

/// Probe a book image for every move recorded at `key`, in book order.
///
/// Per move, up to `limit` archive offsets are collected after discarding
/// the first `skip` of them.
pub fn probe(book: &[u8], key: u64, limit: usize, skip: usize) -> Result<Vec<Candidate>> {
    if book.len() % ENTRY_SIZE != 0 {
        bail!(
            "book size {} is not a multiple of the {}-byte entry",
            book.len(),
            ENTRY_SIZE
        );
    }
    let count = book.len() / ENTRY_SIZE;

    // Lower bound: first record with a key >= the target.
    let mut lo = 0usize;
    let mut hi = count;
    while lo < hi {
        let mid = (lo + hi) / 2;
        if entry_at(book, mid).key < key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    let mut moves = Vec::new();
    let mut i = lo;
    while i < count {
        let first = entry_at(book, i);
        if first.key != key {
            break;
        }

        // Aggregate the maximal run of records for this (key, move).
        let mut results = [0u64; 4];
        let mut offsets = Vec::new();
        let mut skip_counter = skip;
        while i < count {
            let e = entry_at(book, i);
            if e.key != key || e.mv != first.mv {
                break;
            }
            if skip_counter == 0 {
                if offsets.len() < limit {
                    offsets.push(e.pgn_offset());
                }
            } else {
                skip_counter -= 1;
            }
            results[e.result() as usize] += 1;
            i += 1;
        }

        moves.push(Candidate {
            mv: entry::move_string(first.mv),
            weight: first.weight,
            games: results.iter().sum(),
            wins: results[entry::WHITE_WIN as usize],
            losses: results[entry::BLACK_WIN as usize],
            draws: results[entry::DRAW as usize],
            pgn_offsets: offsets,
        });
    }

    Ok(moves)
}

fn entry_at(book: &[u8], index: usize) -> BookEntry {
    let mut bytes = [0u8; ENTRY_SIZE];
    bytes.copy_from_slice(&book[index * ENTRY_SIZE..(index + 1) * ENTRY_SIZE]);
    BookEntry::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::pack_learn;

    fn image(entries: &[BookEntry]) -> Vec<u8> {
        let mut out = Vec::new();
        for e in entries {
            out.extend_from_slice(&e.to_bytes());
        }
        out
    }

    fn e(key: u64, mv: u16, weight: u16, result: u8, ofs: u64) -> BookEntry {
        BookEntry { key, mv, weight, learn: pack_learn(result, ofs) }
    }

    #[test]
    fn test_rejects_truncated_books() {
        assert!(probe(&[0u8; 24], 1, 10, 0).is_err());
    }

    #[test]
    fn test_missing_key_is_empty() {
        let book = image(&[e(5, 10, 1, 0, 0)]);
        assert!(probe(&book, 6, 10, 0).expect("valid book").is_empty());
    }

    #[test]
    fn test_aggregates_result_buckets() {
        let book = image(&[
            e(5, 10, 100, entry::WHITE_WIN, 0),
            e(5, 10, 100, entry::WHITE_WIN, 64),
            e(5, 10, 100, entry::DRAW, 128),
            e(5, 20, 50, entry::BLACK_WIN, 64),
            e(9, 30, 1, entry::RESULT_UNKNOWN, 0),
        ]);
        let moves = probe(&book, 5, 10, 0).expect("valid book");
        assert_eq!(moves.len(), 2);

        assert_eq!(moves[0].games, 3);
        assert_eq!(moves[0].wins, 2);
        assert_eq!(moves[0].draws, 1);
        assert_eq!(moves[0].losses, 0);
        assert_eq!(moves[0].weight, 100);
        assert_eq!(moves[0].pgn_offsets, [0, 64, 128]);

        assert_eq!(moves[1].games, 1);
        assert_eq!(moves[1].losses, 1);
        assert_eq!(moves[1].pgn_offsets, [64]);
    }

    #[test]
    fn test_limit_and_skip() {
        let book = image(&[
            e(5, 10, 1, 0, 0),
            e(5, 10, 1, 0, 64),
            e(5, 10, 1, 0, 128),
            e(5, 10, 1, 0, 192),
        ]);
        let moves = probe(&book, 5, 2, 1).expect("valid book");
        assert_eq!(moves.len(), 1);
        // One skipped, then at most two collected; all four still counted.
        assert_eq!(moves[0].pgn_offsets, [64, 128]);
        assert_eq!(moves[0].games, 4);
    }

    #[test]
    fn test_unknown_results_count_as_games_only() {
        let book = image(&[e(5, 10, 1, entry::RESULT_UNKNOWN, 0)]);
        let moves = probe(&book, 5, 10, 0).expect("valid book");
        assert_eq!(moves[0].games, 1);
        assert_eq!(moves[0].wins + moves[0].losses + moves[0].draws, 0);
    }
}
