//! Entry table finishing and the binary book writer.
//!
//! After parsing, the table is sorted by key, each position's weights are
//! normalized to move frequencies, and the records stream out big-endian.
//! Two runs over the same input bytes produce byte-identical books: the
//! key sort is stable and all tie-breaks are explicit.

use crate::entry::{BookEntry, ENTRY_SIZE};
use crate::parser::Stats;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};

/// Sort the table and normalize weights per key group.
/// Returns the number of unique position keys.
pub fn finish_table(table: &mut [BookEntry]) -> u64 {
    table.sort_by_key(|e| e.key);

    let mut unique = 0u64;
    let mut start = 0usize;
    while start < table.len() {
        let key = table[start].key;
        let mut end = start + 1;
        while end < table.len() && table[end].key == key {
            end += 1;
        }
        // Positions seen once or twice keep their raw weight of 1.
        if end - start > 2 {
            sort_by_frequency(&mut table[start..end]);
        }
        unique += 1;
        start = end;
    }
    unique
}

/// Normalize weights so that 100% of a position's games map to 0xFFFF,
/// then order the group by weight, ties broken by the packed move.
fn sort_by_frequency(group: &mut [BookEntry]) {
    let mut counts: HashMap<u16, u64> = HashMap::new();
    for e in group.iter() {
        *counts.entry(e.mv).or_insert(0) += 1;
    }

    let total = group.len() as u64;
    for e in group.iter_mut() {
        e.weight = (counts[&e.mv] * 0xFFFF / total) as u16;
    }

    group.sort_by(|a, b| b.weight.cmp(&a.weight).then(b.mv.cmp(&a.mv)));
}

/// Stream the table out as 16-byte big-endian records. In dedup mode
/// (the default) repeated `(key, move)` rows collapse to one; `full`
/// keeps every game's row so probes can aggregate results.
/// Returns the number of bytes written.
pub fn write_book<W: Write>(out: &mut W, table: &[BookEntry], full: bool) -> io::Result<u64> {
    let mut written = 0u64;
    let mut prev: Option<(u64, u16)> = None;

    for e in table {
        if full || prev != Some((e.key, e.mv)) {
            out.write_all(&e.to_bytes())?;
            prev = Some((e.key, e.mv));
            written += ENTRY_SIZE as u64;
        }
    }
    Ok(written)
}

/// Ingestion statistics, printed as JSON after a build.
#[derive(Debug, Serialize)]
pub struct BuildReport {
    #[serde(rename = "Games")]
    pub games: u64,
    #[serde(rename = "Moves")]
    pub moves: u64,
    #[serde(rename = "Incorrect moves")]
    pub incorrect_moves: u64,
    #[serde(rename = "Unique positions (%)")]
    pub unique_positions_pct: u64,
    #[serde(rename = "Games/second")]
    pub games_per_second: u64,
    #[serde(rename = "Moves/second")]
    pub moves_per_second: u64,
    #[serde(rename = "MBytes/second")]
    pub mbytes_per_second: f64,
    #[serde(rename = "Size of index file (bytes)")]
    pub book_size: u64,
    #[serde(rename = "Book file")]
    pub book_file: String,
    #[serde(rename = "Processing time (ms)")]
    pub elapsed_ms: u64,
}

impl BuildReport {
    pub fn new(
        stats: &Stats,
        unique_keys: u64,
        input_size: u64,
        book_size: u64,
        book_file: String,
        elapsed_ms: u64,
    ) -> Self {
        let elapsed_ms = elapsed_ms.max(1);
        Self {
            games: stats.games,
            moves: stats.moves,
            incorrect_moves: stats.fixed,
            unique_positions_pct: if stats.moves > 0 {
                100 * unique_keys / stats.moves
            } else {
                0
            },
            games_per_second: 1000 * stats.games / elapsed_ms,
            moves_per_second: 1000 * stats.moves / elapsed_ms,
            mbytes_per_second: input_size as f64 / elapsed_ms as f64 / 1000.0,
            book_size,
            book_file,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: u64, mv: u16) -> BookEntry {
        BookEntry { key, mv, weight: 1, learn: 0 }
    }

    #[test]
    fn test_sort_and_unique_count() {
        let mut table = vec![entry(3, 10), entry(1, 20), entry(2, 30), entry(1, 40)];
        assert_eq!(finish_table(&mut table), 3);
        let keys: Vec<u64> = table.iter().map(|e| e.key).collect();
        assert_eq!(keys, [1, 1, 2, 3]);
    }

    #[test]
    fn test_small_groups_keep_raw_weights() {
        let mut table = vec![entry(1, 10), entry(1, 10), entry(2, 20)];
        finish_table(&mut table);
        assert!(table.iter().all(|e| e.weight == 1));
    }

    #[test]
    fn test_frequencies_normalize_to_ffff() {
        // One position: move 10 five times, 20 three times, 30 twice.
        let mut table = Vec::new();
        for _ in 0..5 {
            table.push(entry(7, 10));
        }
        for _ in 0..3 {
            table.push(entry(7, 20));
        }
        for _ in 0..2 {
            table.push(entry(7, 30));
        }
        assert_eq!(finish_table(&mut table), 1);

        assert_eq!(table[0].weight, (5u32 * 0xFFFF / 10) as u16);
        assert_eq!(table[5].weight, (3u32 * 0xFFFF / 10) as u16);
        assert_eq!(table[8].weight, (2u32 * 0xFFFF / 10) as u16);
        // Descending by weight across the group.
        assert!(table.windows(2).all(|w| w[0].weight >= w[1].weight));
    }

    #[test]
    fn test_equal_frequencies_order_by_move() {
        let mut table = vec![entry(7, 10), entry(7, 30), entry(7, 20)];
        finish_table(&mut table);
        let moves: Vec<u16> = table.iter().map(|e| e.mv).collect();
        assert_eq!(moves, [30, 20, 10]);
        assert!(table.iter().all(|e| e.weight == 0xFFFF / 3));
    }

    #[test]
    fn test_dedup_write_collapses_runs() {
        let mut table = vec![entry(1, 10), entry(1, 10), entry(1, 20), entry(2, 10)];
        let mut dedup = Vec::new();
        write_book(&mut dedup, &table, false).expect("write to vec");
        assert_eq!(dedup.len(), 3 * ENTRY_SIZE);

        let mut all = Vec::new();
        write_book(&mut all, &table, true).expect("write to vec");
        assert_eq!(all.len(), 4 * ENTRY_SIZE);

        // Sorting first is what makes the dedup global per position.
        finish_table(&mut table);
        let mut again = Vec::new();
        write_book(&mut again, &table, false).expect("write to vec");
        assert_eq!(again.len(), 3 * ENTRY_SIZE);
    }

    #[test]
    fn test_empty_table() {
        let mut table: Vec<BookEntry> = Vec::new();
        assert_eq!(finish_table(&mut table), 0);
        let mut out = Vec::new();
        assert_eq!(write_book(&mut out, &table, false).expect("write to vec"), 0);
        assert!(out.is_empty());
    }
}
