//! polybook: build PolyGlot opening books from PGN archives and probe them.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use memmap2::Mmap;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode};

use polybook::book::{self, BuildReport};
use polybook::entry::ENTRY_SIZE;
use polybook::parser::{self, Stats};
use polybook::position;
use polybook::probe::{self, FindReport};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a PGN archive and write `<archive>.bin` next to it
    Book {
        /// Path to the PGN archive
        pgn: PathBuf,
        /// Pass `full` to keep one record per game, enabling win/draw/loss
        /// statistics at probe time at the cost of a larger book
        #[arg(value_parser = ["full"])]
        mode: Option<String>,
    },
    /// Look up a position in a book and print its candidate moves
    Find {
        /// Path to a PolyGlot book
        book: PathBuf,
        /// Maximum archive offsets reported per move
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        limit: u64,
        /// Archive offsets discarded per move before collecting
        #[arg(long, default_value_t = 0)]
        skip: u64,
        /// The position to look up, as whitespace-separated FEN fields
        #[arg(required = true, num_args = 1..)]
        fen: Vec<String>,
    },
}

fn main() -> Result<()> {
    match Arguments::parse().command {
        Command::Book { pgn, mode } => make_book(&pgn, mode.is_some()),
        Command::Find { book, limit, skip, fen } => {
            find(&book, limit as usize, skip as usize, &fen.join(" "))
        }
    }
}

fn make_book(pgn: &Path, full: bool) -> Result<()> {
    let map = map_file(pgn)?;

    // Crude capacity estimate: assume the entry table ends up around twice
    // the size of the archive.
    let mut table = Vec::with_capacity(2 * map.len() / ENTRY_SIZE);
    let mut stats = Stats::default();

    eprintln!("Processing...");
    let started = Instant::now();
    parser::parse_pgn(&map, &mut table, &mut stats);
    let elapsed_ms = started.elapsed().as_millis().max(1) as u64;

    eprintln!("Sorting...");
    let unique_keys = book::finish_table(&mut table);

    eprintln!("Writing book...");
    let book_path = pgn.with_extension("bin");
    let out = File::create(&book_path)
        .with_context(|| format!("cannot create {}", book_path.display()))?;
    let mut writer = BufWriter::new(out);
    let book_size = book::write_book(&mut writer, &table, full)?;
    writer.flush()?;

    let report = BuildReport::new(
        &stats,
        unique_keys,
        map.len() as u64,
        book_size,
        book_path.display().to_string(),
        elapsed_ms,
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn find(book_path: &Path, limit: usize, skip: usize, fen_str: &str) -> Result<()> {
    let fen: Fen = fen_str
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid FEN '{}': {}", fen_str, e))?;
    let pos: Chess = fen
        .into_position(CastlingMode::Standard)
        .map_err(|e| anyhow!("illegal position: {}", e))?;
    let key = position::key(&pos);

    let map = map_file(book_path)?;
    let moves = probe::probe(&map, key, limit, skip)?;

    let report = FindReport {
        fen: Fen::from_position(pos, EnPassantMode::Legal).to_string(),
        key,
        moves,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file =
        File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    if file.metadata()?.len() == 0 {
        bail!("{} is empty", path.display());
    }
    let map = unsafe { Mmap::map(&file) }
        .with_context(|| format!("cannot mmap {}", path.display()))?;
    Ok(map)
}
