//! `colacask` command-line front end: create, insert, query, dump, and the
//! `insertrandom` stress-loading subcommand.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use colacask::{Database, Error};

#[derive(Parser)]
#[command(name = "colacask", version, about = "A cache-oblivious lookahead array index for unique u64 keys")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new, empty database file.
    Create {
        path: PathBuf,
        /// Overwrite an existing file at `path`.
        #[arg(short, long)]
        force: bool,
    },
    /// Insert a single key.
    Insert { path: PathBuf, key: String },
    /// Query whether a key is present.
    Query { path: PathBuf, key: String },
    /// Insert `count` keys, 0..count, in an order shuffled by `seed`.
    Insertrandom { path: PathBuf, seed: u64, count: u64 },
    /// Print every occupied level to stdout.
    Dump { path: PathBuf },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("colacask: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Command) -> Result<(), Error> {
    match command {
        Command::Create { path, force } => {
            if force && path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| Error::Open { path: path.clone(), source: e })?;
            }
            Database::create(&path)?.close()
        }
        Command::Insert { path, key } => {
            let key = parse_key(&key)?;
            let mut db = Database::open(&path, true)?;
            db.insert(key)?;
            db.close()
        }
        Command::Query { path, key } => {
            let key = parse_key(&key)?;
            let mut db = Database::open(&path, false)?;
            let found = db.query(key)?;
            println!("key {key} {}found", if found { "" } else { "not " });
            Ok(())
        }
        Command::Insertrandom { path, seed, count } => {
            let mut db = Database::open(&path, true)?;
            let mut order: Vec<u64> = (0..count).collect();
            order.shuffle(&mut StdRng::seed_from_u64(seed));
            for key in order {
                db.insert(key)?;
            }
            db.close()
        }
        Command::Dump { path } => {
            let db = Database::open(&path, false)?;
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            db.dump(&mut lock)
        }
    }
}

/// Parses a key, accepting the `0x`/`0o`/`0b` radix prefixes in addition to
/// plain decimal.
fn parse_key(s: &str) -> Result<u64, Error> {
    let trimmed = s.trim();
    let (digits, radix) = if let Some(rest) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = trimmed.strip_prefix("0o").or_else(|| trimmed.strip_prefix("0O")) {
        (rest, 8)
    } else if let Some(rest) = trimmed.strip_prefix("0b").or_else(|| trimmed.strip_prefix("0B")) {
        (rest, 2)
    } else {
        (trimmed, 10)
    };
    u64::from_str_radix(digits, radix).map_err(|_| Error::protocol(format!("invalid key: {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_radixes() {
        assert_eq!(parse_key("0x10").unwrap(), 16);
        assert_eq!(parse_key("0o10").unwrap(), 8);
        assert_eq!(parse_key("0b10").unwrap(), 2);
        assert_eq!(parse_key("42").unwrap(), 42);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_key("not-a-key").is_err());
    }
}
