//! patricia CLI - Command line interface for patricia_db
//!
//! Each invocation opens the store file, rebuilds the trie from the recorded
//! head, runs one command and (for mutations) commits and records the new
//! head before exiting. Results are printed as JSON on stdout; logs go to
//! stderr.

use clap::{Parser, Subcommand};
use patricia_db::{verify_proof, FileStore, Hash, Storage, StoreConfig, Trie};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "patricia")]
#[command(about = "An authenticated key/value store built on a Merkle-Patricia trie")]
#[command(version)]
struct Cli {
    /// Path to the database file
    #[arg(short, long, env = "PATRICIA_DB", default_value = "trie.patricia")]
    database: PathBuf,

    /// Store configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Keys and values are given (and printed) as hex
    #[arg(long)]
    hex: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new, empty database
    Init,

    /// Insert or overwrite a key
    Put {
        key: String,
        value: String,
    },

    /// Look up a key
    Get {
        key: String,
    },

    /// Remove a key
    Del {
        key: String,
    },

    /// List keys in order
    List {
        /// Only keys starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Produce a Merkle proof for a key
    Proof {
        key: String,
    },

    /// Check a proof against a root digest
    Verify {
        /// Root digest (hex)
        #[arg(short, long)]
        root: String,
        key: String,
        value: String,
        /// Proof entries (hex), root first
        nodes: Vec<String>,
    },

    /// Show database status
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    match &cli.command {
        Commands::Init => {
            let store = FileStore::create_with_config(&cli.database, load_config(&cli)?)?;
            store.close()?;

            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created database at {}", cli.database.display())
                }),
            );
        }

        Commands::Put { key, value } => {
            let key = parse_bytes(&cli, key)?;
            let value = parse_bytes(&cli, value)?;

            let store = open_store(&cli)?;
            let mut trie = load_trie(&store)?;
            trie.put(&key, value);
            let root = persist(&store, &trie)?;

            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": show_bytes(&cli, &key),
                    "root": root.map(|h| h.to_hex())
                }),
            );
        }

        Commands::Get { key } => {
            let key = parse_bytes(&cli, key)?;
            let store = open_store(&cli)?;
            let trie = load_trie(&store)?;

            match trie.get(&key) {
                Ok(value) => output(
                    &cli.format,
                    &serde_json::json!({
                        "key": show_bytes(&cli, &key),
                        "value": show_bytes(&cli, value)
                    }),
                ),
                Err(e) if e.is_not_found() => fail(&cli.format, format!("Key not found: {}", show_bytes(&cli, &key))),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Del { key } => {
            let key = parse_bytes(&cli, key)?;
            let store = open_store(&cli)?;
            let mut trie = load_trie(&store)?;

            match trie.del(&key) {
                Ok(()) => {
                    let root = persist(&store, &trie)?;
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "status": "ok",
                            "key": show_bytes(&cli, &key),
                            "root": root.map(|h| h.to_hex())
                        }),
                    );
                }
                Err(e) if e.is_not_found() => fail(&cli.format, format!("Key not found: {}", show_bytes(&cli, &key))),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::List { prefix } => {
            let prefix = match prefix {
                Some(p) => parse_bytes(&cli, p)?,
                None => Vec::new(),
            };
            let store = open_store(&cli)?;
            let trie = load_trie(&store)?;

            let items: Vec<_> = trie
                .list_prefix(&prefix)
                .iter()
                .map(|(k, v)| {
                    serde_json::json!({
                        "key": show_bytes(&cli, k),
                        "value": show_bytes(&cli, v)
                    })
                })
                .collect();

            output(
                &cli.format,
                &serde_json::json!({
                    "count": items.len(),
                    "entries": items
                }),
            );
        }

        Commands::Proof { key } => {
            let key = parse_bytes(&cli, key)?;
            let store = open_store(&cli)?;
            let trie = load_trie(&store)?;

            match trie.proof(&key) {
                Ok(proof) => {
                    let nodes: Vec<_> = proof.iter().map(hex::encode).collect();
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "key": show_bytes(&cli, &key),
                            "root": store.head().map(|h| h.to_hex()),
                            "nodes": nodes
                        }),
                    );
                }
                Err(e) if e.is_not_found() => fail(&cli.format, format!("Key not found: {}", show_bytes(&cli, &key))),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Verify {
            root,
            key,
            value,
            nodes,
        } => {
            let root = Hash::from_hex(root)?;
            let key = parse_bytes(&cli, key)?;
            let value = parse_bytes(&cli, value)?;
            let nodes = nodes
                .iter()
                .map(hex::decode)
                .collect::<Result<Vec<_>, _>>()?;

            let valid = verify_proof(&root, &key, &value, &nodes);
            output(
                &cli.format,
                &serde_json::json!({
                    "valid": valid,
                    "root": root.to_hex(),
                    "key": show_bytes(&cli, &key)
                }),
            );
            if !valid {
                std::process::exit(1);
            }
        }

        Commands::Status => {
            let store = open_store(&cli)?;
            let trie = load_trie(&store)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "database": cli.database.display().to_string(),
                    "root": store.head().map(|h| h.to_hex()),
                    "keys": trie.len(),
                    "objects": store.object_count()
                }),
            );
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    Ok(match &cli.config {
        Some(path) => StoreConfig::from_json_file(path)?,
        None => StoreConfig::default(),
    })
}

fn open_store(cli: &Cli) -> anyhow::Result<FileStore> {
    Ok(FileStore::open_or_create_with_config(&cli.database, load_config(cli)?)?)
}

/// Rebuild the trie committed as the store's head
fn load_trie(store: &FileStore) -> anyhow::Result<Trie<'_, FileStore>> {
    Ok(match store.head() {
        Some(root) => Trie::from_root(store, &root)?,
        None => Trie::new(store),
    })
}

/// Commit, record the new head and flush
fn persist(store: &FileStore, trie: &Trie<'_, FileStore>) -> anyhow::Result<Option<Hash>> {
    let root = trie.commit()?;
    store.set_head(root);
    store.close()?;
    debug!(root = ?root, "recorded head");
    Ok(root)
}

fn parse_bytes(cli: &Cli, s: &str) -> anyhow::Result<Vec<u8>> {
    if cli.hex {
        Ok(hex::decode(s.trim_start_matches("0x"))?)
    } else {
        Ok(s.as_bytes().to_vec())
    }
}

fn show_bytes(cli: &Cli, bytes: &[u8]) -> String {
    if cli.hex {
        hex::encode(bytes)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn output(format: &OutputFormat, value: &serde_json::Value) {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Text => serde_json::to_string_pretty(value),
    };
    match rendered {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("failed to render output: {}", e),
    }
}

fn fail(format: &OutputFormat, message: String) -> ! {
    output(
        format,
        &serde_json::json!({
            "status": "error",
            "message": message
        }),
    );
    std::process::exit(1);
}
