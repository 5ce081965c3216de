//! Arbor command-line tools.
//!
//! Provides the `arbor` binary with subcommands for working with graph
//! snapshots: converting them between stable schema versions, dumping the
//! graph of the built-in demo component, and keeping snapshots in a SQLite
//! store.
//!
//! Exit codes: 0 = success, 1 = usage or conversion error, 3 = I/O or
//! storage error.

mod demo;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use arbor_runtime::{Driver, DriverConfig};
use arbor_storage::traits::SnapshotStore;
use arbor_storage::types::SnapshotId;
use arbor_storage::{
    snapshot_to_stable, SqliteStore, StorageError, VersionedGraph, LATEST_VERSION,
};

/// Arbor graph snapshot tools.
#[derive(Parser)]
#[command(name = "arbor", about = "Arbor graph snapshot tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert a snapshot file to another schema version.
    Convert {
        /// Snapshot file (`{"version": n, "graph": ...}`).
        #[arg(short, long)]
        input: PathBuf,

        /// Target schema version: 1 or 2.
        #[arg(long)]
        to: u64,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the graph of the built-in counter-list component.
    Demo {
        /// Emit Graphviz DOT instead of a snapshot record.
        #[arg(long)]
        dot: bool,

        /// Schema version of the snapshot record.
        #[arg(long, default_value_t = LATEST_VERSION)]
        schema: u64,

        /// Drive the component for this many increments and print its rows
        /// to stderr.
        #[arg(long, default_value_t = 0)]
        steps: u32,
    },

    /// Manage a snapshot database.
    Store {
        /// Path to the snapshot database file.
        #[arg(short, long)]
        db: String,

        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Save a snapshot file.
    Put {
        #[arg(short, long)]
        input: PathBuf,

        /// Name to store it under (default: the file name).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print a stored snapshot.
    Get {
        id: i64,

        /// Schema version to print (default: as stored).
        #[arg(long)]
        to: Option<u64>,
    },

    /// List stored snapshots.
    List,
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Convert { input, to, output } => run_convert(&input, to, output.as_deref()),
        Commands::Demo { dot, schema, steps } => run_demo(dot, schema, steps),
        Commands::Store { db, action } => run_store(&db, action),
    };
    process::exit(exit_code);
}

/// Maps a storage error to an exit code: decoding and version problems are
/// the input's fault, everything else is the environment's.
fn storage_exit_code(err: &StorageError) -> i32 {
    match err {
        StorageError::Serialization(_)
        | StorageError::UnsupportedVersion { .. }
        | StorageError::MalformedEnvelope { .. }
        | StorageError::InvalidRecord(_) => 1,
        StorageError::SnapshotNotFound(_)
        | StorageError::Sqlite(_)
        | StorageError::Migration(_) => 3,
    }
}

fn read_snapshot(input: &Path) -> Result<VersionedGraph, i32> {
    let text = fs::read_to_string(input).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", input.display(), e);
        3
    })?;
    VersionedGraph::from_json(&text).map_err(|e| {
        eprintln!("Error: '{}' is not a snapshot: {}", input.display(), e);
        storage_exit_code(&e)
    })
}

fn emit(text: &str, output: Option<&Path>) -> i32 {
    match output {
        Some(path) => match fs::write(path, format!("{text}\n")) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                3
            }
        },
        None => {
            println!("{}", text);
            0
        }
    }
}

fn encode(graph: &VersionedGraph, version: u64) -> Result<String, i32> {
    graph.to_version(version).and_then(|g| g.to_json_pretty()).map_err(|e| {
        eprintln!("Error: {}", e);
        storage_exit_code(&e)
    })
}

/// Execute the convert subcommand.
fn run_convert(input: &Path, to: u64, output: Option<&Path>) -> i32 {
    let graph = match read_snapshot(input) {
        Ok(graph) => graph,
        Err(code) => return code,
    };
    tracing::debug!(from = graph.version(), to, "converting snapshot");
    match encode(&graph, to) {
        Ok(text) => emit(&text, output),
        Err(code) => code,
    }
}

/// Execute the demo subcommand.
fn run_demo(dot: bool, schema: u64, steps: u32) -> i32 {
    let demo = demo::counter_list();
    let snapshot = match demo.snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Error: demo graph is malformed: {}", e);
            return 1;
        }
    };

    if steps > 0 {
        if let Err(e) = drive_demo(&demo, steps) {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    if dot {
        return emit(&snapshot.to_dot(), None);
    }
    match encode(&VersionedGraph::V2(snapshot_to_stable(&snapshot)), schema) {
        Ok(text) => emit(&text, None),
        Err(code) => code,
    }
}

fn drive_demo(demo: &demo::Demo, steps: u32) -> Result<(), arbor_runtime::RuntimeError> {
    let mut driver = Driver::with_config(&demo.view, DriverConfig::from_env())?;
    tracing::info!(items = demo.items.get().len(), steps, "driving demo");
    for step in 0..steps {
        let rows = driver.result()?;
        // Round-robin over the rows.
        if let Some(row) = rows.get(step as usize % rows.len().max(1)) {
            let effect = row.increment.call(1);
            driver.schedule(effect);
        }
        driver.settle()?;
    }
    for row in driver.result()? {
        eprintln!("{}: {}", row.label, row.count);
    }
    Ok(())
}

/// Execute the store subcommands.
fn run_store(db: &str, action: StoreAction) -> i32 {
    let mut store = match SqliteStore::new(db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: failed to open database '{}': {}", db, e);
            return 3;
        }
    };

    match action {
        StoreAction::Put { input, name } => {
            let graph = match read_snapshot(&input) {
                Ok(graph) => graph,
                Err(code) => return code,
            };
            let name = name.unwrap_or_else(|| {
                input
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "snapshot".to_string())
            });
            match store.save_snapshot(&name, &graph) {
                Ok(id) => emit(&id.0.to_string(), None),
                Err(e) => {
                    eprintln!("Error: failed to save snapshot: {}", e);
                    3
                }
            }
        }
        StoreAction::Get { id, to } => {
            let graph = match store.load_versioned(SnapshotId(id)) {
                Ok(graph) => graph,
                Err(e) => {
                    eprintln!("Error: failed to load snapshot {}: {}", id, e);
                    return storage_exit_code(&e);
                }
            };
            let version = to.unwrap_or_else(|| graph.version());
            match encode(&graph, version) {
                Ok(text) => emit(&text, None),
                Err(code) => code,
            }
        }
        StoreAction::List => match store.list_snapshots() {
            Ok(summaries) => match serde_json::to_string_pretty(&summaries) {
                Ok(json) => emit(&json, None),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            },
            Err(e) => {
                eprintln!("Error: failed to list snapshots: {}", e);
                3
            }
        },
    }
}
