mod commands;
mod logging;
mod progress;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use serde::Serialize;
use tracing::{error, info, warn};
use treeclosure_core::config::{load_configuration, QueueBackend};
use treeclosure_core::scanner::QUEUE_SNAPSHOT_KEY;
use treeclosure_core::status::ScanState;
use treeclosure_core::tree::{build_nested_tree, TreeNode};
use treeclosure_core::{
    AppConfig, ChunkReport, ChunkedScanner, Database, KvScheduler, KvStore, LocalFs, MemoryKv,
    ProgressReporter, ScanServices, SilentReporter, StartOutcome, PROCESS_CHUNK_HOOK,
};

#[cfg(feature = "rocksdb")]
use treeclosure_core::kv::RocksKv;

fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let outcome = match args.command {
        Some(Commands::Start { root }) => run_start(&config, root),
        Some(Commands::Chunk { force }) => run_chunk(&config, force),
        Some(Commands::Run { root }) => run_to_completion(&config, root),
        Some(Commands::Status) => run_status(&config),
        Some(Commands::Tree { id, depth, nested }) => run_tree(&config, id, depth, nested),
        Some(Commands::Search { query, exact, limit }) => run_search(&config, &query, exact, limit),
        Some(Commands::Export { out, id }) => run_export(&config, &out, id),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        Some(Commands::TruncateDb) => run_truncate(&config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

/// The store the queue snapshot is configured to live in. Status and the
/// continuation registry always live in the SQLite database.
enum QueueStore {
    Sqlite,
    Memory(MemoryKv),
    #[cfg(feature = "rocksdb")]
    Rocks(RocksKv),
}

impl QueueStore {
    fn open(config: &AppConfig) -> Result<Self> {
        match config.queue_backend {
            QueueBackend::Sqlite => Ok(Self::Sqlite),
            QueueBackend::Memory => {
                warn!("In-memory queue does not outlive this process; only `run` can finish a scan");
                Ok(Self::Memory(MemoryKv::new()))
            }
            #[cfg(feature = "rocksdb")]
            QueueBackend::Rocksdb => Ok(Self::Rocks(RocksKv::open(&config.rocksdb_path)?)),
            #[cfg(not(feature = "rocksdb"))]
            QueueBackend::Rocksdb => {
                bail!("queue_backend = \"rocksdb\" needs a build with the `rocksdb` feature")
            }
        }
    }

    fn kv<'a>(&'a self, db: &'a Database) -> &'a dyn KvStore {
        match self {
            Self::Sqlite => db,
            Self::Memory(kv) => kv,
            #[cfg(feature = "rocksdb")]
            Self::Rocks(kv) => kv,
        }
    }
}

fn open_database(config: &AppConfig) -> Result<Database> {
    Ok(Database::open(&config.db_path)?)
}

fn resolve_root(config: &AppConfig, root: Option<PathBuf>) -> PathBuf {
    let root = root.unwrap_or_else(|| PathBuf::from(&config.root_path));
    fs::canonicalize(&root).unwrap_or(root)
}

/// Wires a scanner to the configured stores and hands it to `f`.
fn with_scanner<T>(
    config: &AppConfig,
    reporter: &dyn ProgressReporter,
    f: impl FnOnce(&mut ChunkedScanner<'_>, &KvScheduler<'_>) -> Result<T>,
) -> Result<T> {
    let db = open_database(config)?;
    let queue_store = QueueStore::open(config)?;
    let scheduler = KvScheduler::new(&db);
    let local_fs = LocalFs::with_ignore_patterns(&config.ignore_patterns);

    let mut scanner = ChunkedScanner::new(
        ScanServices {
            store: &db,
            fs: &local_fs,
            queue_kv: queue_store.kv(&db),
            status_kv: &db,
            scheduler: &scheduler,
            reporter,
        },
        config.scan_settings(),
    );
    f(&mut scanner, &scheduler)
}

fn start(scanner: &mut ChunkedScanner<'_>, root: &Path) -> Result<bool> {
    match scanner.start_scan_job(root)? {
        StartOutcome::Started => {
            info!("Scan of {} started", root.display().to_string().green());
            Ok(true)
        }
        StartOutcome::InvalidRoot => {
            warn!("{} is not a directory, nothing to scan", root.display());
            Ok(false)
        }
    }
}

fn run_start(config: &AppConfig, root: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(config, root);
    with_scanner(config, &SilentReporter, |scanner, _| {
        if start(scanner, &root)? {
            info!("Run `treeclosure chunk` (or schedule it) to process the scan");
        }
        Ok(())
    })
}

fn run_chunk(config: &AppConfig, force: bool) -> Result<()> {
    with_scanner(config, &SilentReporter, |scanner, scheduler| {
        let due = force || scheduler.take_due(PROCESS_CHUNK_HOOK, Utc::now())?;
        if !due {
            match scheduler.next_due(PROCESS_CHUNK_HOOK)? {
                Some(at) => info!("Next chunk is due at {}", at.to_rfc3339()),
                None => info!("No chunk is scheduled"),
            }
            return Ok(());
        }
        let report = scanner.process_chunk()?;
        print_chunk_report(&report);
        Ok(())
    })
}

fn run_to_completion(config: &AppConfig, root: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(config, root);
    let reporter = CliReporter::new();
    with_scanner(config, &reporter, |scanner, scheduler| {
        if !start(scanner, &root)? {
            return Ok(());
        }

        // Fire the continuation hook each time it falls due, like a cron runner.
        while let Some(due) = scheduler.next_due(PROCESS_CHUNK_HOOK)? {
            let wait = (due - Utc::now()).to_std().unwrap_or_default();
            if !wait.is_zero() {
                thread::sleep(wait);
            }
            if scheduler.take_due(PROCESS_CHUNK_HOOK, Utc::now())? {
                let report = scanner.process_chunk()?;
                if report.finalized {
                    break;
                }
            }
        }

        let status = scanner.status()?;
        println!();
        info!(
            "{} items persisted in {}",
            format!("{}", status.total_scanned_items).cyan(),
            format!("{:.2}s", status.duration_secs().unwrap_or_default()).green(),
        );
        Ok(())
    })
}

fn print_chunk_report(report: &ChunkReport) {
    if report.finalized {
        info!("{}", "Scan completed".green());
        return;
    }
    info!(
        "Chunk: {} dequeued, {} persisted, {} retried, {} dropped, {} unreadable, {} remaining",
        format!("{}", report.dequeued).cyan(),
        format!("{}", report.persisted).green(),
        format!("{}", report.retried).yellow(),
        format!("{}", report.dropped).red(),
        format!("{}", report.skipped_unreadable).yellow(),
        format!("{}", report.remaining).cyan(),
    );
}

fn run_status(config: &AppConfig) -> Result<()> {
    with_scanner(config, &SilentReporter, |scanner, scheduler| {
        let status = scanner.status()?;
        let state = match status.state {
            ScanState::NotStarted => "not started".yellow(),
            ScanState::Started => "started".cyan(),
            ScanState::Completed => "completed".green(),
        };

        println!("State:          {}", state);
        println!(
            "Root:           {}",
            status.root_path.as_deref().unwrap_or("-")
        );
        println!(
            "Started at:     {}",
            status
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
        println!(
            "Finished at:    {}",
            status
                .finished_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
        println!("Items:          {}", status.total_scanned_items);
        if status.state == ScanState::Started {
            println!("Queued:         {}", scanner.pending_items());
            if let Some(due) = scheduler.next_due(PROCESS_CHUNK_HOOK)? {
                println!("Next chunk at:  {}", due.to_rfc3339());
            }
        }
        Ok(())
    })
}

fn subtree_root(db: &Database, id: Option<i64>) -> Result<Option<i64>> {
    match id {
        Some(id) => Ok(Some(id)),
        None => Ok(db.root_node()?.map(|node| node.id)),
    }
}

fn run_tree(config: &AppConfig, id: Option<i64>, depth: Option<u32>, nested: bool) -> Result<()> {
    let db = open_database(config)?;
    let Some(root_id) = subtree_root(&db, id)? else {
        info!("Nothing has been scanned yet");
        return Ok(());
    };

    let Some(tree) = build_nested_tree(db.get_subtree(root_id, depth)?) else {
        warn!("Node {} is missing or is not a directory", root_id);
        return Ok(());
    };

    if nested {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print_tree(&tree, 0);
    }
    Ok(())
}

fn print_tree(tree: &TreeNode, indent: usize) {
    let pad = "  ".repeat(indent);
    if tree.node.node_type.is_dir() {
        println!(
            "{}{}/ ({} items, {} bytes)",
            pad,
            tree.node.name.blue().bold(),
            tree.node.node_count,
            tree.node.size
        );
    } else {
        println!(
            "{}{} [{}] ({} bytes)",
            pad, tree.node.name, tree.node.node_type, tree.node.size
        );
    }
    for child in &tree.children {
        print_tree(child, indent + 1);
    }
}

fn run_search(config: &AppConfig, query: &str, exact: bool, limit: i64) -> Result<()> {
    let db = open_database(config)?;
    let nodes = db.search_by_path(query, exact, limit)?;
    if nodes.is_empty() {
        info!("No nodes match '{}'", query);
        return Ok(());
    }
    for node in &nodes {
        println!(
            "{:>8}  {:<7}  {:>12}  {}",
            node.id,
            node.node_type.to_string(),
            node.size,
            node.path.green()
        );
    }
    info!("{} matches", nodes.len());
    Ok(())
}

#[derive(Serialize)]
struct ExportRow<'a> {
    depth: i64,
    id: i64,
    parent_id: Option<i64>,
    path: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    node_type: &'a str,
    size: i64,
    node_count: i64,
    last_modified: Option<i64>,
    last_scanned: &'a str,
}

fn run_export(config: &AppConfig, out: &Path, id: Option<i64>) -> Result<()> {
    let db = open_database(config)?;
    let Some(root_id) = subtree_root(&db, id)? else {
        bail!("nothing has been scanned yet");
    };

    let entries = db.get_subtree(root_id, None)?;
    let mut writer = csv::Writer::from_path(out)?;
    for entry in &entries {
        writer.serialize(ExportRow {
            depth: entry.depth,
            id: entry.node.id,
            parent_id: entry.node.parent_id,
            path: &entry.node.path,
            name: &entry.node.name,
            node_type: entry.node.node_type.as_str(),
            size: entry.node.size,
            node_count: entry.node.node_count,
            last_modified: entry.node.last_modified,
            last_scanned: &entry.node.last_scanned,
        })?;
    }
    writer.flush()?;
    info!("Exported {} rows to {}", entries.len(), out.display());
    Ok(())
}

fn run_truncate(config: &AppConfig) -> Result<()> {
    match prompt_confirm(
        "Are you SURE you want to COMPLETELY DELETE the Database?",
        Some(false),
    ) {
        Ok(true) => {
            let db = open_database(config)?;
            db.truncate_all()?;
            let queue_store = QueueStore::open(config)?;
            queue_store.kv(&db).delete(QUEUE_SNAPSHOT_KEY)?;
            println!("All tables truncated");
            Ok(())
        }
        _ => process::exit(0),
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
