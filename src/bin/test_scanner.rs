// Manual check for the file search: scan some paths, print what came back
use anyhow::Result;
use clap::Parser;
use panflute::audio::{FileSearchWorker, FileTagReader, ScanProgress};
use panflute::config::Settings;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "test_scanner")]
#[command(about = "Scan files and directories the way the player does and list the results")]
struct Args {
    /// Files or directories; defaults to the configured music directories
    paths: Vec<PathBuf>,

    /// How many records to print in full
    #[arg(long, default_value_t = 10)]
    show: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let paths = if args.paths.is_empty() {
        Settings::load()?.music_directories
    } else {
        args.paths
    };

    println!("Panflute scanner test");
    println!("=====================");
    for path in &paths {
        println!("Scanning {}", path.display());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = FileSearchWorker::new(FileTagReader::new()).with_progress(tx);
    let handle = worker.start_search(paths)?;

    let printer = tokio::spawn(async move {
        let mut errors = 0usize;
        while let Some(event) = rx.recv().await {
            match event {
                ScanProgress::Error { path, error } => {
                    errors += 1;
                    println!("  skipped {}: {}", path.display(), error);
                }
                ScanProgress::Completed { total_records, cancelled } => {
                    println!("Done: {} records{}", total_records, if cancelled { " (cancelled)" } else { "" });
                }
                _ => {}
            }
        }
        errors
    });

    let mut outcome = handle.await?;
    drop(worker);
    let errors = printer.await?;
    outcome.records.sort_by(|a, b| a.album_order(b));

    println!();
    for (i, record) in outcome.records.iter().take(args.show).enumerate() {
        println!("{}. {}", i + 1, record.display_title());
        println!("   Artist: {}", record.display_performer());
        println!("   Album: {}", record.display_album());
        println!("   Duration: {}", record.duration_string());
        if record.is_vbr() {
            println!("   VBR");
        }
        println!("   Path: {}", record.file_path.display());
        println!();
    }
    if outcome.records.len() > args.show {
        println!("... and {} more records", outcome.records.len() - args.show);
    }

    let mut formats: HashMap<String, usize> = HashMap::new();
    for record in &outcome.records {
        let ext = record
            .file_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        *formats.entry(ext).or_insert(0) += 1;
    }
    println!("Format breakdown:");
    for (format, count) in formats {
        println!("   {}: {} files", format, count);
    }
    if errors > 0 {
        println!("{} files or directories could not be read", errors);
    }

    Ok(())
}
