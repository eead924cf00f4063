use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loam_heap::{dump_heap, export_json, heap_stats, import_json, Collector, Heap};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "loam", version, about = "Loam heap image tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a heap image and print usage statistics
    Info { image: PathBuf },
    /// List every block in a heap image
    Dump { image: PathBuf },
    /// Build a heap image from a JSON document
    Import {
        json: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Heap capacity in bytes
        #[arg(long, default_value_t = 1024 * 1024)]
        capacity: usize,
        /// Run the collector before writing, compacting the image
        #[arg(long)]
        compact: bool,
    },
    /// Render a heap image's root value as JSON
    Export { image: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Commands::Info { image } => info(&image),
        Commands::Dump { image } => dump(&image),
        Commands::Import {
            json,
            output,
            capacity,
            compact,
        } => import(&json, &output, capacity, compact),
        Commands::Export { image } => export(&image),
    }
}

fn load(path: &PathBuf) -> Result<Heap> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let heap = Heap::adopt_image(&bytes, bytes.len())
        .with_context(|| format!("adopting {}", path.display()))?;
    Ok(heap)
}

fn info(image: &PathBuf) -> Result<()> {
    let heap = load(image)?;
    let stats = heap_stats(&heap);
    println!("{}: valid heap image", image.display());
    println!("  capacity          {:>10} bytes", stats.capacity);
    println!("  used              {:>10} bytes", stats.used);
    println!("  blocks            {:>10}", stats.blocks);
    println!("  reachable blocks  {:>10}", stats.reachable_blocks);
    println!("  reachable bytes   {:>10}", stats.reachable_bytes);
    println!("  root              {}", heap.root());
    Ok(())
}

fn dump(image: &PathBuf) -> Result<()> {
    let heap = load(image)?;
    let mut stdout = std::io::stdout().lock();
    dump_heap(&heap, &mut stdout)?;
    Ok(())
}

fn import(json: &PathBuf, output: &PathBuf, capacity: usize, compact: bool) -> Result<()> {
    let text = std::fs::read_to_string(json).with_context(|| format!("reading {}", json.display()))?;
    let mut heap = Heap::new(capacity);
    let root = import_json(&mut heap, &text)?;
    heap.set_root(root);
    if compact {
        Collector::run(&mut heap);
    }
    std::fs::write(output, heap.as_bytes())
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{} -> {} ({} bytes)",
        json.display(),
        output.display(),
        heap.used()
    );
    Ok(())
}

fn export(image: &PathBuf) -> Result<()> {
    let heap = load(image)?;
    let doc = export_json(heap.root())?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
