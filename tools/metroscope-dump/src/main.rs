use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use metroscope_core::{HttpFetcher, ServiceConfig, TransitMetrics, TransitService};
use metroscope_transit::archive::{self, bytes_to_text};
use metroscope_transit::tabular::parse_ridership_log;
use metroscope_transit::{CityIdentifier, LineVocabulary};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod local;
mod output;

use local::{assemble, AssembleOptions, InputFormat, Layer};
use output::{write_json, write_network_geojson};

#[derive(Parser, Debug)]
#[command(
    name = "metroscope-dump",
    author,
    version,
    about = "Reconstruct transit networks from open data and write them as GeoJSON",
    long_about = "Fetches a city's configured sources (graph queries, scheduling feeds, \
                  direct JSON dumps) and rebuilds its bus stops, metro and rail lines and \
                  stations.\n\n\
                  The same reconstruction can be run against local files with `assemble`, \
                  and zipped inputs can be inspected with `archive`."
)]
struct Args {
    /// Verbose output (show debug messages)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a configured city through the network service
    Fetch {
        /// Service configuration JSON
        #[arg(short, long)]
        config: PathBuf,

        /// City identifier from the configuration
        #[arg(long)]
        city: String,

        /// Output GeoJSON file for the network
        #[arg(short, long)]
        output: PathBuf,

        /// Also write derived metrics as JSON to this file
        #[arg(long)]
        metrics: Option<PathBuf>,

        /// Also write the ridership summary as JSON to this file
        #[arg(long)]
        ridership: Option<PathBuf>,
    },

    /// Build one layer of a network from a local file
    Assemble {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(short, long, value_enum)]
        format: InputFormat,

        /// Network layer to build
        #[arg(short, long, value_enum, default_value = "metro")]
        layer: Layer,

        /// Line vocabulary JSON: `[{"name": "Blue", "color": "blue"}, ...]`
        #[arg(long)]
        vocabulary: Option<PathBuf>,

        /// Route kinds to keep from a graph input (repeatable)
        #[arg(long = "route-kind")]
        route_kinds: Vec<String>,

        /// Route types to keep from a feed input (repeatable)
        #[arg(long = "route-type")]
        route_types: Vec<u32>,

        /// Merge direction and service variants of one corridor
        #[arg(long)]
        merge: bool,

        /// Sample every n-th line vertex when matching stations
        #[arg(long, default_value_t = metroscope_transit::matching::DEFAULT_MATCH_STRIDE)]
        stride: usize,

        /// Service topology JSON for point-topology stops
        #[arg(long)]
        topology: Option<PathBuf>,

        /// Output GeoJSON file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Summarize a local ridership log (plain or zipped)
    Ridership {
        /// Input log file
        #[arg(short, long)]
        input: PathBuf,

        /// Archive entry holding the log
        #[arg(long)]
        entry: Option<String>,

        /// Output JSON file, printed when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect a zip archive
    Archive {
        #[command(subcommand)]
        action: ArchiveAction,
    },
}

#[derive(Subcommand, Debug)]
enum ArchiveAction {
    /// List entry names
    List { input: PathBuf },

    /// Extract one entry
    Extract {
        input: PathBuf,

        /// Entry name, matched exactly or by file name
        entry: String,

        /// Output file, written to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Fetch {
            config,
            city,
            output,
            metrics,
            ridership,
        } => run_fetch(&config, &city, &output, metrics.as_deref(), ridership.as_deref()).await,
        Command::Assemble {
            input,
            format,
            layer,
            vocabulary,
            route_kinds,
            route_types,
            merge,
            stride,
            topology,
            output,
        } => {
            let vocabulary = match vocabulary {
                Some(path) => serde_json::from_slice::<LineVocabulary>(&read_input(&path)?)
                    .with_context(|| format!("Invalid vocabulary in {}", path.display()))?,
                None => LineVocabulary::default(),
            };
            let topology = topology.as_deref().map(read_input).transpose()?;
            let options = AssembleOptions {
                route_kinds,
                route_types,
                vocabulary,
                merge_corridors: merge,
                stride,
                topology,
            };
            run_assemble(&input, format, layer, &options, &output)
        }
        Command::Ridership {
            input,
            entry,
            output,
        } => run_ridership(&input, entry.as_deref(), output.as_deref()),
        Command::Archive { action } => run_archive(action),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        bail!("Input file does not exist: {}", path.display());
    }
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn run_fetch(
    config_path: &Path,
    city: &str,
    output: &Path,
    metrics_output: Option<&Path>,
    ridership_output: Option<&Path>,
) -> Result<()> {
    tracing::info!("=== Metroscope ===");
    tracing::info!("Config: {}", config_path.display());

    let config = ServiceConfig::from_json(&read_input(config_path)?)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
    let fetcher = HttpFetcher::new(&config.settings).context("Failed to build HTTP client")?;
    let top_n = config.settings.top_busiest_stops;
    let service = TransitService::new(config, Arc::new(fetcher));
    let city = CityIdentifier::new(city);

    tracing::info!("Phase 1: Reconstructing network for {}", city);
    let network = service
        .try_fetch_transit_network(&city)
        .await
        .with_context(|| format!("Failed to reconstruct {city}"))?;
    write_network_geojson(&network, output)?;

    if let Some(path) = metrics_output {
        tracing::info!("Phase 2: Deriving metrics");
        write_json(&TransitMetrics::derive(&network, top_n), Some(path))?;
    }

    if let Some(path) = ridership_output {
        tracing::info!("Phase 3: Summarizing ridership");
        match service.try_fetch_ridership(&city).await? {
            Some(summary) => write_json(&*summary, Some(path))?,
            None => tracing::warn!("{} has no ridership source", city),
        }
    }

    tracing::info!("=== Done ===");
    Ok(())
}

fn run_assemble(
    input: &Path,
    format: InputFormat,
    layer: Layer,
    options: &AssembleOptions,
    output: &Path,
) -> Result<()> {
    tracing::info!("Input: {} ({:?}, {:?})", input.display(), format, layer);
    let bytes = read_input(input)?;
    let network = assemble(&bytes, format, layer, options)?;
    if network.is_empty() {
        tracing::warn!("Nothing was reconstructed from {}", input.display());
    }
    write_network_geojson(&network, output)
}

fn run_ridership(input: &Path, entry: Option<&str>, output: Option<&Path>) -> Result<()> {
    let bytes = read_input(input)?;
    let text = match entry {
        Some(entry) => archive::extract_text(&bytes, entry)?,
        None => bytes_to_text(bytes),
    };

    let accumulator = parse_ridership_log(&text).context("Failed to parse ridership log")?;
    tracing::info!(
        "{} stations over {} days",
        accumulator.station_count(),
        accumulator.date_count()
    );
    write_json(&accumulator.summarize(&HashMap::new()), output)
}

fn run_archive(action: ArchiveAction) -> Result<()> {
    match action {
        ArchiveAction::List { input } => {
            for name in archive::entry_names(&read_input(&input)?)? {
                println!("{name}");
            }
        }
        ArchiveAction::Extract {
            input,
            entry,
            output,
        } => {
            let data = archive::extract_entry(&read_input(&input)?, &entry)?;
            match output {
                Some(path) => std::fs::write(&path, &data)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => std::io::stdout()
                    .write_all(&data)
                    .context("Failed to write to stdout")?,
            }
        }
    }
    Ok(())
}
