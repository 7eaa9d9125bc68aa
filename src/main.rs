use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use yolohdl_fixed::{quantize, FixedFormat};
use yolohdl_manifest::Manifest;
use yolohdl_network::{
    elaborate_graph, GeneratorOptions, GraphBuilder, NetworkDescription, NetworkGraph, WeightStore,
};
use yolohdl_parallel::{ElaborationEngine, EngineConfig};

/// yolohdl - structural hardware generator for quantized YOLO networks
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Elaborate every unit of a network
    Build {
        /// Network description (YAML)
        network: PathBuf,

        /// Generator configuration (defaults to yolohdl.toml next to the network)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Worker threads, overriding the configuration
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Print the unit report as JSON
        #[arg(long)]
        json: bool,

        /// Output directory, overriding `output_path`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print fixed-point encodings
    Quantize {
        /// Values to encode
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,

        /// Integer bits, overriding the configuration
        #[arg(short, long)]
        integer_bits: Option<u32>,

        /// Fraction bits, overriding the configuration
        #[arg(short, long)]
        fraction_bits: Option<u32>,

        /// Generator configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a network description and its tensor lengths
    Check {
        /// Network description (YAML)
        network: PathBuf,

        /// Generator configuration (defaults to yolohdl.toml next to the network)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build {
            network,
            config,
            threads,
            json,
            output,
        } => {
            build_network(&network, config.as_deref(), threads, json, output)?;
        }

        Commands::Quantize {
            values,
            integer_bits,
            fraction_bits,
            config,
        } => {
            quantize_values(&values, integer_bits, fraction_bits, config.as_deref())?;
        }

        Commands::Check { network, config } => {
            check_network(&network, config.as_deref())?;
        }
    }

    Ok(())
}

/// Load the configuration file, or discover one next to `network`
fn load_manifest(config: Option<&Path>, network: Option<&Path>) -> Result<Manifest> {
    let manifest = match config {
        Some(path) => yolohdl_manifest::from_path(path)
            .with_context(|| format!("Failed to load configuration {:?}", path))?,
        None => {
            let dir = network
                .and_then(Path::parent)
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            yolohdl_manifest::discover(dir)
                .with_context(|| format!("Failed to load configuration from {:?}", dir))?
        }
    };
    manifest.validate().context("Invalid configuration")?;
    Ok(manifest)
}

fn generator_options(manifest: &Manifest) -> Result<GeneratorOptions> {
    Ok(GeneratorOptions {
        format: manifest.fixed_format()?,
        leak_shift: manifest.activation.leak_shift,
        epsilon: manifest.batch_norm.epsilon,
    })
}

/// Parse the description, load its tensors and build the emission graph
fn load_graph(
    network: &Path,
    manifest: &Manifest,
) -> Result<(NetworkDescription, Arc<WeightStore>, NetworkGraph)> {
    info!("Reading network description {:?}", network);
    let description = NetworkDescription::from_path(network)
        .with_context(|| format!("Failed to read network description {:?}", network))?;

    let store = WeightStore::load(&description.weights).context("Failed to load weights")?;
    let graph = GraphBuilder::new(&description, &store, generator_options(manifest)?)
        .build()
        .context("Failed to build network graph")?;

    if graph.consumed.0 < store.weights.len() {
        warn!(
            "{} of {} weights are unused",
            store.weights.len() - graph.consumed.0,
            store.weights.len()
        );
    }

    Ok((description, Arc::new(store), graph))
}

fn print_layers(graph: &NetworkGraph) {
    println!(
        "{:<8}{:<18}{:<10}{:<10}{:<8}{:<6}",
        "layer", "type", "channels", "filters", "width", "units"
    );
    println!("{}", "-".repeat(60));
    for layer in &graph.layers {
        println!(
            "{:<8}{:<18}{:<10}{:<10}{:<8}{:<6}",
            layer.index, layer.kind, layer.channels, layer.filters, layer.width, layer.units
        );
    }
}

fn build_network(
    network: &Path,
    config: Option<&Path>,
    threads: Option<usize>,
    json: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let manifest = load_manifest(config, Some(network))?;
    let (description, store, graph) = load_graph(network, &manifest)?;

    let worker_threads = threads.unwrap_or_else(|| manifest.worker_threads());
    let engine = ElaborationEngine::with_config(EngineConfig { worker_threads })
        .context("Failed to start elaboration workers")?;
    let elaboration =
        elaborate_graph(&graph, store, &engine).context("Failed to elaborate network")?;

    let report = elaboration.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_layers(&graph);
        println!();
        println!(
            "Elaborated {} entities ({} output channels, width {})",
            elaboration.entities.len(),
            graph.output_channels,
            graph.output_width
        );
    }

    if let Some(output_dir) = output.or(description.output_path) {
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

        let entities_path = output_dir.join("entities.json");
        fs::write(&entities_path, serde_json::to_string_pretty(&elaboration.entities)?)
            .with_context(|| format!("Failed to write {:?}", entities_path))?;
        let report_path = output_dir.join("report.json");
        fs::write(&report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write {:?}", report_path))?;
        info!("Wrote {:?} and {:?}", entities_path, report_path);
    }

    let stats = engine.stats();
    info!(
        "{} units elaborated on {} workers ({:.1}% succeeded)",
        stats.completed_tasks,
        stats.worker_threads,
        stats.efficiency()
    );
    Ok(())
}

fn quantize_values(
    values: &[f64],
    integer_bits: Option<u32>,
    fraction_bits: Option<u32>,
    config: Option<&Path>,
) -> Result<()> {
    let manifest = load_manifest(config, None)?;
    let format = FixedFormat::new(
        integer_bits.unwrap_or(manifest.format.integer_bits),
        fraction_bits.unwrap_or(manifest.format.fraction_bits),
    )
    .context("Invalid fixed-point format")?;

    let width = format.width() as usize;
    println!("{} ({} bits, lsb {})", format, width, format.lsb());
    for &value in values {
        let q = quantize(value, format);
        println!(
            "{:>12} -> {:0width$b}  raw {:>8}  decoded {}",
            value,
            q.bits(),
            q.raw(),
            q.to_f64(),
            width = width
        );
    }
    Ok(())
}

fn check_network(network: &Path, config: Option<&Path>) -> Result<()> {
    let manifest = load_manifest(config, Some(network))?;
    let (_, store, graph) = load_graph(network, &manifest)?;

    print_layers(&graph);
    println!();
    println!(
        "{} emission units, {} of {} weights consumed",
        graph.units.len(),
        graph.consumed.0,
        store.weights.len()
    );
    Ok(())
}
