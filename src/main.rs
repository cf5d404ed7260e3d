use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use isolator::{Engine, EngineConfig, LookupTable, Span, SpanOutcome, server, table_to_csv};

/// Pick the switch that isolates a maintenance span with the least interrupted load.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Feeder file (OpenDSS-style Circuit/Line/Transformer/Load declarations)
    #[arg(long, global = true, default_value = "feeder.dss")]
    feeder: PathBuf,

    /// Separate load file
    #[arg(long, global = true)]
    loads: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// De-energization threshold, overrides the configuration file
    #[arg(long, global = true)]
    threshold: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Effect of each candidate switch opened on its own
    Map,

    /// Best switch for one span
    Best(BestArgs),

    /// Precompute the winner for every span
    Table(TableArgs),

    /// Serve queries over HTTP
    Serve(ServeArgs),
}

#[derive(Args)]
struct BestArgs {
    /// Line name of the span
    #[arg(required_unless_present = "buses")]
    span: Option<String>,

    /// Span given by its two end buses
    #[arg(long, num_args = 2, value_names = ["U", "V"], conflicts_with = "span")]
    buses: Option<Vec<String>>,
}

#[derive(Clone, Copy, ValueEnum)]
enum TableFormat {
    Json,
    Csv,
}

#[derive(Args)]
struct TableArgs {
    #[arg(long, value_enum, default_value_t = TableFormat::Json)]
    format: TableFormat,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(2);
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(threshold) = cli.threshold {
        config.deenergized_threshold = threshold;
    }
    if let Commands::Serve(args) = &cli.command {
        if let Some(host) = &args.host {
            config.server.host = host.clone();
        }
        if let Some(port) = args.port {
            config.server.port = port;
        }
    }
    Ok(config)
}

fn execute(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let engine = Engine::from_files(&cli.feeder, cli.loads.as_deref(), config)?;
    let mut session = engine.connectivity_session();

    match &cli.command {
        Commands::Map => {
            let map = session.map_all_switches()?;
            println!("{}", serde_json::to_string_pretty(&map)?);
        }

        Commands::Best(args) => {
            let span = match (&args.span, &args.buses) {
                (_, Some(buses)) => Span::buses(&buses[0], &buses[1]),
                (Some(name), None) => Span::line(name),
                (None, None) => anyhow::bail!("a span name or --buses U V is required"),
            };
            match session.best_switch_for_span(&span)? {
                SpanOutcome::Isolated(best) => {
                    println!("{}", serde_json::to_string_pretty(&best)?);
                }
                SpanOutcome::NoneIsolates => {
                    println!("no single switch isolates span {}", span);
                }
            }
        }

        Commands::Table(args) => {
            let table = LookupTable::recompute(&mut session)?;
            let text = match args.format {
                TableFormat::Json => serde_json::to_string_pretty(table.rows())?,
                TableFormat::Csv => table_to_csv(&table)?,
            };
            match &args.output {
                Some(path) => {
                    fs::write(path, text)?;
                    info!("Wrote {} rows to {}", table.len(), path.display());
                }
                None => println!("{}", text),
            }
        }

        Commands::Serve(_) => {
            let addr = engine.config().server.socket_addr()?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::run_server(session, addr))?;
        }
    }

    Ok(())
}
