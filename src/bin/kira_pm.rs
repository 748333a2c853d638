use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_pathway_merger::app::{App, BuildList, BuildResult, MapResult, MergeOptions, MergeRunResult, StatusResult};
use kira_pathway_merger::config::ConfigLoader;
use kira_pathway_merger::domain::{DatasetInput, ReferenceSource};
use kira_pathway_merger::error::KiraError;
use kira_pathway_merger::output::{JsonOutput, OutputMode, StderrProgress};
use kira_pathway_merger::store::Store;

#[derive(Parser)]
#[command(name = "kira-pm")]
#[command(about = "Canonical entity warehouse and merge engine for pathway datasets")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ./kira-pm.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Store root, overriding the config file and the default location.
    #[arg(long, global = true)]
    store: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build or inspect warehouse builds")]
    Warehouse(WarehouseArgs),
    #[command(about = "Merge dataset graphs into the target graph")]
    Merge(MergeArgs),
    #[command(about = "Map an identifier to primary ids of a collection")]
    Map(MapArgs),
    #[command(about = "Show store, build and target status")]
    Status,
}

#[derive(Args)]
struct WarehouseArgs {
    #[command(subcommand)]
    command: WarehouseCommand,
}

#[derive(Subcommand)]
enum WarehouseCommand {
    #[command(about = "Build a new warehouse and id-mapping index")]
    Build(BuildArgs),
    #[command(about = "List warehouse builds")]
    List,
}

#[derive(Args)]
struct BuildArgs {
    /// Reference extract as `uniprot:<path>`, `chebi:<path>` or `records:<path>`.
    #[arg(long = "source", required = true)]
    sources: Vec<ReferenceSource>,

    /// Curated two-column mapping TSV.
    #[arg(long = "mapping")]
    mappings: Vec<Utf8PathBuf>,
}

#[derive(Args)]
struct MergeArgs {
    /// Dataset graph as `label=path` or `path`.
    #[arg(required = true)]
    datasets: Vec<DatasetInput>,

    /// Start from an empty target instead of the stored snapshot.
    #[arg(long)]
    fresh: bool,
}

#[derive(Args)]
struct MapArgs {
    id: String,

    #[arg(long)]
    to: String,

    #[arg(long)]
    from: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::MissingWarehouse(_)
        | KiraError::MissingMappingIndex(_)
        | KiraError::MissingConfig(_)
        | KiraError::NodeNotFound(_) => 2,
        KiraError::DatasetUnreadable { .. }
        | KiraError::DatasetInvalid { .. }
        | KiraError::InvalidSource(_)
        | KiraError::InvalidDatasetInput(_)
        | KiraError::InvalidProvenanceLabel(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = match cli.store.clone().or_else(|| config.store.clone()) {
        Some(root) => Store::new_with_root(root),
        None => Store::new()?,
    };
    let app = App::new(store, config)?;

    match cli.command {
        Commands::Warehouse(args) => match args.command {
            WarehouseCommand::Build(build) => run_build(&app, build, output_mode),
            WarehouseCommand::List => run_list(&app, output_mode),
        },
        Commands::Merge(args) => run_merge(&app, args, output_mode),
        Commands::Map(args) => run_map(&app, args, output_mode),
        Commands::Status => run_status(&app, output_mode),
    }
}

fn run_build(app: &App, args: BuildArgs, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => {
            let result = app.build_warehouse(&args.sources, &args.mappings, &JsonOutput)?;
            JsonOutput::print_build(&result).into_diagnostic()?;
        }
        OutputMode::Human => {
            let result = app.build_warehouse(&args.sources, &args.mappings, &StderrProgress)?;
            print_build_summary(&result);
        }
    }
    Ok(())
}

fn run_list(app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.list_builds()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_builds(&result).into_diagnostic()?,
        OutputMode::Human => print_build_list(&result),
    }
    Ok(())
}

fn run_merge(app: &App, args: MergeArgs, output_mode: OutputMode) -> miette::Result<()> {
    let options = MergeOptions { fresh: args.fresh };
    match output_mode {
        OutputMode::Json => {
            let result = app.merge(&args.datasets, options, &JsonOutput)?;
            JsonOutput::print_merge(&result).into_diagnostic()?;
        }
        OutputMode::Human => {
            let result = app.merge(&args.datasets, options, &StderrProgress)?;
            print_merge_summary(&result);
        }
    }
    Ok(())
}

fn run_map(app: &App, args: MapArgs, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.map(&args.id, &args.to, args.from.as_deref())?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_map(&result).into_diagnostic()?,
        OutputMode::Human => print_map_result(&result),
    }
    Ok(())
}

fn run_status(app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.status()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_status(&result).into_diagnostic()?,
        OutputMode::Human => print_status(&result),
    }
    Ok(())
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

fn print_build_summary(result: &BuildResult) {
    let report = &result.report;
    println!("{CYAN}KIRA-PM warehouse {}{RESET}", result.build_id);
    println!(
        "{GREEN}records: {}  nodes: {}  entity references: {}  mapping rows: {}{RESET}",
        report.records, report.nodes, report.entity_references, report.mapping_rows
    );
    if report.skipped_records + report.skipped_mapping_rows + report.cycles_rejected > 0 {
        println!(
            "{YELLOW}skipped records: {}  skipped mapping rows: {}  rejected member cycles: {}{RESET}",
            report.skipped_records, report.skipped_mapping_rows, report.cycles_rejected
        );
    }
    for source in &report.sources {
        match &source.error {
            Some(error) => println!("{RED}  x {}: {error}{RESET}", source.source),
            None => println!(
                "{GREEN}  - {}: {} records, {} skipped{RESET}",
                source.source, source.records, source.skipped
            ),
        }
    }
}

fn print_build_list(result: &BuildList) {
    if result.builds.is_empty() {
        println!("{YELLOW}no warehouse builds{RESET}");
        return;
    }
    for build in &result.builds {
        let marker = if build.current { "*" } else { " " };
        println!(
            "{marker} {}  nodes={}  mapping_rows={}",
            build.build_id,
            build.nodes.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
            build
                .mapping_rows
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }
}

fn print_merge_summary(result: &MergeRunResult) {
    println!(
        "{CYAN}KIRA-PM merge against {}{}{RESET}",
        result.build_id,
        if result.resumed { " (resumed)" } else { "" }
    );
    for report in &result.reports {
        println!(
            "{GREEN}  {}: resolved={} unresolved={} ambiguous={} deduplicated={} organism_filtered={} dangling_pruned={} added={}{RESET}",
            report.dataset,
            report.resolved,
            report.unresolved,
            report.ambiguous,
            report.deduplicated,
            report.organism_filtered,
            report.dangling_pruned,
            report.nodes_added
        );
    }
    for failure in &result.failures {
        println!("{RED}  {}: {}{RESET}", failure.dataset, failure.error);
    }
    println!("{CYAN}target nodes: {}{RESET}", result.target_nodes);
}

fn print_map_result(result: &MapResult) {
    if result.primary_ids.is_empty() {
        println!("{YELLOW}{} -> {}: no mapping known{RESET}", result.id, result.target);
        return;
    }
    for primary in &result.primary_ids {
        println!("{} -> {}:{primary}", result.id, result.target);
    }
}

fn print_status(result: &StatusResult) {
    println!("store: {}", result.store_root);
    match &result.current_build {
        Some(build) => println!("current build: {build} ({} total)", result.builds),
        None => println!("{YELLOW}no warehouse build yet{RESET}"),
    }
    match &result.target {
        Some(target) => {
            let color = if target.stale { YELLOW } else { GREEN };
            println!(
                "{color}target: {} nodes from {} datasets, built against {}{}{RESET}",
                target.nodes,
                target.datasets.len(),
                target.build_id,
                if target.stale { " (stale)" } else { "" }
            );
        }
        None => println!("target: none"),
    }
}
