use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use inventory_risk::config::AppConfig;
use inventory_risk::error::AppError;
use inventory_risk::telemetry;
use inventory_risk::workflows::inventory::ingest::{self, RowFormat};
use inventory_risk::workflows::inventory::{
    BatchSummary, CriteriaCatalog, InventoryEnricher, ReferenceIndex, ReferenceStore,
    ScoreSource, ScoredRecord, ScoringEngine,
};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "inventory-risk",
    about = "Score inventory rows for risk and maintain the reference dataset",
    version
)]
struct Cli {
    /// Override the configured criteria catalog (JSON)
    #[arg(long, global = true)]
    criteria: Option<PathBuf>,
    /// Override the configured reference dataset (JSON)
    #[arg(long, global = true)]
    reference: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich a batch of rows with score, category and inventory status
    Score(ScoreArgs),
    /// List rows whose product is absent from the reference dataset
    Missing(InputArgs),
    /// Append rows whose product is absent to the reference dataset
    AddMissing(InputArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Rows to process (.json array of objects or .csv with a header line)
    #[arg(long)]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Fill missing attributes from the reference dataset and rescore every row
    #[arg(long)]
    backfill: bool,
    /// Evaluation date used for date criteria (defaults to today)
    #[arg(long, value_parser = parse_date)]
    today: Option<NaiveDate>,
    /// Write enriched rows to this file (.json or .csv)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print the per-criterion scoring trace of computed rows
    #[arg(long)]
    trace: bool,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("application error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;

    if let Some(path) = cli.criteria {
        config.scoring.criteria_path = path;
    }
    if let Some(path) = cli.reference {
        config.reference.path = path;
    }

    telemetry::init(&config.telemetry)?;
    info!(?config.environment, "inventory risk scoring starting");

    match cli.command {
        Command::Score(args) => run_score(&config, args),
        Command::Missing(args) => run_missing(&config, args),
        Command::AddMissing(args) => run_add_missing(&config, args),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// A reference dataset that does not exist yet is treated as empty.
fn load_index(config: &AppConfig) -> Result<ReferenceIndex, AppError> {
    let path = &config.reference.path;
    if !path.exists() {
        warn!(path = %path.display(), "reference dataset not found, starting empty");
        return Ok(ReferenceIndex::from_records(
            Vec::new(),
            &config.reference.product_field,
        ));
    }
    Ok(ReferenceIndex::from_path(
        path,
        &config.reference.product_field,
    )?)
}

fn build_enricher(config: &AppConfig, today: NaiveDate) -> Result<InventoryEnricher, AppError> {
    let catalog = CriteriaCatalog::from_path(&config.scoring.criteria_path)?;
    let engine =
        ScoringEngine::new(catalog, today).with_date_criterion(&config.scoring.date_criterion);
    Ok(InventoryEnricher::new(engine, load_index(config)?))
}

fn run_score(config: &AppConfig, args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs {
        input,
        backfill,
        today,
        output,
        trace,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let enricher = build_enricher(config, today)?;
    let rows = ingest::read_rows_from_path(&input.input)?;

    let records = if backfill {
        enricher.enrich_with_backfill(&rows)
    } else {
        enricher.enrich(&rows)
    };
    let summary = enricher.summarize(&rows, &records);

    if let Some(path) = output {
        write_records(&path, &records)?;
        info!(path = %path.display(), rows = records.len(), "enriched rows written");
    } else {
        render_records(&records);
    }

    if trace {
        render_trace(&enricher, &records);
    }

    render_summary(&input.input, today, &summary);
    Ok(())
}

fn run_missing(config: &AppConfig, args: InputArgs) -> Result<(), AppError> {
    let index = load_index(config)?;
    let rows = ingest::read_rows_from_path(&args.input)?;
    let missing = index.missing_rows(&rows);

    if missing.is_empty() {
        println!("Missing references: none");
        return Ok(());
    }

    println!("Missing references ({})", missing.len());
    for &position in &missing {
        println!(
            "- row {}: {}",
            position,
            rows[position].product_key(index.product_field())
        );
    }
    Ok(())
}

fn run_add_missing(config: &AppConfig, args: InputArgs) -> Result<(), AppError> {
    let index = load_index(config)?;
    let rows = ingest::read_rows_from_path(&args.input)?;
    let missing = index.missing_rows(&rows);

    if missing.is_empty() {
        println!("Missing references: none, reference dataset unchanged");
        return Ok(());
    }

    let store = ReferenceStore::new(&config.reference.path);
    let report = store.append_many(
        missing.iter().map(|&position| (position, &rows[position])),
        index.product_field(),
    );

    println!(
        "Added {} reference(s) to {}",
        report.added,
        store.path().display()
    );
    for failure in &report.failures {
        println!(
            "- row {} ({}) failed: {}",
            failure.row, failure.product_key, failure.error
        );
    }
    Ok(())
}

fn write_records(path: &Path, records: &[ScoredRecord]) -> Result<(), AppError> {
    let format = RowFormat::from_path(path)?;
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    match format {
        RowFormat::Json => ingest::write_json_records(writer, records)?,
        RowFormat::Csv => ingest::write_csv_records(writer, records)?,
    }
    Ok(())
}

fn render_records(records: &[ScoredRecord]) {
    println!("Enriched rows");
    for (position, record) in records.iter().enumerate() {
        let key = if record.product_key.is_empty() {
            "(no product)"
        } else {
            record.product_key.as_str()
        };
        println!(
            "- {} | {} | score {} | {} | {} | {}",
            position,
            key,
            record.score,
            record.category.label(),
            record.status.label(),
            record.score_source.label()
        );
    }
}

fn render_trace(enricher: &InventoryEnricher, records: &[ScoredRecord]) {
    for (position, record) in records.iter().enumerate() {
        if record.score_source != ScoreSource::Computed {
            continue;
        }
        println!("\nTrace for row {} ({})", position, record.product_key);
        for line in enricher.engine().score(&record.attributes).trace {
            println!("  {line}");
        }
    }
}

fn render_summary(input: &Path, today: NaiveDate, summary: &BatchSummary) {
    println!("\nBatch summary for {} (evaluated {})", input.display(), today);
    println!(
        "Rows: {} ({} reused, {} computed)",
        summary.total, summary.reused, summary.computed
    );
    println!("Missing references: {}", summary.missing_references);
    println!("Null cells: {}", summary.null_cells);

    println!("\nCategories");
    for (category, count) in &summary.by_category {
        println!("- {}: {}", category.label(), count);
    }

    println!("\nInventory status");
    for (status, count) in &summary.by_status {
        println!("- {}: {}", status, count);
    }
}
