use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use food_trends::{
    db, get_load_events, insert_years, load_csv, load_facts, load_joined_facts, load_years_csv,
    report, setup_database, table_counts, uk_reference_years, Analysis, AnalyticsReport,
    ExpenditureRecord, FactExtract, OutputFormat, QuantityRecord,
};

/// Load UK household food statistics into SQLite and run trend analyses
/// over the joined quantity and expenditure facts.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "FOOD_TRENDS_DB", default_value = "food_trends.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the schema and seed the year dimension
    Init {
        /// Year dimension CSV (year,decade,is_recession,notes); defaults to
        /// the built-in UK list for 1974-2023
        #[arg(long)]
        years: Option<PathBuf>,
    },

    /// Load the quantity and expenditure extracts in one transaction
    Load {
        #[arg(long)]
        quantity: PathBuf,

        #[arg(long)]
        expenditure: PathBuf,
    },

    /// Run one analysis (or `all`) over the joined facts
    Report {
        /// cost-per-unit, trend, era, inflation, volatility, summary,
        /// recession, recession-summary or all
        analysis: String,

        /// json or csv (`all` is json only)
        #[arg(long, default_value = "json")]
        format: OutputFormat,
    },

    /// Show table row counts and recent loads
    Stats,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { years } => run_init(&cli.db, years.as_deref()),
        Commands::Load { quantity, expenditure } => run_load(&cli.db, &quantity, &expenditure),
        Commands::Report { analysis, format } => run_report(&cli.db, &analysis, format),
        Commands::Stats => run_stats(&cli.db),
    }
}

fn open_existing(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        bail!(
            "database not found at {} (run `food-trends init` first)",
            db_path.display()
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_init(db_path: &Path, years_csv: Option<&Path>) -> Result<()> {
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    setup_database(&conn)?;
    println!("✓ Schema ready in {}", db_path.display());

    let years = match years_csv {
        Some(path) => load_years_csv(path)?,
        None => uk_reference_years(),
    };
    let count = insert_years(&mut conn, &years)?;
    println!("✓ Year dimension seeded with {} years", count);

    Ok(())
}

fn run_load(db_path: &Path, quantity_csv: &Path, expenditure_csv: &Path) -> Result<()> {
    let mut conn = open_existing(db_path)?;

    let quantities: FactExtract<QuantityRecord> = load_csv(quantity_csv)?;
    let expenditures: FactExtract<ExpenditureRecord> = load_csv(expenditure_csv)?;
    println!(
        "📂 Read {} quantity rows and {} expenditure rows",
        quantities.rows.len(),
        expenditures.rows.len()
    );

    load_facts(
        &mut conn,
        &quantities.rows,
        &expenditures.rows,
        (Some(quantities.sha256), Some(expenditures.sha256)),
    )?;

    let counts = table_counts(&conn)?;
    println!("✓ Loaded. Joined facts available: {}", counts.joined);

    Ok(())
}

fn run_report(db_path: &Path, analysis: &str, format: OutputFormat) -> Result<()> {
    let conn = open_existing(db_path)?;
    let facts = load_joined_facts(&conn)?;

    if analysis == "all" {
        if format != OutputFormat::Json {
            bail!("`report all` only supports --format json");
        }
        let full = AnalyticsReport::build(&facts);
        log::info!("{}", full.summary());
        println!("{}", report::to_json(&full)?);
        return Ok(());
    }

    let analysis: Analysis = analysis.parse().map_err(anyhow::Error::msg)?;
    let result = analysis.run(&facts);
    log::info!("{} produced {} rows", analysis, result.len());
    print!("{}", report::render(&result, format)?);
    if format == OutputFormat::Json {
        println!();
    }

    Ok(())
}

fn run_stats(db_path: &Path) -> Result<()> {
    let conn = open_existing(db_path)?;
    let counts = table_counts(&conn)?;

    println!("📊 {}", db_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  year_dim           {:>8}", counts.years);
    println!("  food_dim           {:>8}", counts.foods);
    println!("  {:<18} {:>8}", db::QUANTITY_TABLE, counts.quantities);
    println!("  {:<18} {:>8}", db::EXPENDITURE_TABLE, counts.expenditures);
    println!("  joined_facts       {:>8}", counts.joined);

    let events = get_load_events(&conn, 10)?;
    if !events.is_empty() {
        println!("\nRecent loads:");
        for event in events {
            println!(
                "  {}  {:<18} {:>8} rows  {}",
                event.loaded_at.format("%Y-%m-%d %H:%M:%S"),
                event.table_name,
                event.row_count,
                event.source_sha256.as_deref().map(|h| &h[..12.min(h.len())]).unwrap_or("-")
            );
        }
    }

    Ok(())
}
