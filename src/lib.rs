// UK Household Food Trends - Core Library
// Star schema, fact joiner and aggregation engine, shared by the CLI and the API server

pub mod analytics;
pub mod db;
pub mod dimensions;
pub mod error;
pub mod joiner;
pub mod records;
pub mod report;

// Re-export commonly used types
pub use analytics::{
    cost_per_unit, cost_per_unit_trend, era_cost_per_unit, executive_summary,
    inflation_inefficiency, recession_impact, recession_summary, volatility_ranking,
    Analysis, AnalyticsReport, CostPerUnitRow, CostTrendRow, EraCostRow, ExecutiveSummaryRow,
    InflationFlagRow, RecessionImpactRow, RecessionSummaryRow, ResultSet, VolatilityRow,
};
pub use db::{
    FactExtract, LoadEvent, TableCounts,
    get_load_events, insert_years, load_csv, load_facts, setup_database, table_counts,
};
pub use dimensions::{derive_food_dimension, load_years_csv, uk_reference_years};
pub use error::LoadError;
pub use joiner::{join_facts, load_joined_facts};
pub use records::{
    ExpenditureRecord, FoodRecord, JoinKey, JoinedFact, QuantityRecord, YearRecord,
};
pub use report::OutputFormat;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
