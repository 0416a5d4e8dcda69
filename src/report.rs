// 🖨️ Report rendering - JSON and CSV output for result sets

use crate::analytics::ResultSet;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown format {other:?} (expected json or csv)")),
        }
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize JSON")
}

/// Header row plus one line per record; an empty slice renders as ""
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row).context("Failed to serialize CSV row")?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV writer: {}", e))?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}

pub fn render(result: &ResultSet, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(result),
        OutputFormat::Csv => match result {
            ResultSet::CostPerUnit(rows) => to_csv(rows),
            ResultSet::Trend(rows) => to_csv(rows),
            ResultSet::Era(rows) => to_csv(rows),
            ResultSet::Inflation(rows) => to_csv(rows),
            ResultSet::Volatility(rows) => to_csv(rows),
            ResultSet::Summary(rows) => to_csv(rows),
            ResultSet::Recession(rows) => to_csv(rows),
            ResultSet::RecessionSummary(rows) => to_csv(rows),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{RecessionImpactRow, VolatilityRow};

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("CSV".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_csv_renders_nulls_as_empty_cells() {
        let result = ResultSet::Volatility(vec![
            VolatilityRow { food_group: "Meat".to_string(), volatility: Some(0.82), observations: 3 },
            VolatilityRow { food_group: "Fish".to_string(), volatility: None, observations: 0 },
        ]);

        let csv = render(&result, OutputFormat::Csv).unwrap();

        assert_eq!(csv, "food_group,volatility,observations\nMeat,0.82,3\nFish,,0\n");
    }

    #[test]
    fn test_json_renders_bare_row_list() {
        let result = ResultSet::Recession(vec![RecessionImpactRow {
            year: 2020,
            is_recession: true,
            avg_quantity: None,
        }]);

        let json = render(&result, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value,
            serde_json::json!([{ "year": 2020, "is_recession": true, "avg_quantity": null }])
        );
    }
}
