// 📊 Aggregation Engine - Read-only analyses over the joined facts
//
// Every analysis is a pure function of `&[JoinedFact]`. Shared rules:
// - a ratio with a zero or null divisor is None, never an error
// - aggregates skip None; an aggregate over nothing is None
// - ratio statistics are rounded to 2 decimals (half away from zero);
//   recession means are reported exact
//
// Two cost-per-unit statistics exist and are kept apart:
// - aggregate: sum(expenditure) / sum(quantity) per group
// - per-row:   expenditure / quantity per row, then averaged (or spread)

use crate::records::{safe_ratio, JoinedFact};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// NUMERIC HELPERS
// ============================================================================

/// Round to 2 decimals, half away from zero.
///
/// Works on the shortest decimal form of the value, so `1.005` rounds to
/// `1.01` as SQL `ROUND` does, where scaling by 100 in binary gives `1.0`.
/// Non-finite values and magnitudes of 1e13 or more are returned unchanged.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= 1e13 {
        return value;
    }

    let digits = value.abs().to_string();
    let (whole, frac) = digits.split_once('.').unwrap_or((digits.as_str(), ""));
    let Ok(whole) = whole.parse::<u64>() else {
        return value;
    };

    let frac = frac.as_bytes();
    let digit = |i: usize| frac.get(i).map_or(0, |b| u64::from(b - b'0'));
    let mut cents = whole * 100 + digit(0) * 10 + digit(1);
    if digit(2) >= 5 {
        cents += 1;
    }

    let rounded = cents as f64 / 100.0;
    if value < 0.0 {
        -rounded
    } else {
        rounded
    }
}

fn round2_opt(value: Option<f64>) -> Option<f64> {
    value.map(round2)
}

/// Sum of the present values; None when every value is missing
pub fn sum_present<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Arithmetic mean of the present values
pub fn mean_present<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let present: Vec<f64> = values.into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

/// Population standard deviation (divides by n, not n - 1)
pub fn population_stddev<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let present: Vec<f64> = values.into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Descending order with None after every value
fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// sum(expenditure) / sum(quantity) over a group of rows
fn aggregate_ratio(rows: &[&JoinedFact]) -> (Option<f64>, Option<f64>, Option<f64>) {
    let total_quantity = sum_present(rows.iter().map(|f| f.quantity));
    let total_expenditure = sum_present(rows.iter().map(|f| f.expenditure));
    let ratio = round2_opt(safe_ratio(total_expenditure, total_quantity));
    (total_quantity, total_expenditure, ratio)
}

fn group_by<'a, K, F>(facts: &'a [JoinedFact], key: F) -> BTreeMap<K, Vec<&'a JoinedFact>>
where
    K: Ord,
    F: Fn(&'a JoinedFact) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a JoinedFact>> = BTreeMap::new();
    for fact in facts {
        groups.entry(key(fact)).or_default().push(fact);
    }
    groups
}

// ============================================================================
// RESULT ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPerUnitRow {
    pub food_group: String,
    pub food_category: String,
    pub year: i64,
    pub total_quantity: Option<f64>,
    pub total_expenditure: Option<f64>,
    pub cost_per_unit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTrendRow {
    pub food_category: String,
    pub year: i64,
    pub cost_per_unit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraCostRow {
    pub decade: i64,
    pub food_group: String,
    pub avg_cost_per_unit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflationFlagRow {
    pub code: String,
    pub food_category: String,
    pub food_group: String,
    pub year: i64,
    pub quantity: f64,
    pub expenditure: f64,
    pub prev_year: i64,
    pub prev_quantity: f64,
    pub prev_expenditure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityRow {
    pub food_group: String,
    pub volatility: Option<f64>,
    pub observations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummaryRow {
    pub food_group: String,
    pub food_codes: usize,
    pub avg_quantity: Option<f64>,
    pub avg_expenditure: Option<f64>,
    pub avg_cost_per_unit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecessionImpactRow {
    pub year: i64,
    pub is_recession: bool,
    pub avg_quantity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecessionSummaryRow {
    pub is_recession: bool,
    pub years: usize,
    pub avg_quantity: Option<f64>,
    pub avg_expenditure: Option<f64>,
}

// ============================================================================
// ANALYSES
// ============================================================================

/// Aggregate cost-per-unit per (food_group, food_category, year), key ascending
pub fn cost_per_unit(facts: &[JoinedFact]) -> Vec<CostPerUnitRow> {
    let groups = group_by(facts, |f| (f.food_group.as_str(), f.food_category.as_str(), f.year));

    let rows: Vec<CostPerUnitRow> = groups
        .into_iter()
        .map(|((group, category, year), rows)| {
            let (total_quantity, total_expenditure, cost_per_unit) = aggregate_ratio(&rows);
            CostPerUnitRow {
                food_group: group.to_string(),
                food_category: category.to_string(),
                year,
                total_quantity,
                total_expenditure,
                cost_per_unit,
            }
        })
        .collect();

    let degenerate = rows.iter().filter(|r| r.cost_per_unit.is_none()).count();
    if degenerate > 0 {
        log::warn!("{degenerate} cost-per-unit groups have no usable quantity");
    }
    rows
}

/// Aggregate cost-per-unit per (food_category, year), ordered by year
pub fn cost_per_unit_trend(facts: &[JoinedFact]) -> Vec<CostTrendRow> {
    let groups = group_by(facts, |f| (f.year, f.food_category.as_str()));

    groups
        .into_iter()
        .map(|((year, category), rows)| CostTrendRow {
            food_category: category.to_string(),
            year,
            cost_per_unit: aggregate_ratio(&rows).2,
        })
        .collect()
}

/// Average of per-row cost-per-unit per (decade, food_group)
pub fn era_cost_per_unit(facts: &[JoinedFact]) -> Vec<EraCostRow> {
    let groups = group_by(facts, |f| (f.decade, f.food_group.as_str()));

    groups
        .into_iter()
        .map(|((decade, group), rows)| EraCostRow {
            decade,
            food_group: group.to_string(),
            avg_cost_per_unit: round2_opt(mean_present(rows.iter().map(|f| f.cost_per_unit()))),
        })
        .collect()
}

/// Rows whose expenditure rose while quantity fell, relative to the
/// previous joined row of the same code.
///
/// "Previous" is the prior JoinedFact row, not the prior calendar year: when
/// a join-gap removed the year before, the comparison spans the gap (MILK
/// 2021 against 2019 if MILK 2020 has no expenditure).
///
/// The first row of a code has nothing to compare against and never
/// qualifies; neither does a row where any compared value is null.
pub fn inflation_inefficiency(facts: &[JoinedFact]) -> Vec<InflationFlagRow> {
    let mut by_code = group_by(facts, |f| f.code.as_str());

    let mut flagged = Vec::new();
    for rows in by_code.values_mut() {
        rows.sort_by_key(|f| f.year);

        for pair in rows.windows(2) {
            let (prev, current) = (pair[0], pair[1]);
            let (Some(q), Some(pq), Some(e), Some(pe)) =
                (current.quantity, prev.quantity, current.expenditure, prev.expenditure)
            else {
                continue;
            };

            if e > pe && q < pq {
                flagged.push(InflationFlagRow {
                    code: current.code.clone(),
                    food_category: current.food_category.clone(),
                    food_group: current.food_group.clone(),
                    year: current.year,
                    quantity: q,
                    expenditure: e,
                    prev_year: prev.year,
                    prev_quantity: pq,
                    prev_expenditure: pe,
                });
            }
        }
    }

    flagged
}

/// Population standard deviation of per-row cost-per-unit per food_group,
/// most volatile first
pub fn volatility_ranking(facts: &[JoinedFact]) -> Vec<VolatilityRow> {
    let groups = group_by(facts, |f| f.food_group.as_str());

    let mut rows: Vec<VolatilityRow> = groups
        .into_iter()
        .map(|(group, rows)| {
            let ratios: Vec<Option<f64>> = rows.iter().map(|f| f.cost_per_unit()).collect();
            VolatilityRow {
                food_group: group.to_string(),
                volatility: round2_opt(population_stddev(ratios.iter().copied())),
                observations: ratios.iter().flatten().count(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        desc_nulls_last(a.volatility, b.volatility).then_with(|| a.food_group.cmp(&b.food_group))
    });
    rows
}

/// One-row-per-food_group rollup, highest average cost-per-unit first
pub fn executive_summary(facts: &[JoinedFact]) -> Vec<ExecutiveSummaryRow> {
    let groups = group_by(facts, |f| f.food_group.as_str());

    let mut rows: Vec<ExecutiveSummaryRow> = groups
        .into_iter()
        .map(|(group, rows)| {
            let codes: BTreeSet<&str> = rows.iter().map(|f| f.code.as_str()).collect();
            ExecutiveSummaryRow {
                food_group: group.to_string(),
                food_codes: codes.len(),
                avg_quantity: round2_opt(mean_present(rows.iter().map(|f| f.quantity))),
                avg_expenditure: round2_opt(mean_present(rows.iter().map(|f| f.expenditure))),
                avg_cost_per_unit: round2_opt(mean_present(rows.iter().map(|f| f.cost_per_unit()))),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        desc_nulls_last(a.avg_cost_per_unit, b.avg_cost_per_unit)
            .then_with(|| a.food_group.cmp(&b.food_group))
    });
    rows
}

/// Exact mean quantity per (year, is_recession), ordered by year
pub fn recession_impact(facts: &[JoinedFact]) -> Vec<RecessionImpactRow> {
    let groups = group_by(facts, |f| (f.year, f.is_recession));

    groups
        .into_iter()
        .map(|((year, is_recession), rows)| RecessionImpactRow {
            year,
            is_recession,
            avg_quantity: mean_present(rows.iter().map(|f| f.quantity)),
        })
        .collect()
}

/// Recession years against every other year, non-recession first
pub fn recession_summary(facts: &[JoinedFact]) -> Vec<RecessionSummaryRow> {
    let groups = group_by(facts, |f| f.is_recession);

    groups
        .into_iter()
        .map(|(is_recession, rows)| {
            let years: BTreeSet<i64> = rows.iter().map(|f| f.year).collect();
            RecessionSummaryRow {
                is_recession,
                years: years.len(),
                avg_quantity: mean_present(rows.iter().map(|f| f.quantity)),
                avg_expenditure: mean_present(rows.iter().map(|f| f.expenditure)),
            }
        })
        .collect()
}

// ============================================================================
// ANALYSIS SELECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analysis {
    CostPerUnit,
    Trend,
    Era,
    Inflation,
    Volatility,
    Summary,
    Recession,
    RecessionSummary,
}

impl Analysis {
    pub const ALL: [Analysis; 8] = [
        Analysis::CostPerUnit,
        Analysis::Trend,
        Analysis::Era,
        Analysis::Inflation,
        Analysis::Volatility,
        Analysis::Summary,
        Analysis::Recession,
        Analysis::RecessionSummary,
    ];

    /// Short name used on the command line and in API paths
    pub fn name(&self) -> &'static str {
        match self {
            Analysis::CostPerUnit => "cost-per-unit",
            Analysis::Trend => "trend",
            Analysis::Era => "era",
            Analysis::Inflation => "inflation",
            Analysis::Volatility => "volatility",
            Analysis::Summary => "summary",
            Analysis::Recession => "recession",
            Analysis::RecessionSummary => "recession-summary",
        }
    }

    pub fn run(&self, facts: &[JoinedFact]) -> ResultSet {
        log::debug!("running {} over {} joined facts", self.name(), facts.len());
        match self {
            Analysis::CostPerUnit => ResultSet::CostPerUnit(cost_per_unit(facts)),
            Analysis::Trend => ResultSet::Trend(cost_per_unit_trend(facts)),
            Analysis::Era => ResultSet::Era(era_cost_per_unit(facts)),
            Analysis::Inflation => ResultSet::Inflation(inflation_inefficiency(facts)),
            Analysis::Volatility => ResultSet::Volatility(volatility_ranking(facts)),
            Analysis::Summary => ResultSet::Summary(executive_summary(facts)),
            Analysis::Recession => ResultSet::Recession(recession_impact(facts)),
            Analysis::RecessionSummary => ResultSet::RecessionSummary(recession_summary(facts)),
        }
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Analysis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Analysis::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Analysis::ALL.iter().map(|a| a.name()).collect();
                format!("unknown analysis {s:?} (expected one of: {})", known.join(", "))
            })
    }
}

/// Result of one analysis; serializes as its bare row list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultSet {
    CostPerUnit(Vec<CostPerUnitRow>),
    Trend(Vec<CostTrendRow>),
    Era(Vec<EraCostRow>),
    Inflation(Vec<InflationFlagRow>),
    Volatility(Vec<VolatilityRow>),
    Summary(Vec<ExecutiveSummaryRow>),
    Recession(Vec<RecessionImpactRow>),
    RecessionSummary(Vec<RecessionSummaryRow>),
}

impl ResultSet {
    pub fn len(&self) -> usize {
        match self {
            ResultSet::CostPerUnit(rows) => rows.len(),
            ResultSet::Trend(rows) => rows.len(),
            ResultSet::Era(rows) => rows.len(),
            ResultSet::Inflation(rows) => rows.len(),
            ResultSet::Volatility(rows) => rows.len(),
            ResultSet::Summary(rows) => rows.len(),
            ResultSet::Recession(rows) => rows.len(),
            ResultSet::RecessionSummary(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// FULL REPORT
// ============================================================================

/// Every result set computed over one snapshot of the joined facts
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub joined_rows: usize,
    pub cost_per_unit: Vec<CostPerUnitRow>,
    pub cost_per_unit_trend: Vec<CostTrendRow>,
    pub era_cost_per_unit: Vec<EraCostRow>,
    pub inflation_inefficiency: Vec<InflationFlagRow>,
    pub volatility_ranking: Vec<VolatilityRow>,
    pub executive_summary: Vec<ExecutiveSummaryRow>,
    pub recession_impact: Vec<RecessionImpactRow>,
    pub recession_summary: Vec<RecessionSummaryRow>,
}

impl AnalyticsReport {
    pub fn build(facts: &[JoinedFact]) -> Self {
        AnalyticsReport {
            generated_at: Utc::now(),
            joined_rows: facts.len(),
            cost_per_unit: cost_per_unit(facts),
            cost_per_unit_trend: cost_per_unit_trend(facts),
            era_cost_per_unit: era_cost_per_unit(facts),
            inflation_inefficiency: inflation_inefficiency(facts),
            volatility_ranking: volatility_ranking(facts),
            executive_summary: executive_summary(facts),
            recession_impact: recession_impact(facts),
            recession_summary: recession_summary(facts),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} joined rows, {} food groups, {} inflation flags, most volatile: {}",
            self.joined_rows,
            self.executive_summary.len(),
            self.inflation_inefficiency.len(),
            self.volatility_ranking
                .first()
                .map(|r| r.food_group.as_str())
                .unwrap_or("-")
        )
    }
}
