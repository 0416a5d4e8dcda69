// 🔗 Fact Joiner - One analytical row per (code, year)
//
// Inner join throughout: a (code, year) missing from either fact table, or a
// year missing from the year dimension, never reaches the analytical surface
// and is not reported. Rows with a zero or null quantity are kept; ratio
// guards live in the aggregations.

use crate::records::{ExpenditureRecord, JoinedFact, QuantityRecord, YearRecord};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::HashMap;

/// SQL rendition of the same join, materialized as a view.
///
/// The quantity/expenditure predicate is evaluated here, at query time;
/// there is no constraint between the two fact tables.
pub const JOINED_FACTS_VIEW_SQL: &str = "CREATE VIEW IF NOT EXISTS joined_facts AS
    SELECT q.code,
           q.food_category,
           q.food_group,
           q.major_food_code,
           q.minor_food_code,
           q.units,
           q.year,
           q.quantity,
           e.expenditure,
           y.decade,
           y.is_recession
    FROM quantity_fact q
    INNER JOIN expenditure_fact e
        ON q.code = e.code AND q.year = e.year
    INNER JOIN year_dim y
        ON q.year = y.year";

/// In-memory join over already-loaded rows, ordered by (code, year).
///
/// Expenditures are indexed by code; `JoinKey::matches` picks the row.
pub fn join_facts(
    years: &[YearRecord],
    quantities: &[QuantityRecord],
    expenditures: &[ExpenditureRecord],
) -> Vec<JoinedFact> {
    let years_by_key: HashMap<i64, &YearRecord> = years.iter().map(|y| (y.year, y)).collect();
    let mut expenditures_by_code: HashMap<&str, Vec<&ExpenditureRecord>> = HashMap::new();
    for e in expenditures {
        expenditures_by_code.entry(e.code.as_str()).or_default().push(e);
    }

    let mut joined: Vec<JoinedFact> = quantities
        .iter()
        .filter_map(|q| {
            let key = q.join_key();
            let e = expenditures_by_code
                .get(q.code.as_str())?
                .iter()
                .find(|e| key.matches(&e.code, e.year))?;
            let y = years_by_key.get(&q.year)?;

            Some(JoinedFact {
                code: q.code.clone(),
                food_category: q.food_category.clone(),
                food_group: q.food_group.clone(),
                major_food_code: q.major_food_code.clone(),
                minor_food_code: q.minor_food_code.clone(),
                units: q.units.clone(),
                year: q.year,
                quantity: q.quantity,
                expenditure: e.expenditure,
                decade: y.decade,
                is_recession: y.is_recession,
            })
        })
        .collect();

    joined.sort_by(|a, b| a.code.cmp(&b.code).then(a.year.cmp(&b.year)));
    log::debug!(
        "joined {} of {} quantity rows ({} expenditure rows)",
        joined.len(),
        quantities.len(),
        expenditures.len()
    );
    joined
}

/// Read the joined view, ordered by (code, year)
pub fn load_joined_facts(conn: &Connection) -> Result<Vec<JoinedFact>> {
    let mut stmt = conn.prepare(
        "SELECT code, food_category, food_group, major_food_code, minor_food_code,
                units, year, quantity, expenditure, decade, is_recession
         FROM joined_facts
         ORDER BY code, year",
    )?;

    let facts = stmt
        .query_map([], |row| {
            Ok(JoinedFact {
                code: row.get(0)?,
                food_category: row.get(1)?,
                food_group: row.get(2)?,
                major_food_code: row.get(3)?,
                minor_food_code: row.get(4)?,
                units: row.get(5)?,
                year: row.get(6)?,
                quantity: row.get(7)?,
                expenditure: row.get(8)?,
                decade: row.get(9)?,
                is_recession: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read joined_facts")?;

    Ok(facts)
}
