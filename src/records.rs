// 📦 Records - Dimension rows, fact rows and the joined analytical surface
//
// Fact rows deliberately repeat the food hierarchy (category → group → major → minor)
// so that fact-only queries never need the food dimension.

use serde::{Deserialize, Serialize};

// ============================================================================
// DIMENSIONS
// ============================================================================

/// One row of the year dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRecord {
    pub year: i64,
    pub decade: i64,
    pub is_recession: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl YearRecord {
    /// Build a year row, deriving the decade from the year
    pub fn new(year: i64, is_recession: bool, notes: Option<&str>) -> Self {
        YearRecord {
            year,
            decade: decade_of(year),
            is_recession,
            notes: notes.map(|n| n.to_string()),
        }
    }
}

/// Decade a year belongs to (1987 → 1980)
pub fn decade_of(year: i64) -> i64 {
    year - year.rem_euclid(10)
}

/// One row of the food dimension (classification hierarchy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecord {
    pub code: String,
    pub code_level: i64,
    pub food_category: String,
    pub food_group: String,
    pub major_food_code: String,
    pub minor_food_code: String,
    pub units: String,
}

// ============================================================================
// FACTS
// ============================================================================

/// Quantity consumed for one food code in one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityRecord {
    pub code: String,
    pub code_level: i64,
    pub food_category: String,
    pub food_group: String,
    pub major_food_code: String,
    pub minor_food_code: String,
    pub units: String,
    pub year: i64,
    pub quantity: Option<f64>,

    // Pass-through metadata supplied by the source extract
    #[serde(default)]
    pub accuracy: Option<String>,
    #[serde(default)]
    pub pct_change_yoy: Option<f64>,
    #[serde(default)]
    pub pct_change_base: Option<f64>,
    #[serde(default)]
    pub significant: Option<bool>,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub rse: Option<f64>,
}

/// Expenditure for one food code in one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenditureRecord {
    pub code: String,
    pub code_level: i64,
    pub food_category: String,
    pub food_group: String,
    pub major_food_code: String,
    pub minor_food_code: String,
    pub units: String,
    pub year: i64,
    pub expenditure: Option<f64>,

    // Pass-through metadata supplied by the source extract
    #[serde(default)]
    pub accuracy: Option<String>,
    #[serde(default)]
    pub pct_change_yoy: Option<f64>,
    #[serde(default)]
    pub pct_change_base: Option<f64>,
    #[serde(default)]
    pub significant: Option<bool>,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub rse: Option<f64>,
}

impl QuantityRecord {
    pub fn join_key(&self) -> JoinKey {
        JoinKey::new(&self.code, self.year)
    }

    /// Project the hierarchy columns into a food dimension row
    pub fn food_record(&self) -> FoodRecord {
        FoodRecord {
            code: self.code.clone(),
            code_level: self.code_level,
            food_category: self.food_category.clone(),
            food_group: self.food_group.clone(),
            major_food_code: self.major_food_code.clone(),
            minor_food_code: self.minor_food_code.clone(),
            units: self.units.clone(),
        }
    }
}

impl ExpenditureRecord {
    pub fn join_key(&self) -> JoinKey {
        JoinKey::new(&self.code, self.year)
    }

    pub fn food_record(&self) -> FoodRecord {
        FoodRecord {
            code: self.code.clone(),
            code_level: self.code_level,
            food_category: self.food_category.clone(),
            food_group: self.food_group.clone(),
            major_food_code: self.major_food_code.clone(),
            minor_food_code: self.minor_food_code.clone(),
            units: self.units.clone(),
        }
    }
}

// ============================================================================
// JOIN KEY
// ============================================================================

/// Logical key linking a quantity row to its expenditure row.
///
/// Not a database constraint: the two fact tables are only related by
/// equality on both fields, evaluated when the join runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinKey {
    pub code: String,
    pub year: i64,
}

impl JoinKey {
    pub fn new(code: &str, year: i64) -> Self {
        JoinKey {
            code: code.to_string(),
            year,
        }
    }

    /// Join predicate: `q.code = e.code AND q.year = e.year`
    pub fn matches(&self, code: &str, year: i64) -> bool {
        self.code == code && self.year == year
    }
}

// ============================================================================
// JOINED FACT
// ============================================================================

/// One (code, year) present in both fact tables and in the year dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedFact {
    pub code: String,
    pub food_category: String,
    pub food_group: String,
    pub major_food_code: String,
    pub minor_food_code: String,
    pub units: String,
    pub year: i64,
    pub quantity: Option<f64>,
    pub expenditure: Option<f64>,
    pub decade: i64,
    pub is_recession: bool,
}

impl JoinedFact {
    /// Per-row cost-per-unit; None when the quantity is zero or missing
    pub fn cost_per_unit(&self) -> Option<f64> {
        safe_ratio(self.expenditure, self.quantity)
    }
}

/// Division guard shared by every ratio: a zero or null divisor yields None
pub fn safe_ratio(numerator: Option<f64>, divisor: Option<f64>) -> Option<f64> {
    match (numerator, divisor) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decade_of() {
        assert_eq!(decade_of(1974), 1970);
        assert_eq!(decade_of(1980), 1980);
        assert_eq!(decade_of(2023), 2020);
    }

    #[test]
    fn test_year_record_new_derives_decade() {
        let year = YearRecord::new(2009, true, Some("Financial crisis"));
        assert_eq!(year.decade, 2000);
        assert!(year.is_recession);
        assert_eq!(year.notes.as_deref(), Some("Financial crisis"));
    }

    #[test]
    fn test_safe_ratio_guards_divisor() {
        assert_eq!(safe_ratio(Some(6.0), Some(3.0)), Some(2.0));
        assert_eq!(safe_ratio(Some(6.0), Some(0.0)), None);
        assert_eq!(safe_ratio(Some(6.0), None), None);
        assert_eq!(safe_ratio(None, Some(3.0)), None);
    }

    #[test]
    fn test_join_key_matches_both_fields() {
        let key = JoinKey::new("C1", 2020);
        assert!(key.matches("C1", 2020));
        assert!(!key.matches("C1", 2021));
        assert!(!key.matches("C2", 2020));
    }
}
