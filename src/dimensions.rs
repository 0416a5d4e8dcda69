// 📅 Dimensions - Static reference data for years and foods
//
// The year dimension ships as a built-in UK reference list (1974-2023).
// The food dimension is derived from the hierarchy columns the fact
// extracts already carry.

use crate::error::LoadError;
use crate::records::{ExpenditureRecord, FoodRecord, QuantityRecord, YearRecord};
use std::collections::BTreeMap;
use std::path::Path;

pub const FIRST_YEAR: i64 = 1974;
pub const LAST_YEAR: i64 = 2023;

/// UK recession years and the note attached to each
const RECESSIONS: &[(i64, &str)] = &[
    (1974, "Oil crisis recession"),
    (1975, "Oil crisis recession"),
    (1980, "Early 1980s recession"),
    (1981, "Early 1980s recession"),
    (1990, "Early 1990s recession"),
    (1991, "Early 1990s recession"),
    (2008, "Global financial crisis"),
    (2009, "Global financial crisis"),
    (2020, "COVID-19 pandemic"),
];

/// Built-in year dimension covering the survey period
pub fn uk_reference_years() -> Vec<YearRecord> {
    (FIRST_YEAR..=LAST_YEAR)
        .map(|year| {
            let note = RECESSIONS
                .iter()
                .find(|(y, _)| *y == year)
                .map(|(_, note)| *note);
            YearRecord::new(year, note.is_some(), note)
        })
        .collect()
}

/// Load a year dimension from CSV (`year,decade,is_recession,notes`)
pub fn load_years_csv(path: &Path) -> Result<Vec<YearRecord>, LoadError> {
    let display = path.display().to_string();
    let mut rdr = csv::Reader::from_path(path).map_err(|source| LoadError::Csv {
        path: display.clone(),
        source,
    })?;

    let mut years = Vec::new();
    for result in rdr.deserialize() {
        let year: YearRecord = result.map_err(|source| LoadError::Csv {
            path: display.clone(),
            source,
        })?;
        years.push(year);
    }

    Ok(years)
}

/// Derive the food dimension from the fact extracts.
///
/// Quantity rows are scanned first; the first occurrence of a code wins.
pub fn derive_food_dimension(
    quantities: &[QuantityRecord],
    expenditures: &[ExpenditureRecord],
) -> Vec<FoodRecord> {
    let mut foods: BTreeMap<String, FoodRecord> = BTreeMap::new();

    for q in quantities {
        foods.entry(q.code.clone()).or_insert_with(|| q.food_record());
    }
    for e in expenditures {
        foods.entry(e.code.clone()).or_insert_with(|| e.food_record());
    }

    foods.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::decade_of;

    fn quantity(code: &str, year: i64, units: &str) -> QuantityRecord {
        QuantityRecord {
            code: code.to_string(),
            code_level: 3,
            food_category: "Dairy".to_string(),
            food_group: "Milk".to_string(),
            major_food_code: "MJ1".to_string(),
            minor_food_code: "MN1".to_string(),
            units: units.to_string(),
            year,
            quantity: Some(1.0),
            accuracy: None,
            pct_change_yoy: None,
            pct_change_base: None,
            significant: None,
            trend: None,
            rse: None,
        }
    }

    fn expenditure(code: &str, year: i64, units: &str) -> ExpenditureRecord {
        ExpenditureRecord {
            code: code.to_string(),
            code_level: 3,
            food_category: "Dairy".to_string(),
            food_group: "Cheese".to_string(),
            major_food_code: "MJ2".to_string(),
            minor_food_code: "MN2".to_string(),
            units: units.to_string(),
            year,
            expenditure: Some(1.0),
            accuracy: None,
            pct_change_yoy: None,
            pct_change_base: None,
            significant: None,
            trend: None,
            rse: None,
        }
    }

    #[test]
    fn test_reference_years_cover_survey_period() {
        let years = uk_reference_years();

        assert_eq!(years.len(), 50);
        assert_eq!(years.first().map(|y| y.year), Some(1974));
        assert_eq!(years.last().map(|y| y.year), Some(2023));
        assert!(years.iter().all(|y| y.decade == decade_of(y.year)));
    }

    #[test]
    fn test_reference_years_flag_recessions() {
        let years = uk_reference_years();
        let recession: Vec<i64> = years
            .iter()
            .filter(|y| y.is_recession)
            .map(|y| y.year)
            .collect();

        assert_eq!(recession, vec![1974, 1975, 1980, 1981, 1990, 1991, 2008, 2009, 2020]);

        let y2020 = years.iter().find(|y| y.year == 2020).unwrap();
        assert_eq!(y2020.notes.as_deref(), Some("COVID-19 pandemic"));

        let y2019 = years.iter().find(|y| y.year == 2019).unwrap();
        assert!(!y2019.is_recession);
        assert_eq!(y2019.notes, None);
    }

    #[test]
    fn test_derive_food_dimension_prefers_quantity_rows() {
        let quantities = vec![quantity("C1", 2019, "grams"), quantity("C1", 2020, "grams")];
        let expenditures = vec![expenditure("C1", 2019, "pence"), expenditure("C2", 2019, "pence")];

        let foods = derive_food_dimension(&quantities, &expenditures);

        assert_eq!(foods.len(), 2);
        assert_eq!(foods[0].code, "C1");
        assert_eq!(foods[0].units, "grams");
        assert_eq!(foods[0].food_group, "Milk");
        assert_eq!(foods[1].code, "C2");
        assert_eq!(foods[1].units, "pence");
    }

    #[test]
    fn test_load_years_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("years.csv");
        std::fs::write(
            &path,
            "year,decade,is_recession,notes\n2008,2000,true,Crash\n2010,2010,false,\n",
        )
        .unwrap();

        let years = load_years_csv(&path).unwrap();

        assert_eq!(years.len(), 2);
        assert_eq!(years[0], YearRecord::new(2008, true, Some("Crash")));
        assert_eq!(years[1].notes, None);
    }
}
