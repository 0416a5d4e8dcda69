use crate::error::LoadError;
use crate::joiner::JOINED_FACTS_VIEW_SQL;
use crate::records::{ExpenditureRecord, FoodRecord, QuantityRecord, YearRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const QUANTITY_TABLE: &str = "quantity_fact";
pub const EXPENDITURE_TABLE: &str = "expenditure_fact";

/// Audit record for one bulk load (every load is an event)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoadEvent {
    pub event_id: String,
    pub loaded_at: DateTime<Utc>,
    pub table_name: String,
    pub row_count: i64,
    pub source_sha256: Option<String>,
}

impl LoadEvent {
    pub fn new(table_name: &str, row_count: usize, source_sha256: Option<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            loaded_at: Utc::now(),
            table_name: table_name.to_string(),
            row_count: row_count as i64,
            source_sha256,
        }
    }
}

/// A fact extract read from disk, with the digest of its source bytes
#[derive(Debug, Clone)]
pub struct FactExtract<T> {
    pub rows: Vec<T>,
    pub sha256: String,
}

/// Row counts for every stored table and the joined view
#[derive(Debug, Clone, Serialize)]
pub struct TableCounts {
    pub years: i64,
    pub foods: i64,
    pub quantities: i64,
    pub expenditures: i64,
    pub joined: i64,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Year FK on both fact tables is enforced by SQLite only with this on
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Dimensions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS year_dim (
            year INTEGER PRIMARY KEY,
            decade INTEGER NOT NULL,
            is_recession INTEGER NOT NULL CHECK (is_recession IN (0, 1)),
            notes TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS food_dim (
            code TEXT PRIMARY KEY,
            code_level INTEGER NOT NULL,
            food_category TEXT NOT NULL,
            food_group TEXT NOT NULL,
            major_food_code TEXT NOT NULL,
            minor_food_code TEXT NOT NULL,
            units TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Facts (hierarchy columns are duplicated on purpose)
    // ==========================================================================
    for (table, measure) in [(QUANTITY_TABLE, "quantity"), (EXPENDITURE_TABLE, "expenditure")] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    code TEXT NOT NULL,
                    code_level INTEGER NOT NULL,
                    food_category TEXT NOT NULL,
                    food_group TEXT NOT NULL,
                    major_food_code TEXT NOT NULL,
                    minor_food_code TEXT NOT NULL,
                    units TEXT NOT NULL,
                    year INTEGER NOT NULL,
                    {measure} REAL,
                    accuracy TEXT,
                    pct_change_yoy REAL,
                    pct_change_base REAL,
                    significant INTEGER,
                    trend TEXT,
                    rse REAL,
                    PRIMARY KEY (code, year),
                    FOREIGN KEY (year) REFERENCES year_dim(year)
                )"
            ),
            [],
        )?;
    }

    // ==========================================================================
    // Load audit trail
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS load_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            loaded_at TEXT NOT NULL,
            table_name TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            source_sha256 TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes + joined view
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quantity_year ON quantity_fact(year)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenditure_year ON expenditure_fact(year)",
        [],
    )?;

    conn.execute(JOINED_FACTS_VIEW_SQL, [])?;

    log::debug!("schema ready");
    Ok(())
}

// ============================================================================
// LOADING
// ============================================================================

/// Seed the year dimension in one transaction
pub fn insert_years(conn: &mut Connection, years: &[YearRecord]) -> Result<usize, LoadError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO year_dim (year, decade, is_recession, notes) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for y in years {
            stmt.execute(params![y.year, y.decade, y.is_recession, y.notes])
                .map_err(|e| LoadError::from_insert("year_dim", "", y.year, e))?;
        }
    }
    insert_load_event(&tx, &LoadEvent::new("year_dim", years.len(), None))?;
    tx.commit()?;

    log::info!("loaded {} years into year_dim", years.len());
    Ok(years.len())
}

/// Insert food dimension rows; codes already present are kept as they are
pub fn insert_foods(conn: &Connection, foods: &[FoodRecord]) -> Result<usize, LoadError> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO food_dim (
            code, code_level, food_category, food_group, major_food_code, minor_food_code, units
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    let mut inserted = 0;
    for f in foods {
        inserted += stmt.execute(params![
            f.code,
            f.code_level,
            f.food_category,
            f.food_group,
            f.major_food_code,
            f.minor_food_code,
            f.units,
        ])?;
    }

    Ok(inserted)
}

/// Load both fact tables and the derived food dimension in one transaction.
///
/// A duplicate (code, year) or a year missing from `year_dim` aborts the
/// whole batch; nothing is applied.
pub fn load_facts(
    conn: &mut Connection,
    quantities: &[QuantityRecord],
    expenditures: &[ExpenditureRecord],
    source_hashes: (Option<String>, Option<String>),
) -> Result<(usize, usize), LoadError> {
    let tx = conn.transaction()?;

    insert_quantity_rows(&tx, quantities)?;
    insert_expenditure_rows(&tx, expenditures)?;

    let foods = crate::dimensions::derive_food_dimension(quantities, expenditures);
    let new_foods = insert_foods(&tx, &foods)?;

    insert_load_event(&tx, &LoadEvent::new(QUANTITY_TABLE, quantities.len(), source_hashes.0))?;
    insert_load_event(&tx, &LoadEvent::new(EXPENDITURE_TABLE, expenditures.len(), source_hashes.1))?;

    tx.commit()?;

    log::info!(
        "loaded {} quantity rows, {} expenditure rows, {} new food codes",
        quantities.len(),
        expenditures.len(),
        new_foods
    );
    Ok((quantities.len(), expenditures.len()))
}

fn insert_quantity_rows(conn: &Connection, rows: &[QuantityRecord]) -> Result<(), LoadError> {
    let mut stmt = conn.prepare(
        "INSERT INTO quantity_fact (
            code, code_level, food_category, food_group, major_food_code, minor_food_code,
            units, year, quantity, accuracy, pct_change_yoy, pct_change_base,
            significant, trend, rse
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )?;

    for r in rows {
        stmt.execute(params![
            r.code,
            r.code_level,
            r.food_category,
            r.food_group,
            r.major_food_code,
            r.minor_food_code,
            r.units,
            r.year,
            r.quantity,
            r.accuracy,
            r.pct_change_yoy,
            r.pct_change_base,
            r.significant,
            r.trend,
            r.rse,
        ])
        .map_err(|e| LoadError::from_insert(QUANTITY_TABLE, &r.code, r.year, e))?;
    }

    Ok(())
}

fn insert_expenditure_rows(conn: &Connection, rows: &[ExpenditureRecord]) -> Result<(), LoadError> {
    let mut stmt = conn.prepare(
        "INSERT INTO expenditure_fact (
            code, code_level, food_category, food_group, major_food_code, minor_food_code,
            units, year, expenditure, accuracy, pct_change_yoy, pct_change_base,
            significant, trend, rse
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )?;

    for r in rows {
        stmt.execute(params![
            r.code,
            r.code_level,
            r.food_category,
            r.food_group,
            r.major_food_code,
            r.minor_food_code,
            r.units,
            r.year,
            r.expenditure,
            r.accuracy,
            r.pct_change_yoy,
            r.pct_change_base,
            r.significant,
            r.trend,
            r.rse,
        ])
        .map_err(|e| LoadError::from_insert(EXPENDITURE_TABLE, &r.code, r.year, e))?;
    }

    Ok(())
}

/// Read a cleaned fact extract from CSV, hashing its bytes for provenance
pub fn load_csv<T: DeserializeOwned>(csv_path: &Path) -> Result<FactExtract<T>, LoadError> {
    let display = csv_path.display().to_string();
    let bytes = std::fs::read(csv_path).map_err(|source| LoadError::Io {
        path: display.clone(),
        source,
    })?;

    let sha256 = format!("{:x}", Sha256::digest(&bytes));

    let mut rdr = csv::Reader::from_reader(bytes.as_slice());
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.map_err(|source| LoadError::Csv {
            path: display.clone(),
            source,
        })?;
        rows.push(row);
    }

    log::debug!("read {} rows from {}", rows.len(), display);
    Ok(FactExtract { rows, sha256 })
}

// ============================================================================
// EVENTS
// ============================================================================

pub fn insert_load_event(conn: &Connection, event: &LoadEvent) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO load_events (
            event_id, loaded_at, table_name, row_count, source_sha256
        ) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.loaded_at.to_rfc3339(),
            event.table_name,
            event.row_count,
            event.source_sha256,
        ],
    )?;

    Ok(())
}

/// Most recent load events first
pub fn get_load_events(conn: &Connection, limit: usize) -> Result<Vec<LoadEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, loaded_at, table_name, row_count, source_sha256
         FROM load_events
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let events = stmt
        .query_map([limit as i64], |row| {
            let loaded_at: String = row.get(1)?;
            Ok(LoadEvent {
                event_id: row.get(0)?,
                loaded_at: DateTime::parse_from_rfc3339(&loaded_at)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                table_name: row.get(2)?,
                row_count: row.get(3)?,
                source_sha256: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read load events")?;

    Ok(events)
}

// ============================================================================
// READS
// ============================================================================

pub fn get_years(conn: &Connection) -> Result<Vec<YearRecord>> {
    let mut stmt = conn.prepare(
        "SELECT year, decade, is_recession, notes FROM year_dim ORDER BY year",
    )?;

    let years = stmt
        .query_map([], |row| {
            Ok(YearRecord {
                year: row.get(0)?,
                decade: row.get(1)?,
                is_recession: row.get(2)?,
                notes: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(years)
}

pub fn get_foods(conn: &Connection) -> Result<Vec<FoodRecord>> {
    let mut stmt = conn.prepare(
        "SELECT code, code_level, food_category, food_group, major_food_code, minor_food_code, units
         FROM food_dim
         ORDER BY code",
    )?;

    let foods = stmt
        .query_map([], |row| {
            Ok(FoodRecord {
                code: row.get(0)?,
                code_level: row.get(1)?,
                food_category: row.get(2)?,
                food_group: row.get(3)?,
                major_food_code: row.get(4)?,
                minor_food_code: row.get(5)?,
                units: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(foods)
}

pub fn get_quantities(conn: &Connection) -> Result<Vec<QuantityRecord>> {
    let mut stmt = conn.prepare(
        "SELECT code, code_level, food_category, food_group, major_food_code, minor_food_code,
                units, year, quantity, accuracy, pct_change_yoy, pct_change_base,
                significant, trend, rse
         FROM quantity_fact
         ORDER BY code, year",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(QuantityRecord {
                code: row.get(0)?,
                code_level: row.get(1)?,
                food_category: row.get(2)?,
                food_group: row.get(3)?,
                major_food_code: row.get(4)?,
                minor_food_code: row.get(5)?,
                units: row.get(6)?,
                year: row.get(7)?,
                quantity: row.get(8)?,
                accuracy: row.get(9)?,
                pct_change_yoy: row.get(10)?,
                pct_change_base: row.get(11)?,
                significant: row.get(12)?,
                trend: row.get(13)?,
                rse: row.get(14)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn get_expenditures(conn: &Connection) -> Result<Vec<ExpenditureRecord>> {
    let mut stmt = conn.prepare(
        "SELECT code, code_level, food_category, food_group, major_food_code, minor_food_code,
                units, year, expenditure, accuracy, pct_change_yoy, pct_change_base,
                significant, trend, rse
         FROM expenditure_fact
         ORDER BY code, year",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ExpenditureRecord {
                code: row.get(0)?,
                code_level: row.get(1)?,
                food_category: row.get(2)?,
                food_group: row.get(3)?,
                major_food_code: row.get(4)?,
                minor_food_code: row.get(5)?,
                units: row.get(6)?,
                year: row.get(7)?,
                expenditure: row.get(8)?,
                accuracy: row.get(9)?,
                pct_change_yoy: row.get(10)?,
                pct_change_base: row.get(11)?,
                significant: row.get(12)?,
                trend: row.get(13)?,
                rse: row.get(14)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row: &Row| row.get(0))
        .with_context(|| format!("Failed to count rows in {table}"))?;

    Ok(count)
}

pub fn table_counts(conn: &Connection) -> Result<TableCounts> {
    Ok(TableCounts {
        years: count_rows(conn, "year_dim")?,
        foods: count_rows(conn, "food_dim")?,
        quantities: count_rows(conn, QUANTITY_TABLE)?,
        expenditures: count_rows(conn, EXPENDITURE_TABLE)?,
        joined: count_rows(conn, "joined_facts")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dimensions::uk_reference_years;

    /// Quantity row with a fixed Dairy/Milk hierarchy
    pub(crate) fn quantity_row(code: &str, year: i64, quantity: Option<f64>) -> QuantityRecord {
        QuantityRecord {
            code: code.to_string(),
            code_level: 4,
            food_category: "Dairy".to_string(),
            food_group: "Milk".to_string(),
            major_food_code: "MJ01".to_string(),
            minor_food_code: format!("MN-{code}"),
            units: "ml".to_string(),
            year,
            quantity,
            accuracy: Some("A".to_string()),
            pct_change_yoy: Some(-1.5),
            pct_change_base: Some(3.0),
            significant: Some(false),
            trend: Some("stable".to_string()),
            rse: Some(0.8),
        }
    }

    pub(crate) fn expenditure_row(code: &str, year: i64, expenditure: Option<f64>) -> ExpenditureRecord {
        ExpenditureRecord {
            code: code.to_string(),
            code_level: 4,
            food_category: "Dairy".to_string(),
            food_group: "Milk".to_string(),
            major_food_code: "MJ01".to_string(),
            minor_food_code: format!("MN-{code}"),
            units: "pence".to_string(),
            year,
            expenditure,
            accuracy: None,
            pct_change_yoy: None,
            pct_change_base: None,
            significant: None,
            trend: None,
            rse: None,
        }
    }

    pub(crate) fn seeded_connection() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_years(&mut conn, &uk_reference_years()).unwrap();
        conn
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.years, 0);
        assert_eq!(counts.joined, 0);
    }

    #[test]
    fn test_load_facts_round_trips_metadata() {
        let mut conn = seeded_connection();

        let quantities = vec![quantity_row("C1", 2019, Some(10.0))];
        let expenditures = vec![expenditure_row("C1", 2019, None)];
        load_facts(&mut conn, &quantities, &expenditures, (None, None)).unwrap();

        assert_eq!(get_quantities(&conn).unwrap(), quantities);
        assert_eq!(get_expenditures(&conn).unwrap(), expenditures);

        let foods = get_foods(&conn).unwrap();
        assert_eq!(foods.len(), 1);
        assert_eq!(foods[0].units, "ml");
    }

    #[test]
    fn test_duplicate_key_rejects_whole_batch() {
        let mut conn = seeded_connection();

        let quantities = vec![
            quantity_row("C1", 2019, Some(10.0)),
            quantity_row("C2", 2019, Some(4.0)),
            quantity_row("C1", 2019, Some(11.0)),
        ];
        let err = load_facts(&mut conn, &quantities, &[], (None, None)).unwrap_err();

        match err {
            LoadError::DuplicateKey { table, code, year } => {
                assert_eq!(table, QUANTITY_TABLE);
                assert_eq!(code, "C1");
                assert_eq!(year, 2019);
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }

        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.quantities, 0, "batch must not be partially applied");
        assert_eq!(counts.foods, 0);
    }

    #[test]
    fn test_unknown_year_is_rejected() {
        let mut conn = seeded_connection();

        let expenditures = vec![expenditure_row("C1", 1960, Some(2.0))];
        let err = load_facts(&mut conn, &[], &expenditures, (None, None)).unwrap_err();

        assert!(matches!(
            err,
            LoadError::UnknownYear { table: EXPENDITURE_TABLE, year: 1960, .. }
        ));
        assert_eq!(table_counts(&conn).unwrap().expenditures, 0);
    }

    #[test]
    fn test_load_events_recorded() {
        let mut conn = seeded_connection();

        load_facts(
            &mut conn,
            &[quantity_row("C1", 2019, Some(1.0))],
            &[expenditure_row("C1", 2019, Some(1.0))],
            (Some("abc".to_string()), None),
        )
        .unwrap();

        let events = get_load_events(&conn, 10).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].table_name, EXPENDITURE_TABLE);
        assert_eq!(events[1].table_name, QUANTITY_TABLE);
        assert_eq!(events[1].source_sha256.as_deref(), Some("abc"));
        assert_eq!(events[2].table_name, "year_dim");
        assert_eq!(events[2].row_count, 50);
    }

    #[test]
    fn test_load_csv_parses_nulls_and_hashes_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quantity.csv");
        std::fs::write(
            &path,
            "code,code_level,food_category,food_group,major_food_code,minor_food_code,units,year,quantity,accuracy,pct_change_yoy,pct_change_base,significant,trend,rse\n\
             C1,4,Dairy,Milk,MJ01,MN01,ml,2019,1520.5,A,-1.2,4.0,true,down,0.9\n\
             C1,4,Dairy,Milk,MJ01,MN01,ml,2020,,,,,,,\n",
        )
        .unwrap();

        let extract: FactExtract<QuantityRecord> = load_csv(&path).unwrap();

        assert_eq!(extract.rows.len(), 2);
        assert_eq!(extract.rows[0].quantity, Some(1520.5));
        assert_eq!(extract.rows[0].significant, Some(true));
        assert_eq!(extract.rows[1].quantity, None);
        assert_eq!(extract.rows[1].trend, None);
        assert_eq!(extract.sha256.len(), 64);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let err = load_csv::<QuantityRecord>(Path::new("/nonexistent/quantity.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
