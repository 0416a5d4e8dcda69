use food_trends::{
    insert_years, load_csv, load_facts, load_joined_facts, setup_database, table_counts,
    uk_reference_years, Analysis, AnalyticsReport, ExpenditureRecord, LoadError,
    QuantityRecord, ResultSet,
};
use rusqlite::Connection;
use std::path::Path;

const HEADER: &str = "code,code_level,food_category,food_group,major_food_code,minor_food_code,units,year,{measure},accuracy,pct_change_yoy,pct_change_base,significant,trend,rse";

fn write_extract(dir: &Path, name: &str, measure: &str, rows: &[(&str, i64, &str)]) -> std::path::PathBuf {
    let mut body = HEADER.replace("{measure}", measure);
    body.push('\n');
    for (code, year, value) in rows {
        let (category, group) = match *code {
            "MILK" => ("Dairy", "Milk and cream"),
            _ => ("Meat", "Carcase meat"),
        };
        body.push_str(&format!(
            "{code},3,{category},{group},MJ-{code},MN-{code},g,{year},{value},A,,,,,\n"
        ));
    }
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn open_seeded(dir: &Path) -> Connection {
    let mut conn = Connection::open(dir.join("food.db")).unwrap();
    setup_database(&conn).unwrap();
    insert_years(&mut conn, &uk_reference_years()).unwrap();
    conn
}

#[test]
fn test_two_codes_three_years_with_one_missing_expenditure() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_seeded(dir.path());

    let quantity_csv = write_extract(
        dir.path(),
        "quantity.csv",
        "quantity",
        &[
            ("BEEF", 2019, "120"),
            ("BEEF", 2020, "100"),
            ("BEEF", 2021, "110"),
            ("MILK", 2019, "1500"),
            ("MILK", 2020, "1600"),
            ("MILK", 2021, "1550"),
        ],
    );
    let expenditure_csv = write_extract(
        dir.path(),
        "expenditure.csv",
        "expenditure",
        &[
            ("BEEF", 2019, "300"),
            ("BEEF", 2020, "320"),
            ("BEEF", 2021, "310"),
            ("MILK", 2019, "90"),
            // MILK 2020 deliberately missing
            ("MILK", 2021, "99"),
        ],
    );

    let quantities = load_csv::<QuantityRecord>(&quantity_csv).unwrap();
    let expenditures = load_csv::<ExpenditureRecord>(&expenditure_csv).unwrap();
    load_facts(
        &mut conn,
        &quantities.rows,
        &expenditures.rows,
        (Some(quantities.sha256.clone()), Some(expenditures.sha256.clone())),
    )
    .unwrap();

    let facts = load_joined_facts(&conn).unwrap();
    assert_eq!(facts.len(), 5);
    assert!(!facts.iter().any(|f| f.code == "MILK" && f.year == 2020));

    let counts = table_counts(&conn).unwrap();
    assert_eq!(counts.quantities, 6);
    assert_eq!(counts.expenditures, 5);
    assert_eq!(counts.foods, 2);
    assert_eq!(counts.joined, 5);

    // BEEF 2020: expenditure 300 -> 320 while quantity 120 -> 100.
    // MILK 2021 compares against 2019, its previous joined row, and quantity rose.
    match Analysis::Inflation.run(&facts) {
        ResultSet::Inflation(rows) => {
            let keys: Vec<(&str, i64)> = rows.iter().map(|r| (r.code.as_str(), r.year)).collect();
            assert_eq!(keys, vec![("BEEF", 2020)]);
        }
        other => panic!("unexpected result set {other:?}"),
    }

    let report = AnalyticsReport::build(&facts);
    let recession_2020 = report
        .recession_impact
        .iter()
        .find(|r| r.year == 2020)
        .unwrap();
    assert!(recession_2020.is_recession);
    assert_eq!(recession_2020.avg_quantity, Some(100.0));

    let beef_2019 = report
        .cost_per_unit
        .iter()
        .find(|r| r.food_group == "Carcase meat" && r.year == 2019)
        .unwrap();
    assert_eq!(beef_2019.cost_per_unit, Some(2.5));
}

#[test]
fn test_rejected_load_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_seeded(dir.path());

    let quantity_csv = write_extract(
        dir.path(),
        "quantity.csv",
        "quantity",
        &[("BEEF", 2019, "120"), ("BEEF", 1900, "100")],
    );
    let quantities = load_csv::<QuantityRecord>(&quantity_csv).unwrap();

    let err = load_facts(&mut conn, &quantities.rows, &[], (None, None)).unwrap_err();
    assert!(matches!(err, LoadError::UnknownYear { year: 1900, .. }));

    let counts = table_counts(&conn).unwrap();
    assert_eq!(counts.quantities, 0);
    assert_eq!(counts.foods, 0);
}
