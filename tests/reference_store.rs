use chrono::NaiveDate;
use inventory_risk::workflows::inventory::{
    Category, CriteriaCatalog, Criterion, InventoryEnricher, ReferenceIndex, ReferenceStore, Row,
    ScoreSource, ScoringEngine,
};
use serde_json::json;

#[test]
fn appended_record_reloads_with_dates_as_text() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("reference.json");
    let store = ReferenceStore::new(&path);

    store
        .append(&Row::new().with("Produit", "P-1").with("Score total", 12.0))
        .expect("first append");
    let row = Row::new()
        .with("Produit", "P-2")
        .with(
            "Date du dernier RI",
            NaiveDate::from_ymd_opt(2024, 11, 5).expect("valid date"),
        )
        .with("UC", 40.0)
        .with_null("ECV/COR");
    store.append(&row).expect("second append");

    let records = store.load().expect("store reloads");
    assert_eq!(records.len(), 2);
    assert_eq!(
        records.last(),
        Some(&json!({
            "Produit": "P-2",
            "Date du dernier RI": "2024-11-05",
            "UC": 40,
            "ECV/COR": ""
        }))
    );

    let index = ReferenceIndex::from_path(&path, "Produit").expect("index rebuilds");
    assert_eq!(index.len(), 2);
    assert_eq!(
        index.get("P-1").and_then(|record| record.stored_score()),
        Some(12.0)
    );
}

#[test]
fn missing_rows_are_appended_and_reused_after_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("reference.json");
    std::fs::write(
        &path,
        r#"[{ "Produit": "P-1", "Score total": 17, "Catégorie": "Haut" }]"#,
    )
    .expect("seed reference");

    let catalog =
        CriteriaCatalog::new(vec![Criterion::new("UC", 1.0).with_specification(">=0", 4.0)]);
    let today = NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date");
    let index = ReferenceIndex::from_path(&path, "Produit").expect("index builds");
    let enricher = InventoryEnricher::new(ScoringEngine::new(catalog.clone(), today), index);

    let rows = vec![
        Row::new().with("Produit", "P-1").with("UC", 5.0),
        Row::new().with("Produit", "P-2").with("UC", 7.0),
    ];
    let missing = enricher.missing_references(&rows);
    assert_eq!(missing, vec![1]);

    let store = ReferenceStore::new(&path);
    let report = store.append_many(missing.iter().map(|&i| (i, &rows[i])), "Produit");
    assert_eq!(report.added, 1);
    assert!(report.failures.is_empty());

    let reloaded = ReferenceIndex::from_path(&path, "Produit").expect("index rebuilds");
    assert!(reloaded.contains("P-2"));

    // The appended row carries no stored score, so it is reused as unscored.
    let enricher = InventoryEnricher::new(ScoringEngine::new(catalog, today), reloaded);
    let records = enricher.enrich(&rows);
    assert_eq!(records[1].score_source, ScoreSource::Reference);
    assert_eq!(records[1].score, 0.0);
    assert_eq!(records[1].category, Category::Unweighted);
    assert!(enricher.missing_references(&rows).is_empty());
}

#[test]
fn failed_write_keeps_previous_dataset() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("reference.json");
    std::fs::write(&path, "[]").expect("seed reference");
    let store = ReferenceStore::new(&path);

    store
        .append(&Row::new().with("Produit", "P-1"))
        .expect("append succeeds");
    let written = std::fs::read_to_string(&path).expect("reference readable");
    assert!(written.ends_with("]\n"));

    std::fs::write(&path, "not json").expect("corrupt reference");
    assert!(store.append(&Row::new().with("Produit", "P-2")).is_err());
    assert_eq!(
        std::fs::read_to_string(&path).expect("reference readable"),
        "not json"
    );
}
