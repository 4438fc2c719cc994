use policyforge_store::{
    BenchmarkRow, ExperimentRecord, ExperimentStore, HistoryService, SqliteStore, AGGREGATE_LABEL,
};

fn record(label: &str, policy: &str, score: f64) -> ExperimentRecord {
    ExperimentRecord {
        benchmark_label: label.into(),
        candidate_name: policy.into(),
        description: format!("{policy} description"),
        benchmark_description: String::new(),
        artifact_locator: format!("new_policies/{policy}.cc"),
        metric_value: Some(0.5),
        score_value: score,
    }
}

#[test]
fn test_rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("DB").join("funsearch.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .register_benchmark(&BenchmarkRow {
                name: "mcf".into(),
                description: "pointer chasing".into(),
                trace_path: "traces/mcf.trace.gz".into(),
            })
            .unwrap();
        store.record(&record("mcf", "ship", 0.7)).unwrap();
        store.record(&record(AGGREGATE_LABEL, "ship", 0.8)).unwrap();
        store.record(&record(AGGREGATE_LABEL, "hawk", 0.9)).unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.count().unwrap(), 3);

    let top = store.top_candidates(AGGREGATE_LABEL, 5).unwrap();
    let names: Vec<&str> = top.iter().map(|c| c.policy_name.as_str()).collect();
    assert_eq!(names, vec!["hawk", "ship"]);
    assert_eq!(store.top_candidates("mcf", 5).unwrap().len(), 1);

    let catalogue = store.benchmarks_with_descriptions().unwrap();
    assert_eq!(catalogue.items.len(), 1);
    assert_eq!(catalogue.description, "- mcf: pointer chasing");
}
