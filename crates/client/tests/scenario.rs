use std::path::Path;

use item_client::scenario;
use item_runtime::{RuntimeConfig, Session};

fn config(stores: u32, observers: usize) -> RuntimeConfig {
    RuntimeConfig {
        stores,
        observers,
        catalog_path: Some(Path::new(env!("CARGO_MANIFEST_DIR")).join("../items/content/data")),
        ..RuntimeConfig::default()
    }
}

#[tokio::test]
async fn scripted_scenario_converges() {
    let mut session = Session::start(config(2, 2)).await.unwrap();
    let report = scenario::run(&mut session).await.unwrap();
    session.shutdown().await.unwrap();

    println!("{report}");
    // two configured observers plus the late joiner
    assert_eq!(report.observers.len(), 3);
    assert!(report.converged());
    scenario::ensure_converged(&report).unwrap();

    let late = &report.observers[2];
    assert_eq!(late.resyncs, 1);
}

#[tokio::test]
async fn scenario_runs_with_a_single_store() {
    let mut session = Session::start(config(1, 0)).await.unwrap();
    let report = scenario::run(&mut session).await.unwrap();
    session.shutdown().await.unwrap();

    assert_eq!(report.observers.len(), 1);
    assert!(report.converged());
}
