mod common;

use tracing_test::traced_test;

#[traced_test]
#[test]
fn retrain_logs_fit_and_persistence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = common::constant_service(&dir.path().join("classifier.json"), 0.5);

    service
        .retrain(&common::separable_batch())
        .expect("retrain should succeed");

    assert!(logs_contain("booster fit completed"));
    assert!(logs_contain("classifier retrained and persisted"));
    assert!(logs_contain("total_trees=300"));
}

#[traced_test]
#[test]
fn rejected_retrain_does_not_log_a_fit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = common::constant_service(&dir.path().join("classifier.json"), 0.5);
    let mut request = common::separable_batch();
    request.labels.pop();

    assert!(service.retrain(&request).is_err());

    assert!(!logs_contain("booster fit completed"));
}
