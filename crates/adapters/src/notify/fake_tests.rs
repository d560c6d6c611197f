// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fake_notifier_records_calls() {
    let notifier = FakeNotifier::new();

    notifier.send("jobs", "job 1 created").await.unwrap();
    notifier.send("jobs", "job 1 completed").await.unwrap();

    let calls = notifier.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].channel, "jobs");
    assert_eq!(calls[0].message, "job 1 created");
}

#[tokio::test]
async fn injected_failures_are_recorded_then_cleared() {
    let notifier = FakeNotifier::new();
    notifier.fail_next(2);

    assert!(notifier.send("jobs", "m").await.is_err());
    assert!(notifier.send("jobs", "m").await.is_err());
    assert!(notifier.send("jobs", "m").await.is_ok());

    assert_eq!(notifier.calls().len(), 3);
    assert_eq!(notifier.delivered().len(), 1);
}
