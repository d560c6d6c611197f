// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keel_core::{Delivery, RecordType};
use serde_json::json;
use yare::parameterized;

fn command(value_type: ValueType, intent: Intent, value: serde_json::Value) -> Record {
    let mut record = Record::command(value_type, intent, value).with_request_id(7);
    record.position = 12;
    record
}

fn create_job(job_type: &str) -> Record {
    command(ValueType::Job, Intent::Create, json!({ "job_type": job_type }))
}

fn only_record(result: &ProcessingResult) -> &Record {
    assert_eq!(result.records.len(), 1);
    &result.records[0]
}

#[test]
fn create_job_takes_next_key_and_announces_job() {
    let state = PartitionState {
        next_key: 5,
        ..PartitionState::default()
    };
    let result = process_command(&state, &create_job("payment")).unwrap();

    let event = only_record(&result);
    assert_eq!(event.record_type, RecordType::Event);
    assert_eq!(event.intent, Intent::Created);
    assert_eq!(event.key, 5);
    assert_eq!(event.source_position, 12);
    assert_eq!(event.request_id, Some(7));

    let response = result.response.unwrap();
    assert_eq!(response.request_id, 7);
    assert_eq!(response.key, 5);
    assert!(!response.is_rejection());

    assert_eq!(result.side_effects.len(), 1);
    assert_eq!(result.side_effects[0].delivery, Delivery::AtLeastOnce);
    assert_eq!(result.side_effects[0].channel, "jobs");
}

#[test]
fn processing_does_not_change_state() {
    let state = PartitionState::default();
    process_command(&state, &create_job("payment")).unwrap();
    assert_eq!(state, PartitionState::default());
}

#[parameterized(
    empty_type = { json!({ "job_type": "" }) },
    missing_type = { json!({ "worker": "w1" }) },
    not_an_object = { json!(3) },
)]
fn invalid_job_is_rejected(value: serde_json::Value) {
    let state = PartitionState::default();
    let result =
        process_command(&state, &command(ValueType::Job, Intent::Create, value)).unwrap();

    let rejection = only_record(&result);
    assert_eq!(rejection.record_type, RecordType::CommandRejection);
    assert_eq!(
        rejection.rejection.as_ref().unwrap().kind,
        RejectionType::InvalidArgument
    );
    assert!(result.side_effects.is_empty());
    assert!(result.response.unwrap().is_rejection());
}

#[test]
fn completing_unknown_job_is_rejected_as_not_found() {
    let state = PartitionState::default();
    let complete = command(ValueType::Job, Intent::Complete, json!({})).with_key(9);
    let result = process_command(&state, &complete).unwrap();

    assert!(result.is_rejection());
    let rejection = only_record(&result).rejection.clone().unwrap();
    assert_eq!(rejection.kind, RejectionType::NotFound);
    assert!(rejection.reason.contains('9'));
}

#[test]
fn completing_job_reports_stored_job_at_most_once() {
    let mut state = PartitionState::default();
    let job = JobValue {
        job_type: "payment".to_string(),
        worker: Some("w1".to_string()),
        deadline: 0,
    };
    state.jobs.insert(3, job.clone());

    let complete = command(ValueType::Job, Intent::Complete, json!({})).with_key(3);
    let result = process_command(&state, &complete).unwrap();

    let event = only_record(&result);
    assert_eq!(event.intent, Intent::Completed);
    assert_eq!(event.key, 3);
    assert_eq!(event.value_as::<JobValue>().unwrap(), job);
    assert_eq!(result.side_effects[0].delivery, Delivery::AtMostOnce);
}

#[test]
fn updating_existing_variable_keeps_its_key() {
    let mut state = PartitionState {
        next_key: 10,
        ..PartitionState::default()
    };
    state.variables.insert(
        "limit".to_string(),
        VariableState {
            key: 4,
            value: json!(1),
        },
    );

    let update = |name: &str| {
        command(
            ValueType::Variable,
            Intent::Update,
            json!({ "name": name, "value": 2 }),
        )
    };
    let existing = process_command(&state, &update("limit")).unwrap();
    let fresh = process_command(&state, &update("other")).unwrap();

    assert_eq!(only_record(&existing).key, 4);
    assert_eq!(only_record(&fresh).key, 10);
}

#[test]
fn deleting_unknown_variable_is_rejected_as_not_found() {
    let state = PartitionState::default();
    let delete = command(ValueType::Variable, Intent::Delete, json!({ "name": "gone" }));
    let result = process_command(&state, &delete).unwrap();

    let rejection = only_record(&result).rejection.clone().unwrap();
    assert_eq!(rejection.kind, RejectionType::NotFound);
}

#[parameterized(
    job_update = { ValueType::Job, Intent::Update },
    job_delete = { ValueType::Job, Intent::Delete },
    variable_create = { ValueType::Variable, Intent::Create },
    variable_complete = { ValueType::Variable, Intent::Complete },
)]
fn commands_without_processor_are_rejected(value_type: ValueType, intent: Intent) {
    assert_eq!(CommandProcessor::for_command(value_type, intent), None);

    let state = PartitionState::default();
    let result = process_command(&state, &command(value_type, intent, json!({}))).unwrap();

    let rejection = only_record(&result).rejection.clone().unwrap();
    assert_eq!(rejection.kind, RejectionType::InvalidArgument);
}

#[test]
fn applying_created_twice_is_idempotent() {
    let mut state = PartitionState::default();
    let event = Record::event(3, ValueType::Job, Intent::Created, json!({ "job_type": "a" }));

    apply_event(&mut state, &event).unwrap();
    let once = state.clone();
    apply_event(&mut state, &event).unwrap();

    assert_eq!(state, once);
    assert_eq!(state.next_key, 4);
    assert!(state.jobs.contains_key(&3));
}

#[test]
fn variable_lifecycle_through_appliers() {
    let mut state = PartitionState::default();
    let value = json!({ "name": "limit", "value": 5 });
    apply_event(
        &mut state,
        &Record::event(1, ValueType::Variable, Intent::Updated, value.clone()),
    )
    .unwrap();
    assert_eq!(state.variables["limit"].value, json!(5));

    apply_event(
        &mut state,
        &Record::event(1, ValueType::Variable, Intent::Deleted, value),
    )
    .unwrap();
    assert!(state.variables.is_empty());
    assert_eq!(state.next_key, 2);
}

#[test]
fn command_intents_have_no_applier() {
    let mut state = PartitionState::default();
    let err = apply_event(&mut state, &create_job("a")).unwrap_err();
    assert!(matches!(
        err,
        ProcessingError::NoApplier {
            value_type: ValueType::Job,
            intent: Intent::Create
        }
    ));
}
