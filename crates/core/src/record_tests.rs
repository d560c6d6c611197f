// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn create_job() -> Record {
    Record::command(
        ValueType::Job,
        Intent::Create,
        serde_json::json!({"job_type": "payment"}),
    )
}

#[parameterized(
    create = { Intent::Create, false },
    created = { Intent::Created, true },
    complete = { Intent::Complete, false },
    completed = { Intent::Completed, true },
    update = { Intent::Update, false },
    updated = { Intent::Updated, true },
    delete = { Intent::Delete, false },
    deleted = { Intent::Deleted, true },
)]
fn intent_classification(intent: Intent, is_event: bool) {
    assert_eq!(intent.is_event(), is_event);
}

#[test]
fn command_defaults_are_unset() {
    let record = create_job();
    assert!(record.is_command());
    assert_eq!(record.position, UNSET_POSITION);
    assert_eq!(record.key, -1);
    assert!(record.request_id.is_none());
}

#[test]
fn rejection_points_back_to_command() {
    let mut command = create_job().with_request_id(7);
    command.position = 12;

    let rejection = command.rejection(RejectionType::NotFound, "no such job");

    assert_eq!(rejection.record_type, RecordType::CommandRejection);
    assert_eq!(rejection.source_position, 12);
    assert_eq!(rejection.request_id, Some(7));
    assert_eq!(
        rejection.rejection,
        Some(Rejection {
            kind: RejectionType::NotFound,
            reason: "no such job".to_string()
        })
    );
}

#[test]
fn value_decodes_into_typed_form() {
    let job: JobValue = create_job().value_as().unwrap();
    assert_eq!(job.job_type, "payment");
    assert_eq!(job.worker, None);
}

#[test]
fn invalid_value_reports_value_type() {
    let record = Record::command(ValueType::Variable, Intent::Update, serde_json::json!(5));
    let err = record.value_as::<VariableValue>().unwrap_err();
    assert!(matches!(
        err,
        RecordError::InvalidValue {
            value_type: ValueType::Variable,
            ..
        }
    ));
}

#[test]
fn malformed_bytes_are_rejected() {
    assert!(matches!(
        Record::from_bytes(b"not json"),
        Err(RecordError::Malformed(_))
    ));
}

#[test]
fn rejection_field_is_omitted_for_commands() {
    let bytes = create_job().to_bytes().unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(!text.contains("rejection"));
}
