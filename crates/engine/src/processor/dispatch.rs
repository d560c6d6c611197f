// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command processors and event appliers
//!
//! Processors read state and decide which follow-up records to write. Only
//! appliers change state, so processing and replay produce the same state.

use super::state::{PartitionState, VariableState};
use super::ProcessingError;
use keel_core::{
    CommandResponse, Intent, JobValue, Record, RejectionType, SideEffect, ValueType,
    VariableValue,
};

/// What processing one command produced
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    /// Follow-up records, written before anything else happens
    pub records: Vec<Record>,
    pub response: Option<CommandResponse>,
    /// Run in order once the records are written and state is committed
    pub side_effects: Vec<SideEffect>,
}

impl ProcessingResult {
    fn accepted(event: Record, side_effects: Vec<SideEffect>) -> Self {
        Self {
            response: CommandResponse::for_record(&event),
            records: vec![event],
            side_effects,
        }
    }

    fn rejected(command: &Record, kind: RejectionType, reason: impl Into<String>) -> Self {
        let rejection = command.rejection(kind, reason);
        Self {
            response: CommandResponse::for_record(&rejection),
            records: vec![rejection],
            side_effects: Vec::new(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.records.iter().any(|r| r.rejection.is_some())
    }
}

/// The closed set of command processors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandProcessor {
    CreateJob,
    CompleteJob,
    UpdateVariable,
    DeleteVariable,
}

impl CommandProcessor {
    pub fn for_command(value_type: ValueType, intent: Intent) -> Option<Self> {
        match (value_type, intent) {
            (ValueType::Job, Intent::Create) => Some(Self::CreateJob),
            (ValueType::Job, Intent::Complete) => Some(Self::CompleteJob),
            (ValueType::Variable, Intent::Update) => Some(Self::UpdateVariable),
            (ValueType::Variable, Intent::Delete) => Some(Self::DeleteVariable),
            _ => None,
        }
    }

    pub fn process(
        self,
        state: &PartitionState,
        command: &Record,
    ) -> Result<ProcessingResult, ProcessingError> {
        match self {
            Self::CreateJob => {
                let Ok(job) = command.value_as::<JobValue>() else {
                    return Ok(ProcessingResult::rejected(
                        command,
                        RejectionType::InvalidArgument,
                        "expected a job value",
                    ));
                };
                if job.job_type.is_empty() {
                    return Ok(ProcessingResult::rejected(
                        command,
                        RejectionType::InvalidArgument,
                        "job type must not be empty",
                    ));
                }
                let key = state.next_key;
                let effect = SideEffect::at_least_once(
                    "jobs",
                    format!("job {} of type {} is available", key, job.job_type),
                );
                Ok(ProcessingResult::accepted(
                    follow_up(command, key, Intent::Created, serde_json::to_value(&job)?),
                    vec![effect],
                ))
            }
            Self::CompleteJob => {
                let Some(job) = state.jobs.get(&command.key) else {
                    return Ok(ProcessingResult::rejected(
                        command,
                        RejectionType::NotFound,
                        format!("no job with key {}", command.key),
                    ));
                };
                let effect =
                    SideEffect::at_most_once("jobs", format!("job {} completed", command.key));
                Ok(ProcessingResult::accepted(
                    follow_up(command, command.key, Intent::Completed, serde_json::to_value(job)?),
                    vec![effect],
                ))
            }
            Self::UpdateVariable => {
                let variable = match command.value_as::<VariableValue>() {
                    Ok(v) if !v.name.is_empty() => v,
                    _ => {
                        return Ok(ProcessingResult::rejected(
                            command,
                            RejectionType::InvalidArgument,
                            "expected a named variable",
                        ))
                    }
                };
                let key = state
                    .variables
                    .get(&variable.name)
                    .map(|v| v.key)
                    .unwrap_or(state.next_key);
                Ok(ProcessingResult::accepted(
                    follow_up(command, key, Intent::Updated, serde_json::to_value(&variable)?),
                    Vec::new(),
                ))
            }
            Self::DeleteVariable => {
                let Ok(variable) = command.value_as::<VariableValue>() else {
                    return Ok(ProcessingResult::rejected(
                        command,
                        RejectionType::InvalidArgument,
                        "expected a named variable",
                    ));
                };
                let Some(existing) = state.variables.get(&variable.name) else {
                    return Ok(ProcessingResult::rejected(
                        command,
                        RejectionType::NotFound,
                        format!("no variable named {}", variable.name),
                    ));
                };
                Ok(ProcessingResult::accepted(
                    follow_up(command, existing.key, Intent::Deleted, serde_json::to_value(&variable)?),
                    Vec::new(),
                ))
            }
        }
    }
}

fn follow_up(command: &Record, key: i64, intent: Intent, value: serde_json::Value) -> Record {
    let mut event = Record::event(key, command.value_type, intent, value);
    event.source_position = command.position;
    event.request_id = command.request_id;
    event
}

/// Process one command against the current state
///
/// Commands without a processor are rejected, never dropped.
pub fn process_command(
    state: &PartitionState,
    command: &Record,
) -> Result<ProcessingResult, ProcessingError> {
    match CommandProcessor::for_command(command.value_type, command.intent) {
        Some(processor) => processor.process(state, command),
        None => Ok(ProcessingResult::rejected(
            command,
            RejectionType::InvalidArgument,
            format!(
                "no processor for {:?} {:?} commands",
                command.value_type, command.intent
            ),
        )),
    }
}

/// Apply an event to state
///
/// Appliers are idempotent: applying an event twice leaves the same state.
pub fn apply_event(state: &mut PartitionState, event: &Record) -> Result<(), ProcessingError> {
    match (event.value_type, event.intent) {
        (ValueType::Job, Intent::Created) => {
            let job = event.value_as::<JobValue>()?;
            state.jobs.insert(event.key, job);
            state.observe_key(event.key);
        }
        (ValueType::Job, Intent::Completed) => {
            state.jobs.remove(&event.key);
        }
        (ValueType::Variable, Intent::Updated) => {
            let variable = event.value_as::<VariableValue>()?;
            state.variables.insert(
                variable.name,
                VariableState {
                    key: event.key,
                    value: variable.value,
                },
            );
            state.observe_key(event.key);
        }
        (ValueType::Variable, Intent::Deleted) => {
            let variable = event.value_as::<VariableValue>()?;
            state.variables.remove(&variable.name);
        }
        (value_type, intent) => return Err(ProcessingError::NoApplier { value_type, intent }),
    }
    Ok(())
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
