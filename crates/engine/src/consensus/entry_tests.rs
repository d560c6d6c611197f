// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn application_entry_keeps_term_and_data() {
    let entry = RaftEntry::application(7, b"record".to_vec());
    let decoded = RaftEntry::decode(3, &entry.encode()).unwrap();
    assert_eq!(decoded, entry);
    assert_eq!(decoded.data(), Some(&b"record"[..]));
}

#[test]
fn no_op_has_no_data() {
    let entry = RaftEntry::no_op(2);
    assert_eq!(entry.encode().len(), 9);
    let decoded = RaftEntry::decode(0, &entry.encode()).unwrap();
    assert_eq!(decoded.term, 2);
    assert_eq!(decoded.data(), None);
}

#[parameterized(
    empty = { vec![] },
    short_header = { vec![0, 0, 0, 1] },
    unknown_kind = { vec![0, 0, 0, 0, 0, 0, 0, 1, 9] },
    no_op_with_data = { vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 42] },
)]
fn malformed_payloads_are_rejected(bytes: Vec<u8>) {
    let err = RaftEntry::decode(5, &bytes).unwrap_err();
    assert!(matches!(err, RaftError::MalformedEntry { index: 5, .. }));
}
