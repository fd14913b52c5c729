//! Tamper evidence of the audit log

use tempfile::NamedTempFile;

use mental_poker::observability::audit::verify_entries;
use mental_poker::observability::{AuditLog, Direction};
use mental_poker::{Envelope, Message, ParticipantId, Payload, SigningKey};

fn sample_log(log: &mut AuditLog) {
    let key = SigningKey::generate();
    let sent = Envelope::signed(
        Message::from_participant(ParticipantId::new(1), Payload::VerifyCardOk),
        &key,
    )
    .unwrap();
    log.append("session opened");
    log.record(Direction::Sent, &sent);
    log.record(Direction::Received, &sent);
}

#[test]
fn test_recorded_messages_are_described() {
    let mut log = AuditLog::new();
    sample_log(&mut log);

    assert_eq!(log.len(), 3);
    assert!(log.verify_chain());
    assert!(log.entries()[1].description.starts_with("sent Verify_Card_OK from 1"));
    assert!(log.render().contains("received Verify_Card_OK"));
}

#[test]
fn test_editing_an_entry_breaks_the_chain() {
    let mut log = AuditLog::new();
    sample_log(&mut log);

    let mut entries = log.entries().to_vec();
    assert!(verify_entries(&entries));
    entries[1].description = "sent Verify_Card_NOK from 1".to_string();
    assert!(!verify_entries(&entries));
}

#[test]
fn test_dropping_an_entry_breaks_the_chain() {
    let mut log = AuditLog::new();
    sample_log(&mut log);

    let mut entries = log.entries().to_vec();
    entries.remove(1);
    assert!(!verify_entries(&entries));
}

#[test]
fn test_persisted_log_reloads_and_verifies() {
    let file = NamedTempFile::new().unwrap();
    let mut log = AuditLog::with_file(file.path());
    sample_log(&mut log);

    let loaded = AuditLog::load(file.path()).unwrap();
    assert_eq!(loaded, log.entries());
    assert!(verify_entries(&loaded));
}

#[test]
fn test_second_session_on_the_same_file_still_verifies() {
    let file = NamedTempFile::new().unwrap();
    let mut first = AuditLog::with_file(file.path());
    sample_log(&mut first);

    let mut second = AuditLog::with_file(file.path());
    sample_log(&mut second);

    let loaded = AuditLog::load(file.path()).unwrap();
    assert_eq!(loaded, second.entries());
    assert!(verify_entries(&loaded));
}
