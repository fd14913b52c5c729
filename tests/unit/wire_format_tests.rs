//! The JSON shapes exchanged between the Playing Area and its clients

use bytes::BytesMut;

use mental_poker::protocol::{decode_frame, encode_frame, CodecError};
use mental_poker::{Envelope, Message, ParticipantId, Payload, PokerError, Role, SigningKey};

#[test]
fn test_bare_message_parses_as_unsigned() {
    let envelope = Envelope::from_json_bytes(br#"{"ID":3,"command":"Verify_Deck_OK"}"#).unwrap();
    assert!(!envelope.is_signed());
    assert_eq!(envelope.sender(), Some(ParticipantId::new(3)));
    assert_eq!(envelope.payload(), &Payload::VerifyDeckOk);
}

#[test]
fn test_string_ids_are_accepted() {
    let envelope = Envelope::from_json_bytes(br#"{"ID":"2","command":"Verify_Deck_NOK","cheaterIds":["1",3]}"#).unwrap();
    assert_eq!(envelope.sender(), Some(ParticipantId::new(2)));
    assert_eq!(
        envelope.payload(),
        &Payload::VerifyDeckNok {
            cheater_ids: vec![ParticipantId::new(1), ParticipantId::new(3)]
        }
    );
}

#[test]
fn test_register_fields_are_camel_case() {
    let key = SigningKey::generate().public_key();
    let body = format!(
        r#"{{"command":"Register","role":"Caller","nick":"dealer","publicKey":"{}","numPlayers":4}}"#,
        key.to_hex()
    );
    let envelope = Envelope::from_json_bytes(body.as_bytes()).unwrap();
    assert_eq!(envelope.sender(), None);
    assert_eq!(
        envelope.payload(),
        &Payload::Register {
            role: Role::Caller,
            nick: "dealer".to_string(),
            public_key: key,
            num_players: Some(4),
            assigned_id: None,
        }
    );
}

#[test]
fn test_signed_envelope_shape() {
    let key = SigningKey::generate();
    let message = Message::from_participant(ParticipantId::new(1), Payload::AskForWinner);
    let envelope = Envelope::signed(message, &key).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&envelope.to_json_bytes().unwrap()).unwrap();
    assert_eq!(value["message"]["command"], "Ask_For_Winner");
    assert_eq!(value["message"]["ID"], 1);
    assert!(value["signature"].is_string());
    assert!(value.get("certificate").is_none());

    let parsed = Envelope::from_json_bytes(&envelope.to_json_bytes().unwrap()).unwrap();
    assert!(parsed.verify_with(&key.public_key()));
}

#[test]
fn test_signature_covers_the_sender_id() {
    let key = SigningKey::generate();
    let message = Message::from_participant(ParticipantId::new(1), Payload::VerifyCardOk);
    let mut envelope = Envelope::signed(message, &key).unwrap();
    envelope.message.sender = Some(ParticipantId::new(2));
    assert!(!envelope.verify_with(&key.public_key()));
}

#[test]
fn test_non_object_body_is_rejected() {
    let err = Envelope::from_json_bytes(b"[1,2,3]").unwrap_err();
    assert!(matches!(err, PokerError::Serialization { .. }));
}

#[test]
fn test_frame_prefix_is_big_endian_length() {
    let envelope = Envelope::unsigned(Message::from_area(Payload::GetPlayersList));
    let frame = encode_frame(&envelope).unwrap();
    let body_len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(body_len, frame.len() - 4);
    assert_eq!(&frame[4..], envelope.to_json_bytes().unwrap().as_slice());
}

#[test]
fn test_two_frames_in_one_read() {
    let first = Envelope::unsigned(Message::from_participant(ParticipantId::new(1), Payload::VerifyCardOk));
    let second = Envelope::unsigned(Message::from_participant(ParticipantId::new(2), Payload::VerifyDeckOk));
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&encode_frame(&first).unwrap());
    buf.extend_from_slice(&encode_frame(&second).unwrap());

    assert_eq!(decode_frame(&mut buf, 1024).unwrap(), Some(first));
    assert_eq!(decode_frame(&mut buf, 1024).unwrap(), Some(second));
    assert_eq!(decode_frame(&mut buf, 1024).unwrap(), None);
    assert!(buf.is_empty());
}

#[test]
fn test_oversized_frame_is_refused_before_reading_the_body() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&(2048u32).to_be_bytes());
    buf.extend_from_slice(b"{");
    let err = decode_frame(&mut buf, 1024).unwrap_err();
    assert!(matches!(err, CodecError::FrameTooLarge { len: 2048, max: 1024 }));
}

#[test]
fn test_invalid_utf8_body_is_bad_format() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&(2u32).to_be_bytes());
    buf.extend_from_slice(&[0xff, 0xfe]);
    let err = decode_frame(&mut buf, 1024).unwrap_err();
    assert!(matches!(err, CodecError::BadFormat { .. }));
    assert!(matches!(PokerError::from(err), PokerError::Framing { .. }));
}
