//! Property-based tests for framing and signatures

use std::collections::BTreeMap;

use bytes::BytesMut;
use proptest::prelude::*;

use mental_poker::protocol::codec::DEFAULT_MAX_FRAME_BYTES;
use mental_poker::protocol::{decode_frame, encode_frame};
use mental_poker::{Envelope, Message, ParticipantId, Payload, SigningKey};

fn arb_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        Just(Payload::VerifyCardOk),
        Just(Payload::AskSymKeys),
        prop::collection::vec(0u32..50, 0..6).prop_map(|ids| Payload::VerifyCardNok {
            invalid_ids: ids.into_iter().map(ParticipantId::new).collect(),
        }),
        prop::collection::btree_map(1u32..10, prop::collection::vec(0u64..100, 0..8), 0..4).prop_map(|cards| {
            Payload::VerifyCards {
                playing_cards: cards.into_iter().map(|(id, card)| (ParticipantId::new(id), card)).collect(),
            }
        }),
        prop::collection::vec(1u32..10, 0..4).prop_map(|ids| Payload::Winner {
            winners: ids.into_iter().map(ParticipantId::new).collect(),
        }),
    ]
}

fn arb_message() -> impl Strategy<Value = Message> {
    (prop::option::of(0u32..20), arb_payload()).prop_map(|(sender, payload)| Message {
        sender: sender.map(ParticipantId::new),
        payload,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_frames_survive_arbitrary_chunking(
        messages in prop::collection::vec(arb_message(), 1..5),
        chunk in 1usize..64,
    ) {
        let key = SigningKey::generate();
        let envelopes: Vec<Envelope> = messages
            .into_iter()
            .map(|message| Envelope::signed(message, &key).unwrap())
            .collect();
        let stream: Vec<u8> = envelopes
            .iter()
            .flat_map(|envelope| encode_frame(envelope).unwrap())
            .collect();

        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in stream.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(envelope) = decode_frame(&mut buf, DEFAULT_MAX_FRAME_BYTES).unwrap() {
                decoded.push(envelope);
            }
        }

        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded, envelopes);
    }

    #[test]
    fn prop_flipped_signature_byte_fails(message in arb_message(), index in 0usize..64, bit in 0u8..8) {
        let key = SigningKey::generate();
        let mut envelope = Envelope::signed(message, &key).unwrap();
        prop_assert!(envelope.verify_with(&key.public_key()));

        let signature = envelope.signature.as_mut().unwrap();
        let index = index % signature.len();
        signature[index] ^= 1 << bit;
        prop_assert!(!envelope.verify_with(&key.public_key()));
    }

    #[test]
    fn prop_truncated_signature_fails(message in arb_message(), keep in 0usize..64) {
        let key = SigningKey::generate();
        let mut envelope = Envelope::signed(message, &key).unwrap();

        envelope.signature.as_mut().unwrap().truncate(keep);
        prop_assert!(!envelope.verify_with(&key.public_key()));
    }

    #[test]
    fn prop_altered_field_fails(ids in prop::collection::vec(1u32..50, 1..6), extra in 50u32..100) {
        let key = SigningKey::generate();
        let payload = Payload::VerifyCardNok {
            invalid_ids: ids.iter().copied().map(ParticipantId::new).collect(),
        };
        let mut envelope = Envelope::signed(Message::from_participant(ParticipantId::new(1), payload), &key).unwrap();

        if let Payload::VerifyCardNok { invalid_ids } = &mut envelope.message.payload {
            invalid_ids.push(ParticipantId::new(extra));
        }
        prop_assert!(!envelope.verify_with(&key.public_key()));
    }

    #[test]
    fn prop_foreign_key_fails(message in arb_message()) {
        let key = SigningKey::generate();
        let other = SigningKey::generate();
        let envelope = Envelope::signed(message, &key).unwrap();
        prop_assert!(!envelope.verify_with(&other.public_key()));
    }

    #[test]
    fn prop_canonical_bytes_are_stable_under_reparse(cards in prop::collection::btree_map(1u32..30, 0u64..100, 0..8)) {
        let playing_cards: BTreeMap<ParticipantId, Vec<u64>> =
            cards.into_iter().map(|(id, value)| (ParticipantId::new(id), vec![value])).collect();
        let message = Message::from_area(Payload::SignFinalDeckAck { playing_cards });
        let bytes = message.canonical_bytes().unwrap();
        let reparsed: Message = serde_json::from_slice(&bytes).unwrap();
        prop_assert_eq!(reparsed.canonical_bytes().unwrap(), bytes);
    }
}
