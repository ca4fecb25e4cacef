//! Property-based tests for the wire codec and delivery-status ordering.
//!
//! Uses proptest to verify:
//! 1. Any valid `ClientEvent` survives encode -> decode round-trip.
//! 2. Any valid `ServerEvent` survives encode -> decode round-trip.
//! 3. Random bytes never cause a panic in decode (returns `Err` gracefully).
//! 4. `DeliveryStatus::advances_to` is a strict forward order.

use proptest::prelude::*;

use directchat_proto::event::{
    ClientEvent, ServerEvent, decode_client, decode_server, encode_client, encode_server,
};
use directchat_proto::ident::{ConversationId, MessageId, Timestamp, UserId};
use directchat_proto::message::{DeliveryStatus, DirectMessage};
use uuid::Uuid;

// --- Strategies for protocol types ---

fn arb_user_id() -> impl Strategy<Value = UserId> {
    "[a-z0-9-]{1,24}".prop_map(UserId::new)
}

fn arb_message_id() -> impl Strategy<Value = MessageId> {
    any::<u128>().prop_map(|n| MessageId::from_uuid(Uuid::from_u128(n)))
}

fn arb_conversation_id() -> impl Strategy<Value = ConversationId> {
    any::<u128>().prop_map(|n| ConversationId::from_uuid(Uuid::from_u128(n)))
}

fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp::from_millis)
}

fn arb_status() -> impl Strategy<Value = DeliveryStatus> {
    prop_oneof![
        Just(DeliveryStatus::Sent),
        Just(DeliveryStatus::Delivered),
        Just(DeliveryStatus::Read),
    ]
}

fn arb_direct_message() -> impl Strategy<Value = DirectMessage> {
    (
        arb_message_id(),
        arb_conversation_id(),
        arb_user_id(),
        "[^\x00]{0,64}",
        "[^\x00]{1,1024}",
        arb_timestamp(),
        arb_status(),
    )
        .prop_map(
            |(id, conversation_id, sender, sender_name, text, timestamp, status)| DirectMessage {
                id,
                conversation_id,
                sender,
                sender_name,
                text,
                timestamp,
                status,
            },
        )
}

fn arb_client_event() -> impl Strategy<Value = ClientEvent> {
    prop_oneof![
        (arb_user_id(), "[^\x00]{0,64}").prop_map(|(user_id, token)| ClientEvent::Announce {
            user_id,
            token
        }),
        (arb_user_id(), "[^\x00]{1,1024}")
            .prop_map(|(receiver, text)| ClientEvent::MessageSend { receiver, text }),
        arb_user_id().prop_map(|receiver| ClientEvent::TypingStart { receiver }),
        arb_user_id().prop_map(|receiver| ClientEvent::TypingStop { receiver }),
        arb_message_id().prop_map(|message_id| ClientEvent::MessageReadAck { message_id }),
    ]
}

fn arb_server_event() -> impl Strategy<Value = ServerEvent> {
    prop_oneof![
        arb_user_id().prop_map(|user_id| ServerEvent::AnnounceOk { user_id }),
        (arb_user_id(), any::<bool>(), prop::option::of(arb_timestamp())).prop_map(
            |(user_id, online, last_seen_at)| ServerEvent::PresenceChanged {
                user_id,
                online,
                last_seen_at,
            }
        ),
        (arb_user_id(), "[^\x00]{0,64}").prop_map(|(sender, sender_name)| {
            ServerEvent::TypingStart {
                sender,
                sender_name,
            }
        }),
        arb_user_id().prop_map(|sender| ServerEvent::TypingStop { sender }),
        arb_direct_message().prop_map(|message| ServerEvent::MessageNew { message }),
        (arb_message_id(), arb_status()).prop_map(|(message_id, status)| {
            ServerEvent::MessageStatusUpdate { message_id, status }
        }),
        "[^\x00]{0,128}".prop_map(|reason| ServerEvent::MessageError { reason }),
    ]
}

// --- Properties ---

proptest! {
    #[test]
    fn client_event_round_trips(event in arb_client_event()) {
        let bytes = encode_client(&event).unwrap();
        let decoded = decode_client(&bytes).unwrap();
        prop_assert_eq!(event, decoded);
    }

    #[test]
    fn server_event_round_trips(event in arb_server_event()) {
        let bytes = encode_server(&event).unwrap();
        let decoded = decode_server(&bytes).unwrap();
        prop_assert_eq!(event, decoded);
    }

    #[test]
    fn random_bytes_never_panic_decode(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        // Either outcome is fine; the property is "no panic".
        let _ = decode_client(&bytes);
        let _ = decode_server(&bytes);
    }

    #[test]
    fn status_advance_is_strictly_forward(a in arb_status(), b in arb_status()) {
        // advances_to is exactly the strict order sent < delivered < read.
        prop_assert_eq!(a.advances_to(b), a < b);
        // Never both directions, never reflexive.
        prop_assert!(!(a.advances_to(b) && b.advances_to(a)));
        prop_assert!(!a.advances_to(a));
    }
}
