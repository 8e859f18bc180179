//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use tabsync_core::{InstanceId, MessageType, StateMap, SyncId, WireMessage};

/// Generate a random InstanceId.
pub fn instance_id() -> impl Strategy<Value = InstanceId> {
    any::<[u8; 16]>().prop_map(InstanceId::from_bytes)
}

/// Generate a random SyncId.
pub fn sync_id() -> impl Strategy<Value = SyncId> {
    any::<[u8; 16]>().prop_map(SyncId::from_bytes)
}

/// Generate a top-level state key from a small alphabet, so independently
/// generated patches overlap.
pub fn state_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("todos".to_string()),
        Just("filter".to_string()),
        Just("user".to_string()),
        "[a-z]{1,6}".prop_map(String::from),
    ]
}

/// Generate a JSON scalar.
pub fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
    ]
}

/// Generate a JSON value nested up to a few levels.
pub fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Generate a state map (or patch) with up to `max_keys` keys.
pub fn state_map(max_keys: usize) -> impl Strategy<Value = StateMap> {
    prop::collection::btree_map(state_key(), json_value(), 0..=max_keys).prop_map(StateMap::from)
}

/// Generate a MessageType.
pub fn message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::Request),
        Just(MessageType::Response),
        Just(MessageType::Update),
        Just(MessageType::SyncStart),
        Just(MessageType::SyncEnd),
    ]
}

/// Generate a well-formed message of any type.
pub fn wire_message() -> impl Strategy<Value = WireMessage> {
    (
        message_type(),
        instance_id(),
        sync_id(),
        state_map(4),
        0i64..=1_700_000_000_000i64,
    )
        .prop_map(|(kind, source, id, state, ts)| {
            let state = serde_json::to_value(state).unwrap_or(Value::Null);
            let message = match kind {
                MessageType::Request => WireMessage::request(source, id),
                MessageType::Response => WireMessage::response(source, id, state),
                MessageType::Update => WireMessage::update(source, state),
                MessageType::SyncStart => WireMessage::sync_start(source, id),
                MessageType::SyncEnd => WireMessage::sync_end(source, id),
            };
            message.with_timestamp(ts)
        })
}

/// Generate a message with its required fields possibly stripped.
pub fn any_wire_message() -> impl Strategy<Value = WireMessage> {
    (wire_message(), any::<bool>(), any::<bool>()).prop_map(|(mut message, drop_id, drop_state)| {
        if drop_id {
            message.id = None;
        }
        if drop_state {
            message.state = None;
        }
        message
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_generated_messages_validate(message in wire_message()) {
            prop_assert!(message.validate().is_ok());
        }

        #[test]
        fn test_validation_matches_required_fields(message in any_wire_message()) {
            let needs_id = message.kind != MessageType::Update;
            let needs_state = matches!(message.kind, MessageType::Response | MessageType::Update);
            let complete = (!needs_id || message.id.is_some())
                && (!needs_state || message.state.is_some());
            prop_assert_eq!(message.validate().is_ok(), complete);
        }

        #[test]
        fn test_merge_then_diff_names_only_patched_keys(
            base in state_map(6),
            patch in state_map(4),
        ) {
            let mut merged = base.clone();
            merged.merge(patch.clone());
            for key in base.changed_keys(&merged) {
                prop_assert!(patch.contains_key(&key));
            }
        }
    }
}
