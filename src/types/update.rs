//! Feed updates and the update-type filter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::UpdateId;

/// Update types requested from the feed.
///
/// This is the feed's default set plus `message_reaction`, which the feed
/// only delivers when asked for explicitly.
pub const ALLOWED_UPDATES: &[&str] = &[
    "message",
    "edited_message",
    "channel_post",
    "edited_channel_post",
    "business_connection",
    "business_message",
    "edited_business_message",
    "deleted_business_messages",
    "inline_query",
    "chosen_inline_result",
    "callback_query",
    "shipping_query",
    "pre_checkout_query",
    "purchased_paid_media",
    "poll",
    "poll_answer",
    "my_chat_member",
    "chat_join_request",
    "chat_boost",
    "removed_chat_boost",
    "message_reaction",
];

/// Returns [`ALLOWED_UPDATES`] as owned strings, ready for a request body.
pub fn default_allowed_updates() -> Vec<String> {
    ALLOWED_UPDATES.iter().map(|s| s.to_string()).collect()
}

/// A single update delivered by the feed.
///
/// Only the id is interpreted here. The rest of the object is kept verbatim
/// for the update handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: UpdateId,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Update {
    /// Creates an update with an empty payload.
    pub fn new(update_id: impl Into<UpdateId>) -> Self {
        Update {
            update_id: update_id.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field. Useful for building fixtures.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// The update's type, i.e. the name of its first payload field
    /// (`"message"`, `"callback_query"`, ...).
    pub fn kind(&self) -> Option<&str> {
        self.payload.keys().next().map(String::as_str)
    }
}
