use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::models::{descriptor::SubjectId, window::Timestamp};

bitflags! {
    /// How a message relates to the account that retrieved it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MessageFlags: u8 {
        /// Retrieved as part of the account's home timeline.
        const SUBSCRIBED = 1;
        const MENTIONED = 1 << 1;
        const FAVORITED = 1 << 2;
        const DIRECTED = 1 << 3;
        /// Reblogged by the linked account.
        const REBLOGGED = 1 << 4;
    }
}

/// One row of the message store, as returned by a timeline query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub msg_id: u64,
    pub sent_date: Timestamp,
    /// Original author. For a reblog, the author of the reblogged message.
    pub author_id: SubjectId,
    pub sender_id: SubjectId,
    /// The account's own user this row was retrieved for, `0` if none.
    pub linked_user_id: SubjectId,
    pub flags: MessageFlags,
    pub body: String,
}

impl MessageRow {
    pub fn new(msg_id: u64, sent_date: Timestamp, author_id: SubjectId) -> Self {
        Self {
            msg_id,
            sent_date,
            author_id,
            sender_id: author_id,
            linked_user_id: 0,
            flags: MessageFlags::empty(),
            body: String::new(),
        }
    }

    pub fn with_sender(mut self, sender_id: SubjectId) -> Self {
        self.sender_id = sender_id;
        self
    }

    pub fn linked_to(mut self, user_id: SubjectId, flags: MessageFlags) -> Self {
        self.linked_user_id = user_id;
        self.flags = flags;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_reblog(&self) -> bool {
        self.sender_id != self.author_id
    }
}
