//! Rendered notification messages.

use serde::{Deserialize, Serialize};

/// A link button attached under a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionButton {
    pub text: String,
    pub url: String,
}

/// A message ready for delivery to any recipient.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,

    /// Button rows; empty when no actions are attached
    #[serde(default)]
    pub actions: Vec<Vec<ActionButton>>,
}

impl OutgoingMessage {
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }
}
