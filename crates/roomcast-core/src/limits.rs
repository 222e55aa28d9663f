//! Input validation for names and message content.

use crate::error::ChatError;

/// Shortest accepted display name, in characters.
pub const DEFAULT_MIN_NAME_LEN: usize = 2;

/// Longest accepted display name, in characters.
pub const DEFAULT_MAX_NAME_LEN: usize = 32;

/// Shortest accepted room name, in characters.
pub const DEFAULT_MIN_ROOM_LEN: usize = 2;

/// Longest accepted room name, in characters.
pub const DEFAULT_MAX_ROOM_LEN: usize = 32;

/// Largest chat message, in bytes of raw content.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4096;

/// Size limits applied to client input.
///
/// Names are trimmed before they are measured and the trimmed form is what
/// gets stored. Lengths count `char`s, not bytes, so non-Latin names are not
/// penalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Minimum display name length
    pub min_name_len: usize,
    /// Maximum display name length
    pub max_name_len: usize,
    /// Minimum room name length
    pub min_room_len: usize,
    /// Maximum room name length
    pub max_room_len: usize,
    /// Maximum chat content size in bytes
    pub max_message_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_name_len: DEFAULT_MIN_NAME_LEN,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            min_room_len: DEFAULT_MIN_ROOM_LEN,
            max_room_len: DEFAULT_MAX_ROOM_LEN,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl Limits {
    /// Validate a requested display name, returning the trimmed form.
    pub fn display_name<'a>(&self, requested: &'a str) -> Result<&'a str, ChatError> {
        let name = requested.trim();
        if within(name, self.min_name_len, self.max_name_len) {
            Ok(name)
        } else {
            Err(ChatError::NameInvalid { min: self.min_name_len, max: self.max_name_len })
        }
    }

    /// Validate a requested room name, returning the trimmed form.
    pub fn room_name<'a>(&self, requested: &'a str) -> Result<&'a str, ChatError> {
        let room = requested.trim();
        if within(room, self.min_room_len, self.max_room_len) {
            Ok(room)
        } else {
            Err(ChatError::RoomNameInvalid { min: self.min_room_len, max: self.max_room_len })
        }
    }

    /// Validate chat content.
    ///
    /// Content is relayed as sent; trimming only decides whether it is blank.
    pub fn message(&self, content: &str) -> Result<(), ChatError> {
        if content.len() > self.max_message_bytes {
            return Err(ChatError::MessageTooLarge {
                size: content.len(),
                max: self.max_message_bytes,
            });
        }

        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        Ok(())
    }
}

fn within(value: &str, min: usize, max: usize) -> bool {
    let len = value.chars().count();
    len >= min && len <= max
}
