use tracing::warn;

use crate::emoji::Emoji;

/// Discord rejects message contents above this many characters.
pub const MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("The message or channel could not be found.")]
    NotFound,
    #[error("The bot is missing access to that message or channel.")]
    Forbidden,
    #[error("Chat request failed: {0}")]
    Other(String),
}

impl GatewayError {
    /// Deleted or hidden messages: skip instead of failing the operation.
    pub fn is_soft(&self) -> bool {
        matches!(self, GatewayError::NotFound | GatewayError::Forbidden)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatUser {
    pub id: u64,
    pub name: String,
    pub bot: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReactionCount {
    pub emoji: Emoji,
    pub count: u64,
    pub me: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: u64,
    pub content: String,
    pub reactions: Vec<ReactionCount>,
}

impl ChatMessage {
    pub fn has_reaction(&self, emoji: &Emoji) -> bool {
        self.reactions.iter().any(|r| &r.emoji == emoji)
    }
}

/// The chat platform as seen by the tournament core.
pub trait ChatGateway: Send + Sync {
    fn current_user_id(&self) -> u64;

    /// Returns the id of the new message.
    fn send_message(&self, channel_id: u64, content: &str) -> Result<u64, GatewayError>;

    fn edit_message(&self, channel_id: u64, message_id: u64, content: &str) -> Result<(), GatewayError>;

    fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<ChatMessage, GatewayError>;

    fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), GatewayError>;

    fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &Emoji) -> Result<(), GatewayError>;

    fn remove_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        user_id: u64,
        emoji: &Emoji,
    ) -> Result<(), GatewayError>;

    /// Everyone who reacted with `emoji`, across all pages.
    fn reaction_users(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &Emoji,
    ) -> Result<Vec<ChatUser>, GatewayError>;

    /// Uploads a guild emoji; quota and permission failures come back as errors.
    fn create_emoji(&self, guild_id: u64, name: &str, image: &[u8]) -> Result<Emoji, GatewayError>;

    fn can_manage_messages(&self, guild_id: u64, user_id: u64) -> Result<bool, GatewayError>;
}

/// Edits a message, treating a deleted or inaccessible message as nothing to do.
pub fn edit_or_skip(
    chat: &dyn ChatGateway,
    channel_id: u64,
    message_id: u64,
    content: &str,
) -> Result<(), GatewayError> {
    match chat.edit_message(channel_id, message_id, content) {
        Err(err) if err.is_soft() => {
            warn!(channel_id, message_id, "skipping edit of unavailable message: {}", err);
            Ok(())
        }
        other => other,
    }
}

/// Splits lines into messages that stay under the platform limit.
pub fn paginate<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut pages = Vec::new();
    let mut current = String::new();
    for line in lines {
        let line = line.as_ref();
        if !current.is_empty() && current.len() + line.len() + 1 > MESSAGE_LIMIT {
            pages.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}
