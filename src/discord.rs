//! Discord through serenity: the `ChatGateway` implementation and the event handler.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use serenity::http::{Http, HttpError};
use serenity::model::channel::{Message, Reaction, ReactionType};
use serenity::model::gateway::Ready;
use serenity::model::id::EmojiId;
use serenity::model::permissions::Permissions;
use serenity::prelude::*;
use serenity::Error as SerenityError;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::commands::Invocation;
use crate::emoji::Emoji;
use crate::gateway::{ChatGateway, ChatMessage, ChatUser, GatewayError, ReactionCount};

const REACTION_PAGE: u8 = 100;

fn gateway_error(err: SerenityError) -> GatewayError {
    if let SerenityError::Http(ref http_err) = err {
        if let HttpError::UnsuccessfulRequest(ref response) = **http_err {
            match response.status_code.as_u16() {
                404 => return GatewayError::NotFound,
                403 => return GatewayError::Forbidden,
                _ => {}
            }
        }
    }
    GatewayError::Other(err.to_string())
}

pub fn reaction_type(emoji: &Emoji) -> ReactionType {
    match emoji {
        Emoji::Custom { id, name, animated } => ReactionType::Custom {
            animated: *animated,
            id: EmojiId(*id),
            name: Some(name.clone()),
        },
        Emoji::Unicode(symbol) => ReactionType::Unicode(symbol.clone()),
    }
}

pub fn emoji_of(reaction: &ReactionType) -> Option<Emoji> {
    match reaction {
        ReactionType::Custom { animated, id, name } => Some(Emoji::Custom {
            id: id.0,
            name: name.clone().unwrap_or_default(),
            animated: *animated,
        }),
        ReactionType::Unicode(symbol) => Some(Emoji::Unicode(symbol.clone())),
        _ => None,
    }
}

pub struct DiscordGateway {
    http: Arc<Http>,
    bot_id: u64,
}

impl DiscordGateway {
    /// Looks up the bot's own user so its reactions can be told apart.
    pub fn connect(http: Arc<Http>) -> Result<DiscordGateway, GatewayError> {
        let me = http.get_current_user().map_err(gateway_error)?;
        info!(bot = %me.name, "connected to Discord");
        Ok(DiscordGateway { http, bot_id: me.id.0 })
    }
}

impl ChatGateway for DiscordGateway {
    fn current_user_id(&self) -> u64 {
        self.bot_id
    }

    fn send_message(&self, channel_id: u64, content: &str) -> Result<u64, GatewayError> {
        let message = self
            .http
            .send_message(channel_id, &json!({ "content": content }))
            .map_err(gateway_error)?;
        Ok(message.id.0)
    }

    fn edit_message(&self, channel_id: u64, message_id: u64, content: &str) -> Result<(), GatewayError> {
        self.http
            .edit_message(channel_id, message_id, &json!({ "content": content }))
            .map(|_| ())
            .map_err(gateway_error)
    }

    fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<ChatMessage, GatewayError> {
        let message = self.http.get_message(channel_id, message_id).map_err(gateway_error)?;
        let reactions = message
            .reactions
            .iter()
            .filter_map(|r| {
                emoji_of(&r.reaction_type).map(|emoji| ReactionCount {
                    emoji,
                    count: r.count,
                    me: r.me,
                })
            })
            .collect();
        Ok(ChatMessage {
            id: message.id.0,
            channel_id: message.channel_id.0,
            content: message.content,
            reactions,
        })
    }

    fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), GatewayError> {
        self.http.delete_message(channel_id, message_id).map_err(gateway_error)
    }

    fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &Emoji) -> Result<(), GatewayError> {
        self.http
            .create_reaction(channel_id, message_id, &reaction_type(emoji))
            .map_err(gateway_error)
    }

    fn remove_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        user_id: u64,
        emoji: &Emoji,
    ) -> Result<(), GatewayError> {
        self.http
            .delete_reaction(channel_id, message_id, Some(user_id), &reaction_type(emoji))
            .map_err(gateway_error)
    }

    fn reaction_users(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &Emoji,
    ) -> Result<Vec<ChatUser>, GatewayError> {
        let reaction = reaction_type(emoji);
        let mut users = Vec::new();
        let mut after = None;
        loop {
            let page = self
                .http
                .get_reaction_users(channel_id, message_id, &reaction, REACTION_PAGE, after)
                .map_err(gateway_error)?;
            let full = page.len() == REACTION_PAGE as usize;
            after = page.last().map(|u| u.id.0);
            users.extend(page.into_iter().map(|u| ChatUser {
                id: u.id.0,
                name: u.name,
                bot: u.bot,
            }));
            if !full {
                break;
            }
        }
        Ok(users)
    }

    fn create_emoji(&self, guild_id: u64, name: &str, image: &[u8]) -> Result<Emoji, GatewayError> {
        let body = json!({
            "name": name,
            "image": format!("data:image/png;base64,{}", STANDARD.encode(image)),
        });
        let emoji = self.http.create_emoji(guild_id, &body).map_err(gateway_error)?;
        Ok(Emoji::Custom {
            id: emoji.id.0,
            name: emoji.name,
            animated: emoji.animated,
        })
    }

    fn can_manage_messages(&self, guild_id: u64, user_id: u64) -> Result<bool, GatewayError> {
        let guild = self.http.get_guild(guild_id).map_err(gateway_error)?;
        if guild.owner_id.0 == user_id {
            return Ok(true);
        }
        let member = self.http.get_member(guild_id, user_id).map_err(gateway_error)?;
        // the @everyone role shares the guild's id
        let permissions = guild
            .roles
            .values()
            .filter(|role| role.id.0 == guild_id || member.roles.contains(&role.id))
            .fold(Permissions::empty(), |acc, role| acc | role.permissions);
        Ok(permissions.contains(Permissions::ADMINISTRATOR) || permissions.contains(Permissions::MANAGE_MESSAGES))
    }
}

pub struct AppKey;

impl TypeMapKey for AppKey {
    type Value = Arc<App>;
}

pub struct Handler;

fn app_of(context: &Context) -> Option<Arc<App>> {
    let data = context.data.read();
    data.get::<AppKey>().cloned()
}

impl EventHandler for Handler {
    fn message(&self, context: Context, message: Message) {
        if message.author.bot {
            return;
        }
        let guild_id = match message.guild_id {
            Some(guild_id) => guild_id.0,
            None => return,
        };
        let app = match app_of(&context) {
            Some(app) => app,
            None => return,
        };
        if !message
            .content
            .trim_start()
            .starts_with(app.manager.settings().command_prefix.as_str())
        {
            return;
        }

        let chat = app.manager.chat();
        let author_id = message.author.id.0;
        let can_manage = chat.can_manage_messages(guild_id, author_id).unwrap_or_else(|err| {
            warn!(guild_id, author_id, "could not read permissions: {}", err);
            false
        });
        let inv = Invocation {
            guild_id,
            channel_id: message.channel_id.0,
            author_id,
            can_manage,
        };
        let reply = match app.handle_message(&inv, &message.content) {
            Some(reply) => reply,
            None => return,
        };
        for text in &reply.messages {
            if let Err(err) = chat.send_message(inv.channel_id, text) {
                warn!(channel_id = inv.channel_id, "could not reply: {}", err);
            }
        }
        if reply.delete_invocation {
            if let Err(err) = chat.delete_message(inv.channel_id, message.id.0) {
                debug!("could not delete command message: {}", err);
            }
        }
    }

    fn reaction_add(&self, context: Context, reaction: Reaction) {
        let emoji = match emoji_of(&reaction.emoji) {
            Some(emoji) => emoji,
            None => return,
        };
        if let Some(app) = app_of(&context) {
            app.handle_reaction(
                reaction.guild_id.map(|g| g.0),
                reaction.channel_id.0,
                reaction.message_id.0,
                reaction.user_id.0,
                &emoji,
            );
        }
    }

    fn ready(&self, _context: Context, ready: Ready) {
        info!("{} is ready", ready.user.name);
    }
}
