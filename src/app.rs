use std::sync::Arc;

use tracing::{debug, warn};

use crate::commands::{self, Invocation, Reply};
use crate::config::Settings;
use crate::dialogs::Dialogs;
use crate::emoji::Emoji;
use crate::gateway::ChatGateway;
use crate::leaguepedia::ScheduleSource;
use crate::reconcile::Reconciler;
use crate::store::Store;
use crate::tournaments::TournamentManager;

/// Everything an incoming chat event needs.
pub struct App {
    pub manager: Arc<TournamentManager>,
    pub reconciler: Arc<Reconciler>,
    pub dialogs: Dialogs,
}

impl App {
    pub fn new(
        store: Arc<dyn Store>,
        chat: Arc<dyn ChatGateway>,
        schedule: Arc<dyn ScheduleSource>,
        settings: Settings,
    ) -> App {
        let manager = Arc::new(TournamentManager::new(store, chat, schedule.clone(), settings));
        App::from_parts(manager, schedule)
    }

    pub fn from_parts(manager: Arc<TournamentManager>, schedule: Arc<dyn ScheduleSource>) -> App {
        let dialogs = Dialogs::new(manager.settings().dialog_ttl);
        App {
            reconciler: Arc::new(Reconciler::new(manager.clone(), schedule)),
            manager,
            dialogs,
        }
    }

    /// Parses and runs a message. `None` when it is not a command.
    pub fn handle_message(&self, inv: &Invocation, content: &str) -> Option<Reply> {
        let parsed = commands::parse(&self.manager.settings().command_prefix, content)?;
        Some(match parsed {
            Ok(command) => commands::execute(self, inv, command),
            Err(err) => Reply {
                messages: vec![commands::error_text(&err)],
                delete_invocation: false,
            },
        })
    }

    /// Dialog confirmations first, then predictions on match messages.
    pub fn handle_reaction(&self, guild_id: Option<u64>, channel_id: u64, message_id: u64, user_id: u64, emoji: &Emoji) {
        if let Some(guild_id) = guild_id {
            match self.dialogs.confirm(&self.manager, guild_id, message_id, user_id, emoji) {
                Ok(Some(m)) => {
                    debug!(match_id = %m.id, "dialog confirmed");
                    return;
                }
                Ok(None) => {}
                Err(err) => {
                    if !err.is_validation() {
                        warn!(message_id, "could not end match from dialog: {}", err);
                    }
                    if let Err(send_err) = self.manager.chat().send_message(channel_id, &commands::error_text(&err)) {
                        warn!(channel_id, "could not report dialog error: {}", send_err);
                    }
                    return;
                }
            }
        }

        if let Err(err) = self.manager.on_match_reaction(channel_id, message_id, user_id, emoji) {
            warn!(message_id, "could not handle reaction: {}", err);
        }
    }
}
