use std::sync::OnceLock;

use async_trait::async_trait;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use cbot_core::{dispatch::UpdateQueue, domain::BotIdentity, ports::Frontend, Result};

use crate::{convert, with_retry};

/// Name stamped on every converted update.
#[derive(Clone, Debug)]
struct BotName(Option<String>);

/// Long-polling frontend: registers commands at startup, then feeds every
/// incoming message into the update queue until Ctrl-C.
pub struct TelegramFrontend {
    bot: Bot,
    bot_name: OnceLock<String>,
}

impl TelegramFrontend {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            bot_name: OnceLock::new(),
        }
    }

    /// The first name wins; a repeated `initialize` keeps stamping updates with it.
    fn remember_bot_name(&self, name: String) {
        if let Err(ignored) = self.bot_name.set(name) {
            tracing::debug!(
                kept = self.bot_name.get().map(String::as_str),
                ignored = %ignored,
                "frontend already initialized; keeping bot name"
            );
        }
    }
}

#[async_trait]
impl Frontend for TelegramFrontend {
    async fn initialize(&self, identity: &BotIdentity) -> Result<()> {
        let me = with_retry(|| self.bot.get_me()).await?;
        tracing::info!(username = me.username(), "connected to telegram");

        let name = identity
            .bot_id
            .clone()
            .unwrap_or_else(|| me.username().to_string());
        self.remember_bot_name(name);

        if !identity.commands.is_empty() {
            let commands: Vec<teloxide::types::BotCommand> = identity
                .commands
                .iter()
                .map(|c| teloxide::types::BotCommand::new(c.command.clone(), c.description.clone()))
                .collect();
            with_retry(|| self.bot.set_my_commands(commands.clone())).await?;
            tracing::info!(count = commands.len(), "registered bot commands");
        }
        Ok(())
    }

    async fn serve(&self, queue: UpdateQueue) -> Result<()> {
        let name = BotName(self.bot_name.get().cloned());
        let handler = Update::filter_message().endpoint(enqueue_message);

        tracing::info!("polling for updates");
        Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![queue, name])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
        Ok(())
    }
}

async fn enqueue_message(msg: Message, queue: UpdateQueue, name: BotName) -> ResponseResult<()> {
    let Some(update) = convert::to_core(&msg, name.0.as_deref()) else {
        tracing::debug!(chat_id = msg.chat.id.0, "ignoring message without sender");
        return Ok(());
    };
    if let Err(e) = queue.enqueue(update) {
        tracing::warn!(chat_id = msg.chat.id.0, "dropping update: {e}");
    }
    Ok(())
}
