use std::sync::Arc;

use anyhow::Context;
use teloxide::Bot;

use cbot_core::{
    config::Config,
    dispatch::DispatcherBuilder,
    domain::BotIdentity,
    messaging::{throttled::ThrottledMessenger, MessagingService},
    session::{InMemoryStore, JsonFileStore, SessionStore},
};
use cbot_telegram::{TelegramFrontend, TelegramMessenger};

mod processor;

use processor::BuiltinProcessor;

fn main() -> anyhow::Result<()> {
    cbot_core::logging::init("cbot")?;

    let cfg = Config::load().context("failed to load configuration")?;

    let store: Arc<dyn SessionStore> = match &cfg.session_store_path {
        Some(path) => {
            let store = JsonFileStore::open(path)
                .with_context(|| format!("failed to open session store {}", path.display()))?;
            tracing::info!(path = %store.path().display(), "using file session store");
            Arc::new(store)
        }
        None => {
            tracing::info!("using in-memory session store");
            Arc::new(InMemoryStore::new())
        }
    };

    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Throttle outbound calls across the whole pool; the adapter still retries
    // once on a 429 RetryAfter.
    let raw_messenger: Arc<dyn MessagingService> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingService> =
        Arc::new(ThrottledMessenger::new(raw_messenger, cfg.throttle));

    let processor = BuiltinProcessor::new().context("failed to build command parser")?;

    let dispatcher = DispatcherBuilder::new(
        Arc::new(TelegramFrontend::new(bot)),
        store,
        messenger,
        Arc::new(processor),
    )
    .identity(BotIdentity {
        commands: BuiltinProcessor::commands(),
        ..BotIdentity::default()
    })
    .configure(&cfg)
    .build();

    tracing::info!(
        workers = dispatcher.worker_count(),
        serialize_chats = cfg.serialize_chats,
        "starting cbot"
    );

    dispatcher.listen().context("bot stopped with an error")?;
    Ok(())
}
