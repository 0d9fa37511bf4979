//! Transport abstraction (Telegram today; other messengers behind the same port).

pub mod port;
pub mod throttled;
pub mod types;

pub use port::MessagingService;
