pub mod http;
pub mod log;
pub mod telegram;
pub mod util;

use std::sync::Arc;

use strategist_core::config::{expand_home, ChannelsConfig};
use strategist_core::traits::Notifier;

pub use http::ReqwestFetcher;
pub use log::LogNotifier;
pub use telegram::TelegramNotifier;

/// Telegram when a bot token is configured, otherwise the log file.
pub fn create_notifier(config: &ChannelsConfig) -> Arc<dyn Notifier> {
    match &config.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(telegram)),
        None => {
            let log = config.log.clone().unwrap_or_default();
            Arc::new(LogNotifier::new(expand_home(&log.path)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strategist_core::config::{LogChannelConfig, TelegramConfig};

    #[test]
    fn test_falls_back_to_log() {
        let notifier = create_notifier(&ChannelsConfig::default());
        assert_eq!(notifier.name(), "log");
    }

    #[test]
    fn test_prefers_telegram() {
        let config = ChannelsConfig {
            telegram: Some(TelegramConfig {
                bot_token: "123:TEST".into(),
                default_chat_id: Some("1".into()),
            }),
            log: Some(LogChannelConfig::default()),
        };
        assert_eq!(create_notifier(&config).name(), "telegram");
    }
}
