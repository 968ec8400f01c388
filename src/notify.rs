//! Operator notifications
//!
//! Delivery failures are logged and never propagate into the engine.

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{error, info};

use crate::config::NotifyConfig;
use crate::engine::EngineEvent;

/// Operator-facing text for an engine event
pub fn event_message(event: &EngineEvent) -> String {
    let icon = match event {
        EngineEvent::GridOpened { .. } => "🟢",
        EngineEvent::GridClosed { .. } => "🔴",
        EngineEvent::Filled(_) => "💰",
        EngineEvent::Risk(_) => "⚠️",
    };
    format!("{} {}", icon, event)
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, text: &str) {
        info!(target: "notify", "{}", text);
    }
}

pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn notify(&self, text: &str) {
        info!(target: "notify", "{}", text);
        if let Err(e) = self.bot.send_message(self.chat_id, text).await {
            error!("Failed to send Telegram message: {}", e);
        }
    }
}

/// Telegram when both token and chat id are configured, log otherwise
pub fn create_notifier(config: &NotifyConfig) -> Box<dyn NotificationSink> {
    match (&config.telegram_token, config.telegram_chat_id) {
        (Some(token), Some(chat_id)) if !token.is_empty() => {
            info!("Telegram notifications enabled for chat {}", chat_id);
            Box::new(TelegramNotifier::new(token, chat_id))
        }
        _ => {
            info!("Telegram not configured, notifications go to the log");
            Box::new(LogNotifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskEvent;
    use crate::Symbol;

    #[test]
    fn test_event_message_decorates_event_text() {
        let closed = EngineEvent::GridClosed {
            pair: Symbol::new("BTCUSDT"),
            reason: crate::engine::CloseReason::OutOfBand,
            realized_pnl: 0.5,
            abandoned_open_orders: 2,
        };
        let text = event_message(&closed);
        assert!(text.starts_with("🔴 Grid closed BTCUSDT"));
        assert!(!closed.to_string().starts_with('🔴'));

        let risk = EngineEvent::Risk(RiskEvent::ManualResume);
        assert_eq!(event_message(&risk), "⚠️ Trading resumed manually");
    }
}
