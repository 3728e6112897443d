use async_trait::async_trait;
use serenity::{
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;
use tracing::warn;

use crate::audio::notify::Notifier;

/// Notifier sobre la API HTTP de Discord. Fire-and-forget: un aviso que no
/// llega se loggea y se sigue.
pub struct SerenityNotifier {
    http: Arc<Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn send(&self, channel: ChannelId, text: &str) {
        if let Err(e) = channel.say(&self.http, text).await {
            warn!("No se pudo enviar el aviso al canal {}: {:?}", channel, e);
        }
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) {
        if let Err(e) = self.http.delete_message(channel, message, None).await {
            warn!("No se pudo borrar el mensaje {} en {}: {:?}", message, channel, e);
        }
    }
}
