use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId};

/// Sink de mensajes de estado hacia el canal de texto vinculado.
///
/// Fire-and-forget: las implementaciones loggean los fallos y nunca los
/// propagan; perder un aviso no puede afectar la reproducción.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: ChannelId, text: &str);
    async fn delete_message(&self, channel: ChannelId, message: MessageId);
}
