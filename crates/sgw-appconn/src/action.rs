//! Message actions for inbound requests and advices

use crate::conn::{AppConn, ECHO_SENTINEL};
use crate::message::{self, Message};
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Handler for one inbound message type.
#[async_trait]
pub trait MessageAction: Send + Sync {
    /// The message type this action handles
    fn message_type(&self) -> u8;

    /// Executes the action; errors are logged by the caller and never
    /// tear down the connection.
    async fn execute(&self, conn: &AppConn, message: Message) -> Result<()>;
}

/// Supported message actions, keyed by message type.
pub struct ActionRegistry {
    map: DashMap<u8, Arc<dyn MessageAction>>,
}

impl ActionRegistry {
    pub fn new() -> ActionRegistry {
        ActionRegistry { map: DashMap::new() }
    }

    /// Registers an action, replacing any existing one for the type.
    pub fn put(&self, action: Arc<dyn MessageAction>) {
        self.map.insert(action.message_type(), action);
    }

    pub fn get(&self, ty: u8) -> Option<Arc<dyn MessageAction>> {
        self.map.get(&ty).map(|entry| entry.clone())
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        ActionRegistry::new()
    }
}

/// Replies to echo probes with the sentinel byte.
pub struct EchoAction;

#[async_trait]
impl MessageAction for EchoAction {
    fn message_type(&self) -> u8 {
        message::ECHO_REQUEST.ty
    }

    async fn execute(&self, conn: &AppConn, message: Message) -> Result<()> {
        let mut response = Message::tv(message::ECHO_REQUEST.linked_type, ECHO_SENTINEL);
        response.set_sequence_number(message.sequence_number());
        conn.write(&response).await;
        Ok(())
    }
}
