//! Mensajes entre la vista del chat y el controlador del panel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::models::{ChatTurn, Sender};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    UserInput { value: String },
    ViewReady,
    GetHistory,
    /// Cualquier otro `type`: se ignora.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Un sobre mal formado se trata igual que uno desconocido.
    pub fn decode(raw: Value) -> Self {
        serde_json::from_value(raw).unwrap_or_else(|e| {
            warn!("Mensaje de la vista no válido: {e}");
            Self::Unknown
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    AddMessage { value: String, sender: Sender },
    SetLoading { value: bool },
    LoadHistory { history: Vec<ChatTurn> },
    ProjectAnalyzed,
}

/// Cola de mensajes pendientes para la vista; el frontend la vacía por sondeo.
#[derive(Clone, Default)]
pub struct Outbox {
    pending: Arc<Mutex<VecDeque<OutboundMessage>>>,
}

impl Outbox {
    pub fn push(&self, message: OutboundMessage) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).push_back(message);
    }

    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_and_unknown_tags() {
        assert_eq!(
            InboundMessage::decode(json!({ "type": "userInput", "value": "hola" })),
            InboundMessage::UserInput { value: "hola".into() }
        );
        assert_eq!(InboundMessage::decode(json!({ "type": "viewReady" })), InboundMessage::ViewReady);
        assert_eq!(InboundMessage::decode(json!({ "type": "getHistory" })), InboundMessage::GetHistory);
        assert_eq!(InboundMessage::decode(json!({ "type": "openFile" })), InboundMessage::Unknown);
        assert_eq!(InboundMessage::decode(json!({ "type": "userInput" })), InboundMessage::Unknown);
        assert_eq!(InboundMessage::decode(json!("basura")), InboundMessage::Unknown);
    }

    #[test]
    fn encodes_outbound_envelopes() {
        let add = OutboundMessage::AddMessage { value: "hi".into(), sender: Sender::Bot };
        assert_eq!(
            serde_json::to_value(&add).unwrap(),
            json!({ "type": "addMessage", "value": "hi", "sender": "bot" })
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::SetLoading { value: true }).unwrap(),
            json!({ "type": "setLoading", "value": true })
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::LoadHistory { history: vec![ChatTurn::user("a")] })
                .unwrap(),
            json!({ "type": "loadHistory", "history": [{ "sender": "user", "message": "a" }] })
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::ProjectAnalyzed).unwrap(),
            json!({ "type": "projectAnalyzed" })
        );
    }

    #[test]
    fn outbox_drains_in_order() {
        let outbox = Outbox::default();
        outbox.push(OutboundMessage::SetLoading { value: true });
        outbox.push(OutboundMessage::ProjectAnalyzed);
        assert_eq!(
            outbox.drain(),
            vec![OutboundMessage::SetLoading { value: true }, OutboundMessage::ProjectAnalyzed]
        );
        assert!(outbox.drain().is_empty());
    }
}
