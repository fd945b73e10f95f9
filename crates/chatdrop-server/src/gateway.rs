//! Realtime gateway.
//!
//! Each WebSocket connection joins the [`ClientHub`](crate::hub::ClientHub),
//! forwards hub frames to the socket from a writer task, and dispatches
//! inbound events in order from its reader task.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use chatdrop_shared::{ClientEvent, MessageRecord, ProtocolError, ServerEvent};
use chatdrop_store::MessageStore;

use crate::api::AppState;
use crate::responder::AiResponder;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, mut outbound) = state.hub.join().await;
    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!(client = %client_id, error = %e, "Socket write failed");
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match ClientEvent::from_text(&text) {
                    Ok(event) => {
                        handle_event(&recv_state, event).await;
                    }
                    Err(e) => warn!(client = %client_id, error = %e, "Ignoring event"),
                },
                Ok(Message::Binary(data)) => {
                    let e = ProtocolError::Unsupported(format!("{} byte binary frame", data.len()));
                    warn!(client = %client_id, error = %e, "Ignoring event");
                }
                Ok(Message::Close(_)) => break,
                // Ping/pong replies are handled by axum.
                Ok(_) => {}
                Err(e) => {
                    debug!(client = %client_id, error = %e, "Socket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.leave(&client_id).await;
    info!(client = %client_id, "Connection closed");
}

/// Apply an inbound event and broadcast its outcome to every client.
///
/// Returns how many clients the outcome was queued for.
pub async fn handle_event(state: &AppState, event: ClientEvent) -> usize {
    debug!(event = event.name(), "Handling client event");
    let outcome = apply_event(&state.store, &state.responder, event).await;
    state.hub.broadcast(&outcome).await
}

/// Persist the effect of `event` and build the event to broadcast.
///
/// Message-log write failures are logged and swallowed; the broadcast
/// still goes out.
pub async fn apply_event(
    store: &MessageStore,
    responder: &AiResponder,
    event: ClientEvent,
) -> ServerEvent {
    match event {
        ClientEvent::SendMessage { message, auto_copy } => {
            let record = MessageRecord::text(message, auto_copy);
            persist(store, &record).await;
            ServerEvent::ReceiveMessage(record)
        }
        ClientEvent::DeleteMessage { message_id } => {
            if let Err(e) = store.delete_by_id(&message_id).await {
                warn!(id = %message_id, error = %e, "Failed to delete message");
            }
            ServerEvent::MessageDeleted { message_id }
        }
        ClientEvent::ThinkAboutMessage { text } => {
            let reply = responder.respond(&text).await;
            if reply.is_fallback() {
                debug!(chars = text.chars().count(), "Sending fallback AI reply");
            }
            let record = MessageRecord::ai_response(reply.into_text(), text);
            persist(store, &record).await;
            ServerEvent::ReceiveAiResponse(record)
        }
        ClientEvent::ClearMessages {} => {
            if let Err(e) = store.clear().await {
                warn!(error = %e, "Failed to clear messages");
            }
            ServerEvent::MessagesCleared
        }
    }
}

async fn persist(store: &MessageStore, record: &MessageRecord) {
    if let Err(e) = store.append(record.clone()).await {
        warn!(id = %record.id, kind = record.body.type_name(), error = %e, "Failed to save message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_state;
    use chatdrop_shared::constants::AI_FALLBACK_REPLY;
    use chatdrop_shared::RecordBody;
    use serde_json::Value;

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_persists_and_broadcasts() {
        let (state, _dir) = test_state(1024).await;
        let (_a, mut rx_a) = state.hub.join().await;
        let (_b, mut rx_b) = state.hub.join().await;

        let delivered = handle_event(
            &state,
            ClientEvent::SendMessage {
                message: "hello".into(),
                auto_copy: false,
            },
        )
        .await;
        assert_eq!(delivered, 2);

        let records = state.store.load().await;
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].body,
            RecordBody::Text {
                message: "hello".into(),
                should_auto_copy: false,
            }
        );

        for rx in [&mut rx_a, &mut rx_b] {
            let frame = parse(&rx.try_recv().unwrap());
            assert_eq!(frame["event"], "receive_message");
            assert_eq!(frame["data"]["type"], "text");
            assert_eq!(frame["data"]["message"], "hello");
            assert_eq!(frame["data"]["shouldAutoCopy"], false);
            assert_eq!(frame["data"]["id"], records[0].id.as_str());
        }
    }

    #[tokio::test]
    async fn test_delete_message() {
        let (state, _dir) = test_state(1024).await;
        let (_a, mut rx) = state.hub.join().await;

        let record = MessageRecord::text("bye", true);
        state.store.append(record.clone()).await.unwrap();

        handle_event(
            &state,
            ClientEvent::DeleteMessage {
                message_id: record.id.clone(),
            },
        )
        .await;

        assert!(state.store.load().await.is_empty());
        let frame = parse(&rx.try_recv().unwrap());
        assert_eq!(frame["event"], "message_deleted");
        assert_eq!(frame["data"]["messageId"], record.id.as_str());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_still_broadcasts() {
        let (state, _dir) = test_state(1024).await;
        let (_a, mut rx) = state.hub.join().await;

        state.store.append(MessageRecord::text("stay", false)).await.unwrap();
        let before = state.store.load().await;

        let delivered = handle_event(
            &state,
            ClientEvent::DeleteMessage {
                message_id: "no-such-id".into(),
            },
        )
        .await;

        assert_eq!(delivered, 1);
        assert_eq!(state.store.load().await, before);
        let frame = parse(&rx.try_recv().unwrap());
        assert_eq!(frame["data"]["messageId"], "no-such-id");
    }

    #[tokio::test]
    async fn test_think_about_message_uses_fallback_when_offline() {
        let (state, _dir) = test_state(1024).await;
        let (_a, mut rx) = state.hub.join().await;

        handle_event(
            &state,
            ClientEvent::ThinkAboutMessage {
                text: "what now?".into(),
            },
        )
        .await;

        let records = state.store.load().await;
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].body,
            RecordBody::AiResponse {
                message: AI_FALLBACK_REPLY.into(),
                original_text: "what now?".into(),
                is_ai_response: true,
            }
        );

        let frame = parse(&rx.try_recv().unwrap());
        assert_eq!(frame["event"], "receive_ai_response");
        assert_eq!(frame["data"]["type"], "ai_response");
        assert_eq!(frame["data"]["originalText"], "what now?");
    }

    #[tokio::test]
    async fn test_clear_messages() {
        let (state, _dir) = test_state(1024).await;
        let (_a, mut rx) = state.hub.join().await;
        for i in 0..5 {
            state.store.append(MessageRecord::text(i.to_string(), false)).await.unwrap();
        }

        handle_event(&state, ClientEvent::ClearMessages {}).await;

        assert!(state.store.load().await.is_empty());
        assert_eq!(rx.try_recv().unwrap(), r#"{"event":"messages_cleared"}"#);
    }

    #[tokio::test]
    async fn test_clear_frame_without_payload() {
        let (state, _dir) = test_state(1024).await;
        let (_a, mut rx) = state.hub.join().await;
        state.store.append(MessageRecord::text("old", false)).await.unwrap();

        let event = ClientEvent::from_text(r#"{"event": "clear_messages"}"#).unwrap();
        handle_event(&state, event).await;

        assert!(state.store.load().await.is_empty());
        assert_eq!(rx.try_recv().unwrap(), r#"{"event":"messages_cleared"}"#);
    }

    #[tokio::test]
    async fn test_store_failure_still_broadcasts() {
        let (state, _dir) = test_state(1024).await;
        let (_a, mut rx) = state.hub.join().await;

        // Make the log path a directory so every write fails.
        std::fs::create_dir_all(state.store.path()).unwrap();

        handle_event(
            &state,
            ClientEvent::SendMessage {
                message: "lost".into(),
                auto_copy: false,
            },
        )
        .await;

        let frame = parse(&rx.try_recv().unwrap());
        assert_eq!(frame["event"], "receive_message");
        assert!(state.store.load().await.is_empty());
    }
}
