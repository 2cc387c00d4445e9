use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use super::client::decode_response;
use super::operations::{GET_MESSAGES_SUBSCRIPTION, MessagesData};
use crate::error::{BackendError, BackendResult, DecodeSnafu, ProtocolSnafu, WebSocketSnafu};
use crate::ids::ChatId;
use crate::subscription::FeedEvent;

const SUBPROTOCOL: &str = "graphql-transport-ws";
const OPERATION_ID: &str = "messages";

/// Frames this client sends under `graphql-transport-ws`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    ConnectionInit { payload: Value },
    Subscribe { id: &'a str, payload: Value },
    Complete { id: &'a str },
    Pong {},
}

/// Frames the server may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    ConnectionAck {},
    Next {
        id: String,
        payload: Value,
    },
    Error {
        id: String,
        payload: Value,
    },
    Complete {
        id: String,
    },
    Ping {},
    Pong {},
}

enum Step {
    Continue,
    Finished,
}

fn encode(frame: &ClientFrame<'_>) -> BackendResult<WsMessage> {
    let text = serde_json::to_string(frame).context(DecodeSnafu {
        stage: "encode-ws-frame",
    })?;
    Ok(WsMessage::Text(text))
}

fn decode(text: &str) -> BackendResult<ServerFrame> {
    serde_json::from_str(text).context(DecodeSnafu {
        stage: "decode-ws-frame",
    })
}

fn init_payload(token: &str) -> Value {
    json!({ "headers": { "Authorization": format!("Bearer {token}") } })
}

/// Converts one `next` payload into the chat's ordered message list.
fn snapshot_from_payload(payload: Value) -> BackendResult<FeedEvent> {
    let data: MessagesData = decode_response("subscription-next", &payload.to_string())?;
    Ok(FeedEvent::Snapshot(data.messages))
}

fn error_from_payload(payload: &Value) -> BackendError {
    let messages = match payload {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                entry
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| entry.to_string())
            })
            .collect(),
        other => vec![other.to_string()],
    };

    BackendError::GraphQl {
        stage: "subscription-error",
        messages,
    }
}

/// Drives one message subscription until the server completes it, the socket fails,
/// or the subscriber cancels.
pub(crate) async fn run_message_subscription(
    url: String,
    token: String,
    chat_id: ChatId,
    events_tx: mpsc::UnboundedSender<FeedEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let outcome = drive_subscription(&url, &token, chat_id, &events_tx, &mut cancel_rx).await;

    match outcome {
        Ok(()) => tracing::debug!(%chat_id, "message subscription closed"),
        Err(error) => {
            tracing::warn!(%chat_id, %error, "message subscription failed");
            let _ = events_tx.send(FeedEvent::Failed(error));
        }
    }
}

async fn drive_subscription(
    url: &str,
    token: &str,
    chat_id: ChatId,
    events_tx: &mpsc::UnboundedSender<FeedEvent>,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> BackendResult<()> {
    let mut request = url.into_client_request().context(WebSocketSnafu {
        stage: "build-ws-request",
    })?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

    let (ws_stream, _) = connect_async(request).await.context(WebSocketSnafu {
        stage: "connect-ws",
    })?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    ws_tx
        .send(encode(&ClientFrame::ConnectionInit {
            payload: init_payload(token),
        })?)
        .await
        .context(WebSocketSnafu {
            stage: "send-connection-init",
        })?;

    // Nothing may be subscribed before the server acknowledges the connection.
    loop {
        let Some(frame) = ws_rx.next().await else {
            return ProtocolSnafu {
                stage: "await-connection-ack",
                details: "socket closed before connection_ack".to_string(),
            }
            .fail();
        };

        match frame.context(WebSocketSnafu {
            stage: "await-connection-ack",
        })? {
            WsMessage::Text(text) => match decode(&text)? {
                ServerFrame::ConnectionAck {} => break,
                ServerFrame::Ping {} => {
                    ws_tx
                        .send(encode(&ClientFrame::Pong {})?)
                        .await
                        .context(WebSocketSnafu { stage: "send-pong" })?;
                }
                other => {
                    return ProtocolSnafu {
                        stage: "await-connection-ack",
                        details: format!("unexpected frame before ack: {other:?}"),
                    }
                    .fail();
                }
            },
            WsMessage::Ping(data) => {
                let _ = ws_tx.send(WsMessage::Pong(data)).await;
            }
            WsMessage::Close(frame) => {
                return ProtocolSnafu {
                    stage: "await-connection-ack",
                    details: format!("server closed the socket: {frame:?}"),
                }
                .fail();
            }
            _ => {}
        }
    }

    ws_tx
        .send(encode(&ClientFrame::Subscribe {
            id: OPERATION_ID,
            payload: json!({
                "query": GET_MESSAGES_SUBSCRIPTION,
                "variables": { "chatId": chat_id },
            }),
        })?)
        .await
        .context(WebSocketSnafu {
            stage: "send-subscribe",
        })?;

    loop {
        let frame = tokio::select! {
            _ = &mut *cancel_rx => {
                // Subscriber went away; release the server-side operation before closing.
                let _ = ws_tx.send(encode(&ClientFrame::Complete { id: OPERATION_ID })?).await;
                let _ = ws_tx.close().await;
                return Ok(());
            }
            frame = ws_rx.next() => frame,
        };

        let Some(frame) = frame else {
            return ProtocolSnafu {
                stage: "read-ws-frame",
                details: "socket closed while subscribed".to_string(),
            }
            .fail();
        };

        match frame.context(WebSocketSnafu {
            stage: "read-ws-frame",
        })? {
            WsMessage::Text(text) => {
                let frame = decode(&text)?;
                if let ServerFrame::Ping {} = frame {
                    ws_tx
                        .send(encode(&ClientFrame::Pong {})?)
                        .await
                        .context(WebSocketSnafu { stage: "send-pong" })?;
                    continue;
                }
                if matches!(handle_frame(frame, events_tx)?, Step::Finished) {
                    let _ = ws_tx.close().await;
                    return Ok(());
                }
            }
            WsMessage::Ping(data) => {
                let _ = ws_tx.send(WsMessage::Pong(data)).await;
            }
            WsMessage::Close(frame) => {
                return ProtocolSnafu {
                    stage: "read-ws-frame",
                    details: format!("server closed the socket: {frame:?}"),
                }
                .fail();
            }
            _ => {}
        }
    }
}

fn handle_frame(
    frame: ServerFrame,
    events_tx: &mpsc::UnboundedSender<FeedEvent>,
) -> BackendResult<Step> {
    match frame {
        ServerFrame::Next { id, payload } if id == OPERATION_ID => {
            let event = snapshot_from_payload(payload)?;
            if events_tx.send(event).is_err() {
                return Ok(Step::Finished);
            }
            Ok(Step::Continue)
        }
        ServerFrame::Error { id, payload } if id == OPERATION_ID => Err(error_from_payload(&payload)),
        ServerFrame::Complete { id } if id == OPERATION_ID => Ok(Step::Finished),
        ServerFrame::Next { .. } | ServerFrame::Error { .. } | ServerFrame::Complete { .. } => {
            tracing::debug!("ignoring frame for an unknown operation id");
            Ok(Step::Continue)
        }
        ServerFrame::ConnectionAck {} | ServerFrame::Ping {} | ServerFrame::Pong {} => {
            Ok(Step::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

    use super::*;
    use crate::subscription::make_feed_channel;

    const NEXT_FRAME: &str = r#"{"type":"next","id":"messages","payload":{"data":{"messages":[
        {"id":"0b8f4a52-3d5c-4f0a-9a7e-2f1f6f9d3c01","chat_id":"7c6c8e2a-2a53-4c39-8f57-6f0ad0d5e9b1","content":"hello","role":"user","created_at":"2024-02-01T10:00:00+00:00"}
    ]}}}"#;

    async fn accept_graphql_ws(listener: TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        accept_hdr_async(stream, |_: &Request, mut response: Response| {
            response
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
            Ok::<_, ErrorResponse>(response)
        })
        .await
        .unwrap()
    }

    async fn next_client_frame(ws: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn worker_handshakes_streams_and_completes_when_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/v1/graphql", listener.local_addr().unwrap());
        let chat_id = ChatId::new_v4();

        let server = tokio::spawn(async move {
            let mut ws = accept_graphql_ws(listener).await;
            let mut seen = vec![next_client_frame(&mut ws).await];
            ws.send(WsMessage::Text(r#"{"type":"ping"}"#.to_string()))
                .await
                .unwrap();
            seen.push(next_client_frame(&mut ws).await);
            ws.send(WsMessage::Text(r#"{"type":"connection_ack"}"#.to_string()))
                .await
                .unwrap();
            seen.push(next_client_frame(&mut ws).await);
            ws.send(WsMessage::Text(NEXT_FRAME.to_string())).await.unwrap();
            seen.push(next_client_frame(&mut ws).await);
            seen
        });

        let (events_tx, mut subscription, cancel_rx) = make_feed_channel(chat_id);
        let worker = tokio::spawn(run_message_subscription(
            url,
            "token-1".to_string(),
            chat_id,
            events_tx,
            cancel_rx,
        ));

        match subscription.recv().await {
            Some(FeedEvent::Snapshot(messages)) => assert_eq!(messages[0].content, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
        drop(subscription);
        worker.await.unwrap();

        let seen = server.await.unwrap();
        assert_eq!(seen[0]["type"], "connection_init");
        assert_eq!(
            seen[0]["payload"]["headers"]["Authorization"],
            "Bearer token-1"
        );
        assert_eq!(seen[1], json!({ "type": "pong" }));
        assert_eq!(seen[2]["type"], "subscribe");
        assert_eq!(seen[2]["id"], OPERATION_ID);
        assert_eq!(seen[2]["payload"]["variables"]["chatId"], json!(chat_id));
        assert_eq!(seen[3], json!({ "type": "complete", "id": "messages" }));
    }

    #[tokio::test]
    async fn close_before_ack_fails_the_feed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/v1/graphql", listener.local_addr().unwrap());
        let chat_id = ChatId::new_v4();

        let server = tokio::spawn(async move {
            let mut ws = accept_graphql_ws(listener).await;
            let _init = next_client_frame(&mut ws).await;
            ws.close(None).await.unwrap();
        });

        let (events_tx, mut subscription, cancel_rx) = make_feed_channel(chat_id);
        run_message_subscription(url, "token-1".to_string(), chat_id, events_tx, cancel_rx).await;

        match subscription.recv().await {
            Some(FeedEvent::Failed(BackendError::Protocol { stage, .. })) => {
                assert_eq!(stage, "await-connection-ack");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        server.await.unwrap();
    }

    #[test]
    fn client_frames_use_protocol_type_tags() {
        let init = serde_json::to_value(ClientFrame::ConnectionInit {
            payload: init_payload("abc"),
        })
        .unwrap();
        assert_eq!(init["type"], "connection_init");
        assert_eq!(init["payload"]["headers"]["Authorization"], "Bearer abc");

        let complete = serde_json::to_value(ClientFrame::Complete { id: OPERATION_ID }).unwrap();
        assert_eq!(complete, json!({ "type": "complete", "id": "messages" }));

        let pong = serde_json::to_value(ClientFrame::Pong {}).unwrap();
        assert_eq!(pong, json!({ "type": "pong" }));
    }

    #[test]
    fn next_frame_becomes_a_snapshot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = decode(
            r#"{"type":"next","id":"messages","payload":{"data":{"messages":[
                {"id":"0b8f4a52-3d5c-4f0a-9a7e-2f1f6f9d3c01","chat_id":"7c6c8e2a-2a53-4c39-8f57-6f0ad0d5e9b1","content":"hello","role":"user","created_at":"2024-02-01T10:00:00+00:00"}
            ]}}}"#,
        )
        .unwrap();

        assert!(matches!(handle_frame(frame, &tx), Ok(Step::Continue)));
        match rx.try_recv().unwrap() {
            FeedEvent::Snapshot(messages) => assert_eq!(messages[0].content, "hello"),
            FeedEvent::Failed(error) => panic!("unexpected failure: {error}"),
        }
    }

    #[test]
    fn error_frame_carries_graphql_messages() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let frame = decode(
            r#"{"type":"error","id":"messages","payload":[{"message":"field 'messages' not found"}]}"#,
        )
        .unwrap();

        match handle_frame(frame, &tx) {
            Err(BackendError::GraphQl { messages, .. }) => {
                assert_eq!(messages, vec!["field 'messages' not found"]);
            }
            _ => panic!("expected a graphql error"),
        }
    }

    #[test]
    fn complete_frame_finishes_and_foreign_ids_are_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let foreign = decode(r#"{"type":"complete","id":"other"}"#).unwrap();
        assert!(matches!(handle_frame(foreign, &tx), Ok(Step::Continue)));

        let own = decode(r#"{"type":"complete","id":"messages"}"#).unwrap();
        assert!(matches!(handle_frame(own, &tx), Ok(Step::Finished)));
    }

    #[test]
    fn ack_and_ping_frames_decode_with_or_without_payload() {
        assert!(matches!(
            decode(r#"{"type":"connection_ack"}"#).unwrap(),
            ServerFrame::ConnectionAck {}
        ));
        assert!(matches!(
            decode(r#"{"type":"ping","payload":{"at":1}}"#).unwrap(),
            ServerFrame::Ping {}
        ));
    }
}
