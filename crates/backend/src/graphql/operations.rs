use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ids::{ChatId, MessageId};
use crate::types::{Chat, Message, Role};

pub const GET_CHATS: &str = r#"query GetChats {
  chats(order_by: { created_at: desc }) {
    id
    created_at
  }
}"#;

pub const CREATE_CHAT: &str = r#"mutation CreateChat {
  insert_chats_one(object: {}) {
    id
    created_at
  }
}"#;

pub const GET_MESSAGES_SUBSCRIPTION: &str = r#"subscription GetMessages($chatId: uuid!) {
  messages(where: { chat_id: { _eq: $chatId } }, order_by: { created_at: asc }) {
    id
    chat_id
    content
    role
    created_at
  }
}"#;

pub const INSERT_USER_MESSAGE: &str = r#"mutation InsertUserMessage($chatId: uuid!, $message: String!) {
  insert_messages_one(object: { chat_id: $chatId, content: $message, role: "user" }) {
    id
    chat_id
    content
    role
    created_at
  }
}"#;

pub const SEND_MESSAGE_TO_BOT: &str = r#"mutation SendMessageToBot($chatId: uuid!, $message: String!) {
  sendMessageToBot(chat_id: $chatId, content: $message) {
    id
    content
    role
    created_at
  }
}"#;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatsData {
    pub chats: Vec<Chat>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateChatData {
    pub insert_chats_one: Option<Chat>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesData {
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsertMessageData {
    pub insert_messages_one: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageToBotData {
    #[serde(rename = "sendMessageToBot")]
    pub send_message_to_bot: Option<BotReply>,
}

/// Action response type; it carries no chat id, so the caller supplies it.
#[derive(Debug, Deserialize)]
pub(crate) struct BotReply {
    pub id: MessageId,
    pub content: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl BotReply {
    pub fn into_message(self, chat_id: ChatId) -> Message {
        Message {
            id: self.id,
            chat_id,
            role: self.role,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphQlErrorEntry {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_rows_decode_hasura_timestamps() {
        let payload = r#"{
            "data": {
                "messages": [
                    {
                        "id": "0b8f4a52-3d5c-4f0a-9a7e-2f1f6f9d3c01",
                        "chat_id": "7c6c8e2a-2a53-4c39-8f57-6f0ad0d5e9b1",
                        "content": "hello",
                        "role": "user",
                        "created_at": "2024-02-01T10:00:00.123456+00:00"
                    },
                    {
                        "id": "0b8f4a52-3d5c-4f0a-9a7e-2f1f6f9d3c02",
                        "chat_id": "7c6c8e2a-2a53-4c39-8f57-6f0ad0d5e9b1",
                        "content": "hi there",
                        "role": "assistant",
                        "created_at": "2024-02-01T10:00:02.5+00:00"
                    }
                ]
            }
        }"#;

        let response: GraphQlResponse<MessagesData> = serde_json::from_str(payload).unwrap();
        let messages = response.data.unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(messages[0].created_at < messages[1].created_at);
        assert!(response.errors.is_empty());
    }

    #[test]
    fn error_only_response_has_no_data() {
        let payload = r#"{"errors":[{"message":"field 'chats' not found in type: 'query_root'","extensions":{"code":"validation-failed"}}]}"#;
        let response: GraphQlResponse<ChatsData> = serde_json::from_str(payload).unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.errors.len(), 1);
    }

    #[test]
    fn bot_reply_takes_chat_id_from_request() {
        let payload = r#"{"data":{"sendMessageToBot":{"id":"0b8f4a52-3d5c-4f0a-9a7e-2f1f6f9d3c03","content":"Sure!","role":"assistant","created_at":"2024-02-01T10:00:05Z"}}}"#;
        let response: GraphQlResponse<SendMessageToBotData> =
            serde_json::from_str(payload).unwrap();
        let chat_id = ChatId::parse("7c6c8e2a-2a53-4c39-8f57-6f0ad0d5e9b1").unwrap();
        let message = response
            .data
            .and_then(|data| data.send_message_to_bot)
            .unwrap()
            .into_message(chat_id);
        assert_eq!(message.chat_id, chat_id);
        assert_eq!(message.role, Role::Assistant);
    }
}
