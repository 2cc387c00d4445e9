use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use snafu::{OptionExt, ResultExt};

use super::operations::{
    CREATE_CHAT, ChatsData, CreateChatData, GET_CHATS, GraphQlResponse, INSERT_USER_MESSAGE,
    InsertMessageData, SEND_MESSAGE_TO_BOT, SendMessageToBotData,
};
use super::ws::run_message_subscription;
use crate::endpoints::BackendEndpoints;
use crate::error::{
    BackendResult, DecodeSnafu, GraphQlSnafu, HttpSnafu, MissingDataSnafu, NotAuthenticatedSnafu,
    StatusSnafu,
};
use crate::ids::ChatId;
use crate::subscription::{SubscriptionHandle, make_feed_channel};
use crate::types::{Chat, Message};
use crate::{AuthProvider, BoxFuture, ChatBackend};

#[derive(Serialize)]
struct GraphQlRequest<'a, V: Serialize> {
    query: &'a str,
    variables: V,
}

/// GraphQL client for the Hasura endpoint, authorised with the viewer's access token.
pub struct HasuraClient {
    http: reqwest::Client,
    endpoints: BackendEndpoints,
    auth: Arc<dyn AuthProvider>,
}

impl HasuraClient {
    pub fn new(endpoints: BackendEndpoints, auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints, auth)
    }

    pub fn with_client(
        http: reqwest::Client,
        endpoints: BackendEndpoints,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            http,
            endpoints,
            auth,
        }
    }

    async fn execute<V, T>(&self, stage: &'static str, query: &str, variables: V) -> BackendResult<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let token = self.auth.access_token().context(NotAuthenticatedSnafu { stage })?;

        let response = self
            .http
            .post(&self.endpoints.graphql_url)
            .bearer_auth(token)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .context(HttpSnafu { stage })?;

        let status = response.status();
        let body = response.text().await.context(HttpSnafu { stage })?;
        if !status.is_success() {
            return StatusSnafu {
                stage,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        decode_response(stage, &body)
    }

    async fn list_chats_inner(&self) -> BackendResult<Vec<Chat>> {
        let data: ChatsData = self.execute("list-chats", GET_CHATS, json!({})).await?;
        tracing::debug!(count = data.chats.len(), "loaded chats");
        Ok(data.chats)
    }

    async fn create_chat_inner(&self) -> BackendResult<Chat> {
        let stage = "create-chat";
        let data: CreateChatData = self.execute(stage, CREATE_CHAT, json!({})).await?;
        let chat = data.insert_chats_one.context(MissingDataSnafu {
            stage,
            field: "insert_chats_one",
        })?;
        tracing::info!(chat_id = %chat.id, "created chat");
        Ok(chat)
    }

    async fn insert_user_message_inner(
        &self,
        chat_id: ChatId,
        content: &str,
    ) -> BackendResult<Message> {
        let stage = "insert-user-message";
        let data: InsertMessageData = self
            .execute(
                stage,
                INSERT_USER_MESSAGE,
                json!({ "chatId": chat_id, "message": content }),
            )
            .await?;
        data.insert_messages_one.context(MissingDataSnafu {
            stage,
            field: "insert_messages_one",
        })
    }

    async fn request_bot_reply_inner(
        &self,
        chat_id: ChatId,
        content: &str,
    ) -> BackendResult<Message> {
        let stage = "request-bot-reply";
        let data: SendMessageToBotData = self
            .execute(
                stage,
                SEND_MESSAGE_TO_BOT,
                json!({ "chatId": chat_id, "message": content }),
            )
            .await?;
        let reply = data.send_message_to_bot.context(MissingDataSnafu {
            stage,
            field: "sendMessageToBot",
        })?;
        Ok(reply.into_message(chat_id))
    }
}

impl ChatBackend for HasuraClient {
    fn list_chats(&self) -> BoxFuture<'_, BackendResult<Vec<Chat>>> {
        Box::pin(self.list_chats_inner())
    }

    fn create_chat(&self) -> BoxFuture<'_, BackendResult<Chat>> {
        Box::pin(self.create_chat_inner())
    }

    fn subscribe_messages(&self, chat_id: ChatId) -> BackendResult<SubscriptionHandle> {
        let token = self
            .auth
            .access_token()
            .context(NotAuthenticatedSnafu {
                stage: "subscribe-messages",
            })?;
        let (events_tx, subscription, cancel_rx) = make_feed_channel(chat_id);
        let url = self.endpoints.graphql_ws_url();

        tracing::debug!(%chat_id, "opening message subscription");
        let worker = Box::pin(run_message_subscription(
            url, token, chat_id, events_tx, cancel_rx,
        ));

        Ok(SubscriptionHandle {
            subscription,
            worker,
        })
    }

    fn insert_user_message<'a>(
        &'a self,
        chat_id: ChatId,
        content: &'a str,
    ) -> BoxFuture<'a, BackendResult<Message>> {
        Box::pin(self.insert_user_message_inner(chat_id, content))
    }

    fn request_bot_reply<'a>(
        &'a self,
        chat_id: ChatId,
        content: &'a str,
    ) -> BoxFuture<'a, BackendResult<Message>> {
        Box::pin(self.request_bot_reply_inner(chat_id, content))
    }
}

/// Splits a GraphQL envelope into data or a typed error. Hasura reports most failures
/// with status 200 and an `errors` array.
pub(crate) fn decode_response<T: DeserializeOwned>(
    stage: &'static str,
    body: &str,
) -> BackendResult<T> {
    let response: GraphQlResponse<T> = serde_json::from_str(body).context(DecodeSnafu { stage })?;

    if !response.errors.is_empty() {
        return GraphQlSnafu {
            stage,
            messages: response
                .errors
                .into_iter()
                .map(|entry| entry.message)
                .collect::<Vec<_>>(),
        }
        .fail();
    }

    response.data.context(MissingDataSnafu {
        stage,
        field: "data",
    })
}
