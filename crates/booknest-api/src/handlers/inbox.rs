use axum::{extract::State, http::StatusCode, Json};
use booknest_core::{Message, MessageView, Notification};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::auth::AuthUser;
use crate::{ApiError, ApiResult, AppState, JsonBody};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub title: String,
    pub content: String,
    /// User ids, or user objects carrying `_id`.
    #[serde(rename = "recieverList", alias = "receiverList", default)]
    pub reciever_list: Vec<JsonValue>,
}

/// Receiver ids in first-seen order, without duplicates.
fn receiver_ids(list: &[JsonValue]) -> ApiResult<Vec<String>> {
    let mut ids: Vec<String> = Vec::with_capacity(list.len());
    for entry in list {
        let id = match entry {
            JsonValue::String(id) => id.as_str(),
            JsonValue::Object(obj) => obj
                .get("_id")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| ApiError::bad_request("receiver object without _id"))?,
            _ => return Err(ApiError::bad_request("receivers must be ids or users")),
        };
        let id = id.trim();
        if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

pub async fn send(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let receivers = receiver_ids(&req.reciever_list)?;
    if receivers.is_empty() {
        return Err(ApiError::bad_request("at least one receiver is required"));
    }
    let known = state.store.users_by_ids(&receivers).await?;
    if let Some(missing) = receivers
        .iter()
        .find(|id| !known.iter().any(|u| &u.id == *id))
    {
        return Err(ApiError::bad_request(format!("unknown receiver '{}'", missing)));
    }

    let message = Message::new(&caller.id, &req.title, &req.content, receivers)?;
    state.store.insert_message(message.clone()).await?;

    let notis = message
        .reciever
        .iter()
        .map(|user| Notification::new_message(user, &caller.id))
        .collect();
    state.store.insert_notifications(notis).await?;
    info!(
        user_id = %caller.id,
        receivers = message.reciever.len(),
        "Message sent"
    );
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn sent(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Json<Vec<MessageView>>> {
    Ok(Json(state.store.messages_sent(&caller.id).await?))
}

pub async fn received(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Json<Vec<MessageView>>> {
    Ok(Json(state.store.messages_received(&caller.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn receivers_accept_ids_and_objects() {
        let list = vec![
            json!("u1"),
            json!({"_id": "u2", "username": "someone"}),
            json!("u1"),
            json!(" "),
        ];
        assert_eq!(receiver_ids(&list).unwrap(), vec!["u1", "u2"]);
        assert!(receiver_ids(&[json!(42)]).is_err());
        assert!(receiver_ids(&[json!({"username": "x"})]).is_err());
    }
}
