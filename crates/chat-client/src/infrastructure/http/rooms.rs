//! HTTP implementation of the room-admin and room-history services.
//!
//! | Operation     | Request                                        | Failure mapping        |
//! |---------------|------------------------------------------------|------------------------|
//! | `join_room`   | `GET  {api}/rooms/{id}`                        | 400/404 → RoomNotFound |
//! | `create_room` | `POST {api}/rooms` (body: room id as text)     | 400/409 → AlreadyExists|
//! | `history`     | `GET  {api}/rooms/{id}/messages?size=N&page=0` | –                      |

use async_trait::async_trait;
use chat_core::{ChatMessage, RoomDescriptor};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::application::collaborators::{RoomAdmin, RoomHistory, RoomServiceError};

/// Room services backed by the chat server's REST API.
#[derive(Debug, Clone)]
pub struct HttpRoomService {
    client: reqwest::Client,
    api_base: Url,
    history_page_size: u32,
}

impl HttpRoomService {
    /// `api_base` is the server URL plus API prefix, e.g.
    /// `http://localhost:8080/api/v1`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomServiceError::InvalidUrl`] if `api_base` does not parse
    /// as a base URL.
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        history_page_size: u32,
    ) -> Result<Self, RoomServiceError> {
        let api_base = Url::parse(api_base.trim_end_matches('/'))
            .map_err(|e| RoomServiceError::InvalidUrl(format!("{api_base}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(RoomServiceError::InvalidUrl(api_base.to_string()));
        }
        Ok(Self {
            client,
            api_base,
            history_page_size,
        })
    }

    /// `{api}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, RoomServiceError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| RoomServiceError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl RoomAdmin for HttpRoomService {
    async fn create_room(&self, room_id: &str) -> Result<RoomDescriptor, RoomServiceError> {
        let response = self
            .client
            .post(self.url(&["rooms"])?)
            .header(CONTENT_TYPE, "text/plain")
            .body(room_id.to_string())
            .send()
            .await?;
        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => {
                Err(RoomServiceError::RoomAlreadyExists(room_id.to_string()))
            }
            _ => {
                let room: RoomDescriptor = decode(response).await?;
                info!(room = %room.room_id, "room created");
                Ok(room)
            }
        }
    }

    async fn join_room(&self, room_id: &str) -> Result<RoomDescriptor, RoomServiceError> {
        let response = self.client.get(self.url(&["rooms", room_id])?).send().await?;
        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                Err(RoomServiceError::RoomNotFound(room_id.to_string()))
            }
            _ => decode(response).await,
        }
    }
}

#[async_trait]
impl RoomHistory for HttpRoomService {
    async fn history(&self, room_id: &str) -> Result<Vec<ChatMessage>, RoomServiceError> {
        let mut url = self.url(&["rooms", room_id, "messages"])?;
        url.query_pairs_mut()
            .append_pair("size", &self.history_page_size.to_string())
            .append_pair("page", "0");

        let messages: Vec<ChatMessage> = decode(self.client.get(url).send().await?).await?;
        debug!(room = room_id, count = messages.len(), "history fetched");
        Ok(messages
            .into_iter()
            .map(|m| m.in_room_if_unset(room_id))
            .collect())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RoomServiceError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(RoomServiceError::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| RoomServiceError::Decode(e.to_string()))
}
