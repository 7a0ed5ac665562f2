//! Discord REST implementation of the vote surface

use super::types::*;
use super::{Transport, TransportError};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum page size Discord accepts for reactor listings
const REACTORS_PAGE_SIZE: usize = 100;

/// Discord REST client acting as a bot user
pub struct DiscordClient {
    client: Client,
    token: String,
    base_url: Url,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>, api_base: &str) -> Result<Self, TransportError> {
        let base_url = Url::parse(api_base)
            .map_err(|e| TransportError::invalid_request(format!("Invalid API base '{api_base}': {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("votekeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: token.into(),
            base_url,
        })
    }

    /// Build an endpoint URL; each segment is percent-encoded (emoji included)
    fn url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::invalid_request("API base cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn message_url(&self, message: &MessageRef, rest: &[&str]) -> Result<Url, TransportError> {
        let mut segments = vec![
            "channels",
            message.surface_id.as_str(),
            "messages",
            message.message_id.as_str(),
        ];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<String, TransportError> {
        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }
        Ok(body)
    }

    async fn get_json<R: DeserializeOwned>(&self, url: Url) -> Result<R, TransportError> {
        let body = self.send::<()>(Method::GET, url, None).await?;
        serde_json::from_str(&body)
            .map_err(|e| TransportError::decode(format!("Failed to parse response: {e} - body: {body}")))
    }

    fn classify_error(status: StatusCode, body: &str) -> TransportError {
        let parsed: Option<WireError> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| body.to_string());
        let message = format!("HTTP {status}: {message}");

        match status.as_u16() {
            404 => TransportError::not_found(message),
            403 => TransportError::forbidden(message),
            401 => TransportError::auth(message),
            429 => {
                let error = TransportError::rate_limit(message);
                match parsed.and_then(|e| e.retry_after) {
                    Some(secs) if secs.is_finite() && secs >= 0.0 => {
                        error.with_retry_after(Duration::from_secs_f64(secs))
                    }
                    _ => error,
                }
            }
            500..=599 => TransportError::server_error(message),
            _ => TransportError::invalid_request(message),
        }
    }
}

#[async_trait]
impl Transport for DiscordClient {
    async fn current_user(&self) -> Result<UserId, TransportError> {
        let user: WireUser = self.get_json(self.url(&["users", "@me"])?).await?;
        Ok(UserId(user.id))
    }

    async fn resolve_surface(&self, surface: &SurfaceId) -> Result<bool, TransportError> {
        let url = self.url(&["channels", surface.as_str()])?;
        match self.get_json::<WireChannel>(url).await {
            Ok(channel) => Ok(channel.id == surface.0),
            Err(e) if e.is_missing() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_message(&self, message: &MessageRef) -> Result<Message, TransportError> {
        let wire: WireMessage = self.get_json(self.message_url(message, &[])?).await?;
        Ok(wire.into_message())
    }

    async fn get_reactors(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<ReactorList, TransportError> {
        let mut users = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut url = self.message_url(message, &["reactions", emote.as_str()])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &REACTORS_PAGE_SIZE.to_string());
                if let Some(after) = &after {
                    query.append_pair("after", after);
                }
            }

            let page: Vec<WireUser> = self.get_json(url).await?;
            let page_len = page.len();
            after = page.last().map(|u| u.id.clone());
            users.extend(page.into_iter().map(|u| UserId(u.id)));

            if page_len < REACTORS_PAGE_SIZE {
                break;
            }
        }

        Ok(ReactorList {
            emote: emote.clone(),
            users,
        })
    }

    async fn add_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<(), TransportError> {
        let url = self.message_url(message, &["reactions", emote.as_str(), "@me"])?;
        self.send::<()>(Method::PUT, url, None).await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
        user: &UserId,
    ) -> Result<(), TransportError> {
        let url = self.message_url(message, &["reactions", emote.as_str(), user.as_str()])?;
        self.send::<()>(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn remove_all_reactions(&self, message: &MessageRef) -> Result<(), TransportError> {
        let url = self.message_url(message, &["reactions"])?;
        self.send::<()>(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        embed: &Embed,
    ) -> Result<(), TransportError> {
        let url = self.message_url(message, &[])?;
        let body = WireEmbeds {
            embeds: std::slice::from_ref(embed),
        };
        self.send(Method::PATCH, url, Some(&body)).await?;
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), TransportError> {
        let url = self.message_url(message, &[])?;
        self.send::<()>(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn create_message(
        &self,
        surface: &SurfaceId,
        embed: &Embed,
    ) -> Result<Message, TransportError> {
        let url = self.url(&["channels", surface.as_str(), "messages"])?;
        let body = WireEmbeds {
            embeds: std::slice::from_ref(embed),
        };
        let response = self.send(Method::POST, url, Some(&body)).await?;
        let wire: WireMessage = serde_json::from_str(&response)
            .map_err(|e| TransportError::decode(format!("Failed to parse created message: {e}")))?;
        Ok(wire.into_message())
    }
}

// Discord API types

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireEmoji {
    id: Option<String>,
    name: Option<String>,
}

impl WireEmoji {
    fn to_emote(&self) -> Emote {
        let name = self.name.clone().unwrap_or_default();
        match &self.id {
            Some(id) => Emote(format!("{name}:{id}")),
            None => Emote(name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireReaction {
    count: u32,
    #[serde(default)]
    me: bool,
    emoji: WireEmoji,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    channel_id: String,
    author: WireUser,
    #[serde(default)]
    embeds: Vec<Embed>,
    #[serde(default)]
    reactions: Vec<WireReaction>,
}

impl WireMessage {
    fn into_message(self) -> Message {
        let reactions = self
            .reactions
            .iter()
            .map(|r| {
                (
                    r.emoji.to_emote(),
                    ReactionCount {
                        count: r.count,
                        me: r.me,
                    },
                )
            })
            .collect();

        Message {
            reference: MessageRef::new(self.channel_id, self.id),
            author: UserId(self.author.id),
            embed: self.embeds.into_iter().next(),
            reactions: ReactionSummary::new(reactions),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireEmbeds<'a> {
    embeds: &'a [Embed],
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: Option<String>,
    retry_after: Option<f64>,
}
