use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::Result;
use crate::auth::{self, AUTHORIZATION};
use crate::bridge::SyncBridge;
use crate::config::ClientConfig;
use crate::engine::{HttpRequest, OpenOptions, Transport};
use crate::error::Error;
use crate::serde_helpers::deserialize_with_warnings;
use crate::types::{
    CreateRoomRequest, CreateTokenRequest, Page, Participant, PatchOperation, Recording,
    RecordingRequest, Room, Stream, StreamingInRequest, StreamingOut, StreamingOutRequest,
};

const JSON: &str = "application/json";

/// Authenticated client for the conferencing management API.
///
/// Every call goes through one [`HttpRequest`], signed with a fresh
/// `Authorization` header.
#[derive(Clone, Debug)]
pub struct Client {
    config: ClientConfig,
    transport: Transport,
    bridge: SyncBridge,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Transport::new(config.tls_verify)?;
        let bridge = SyncBridge::builder()
            .maybe_worker(config.sync_worker.clone())
            .build();

        Ok(Self {
            config,
            transport,
            bridge,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A fresh request object sharing this client's transport and bridge.
    #[must_use]
    pub fn request(&self) -> HttpRequest {
        HttpRequest::with_parts(self.transport.clone(), self.bridge.clone())
    }

    /// Sends an authenticated call to `resource`, a path relative to the base
    /// URL that is used as given, and deserializes the JSON response.
    pub async fn send<B, T>(&self, method: Method, resource: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(resource)?;
        self.call(method, url, body).await
    }

    /// Sends an authenticated call and returns the raw response text.
    pub async fn send_text<B>(&self, method: Method, resource: &str, body: Option<&B>) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(resource)?;
        self.call_text(method, url, body).await
    }

    /// [`Client::send`] in sync mode: blocks the calling thread while the
    /// worker process performs the call.
    ///
    /// The `conference-sync-worker` binary ships with this crate but is not
    /// installed next to a dependent's executable. Point
    /// [`ClientConfig::with_sync_worker`] or `CONFERENCE_SYNC_WORKER` at it;
    /// otherwise every blocking call fails with status 503.
    pub fn send_blocking<B, T>(&self, method: Method, resource: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(resource)?;
        let (request, body) = self.prepare(&method, &url, body, OpenOptions::sync())?;
        request.send(body)?;
        let text = finish(&method, url.path(), &request)?;
        deserialize_with_warnings(&text)
    }

    async fn call<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.call_text(method, url, body).await?;
        deserialize_with_warnings(&text)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, url, body),
            fields(method = %method, path = %url.path(), status_code)
        )
    )]
    async fn call_text<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let (request, body) = self.prepare(&method, &url, body, OpenOptions::default())?;
        request.send(body)?;
        request.wait().await;
        finish(&method, url.path(), &request)
    }

    fn prepare<B>(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&B>,
        options: OpenOptions,
    ) -> Result<(HttpRequest, Option<String>)>
    where
        B: Serialize + ?Sized,
    {
        let header = auth::create_header(
            self.config.credentials(),
            self.config.impersonation.as_ref(),
        )?;
        let body = body.map(serde_json::to_string).transpose()?;

        let request = self.request();
        request.open(method.as_str(), url.as_str(), options)?;
        request.set_header(AUTHORIZATION, &header)?;
        request.set_header("Content-Type", JSON)?;

        Ok((request, body))
    }

    fn endpoint(&self, resource: &str) -> Result<Url> {
        Ok(self.config.base_url.join(resource.trim_start_matches('/'))?)
    }

    /// `v1/rooms/<segments..>` under the base URL. Each segment is
    /// percent-encoded, so identifiers cannot add path levels or a query.
    fn rooms_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Error::validation(format!(
                    "base URL `{}` cannot carry resource paths",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["v1", "rooms"])
            .extend(segments);
        Ok(url)
    }

    pub async fn create_room(&self, request: &CreateRoomRequest) -> Result<Room> {
        self.call(Method::POST, self.rooms_url(&[])?, Some(request))
            .await
    }

    pub async fn rooms(&self, page: Page) -> Result<Vec<Room>> {
        let mut url = self.rooms_url(&[])?;
        let query = serde_html_form::to_string(page)?;
        if !query.is_empty() {
            url.set_query(Some(&query));
        }
        self.call(Method::GET, url, None::<&()>).await
    }

    pub async fn room(&self, room_id: &str) -> Result<Room> {
        self.call(Method::GET, self.rooms_url(&[room_id])?, None::<&()>)
            .await
    }

    pub async fn update_room(&self, room_id: &str, room: &Room) -> Result<Room> {
        self.call(Method::PUT, self.rooms_url(&[room_id])?, Some(room))
            .await
    }

    pub async fn delete_room(&self, room_id: &str) -> Result<()> {
        self.call_text(Method::DELETE, self.rooms_url(&[room_id])?, None::<&()>)
            .await
            .map(drop)
    }

    pub async fn participants(&self, room_id: &str) -> Result<Vec<Participant>> {
        self.call(
            Method::GET,
            self.rooms_url(&[room_id, "participants"])?,
            None::<&()>,
        )
        .await
    }

    pub async fn participant(&self, room_id: &str, participant_id: &str) -> Result<Participant> {
        self.call(
            Method::GET,
            self.rooms_url(&[room_id, "participants", participant_id])?,
            None::<&()>,
        )
        .await
    }

    pub async fn update_participant(
        &self,
        room_id: &str,
        participant_id: &str,
        updates: &[PatchOperation],
    ) -> Result<Participant> {
        self.call(
            Method::PATCH,
            self.rooms_url(&[room_id, "participants", participant_id])?,
            Some(updates),
        )
        .await
    }

    pub async fn drop_participant(&self, room_id: &str, participant_id: &str) -> Result<()> {
        self.call_text(
            Method::DELETE,
            self.rooms_url(&[room_id, "participants", participant_id])?,
            None::<&()>,
        )
        .await
        .map(drop)
    }

    pub async fn streams(&self, room_id: &str) -> Result<Vec<Stream>> {
        self.call(
            Method::GET,
            self.rooms_url(&[room_id, "streams"])?,
            None::<&()>,
        )
        .await
    }

    pub async fn stream(&self, room_id: &str, stream_id: &str) -> Result<Stream> {
        self.call(
            Method::GET,
            self.rooms_url(&[room_id, "streams", stream_id])?,
            None::<&()>,
        )
        .await
    }

    pub async fn update_stream(
        &self,
        room_id: &str,
        stream_id: &str,
        updates: &[PatchOperation],
    ) -> Result<Stream> {
        self.call(
            Method::PATCH,
            self.rooms_url(&[room_id, "streams", stream_id])?,
            Some(updates),
        )
        .await
    }

    pub async fn delete_stream(&self, room_id: &str, stream_id: &str) -> Result<()> {
        self.call_text(
            Method::DELETE,
            self.rooms_url(&[room_id, "streams", stream_id])?,
            None::<&()>,
        )
        .await
        .map(drop)
    }

    pub async fn start_streaming_in(
        &self,
        room_id: &str,
        request: &StreamingInRequest,
    ) -> Result<Stream> {
        self.call(
            Method::POST,
            self.rooms_url(&[room_id, "streaming-ins"])?,
            Some(request),
        )
        .await
    }

    pub async fn stop_streaming_in(&self, room_id: &str, stream_id: &str) -> Result<()> {
        self.call_text(
            Method::DELETE,
            self.rooms_url(&[room_id, "streaming-ins", stream_id])?,
            None::<&()>,
        )
        .await
        .map(drop)
    }

    pub async fn streaming_outs(&self, room_id: &str) -> Result<Vec<StreamingOut>> {
        self.call(
            Method::GET,
            self.rooms_url(&[room_id, "streaming-outs"])?,
            None::<&()>,
        )
        .await
    }

    pub async fn start_streaming_out(
        &self,
        room_id: &str,
        request: &StreamingOutRequest,
    ) -> Result<StreamingOut> {
        self.call(
            Method::POST,
            self.rooms_url(&[room_id, "streaming-outs"])?,
            Some(request),
        )
        .await
    }

    pub async fn update_streaming_out(
        &self,
        room_id: &str,
        out_id: &str,
        updates: &[PatchOperation],
    ) -> Result<StreamingOut> {
        self.call(
            Method::PATCH,
            self.rooms_url(&[room_id, "streaming-outs", out_id])?,
            Some(updates),
        )
        .await
    }

    pub async fn stop_streaming_out(&self, room_id: &str, out_id: &str) -> Result<()> {
        self.call_text(
            Method::DELETE,
            self.rooms_url(&[room_id, "streaming-outs", out_id])?,
            None::<&()>,
        )
        .await
        .map(drop)
    }

    pub async fn recordings(&self, room_id: &str) -> Result<Vec<Recording>> {
        self.call(
            Method::GET,
            self.rooms_url(&[room_id, "recordings"])?,
            None::<&()>,
        )
        .await
    }

    pub async fn start_recording(
        &self,
        room_id: &str,
        request: &RecordingRequest,
    ) -> Result<Recording> {
        self.call(
            Method::POST,
            self.rooms_url(&[room_id, "recordings"])?,
            Some(request),
        )
        .await
    }

    pub async fn update_recording(
        &self,
        room_id: &str,
        recording_id: &str,
        updates: &[PatchOperation],
    ) -> Result<Recording> {
        self.call(
            Method::PATCH,
            self.rooms_url(&[room_id, "recordings", recording_id])?,
            Some(updates),
        )
        .await
    }

    pub async fn stop_recording(&self, room_id: &str, recording_id: &str) -> Result<()> {
        self.call_text(
            Method::DELETE,
            self.rooms_url(&[room_id, "recordings", recording_id])?,
            None::<&()>,
        )
        .await
        .map(drop)
    }

    /// Issues a join token; the service returns it as plain text.
    pub async fn create_token(&self, room_id: &str, request: &CreateTokenRequest) -> Result<String> {
        self.call_text(
            Method::POST,
            self.rooms_url(&[room_id, "tokens"])?,
            Some(request),
        )
        .await
    }
}

/// Maps the finished exchange to the response text, or a `Status` error
/// outside `100..300`.
fn finish(method: &Method, path: &str, request: &HttpRequest) -> Result<String> {
    let status = request.status();

    #[cfg(feature = "tracing")]
    tracing::Span::current().record("status_code", status);

    let text = request.response_text();
    if (100..300).contains(&status) {
        return Ok(text);
    }

    #[cfg(feature = "tracing")]
    tracing::warn!(
        status,
        method = %method,
        path = %path,
        message = %text,
        "API request failed"
    );

    let status_code = StatusCode::from_u16(status)
        .map_err(|e| Error::validation(format!("invalid status code {status}: {e}")))?;
    let message = if text.is_empty() {
        request.status_text()
    } else {
        text
    };
    Err(Error::status(
        status_code,
        method.clone(),
        path.to_owned(),
        message,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> Client {
        let config = ClientConfig::new(Url::parse(base).expect("base URL"), None).expect("config");
        Client::new(config).expect("client")
    }

    #[test]
    fn rooms_url_escapes_reserved_characters_in_ids() {
        let client = client("http://localhost:3000/");

        let url = client.rooms_url(&["r1?x=1"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:3000/v1/rooms/r1%3Fx=1");
        assert_eq!(url.query(), None, "id must not start a query");

        let url = client
            .rooms_url(&["r#1", "participants", "a/b"])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/v1/rooms/r%231/participants/a%2Fb"
        );
        assert_eq!(url.fragment(), None, "id must not start a fragment");
    }

    #[test]
    fn rooms_url_keeps_base_path_prefix() {
        let client = client("http://localhost:3000/gateway/");

        let url = client.rooms_url(&["r1", "streams"]).expect("url");

        assert_eq!(url.path(), "/gateway/v1/rooms/r1/streams");
    }
}
