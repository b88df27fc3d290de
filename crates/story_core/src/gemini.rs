//! `TextGenerationService` backed by the Gemini `streamGenerateContent` endpoint.

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{
    future,
    stream::{self, Stream},
    StreamExt,
};
use reqwest::Client;
use serde::Deserialize;
use shared::{
    error::{ApiErrorEnvelope, ApiException, ErrorCode},
    protocol::{GenerateContentRequest, GenerateContentResponse},
};
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    config::GeminiConfig,
    service::{FragmentStream, GenerationError, GenerationRequest, TextGenerationService},
};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self::with_http_client(Client::new(), config)
    }

    pub fn with_http_client(http: Client, config: GeminiConfig) -> Self {
        Self { http, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> Result<Url, GenerationError> {
        let raw = format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.config.base_url.as_str().trim_end_matches('/'),
            self.config.model
        );
        let mut endpoint = Url::parse(&raw).map_err(|err| {
            GenerationError::Unavailable(format!("invalid generation endpoint '{raw}': {err}"))
        })?;
        endpoint.query_pairs_mut().append_pair("alt", "sse");
        Ok(endpoint)
    }
}

#[async_trait]
impl TextGenerationService for GeminiClient {
    async fn stream_generate(
        &self,
        request: GenerationRequest,
    ) -> Result<FragmentStream, GenerationError> {
        let endpoint = self.endpoint()?;
        let body = GenerateContentRequest::single_turn(request.prompt, request.system_instruction);

        debug!(model = %self.config.model, "starting streamed generation");
        let response = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "generation request rejected");
            return Err(api_failure(status.as_u16(), &raw).into());
        }

        Ok(fragment_stream(response.bytes_stream()))
    }
}

fn api_failure(status: u16, raw_body: &str) -> ApiException {
    match serde_json::from_str::<ApiErrorEnvelope>(raw_body) {
        Ok(envelope) => {
            let mut exception = ApiException::from(envelope.error);
            if exception.code == 0 {
                exception.code = status;
            }
            exception
        }
        Err(_) => ApiException {
            code: status,
            status: ErrorCode::from_http_status(status),
            message: raw_body.trim().to_string(),
        },
    }
}

/// Either an in-band error or an ordinary chunk. Error first: every field of a
/// chunk is optional, so a chunk would match anything.
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Failure(ApiErrorEnvelope),
    Chunk(GenerateContentResponse),
}

fn decode_payload(payload: &str) -> Result<String, GenerationError> {
    match serde_json::from_str::<StreamPayload>(payload)? {
        StreamPayload::Failure(envelope) => Err(ApiException::from(envelope.error).into()),
        StreamPayload::Chunk(chunk) => {
            if let Some(reason) = chunk.block_reason() {
                return Err(GenerationError::Blocked(reason.to_string()));
            }
            if let Some(reason) = chunk
                .candidates
                .first()
                .and_then(|candidate| candidate.finish_reason.as_deref())
            {
                debug!(finish_reason = reason, "generation finished");
            }
            let text = chunk.text();
            trace!(bytes = text.len(), "decoded stream chunk");
            Ok(text)
        }
    }
}

/// Appended to every body so an event the server left unterminated still dispatches.
const EVENT_TERMINATOR: &[u8] = b"\n\n";

/// Turns an SSE response body into fragments. The first error ends the stream.
pub(crate) fn fragment_stream<S, B>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + From<&'static [u8]> + Send + 'static,
{
    let events = body
        .chain(stream::once(future::ready(Ok(B::from(EVENT_TERMINATOR)))))
        .eventsource();

    let fragments = events
        .filter_map(|event| {
            future::ready(match event {
                // Comments and bare field lines carry no payload.
                Ok(event) if event.data.is_empty() => None,
                Ok(event) => Some(decode_payload(&event.data)),
                Err(EventStreamError::Transport(err)) => Some(Err(GenerationError::Transport(err))),
                Err(err) => Some(Err(GenerationError::EventStream(err.to_string()))),
            })
        })
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        });

    Box::pin(fragments)
}

#[cfg(test)]
#[path = "tests/gemini_tests.rs"]
mod tests;
