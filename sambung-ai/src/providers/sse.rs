use super::ProviderError;
use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fmt::Display;

impl<E> From<EventStreamError<E>> for ProviderError
where
    E: Into<ProviderError> + Display,
{
    fn from(err: EventStreamError<E>) -> Self {
        match err {
            EventStreamError::Transport(e) => e.into(),
            other => ProviderError::Stream(other.to_string()),
        }
    }
}

/// Server-sent events of a successful streaming response.
pub fn events(resp: reqwest::Response) -> BoxStream<'static, Result<Event, ProviderError>> {
    decode(resp.bytes_stream())
}

/// Split a raw byte stream into server-sent events.
///
/// Keep-alive frames with an empty payload and the OpenAI `[DONE]`
/// sentinel are dropped; callers only see events that carry data.
pub fn decode<S, E>(bytes: S) -> BoxStream<'static, Result<Event, ProviderError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ProviderError> + Display + Send + 'static,
{
    bytes
        .eventsource()
        .filter_map(|item| async move {
            match item {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() || data == "[DONE]" {
                        None
                    } else {
                        Some(Ok(event))
                    }
                }
                Err(e) => Some(Err(ProviderError::from(e))),
            }
        })
        .boxed()
}
