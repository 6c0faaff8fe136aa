//! HTTP client for remote functions and the event stream.
//!
//! # Responsibilities
//! - Encode arguments (primitives as text, everything else as envelopes
//!   sharing one blob counter per call) into a multipart request
//! - Interpret replies by Content-Type and `Data-Type`
//! - Follow an SSE endpoint and yield decoded frames
//!
//! # Design Decisions
//! - Built on `reqwest`; multipart replies reuse the crate's own decoder
//! - Status >= 400 is always an error carrying the server's text

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;

use crate::codec::{self, blob_field_name, Blob, CodecError, Encoder, Value};
use crate::multipart::{self, Limits, MultipartError};
use crate::remote::wire::{TypeHint, HEADER_DATA_TYPE, HEADER_FUNC_NAME, HEADER_PARAM_TYPES, RESULT_FIELD};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("invalid header \"{0}\"")]
    InvalidHeader(String),
}

/// One frame of the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFrame {
    Heartbeat,
    Event(Value),
}

#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl RemoteClient {
    /// Client for the RPC endpoint at `endpoint` (e.g. `http://host/remote`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Header sent with every call (for example an API key).
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ClientError> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
        self.headers.insert(header, value);
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke `name` with positional `args`.
    pub async fn call(&self, name: &str, args: &[Value]) -> Result<Value, ClientError> {
        let mut encoder = Encoder::new();
        let mut hints = Vec::with_capacity(args.len());
        let mut form = Form::new();

        for (index, arg) in args.iter().enumerate() {
            hints.push(TypeHint::for_value(arg));
            let text = match arg.to_primitive_text() {
                Some(text) => text,
                None => encoder.encode(arg)?,
            };
            form = form.text(index.to_string(), text);
        }
        for (index, blob) in encoder.into_blobs().into_iter().enumerate() {
            let filename = blob.filename().unwrap_or("blob").to_string();
            let part = Part::bytes(blob.into_bytes().to_vec())
                .file_name(filename)
                .mime_str("application/octet-stream")?;
            form = form.part(blob_field_name(index), part);
        }

        tracing::debug!(function = %name, args = args.len(), "Calling remote function");

        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(HEADER_FUNC_NAME, name)
            .header(HEADER_PARAM_TYPES, TypeHint::to_header(&hints))
            .multipart(form)
            .send()
            .await?;

        decode_reply(response).await
    }

    /// Follow the event stream at `url`.
    pub async fn events(&self, url: &str) -> Result<BoxStream<'static, Result<EventFrame, ClientError>>, ClientError> {
        let response = self.http.get(url).headers(self.headers.clone()).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ClientError::Remote {
                status: status.as_u16(),
                message: response.text().await?,
            });
        }

        struct State {
            body: BoxStream<'static, reqwest::Result<Bytes>>,
            buffer: Vec<u8>,
            done: bool,
        }

        let state = State {
            body: response.bytes_stream().boxed(),
            buffer: Vec::new(),
            done: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            loop {
                if let Some(end) = find_frame_end(&state.buffer) {
                    let frame: Vec<u8> = state.buffer.drain(..end + 2).collect();
                    let text = String::from_utf8_lossy(&frame[..end]).into_owned();
                    return Some((parse_frame(&text), state));
                }
                if state.done {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                    Some(Err(err)) => {
                        state.done = true;
                        return Some((Err(ClientError::Http(err)), state));
                    }
                    None => state.done = true,
                }
            }
        })
        .boxed())
    }
}

async fn decode_reply(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(ClientError::Remote {
            status: status.as_u16(),
            message: response.text().await?,
        });
    }
    if !status.is_success() || status == StatusCode::NO_CONTENT {
        return Ok(Value::Undefined);
    }

    let header = |name: &HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let content_type = header(&CONTENT_TYPE);
    let data_type = header(&HeaderName::from_static(HEADER_DATA_TYPE));
    let disposition = header(&CONTENT_DISPOSITION);

    if content_type.starts_with("multipart/form-data") {
        let boundary = multipart::boundary_from_content_type(&content_type)
            .ok_or_else(|| ClientError::MalformedReply("multipart reply without boundary".into()))?;
        let form = multipart::parse_stream(response.bytes_stream(), &boundary, Limits::default()).await?;
        let json = form
            .text(RESULT_FIELD)
            .ok_or_else(|| ClientError::MalformedReply("multipart reply without result field".into()))?;
        return Ok(codec::decode(json, &form)?);
    }

    if data_type == "binary" {
        let filename = multipart::decoder::parse_params(disposition.split_once(';').map(|(_, p)| p).unwrap_or(""))
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("filename"))
            .map(|(_, value)| value);
        let data = response.bytes().await?;
        return Ok(Value::Binary(match filename {
            Some(name) => Blob::file(name, data),
            None => Blob::new(data),
        }));
    }

    let text = response.text().await?;
    Ok(match data_type.as_str() {
        "object" => codec::decode_plain(&text)?,
        "number" => Value::Number(codec::value::parse_number(&text).unwrap_or(f64::NAN)),
        "boolean" => Value::Bool(text == "true"),
        "null" => Value::Null,
        "undefined" => Value::Undefined,
        _ => Value::String(text),
    })
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(frame: &str) -> Result<EventFrame, ClientError> {
    let payload: String = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .collect::<Vec<_>>()
        .join("\n");
    if payload == "pong" {
        return Ok(EventFrame::Heartbeat);
    }
    Ok(EventFrame::Event(codec::decode_plain(&payload)?))
}
