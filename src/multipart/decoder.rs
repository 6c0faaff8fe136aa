//! Incremental multipart/form-data decoder.
//!
//! # Responsibilities
//! - Split a streamed body into parts on `--boundary` delimiters
//! - Parse each part's header block and `Content-Disposition` parameters
//! - Enforce request and field size limits while bytes arrive
//!
//! # Design Decisions
//! - Sans-IO core (`feed`/`finish`); `parse_stream` is a thin async driver
//! - In the body state everything except a delimiter-length tail moves to
//!   the part accumulator, so memory stays bounded by the largest field
//! - Missing closing delimiter is reported through `FormData::is_complete`

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::multipart::buffer::ScratchBuffer;
use crate::multipart::form::{FieldValue, FilePart, FormData};
use crate::multipart::{BoxError, Limits, MultipartError};

/// Header blocks larger than this are rejected.
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
const CLOSE: &[u8] = b"--";
const INITIAL_CAPACITY: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for the first delimiter; preamble bytes are discarded.
    Searching,
    /// Just consumed a delimiter; `--` closes, CRLF opens a part.
    AfterDelimiter,
    Headers,
    Body,
    Done,
}

/// Outcome of one `feed` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NeedMore,
    Done,
}

#[derive(Debug, Default)]
struct PartHead {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
}

#[derive(Debug)]
pub struct MultipartDecoder {
    delimiter: Vec<u8>,
    body_delimiter: Vec<u8>,
    limits: Limits,
    state: State,
    buffer: ScratchBuffer,
    head: PartHead,
    part: BytesMut,
    received: usize,
    form: FormData,
}

impl MultipartDecoder {
    pub fn new(boundary: &str, limits: Limits) -> Self {
        let delimiter = [CLOSE, boundary.as_bytes()].concat();
        let body_delimiter = [CRLF, delimiter.as_slice()].concat();
        Self {
            delimiter,
            body_delimiter,
            limits,
            state: State::Searching,
            buffer: ScratchBuffer::with_capacity(INITIAL_CAPACITY),
            head: PartHead::default(),
            part: BytesMut::new(),
            received: 0,
            form: FormData::new(),
        }
    }

    /// Feed the next chunk of the body.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Progress, MultipartError> {
        if self.state == State::Done {
            return Ok(Progress::Done);
        }

        self.received += chunk.len();
        if self.limits.max_request_size > 0 && self.received > self.limits.max_request_size {
            return Err(MultipartError::RequestTooLarge {
                limit: self.limits.max_request_size,
            });
        }

        self.buffer.extend(chunk);
        let progress = self.advance()?;
        self.buffer.compact();
        Ok(progress)
    }

    /// Consume the decoder. Without a closing delimiter the form is flagged
    /// incomplete and any half-read part is dropped. An empty body is an
    /// empty, complete form.
    pub fn finish(mut self) -> FormData {
        if self.received == 0 {
            self.form.mark_complete();
        }
        self.form
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    fn advance(&mut self) -> Result<Progress, MultipartError> {
        loop {
            match self.state {
                State::Searching => {
                    let data = self.buffer.data();
                    match find(data, &self.delimiter) {
                        Some(at) => {
                            self.buffer.consume(at + self.delimiter.len());
                            self.state = State::AfterDelimiter;
                        }
                        None => {
                            let keep = self.delimiter.len() - 1;
                            let drop = data.len().saturating_sub(keep);
                            self.buffer.consume(drop);
                            return Ok(Progress::NeedMore);
                        }
                    }
                }
                State::AfterDelimiter => {
                    let data = self.buffer.data();
                    if data.len() < 2 {
                        return Ok(Progress::NeedMore);
                    }
                    if data.starts_with(CLOSE) {
                        self.state = State::Done;
                        self.form.mark_complete();
                        return Ok(Progress::Done);
                    }
                    if data.starts_with(CRLF) {
                        self.buffer.consume(CRLF.len());
                    }
                    self.state = State::Headers;
                }
                State::Headers => {
                    let data = self.buffer.data();
                    if data.starts_with(CRLF) {
                        self.buffer.consume(CRLF.len());
                        self.head = PartHead::default();
                        self.state = State::Body;
                        continue;
                    }
                    match find(data, HEADER_END) {
                        Some(at) if at > MAX_HEADER_SIZE => {
                            return Err(MultipartError::HeaderTooLarge {
                                limit: MAX_HEADER_SIZE,
                            })
                        }
                        Some(at) => {
                            self.head = parse_part_head(&String::from_utf8_lossy(&data[..at]));
                            self.buffer.consume(at + HEADER_END.len());
                            self.state = State::Body;
                        }
                        None if data.len() > MAX_HEADER_SIZE + HEADER_END.len() => {
                            return Err(MultipartError::HeaderTooLarge {
                                limit: MAX_HEADER_SIZE,
                            })
                        }
                        None => return Ok(Progress::NeedMore),
                    }
                }
                State::Body => {
                    let data = self.buffer.data();
                    match find(data, &self.body_delimiter) {
                        Some(at) => {
                            self.part.extend_from_slice(&data[..at]);
                            self.check_field_size()?;
                            self.buffer.consume(at + self.body_delimiter.len());
                            self.finish_part()?;
                            self.state = State::AfterDelimiter;
                        }
                        None => {
                            let keep = self.body_delimiter.len() - 1;
                            let safe = data.len().saturating_sub(keep);
                            self.part.extend_from_slice(&data[..safe]);
                            self.buffer.consume(safe);
                            self.check_field_size()?;
                            return Ok(Progress::NeedMore);
                        }
                    }
                }
                State::Done => return Ok(Progress::Done),
            }
        }
    }

    fn check_field_size(&self) -> Result<(), MultipartError> {
        let limit = self.limits.max_field_size;
        if limit > 0 && self.part.len() > limit {
            return Err(MultipartError::FieldTooLarge {
                name: self.head.name.clone().unwrap_or_default(),
                limit,
            });
        }
        Ok(())
    }

    fn finish_part(&mut self) -> Result<(), MultipartError> {
        let head = std::mem::take(&mut self.head);
        let data = self.part.split().freeze();

        let name = match head.name {
            Some(name) if !name.is_empty() => name,
            _ => return Ok(()),
        };

        let value = match head.filename {
            Some(filename) => FieldValue::File(FilePart {
                data,
                filename: match filename.as_str() {
                    "" | "blob" => None,
                    _ => Some(filename),
                },
                content_type: head.content_type,
            }),
            None => match String::from_utf8(data.to_vec()) {
                Ok(text) => FieldValue::Text(text),
                Err(_) => return Err(MultipartError::InvalidText { name }),
            },
        };

        self.form.insert(name, value);
        Ok(())
    }
}

/// Drive a decoder from a byte stream until the closing delimiter or the end
/// of the stream.
pub async fn parse_stream<S, E>(
    stream: S,
    boundary: &str,
    limits: Limits,
) -> Result<FormData, MultipartError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let mut decoder = MultipartDecoder::new(boundary, limits);
    let mut stream = std::pin::pin!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| MultipartError::Stream(e.into()))?;
        if decoder.feed(&chunk)? == Progress::Done {
            break;
        }
    }

    Ok(decoder.finish())
}

/// Extract the `boundary` parameter of a multipart Content-Type.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.splitn(2, ';');
    let _media_type = params.next()?;
    parse_params(params.next().unwrap_or(""))
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn parse_part_head(block: &str) -> PartHead {
    let mut head = PartHead::default();
    for line in block.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            let rest = value.split_once(';').map(|(_, rest)| rest).unwrap_or("");
            for (param, param_value) in parse_params(rest) {
                if param.eq_ignore_ascii_case("name") {
                    head.name = Some(param_value);
                } else if param.eq_ignore_ascii_case("filename") {
                    head.filename = Some(param_value);
                }
            }
        } else if key.eq_ignore_ascii_case("content-type") {
            head.content_type = Some(value.to_string());
        }
    }
    head
}

/// Parse `; key=value; key="quoted \" value"` parameter lists.
pub(crate) fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ';' || c.is_whitespace()) {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() && chars.peek().is_none() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        _ => value.push(c),
                    }
                }
                while matches!(chars.peek(), Some(c) if *c != ';') {
                    chars.next();
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ';' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }

        let key = key.trim();
        if !key.is_empty() {
            out.push((key.to_string(), value));
        }
    }

    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
