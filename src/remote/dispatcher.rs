//! "Call function by name" over multipart/form-data.
//!
//! # Responsibilities
//! - Validate Content-Type, boundary, type hints and function name
//! - Stream the body through the multipart decoder under size limits
//! - Coerce positional fields into `Value` arguments
//! - Invoke the function and encode its result as the reply
//!
//! # Design Decisions
//! - Mounted as middleware: non-POST requests fall through to the mux
//! - Every failure becomes a plain-text reply; nothing escapes the call
//! - A body cut off before the closing boundary is logged and the call
//!   proceeds with the fields that were completed
//! - The side-channel status/headers apply to success and error replies

use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::codec::{self, CodecError, Value};
use crate::http::request::Request;
use crate::http::response;
use crate::multipart::{self, FieldValue, FormData, Limits, MultipartError};
use crate::observability::metrics;
use crate::remote::context::{CallContext, RemoteError};
use crate::remote::registry::{FunctionRegistry, RemoteFunction};
use crate::remote::wire::{
    file_blob, multipart_body, TypeHint, HEADER_DATA_TYPE, HEADER_FUNC_NAME, HEADER_PARAM_TYPES,
};
use crate::routing::{Flow, Middleware};

/// Failures of one RPC call, each mapped to a status and a text body.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Content-type must be \"multipart/form-data\"")]
    NotMultipart,

    #[error("Missing boundary")]
    MissingBoundary,

    #[error("Function parameter data types invalid")]
    InvalidTypeHints,

    #[error("Function \"{0}\" not found")]
    FunctionNotFound(String),

    #[error("{0}")]
    Multipart(#[from] MultipartError),

    #[error("Argument {0} has no declared data type")]
    UndeclaredArgument(usize),

    #[error("Argument {index} is not a number: \"{text}\"")]
    InvalidNumber { index: usize, text: String },

    #[error("Argument {index} could not be decoded: {source}")]
    InvalidArgument {
        index: usize,
        #[source]
        source: CodecError,
    },

    #[error("{0}")]
    Function(RemoteError),

    #[error("Result could not be encoded: {0}")]
    Encode(CodecError),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::FunctionNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Function(err) => err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            DispatchError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Application faults whose status the side-channel may override.
    fn is_application(&self) -> bool {
        matches!(self, DispatchError::Function(_) | DispatchError::Encode(_))
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        response::text(self.status(), self.to_string())
    }
}

/// Middleware answering POST requests with remote function calls.
#[derive(Clone)]
pub struct RemoteDispatcher {
    registry: Arc<FunctionRegistry>,
    limits: Limits,
}

impl RemoteDispatcher {
    pub fn new(registry: FunctionRegistry, limits: Limits) -> Self {
        Self {
            registry: Arc::new(registry),
            limits,
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }
}

impl Middleware for RemoteDispatcher {
    fn call(&self, request: Request) -> BoxFuture<'static, Flow> {
        if request.method() != Method::POST {
            return Box::pin(async move { Flow::Next(request) });
        }
        let registry = self.registry.clone();
        let limits = self.limits;
        Box::pin(async move { Flow::Respond(handle_call(&registry, limits, request).await) })
    }
}

/// Validated call headers.
struct CallTarget {
    name: String,
    boundary: String,
    hints: Vec<TypeHint>,
    function: Arc<dyn RemoteFunction>,
}

async fn handle_call(registry: &FunctionRegistry, limits: Limits, mut request: Request) -> Response {
    let start = Instant::now();

    let target = match resolve_target(registry, &request) {
        Ok(target) => target,
        Err(err) => {
            tracing::warn!(
                request_id = %request.request_id(),
                error = %err,
                "Rejected remote call"
            );
            metrics::record_remote_call("unknown", err.status().as_u16(), start);
            return err.into_response();
        }
    };

    tracing::debug!(
        request_id = %request.request_id(),
        function = %target.name,
        args = target.hints.len(),
        "Dispatching remote call"
    );

    let ctx = CallContext::new(&request);
    let body = request.take_body().unwrap_or_default();
    let outcome = invoke(&target, limits, body, &ctx).await;
    let parts = ctx.take_response_parts();

    let mut reply = match outcome {
        Ok(mut reply) => {
            if let Some(status) = parts.status {
                *reply.status_mut() = status;
            }
            reply
        }
        Err(err) => {
            let status = match (&err, parts.status) {
                (DispatchError::Function(e), _) if e.status().is_some() => err.status(),
                (_, Some(status)) if err.is_application() => status,
                _ => err.status(),
            };
            if status.is_server_error() {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    function = %target.name,
                    status = status.as_u16(),
                    error = %err,
                    "Remote call failed"
                );
            } else {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    function = %target.name,
                    status = status.as_u16(),
                    error = %err,
                    "Remote call rejected"
                );
            }
            response::text(status, err.to_string())
        }
    };

    reply.headers_mut().extend(parts.headers);
    metrics::record_remote_call(&target.name, reply.status().as_u16(), start);
    reply
}

fn resolve_target(registry: &FunctionRegistry, request: &Request) -> Result<CallTarget, DispatchError> {
    let content_type = request.header(header::CONTENT_TYPE.as_str()).unwrap_or("");
    if !content_type.starts_with("multipart/form-data") {
        return Err(DispatchError::NotMultipart);
    }
    let boundary =
        multipart::boundary_from_content_type(content_type).ok_or(DispatchError::MissingBoundary)?;

    let hints = request
        .header(HEADER_PARAM_TYPES)
        .and_then(TypeHint::parse_list)
        .ok_or(DispatchError::InvalidTypeHints)?;

    let name = request.header(HEADER_FUNC_NAME).unwrap_or("").to_string();
    let function = registry
        .get(&name)
        .ok_or_else(|| DispatchError::FunctionNotFound(name.clone()))?;

    Ok(CallTarget {
        name,
        boundary,
        hints,
        function,
    })
}

async fn invoke(
    target: &CallTarget,
    limits: Limits,
    body: axum::body::Body,
    ctx: &CallContext,
) -> Result<Response, DispatchError> {
    let form = multipart::parse_stream(body.into_data_stream(), &target.boundary, limits).await?;
    if !form.is_complete() {
        tracing::warn!(
            request_id = %ctx.request_id(),
            function = %target.name,
            fields = form.len(),
            "Request body ended before the closing boundary"
        );
    }

    let args = build_args(&form, &target.hints)?;
    let result = target
        .function
        .call(ctx.clone(), args)
        .await
        .map_err(DispatchError::Function)?;

    encode_reply(&result)
}

/// Positional arguments from numerically named fields. `blob-N` and other
/// non-numeric fields are not arguments.
pub fn build_args(form: &FormData, hints: &[TypeHint]) -> Result<Vec<Value>, DispatchError> {
    let mut args = vec![Value::Undefined; hints.len()];

    for field in form {
        let Ok(index) = field.name.parse::<usize>() else {
            continue;
        };
        let hint = *hints.get(index).ok_or(DispatchError::UndeclaredArgument(index))?;

        args[index] = match &field.value {
            FieldValue::File(file) => Value::Binary(file_blob(file)),
            FieldValue::Text(text) => coerce(index, text, hint, form)?,
        };
    }

    Ok(args)
}

fn coerce(index: usize, text: &str, hint: TypeHint, form: &FormData) -> Result<Value, DispatchError> {
    Ok(match hint {
        TypeHint::String => Value::String(text.to_string()),
        TypeHint::Number => codec::value::parse_number(text)
            .map(Value::Number)
            .ok_or_else(|| DispatchError::InvalidNumber {
                index,
                text: text.to_string(),
            })?,
        TypeHint::Boolean => Value::Bool(text == "true"),
        TypeHint::Null => Value::Null,
        TypeHint::Undefined => Value::Undefined,
        TypeHint::Object => codec::decode(text, form)
            .map_err(|source| DispatchError::InvalidArgument { index, source })?,
    })
}

/// Reply for a function result.
///
/// Scalars are `text/plain`, composites `application/json`, a root blob
/// `application/octet-stream`; results holding nested blobs are multipart.
pub fn encode_reply(value: &Value) -> Result<Response, DispatchError> {
    let data_type = HeaderName::from_static(HEADER_DATA_TYPE);

    if let Value::Binary(blob) = value {
        let mut reply = (
            [
                (header::CONTENT_TYPE, "application/octet-stream"),
                (data_type, value.type_name()),
            ],
            blob.data().clone(),
        )
            .into_response();
        if let Some(filename) = blob.filename() {
            let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "\\\""));
            if let Ok(disposition) = HeaderValue::from_str(&disposition) {
                reply.headers_mut().insert(header::CONTENT_DISPOSITION, disposition);
            }
        }
        return Ok(reply);
    }

    if let Some(text) = value.to_primitive_text() {
        return Ok((
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (data_type, value.type_name()),
            ],
            text,
        )
            .into_response());
    }

    let encoded = codec::encode(value).map_err(DispatchError::Encode)?;
    let (content_type, body) = if encoded.blobs.is_empty() {
        ("application/json".to_string(), Bytes::from(encoded.json))
    } else {
        multipart_body(&encoded)
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (data_type, value.type_name().to_string()),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Blob;
    use crate::multipart::MultipartWriter;
    use crate::remote::registry::RemoteResult;

    async fn add(_ctx: CallContext, args: Vec<Value>) -> RemoteResult {
        let a = args.first().and_then(Value::as_f64).unwrap_or(0.0);
        let b = args.get(1).and_then(Value::as_f64).unwrap_or(0.0);
        Ok(Value::Number(a + b))
    }

    async fn echo(_ctx: CallContext, args: Vec<Value>) -> RemoteResult {
        Ok(args.into_iter().next().unwrap_or(Value::Undefined))
    }

    async fn fail(ctx: CallContext, _args: Vec<Value>) -> RemoteResult {
        ctx.set_header("x-trace", "failed");
        ctx.set_status(409);
        Err(RemoteError::new("already exists"))
    }

    fn dispatcher() -> RemoteDispatcher {
        let registry = FunctionRegistry::builder()
            .register("add", add)
            .unwrap()
            .register("echo", echo)
            .unwrap()
            .register("fail", fail)
            .unwrap()
            .build();
        RemoteDispatcher::new(registry, Limits::default())
    }

    fn call_request(name: &str, hints: &str, writer: MultipartWriter) -> Request {
        let content_type = writer.content_type();
        Request::new(Method::POST, "/remote")
            .with_header("content-type", &content_type)
            .with_header(HEADER_FUNC_NAME, name)
            .with_header(HEADER_PARAM_TYPES, hints)
            .with_body(writer.finish())
    }

    async fn respond(request: Request) -> Response {
        match dispatcher().call(request).await {
            Flow::Respond(response) => response,
            Flow::Next(_) => panic!("dispatcher passed a POST through"),
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_add_numbers() {
        let mut writer = MultipartWriter::new();
        writer.text("0", "3").text("1", "4");
        let response = respond(call_request("add", r#"["number","number"]"#, writer)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_DATA_TYPE], "number");
        assert_eq!(body_text(response).await, "7");
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let mut writer = MultipartWriter::new();
        writer.text("0", "1");
        let response = respond(call_request("missing_fn", r#"["number"]"#, writer)).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("missing_fn"));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let request = Request::new(Method::POST, "/remote")
            .with_header("content-type", "application/json")
            .with_header(HEADER_FUNC_NAME, "add");
        let response = respond(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Content-type must be \"multipart/form-data\"");

        let request = Request::new(Method::POST, "/remote")
            .with_header("content-type", "multipart/form-data")
            .with_header(HEADER_FUNC_NAME, "add");
        assert_eq!(body_text(respond(request).await).await, "Missing boundary");

        let response = respond(call_request("add", "number", MultipartWriter::new())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Function parameter data types invalid");

        let mut writer = MultipartWriter::new();
        writer.text("0", "abc");
        let response = respond(call_request("add", r#"["number"]"#, writer)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut writer = MultipartWriter::new();
        writer.text("0", "1").text("1", "2");
        let response = respond(call_request("add", r#"["number"]"#, writer)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_post_passes_through() {
        let flow = dispatcher().call(Request::new(Method::GET, "/remote")).await;
        assert!(matches!(flow, Flow::Next(_)));
    }

    #[tokio::test]
    async fn test_truncated_body_uses_completed_fields() {
        let content_type = "multipart/form-data; boundary=B";
        let request = Request::new(Method::POST, "/remote")
            .with_header("content-type", content_type)
            .with_header(HEADER_FUNC_NAME, "add")
            .with_header(HEADER_PARAM_TYPES, r#"["number","number"]"#)
            .with_body(
                "--B\r\nContent-Disposition: form-data; name=\"0\"\r\n\r\n4\r\n\
                 --B\r\nContent-Disposition: form-data; name=\"1\"\r\n\r\n5",
            );
        let response = respond(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "4");
    }

    #[tokio::test]
    async fn test_empty_body_calls_without_arguments() {
        let request = Request::new(Method::POST, "/remote")
            .with_header("content-type", "multipart/form-data; boundary=B")
            .with_header(HEADER_FUNC_NAME, "echo")
            .with_header(HEADER_PARAM_TYPES, "[]");
        let response = respond(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_DATA_TYPE], "undefined");
    }

    #[tokio::test]
    async fn test_side_channel_on_error() {
        let response = respond(call_request("fail", "[]", MultipartWriter::new())).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()["x-trace"], "failed");
        assert_eq!(body_text(response).await, "already exists");
    }

    #[tokio::test]
    async fn test_object_argument_with_blob() {
        let mut writer = MultipartWriter::new();
        writer
            .text("0", r#"{"name":"pic","data":{"__b":0},"tags":{"__t":"Set","v":["a"]}}"#)
            .binary("blob-0", Some("pic.png"), &[1, 2, 3, 4, 5]);
        let response = respond(call_request("echo", r#"["object"]"#, writer)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_DATA_TYPE], "object");
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        let boundary = multipart::boundary_from_content_type(&content_type).unwrap();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut decoder = multipart::MultipartDecoder::new(&boundary, Limits::default());
        decoder.feed(&bytes).unwrap();
        let form = decoder.finish();

        let value = codec::decode(form.text("0").unwrap(), &form).unwrap();
        assert_eq!(value.get("name"), Some(&Value::from("pic")));
        assert_eq!(
            value.get("data"),
            Some(&Value::Binary(Blob::file("pic.png", vec![1u8, 2, 3, 4, 5])))
        );
        assert_eq!(value.get("tags"), Some(&Value::Set(vec!["a".into()])));
    }

    #[test]
    fn test_reply_shapes() {
        let reply = encode_reply(&Value::from(false)).unwrap();
        assert_eq!(reply.headers()[HEADER_DATA_TYPE], "boolean");

        let reply = encode_reply(&Value::from("false")).unwrap();
        assert_eq!(reply.headers()[HEADER_DATA_TYPE], "string");

        let reply = encode_reply(&Value::Array(vec![1.into()])).unwrap();
        assert_eq!(reply.headers()[header::CONTENT_TYPE], "application/json");

        let reply = encode_reply(&Blob::file("a.txt", vec![1u8]).into()).unwrap();
        assert_eq!(reply.headers()[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(reply.headers()[HEADER_DATA_TYPE], "binary");
        assert_eq!(
            reply.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"a.txt\""
        );
    }

    #[test]
    fn test_missing_positions_are_undefined() {
        let mut form = FormData::new();
        form.insert("1", FieldValue::Text("x".into()));
        let args = build_args(&form, &[TypeHint::Number, TypeHint::String]).unwrap();
        assert_eq!(args, vec![Value::Undefined, Value::from("x")]);
    }
}
