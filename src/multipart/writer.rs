//! Multipart body builder for RPC replies and the client.

use bytes::{Bytes, BytesMut};

pub struct MultipartWriter {
    boundary: String,
    body: BytesMut,
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartWriter {
    /// Writer with a random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("----remote-mux-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: BytesMut::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the Content-Type header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn text(&mut self, name: &str, value: &str) -> &mut Self {
        self.open_part(name, None);
        self.body.extend_from_slice(b"\r\n");
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Binary part. A `None` filename is written as the anonymous `blob`.
    pub fn binary(&mut self, name: &str, filename: Option<&str>, data: &[u8]) -> &mut Self {
        self.open_part(name, Some(filename.unwrap_or("blob")));
        self.body
            .extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Close the body.
    pub fn finish(mut self) -> Bytes {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"--\r\n");
        self.body.freeze()
    }

    fn open_part(&mut self, name: &str, filename: Option<&str>) {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"\r\nContent-Disposition: form-data; name=\"");
        self.body.extend_from_slice(escape(name).as_bytes());
        self.body.extend_from_slice(b"\"");
        if let Some(filename) = filename {
            self.body.extend_from_slice(b"; filename=\"");
            self.body.extend_from_slice(escape(filename).as_bytes());
            self.body.extend_from_slice(b"\"");
        }
        self.body.extend_from_slice(b"\r\n");
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::{Limits, MultipartDecoder};

    #[test]
    fn test_writer_output_decodes() {
        let mut writer = MultipartWriter::with_boundary("b0undary");
        writer
            .text("0", "{\"a\":1}")
            .binary("blob-0", None, &[9, 8, 7])
            .binary("doc", Some("say \"hi\".txt"), b"hi");
        assert_eq!(writer.content_type(), "multipart/form-data; boundary=b0undary");
        let body = writer.finish();

        let mut decoder = MultipartDecoder::new("b0undary", Limits::default());
        decoder.feed(&body).unwrap();
        let form = decoder.finish();

        assert!(form.is_complete());
        assert_eq!(form.text("0"), Some("{\"a\":1}"));
        assert_eq!(form.file("blob-0").unwrap().filename, None);
        assert_eq!(
            form.file("doc").unwrap().filename.as_deref(),
            Some("say \"hi\".txt")
        );
    }

    #[test]
    fn test_random_boundaries_differ() {
        assert_ne!(MultipartWriter::new().boundary(), MultipartWriter::new().boundary());
    }
}
