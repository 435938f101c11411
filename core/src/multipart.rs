//! `multipart/form-data` bodies for POST/PUT calls.
//!
//! Parts are kept as structured data until a transport asks for the wire
//! bytes, so tests can inspect field names, filenames and MIME types
//! directly.

use uuid::Uuid;

/// Fallback MIME type for uploads with an unknown extension.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extension to MIME type mapping, `(extension, mime_type)`.
const EXTENSION_MIME_MAPPINGS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
];

/// Guess a MIME type from a file name's extension.
pub fn guess_mime(file_name: &str) -> &'static str {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return OCTET_STREAM;
    };
    let ext = ext.to_ascii_lowercase();
    EXTENSION_MIME_MAPPINGS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

/// Content of a single form part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartContent {
    Text(String),
    File {
        file_name: String,
        content_type: String,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub content: PartContent,
}

/// A `multipart/form-data` body with a random boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("etsy-{}", Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            content: PartContent::Text(value.into()),
        });
        self
    }

    /// Add a file part; the MIME type is guessed from `file_name`.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        let file_name = file_name.into();
        let content_type = guess_mime(&file_name).to_string();
        self.parts.push(Part {
            name: name.into(),
            content: PartContent::File {
                file_name,
                content_type,
                data,
            },
        });
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match &part.content {
                PartContent::Text(value) => {
                    let name = escape_quoted(&part.name);
                    let header = format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n");
                    out.extend_from_slice(header.as_bytes());
                    out.extend_from_slice(value.as_bytes());
                }
                PartContent::File {
                    file_name,
                    content_type,
                    data,
                } => {
                    let name = escape_quoted(&part.name);
                    let file_name = escape_quoted(file_name);
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; \
                             filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(data);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
