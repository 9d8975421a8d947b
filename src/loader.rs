//! Document loading from files, strings, and HTTP URLs.
//!
//! The resolver never reads bytes itself: it asks a [`Fetcher`] for a
//! parsed [`Document`]. [`FsFetcher`], [`HttpFetcher`] and
//! [`DefaultFetcher`] cover the common cases; any
//! `Fn(&str) -> Result<Document, FetchError>` works too.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::FetchError;
use crate::refs::is_url;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A fetched document: parsed JSON/YAML, or raw text for anything else.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Json(Value),
    Text(String),
}

impl Document {
    /// Text documents become a JSON string value.
    pub fn into_value(self) -> Value {
        match self {
            Document::Json(value) => value,
            Document::Text(text) => Value::String(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Document::Json(value) => Some(value),
            Document::Text(_) => None,
        }
    }
}

/// Text format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
    Text,
}

impl DocumentFormat {
    /// Guess the format from a file name or URL path.
    pub fn from_source(source: &str) -> Self {
        let path = source.split(['?', '#']).next().unwrap_or(source);
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".json") {
            DocumentFormat::Json
        } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            DocumentFormat::Yaml
        } else {
            DocumentFormat::Text
        }
    }
}

/// Loads a document by its file identity.
///
/// A rejection is treated as "unresolvable" by the resolver, never as fatal.
pub trait Fetcher: Sync {
    fn fetch(&self, source: &str) -> Result<Document, FetchError>;
}

impl<F> Fetcher for F
where
    F: Fn(&str) -> Result<Document, FetchError> + Sync,
{
    fn fetch(&self, source: &str) -> Result<Document, FetchError> {
        self(source)
    }
}

/// Reads documents from disk, relative to `root`.
#[derive(Debug, Clone, Default)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Fetcher for FsFetcher {
    fn fetch(&self, source: &str) -> Result<Document, FetchError> {
        load_document(&self.root.join(source))
    }
}

/// Fetches documents over HTTP(S).
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| FetchError::NetworkError {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "remote")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, source: &str) -> Result<Document, FetchError> {
        fetch_url(&self.client, source)
    }
}

/// Routes URLs to HTTP and everything else to the filesystem.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    fs: FsFetcher,
    #[cfg(feature = "remote")]
    http: Option<HttpFetcher>,
}

impl DefaultFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            fs: FsFetcher::new(root),
            #[cfg(feature = "remote")]
            http: HttpFetcher::new().ok(),
        }
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, source: &str) -> Result<Document, FetchError> {
        if !is_url(source) {
            return self.fs.fetch(source);
        }
        #[cfg(feature = "remote")]
        {
            match &self.http {
                Some(http) => http.fetch(source),
                None => load_document_url(source),
            }
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(FetchError::RemoteDisabled {
                url: source.to_string(),
            })
        }
    }
}

/// Load a document from a file path.
///
/// `.json` is parsed as JSON, `.yaml`/`.yml` as YAML, anything else is
/// returned as raw text.
///
/// # Errors
///
/// Returns `FetchError::FileNotFound` if the file doesn't exist,
/// or a parse error if the content doesn't match its extension.
pub fn load_document(path: &Path) -> Result<Document, FetchError> {
    if !path.exists() {
        return Err(FetchError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| FetchError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let source_id = path.display().to_string();
    parse_document(&content, DocumentFormat::from_source(&source_id), &source_id)
}

/// Load a document from a string in the given format.
///
/// # Errors
///
/// Returns `FetchError::InvalidJson` / `InvalidYaml` if the string doesn't parse.
pub fn load_document_str(content: &str, format: DocumentFormat) -> Result<Document, FetchError> {
    parse_document(content, format, "<string>")
}

/// Load a document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `FetchError::NetworkError` if the request fails or the server
/// answers with an error status.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Document, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| FetchError::NetworkError {
            url: url.to_string(),
            source,
        })?;
    fetch_url(&client, url)
}

/// Load a document from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
pub fn load_document_auto(source: &str) -> Result<Document, FetchError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(FetchError::RemoteDisabled {
                url: source.to_string(),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

#[cfg(feature = "remote")]
fn fetch_url(client: &reqwest::blocking::Client, url: &str) -> Result<Document, FetchError> {
    let network_error = |source| FetchError::NetworkError {
        url: url.to_string(),
        source,
    };

    let response = client.get(url).send().map_err(network_error)?;

    // Check for HTTP errors before parsing
    let response = response.error_for_status().map_err(network_error)?;
    let body = response.text().map_err(network_error)?;

    match DocumentFormat::from_source(url) {
        DocumentFormat::Text => Ok(serde_json::from_str(&body)
            .map(Document::Json)
            .unwrap_or(Document::Text(body))),
        format => parse_document(&body, format, url),
    }
}

fn parse_document(
    content: &str,
    format: DocumentFormat,
    source_id: &str,
) -> Result<Document, FetchError> {
    match format {
        DocumentFormat::Json => serde_json::from_str(content)
            .map(Document::Json)
            .map_err(|source| FetchError::InvalidJson {
                source_id: source_id.to_string(),
                source,
            }),
        DocumentFormat::Yaml => serde_yaml::from_str(content)
            .map(Document::Json)
            .map_err(|source| FetchError::InvalidYaml {
                source_id: source_id.to_string(),
                source,
            }),
        DocumentFormat::Text => Ok(Document::Text(content.to_string())),
    }
}
