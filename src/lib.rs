//! API Refs
//!
//! Resolve `$ref` links across JSON, YAML and text documents for OpenAPI,
//! Swagger, AsyncAPI and JSON Schema.
//!
//! Two operations are provided:
//!
//! - [`dereference`] replaces every `$ref` with the content it points to.
//!   Circular references are left as local `$ref`s, or with circular mode
//!   on become real back-edges of a [`Graph`].
//! - [`bundle`] produces one self-contained document: references to other
//!   files are hoisted into the format's definitions area (or inlined) and
//!   rewritten as local pointers.
//!
//! Documents are loaded through a [`Fetcher`]. Any
//! `Fn(&str) -> Result<Document, FetchError>` is one, which keeps tests and
//! embedders free of the filesystem.
//!
//! # Example
//!
//! ```
//! use api_refs::{dereference_value, DereferenceOptions, Document, FetchError};
//! use serde_json::json;
//!
//! let fetch = |source: &str| -> Result<Document, FetchError> {
//!     match source {
//!         "user.json" => Ok(Document::Json(json!({ "type": "object" }))),
//!         _ => Err(FetchError::Other { message: format!("unknown {}", source) }),
//!     }
//! };
//!
//! let schema = json!({
//!     "properties": {
//!         "owner": { "$ref": "user.json", "description": "Owner" }
//!     }
//! });
//!
//! let result = dereference_value(&schema, "main.json", &fetch, &DereferenceOptions::new())
//!     .unwrap()
//!     .into_tree()
//!     .unwrap();
//!
//! assert_eq!(
//!     result["properties"]["owner"],
//!     json!({ "type": "object", "description": "Owner" })
//! );
//! ```
//!
//! # Failure model
//!
//! Only the entry document can fail a call. A `$ref` that cannot be
//! resolved below it is reported through [`RefHooks::on_error`] and left in
//! the output as a normalized `$ref`.

mod bundler;
mod crawler;
mod dereference;
mod error;
mod graph;
mod loader;
mod pointer;
mod refs;
mod resolver;
pub mod rules;
mod types;
mod value;

pub use bundler::{bundle, bundle_value};
pub use crawler::{CrawlContext, CrawlHook, Crawler, ExitHook, HookResponse};
pub use dereference::{dereference, dereference_value, Dereferenced};
pub use error::{FetchError, RefError};
pub use graph::{CycleMap, Graph, GraphNode, NodeId};
pub use loader::{
    load_document, load_document_auto, load_document_str, DefaultFetcher, Document,
    DocumentFormat, Fetcher, FsFetcher,
};
pub use pointer::{
    get_by_pointer, path_to_pointer, set_by_pointer, JsonPath, JsonPointer, PathKey,
};
pub use refs::{build_ref, filename, normalize_path, parse_ref, ParsedRef};
pub use resolver::{Resolved, Resolver};
pub use rules::{JsonType, RefMapRules};
pub use types::{BundleOptions, DereferenceOptions, NodeCallback, RefCallback, RefHooks};
pub use value::{is_json_schema, merge_values};

#[cfg(feature = "remote")]
pub use loader::{load_document_url, HttpFetcher};
