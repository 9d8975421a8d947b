//! Definition-placement rule tables.
//!
//! A [`RefMapRules`] tree mirrors the layout of a document format. Walking
//! it with the location of a `$ref` tells the bundler where the target
//! belongs: a definitions area (`definitions` is set), inline at the call
//! site (known location without a definitions area), or unknown (`None`,
//! fall back to heuristics).

mod asyncapi;
mod asyncapi3;
mod json_schema;
mod openapi;
mod swagger;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::pointer::JsonPointer;
use crate::value::{is_json_schema, looks_like_schema};

pub use asyncapi::asyncapi2_rules;
pub use asyncapi3::asyncapi3_rules;
pub use json_schema::{json_schema_rules, schema_rules};
pub use openapi::openapi3_rules;
pub use swagger::swagger2_rules;

/// Wildcard segment matching any key or index.
pub const ANY: &str = "*";

type RulesFn = Arc<dyn Fn() -> RefMapRules + Send + Sync>;

/// A nested rule set, either built or built on demand.
///
/// Lazy entries let schema rules refer to themselves without an infinite
/// table.
#[derive(Clone)]
pub enum RuleEntry {
    Rules(RefMapRules),
    Lazy(RulesFn),
}

impl RuleEntry {
    fn get(&self) -> Cow<'_, RefMapRules> {
        match self {
            RuleEntry::Rules(rules) => Cow::Borrowed(rules),
            RuleEntry::Lazy(build) => Cow::Owned(build()),
        }
    }
}

impl fmt::Debug for RuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleEntry::Rules(rules) => rules.fmt(f),
            RuleEntry::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// Rules for one location of a document and everything below it.
#[derive(Debug, Clone, Default)]
pub struct RefMapRules {
    definitions: Option<String>,
    entries: Vec<(String, RuleEntry)>,
}

impl RefMapRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Definitions area for targets referenced from this location.
    pub fn definitions(mut self, pointer: impl Into<String>) -> Self {
        self.definitions = Some(pointer.into());
        self
    }

    /// Rules for the child `segment` (or [`ANY`]). Replaces an existing entry.
    pub fn rule(self, segment: impl Into<String>, rules: RefMapRules) -> Self {
        self.entry(segment.into(), RuleEntry::Rules(rules))
    }

    /// Like [`rule`](Self::rule), but built each time it is looked up.
    pub fn lazy(
        self,
        segment: impl Into<String>,
        build: impl Fn() -> RefMapRules + Send + Sync + 'static,
    ) -> Self {
        self.entry(segment.into(), RuleEntry::Lazy(Arc::new(build)))
    }

    /// Overlay `other` on these rules; its entries win.
    pub fn merge(mut self, other: RefMapRules) -> Self {
        if other.definitions.is_some() {
            self.definitions = other.definitions;
        }
        for (segment, entry) in other.entries {
            self = self.entry(segment, entry);
        }
        self
    }

    fn entry(mut self, segment: String, entry: RuleEntry) -> Self {
        match self.entries.iter_mut().find(|(s, _)| *s == segment) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((segment, entry)),
        }
        self
    }

    /// Definitions area declared at this location.
    pub fn definitions_pointer(&self) -> Option<JsonPointer> {
        self.definitions.as_deref().map(JsonPointer::parse)
    }

    /// Rules for one child segment; exact keys take precedence over [`ANY`].
    pub fn child(&self, segment: &str) -> Option<Cow<'_, RefMapRules>> {
        self.entries
            .iter()
            .find(|(s, _)| s == segment)
            .or_else(|| self.entries.iter().find(|(s, _)| s == ANY))
            .map(|(_, entry)| entry.get())
    }

    /// Rules at `pointer`, or `None` if the table does not know the location.
    pub fn lookup(&self, pointer: &JsonPointer) -> Option<Cow<'_, RefMapRules>> {
        let mut current = Cow::Borrowed(self);
        for segment in pointer.segments() {
            current = match current {
                Cow::Borrowed(rules) => rules.child(segment)?,
                Cow::Owned(rules) => Cow::Owned(rules.child(segment)?.into_owned()),
            };
        }
        Some(current)
    }
}

/// Document format, detected from top-level discriminator fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    OpenApi3,
    OpenApi2,
    AsyncApi2,
    AsyncApi3,
    JsonSchema,
    Unknown,
}

const OPENAPI3_COMPONENTS: &[&str] = &[
    "schemas",
    "responses",
    "parameters",
    "examples",
    "requestBodies",
    "headers",
    "securitySchemes",
    "links",
    "callbacks",
];

const SWAGGER2_AREAS: &[&str] = &["definitions", "parameters", "responses", "securityDefinitions"];

const ASYNCAPI2_COMPONENTS: &[&str] = &[
    "schemas",
    "servers",
    "serverVariables",
    "channels",
    "messages",
    "securitySchemes",
    "parameters",
    "correlationIds",
    "operationTraits",
    "messageTraits",
    "serverBindings",
    "channelBindings",
    "operationBindings",
    "messageBindings",
];

const ASYNCAPI3_COMPONENTS: &[&str] = &[
    "schemas",
    "servers",
    "channels",
    "operations",
    "messages",
    "securitySchemes",
    "serverVariables",
    "parameters",
    "correlationIds",
    "replies",
    "replyAddresses",
    "externalDocs",
    "tags",
    "operationTraits",
    "messageTraits",
    "serverBindings",
    "channelBindings",
    "operationBindings",
    "messageBindings",
];

fn version_major(value: &Value, field: &str) -> Option<char> {
    value.get(field)?.as_str()?.chars().next()
}

impl JsonType {
    pub fn detect(value: &Value) -> Self {
        if version_major(value, "openapi") == Some('3') {
            JsonType::OpenApi3
        } else if version_major(value, "swagger") == Some('2') {
            JsonType::OpenApi2
        } else {
            match version_major(value, "asyncapi") {
                Some('2') => JsonType::AsyncApi2,
                Some('3') => JsonType::AsyncApi3,
                _ if looks_like_schema(value) => JsonType::JsonSchema,
                _ => JsonType::Unknown,
            }
        }
    }

    /// Placement table for this format.
    pub fn rules(self) -> RefMapRules {
        match self {
            JsonType::OpenApi3 => openapi3_rules(),
            JsonType::OpenApi2 => swagger2_rules(),
            JsonType::AsyncApi2 => asyncapi2_rules(),
            JsonType::AsyncApi3 => asyncapi3_rules(),
            JsonType::JsonSchema => json_schema_rules(),
            JsonType::Unknown => RefMapRules::new(),
        }
    }

    /// Where plain JSON Schemas go when nothing more specific applies.
    pub fn schema_area(self) -> Option<JsonPointer> {
        let area = match self {
            JsonType::OpenApi3 | JsonType::AsyncApi2 | JsonType::AsyncApi3 => "/components/schemas",
            JsonType::OpenApi2 | JsonType::JsonSchema => "/definitions",
            JsonType::Unknown => return None,
        };
        Some(JsonPointer::parse(area))
    }

    /// Definitions area implied by the shape of a target pointer, such as
    /// `/components/responses/NotFound` → `/components/responses`.
    pub fn area_for_pointer(self, pointer: &JsonPointer) -> Option<JsonPointer> {
        let segments = pointer.segments();
        let components = match self {
            JsonType::OpenApi3 => OPENAPI3_COMPONENTS,
            JsonType::AsyncApi2 => ASYNCAPI2_COMPONENTS,
            JsonType::AsyncApi3 => ASYNCAPI3_COMPONENTS,
            JsonType::OpenApi2 => {
                return (segments.len() >= 2 && SWAGGER2_AREAS.contains(&segments[0].as_str()))
                    .then(|| JsonPointer::from_segments(&segments[..1]));
            }
            JsonType::JsonSchema | JsonType::Unknown => return None,
        };
        (segments.len() >= 3
            && segments[0] == "components"
            && components.contains(&segments[1].as_str()))
        .then(|| JsonPointer::from_segments(&segments[..2]))
    }

    /// Definitions area for a target, from its pointer shape or, failing
    /// that, from whether it looks like a JSON Schema.
    pub fn fallback_area(self, pointer: &JsonPointer, target: &Value) -> Option<JsonPointer> {
        self.area_for_pointer(pointer)
            .or_else(|| is_json_schema(target).then(|| self.schema_area()).flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ptr(s: &str) -> JsonPointer {
        JsonPointer::parse(s)
    }

    fn area(rules: &RefMapRules, location: &str) -> Option<Option<String>> {
        rules
            .lookup(&ptr(location))
            .map(|r| r.definitions_pointer().map(|p| p.to_string()))
    }

    #[test]
    fn detect_formats() {
        assert_eq!(JsonType::detect(&json!({ "openapi": "3.1.0" })), JsonType::OpenApi3);
        assert_eq!(JsonType::detect(&json!({ "swagger": "2.0" })), JsonType::OpenApi2);
        assert_eq!(JsonType::detect(&json!({ "asyncapi": "2.6.0" })), JsonType::AsyncApi2);
        assert_eq!(JsonType::detect(&json!({ "asyncapi": "3.0.0" })), JsonType::AsyncApi3);
        assert_eq!(JsonType::detect(&json!({ "type": "object" })), JsonType::JsonSchema);
        assert_eq!(JsonType::detect(&json!({ "info": {} })), JsonType::Unknown);
        assert_eq!(JsonType::detect(&json!("text")), JsonType::Unknown);
    }

    #[test]
    fn json_schema_rules_recurse() {
        let rules = json_schema_rules();
        assert_eq!(area(&rules, "/properties/a"), Some(Some("/definitions".into())));
        assert_eq!(
            area(&rules, "/properties/a/items/allOf/0/properties/b"),
            Some(Some("/definitions".into()))
        );
        assert_eq!(area(&rules, "/unknown"), None);
    }

    #[test]
    fn openapi_rules() {
        let rules = openapi3_rules();
        assert_eq!(
            area(&rules, "/paths/~1pets/get/responses/200"),
            Some(Some("/components/responses".into()))
        );
        assert_eq!(
            area(&rules, "/paths/~1pets/get/responses/200/content/application~1json/schema"),
            Some(Some("/components/schemas".into()))
        );
        assert_eq!(
            area(&rules, "/paths/~1pets/parameters/0"),
            Some(Some("/components/parameters".into()))
        );
        // operation objects are inlined
        assert_eq!(area(&rules, "/paths/~1pets/get"), Some(None));
    }

    #[test]
    fn swagger_parameters_are_schemas_too() {
        let rules = swagger2_rules();
        assert_eq!(area(&rules, "/parameters/limit"), Some(Some("/parameters".into())));
        assert_eq!(
            area(&rules, "/parameters/limit/items"),
            Some(Some("/definitions".into()))
        );
    }

    #[test]
    fn swagger_response_schema() {
        let rules = swagger2_rules();
        assert_eq!(
            area(&rules, "/paths/~1pets/get/responses/200"),
            Some(Some("/responses".into()))
        );
        assert_eq!(
            area(&rules, "/paths/~1pets/get/responses/200/schema"),
            Some(Some("/definitions".into()))
        );
        assert_eq!(area(&rules, "/responses/NotFound/headers/X-Rate"), Some(None));
    }

    #[test]
    fn asyncapi3_operation_messages_are_not_hoisted() {
        let rules = asyncapi3_rules();
        assert_eq!(area(&rules, "/operations/send/messages/0"), Some(None));
        assert_eq!(
            area(&rules, "/components/messages/Ping/payload"),
            Some(Some("/components/schemas".into()))
        );
        assert_eq!(
            area(&rules, "/channels/ping/messages/Ping/payload/properties/a"),
            Some(Some("/components/schemas".into()))
        );
    }

    #[test]
    fn asyncapi2_operation_message_one_of() {
        let rules = asyncapi2_rules();
        assert_eq!(
            area(&rules, "/channels/user~1signup/subscribe/message/oneOf/1"),
            Some(Some("/components/messages".into()))
        );
        assert_eq!(
            area(&rules, "/channels/user~1signup/subscribe/message/payload"),
            Some(Some("/components/schemas".into()))
        );
    }

    #[test]
    fn exact_segment_beats_wildcard() {
        let rules = RefMapRules::new()
            .rule(ANY, RefMapRules::new().definitions("/any"))
            .rule("special", RefMapRules::new().definitions("/special"));
        assert_eq!(area(&rules, "/special"), Some(Some("/special".into())));
        assert_eq!(area(&rules, "/other"), Some(Some("/any".into())));
    }

    #[test]
    fn merge_overrides_entries() {
        let base = RefMapRules::new()
            .definitions("/a")
            .rule("x", RefMapRules::new().definitions("/x"));
        let merged = base.merge(RefMapRules::new().rule("x", RefMapRules::new()));
        assert_eq!(area(&merged, ""), Some(Some("/a".into())));
        assert_eq!(area(&merged, "/x"), Some(None));
    }

    #[test]
    fn pointer_shape_fallback() {
        let any = json!({ "description": "not a schema" });
        assert_eq!(
            JsonType::OpenApi3.fallback_area(&ptr("/components/responses/NotFound"), &any),
            Some(ptr("/components/responses"))
        );
        assert_eq!(
            JsonType::OpenApi2.fallback_area(&ptr("/parameters/limit"), &any),
            Some(ptr("/parameters"))
        );
        assert_eq!(
            JsonType::OpenApi3.fallback_area(&ptr("/x/User"), &json!({ "type": "object" })),
            Some(ptr("/components/schemas"))
        );
        assert_eq!(JsonType::OpenApi3.fallback_area(&ptr("/x/User"), &any), None);
        assert_eq!(JsonType::Unknown.fallback_area(&ptr(""), &json!({ "type": "string" })), None);
    }
}
