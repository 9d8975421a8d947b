use super::{schema_rules, RefMapRules, ANY};

const SCHEMAS: &str = "/components/schemas";
const RESPONSES: &str = "/components/responses";
const PARAMETERS: &str = "/components/parameters";
const EXAMPLES: &str = "/components/examples";
const REQUEST_BODIES: &str = "/components/requestBodies";
const SECURITY_SCHEMES: &str = "/components/securitySchemes";
const HEADERS: &str = "/components/headers";
const LINKS: &str = "/components/links";
const CALLBACKS: &str = "/components/callbacks";

fn leaf(definitions: &str) -> RefMapRules {
    RefMapRules::new().definitions(definitions)
}

fn map_of(definitions: &str) -> RefMapRules {
    RefMapRules::new().rule(ANY, leaf(definitions))
}

fn examples() -> RefMapRules {
    map_of(EXAMPLES)
}

fn parameters() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        leaf(PARAMETERS)
            .rule("schema", schema_rules(SCHEMAS))
            .rule("example", leaf(EXAMPLES))
            .rule("examples", examples()),
    )
}

fn headers() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        leaf(HEADERS)
            .rule("schema", schema_rules(SCHEMAS))
            .rule("example", leaf(EXAMPLES))
            .rule("examples", examples()),
    )
}

fn media_types() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        RefMapRules::new()
            .rule("schema", schema_rules(SCHEMAS))
            .rule("example", leaf(EXAMPLES))
            .rule("examples", examples())
            .rule("encoding", RefMapRules::new().rule("headers", headers())),
    )
}

fn request_body() -> RefMapRules {
    leaf(REQUEST_BODIES).rule("content", media_types())
}

fn responses() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        leaf(RESPONSES)
            .rule("headers", headers())
            .rule("content", media_types())
            .rule("links", map_of(LINKS)),
    )
}

/// Table for OpenAPI 3.x documents.
pub fn openapi3_rules() -> RefMapRules {
    let operation = RefMapRules::new()
        .rule("parameters", parameters())
        .rule("requestBody", request_body())
        .rule("responses", responses())
        .rule("callbacks", map_of(CALLBACKS));

    let path_item = RefMapRules::new()
        .rule(ANY, operation)
        .rule("parameters", parameters());

    RefMapRules::new()
        .rule("paths", RefMapRules::new().rule(ANY, path_item))
        .rule(
            "components",
            RefMapRules::new()
                .rule("schemas", RefMapRules::new().rule(ANY, schema_rules(SCHEMAS)))
                .rule("responses", responses())
                .rule("parameters", parameters())
                .rule("examples", examples())
                .rule("requestBodies", RefMapRules::new().rule(ANY, request_body()))
                .rule("securitySchemes", map_of(SECURITY_SCHEMES))
                .rule("headers", headers())
                .rule("links", map_of(LINKS))
                .rule("callbacks", map_of(CALLBACKS)),
        )
}
