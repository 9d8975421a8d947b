use super::{schema_rules, RefMapRules, ANY};

const DEFINITIONS: &str = "/definitions";
const RESPONSES: &str = "/responses";
const PARAMETERS: &str = "/parameters";

// Swagger 2 non-body parameters carry schema keywords inline.
fn parameters() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        schema_rules(DEFINITIONS)
            .definitions(PARAMETERS)
            .rule("schema", schema_rules(DEFINITIONS)),
    )
}

// Header objects are not reusable in Swagger 2; only their items schema is.
fn headers() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        RefMapRules::new().rule("items", schema_rules(DEFINITIONS)),
    )
}

fn responses() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        RefMapRules::new()
            .definitions(RESPONSES)
            .rule("schema", schema_rules(DEFINITIONS))
            .rule("headers", headers()),
    )
}

/// Table for Swagger 2.0 documents.
pub fn swagger2_rules() -> RefMapRules {
    let operation = RefMapRules::new()
        .rule("parameters", parameters())
        .rule("responses", responses());

    RefMapRules::new()
        .rule(
            "paths",
            RefMapRules::new().rule(
                ANY,
                RefMapRules::new()
                    .rule(ANY, operation)
                    .rule("parameters", parameters()),
            ),
        )
        .rule(
            "definitions",
            RefMapRules::new().rule(ANY, schema_rules(DEFINITIONS)),
        )
        .rule("responses", responses())
        .rule("parameters", parameters())
}
