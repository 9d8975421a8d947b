use super::{RefMapRules, ANY};

/// Rules for a JSON Schema whose subschemas are hoisted to `definitions`.
///
/// Subschema positions are lazy so the table can describe arbitrarily
/// deep nesting.
pub fn schema_rules(definitions: &str) -> RefMapRules {
    let defs = definitions.to_string();
    let nested = move || {
        let defs = defs.clone();
        move || schema_rules(&defs)
    };

    RefMapRules::new()
        .definitions(definitions)
        .lazy("not", nested())
        .rule("allOf", RefMapRules::new().lazy(ANY, nested()))
        .rule("oneOf", RefMapRules::new().lazy(ANY, nested()))
        .rule("anyOf", RefMapRules::new().lazy(ANY, nested()))
        .lazy("items", {
            let defs = definitions.to_string();
            move || {
                let inner = defs.clone();
                schema_rules(&defs).lazy(ANY, move || schema_rules(&inner))
            }
        })
        .rule("properties", RefMapRules::new().lazy(ANY, nested()))
        .lazy("additionalProperties", nested())
        .rule("definitions", RefMapRules::new().lazy(ANY, nested()))
}

/// Table for plain JSON Schema documents.
pub fn json_schema_rules() -> RefMapRules {
    schema_rules("/definitions")
}
