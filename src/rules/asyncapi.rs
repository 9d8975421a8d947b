use super::{schema_rules, RefMapRules, ANY};

const SCHEMAS: &str = "/components/schemas";
const SERVERS: &str = "/components/servers";
const SERVER_VARIABLES: &str = "/components/serverVariables";
const CHANNELS: &str = "/components/channels";
const MESSAGES: &str = "/components/messages";
const SECURITY_SCHEMES: &str = "/components/securitySchemes";
const PARAMETERS: &str = "/components/parameters";
const CORRELATION_IDS: &str = "/components/correlationIds";
const OPERATION_TRAITS: &str = "/components/operationTraits";
const MESSAGE_TRAITS: &str = "/components/messageTraits";
const SERVER_BINDINGS: &str = "/components/serverBindings";
const CHANNEL_BINDINGS: &str = "/components/channelBindings";
const OPERATION_BINDINGS: &str = "/components/operationBindings";
const MESSAGE_BINDINGS: &str = "/components/messageBindings";

fn leaf(definitions: &str) -> RefMapRules {
    RefMapRules::new().definitions(definitions)
}

fn map_of(definitions: &str) -> RefMapRules {
    RefMapRules::new().rule(ANY, leaf(definitions))
}

fn parameters() -> RefMapRules {
    RefMapRules::new().rule(ANY, leaf(PARAMETERS).rule("schema", schema_rules(SCHEMAS)))
}

fn servers() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        leaf(SERVERS)
            .rule("variables", map_of(SERVER_VARIABLES))
            .rule("bindings", leaf(SERVER_BINDINGS)),
    )
}

fn operation_traits() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        leaf(OPERATION_TRAITS).rule("bindings", leaf(OPERATION_BINDINGS)),
    )
}

fn message_traits() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        leaf(MESSAGE_TRAITS)
            .rule("headers", schema_rules(SCHEMAS))
            .rule("correlationId", leaf(CORRELATION_IDS))
            .rule("bindings", leaf(MESSAGE_BINDINGS)),
    )
}

fn message() -> RefMapRules {
    leaf(MESSAGES)
        .rule("headers", schema_rules(SCHEMAS))
        .rule("correlationId", leaf(CORRELATION_IDS))
        .rule("traits", message_traits())
        .rule("payload", schema_rules(SCHEMAS))
        .rule("bindings", leaf(MESSAGE_BINDINGS))
}

fn operation() -> RefMapRules {
    RefMapRules::new()
        .rule("traits", operation_traits())
        .rule(
            "message",
            message().rule("oneOf", RefMapRules::new().rule(ANY, message())),
        )
        .rule("bindings", leaf(OPERATION_BINDINGS))
}

fn channels() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        leaf(CHANNELS)
            .rule("bindings", leaf(CHANNEL_BINDINGS))
            .rule("subscribe", operation())
            .rule("publish", operation())
            .rule("parameters", parameters()),
    )
}

/// Table for AsyncAPI 2.x documents.
pub fn asyncapi2_rules() -> RefMapRules {
    RefMapRules::new()
        .rule("servers", servers())
        .rule("channels", channels())
        .rule(
            "components",
            RefMapRules::new()
                .rule(
                    "schemas",
                    RefMapRules::new().lazy(ANY, || schema_rules(SCHEMAS)),
                )
                .rule("servers", servers())
                .rule("serverVariables", map_of(SERVER_VARIABLES))
                .rule("channels", channels())
                .rule("messages", RefMapRules::new().rule(ANY, message()))
                .rule("parameters", parameters())
                .rule("correlationIds", map_of(CORRELATION_IDS))
                .rule("operationTraits", operation_traits())
                .rule("messageTraits", message_traits())
                .rule("securitySchemes", map_of(SECURITY_SCHEMES))
                .rule("serverBindings", map_of(SERVER_BINDINGS))
                .rule("channelBindings", map_of(CHANNEL_BINDINGS))
                .rule("operationBindings", map_of(OPERATION_BINDINGS))
                .rule("messageBindings", map_of(MESSAGE_BINDINGS)),
        )
}
