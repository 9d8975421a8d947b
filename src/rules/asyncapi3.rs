//! AsyncAPI 3 differs from 2 in where operations live: they are top-level,
//! and their `channel`/`messages` point at channel-scoped objects, so
//! those are never hoisted. Root-level channels and operations stay put.

use super::{schema_rules, RefMapRules, ANY};

const SCHEMAS: &str = "/components/schemas";
const SERVERS: &str = "/components/servers";
const CHANNELS: &str = "/components/channels";
const OPERATIONS: &str = "/components/operations";
const MESSAGES: &str = "/components/messages";
const SECURITY_SCHEMES: &str = "/components/securitySchemes";
const SERVER_VARIABLES: &str = "/components/serverVariables";
const PARAMETERS: &str = "/components/parameters";
const CORRELATION_IDS: &str = "/components/correlationIds";
const REPLIES: &str = "/components/replies";
const REPLY_ADDRESSES: &str = "/components/replyAddresses";
const EXTERNAL_DOCS: &str = "/components/externalDocs";
const TAGS: &str = "/components/tags";
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

fn inline_list() -> RefMapRules {
    RefMapRules::new().rule(ANY, RefMapRules::new())
}

fn parameters() -> RefMapRules {
    RefMapRules::new().rule(ANY, leaf(PARAMETERS).rule("schema", schema_rules(SCHEMAS)))
}

fn servers() -> RefMapRules {
    RefMapRules::new().rule(
        ANY,
        leaf(SERVERS)
            .rule("variables", map_of(SERVER_VARIABLES))
            .rule("security", map_of(SECURITY_SCHEMES))
            .rule("tags", map_of(TAGS))
            .rule("externalDocs", leaf(EXTERNAL_DOCS))
            .rule("bindings", leaf(SERVER_BINDINGS)),
    )
}

fn message_body(rules: RefMapRules) -> RefMapRules {
    rules
        .rule("headers", schema_rules(SCHEMAS))
        .rule("correlationId", leaf(CORRELATION_IDS))
        .rule("payload", schema_rules(SCHEMAS))
        .rule("traits", map_of(MESSAGE_TRAITS))
        .rule("bindings", leaf(MESSAGE_BINDINGS))
}

fn channel(rules: RefMapRules) -> RefMapRules {
    rules
        .rule("servers", map_of(SERVERS))
        .rule("parameters", parameters())
        .rule("messages", RefMapRules::new().rule(ANY, message_body(RefMapRules::new())))
        .rule("tags", map_of(TAGS))
        .rule("externalDocs", leaf(EXTERNAL_DOCS))
        .rule("bindings", leaf(CHANNEL_BINDINGS))
}

fn reply(channel: RefMapRules) -> RefMapRules {
    RefMapRules::new()
        .rule("channel", channel)
        .rule("messages", inline_list())
        .rule("address", leaf(REPLY_ADDRESSES))
}

fn operation(rules: RefMapRules, channel: RefMapRules) -> RefMapRules {
    rules
        .rule("channel", channel.clone())
        .rule("messages", inline_list())
        .rule("reply", reply(channel))
        .rule("security", map_of(SECURITY_SCHEMES))
        .rule("traits", map_of(OPERATION_TRAITS))
        .rule("tags", map_of(TAGS))
        .rule("externalDocs", leaf(EXTERNAL_DOCS))
        .rule("bindings", leaf(OPERATION_BINDINGS))
}

/// Table for AsyncAPI 3.x documents.
pub fn asyncapi3_rules() -> RefMapRules {
    let components = RefMapRules::new()
        .rule(
            "schemas",
            RefMapRules::new().lazy(ANY, || schema_rules(SCHEMAS)),
        )
        .rule("servers", servers())
        .rule("channels", RefMapRules::new().rule(ANY, channel(leaf(CHANNELS))))
        .rule(
            "operations",
            RefMapRules::new().rule(ANY, operation(leaf(OPERATIONS), leaf(CHANNELS))),
        )
        .rule(
            "messages",
            RefMapRules::new().rule(ANY, message_body(leaf(MESSAGES))),
        )
        .rule("securitySchemes", map_of(SECURITY_SCHEMES))
        .rule("parameters", parameters())
        .rule("correlationIds", map_of(CORRELATION_IDS))
        .rule(
            "replies",
            RefMapRules::new().rule(ANY, reply(leaf(CHANNELS)).definitions(REPLIES)),
        )
        .rule("replyAddresses", map_of(REPLY_ADDRESSES))
        .rule("externalDocs", map_of(EXTERNAL_DOCS))
        .rule("tags", map_of(TAGS))
        .rule("serverVariables", map_of(SERVER_VARIABLES))
        .rule(
            "operationTraits",
            RefMapRules::new().rule(
                ANY,
                leaf(OPERATION_TRAITS)
                    .rule("tags", map_of(TAGS))
                    .rule("externalDocs", leaf(EXTERNAL_DOCS))
                    .rule("bindings", leaf(OPERATION_BINDINGS))
                    .rule("security", map_of(SECURITY_SCHEMES)),
            ),
        )
        .rule(
            "messageTraits",
            RefMapRules::new().rule(
                ANY,
                leaf(MESSAGE_TRAITS)
                    .rule("headers", schema_rules(SCHEMAS))
                    .rule("correlationId", leaf(CORRELATION_IDS))
                    .rule("tags", map_of(TAGS))
                    .rule("externalDocs", leaf(EXTERNAL_DOCS))
                    .rule("bindings", leaf(MESSAGE_BINDINGS)),
            ),
        )
        .rule("serverBindings", map_of(SERVER_BINDINGS))
        .rule("channelBindings", map_of(CHANNEL_BINDINGS))
        .rule("operationBindings", map_of(OPERATION_BINDINGS))
        .rule("messageBindings", map_of(MESSAGE_BINDINGS));

    RefMapRules::new()
        .rule("servers", servers())
        .rule("channels", RefMapRules::new().rule(ANY, channel(RefMapRules::new())))
        .rule(
            "operations",
            RefMapRules::new().rule(ANY, operation(RefMapRules::new(), RefMapRules::new())),
        )
        .rule("components", components)
}
