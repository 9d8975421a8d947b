//! Integration tests for dereferencing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use api_refs::{
    dereference, dereference_value, DereferenceOptions, Document, FetchError, FsFetcher,
    JsonPointer, RefError, RefHooks,
};
use serde_json::{json, Value};

// In-memory document store keyed by file identity.
fn store(files: Vec<(&str, Value)>) -> impl Fn(&str) -> Result<Document, FetchError> + Sync {
    let files: HashMap<String, Value> = files
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    move |source: &str| {
        files
            .get(source)
            .cloned()
            .map(Document::Json)
            .ok_or_else(|| FetchError::FileNotFound {
                path: PathBuf::from(source),
            })
    }
}

fn tree(value: &Value, files: Vec<(&str, Value)>, options: &DereferenceOptions) -> Value {
    let fetcher = store(files);
    dereference_value(value, "main.json", &fetcher, options)
        .unwrap()
        .into_tree()
        .unwrap()
}

fn cyclic_doc() -> Value {
    json!({
        "definitions": {
            "node": {
                "type": "object",
                "properties": { "next": { "$ref": "#/definitions/node" } }
            }
        },
        "properties": { "root": { "$ref": "#/definitions/node" } }
    })
}

mod external_files {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nested_relative_refs_are_inlined() {
        let main = json!({
            "properties": {
                "owner": { "$ref": "models/user.json", "description": "Owner" }
            }
        });
        let files = vec![
            (
                "models/user.json",
                json!({
                    "type": "object",
                    "properties": { "address": { "$ref": "address.json" } }
                }),
            ),
            ("models/address.json", json!({ "type": "string" })),
        ];

        let result = tree(&main, files, &DereferenceOptions::new());
        assert_eq!(
            result["properties"]["owner"],
            json!({
                "type": "object",
                "properties": { "address": { "type": "string" } },
                "description": "Owner"
            })
        );
    }

    #[test]
    fn pointer_into_other_file() {
        let main = json!({ "schema": { "$ref": "lib.json#/definitions/id" } });
        let files = vec![(
            "lib.json",
            json!({ "definitions": { "id": { "type": "integer" } } }),
        )];

        let result = tree(&main, files, &DereferenceOptions::new());
        assert_eq!(result, json!({ "schema": { "type": "integer" } }));
    }

    #[test]
    fn ignore_sibling_drops_extra_keys() {
        let main = json!({ "a": { "$ref": "lib.json", "description": "dropped" } });
        let files = vec![("lib.json", json!({ "type": "string" }))];

        let result = tree(&main, files, &DereferenceOptions::new().ignore_sibling(true));
        assert_eq!(result, json!({ "a": { "type": "string" } }));
    }

    #[test]
    fn output_without_cycles_has_no_refs() {
        let main = json!({
            "definitions": { "id": { "type": "string" } },
            "properties": {
                "a": { "$ref": "#/definitions/id" },
                "b": { "$ref": "lib.json#/tag" }
            }
        });
        let files = vec![("lib.json", json!({ "tag": { "$ref": "#/name" }, "name": { "enum": ["x"] } }))];

        let once = tree(&main, files, &DereferenceOptions::new());
        assert!(!once.to_string().contains("$ref"));
        assert_eq!(once["properties"]["b"], json!({ "enum": ["x"] }));

        let twice = tree(&once, vec![], &DereferenceOptions::new());
        assert_eq!(twice, once);
    }
}

mod cycles {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn self_cycle_becomes_local_ref() {
        let result = tree(&cyclic_doc(), vec![], &DereferenceOptions::new());
        let node = &result["definitions"]["node"];

        assert_eq!(
            node["properties"]["next"]["properties"]["next"],
            json!({ "$ref": "#/definitions/node/properties/next" })
        );
        assert_eq!(result["properties"]["root"], *node);
    }

    #[test]
    fn circular_mode_links_nodes() {
        let fetcher = store(vec![]);
        let options = DereferenceOptions::new().enable_circular(true);
        let result = dereference_value(&cyclic_doc(), "main.json", &fetcher, &options).unwrap();
        let graph = result.graph().unwrap();

        let lookup = |p: &str| graph.lookup(&JsonPointer::parse(p)).unwrap();
        assert!(graph.same(lookup("/properties/root"), lookup("/definitions/node")));
        assert!(graph.same(
            lookup("/definitions/node/properties/next/properties/next"),
            lookup("/definitions/node/properties/next")
        ));
        assert!(matches!(result.to_value(), Err(RefError::Circular { .. })));
    }

    #[test]
    fn cycle_hook_reports_ancestor() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = DereferenceOptions::new().hooks(
            RefHooks::new().on_cycle(move |ancestor, _| sink.lock().unwrap().push(ancestor.to_string())),
        );

        tree(&cyclic_doc(), vec![], &options);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["/definitions/node/properties/next".to_string()]
        );
    }

    #[test]
    fn cross_file_cycle_terminates() {
        let main = json!({ "a": { "$ref": "a.json" } });
        let files = vec![
            ("a.json", json!({ "type": "object", "properties": { "b": { "$ref": "b.json" } } })),
            ("b.json", json!({ "type": "object", "properties": { "a": { "$ref": "a.json" } } })),
        ];

        let result = tree(&main, files, &DereferenceOptions::new());
        assert_eq!(
            result["a"]["properties"]["b"]["properties"]["a"],
            json!({ "$ref": "#/a" })
        );
    }
}

mod hooks {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn errors_are_reported_and_refs_kept() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let options = DereferenceOptions::new().hooks(
            RefHooks::new().on_error(move |msg, _| sink.lock().unwrap().push(msg.to_string())),
        );
        let main = json!({
            "a": { "$ref": "missing.json#/x" },
            "b": { "$ref": 42 }
        });

        let result = tree(&main, vec![], &options);
        assert_eq!(
            result,
            json!({
                "a": { "$ref": "missing.json#/x" },
                "b": { "$ref": 42 }
            })
        );
        assert_eq!(
            *errors.lock().unwrap(),
            vec![
                "Cannot resolve: missing.json#/x".to_string(),
                "invalid $ref at #/b: expected string, got number".to_string(),
            ]
        );
    }

    #[test]
    fn refs_are_reported_normalized() {
        let refs = Arc::new(Mutex::new(Vec::new()));
        let sink = refs.clone();
        let options = DereferenceOptions::new().hooks(
            RefHooks::new().on_ref(move |r, _| sink.lock().unwrap().push(r.to_string())),
        );
        let main = json!({ "a": { "$ref": "./lib/../lib.json#/x" } });
        let files = vec![("lib.json", json!({ "x": true }))];

        tree(&main, files, &options);
        assert_eq!(*refs.lock().unwrap(), vec!["lib.json#/x".to_string()]);
    }

    #[test]
    fn exits_report_children_before_parents() {
        let exits = Arc::new(Mutex::new(Vec::new()));
        let sink = exits.clone();
        let options = DereferenceOptions::new().hooks(RefHooks::new().on_exit(move |value, path| {
            sink.lock()
                .unwrap()
                .push((api_refs::path_to_pointer(path).to_string(), value.clone()))
        }));
        let main = json!({ "a": { "$ref": "lib.json" } });
        let files = vec![("lib.json", json!({ "b": true }))];

        tree(&main, files, &options);
        assert_eq!(
            *exits.lock().unwrap(),
            vec![
                ("/a/b".to_string(), json!(true)),
                ("/a".to_string(), json!({ "b": true })),
                ("".to_string(), json!({ "a": { "b": true } })),
            ]
        );
    }

    #[test]
    fn full_crawl_visits_reused_content() {
        let main = json!({
            "definitions": {
                "x": { "type": "object", "properties": { "y": { "type": "string" } } }
            },
            "a": { "$ref": "#/definitions/x" }
        });

        let crawled = |full: bool| {
            let paths = Arc::new(Mutex::new(Vec::new()));
            let sink = paths.clone();
            let options = DereferenceOptions::new().full_crawl(full).hooks(
                RefHooks::new().on_crawl(move |_, path| {
                    sink.lock()
                        .unwrap()
                        .push(api_refs::path_to_pointer(path).to_string())
                }),
            );
            let result = tree(&main, vec![], &options);
            let paths = paths.lock().unwrap().clone();
            (result, paths)
        };

        let (plain, plain_paths) = crawled(false);
        let (full, full_paths) = crawled(true);

        assert_eq!(plain, full);
        assert_eq!(plain["a"], main["definitions"]["x"]);
        assert!(plain_paths.contains(&"/a".to_string()));
        assert!(!plain_paths.contains(&"/a/properties/y".to_string()));
        assert!(full_paths.contains(&"/a/properties/y".to_string()));
    }
}

mod modes {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parallel_matches_sequential() {
        let main = json!({
            "definitions": { "id": { "type": "string" } },
            "properties": {
                "a": { "$ref": "lib.json#/a" },
                "b": { "$ref": "lib.json#/b" },
                "c": { "$ref": "#/definitions/id" },
                "list": [{ "$ref": "lib.json#/a" }, { "$ref": "lib.json#/b", "title": "B" }]
            }
        });
        let files = || {
            vec![(
                "lib.json",
                json!({
                    "a": { "type": "object", "properties": { "b": { "$ref": "#/b" } } },
                    "b": { "type": "number" }
                }),
            )]
        };

        let sequential = tree(&main, files(), &DereferenceOptions::new());
        let parallel = tree(&main, files(), &DereferenceOptions::new().parallel_crawl(true));
        assert_eq!(sequential, parallel);
        assert_eq!(sequential["properties"]["list"][1]["title"], "B");
    }
}

mod files_on_disk {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn yaml_and_text_documents() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("api")).unwrap();
        fs::write(
            dir.path().join("api/main.yaml"),
            "type: object\ndescription:\n  $ref: notes.md\nproperties:\n  id:\n    $ref: common.yaml#/Id\n",
        )
        .unwrap();
        fs::write(dir.path().join("api/common.yaml"), "Id:\n  type: integer\n").unwrap();
        fs::write(dir.path().join("api/notes.md"), "# Notes").unwrap();

        let fetcher = FsFetcher::new(dir.path());
        let result = dereference("api/main.yaml", &fetcher, &DereferenceOptions::new())
            .unwrap()
            .into_tree()
            .unwrap();

        assert_eq!(
            result,
            json!({
                "type": "object",
                "description": "# Notes",
                "properties": { "id": { "type": "integer" } }
            })
        );
    }

    #[test]
    fn pointer_selected_entry() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.json"),
            r##"{"components":{"a":{"items":{"$ref":"#/components/b"}},"b":{"type":"string"}}}"##,
        )
        .unwrap();

        let fetcher = FsFetcher::new(dir.path());
        let result = dereference("main.json#/components/a", &fetcher, &DereferenceOptions::new())
            .unwrap()
            .into_tree()
            .unwrap();
        assert_eq!(result, json!({ "items": { "type": "string" } }));
    }

    #[test]
    fn missing_entry_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let fetcher = FsFetcher::new(dir.path());
        let result = dereference("nope.yaml", &fetcher, &DereferenceOptions::new());
        assert!(matches!(result, Err(RefError::SourceUnavailable { .. })));
    }
}
