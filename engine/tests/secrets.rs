use std::collections::BTreeSet;

use aw_engine::AgenticEngine;
use aw_engine::CompileOptions;
use aw_engine::EngineCatalog;
use aw_engine::WorkflowSpec;
use aw_engine::compile_engine_steps;
use aw_engine::secrets::filter_env_for_secrets;
use aw_engine::secrets::looks_like_secret_reference;
use aw_engine::secrets::secret_reference_name;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const NAMES: &[&str] = &["ALPHA", "BETA", "GAMMA", "DELTA", "OPENAI_API_KEY"];

fn env_value() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z0-9/._-]{0,12}",
        prop::sample::select(NAMES).prop_map(|name| format!("${{{{ secrets.{name} }}}}")),
        prop::sample::select(NAMES)
            .prop_map(|name| format!("${{{{ secrets.{name} || secrets.GITHUB_TOKEN }}}}")),
        Just("${{ secrets. }}".to_string()),
    ]
}

fn env_map() -> impl Strategy<Value = IndexMap<String, String>> {
    prop::collection::vec(("[A-Z][A-Z_]{0,6}", env_value()), 0..8)
        .prop_map(|entries| entries.into_iter().collect())
}

fn allowed_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(
        prop_oneof![
            prop::sample::select(NAMES).prop_map(str::to_string),
            "[A-Z][A-Z_]{0,6}",
        ],
        0..4,
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn filter_is_idempotent(env in env_map(), allowed in allowed_set()) {
        let once = filter_env_for_secrets(&env, &allowed);
        let twice = filter_env_for_secrets(&once, &allowed);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn filter_keeps_only_permitted_secrets(env in env_map(), allowed in allowed_set()) {
        let filtered = filter_env_for_secrets(&env, &allowed);
        for (key, value) in &filtered {
            if let Some(name) = secret_reference_name(value) {
                prop_assert!(allowed.contains(name) || allowed.contains(key));
            }
        }
        for (key, value) in &env {
            if !looks_like_secret_reference(value) {
                prop_assert_eq!(filtered.get(key), Some(value));
            }
        }
    }
}

#[test]
fn execution_env_carries_only_engine_credentials() {
    let catalog = EngineCatalog::with_builtin_engines();
    let mut workflow: WorkflowSpec = serde_yaml::from_str(
        "engine:\n  id: codex\n  env:\n    CUSTOM_TOKEN: ${{ secrets.CUSTOM_TOKEN }}\nsafe-outputs:\n  create-issue:\n",
    )
    .expect("workflow parses");
    let compiled = compile_engine_steps(&catalog, &mut workflow, &CompileOptions::default())
        .expect("compiles");
    let env = compiled.execution[0].env();

    let mut secrets: Vec<&str> = env
        .values()
        .filter_map(|value| secret_reference_name(value))
        .collect();
    secrets.sort_unstable();
    assert_eq!(secrets, vec!["CODEX_API_KEY", "CUSTOM_TOKEN", "OPENAI_API_KEY"]);
}

#[test]
fn github_tool_adds_mcp_token_names() {
    let catalog = EngineCatalog::with_builtin_engines();
    let workflow: WorkflowSpec =
        serde_yaml::from_str("engine: claude\ntools:\n  github:\n").expect("workflow parses");
    let engine = catalog.get("claude").expect("engine");
    let provider = engine.as_security_provider().expect("security role");
    let names = provider.required_secret_names(&workflow);
    for expected in [
        "ANTHROPIC_API_KEY",
        "CLAUDE_CODE_OAUTH_TOKEN",
        "GH_AW_GITHUB_MCP_SERVER_TOKEN",
        "GH_AW_GITHUB_TOKEN",
        "GITHUB_PERSONAL_ACCESS_TOKEN",
        "MCP_GATEWAY_API_KEY",
    ] {
        assert!(names.iter().any(|name| name == expected), "missing {expected}");
    }
}

const COMPOUND_HEADER_WORKFLOW: &str =
    "mcp-servers:\n  docs:\n    url: https://docs.example.com/mcp\n    headers:\n      X-Api-Key: ${{ secrets.DOCS_KEY || secrets.FALLBACK_KEY }}\n";

#[test]
fn compound_header_secrets_stay_out_of_mcp_config() {
    let catalog = EngineCatalog::with_builtin_engines();
    for engine in ["claude", "codex"] {
        let mut workflow: WorkflowSpec =
            serde_yaml::from_str(COMPOUND_HEADER_WORKFLOW).expect("workflow parses");
        let options = CompileOptions {
            engine: Some(engine.to_string()),
            ..CompileOptions::default()
        };
        let compiled =
            compile_engine_steps(&catalog, &mut workflow, &options).expect("compiles");

        let setup = compiled.mcp_setup.as_ref().expect("mcp setup step").script();
        assert!(!setup.contains("secrets."), "{engine} leaked a secret:\n{setup}");
        assert!(setup.contains("DOCS_X_API_KEY"), "{engine} lost the header:\n{setup}");
        let env = compiled.execution[0].env();
        assert_eq!(
            env.get("DOCS_X_API_KEY").map(String::as_str),
            Some("${{ secrets.DOCS_KEY || secrets.FALLBACK_KEY }}"),
            "{engine} step env"
        );
    }
}

#[test]
fn fallback_secrets_are_required() {
    let catalog = EngineCatalog::with_builtin_engines();
    let workflow: WorkflowSpec =
        serde_yaml::from_str(COMPOUND_HEADER_WORKFLOW).expect("workflow parses");
    let engine = catalog.get("claude").expect("engine");
    let provider = engine.as_security_provider().expect("security role");
    let names = provider.required_secret_names(&workflow);
    for expected in ["DOCS_KEY", "FALLBACK_KEY"] {
        assert!(names.iter().any(|name| name == expected), "missing {expected}");
    }
}
