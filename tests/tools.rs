//! Integration tests for tool dispatch against a real (temporary) store.

use divelog::config::Config;
use divelog::store::DiveStore;
use divelog::tools::{ToolContext, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

async fn setup() -> (TempDir, ToolRegistry, ToolContext) {
    let tmp = TempDir::new().unwrap();
    let config: Config = toml::from_str(&format!(
        "[db]\npath = \"{}/divelog.sqlite\"\n",
        tmp.path().display()
    ))
    .unwrap();
    let store = Arc::new(DiveStore::open(&config).await.unwrap());
    (tmp, ToolRegistry::with_builtins(), ToolContext::new(store))
}

async fn call(registry: &ToolRegistry, ctx: &ToolContext, name: &str, args: Value) -> Value {
    registry
        .dispatch(name, &args.to_string(), ctx)
        .await
        .payload
}

fn thistlegorm() -> Value {
    json!({
        "site": "SS Thistlegorm",
        "narrative": "WWII wreck with motorbikes in the holds",
        "depth_max": 30,
        "length_minutes": 45,
        "dive_type": "wreck",
        "area": "Red Sea",
        "country": "Egypt",
        "date": "2023-10-12",
        "time": "07:30",
        "equipment": ["12L tank", "torch"]
    })
}

#[tokio::test]
async fn test_create_then_search_and_get() {
    let (_tmp, registry, ctx) = setup().await;

    let created = call(&registry, &ctx, "create_dive_log", thistlegorm()).await;
    assert_eq!(created["success"], true);
    let id = created["dive_id"].as_str().unwrap().to_string();

    let found = call(
        &registry,
        &ctx,
        "search_dive_logs",
        json!({ "query": "motorbikes", "location": "Egypt" }),
    )
    .await;
    assert_eq!(found["success"], true);
    assert_eq!(found["count"], 1);
    assert_eq!(found["results"][0]["id"], id.as_str());
    assert_eq!(found["results"][0]["site"], "SS Thistlegorm");
    assert!(found["results"][0]["score"].is_number());

    let fetched = call(&registry, &ctx, "get_dive_log", json!({ "id": id })).await;
    assert_eq!(fetched["success"], true);
    assert_eq!(fetched["dive"]["equipment"], json!(["12L tank", "torch"]));
    assert_eq!(fetched["dive"]["depth_max"], 30.0);
}

#[tokio::test]
async fn test_get_all_dives_includes_summary() {
    let (_tmp, registry, ctx) = setup().await;

    call(&registry, &ctx, "create_dive_log", thistlegorm()).await;
    call(
        &registry,
        &ctx,
        "create_dive_log",
        json!({
            "site": "Blue Corner",
            "narrative": "Sharks on the wall",
            "depth_max": 31.5,
            "length_minutes": 52,
            "dive_type": "recreational",
            "country": "Palau",
            "highlights": "barracuda schools"
        }),
    )
    .await;

    let all = call(&registry, &ctx, "get_all_dives", json!({})).await;
    assert_eq!(all["success"], true);
    assert_eq!(all["count"], 2);
    assert_eq!(all["summary"]["total_dives"], 2);
    assert_eq!(all["summary"]["total_minutes"], 97);
    assert_eq!(all["summary"]["deepest_dive"]["site"], "Blue Corner");
    assert_eq!(all["summary"]["countries"], json!(["Egypt", "Palau"]));
    // dated entries come before undated ones
    assert_eq!(all["results"][0]["site"], "SS Thistlegorm");
}

#[tokio::test]
async fn test_get_all_dives_accepts_empty_arguments() {
    let (_tmp, registry, ctx) = setup().await;
    let outcome = registry.dispatch("get_all_dives", "", &ctx).await;
    assert!(outcome.success);
    assert_eq!(outcome.payload["count"], 0);
}

#[tokio::test]
async fn test_preferences_roundtrip_and_unset() {
    let (_tmp, registry, ctx) = setup().await;

    let unset = call(&registry, &ctx, "get_user_preference", json!({ "key": "depth_unit" })).await;
    assert_eq!(unset["success"], true);
    assert_eq!(unset["is_set"], false);
    assert!(unset["value"].is_null());

    let saved = call(
        &registry,
        &ctx,
        "save_user_preference",
        json!({ "key": "depth_unit", "value": "feet" }),
    )
    .await;
    assert_eq!(saved["success"], true);

    let read = call(&registry, &ctx, "get_user_preference", json!({ "key": "depth_unit" })).await;
    assert_eq!(read["is_set"], true);
    assert_eq!(read["value"], "feet");
}

#[tokio::test]
async fn test_unknown_tool_is_validation_error() {
    let (_tmp, registry, ctx) = setup().await;
    let outcome = registry.dispatch("delete_dive_log", "{}", &ctx).await;
    assert!(!outcome.success);
    assert_eq!(outcome.payload["success"], false);
    assert_eq!(outcome.payload["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_malformed_arguments_are_validation_error() {
    let (_tmp, registry, ctx) = setup().await;
    let outcome = registry
        .dispatch("search_dive_logs", "{\"query\": ", &ctx)
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.payload["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_wrong_argument_type_is_validation_error() {
    let (_tmp, registry, ctx) = setup().await;
    let payload = call(
        &registry,
        &ctx,
        "search_dive_logs",
        json!({ "query": "wreck", "max_depth": "thirty" }),
    )
    .await;
    assert_eq!(payload["error"]["code"], "validation_error");
    assert!(payload["error"]["message"]
        .as_str()
        .unwrap()
        .contains("max_depth"));
}

#[tokio::test]
async fn test_invalid_create_reports_reason() {
    let (_tmp, registry, ctx) = setup().await;
    let mut args = thistlegorm();
    args["depth_avg"] = json!(35);

    let payload = call(&registry, &ctx, "create_dive_log", args).await;
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error"]["code"], "validation_error");
    assert!(payload["error"]["message"]
        .as_str()
        .unwrap()
        .contains("depth_avg"));

    let all = call(&registry, &ctx, "get_all_dives", json!({})).await;
    assert_eq!(all["count"], 0);
}

#[tokio::test]
async fn test_missing_dive_is_not_found() {
    let (_tmp, registry, ctx) = setup().await;
    let payload = call(&registry, &ctx, "get_dive_log", json!({ "id": "nope" })).await;
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_null_optional_filters_are_ignored() {
    let (_tmp, registry, ctx) = setup().await;
    call(&registry, &ctx, "create_dive_log", thistlegorm()).await;

    let payload = call(
        &registry,
        &ctx,
        "search_dive_logs",
        json!({ "query": "wreck", "location": null, "dive_type": null, "max_depth": null }),
    )
    .await;
    assert_eq!(payload["success"], true);
    assert_eq!(payload["count"], 1);
}

#[tokio::test]
async fn test_search_without_query_filters_only() {
    let (_tmp, registry, ctx) = setup().await;
    call(&registry, &ctx, "create_dive_log", thistlegorm()).await;
    call(
        &registry,
        &ctx,
        "create_dive_log",
        json!({
            "site": "Blue Corner",
            "narrative": "Sharks on the wall",
            "depth_max": 31.5,
            "length_minutes": 52,
            "dive_type": "recreational"
        }),
    )
    .await;

    let payload = call(&registry, &ctx, "search_dive_logs", json!({ "dive_type": "wreck" })).await;
    assert_eq!(payload["success"], true);
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["results"][0]["site"], "SS Thistlegorm");
}

#[tokio::test]
async fn test_oversized_length_is_rejected_and_summary_still_works() {
    let (_tmp, registry, ctx) = setup().await;
    call(&registry, &ctx, "create_dive_log", thistlegorm()).await;

    let mut args = thistlegorm();
    args["length_minutes"] = json!(i64::MAX);
    let payload = call(&registry, &ctx, "create_dive_log", args).await;
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error"]["code"], "validation_error");
    assert!(payload["error"]["message"]
        .as_str()
        .unwrap()
        .contains("length_minutes"));

    let mut args = thistlegorm();
    args["depth_max"] = json!(1.0e9);
    let payload = call(&registry, &ctx, "create_dive_log", args).await;
    assert_eq!(payload["error"]["code"], "validation_error");

    let all = call(&registry, &ctx, "get_all_dives", json!({})).await;
    assert_eq!(all["success"], true);
    assert_eq!(all["summary"]["total_minutes"], 45);
}

#[tokio::test]
async fn test_closed_store_reports_storage_unavailable() {
    let (_tmp, registry, ctx) = setup().await;
    call(&registry, &ctx, "create_dive_log", thistlegorm()).await;
    ctx.store().close().await;

    for (name, args) in [
        ("get_all_dives", json!({})),
        ("search_dive_logs", json!({ "query": "wreck" })),
        ("create_dive_log", thistlegorm()),
        ("get_user_preference", json!({ "key": "depth_unit" })),
    ] {
        let outcome = registry.dispatch(name, &args.to_string(), &ctx).await;
        assert!(!outcome.success, "{} succeeded on a closed store", name);
        assert_eq!(outcome.payload["success"], false);
        assert_eq!(outcome.payload["error"]["code"], "storage_unavailable", "{}", name);
    }
}
