use crate::metrics::{OPS_TOTAL, OP_DURATION_SEC, OP_ERRORS_TOTAL};
use axum::http::StatusCode;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use docsel_core::filter::filters_from_params;
use docsel_core::{FindOptions, FindResult, QueryError, StoreError};
use docsel_storage::Resource;
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

const FIELDS_PARAM: &str = "fields";
const INCLUDE_DOCS_PARAM: &str = "include_docs";

#[derive(Clone)]
struct AppState {
    resource: Resource,
    base: Arc<str>,
}

impl AppState {
    fn url(&self, id: &str) -> String {
        format!("{}/{}", self.base, id)
    }
}

pub fn router(resource: Resource) -> Router {
    let base = format!("/api/v1/{}", resource.collection());
    let state = AppState {
        resource,
        base: Arc::from(base.as_str()),
    };
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(&base, get(list).post(create))
        .route(
            &format!("{base}/:id"),
            get(read).put(update).delete(remove),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn error_response(op: &str, e: QueryError) -> Response {
    let (status, kind) = match &e {
        QueryError::MalformedSelection { .. } => (StatusCode::BAD_REQUEST, "malformed_selection"),
        QueryError::SchemaMismatch { .. } => (StatusCode::BAD_REQUEST, "schema_mismatch"),
        QueryError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        QueryError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
        QueryError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
    };
    OP_ERRORS_TOTAL.with_label_values(&[op, kind]).inc();
    (status, Json(json!({"error": e.to_string()}))).into_response()
}

fn flag(value: &str) -> bool {
    !matches!(value, "false" | "0")
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics() -> impl IntoResponse {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&prometheus::gather(), &mut buf) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            buf,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /api/v1/<c>?include_docs&fields=...&<property><op>=<value>...`
async fn list(
    State(app): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let _timer = OP_DURATION_SEC.with_label_values(&["list"]).start_timer();
    let mut opts = FindOptions::all();
    let mut rest = Vec::with_capacity(params.len());
    for (k, v) in params {
        match k.as_str() {
            FIELDS_PARAM => opts.fields = Some(v.into()),
            INCLUDE_DOCS_PARAM => opts.include_docs = flag(&v),
            _ => rest.push((k, v)),
        }
    }
    let offered = rest.len();
    opts.filters = filters_from_params(rest, app.resource.config().fields.as_ref());
    if opts.filters.len() < offered {
        warn!(
            dropped = offered - opts.filters.len(),
            "ignored filter parameters outside the schema"
        );
    }
    match app.resource.find(opts).await {
        Ok(FindResult::Ids(ids)) => {
            OPS_TOTAL.with_label_values(&["list"]).inc();
            let urls: Vec<String> = ids.iter().map(|id| app.url(id)).collect();
            (StatusCode::OK, Json(urls)).into_response()
        }
        Ok(found) => {
            OPS_TOTAL.with_label_values(&["list"]).inc();
            (StatusCode::OK, Json(found)).into_response()
        }
        Err(e) => error_response("list", e),
    }
}

#[derive(serde::Deserialize)]
struct ReadOpts {
    fields: Option<String>,
}

async fn read(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ReadOpts>,
) -> Response {
    let _timer = OP_DURATION_SEC.with_label_values(&["read"]).start_timer();
    let mut opts = FindOptions::by_id(id);
    if let Some(fields) = q.fields {
        opts = opts.fields(fields);
    }
    match app.resource.find(opts).await {
        Ok(found) => {
            OPS_TOTAL.with_label_values(&["read"]).inc();
            (StatusCode::OK, Json(found)).into_response()
        }
        Err(e) => error_response("read", e),
    }
}

async fn create(State(app): State<AppState>, Json(body): Json<JsonValue>) -> Response {
    save(&app, "create", body).await
}

async fn update(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(mut body): Json<JsonValue>,
) -> Response {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("id".into(), JsonValue::String(id));
    }
    save(&app, "update", body).await
}

async fn save(app: &AppState, op: &str, body: JsonValue) -> Response {
    let _timer = OP_DURATION_SEC.with_label_values(&[op]).start_timer();
    match app.resource.save(body).await {
        Ok(id) => {
            OPS_TOTAL.with_label_values(&[op]).inc();
            (StatusCode::OK, Json(app.url(&id))).into_response()
        }
        Err(e) => error_response(op, e),
    }
}

async fn remove(State(app): State<AppState>, Path(id): Path<String>) -> Response {
    let _timer = OP_DURATION_SEC.with_label_values(&["delete"]).start_timer();
    match app.resource.delete(&id).await {
        Ok(()) => {
            OPS_TOTAL.with_label_values(&["delete"]).inc();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response("delete", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use docsel_core::{parse, ResourceConfig};
    use docsel_storage::{DocumentStore, InMemoryStore};
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Arc::new(InMemoryStore::new());
        let cfg = ResourceConfig::new("test").with_fields(parse("name,owner:(first)").unwrap());
        let resource = Resource::new(store.clone(), cfg);
        resource.init().await.unwrap();
        for (id, name, first) in [("1", "foo", "ann"), ("2", "bar", "bob"), ("3", "baz", "ann")] {
            store
                .insert(
                    json!({"name": name, "owner": {"first": first}}),
                    &format!("test-{id}"),
                )
                .await
                .unwrap();
        }
        router(resource)
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
        let req = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn list_responds_with_urls() {
        let (status, body) = call(app().await, Method::GET, "/api/v1/test", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!(["/api/v1/test/1", "/api/v1/test/2", "/api/v1/test/3"])
        );
    }

    #[tokio::test]
    async fn list_with_docs_and_fields() {
        let (status, body) = call(
            app().await,
            Method::GET,
            "/api/v1/test?include_docs=true&fields=name",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"name": "foo"}, {"name": "bar"}, {"name": "baz"}]));
    }

    #[tokio::test]
    async fn list_applies_suffix_operators_and_ignores_unknown_params() {
        let (_, body) = call(app().await, Method::GET, "/api/v1/test?name=foo", None).await;
        assert_eq!(body, json!(["/api/v1/test/1"]));

        let (_, body) = call(app().await, Method::GET, "/api/v1/test?name%5E=ba", None).await;
        assert_eq!(body, json!(["/api/v1/test/2", "/api/v1/test/3"]));

        let (_, body) = call(
            app().await,
            Method::GET,
            "/api/v1/test?owner%3A(first)=ann&colour=red",
            None,
        )
        .await;
        assert_eq!(body, json!(["/api/v1/test/1", "/api/v1/test/3"]));
    }

    #[tokio::test]
    async fn malformed_fields_is_bad_request() {
        let (status, body) =
            call(app().await, Method::GET, "/api/v1/test?include_docs&fields=name:(", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn read_one_and_missing() {
        let app = app().await;
        let (status, body) = call(app.clone(), Method::GET, "/api/v1/test/2?fields=name", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"name": "bar"}));

        let (status, body) = call(app, Method::GET, "/api/v1/test/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no test with id 9 found");
    }

    #[tokio::test]
    async fn create_update_delete_round() {
        let app = app().await;
        let (status, url) = call(
            app.clone(),
            Method::POST,
            "/api/v1/test",
            Some(json!({"name": "new", "colour": "red"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let url = url.as_str().unwrap().to_string();
        assert!(url.starts_with("/api/v1/test/"));

        let (status, body) = call(
            app.clone(),
            Method::PUT,
            &url,
            Some(json!({"name": "renamed"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(url));

        let (_, doc) = call(app.clone(), Method::GET, &url, None).await;
        assert_eq!(doc["name"], "renamed");
        assert!(doc.get("colour").is_none());

        let (status, _) = call(app.clone(), Method::DELETE, &url, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(app, Method::GET, &url, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_outside_schema_is_rejected() {
        let (status, body) = call(
            app().await,
            Method::POST,
            "/api/v1/test",
            Some(json!({"colour": "red"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("does not match model"));
    }

    #[tokio::test]
    async fn health_and_metrics() {
        let app = app().await;
        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        call(app.clone(), Method::GET, "/api/v1/test", None).await;
        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let text = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&text).contains("docsel_ops_total"));
    }
}
