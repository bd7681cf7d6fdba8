//! HTTP routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use guildcraft_shared::{
    EventAccepted, GroupResponse, JobListQuery, JobResponse, MemberResponse, StatusResponse,
    SyncRequest, SyncResponse, TeleportQuery, TeleportTarget,
};
use std::sync::Arc;

use crate::app::App;
use crate::use_cases::{IngestError, Ingested, QueryError, SyncError};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/groups", get(list_groups))
        .route("/api/groups/{id}/members", get(list_members))
        .route("/api/sync", post(sync))
        .route("/api/members/teleport", get(teleport))
        .route("/api/status", get(status))
        .route("/api/jobs", get(list_jobs))
        .route("/api/events", post(ingest_event))
}

async fn health() -> &'static str {
    "OK"
}

async fn list_groups(State(app): State<Arc<App>>) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let groups = app.use_cases.queries.list_groups().await?;
    Ok(Json(groups))
}

async fn list_members(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<MemberResponse>>, ApiError> {
    let members = app.use_cases.queries.group_members(id).await?;
    Ok(Json(members))
}

async fn sync(
    State(app): State<Arc<App>>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let response = app.use_cases.sync.execute(request).await?;
    Ok(Json(response))
}

async fn teleport(
    State(app): State<Arc<App>>,
    Query(query): Query<TeleportQuery>,
) -> Result<Json<TeleportTarget>, ApiError> {
    let target = app.use_cases.queries.teleport(&query.name).await?;
    Ok(Json(target))
}

async fn status(State(app): State<Arc<App>>) -> Result<Json<StatusResponse>, ApiError> {
    let status = app.use_cases.queries.status().await?;
    Ok(Json(status))
}

async fn list_jobs(
    State(app): State<Arc<App>>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<JobResponse>>, ApiError> {
    let jobs = app.use_cases.queries.list_jobs(query).await?;
    Ok(Json(jobs))
}

// =============================================================================
// Gateway events
// =============================================================================

/// The body is taken raw so a malformed event is reported, not rejected by
/// the extractor.
async fn ingest_event(
    State(app): State<Arc<App>>,
    body: String,
) -> Result<(StatusCode, Json<EventAccepted>), ApiError> {
    match app.use_cases.events.handle_raw(&body).await? {
        Ingested::Dropped(reason) => Err(ApiError::BadRequest(reason)),
        outcome => Ok((
            StatusCode::ACCEPTED,
            Json(EventAccepted {
                outcome: outcome.as_str().to_string(),
                jobs_enqueued: outcome.jobs_enqueued() as u32,
            }),
        )),
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("{what} not found")).into_response()
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::NotFound(what) => ApiError::NotFound(what),
            QueryError::Invalid(msg) => ApiError::BadRequest(msg),
            QueryError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Invalid(msg) => ApiError::BadRequest(msg),
            SyncError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };
    use guildcraft_domain::LayoutConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::infrastructure::queues::InMemoryJobQueue;
    use crate::test_fixtures::{temp_store, TempStore};

    async fn router() -> (TempStore, Router) {
        let t = temp_store(LayoutConfig::default()).await;
        let app = App::new(
            t.store.clone(),
            Arc::new(InMemoryJobQueue::new()),
            LayoutConfig::default(),
        );
        let router = routes().with_state(Arc::new(app));
        (t, router)
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn sync_tree() -> Value {
        json!({
            "groups": (0..3).map(|g| json!({
                "externalId": format!("cat-{g}"),
                "name": format!("Category {g}"),
                "position": g,
                "members": (0..2).map(|m| json!({
                    "externalId": format!("chan-{g}-{m}"),
                    "name": format!("channel-{g}-{m}"),
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_t, router) = router().await;
        let response = router
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn sync_then_list_groups() {
        let (_t, router) = router().await;

        let (status, body) = send(&router, Method::POST, "/api/sync", Some(sync_tree())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["createdRecords"].as_u64().expect("created") >= 9);

        let (status, body) = send(&router, Method::GET, "/api/groups", None).await;
        assert_eq!(status, StatusCode::OK);
        let groups = body.as_array().expect("array");
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g["memberCount"] == 2));

        let id = groups[0]["id"].as_i64().expect("id");
        let (status, body) =
            send(&router, Method::GET, &format!("/api/groups/{id}/members"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().expect("array").len(), 2);
    }

    #[tokio::test]
    async fn unknown_group_members_is_404() {
        let (_t, router) = router().await;
        let (status, _) = send(&router, Method::GET, "/api/groups/42/members", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn events_are_accepted_or_rejected() {
        let (_t, router) = router().await;

        let event = json!({
            "eventType": "GroupCreated",
            "timestamp": "2026-01-01T12:00:00Z",
            "guildId": "guild",
            "groupId": "cat-1",
            "groupName": "Lobby",
        });
        let (status, body) = send(&router, Method::POST, "/api/events", Some(event.clone())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["outcome"], "processed");
        assert_eq!(body["jobsEnqueued"], 1);

        let (status, body) = send(&router, Method::POST, "/api/events", Some(event)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["outcome"], "noop");

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/events",
            Some(json!({ "eventType": "GroupCreated" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn teleport_finds_a_synced_channel() {
        let (_t, router) = router().await;
        send(&router, Method::POST, "/api/sync", Some(sync_tree())).await;

        let (status, body) = send(
            &router,
            Method::GET,
            "/api/members/teleport?name=channel-1-0",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["memberName"], "channel-1-0");
        assert_eq!(body["groupName"], "Category 1");
        assert_eq!(body["built"], false);

        let (status, _) =
            send(&router, Method::GET, "/api/members/teleport?name=nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_and_jobs_report_pending_work() {
        let (_t, router) = router().await;
        send(&router, Method::POST, "/api/sync", Some(sync_tree())).await;

        let (status, body) = send(&router, Method::GET, "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activeGroups"], 3);
        assert_eq!(body["activeMembers"], 6);
        assert_eq!(body["pendingJobs"], 9);
        assert_eq!(body["failedJobs"], 0);

        let (status, body) =
            send(&router, Method::GET, "/api/jobs?status=pending&limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().expect("array").len(), 5);

        let (status, _) = send(&router, Method::GET, "/api/jobs?status=bogus", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
