#![forbid(unsafe_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use subtrack_adapter::{
    observability::{init_observability, LogFormat},
    malformed_request_auth, malformed_request_subscription, AdapterConfig, AdapterHealthResponse, AdapterRuntime, AuthAdapterRequest,
    AuthAdapterResponse, RequestClock, SubscriptionAdapterRequest, SubscriptionAdapterResponse,
    SubscriptionListQuery, SubscriptionListResponse, PRINCIPAL_HEADER,
};
use tracing::{error, info};

type SharedRuntime = Arc<Mutex<AdapterRuntime>>;

const LOCK_POISONED: &str = "adapter runtime lock poisoned";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_observability(LogFormat::from_env());

    let config = AdapterConfig::from_env();
    let addr: SocketAddr = config.bind.parse()?;
    let runtime: SharedRuntime = Arc::new(Mutex::new(AdapterRuntime::from_config(&config)?));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/auth/anonymous", post(sign_in_anonymously))
        .route("/v1/auth/sign_out", post(sign_out))
        .route(
            "/v1/subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        .route(
            "/v1/subscriptions/:id",
            get(get_subscription)
                .put(update_subscription)
                .delete(delete_subscription),
        )
        .with_state(runtime);

    info!(
        %addr,
        journal = ?config.store_path,
        "subtrack_adapter_http listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn lock_runtime(runtime: &SharedRuntime) -> Option<MutexGuard<'_, AdapterRuntime>> {
    match runtime.lock() {
        Ok(guard) => Some(guard),
        Err(_) => {
            error!("{LOCK_POISONED}");
            None
        }
    }
}

fn principal_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
}

fn poisoned_subscription() -> (StatusCode, Json<SubscriptionAdapterResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(SubscriptionAdapterResponse {
            status: "error".to_string(),
            outcome: "REJECTED".to_string(),
            reason: Some(LOCK_POISONED.to_string()),
            subscription: None,
        }),
    )
}

fn malformed_subscription(rejection: JsonRejection) -> (StatusCode, Json<SubscriptionAdapterResponse>) {
    let (status, out) = malformed_request_subscription(rejection.body_text());
    (status, Json(out))
}

fn poisoned_auth() -> (StatusCode, Json<AuthAdapterResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AuthAdapterResponse {
            status: "error".to_string(),
            outcome: "REJECTED".to_string(),
            reason: Some(LOCK_POISONED.to_string()),
            principal_id: None,
        }),
    )
}

async fn healthz(State(runtime): State<SharedRuntime>) -> (StatusCode, Json<AdapterHealthResponse>) {
    let Some(runtime) = lock_runtime(&runtime) else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdapterHealthResponse {
                status: "error".to_string(),
                outcome: "UNHEALTHY".to_string(),
                reason: Some(LOCK_POISONED.to_string()),
                journal_path: None,
                active_principals: 0,
                stored_subscriptions: 0,
            }),
        );
    };
    (StatusCode::OK, Json(runtime.health_report()))
}

async fn sign_in_anonymously(
    State(runtime): State<SharedRuntime>,
    request: Result<Json<AuthAdapterRequest>, JsonRejection>,
) -> (StatusCode, Json<AuthAdapterResponse>) {
    // A bodiless call is a fresh anonymous sign-in.
    let request = match request {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => AuthAdapterRequest::default(),
        Err(rejection) => {
            let (status, out) = malformed_request_auth(rejection.body_text());
            return (status, Json(out));
        }
    };
    let Some(mut runtime) = lock_runtime(&runtime) else {
        return poisoned_auth();
    };
    let (status, out) = runtime.sign_in_anonymously(request);
    (status, Json(out))
}

async fn sign_out(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
) -> (StatusCode, Json<AuthAdapterResponse>) {
    let Some(mut runtime) = lock_runtime(&runtime) else {
        return poisoned_auth();
    };
    let (status, out) = runtime.sign_out(principal_header(&headers));
    (status, Json(out))
}

async fn list_subscriptions(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Query(query): Query<SubscriptionListQuery>,
) -> (StatusCode, Json<SubscriptionListResponse>) {
    let Some(runtime) = lock_runtime(&runtime) else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SubscriptionListResponse {
                status: "error".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(LOCK_POISONED.to_string()),
                sort: None,
                direction: None,
                subscriptions: Vec::new(),
            }),
        );
    };
    let (status, out) =
        runtime.list_subscriptions(principal_header(&headers), &query, RequestClock::system());
    (status, Json(out))
}

async fn create_subscription(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    request: Result<Json<SubscriptionAdapterRequest>, JsonRejection>,
) -> (StatusCode, Json<SubscriptionAdapterResponse>) {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => return malformed_subscription(rejection),
    };
    let Some(mut runtime) = lock_runtime(&runtime) else {
        return poisoned_subscription();
    };
    let (status, out) =
        runtime.create_subscription(principal_header(&headers), request, RequestClock::system());
    (status, Json(out))
}

async fn get_subscription(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> (StatusCode, Json<SubscriptionAdapterResponse>) {
    let Some(runtime) = lock_runtime(&runtime) else {
        return poisoned_subscription();
    };
    let (status, out) =
        runtime.get_subscription(principal_header(&headers), &id, RequestClock::system());
    (status, Json(out))
}

async fn update_subscription(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Path(id): Path<String>,
    request: Result<Json<SubscriptionAdapterRequest>, JsonRejection>,
) -> (StatusCode, Json<SubscriptionAdapterResponse>) {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => return malformed_subscription(rejection),
    };
    let Some(mut runtime) = lock_runtime(&runtime) else {
        return poisoned_subscription();
    };
    let (status, out) = runtime.update_subscription(
        principal_header(&headers),
        &id,
        request,
        RequestClock::system(),
    );
    (status, Json(out))
}

async fn delete_subscription(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> (StatusCode, Json<SubscriptionAdapterResponse>) {
    let Some(mut runtime) = lock_runtime(&runtime) else {
        return poisoned_subscription();
    };
    let (status, out) = runtime.delete_subscription(principal_header(&headers), &id);
    (status, Json(out))
}
