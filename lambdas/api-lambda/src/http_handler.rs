use evok_shared::{
    analytics,
    auth::{self, Caller, LoginRequest},
    error::{ApiError, ApiResult},
    leads, response, stats, users, AppState,
};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Status code and JSON body of a successful route.
struct Reply {
    status: StatusCode,
    body: serde_json::Value,
}

impl Reply {
    fn with<T: Serialize>(status: StatusCode, body: &T) -> ApiResult<Self> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::internal(format!("Failed to serialize response: {}", e)))?;
        Ok(Self { status, body })
    }

    fn ok<T: Serialize>(body: &T) -> ApiResult<Self> {
        Self::with(StatusCode::OK, body)
    }

    fn created<T: Serialize>(body: &T) -> ApiResult<Self> {
        Self::with(StatusCode::CREATED, body)
    }

    fn message(text: &str) -> ApiResult<Self> {
        Self::ok(&serde_json::json!({ "message": text }))
    }
}

/// Main Lambda handler - routes every /api request
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("EVOK API invoked - Method: {} Path: {}", method, path);

    let origin = state.config.client_url.as_str();

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return response::preflight(origin);
    }

    match route(&event, &state).await {
        Ok(reply) => response::json(reply.status, &reply.body, origin),
        Err(err) => response::error(&err, origin),
    }
}

async fn route(event: &Request, state: &AppState) -> ApiResult<Reply> {
    let method = event.method();
    let body = event.body();
    let parts: Vec<&str> = event
        .uri()
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match (method, parts.as_slice()) {
        // --- PUBLIC ---
        (&Method::GET, ["api", "health"]) => Reply::ok(&serde_json::json!({
            "status": "OK",
            "message": "EVOK Lead Tracker API is running",
        })),
        (&Method::GET, ["api", "stats"]) => {
            Reply::ok(&stats::dashboard_stats(state.leads.as_ref()).await?)
        }

        // --- AUTH ---
        (&Method::POST, ["api", "auth", "register"]) => {
            let user = users::register(
                state.users.as_ref(),
                state.credentials.as_ref(),
                parse_body(body)?,
            )
            .await?;
            Reply::created(&user)
        }
        (&Method::POST, ["api", "auth", "login"]) => {
            let req: LoginRequest = parse_body(body)?;
            Reply::ok(&auth::login(state.users.as_ref(), state.credentials.as_ref(), req).await?)
        }
        (&Method::GET, ["api", "auth", "me"]) => {
            let caller = caller(event, state).await?;
            Reply::ok(&users::current_user(state.users.as_ref(), caller.as_ref()).await?)
        }

        // --- LEADS ---
        // Reads are owner-scoped; writes on an existing lead only require a signed-in caller.
        (&Method::GET, ["api", "leads"]) => {
            let caller = caller(event, state).await?;
            Reply::ok(&leads::list_leads(state.leads.as_ref(), caller.as_ref()).await?)
        }
        (&Method::POST, ["api", "leads"]) => {
            let caller = caller(event, state).await?;
            let lead =
                leads::create_lead(state.leads.as_ref(), caller.as_ref(), parse_body(body)?).await?;
            Reply::created(&lead)
        }
        (&Method::GET, ["api", "leads", lead_id]) => {
            let caller = caller(event, state).await?;
            Reply::ok(&leads::get_lead(state.leads.as_ref(), lead_id, caller.as_ref()).await?)
        }
        (&Method::PUT, ["api", "leads", lead_id]) => {
            let caller = caller(event, state).await?;
            let lead =
                leads::update_lead(state.leads.as_ref(), lead_id, caller.as_ref(), parse_body(body)?)
                    .await?;
            Reply::ok(&lead)
        }
        (&Method::DELETE, ["api", "leads", lead_id]) => {
            let caller = caller(event, state).await?;
            leads::delete_lead(state.leads.as_ref(), lead_id, caller.as_ref()).await?;
            Reply::message("Lead deleted successfully")
        }
        (&Method::POST, ["api", "leads", lead_id, "log"]) => {
            let caller = caller(event, state).await?;
            let lead =
                leads::add_log(state.leads.as_ref(), lead_id, caller.as_ref(), parse_body(body)?)
                    .await?;
            Reply::ok(&lead)
        }

        // --- ADMIN ---
        (&Method::GET, ["api", "admin", "users"]) => {
            let caller = caller(event, state).await?;
            Reply::ok(&users::list_users(state.users.as_ref(), caller.as_ref()).await?)
        }
        (&Method::POST, ["api", "admin", "users"]) => {
            let caller = caller(event, state).await?;
            let user = users::create_user(
                state.users.as_ref(),
                state.credentials.as_ref(),
                caller.as_ref(),
                parse_body(body)?,
            )
            .await?;
            Reply::created(&user)
        }
        (&Method::PUT, ["api", "admin", "users", user_id]) => {
            let caller = caller(event, state).await?;
            let user =
                users::update_user(state.users.as_ref(), user_id, caller.as_ref(), parse_body(body)?)
                    .await?;
            Reply::ok(&user)
        }
        (&Method::DELETE, ["api", "admin", "users", user_id]) => {
            let caller = caller(event, state).await?;
            users::delete_user(
                state.users.as_ref(),
                state.credentials.as_ref(),
                user_id,
                caller.as_ref(),
            )
            .await?;
            Reply::message("User deleted successfully")
        }
        (&Method::GET, ["api", "admin", "analytics"]) => {
            let caller = caller(event, state).await?;
            let analytics =
                analytics::admin_analytics(state.leads.as_ref(), state.users.as_ref(), caller.as_ref())
                    .await?;
            Reply::ok(&analytics)
        }
        (&Method::GET, ["api", "admin", "activity-logs"]) => {
            let caller = caller(event, state).await?;
            Reply::ok(&analytics::activity_log_feed(state.leads.as_ref(), caller.as_ref()).await?)
        }

        (_, parts) if is_known_path(parts) => Err(ApiError::MethodNotAllowed),
        _ => Err(ApiError::RouteNotFound),
    }
}

fn is_known_path(parts: &[&str]) -> bool {
    matches!(
        parts,
        ["api", "health"]
            | ["api", "stats"]
            | ["api", "auth", "register" | "login" | "me"]
            | ["api", "leads"]
            | ["api", "leads", _]
            | ["api", "leads", _, "log"]
            | ["api", "admin", "users"]
            | ["api", "admin", "users", _]
            | ["api", "admin", "analytics" | "activity-logs"]
    )
}

/// An empty body reads as a request with every field absent.
fn parse_body<T: DeserializeOwned + Default>(body: &Body) -> ApiResult<T> {
    let bytes: &[u8] = body.as_ref();
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// User id from the JWT authorizer. In local development an `X-User-Id`
/// header may stand in for the token.
fn subject(event: &Request, allow_user_id_header: bool) -> Option<String> {
    let from_header = allow_user_id_header
        .then(|| {
            event
                .headers()
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .flatten();

    from_header.or_else(|| {
        event
            .request_context_ref()
            .and_then(|ctx| ctx.authorizer())
            .and_then(|auth| auth.jwt.as_ref())
            .and_then(|jwt| jwt.claims.get("sub"))
            .map(|s| s.to_string())
    })
}

async fn caller(event: &Request, state: &AppState) -> ApiResult<Option<Caller>> {
    let subject = subject(event, state.config.allow_user_id_header);
    auth::resolve_caller(state.users.as_ref(), subject.as_deref()).await
}
