use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Bearer-token middleware for the REST API.
///
/// `/status` stays open for health checks and `/slack/events` carries its own
/// HMAC authentication, so both bypass the token check. Everything else needs
/// `Authorization: Bearer <token>` matching the configured token; when no
/// token is configured at all the API refuses requests outright.
pub async fn check_token(
    State(token): State<Option<String>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path();
    if path == "/status" || path.starts_with("/slack/") {
        return Ok(next.run(request).await);
    }

    let Some(expected) = token else {
        tracing::error!("SWITCHBOARD_API_TOKEN is not set, refusing API request");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        });

    match presented {
        Some(value) if constant_time_eq(value, &expected) => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
