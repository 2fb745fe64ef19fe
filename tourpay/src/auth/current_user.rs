use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Extract user from an `Authorization: Bearer <jwt>` header if present
/// Returns:
/// - None: No bearer token present
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): Bearer token present but invalid/expired
fn try_bearer_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<CurrentUser>> {
    let value = parts.headers.get(header::AUTHORIZATION)?;
    let token = match value.to_str() {
        Ok(v) => v.strip_prefix("Bearer ")?.trim(),
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };
    Some(session::verify_session_token(token, config))
}

/// Extract user from JWT session cookie if present and valid
/// Returns:
/// - None: No JWT cookie present
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): JWT cookie present but invalid/malformed
fn try_cookie_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<CurrentUser>> {
    let cookie_header = parts.headers.get(header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.cookie_name;

    let mut last_error = None;
    for cookie in cookie_str.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=')
            && name == cookie_name
        {
            match session::verify_session_token(value, config) {
                Ok(user) => return Some(Ok(user)),
                // Keep looking; a stale cookie may sit next to a fresh one
                Err(e) => last_error = Some(e),
            }
        }
    }
    last_error.map(Err)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Bearer token first (API clients), then the session cookie (browser)
        let mut attempted = false;

        for (source, result) in [
            ("bearer", try_bearer_auth(parts, &state.config)),
            ("cookie", try_cookie_auth(parts, &state.config)),
        ] {
            match result {
                Some(Ok(user)) => {
                    debug!(user_id = %user.id, "Authenticated via {source}");
                    return Ok(user);
                }
                Some(Err(e)) => {
                    trace!("{source} authentication failed: {:?}", e);
                    attempted = true;
                }
                None => trace!("No {source} credentials"),
            }
        }

        if attempted {
            Err(Error::Unauthenticated {
                message: Some("Invalid or expired session".to_string()),
            })
        } else {
            Err(Error::Unauthenticated { message: None })
        }
    }
}
