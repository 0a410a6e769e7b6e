use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use warp::{hyper::StatusCode, path, Filter, Rejection, Reply};

use crate::{
    auth::Auth,
    case_insensitive_string_ext::CaseInsensitiveStringExt,
    error::AuthError,
    types::{Email, SessionToken, Username},
};

/// Cookie that carries the session token back to browsers.
pub const SESSION_COOKIE_NAME: &str = "coldfinance-user";

pub fn build_api_route_filter(
    auth: &Auth,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let register = path!("users" / "register")
        .and(warp::post())
        .and(warp::body::form())
        .and(with_auth_state(auth.clone()))
        .and_then(user_register);

    let login = path!("users" / "login")
        .and(warp::post())
        .and(warp::body::form())
        .and(with_auth_state(auth.clone()))
        .and_then(user_login);

    register.or(login)
}

/// Extract the email of the authenticated user from a bearer token, or failing that from the
/// session cookie.
pub fn with_auth(auth: &Auth) -> impl Filter<Extract = (Email,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::cookie::optional::<String>(SESSION_COOKIE_NAME))
        .and(with_auth_state(auth.clone()))
        .and_then(user_auth_check)
}

pub async fn handle_auth_errors(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(auth_error) = err.find::<AuthError>() {
        let (status, message) = match &auth_error {
            AuthError::AccountAlreadyExists => (
                StatusCode::CONFLICT,
                "an account with that email or username already exists",
            ),
            AuthError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                "username, email and password are required",
            ),
            AuthError::InvalidCredentials => (StatusCode::FORBIDDEN, "invalid email or password"),
            AuthError::TokenError { .. } | AuthError::TokenExpired => {
                (StatusCode::FORBIDDEN, "access denied")
            }
            AuthError::LookupFailure { .. } | AuthError::Timeout => (
                StatusCode::SERVICE_UNAVAILABLE,
                "the service is temporarily unavailable, please retry",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "an unknown error has occurred",
            ),
        };
        return Ok(warp::reply::with_status(message, status));
    }

    Err(err)
}

/// `Set-Cookie` value for a session. The cookie lives exactly as long as the token it carries.
pub fn session_cookie(session: &SessionToken) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE_NAME,
        session.token,
        session.claims.lifetime_secs()
    )
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub location: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
}

async fn user_register(input: RegisterForm, auth: Auth) -> Result<impl Reply, Rejection> {
    auth.register(
        &Username(input.username),
        &Email(input.email),
        &input.location,
        &input.password,
    )
    .await?;

    Ok(warp::reply::json(&RegisterResponse {
        message: "account created successfully!",
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: u64,
}

async fn user_login(input: LoginForm, auth: Auth) -> Result<impl Reply, Rejection> {
    let session = auth.login(&Email(input.email), &input.password).await?;

    let body = warp::reply::json(&LoginResponse {
        token: session.token.clone(),
        expires_at: session.claims.exp,
    });

    Ok(warp::reply::with_header(
        body,
        "set-cookie",
        session_cookie(&session),
    ))
}

// Unwrap the bearer token (or the cookie) and validate it
async fn user_auth_check(
    header: Option<String>,
    cookie: Option<String>,
    auth: Auth,
) -> Result<Email, Rejection> {
    // a non-bearer authorization header does not hide the session cookie
    let token = header
        .as_deref()
        .and_then(|header| header.strip_prefix_ignore_ascii_case("bearer "))
        .or(cookie.as_deref())
        .ok_or(AuthError::TokenError { source: None })?;

    let claims = auth.verify_session_token(token)?;

    Ok(Email(claims.sub))
}

// functor that adds a handle to the auth state into the filter chain
fn with_auth_state(auth: Auth) -> impl Filter<Extract = (Auth,), Error = Infallible> + Clone {
    warp::any().map(move || auth.clone())
}
