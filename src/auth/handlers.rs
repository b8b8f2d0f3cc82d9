use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AccountData, CrackResponse, CreatedUser, DemoCrackRequest, DemoRegisterResponse,
            LoginData, LoginRequest, RegisterRequest, ResendRequest, VerifyCodeRequest,
        },
        extractors::CurrentUser,
        hashing::{self, HashMethod},
        jwt::JwtKeys,
        repo::User,
        verification,
    },
    response::{ApiError, ApiResponse},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify-code", post(verify_code))
        .route("/auth/verify-email", post(resend_code))
        .route("/auth/account", get(get_account))
        .route("/auth/register-vulnerable", post(register_vulnerable))
        .route("/auth/register-secure", post(register_secure))
        .route("/auth/demo-crack", post(demo_crack))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn required(field: Option<String>) -> Option<String> {
    field.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// Passwords keep their whitespace; only emptiness is rejected.
fn required_password(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.is_empty())
}

// Emails are stored lowercased; every lookup must normalize the same
// way or a mixed-case registration becomes unverifiable.
fn required_email(field: Option<String>) -> Option<String> {
    required(field).map(|e| e.to_lowercase())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedUser>>), ApiError> {
    let (email, password, name) = match (
        required_email(payload.email),
        required_password(payload.password),
        required(payload.name),
    ) {
        (Some(e), Some(p), Some(n)) => (e, p, n),
        _ => {
            warn!("register with missing fields");
            return Err(ApiError::BadRequest(
                "Email, password, and name are required".into(),
            ));
        }
    };

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }

    if let Some(existing) = User::find_by_email(&state.db, &email).await? {
        if !existing.is_verified {
            // No duplicate row; reissue against the pending account.
            verification::issue_code(&state.db, state.mailer.as_ref(), &existing).await?;
            info!(user_id = %existing.id, "reissued code for pending registration");
            return Ok(ApiResponse::created(
                "Email already registered but not verified. A new code has been sent.",
                CreatedUser { id: existing.id },
            ));
        }
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    // Default registration path stores the modern, salted hash.
    let method = HashMethod::Bcrypt;
    let password_hash = hashing::hash(&password, method)?;
    let user = User::create(&state.db, &email, &name, &password_hash, method, false).await?;

    verification::issue_code(&state.db, state.mailer.as_ref(), &user).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(ApiResponse::created(
        "Registration successful. Check your email for the verification code.",
        CreatedUser { id: user.id },
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoginData>>), ApiError> {
    // The client sends the email in `username`.
    let (email, password) = match (
        required_email(payload.username),
        required_password(payload.password),
    ) {
        (Some(e), Some(p)) => (e, p),
        _ => {
            return Err(ApiError::BadRequest(
                "Email and password are required".into(),
            ))
        }
    };

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;

    // 400 rather than 401 so the client redirects to the verify screen.
    if !user.is_verified {
        warn!(email = %email, "login before verification");
        return Err(ApiError::BadRequest(
            "Account is not verified. Check your email for the verification code.".into(),
        ));
    }

    if !hashing::compare(&password, &user.password_hash, user.hash_method)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(ApiError::BadRequest("Incorrect password".into()));
    }

    let access_token = JwtKeys::from_ref(&state).sign(user.id, &user.email)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(ApiResponse::ok(
        "Login successful",
        LoginData { access_token, user },
    ))
}

#[instrument(skip(state, payload))]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<bool>>), ApiError> {
    let email = required_email(payload.email)
        .ok_or_else(|| ApiError::BadRequest("Email is required".into()))?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;

    verification::check_submission(&user, &payload.code, OffsetDateTime::now_utc())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    User::mark_verified(&state.db, user.id).await?;

    info!(user_id = %user.id, email = %user.email, "account verified");
    Ok(ApiResponse::ok("Account activated", true))
}

#[instrument(skip(state, payload))]
pub async fn resend_code(
    State(state): State<AppState>,
    Json(payload): Json<ResendRequest>,
) -> Result<(StatusCode, Json<ApiResponse<bool>>), ApiError> {
    let email = required_email(payload.email)
        .ok_or_else(|| ApiError::BadRequest("Email is required".into()))?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;

    if user.is_verified {
        return Err(ApiError::BadRequest("Account is already verified".into()));
    }

    verification::issue_code(&state.db, state.mailer.as_ref(), &user).await?;

    Ok(ApiResponse::ok(
        "Verification code resent. Check your email.",
        true,
    ))
}

#[instrument(skip_all)]
pub async fn get_account(
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<ApiResponse<AccountData>>), ApiError> {
    Ok(ApiResponse::ok("Account fetched", AccountData { user }))
}

/// Shared body of the two timing-demo registrations: force a method,
/// time the hash, and create the account pre-verified so the crack demo
/// can target it immediately.
async fn demo_register(
    state: AppState,
    payload: RegisterRequest,
    method: HashMethod,
) -> Result<(StatusCode, Json<DemoRegisterResponse>), ApiError> {
    let (email, password, name) = match (
        required_email(payload.email),
        required_password(payload.password),
        required(payload.name),
    ) {
        (Some(e), Some(p), Some(n)) => (e, p, n),
        _ => {
            return Err(ApiError::BadRequest(
                "Email, password, and name are required".into(),
            ))
        }
    };

    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let (password_hash, elapsed) = hashing::hash_timed(&password, method)?;
    let user = User::create(&state.db, &email, &name, &password_hash, method, true).await?;

    let ms = elapsed.as_secs_f64() * 1000.0;
    info!(user_id = %user.id, method = %method, hash_ms = ms, "demo registration");
    Ok((
        StatusCode::CREATED,
        Json(DemoRegisterResponse {
            message: format!("Registered with {method}. Hash time: {ms:.4} ms"),
            data: CreatedUser { id: user.id },
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn register_vulnerable(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<DemoRegisterResponse>), ApiError> {
    demo_register(state, payload, HashMethod::Md5).await
}

#[instrument(skip(state, payload))]
pub async fn register_secure(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<DemoRegisterResponse>), ApiError> {
    demo_register(state, payload, HashMethod::Bcrypt).await
}

/// Crack attempt against a loaded credential. Slow salted hashes are
/// refused before any comparison runs; the refusal is the lesson.
fn attempt_crack(user: &User, guess: &str) -> Result<CrackResponse, ApiError> {
    if !user.hash_method.is_fast() {
        return Err(ApiError::BadRequest(format!(
            "This credential uses a slow, salted hash ({}) and resists dictionary attacks; \
             direct comparison is pointless.",
            user.hash_method
        )));
    }

    let (matched, elapsed) = hashing::compare_timed(guess, &user.password_hash, user.hash_method)?;
    let ms = elapsed.as_secs_f64() * 1000.0;

    if matched {
        info!(user_id = %user.id, method = %user.hash_method, crack_ms = ms, "demo crack succeeded");
        Ok(CrackResponse {
            success: true,
            message: format!(
                "Password CRACKED! Method: {}. Time: {ms:.4} ms",
                user.hash_method
            ),
            password: Some(guess.to_string()),
        })
    } else {
        Ok(CrackResponse {
            success: false,
            message: format!("Guess '{guess}' failed. Time: {ms:.4} ms"),
            password: None,
        })
    }
}

#[instrument(skip(state, payload))]
pub async fn demo_crack(
    State(state): State<AppState>,
    Json(payload): Json<DemoCrackRequest>,
) -> Result<Json<CrackResponse>, ApiError> {
    let email = required_email(payload.email)
        .ok_or_else(|| ApiError::BadRequest("Email is required".into()))?;
    let guess = payload
        .password_guess
        .filter(|g| !g.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Password guess is required".into()))?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;

    attempt_crack(&user, &guess).map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use time::macros::datetime;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ann@example.com"));
        assert!(!is_valid_email("ann@example"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a b@example.com"));
    }

    #[test]
    fn required_trims_and_rejects_empty() {
        assert_eq!(required(Some("  ann  ".into())), Some("ann".to_string()));
        assert_eq!(required(Some("   ".into())), None);
        assert_eq!(required(None), None);
    }

    #[test]
    fn required_password_keeps_whitespace() {
        assert_eq!(
            required_password(Some(" pw ".into())),
            Some(" pw ".to_string())
        );
        assert_eq!(required_password(Some("".into())), None);
        assert_eq!(required_password(None), None);
    }

    #[test]
    fn required_email_lowercases_like_the_stored_column() {
        assert_eq!(
            required_email(Some("  Ann@X.com ".into())),
            Some("ann@x.com".to_string())
        );
        assert_eq!(required_email(Some("   ".into())), None);
        assert_eq!(required_email(None), None);
    }

    fn stored_user(method: HashMethod, password_hash: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: "ann@example.com".into(),
            name: "Ann".into(),
            password_hash: password_hash.into(),
            hash_method: method,
            is_verified: true,
            verification_code: None,
            verification_expires: None,
            created_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    #[test]
    fn crack_refuses_slow_hashes_even_for_a_correct_guess() {
        for method in [HashMethod::Bcrypt, HashMethod::Argon2] {
            let hash = hashing::hash("letmein", method).unwrap();
            let user = stored_user(method, &hash);
            let result = attempt_crack(&user, "letmein");
            assert!(
                matches!(result, Err(ApiError::BadRequest(_))),
                "{method} must be refused without comparison"
            );
        }
    }

    #[test]
    fn crack_times_weak_hash_and_echoes_cleartext_on_match() {
        let hash = hashing::hash("letmein", HashMethod::Md5).unwrap();
        let user = stored_user(HashMethod::Md5, &hash);

        let resp = attempt_crack(&user, "letmein").unwrap();
        assert!(resp.success);
        assert_eq!(resp.password.as_deref(), Some("letmein"));

        let resp = attempt_crack(&user, "wrong-guess").unwrap();
        assert!(!resp.success);
        assert!(resp.password.is_none());
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn missing_email_on_verify_code_returns_enveloped_400() {
        let app = crate::app::build_app(AppState::fake());
        let res = app
            .oneshot(json_post("/api/v1/auth/verify-code", r#"{"code":"123456"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = body_json(res).await;
        assert_eq!(json["statusCode"], 400);
        assert!(json["message"].as_str().unwrap().contains("Email"));
    }

    #[tokio::test]
    async fn missing_guess_on_demo_crack_returns_enveloped_400() {
        let app = crate::app::build_app(AppState::fake());
        let res = app
            .oneshot(json_post(
                "/api/v1/auth/demo-crack",
                r#"{"email":"ann@example.com"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = body_json(res).await;
        assert_eq!(json["statusCode"], 400);
        assert!(json["message"].as_str().unwrap().contains("guess"));
    }

    #[tokio::test]
    async fn account_without_token_returns_enveloped_401() {
        let app = crate::app::build_app(AppState::fake());
        let res = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/auth/account")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(res).await;
        assert_eq!(json["statusCode"], 401);
    }

    #[tokio::test]
    #[ignore = "requires a live Postgres via DATABASE_URL"]
    async fn duplicate_registration_reissues_code_against_one_row() {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect(&database_url)
            .await
            .expect("connect");
        sqlx::migrate!("./migrations").run(&db).await.expect("migrate");

        let fake = AppState::fake();
        let state = AppState::from_parts(db.clone(), fake.config.clone(), fake.mailer.clone());
        let app = crate::app::build_app(state);

        let email = format!("ann-{}@example.com", Uuid::new_v4());
        let mixed_case = email.to_uppercase();
        let register_body = |to: &str| {
            serde_json::json!({"email": to, "password": "pw12345678", "name": "Ann"}).to_string()
        };

        // Registering with a mixed-case spelling stores the lowercased row.
        let res = app
            .clone()
            .oneshot(json_post("/api/v1/auth/register", &register_body(&mixed_case)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let first_code: Option<String> =
            sqlx::query_scalar("SELECT verification_code FROM users WHERE email = $1")
                .bind(&email)
                .fetch_one(&db)
                .await
                .expect("row stored under the lowercased email");
        let first_code = first_code.expect("code issued");

        // A second registration reissues instead of inserting.
        let res = app
            .clone()
            .oneshot(json_post("/api/v1/auth/register", &register_body(&email)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let json = body_json(res).await;
        assert!(json["message"].as_str().unwrap().contains("already"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
            .bind(&email)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let second_code: Option<String> =
            sqlx::query_scalar("SELECT verification_code FROM users WHERE email = $1")
                .bind(&email)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_ne!(first_code, second_code.expect("code reissued"));

        // Resend with the original mixed-case spelling still finds the row.
        let res = app
            .clone()
            .oneshot(json_post(
                "/api/v1/auth/verify-email",
                &serde_json::json!({"email": mixed_case}).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
