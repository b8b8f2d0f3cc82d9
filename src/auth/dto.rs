use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo::User;

/// Request body for registration. Fields are optional so missing input
/// maps to the 400 envelope instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Request body for login. `username` carries the email; the field name
/// is kept for client compatibility.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Request body for code submission.
#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub code: String,
}

/// Request body for resending a code.
#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// Request body for the crack demo.
#[derive(Debug, Deserialize)]
pub struct DemoCrackRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "passwordGuess")]
    pub password_guess: Option<String>,
}

/// `data` payload pointing at a created record.
#[derive(Debug, Serialize)]
pub struct CreatedUser {
    #[serde(rename = "_id")]
    pub id: Uuid,
}

/// `data` payload for a successful login.
#[derive(Debug, Serialize)]
pub struct LoginData {
    pub access_token: String,
    pub user: User,
}

/// `data` payload for the account endpoint.
#[derive(Debug, Serialize)]
pub struct AccountData {
    pub user: User,
}

/// Response for the demo register endpoints; no statusCode field, the
/// elapsed hash time rides in the message.
#[derive(Debug, Serialize)]
pub struct DemoRegisterResponse {
    pub message: String,
    pub data: CreatedUser,
}

/// Response for the crack demo. The cleartext guess is echoed back on a
/// successful crack; that exposure is the point of the exercise.
#[derive(Debug, Serialize)]
pub struct CrackResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}
