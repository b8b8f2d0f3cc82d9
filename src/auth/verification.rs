use rand::Rng;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::auth::repo::User;
use crate::mail::Mailer;

/// Codes live for 10 minutes from issuance.
pub const CODE_TTL_MINUTES: i64 = 10;

/// Uniform random 6-digit code, "100000" through "999999".
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Why a submitted code was rejected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodeRejection {
    #[error("Account is already verified")]
    AlreadyVerified,
    #[error("Invalid verification code")]
    Mismatch,
    #[error("Verification code has expired")]
    Expired,
}

/// Decide whether a submitted code activates the account. Mismatch is
/// checked before expiry, so a wrong code on an expired record still
/// reports "invalid" rather than "expired".
pub fn check_submission(
    user: &User,
    submitted: &str,
    now: OffsetDateTime,
) -> Result<(), CodeRejection> {
    if user.is_verified {
        return Err(CodeRejection::AlreadyVerified);
    }
    if user.verification_code.as_deref() != Some(submitted) {
        return Err(CodeRejection::Mismatch);
    }
    if let Some(expires) = user.verification_expires {
        if expires < now {
            return Err(CodeRejection::Expired);
        }
    }
    Ok(())
}

/// Issue a fresh code against an existing row and email it. The row is
/// updated before the send, so a mail failure leaves a pending code
/// behind; the caller surfaces the failure as-is.
pub async fn issue_code(db: &PgPool, mailer: &dyn Mailer, user: &User) -> anyhow::Result<()> {
    let code = generate_code();
    let expires = OffsetDateTime::now_utc() + Duration::minutes(CODE_TTL_MINUTES);
    User::set_verification_code(db, user.id, &code, expires).await?;
    mailer.send_verification_code(&user.email, &code).await?;
    info!(user_id = %user.id, email = %user.email, "verification code issued");
    Ok(())
}
