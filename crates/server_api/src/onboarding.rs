use chrono::Utc;
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    protocol::{CompleteOnboardingRequest, OnboardingStatus},
};
use tracing::info;

use crate::{auth::hash_password, internal, ApiContext};

pub const MIN_PASSWORD_LEN: usize = 8;

pub async fn onboarding_status(
    ctx: &ApiContext,
    user_id: UserId,
) -> Result<OnboardingStatus, ApiError> {
    let user = ctx
        .storage
        .load_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "user not found"))?;
    Ok(OnboardingStatus {
        user_id: user.user_id,
        username: user.username,
        completed: user.onboarding_completed_at.is_some(),
        completed_at: user.onboarding_completed_at,
    })
}

/// Final wizard step: replaces the issued password and unlocks the app.
pub async fn complete_onboarding(
    ctx: &ApiContext,
    user_id: UserId,
    req: &CompleteOnboardingRequest,
) -> Result<OnboardingStatus, ApiError> {
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if req.password != req.password_confirmation {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "password confirmation does not match",
        ));
    }

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("password hashing failed: {e}")))?;
    let updated = ctx
        .storage
        .set_password_hash(user_id, &password_hash)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::new(ErrorCode::NotFound, "user not found"));
    }
    ctx.storage
        .complete_onboarding(user_id, Utc::now())
        .await
        .map_err(internal)?;
    info!(user_id = user_id.0, "onboarding completed");

    onboarding_status(ctx, user_id).await
}
