use shared::{
    domain::{Role, UserId, UserSummary},
    error::{ApiError, ErrorCode},
};
use tracing::info;
use workstudio::{CredentialsInfo, ViewFilter};

use crate::{access::Principal, internal, upstream, ApiContext};

pub async fn list_users(ctx: &ApiContext) -> Result<Vec<UserSummary>, ApiError> {
    let users = ctx.storage.list_users().await.map_err(internal)?;
    Ok(users.iter().map(|user| user.summary()).collect())
}

pub async fn grant_role(
    ctx: &ApiContext,
    actor: &Principal,
    target: UserId,
    role: Role,
) -> Result<UserSummary, ApiError> {
    ensure_may_manage(actor, role)?;
    load_summary(ctx, target).await?;
    ctx.storage.assign_role(target, role).await.map_err(internal)?;
    info!(actor = actor.user_id.0, target = target.0, %role, "role granted");
    load_summary(ctx, target).await
}

pub async fn revoke_role(
    ctx: &ApiContext,
    actor: &Principal,
    target: UserId,
    role: Role,
) -> Result<UserSummary, ApiError> {
    ensure_may_manage(actor, role)?;
    let current = load_summary(ctx, target).await?;
    if role == Role::SudoAdmin && current.roles.contains(&Role::SudoAdmin) {
        let remaining = ctx
            .storage
            .count_users_with_role(Role::SudoAdmin)
            .await
            .map_err(internal)?;
        if remaining <= 1 {
            return Err(ApiError::new(
                ErrorCode::Conflict,
                "at least one sudo_admin must remain",
            ));
        }
    }
    ctx.storage.revoke_role(target, role).await.map_err(internal)?;
    info!(actor = actor.user_id.0, target = target.0, %role, "role revoked");
    load_summary(ctx, target).await
}

pub async fn workstudio_health(ctx: &ApiContext) -> bool {
    ctx.workstudio.health_check().await
}

/// The WorkStudio account the calling admin's requests run as.
pub async fn workstudio_credentials(ctx: &ApiContext, actor: &Principal) -> CredentialsInfo {
    ctx.workstudio
        .get_current_credentials_info(Some(actor.user_id))
        .await
}

pub async fn workstudio_view_data(
    ctx: &ApiContext,
    actor: &Principal,
    view_guid: &str,
    filter: &ViewFilter,
) -> Result<serde_json::Value, ApiError> {
    ctx.workstudio
        .get_view_data(view_guid, filter, Some(actor.user_id))
        .await
        .map_err(upstream)
}

/// Only a sudo admin hands out or takes away sudo admin.
fn ensure_may_manage(actor: &Principal, role: Role) -> Result<(), ApiError> {
    if role == Role::SudoAdmin && !actor.has_role(Role::SudoAdmin) {
        return Err(ApiError::forbidden());
    }
    Ok(())
}

async fn load_summary(ctx: &ApiContext, user_id: UserId) -> Result<UserSummary, ApiError> {
    ctx.storage
        .load_user(user_id)
        .await
        .map_err(internal)?
        .map(|user| user.summary())
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "user not found"))
}
