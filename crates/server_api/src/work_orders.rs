use shared::{
    error::{ApiError, ErrorCode},
    status::{StatusDescriptor, WorkStudioStatus},
};
use workstudio::{Circuit, PlannedUnit};

use crate::{access::Principal, upstream, ApiContext};

pub fn status_taxonomy() -> Vec<StatusDescriptor> {
    WorkStudioStatus::all()
        .into_iter()
        .map(WorkStudioStatus::descriptor)
        .collect()
}

pub async fn circuits_by_status(
    ctx: &ApiContext,
    principal: &Principal,
    status_code: &str,
) -> Result<Vec<Circuit>, ApiError> {
    let status = status_code.parse::<WorkStudioStatus>()?;
    ctx.workstudio
        .get_circuits_by_status(status, Some(principal.user_id))
        .await
        .map_err(upstream)
}

pub async fn planned_units(
    ctx: &ApiContext,
    principal: &Principal,
    work_order: &str,
) -> Result<Vec<PlannedUnit>, ApiError> {
    let work_order = work_order.trim();
    if work_order.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "work order is required"));
    }
    ctx.workstudio
        .get_planned_units(work_order, Some(principal.user_id))
        .await
        .map_err(upstream)
}
