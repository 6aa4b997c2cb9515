// POST /api/notifications/{archive|read|unread}/{id}

use axum::{
    Json,
    extract::{Path, State},
};

use super::AppState;
use crate::error::{PanelError, Result};
use crate::models::Notification;
use crate::notifications::FlagAction;

pub(super) async fn apply(
    State(state): State<AppState>,
    Path((action, id)): Path<(String, String)>,
) -> Result<Json<Notification>> {
    let action = FlagAction::parse(&action)
        .ok_or_else(|| PanelError::BadRequest(format!("unknown notification action: {}", action)))?;
    Ok(Json(state.notifications.apply(&id, action).await?))
}
