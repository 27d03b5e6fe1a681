//! `GET /api/presence/{user_id}`: is a user reachable right now.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::delivery::UserId;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub user_id: UserId,
    pub online: bool,
}

pub async fn get_presence(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Json<PresenceResponse> {
    Json(PresenceResponse { user_id, online: state.presence.is_online(user_id) })
}
