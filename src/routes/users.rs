use axum::Json;

use crate::{auth::AuthenticatedUser, models::User};

pub async fn current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}
