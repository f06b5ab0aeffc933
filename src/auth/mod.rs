pub mod policy;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{NewUser, User, ROLE_VISITOR},
    schema::users,
    state::AppState,
};

/// Header carrying the external auth provider's stable user id.
pub const AUTH_ID_HEADER: &str = "x-auth-user-id";
/// Optional profile headers used to provision a user on first sight.
pub const AUTH_EMAIL_HEADER: &str = "x-auth-email";
pub const AUTH_NAME_HEADER: &str = "x-auth-name";

/// The resolved caller. Unknown identities are provisioned as visitors when
/// the auth layer forwards email and name; otherwise the request is rejected.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn user(&self) -> &User {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let external_id = header_value(parts, AUTH_ID_HEADER).ok_or_else(AppError::unauthorized)?;

        let mut conn = state.db()?;
        if let Some(user) = lookup_user(&mut conn, &external_id)? {
            return Ok(AuthenticatedUser(user));
        }

        let email = header_value(parts, AUTH_EMAIL_HEADER);
        let name = header_value(parts, AUTH_NAME_HEADER);
        match (email, name) {
            (Some(email), Some(name)) => {
                let user = provision_visitor(&mut conn, &external_id, &email, &name)?;
                Ok(AuthenticatedUser(user))
            }
            _ => Err(AppError::unauthorized()),
        }
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn lookup_user(conn: &mut PgConnection, external_id: &str) -> Result<Option<User>, AppError> {
    let user = users::table
        .filter(users::external_auth_id.eq(external_id))
        .first::<User>(conn)
        .optional()?;
    Ok(user)
}

fn provision_visitor(
    conn: &mut PgConnection,
    external_id: &str,
    email: &str,
    name: &str,
) -> Result<User, AppError> {
    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: name.to_string(),
        role: ROLE_VISITOR.to_string(),
        external_auth_id: external_id.to_string(),
    };

    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(conn)
    {
        Ok(_) => {}
        // Concurrent first-auth for the same identity: fall through to the
        // row the other request created.
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {}
        Err(err) => return Err(AppError::from(err)),
    }

    lookup_user(conn, external_id)?.ok_or_else(AppError::unauthorized)
}
