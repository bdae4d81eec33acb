//! Caller identity. Credentials are checked upstream; this layer only reads
//! the verified identity off the request.

use axum::http::{HeaderMap, StatusCode};

use leaderboard_core::UserId;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";
/// Comma-separated roles of the caller.
pub const ROLES_HEADER: &str = "x-user-roles";
pub const ADMIN_ROLE: &str = "admin";

/// A verified caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing {0} header")]
    Missing(&'static str),

    #[error("invalid {0} header")]
    Invalid(&'static str),

    #[error("{0} role required")]
    Forbidden(&'static str),
}

impl AuthError {
    /// `Forbidden` means the caller is known but lacks a role.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Missing(_) | Self::Invalid(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError>;

    /// Identify the caller and require the admin role.
    fn authorize_admin(&self, headers: &HeaderMap) -> Result<Identity, AuthError>;
}

/// Trusts identity headers set by an authenticating reverse proxy.
/// The username falls back to the user id when absent. Roles come from
/// `x-user-roles`; a missing header grants none.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderAuthenticator;

impl Authenticator for HeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let user_id = header(headers, USER_ID_HEADER)?.ok_or(AuthError::Missing(USER_ID_HEADER))?;
        let username = header(headers, USERNAME_HEADER)?.unwrap_or(user_id);
        Ok(Identity {
            user_id: UserId::from_raw(user_id),
            username: username.to_string(),
        })
    }

    fn authorize_admin(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let identity = self.authenticate(headers)?;
        let is_admin = header(headers, ROLES_HEADER)?
            .is_some_and(|roles| roles.split(',').any(|r| r.trim() == ADMIN_ROLE));
        if is_admin {
            Ok(identity)
        } else {
            Err(AuthError::Forbidden(ADMIN_ROLE))
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, AuthError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let s = value.to_str().map_err(|_| AuthError::Invalid(name))?.trim();
            if s.is_empty() {
                Err(AuthError::Invalid(name))
            } else {
                Ok(Some(s))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn reads_both_headers() {
        let id = HeaderAuthenticator
            .authenticate(&headers(&[("x-user-id", "u1"), ("x-username", "alice")]))
            .unwrap();
        assert_eq!(id.user_id, UserId::from_raw("u1"));
        assert_eq!(id.username, "alice");
    }

    #[test]
    fn username_defaults_to_user_id() {
        let id = HeaderAuthenticator
            .authenticate(&headers(&[("x-user-id", "u1")]))
            .unwrap();
        assert_eq!(id.username, "u1");
    }

    #[test]
    fn missing_user_id_is_rejected() {
        let err = HeaderAuthenticator
            .authenticate(&headers(&[("x-username", "alice")]))
            .unwrap_err();
        assert_eq!(err, AuthError::Missing(USER_ID_HEADER));
    }

    #[test]
    fn blank_user_id_is_rejected() {
        let err = HeaderAuthenticator
            .authenticate(&headers(&[("x-user-id", "   ")]))
            .unwrap_err();
        assert_eq!(err, AuthError::Invalid(USER_ID_HEADER));
    }

    #[test]
    fn admin_role_is_required() {
        let plain = headers(&[("x-user-id", "u1")]);
        let player = headers(&[("x-user-id", "u1"), ("x-user-roles", "player")]);
        let admin = headers(&[("x-user-id", "ops"), ("x-user-roles", "player, admin")]);

        assert_eq!(
            HeaderAuthenticator.authorize_admin(&plain).unwrap_err(),
            AuthError::Forbidden(ADMIN_ROLE)
        );
        assert_eq!(
            HeaderAuthenticator.authorize_admin(&player).unwrap_err(),
            AuthError::Forbidden(ADMIN_ROLE)
        );
        assert_eq!(
            HeaderAuthenticator.authorize_admin(&admin).unwrap().user_id,
            UserId::from_raw("ops")
        );
    }

    #[test]
    fn admin_check_needs_identity_first() {
        let err = HeaderAuthenticator
            .authorize_admin(&headers(&[("x-user-roles", "admin")]))
            .unwrap_err();
        assert_eq!(err, AuthError::Missing(USER_ID_HEADER));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Forbidden(ADMIN_ROLE).status(), StatusCode::FORBIDDEN);
    }
}
