use std::fmt;

use serde::{Deserialize, Serialize};

use super::UserProfile;

/// Email/password pair sent to the login endpoint.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The resident session: a bearer token and the user it was issued to.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
}
