//! Data models shared by the transport layer and its front ends.
//!
//! - `user`: the authenticated user's profile and role
//! - `session`: login credentials, the resident session and auth wire types

pub mod session;
pub mod user;

pub use session::{Credentials, LoginResponse, RefreshResponse, Session};
pub use user::{Role, UserProfile};
