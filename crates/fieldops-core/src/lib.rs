//! Core library for the FieldOps dashboard client.
//!
//! Everything that talks to the dashboard API goes through this crate:
//! - `auth`: the credential store and session manager
//! - `api`: the request transport, response classification, the
//!   single-flight refresh coordinator and the transfer helpers
//! - `config`: client configuration
//! - `models`: user profile and session types shared with front ends

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, Notifier, RequestDescriptor, ResponseBody};
pub use auth::{CredentialStore, SessionEvent, SessionManager};
pub use config::Config;
pub use models::{Credentials, Role, Session, UserProfile};
