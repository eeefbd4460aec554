//! REST API client module for the dashboard services.
//!
//! This module provides the `ApiClient` that every domain service (sites,
//! users, messaging, ...) calls. It injects the bearer token, classifies
//! responses and transparently refreshes an expired session once.

pub mod client;
pub mod error;
pub mod notify;
pub mod refresh;
pub mod request;
pub mod response;
pub mod transfer;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use notify::{LogNotifier, Notifier};
pub use request::{Expect, FormField, RequestBody, RequestDescriptor, UploadFile};
pub use response::ResponseBody;
