//! REST client for the LoboShop API.
//!
//! [`ApiClient`] owns the interceptor pipeline (bearer injection on the way
//! out, 401 detection on the way in). Endpoint groups are split by concern:
//! `auth` for login/registration/profile, `catalog` for categories and
//! products.

mod auth;
mod catalog;
mod client;
mod error;
pub mod images;

pub use auth::TokenCheck;
pub use client::{ApiClient, AuthEvent, ClientOptions, USER_AGENT};
pub use error::{ApiError, ApiErrorKind, ApiResult, CONNECTION_ERROR_MESSAGE, server_message};
