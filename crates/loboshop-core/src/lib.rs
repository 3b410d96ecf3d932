//! Core LoboShop client library (config, storage, API client, session).

pub mod api;
pub mod config;
pub mod logging;
pub mod session;
pub mod storage;
pub mod validation;
