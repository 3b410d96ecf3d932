//! Shared data types for the LoboShop client.
//!
//! Wire types mirror the backend's JSON (Spanish field names on the wire,
//! English names in Rust). Everything here is plain data: no I/O.

pub mod auth;
pub mod catalog;
pub mod session;

pub use auth::{AuthResponse, Credentials, RegisterData, User};
pub use catalog::{
    Category, CategoryRef, ImageUpload, Product, ProductCondition, ProductDraft, ProductFilters,
    ProductImage, ProductPage, Seller,
};
pub use session::Session;
