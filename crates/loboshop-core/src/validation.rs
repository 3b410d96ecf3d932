//! Client-side form checks. These run before any request is built.

use std::fmt;
use std::sync::LazyLock;

use loboshop_types::{Credentials, ProductDraft, RegisterData};
use regex::Regex;

/// Minimum password length accepted by the backend.
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|e| panic!("email regex: {e}"))
});

/// A single failed field check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// All failed checks for one form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: &'static str) {
        self.fields.push(FieldError { field, message });
    }

    /// First message for `field`, if it failed.
    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.message)
    }

    fn into_result(self) -> Result<(), Self> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

fn check_email(email: &str, errors: &mut ValidationErrors) {
    if email.trim().is_empty() {
        errors.push("email", "Email is required");
    } else if !EMAIL_RE.is_match(email.trim()) {
        errors.push("email", "Invalid email");
    }
}

fn check_password(password: &str, errors: &mut ValidationErrors) {
    if password.is_empty() {
        errors.push("password", "Password is required");
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push("password", "Password must be at least 6 characters");
    }
}

/// Checks a login form.
///
/// # Errors
/// Returns every failed field check.
pub fn validate_credentials(credentials: &Credentials) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    check_email(&credentials.email, &mut errors);
    check_password(&credentials.password, &mut errors);
    errors.into_result()
}

/// Checks a registration form.
///
/// # Errors
/// Returns every failed field check.
pub fn validate_registration(data: &RegisterData) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if data.name.trim().is_empty() {
        errors.push("nombre", "Name is required");
    }
    check_email(&data.email, &mut errors);
    check_password(&data.password, &mut errors);
    errors.into_result()
}

/// Checks a product draft. `creating` requires the fields a new listing needs.
///
/// # Errors
/// Returns every failed field check.
pub fn validate_product(draft: &ProductDraft, creating: bool) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    match &draft.name {
        Some(name) if name.trim().is_empty() => errors.push("nombre", "Name is required"),
        None if creating => errors.push("nombre", "Name is required"),
        _ => {}
    }

    match draft.price {
        Some(price) if !price.is_finite() || price < 0.0 => {
            errors.push("precio", "Price must be a non-negative number");
        }
        None if creating => errors.push("precio", "Price is required"),
        _ => {}
    }

    if creating && draft.category.as_deref().is_none_or(|c| c.trim().is_empty()) {
        errors.push("categoria", "Category is required");
    }

    if !creating && draft.is_empty() {
        errors.push("producto", "Nothing to update");
    }

    errors.into_result()
}
