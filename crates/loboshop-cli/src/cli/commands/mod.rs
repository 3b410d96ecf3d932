//! CLI command handlers.

use anyhow::{Context, Result, bail};
use loboshop_core::api::{ApiClient, ClientOptions};
use loboshop_core::config::{Config, paths};
use loboshop_core::session::{SessionManager, SessionOptions};
use loboshop_core::storage::Store;
use loboshop_types::User;

pub mod auth;
pub mod catalog;
pub mod config;
pub mod products;

/// Wiring shared by every command that talks to the API.
pub struct App {
    pub session: SessionManager,
}

impl App {
    /// Opens the store, builds the client and restores the saved session.
    ///
    /// Recovery finishes before any command runs, so protected commands
    /// see the validated session.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = Store::file(paths::storage_path());
        let options = ClientOptions::from_config(config).context("resolve API settings")?;
        let api = ApiClient::new(options, store)?;
        let session = SessionManager::new(api, SessionOptions::from_config(config));

        let recovered = session.recover().await;
        tracing::debug!(authenticated = recovered.is_authenticated(), "session recovered");

        Ok(Self { session })
    }

    pub fn api(&self) -> &ApiClient {
        self.session.api()
    }

    /// The logged-in user, or an error telling the caller to log in.
    pub fn require_user(&self) -> Result<User> {
        match self.session.snapshot().user() {
            Some(user) => Ok(user.clone()),
            None => bail!("Not logged in. Run `loboshop login` first."),
        }
    }
}

/// Formats an amount in Mexican pesos, e.g. `$1,299.50 MXN`.
pub fn format_price(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{:02} MXN", cents % 100)
}

pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price_groups_thousands() {
        assert_eq!(format_price(0.0), "$0.00 MXN");
        assert_eq!(format_price(15.5), "$15.50 MXN");
        assert_eq!(format_price(1299.5), "$1,299.50 MXN");
        assert_eq!(format_price(1_234_567.891), "$1,234,567.89 MXN");
    }
}
