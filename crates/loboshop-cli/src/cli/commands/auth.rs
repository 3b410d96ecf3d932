//! Login, registration and session command handlers.

use anyhow::Result;
use loboshop_core::validation;
use loboshop_types::{Credentials, RegisterData, Session, User};

use super::{App, print_json};

pub async fn login(app: &App, email: &str, password: &str) -> Result<()> {
    let credentials = Credentials::new(email.trim(), password);
    validation::validate_credentials(&credentials)?;

    let user = app.session.login(&credentials).await?;
    println!("Logged in as {}", display_user(&user));
    Ok(())
}

pub async fn register(
    app: &App,
    name: String,
    email: String,
    password: String,
    phone: Option<String>,
) -> Result<()> {
    let data = RegisterData {
        name: name.trim().to_string(),
        email: email.trim().to_string(),
        password,
        phone: phone.filter(|p| !p.trim().is_empty()),
    };
    validation::validate_registration(&data)?;

    let user = app.session.register(&data).await?;
    println!("Account created. Logged in as {}", display_user(&user));
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    let was_logged_in = app.session.snapshot().is_authenticated();
    app.session.logout().await;
    if was_logged_in {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

pub async fn whoami(app: &App, refresh: bool, json: bool) -> Result<()> {
    if refresh && app.session.snapshot().is_authenticated() {
        app.session.refresh_profile().await?;
    }

    let session = app.session.snapshot();
    if json {
        return print_json(&session);
    }

    match session {
        Session::Authenticated { user, .. } => {
            println!("{}", display_user(&user));
            println!("ID:    {}", user.id);
            if let Some(phone) = user.phone.as_deref() {
                println!("Phone: {phone}");
            }
            if !user.role.is_empty() {
                println!("Role:  {}", user.role);
            }
        }
        Session::Unknown | Session::Anonymous => println!("Not logged in."),
    }
    Ok(())
}

fn display_user(user: &User) -> String {
    if user.email.is_empty() {
        user.name.clone()
    } else {
        format!("{} <{}>", user.name, user.email)
    }
}
