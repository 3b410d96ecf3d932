//! Category command handlers.

use anyhow::{Context, Result};
use comfy_table::{ContentArrangement, Table};

use super::{App, print_json};

pub async fn list_categories(app: &App, json: bool) -> Result<()> {
    let categories = app.api().list_categories().await.context("list categories")?;
    if json {
        return print_json(&categories);
    }
    if categories.is_empty() {
        println!("No categories found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(["ID", "Name", "Description"]);
    for category in &categories {
        table.add_row([
            category.id.as_str(),
            category.name.as_str(),
            category.description.as_deref().unwrap_or(""),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn show_category(app: &App, id: &str, json: bool) -> Result<()> {
    let category = app
        .api()
        .get_category(id)
        .await
        .with_context(|| format!("load category '{id}'"))?;
    if json {
        return print_json(&category);
    }

    println!("{}  {}", category.name, category.id);
    if let Some(description) = category.description.as_deref() {
        println!("{description}");
    }
    Ok(())
}
