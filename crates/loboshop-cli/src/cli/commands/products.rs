//! Product command handlers.

use anyhow::{Context, Result};
use comfy_table::{ContentArrangement, Table};
use loboshop_core::api::images;
use loboshop_core::validation;
use loboshop_types::{Product, ProductCondition, ProductDraft, ProductFilters};

use super::{App, format_price, print_json};

/// Listing fields as typed on the command line.
#[derive(Debug, Clone, Default)]
pub struct ProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub condition: Option<ProductCondition>,
    pub category: Option<String>,
    pub stock: Option<u32>,
    /// Image file paths, read at upload time.
    pub images: Vec<String>,
}

impl ProductInput {
    async fn into_draft(self) -> Result<ProductDraft> {
        let mut uploads = Vec::with_capacity(self.images.len());
        for path in &self.images {
            uploads.push(images::read_image(path).await?);
        }
        Ok(ProductDraft {
            name: self.name.map(|n| n.trim().to_string()),
            description: self.description,
            price: self.price,
            condition: self.condition,
            category: self.category,
            stock: self.stock,
            images: uploads,
        })
    }
}

pub async fn list(app: &App, filters: &ProductFilters, json: bool) -> Result<()> {
    let page = app
        .api()
        .list_products(filters)
        .await
        .context("list products")?;
    if json {
        return print_json(&page.products);
    }
    if page.products.is_empty() {
        println!("No products found.");
        return Ok(());
    }

    println!("{}", product_table(&page.products));
    let total = page.total.unwrap_or(page.count);
    match (page.page, page.pages) {
        (Some(current), Some(pages)) => println!("Page {current} of {pages} ({total} products)"),
        _ => println!("{total} products"),
    }
    Ok(())
}

pub async fn show(app: &App, id: &str, json: bool) -> Result<()> {
    let product = app
        .api()
        .get_product(id)
        .await
        .with_context(|| format!("load product '{id}'"))?;
    if json {
        return print_json(&product);
    }

    println!("{}  {}", product.name, product.id);
    println!("Price:     {}", format_price(product.price));
    println!("Condition: {}", product.condition);
    if let Some(category) = &product.category {
        println!("Category:  {}", category.name().unwrap_or(category.id()));
    }
    if let Some(seller) = &product.seller {
        println!("Seller:    {}", seller.name);
    }
    if let Some(stock) = product.stock {
        println!("Stock:     {stock}");
    }
    if let Some(created) = product.created_at {
        println!("Listed:    {}", created.format("%Y-%m-%d"));
    }
    println!("Views:     {}", product.views);
    if !product.description.is_empty() {
        println!();
        println!("{}", product.description);
    }
    for image in &product.images {
        println!("Image {}: {}", image.id, app.api().asset_url(&image.url));
    }
    Ok(())
}

pub async fn mine(app: &App, json: bool) -> Result<()> {
    app.require_user()?;
    let products = app.api().my_products().await.context("list your products")?;
    if json {
        return print_json(&products);
    }
    if products.is_empty() {
        println!("You have no listings.");
    } else {
        println!("{}", product_table(&products));
    }
    Ok(())
}

pub async fn create(app: &App, input: ProductInput) -> Result<()> {
    app.require_user()?;
    let draft = input.into_draft().await?;
    validation::validate_product(&draft, true)?;

    let product = app
        .api()
        .create_product(&draft)
        .await
        .context("create product")?;
    println!("Created product {} ({})", product.name, product.id);
    Ok(())
}

pub async fn update(app: &App, id: &str, input: ProductInput) -> Result<()> {
    app.require_user()?;
    let draft = input.into_draft().await?;
    validation::validate_product(&draft, false)?;

    let product = app
        .api()
        .update_product(id, &draft)
        .await
        .with_context(|| format!("update product '{id}'"))?;
    println!("Updated product {} ({})", product.name, product.id);
    Ok(())
}

pub async fn delete(app: &App, id: &str) -> Result<()> {
    app.require_user()?;
    app.api()
        .delete_product(id)
        .await
        .with_context(|| format!("delete product '{id}'"))?;
    println!("Deleted product {id}");
    Ok(())
}

pub async fn delete_image(app: &App, id: &str, image_id: &str) -> Result<()> {
    app.require_user()?;
    app.api()
        .delete_product_image(id, image_id)
        .await
        .with_context(|| format!("delete image '{image_id}' from product '{id}'"))?;
    println!("Deleted image {image_id}");
    Ok(())
}

fn product_table(products: &[Product]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(["ID", "Name", "Price", "Condition", "Category"]);
    for product in products {
        let category = product
            .category
            .as_ref()
            .map(|c| c.name().unwrap_or(c.id()).to_string())
            .unwrap_or_default();
        table.add_row([
            product.id.clone(),
            product.name.clone(),
            format_price(product.price),
            product.condition.to_string(),
            category,
        ]);
    }
    table
}
