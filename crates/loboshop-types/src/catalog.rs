//! Catalog payloads: categories, products, filters and drafts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A product category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "icono", default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Category as embedded in a product: populated object or bare id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Populated(Category),
    Id(String),
}

impl CategoryRef {
    pub fn id(&self) -> &str {
        match self {
            CategoryRef::Populated(category) => &category.id,
            CategoryRef::Id(id) => id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            CategoryRef::Populated(category) => Some(&category.name),
            CategoryRef::Id(_) => None,
        }
    }
}

/// The user selling a product.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Seller {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "telefono", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A product image. `url` is relative to the server origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    pub url: String,
}

/// Physical condition of a listed product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProductCondition {
    #[default]
    #[serde(rename = "nuevo")]
    New,
    #[serde(rename = "como_nuevo")]
    LikeNew,
    #[serde(rename = "usado")]
    Used,
    #[serde(other, rename = "otro")]
    Other,
}

impl ProductCondition {
    /// Wire value sent in form bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCondition::New => "nuevo",
            ProductCondition::LikeNew => "como_nuevo",
            ProductCondition::Used => "usado",
            ProductCondition::Other => "otro",
        }
    }
}

impl fmt::Display for ProductCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().replace('_', " "))
    }
}

impl FromStr for ProductCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nuevo" | "new" => Ok(ProductCondition::New),
            "como_nuevo" | "como-nuevo" | "like-new" | "like_new" => Ok(ProductCondition::LikeNew),
            "usado" | "used" => Ok(ProductCondition::Used),
            other => Err(format!(
                "unknown condition '{other}' (expected nuevo, como_nuevo or usado)"
            )),
        }
    }
}

/// A product listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "precio", default)]
    pub price: f64,
    #[serde(rename = "estado", default)]
    pub condition: ProductCondition,
    #[serde(rename = "categoria", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryRef>,
    #[serde(rename = "vendedor", default, skip_serializing_if = "Option::is_none")]
    pub seller: Option<Seller>,
    #[serde(rename = "imagenes", default)]
    pub images: Vec<ProductImage>,
    #[serde(rename = "vistas", default)]
    pub views: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Query filters for `GET /productos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductFilters {
    pub page: u32,
    pub limit: u32,
    #[serde(rename = "categoria", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "busqueda", skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Default for ProductFilters {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            category: None,
            search: None,
        }
    }
}

impl ProductFilters {
    /// Sets the category filter; blank values clear it.
    #[must_use]
    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = non_blank(category);
        self
    }

    /// Sets the search filter; blank values clear it.
    #[must_use]
    pub fn with_search(mut self, search: Option<&str>) -> Self {
        self.search = non_blank(search);
        self
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// One page of `GET /productos`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPage {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(rename = "productos", default)]
    pub products: Vec<Product>,
}

/// An image file to upload with a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Fields for creating or updating a product. Absent fields are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub condition: Option<ProductCondition>,
    pub category: Option<String>,
    pub stock: Option<u32>,
    pub images: Vec<ImageUpload>,
}

impl ProductDraft {
    /// Text fields for a multipart body, using the wire names.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(name) = &self.name {
            fields.push(("nombre", name.clone()));
        }
        if let Some(description) = &self.description {
            fields.push(("descripcion", description.clone()));
        }
        if let Some(price) = self.price {
            fields.push(("precio", price.to_string()));
        }
        if let Some(condition) = self.condition {
            fields.push(("estado", condition.as_str().to_string()));
        }
        if let Some(category) = &self.category {
            fields.push(("categoria", category.clone()));
        }
        if let Some(stock) = self.stock {
            fields.push(("stock", stock.to_string()));
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.form_fields().is_empty() && self.images.is_empty()
    }
}
