//! Category and product endpoints.

use loboshop_types::{Category, Product, ProductDraft, ProductFilters, ProductPage};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::{ApiClient, ensure_success};
use super::error::{ApiError, ApiResult};

/// Form field carrying image files.
const IMAGES_FIELD: &str = "imagenes";

impl ApiClient {
    /// `GET /categorias`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body does not decode.
    pub async fn list_categories(&self) -> ApiResult<Vec<Category>> {
        let json: Value = self.get_json("categorias").await?;
        unwrap_envelope(json, "categorias")
    }

    /// `GET /categorias/:id`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body does not decode.
    pub async fn get_category(&self, id: &str) -> ApiResult<Category> {
        let json: Value = self.get_json(&format!("categorias/{id}")).await?;
        unwrap_envelope(json, "categoria")
    }

    /// `GET /productos` with page, limit and optional category/search filters.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body does not decode.
    pub async fn list_products(&self, filters: &ProductFilters) -> ApiResult<ProductPage> {
        let json: Value = self
            .send_json(self.request(Method::GET, "productos").query(filters))
            .await?;
        ensure_success(&json)?;
        decode(json)
    }

    /// `GET /productos/:id`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body does not decode.
    pub async fn get_product(&self, id: &str) -> ApiResult<Product> {
        let json: Value = self.get_json(&format!("productos/{id}")).await?;
        unwrap_envelope(json, "producto")
    }

    /// `GET /productos/usuario/mis-productos`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body does not decode.
    pub async fn my_products(&self) -> ApiResult<Vec<Product>> {
        let json: Value = self.get_json("productos/usuario/mis-productos").await?;
        unwrap_envelope(json, "productos")
    }

    /// Multipart `POST /productos`.
    ///
    /// # Errors
    /// Returns an error if an image part is invalid, the request fails or
    /// the body does not decode.
    pub async fn create_product(&self, draft: &ProductDraft) -> ApiResult<Product> {
        let form = product_form(draft)?;
        let builder = self
            .request(Method::POST, "productos")
            .multipart(form)
            .timeout(self.upload_timeout());
        let json: Value = self.send_json(builder).await?;
        unwrap_envelope(json, "producto")
    }

    /// Multipart `PUT /productos/:id`. Only fields set on `draft` are sent.
    ///
    /// # Errors
    /// Returns an error if an image part is invalid, the request fails or
    /// the body does not decode.
    pub async fn update_product(&self, id: &str, draft: &ProductDraft) -> ApiResult<Product> {
        let form = product_form(draft)?;
        let builder = self
            .request(Method::PUT, &format!("productos/{id}"))
            .multipart(form)
            .timeout(self.upload_timeout());
        let json: Value = self.send_json(builder).await?;
        unwrap_envelope(json, "producto")
    }

    /// `DELETE /productos/:id`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server refuses it.
    pub async fn delete_product(&self, id: &str) -> ApiResult<()> {
        self.send_ack(self.request(Method::DELETE, &format!("productos/{id}")))
            .await
    }

    /// `DELETE /productos/:productId/imagenes/:imageId`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server refuses it.
    pub async fn delete_product_image(&self, product_id: &str, image_id: &str) -> ApiResult<()> {
        self.send_ack(self.request(
            Method::DELETE,
            &format!("productos/{product_id}/imagenes/{image_id}"),
        ))
        .await
    }
}

fn product_form(draft: &ProductDraft) -> ApiResult<Form> {
    let mut form = Form::new();
    for (name, value) in draft.form_fields() {
        form = form.text(name, value);
    }
    for image in &draft.images {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| {
                ApiError::invalid_input(format!("Invalid image type for {}: {e}", image.file_name))
            })?;
        form = form.part(IMAGES_FIELD, part);
    }
    Ok(form)
}

/// Decodes `json[key]` when the server wraps the payload, else `json` itself.
fn unwrap_envelope<T: DeserializeOwned>(mut json: Value, key: &str) -> ApiResult<T> {
    ensure_success(&json)?;
    let payload = match json.get_mut(key) {
        Some(inner) => inner.take(),
        None => json,
    };
    decode(payload)
}

fn decode<T: DeserializeOwned>(json: Value) -> ApiResult<T> {
    serde_json::from_value(json).map_err(|e| ApiError::parse(format!("Unexpected response: {e}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use loboshop_types::{ImageUpload, ProductCondition};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::api::{ApiErrorKind, ClientOptions};
    use crate::storage::{Store, TOKEN_KEY};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            ClientOptions::new(format!("{}/api/v1", server.uri())),
            Store::memory_with([(TOKEN_KEY, json!("t1"))]),
        )
        .unwrap()
    }

    fn product_json(id: &str) -> Value {
        json!({
            "_id": id,
            "nombre": "Bicicleta",
            "descripcion": "Rodada 26",
            "precio": 1500,
            "estado": "usado",
            "categoria": {"_id": "c1", "nombre": "Deportes"},
            "vendedor": {"_id": "u1", "nombre": "Ana"},
            "imagenes": [],
            "vistas": 3
        })
    }

    #[tokio::test]
    async fn test_list_categories_accepts_bare_array_and_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/categorias"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"_id": "c1", "nombre": "Deportes"}])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/categorias"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "categorias": [{"_id": "c2", "nombre": "Hogar", "icono": "home"}]
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        let first = api.list_categories().await.unwrap();
        assert_eq!(first[0].id, "c1");
        let second = api.list_categories().await.unwrap();
        assert_eq!(second[0].icon.as_deref(), Some("home"));
    }

    #[tokio::test]
    async fn test_get_category_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/categorias/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "categoria": {"_id": "c1", "nombre": "Deportes"}
            })))
            .mount(&server)
            .await;

        let category = client(&server).get_category("c1").await.unwrap();
        assert_eq!(category.name, "Deportes");
    }

    #[tokio::test]
    async fn test_list_products_sends_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/productos"))
            .and(query_param("page", "2"))
            .and(query_param("limit", "5"))
            .and(query_param("categoria", "c1"))
            .and(query_param("busqueda", "bici"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "count": 1,
                "total": 6,
                "page": 2,
                "pages": 2,
                "productos": [product_json("p1")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let filters = ProductFilters {
            page: 2,
            limit: 5,
            ..ProductFilters::default()
        }
        .with_category(Some("c1"))
        .with_search(Some("bici"));

        let page = client(&server).list_products(&filters).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.pages, Some(2));
        assert_eq!(page.products[0].condition, ProductCondition::Used);
    }

    #[tokio::test]
    async fn test_list_products_omits_absent_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/productos"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "productos": []})),
            )
            .mount(&server)
            .await;

        client(&server)
            .list_products(&ProductFilters::default())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query(), Some("page=1&limit=20"));
    }

    #[tokio::test]
    async fn test_my_products_and_get_product() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/productos/usuario/mis-productos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "productos": [product_json("p1"), product_json("p2")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/productos/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "producto": product_json("p2")
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        assert_eq!(api.my_products().await.unwrap().len(), 2);
        assert_eq!(api.get_product("p2").await.unwrap().id, "p2");
    }

    #[tokio::test]
    async fn test_create_product_sends_multipart_with_images() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/productos"))
            .respond_with(|req: &Request| {
                let content_type = req
                    .headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                let body = String::from_utf8_lossy(&req.body);
                if content_type.starts_with("multipart/form-data")
                    && body.contains("name=\"nombre\"")
                    && body.contains("Bicicleta")
                    && body.contains("name=\"imagenes\"; filename=\"bici.png\"")
                    && req.headers.get("authorization").is_some()
                {
                    ResponseTemplate::new(201).set_body_json(json!({
                        "success": true,
                        "producto": product_json("p9")
                    }))
                } else {
                    ResponseTemplate::new(400).set_body_json(json!({"message": "bad form"}))
                }
            })
            .expect(1)
            .mount(&server)
            .await;

        let draft = ProductDraft {
            name: Some("Bicicleta".to_string()),
            price: Some(1500.0),
            condition: Some(ProductCondition::Used),
            category: Some("c1".to_string()),
            images: vec![ImageUpload {
                file_name: "bici.png".to_string(),
                mime_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            }],
            ..ProductDraft::default()
        };

        let product = client(&server).create_product(&draft).await.unwrap();
        assert_eq!(product.id, "p9");
    }

    #[tokio::test]
    async fn test_update_product_uses_upload_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/productos/p1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "producto": product_json("p1")}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/productos/p1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "producto": product_json("p1")}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let mut options = ClientOptions::new(format!("{}/api/v1", server.uri()));
        options.request_timeout = Duration::from_millis(100);
        options.upload_timeout = Duration::from_secs(5);
        let api = ApiClient::new(options, Store::memory()).unwrap();

        let draft = ProductDraft {
            price: Some(999.0),
            ..ProductDraft::default()
        };
        let product = api.update_product("p1", &draft).await.unwrap();
        assert_eq!(product.id, "p1");

        let err = api.get_product("p1").await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_invalid_image_mime_is_rejected_before_sending() {
        let server = MockServer::start().await;
        let draft = ProductDraft {
            name: Some("Silla".to_string()),
            images: vec![ImageUpload {
                file_name: "x.png".to_string(),
                mime_type: "not a mime".to_string(),
                bytes: vec![],
            }],
            ..ProductDraft::default()
        };

        let err = client(&server).create_product(&draft).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::InvalidInput);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/productos/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/productos/p1/imagenes/i1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/productos/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "No puedes eliminar este producto"
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        api.delete_product("p1").await.unwrap();
        api.delete_product_image("p1", "i1").await.unwrap();
        let err = api.delete_product("p2").await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Rejected);
        assert_eq!(err.message, "No puedes eliminar este producto");
    }
}
