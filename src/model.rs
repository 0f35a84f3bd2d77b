//! Request and response bodies of the gateway endpoints the smoke test touches.
//!
//! Responses are decoded into these types at the boundary; a payload missing a required field
//! fails decoding instead of surfacing later as a missing key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier that the backing services emit either as a JSON string (UUIDs, Mongo ids) or as
/// a number (auto-increment keys). Normalised to its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct ResourceId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
    Uint(u64),
}

impl From<RawId> for ResourceId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => ResourceId(s),
            RawId::Int(n) => ResourceId(n.to_string()),
            RawId::Uint(n) => ResourceId(n.to_string()),
        }
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId(s.to_string())
    }
}

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of `POST /users/register` and `POST /users/login`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `POST /users/register` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Registered {
    pub id: ResourceId,
    pub email: String,
}

/// `POST /users/login` response. Deployments differ in what they call the token field.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LoginToken {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    jwt: Option<String>,
}

impl LoginToken {
    /// The bearer token, preferring `access_token`, then `token`, then `jwt`.
    pub fn bearer(&self) -> Option<&str> {
        [&self.access_token, &self.token, &self.jwt]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|t| !t.is_empty())
    }
}

/// `GET /users/me` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: ResourceId,
    pub email: String,
}

/// Body of `POST /products`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub in_stock: bool,
}

/// A product as returned by `POST /products` and `GET /products/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", default)]
    document_id: Option<ResourceId>,
    #[serde(default)]
    id: Option<ResourceId>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Product {
    /// The product id, whether the service named it `_id` or `id`.
    pub fn id(&self) -> Option<&ResourceId> {
        self.document_id.as_ref().or(self.id.as_ref())
    }
}

/// `GET /products/{id}/stock` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub product_id: ResourceId,
    pub stock: i64,
}

/// Body of `PATCH /products/{id}/replenish`.
#[derive(Debug, Clone, Serialize)]
pub struct Replenish {
    pub quantity: u32,
}

/// `PATCH /products/{id}/replenish` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replenished {
    #[serde(default)]
    pub new_stock: Option<i64>,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub product_id: ResourceId,
    pub quantity: u32,
    pub user_id: ResourceId,
}

/// Body of `PATCH /orders/{id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub quantity: u32,
    pub user_id: ResourceId,
}

/// An order as returned by `POST /orders`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Order {
    pub id: ResourceId,
}
