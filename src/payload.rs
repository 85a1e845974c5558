//! Turns Singer records into JSON:API documents.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ApiCredentials;
use crate::streams::StreamKind;
use crate::types::{Document, Resource, WriteMethod};

const BUY_ORDER_LINES: &str = "buyOrderLines";

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("accountId and couplingId are required to create buy orders")]
    MissingTenant,

    #[error("line_items is not a JSON array of line items: {0}")]
    InvalidLineItems(String),

    #[error("line item {index} is missing `{field}`")]
    MissingLineField { index: usize, field: &'static str },

    #[error("line item {index} has a non-numeric subtotalValue: {value}")]
    InvalidSubtotal { index: usize, value: Value },

    #[error("supplier_remoteId is not an integer: {0}")]
    InvalidSupplierId(Value),

    #[error("record id {0:?} cannot name a resource")]
    InvalidId(String),
}

/// How a record is written: PATCH when it names an existing resource.
///
/// Returns the method and, for PATCH, the resource id as a path segment.
/// A null or blank `id` means the record is new.
pub fn write_method(
    record: &Map<String, Value>,
) -> Result<(WriteMethod, Option<String>), PayloadError> {
    let id = match record.get("id") {
        None | Some(Value::Null) => return Ok((WriteMethod::Post, None)),
        Some(Value::String(id)) if id.trim().is_empty() => return Ok((WriteMethod::Post, None)),
        Some(Value::String(id)) => id.clone(),
        Some(id) => id.to_string(),
    };

    if matches!(id.as_str(), "." | "..") {
        return Err(PayloadError::InvalidId(id));
    }
    Ok((WriteMethod::Patch, Some(id)))
}

/// Build the request document for `record`.
pub fn build_document(
    kind: StreamKind,
    method: WriteMethod,
    record: &Map<String, Value>,
    credentials: &ApiCredentials,
) -> Result<Document, PayloadError> {
    match (kind, method) {
        (StreamKind::BuyOrders, WriteMethod::Post) => buy_order(record, credentials),
        (StreamKind::BuyOrders, WriteMethod::Patch) => {
            let mut attributes = Map::new();
            if let Some(date) = record.get("expectedDeliveryDate").filter(|v| !v.is_null()) {
                attributes.insert("expectedDeliveryDate".into(), date.clone());
            }
            Ok(Document::new(Resource::new(kind.endpoint(), attributes)))
        }
        _ => Ok(Document::new(Resource::new(
            kind.endpoint(),
            mapped_attributes(kind, record),
        ))),
    }
}

/// Mapped, non-null fields of `record`.
fn mapped_attributes(kind: StreamKind, record: &Map<String, Value>) -> Map<String, Value> {
    kind.field_mappings()
        .iter()
        .filter_map(|(from, to)| {
            record
                .get(*from)
                .filter(|v| !v.is_null())
                .map(|v| (to.to_string(), v.clone()))
        })
        .collect()
}

fn buy_order(
    record: &Map<String, Value>,
    credentials: &ApiCredentials,
) -> Result<Document, PayloadError> {
    let (Some(account_id), Some(coupling_id)) = (credentials.account_id, credentials.coupling_id)
    else {
        return Err(PayloadError::MissingTenant);
    };

    let mut attributes = Map::new();
    attributes.insert("createdFromPublicApi".into(), Value::Bool(true));
    attributes.insert("accountId".into(), account_id.into());
    attributes.insert("couplingId".into(), coupling_id.into());

    if let Some(placed) = record.get("transaction_date") {
        attributes.insert("placed".into(), placed.clone());
    }

    if let Some(supplier) = record.get("supplier_remoteId") {
        let id = integer(supplier).ok_or_else(|| PayloadError::InvalidSupplierId(supplier.clone()))?;
        attributes.insert("supplierId".into(), id.into());
    }

    let Some(raw_lines) = record.get("line_items") else {
        return Ok(Document::new(Resource::new(
            StreamKind::BuyOrders.endpoint(),
            attributes,
        )));
    };

    let items = line_items(raw_lines)?;
    let mut total = 0.0;
    let mut included = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let field = |name: &'static str| {
            item.get(name)
                .ok_or(PayloadError::MissingLineField { index, field: name })
        };

        let subtotal_value = field("subtotalValue")?;
        let subtotal = number(subtotal_value).ok_or_else(|| PayloadError::InvalidSubtotal {
            index,
            value: subtotal_value.clone(),
        })?;
        total += subtotal;

        let mut line = Map::new();
        line.insert("quantity".into(), field("quantity")?.clone());
        line.insert("subtotalValue".into(), decimal_string(subtotal).into());
        line.insert("productId".into(), field("productId")?.clone());
        included.push(Resource::new(BUY_ORDER_LINES, line));
    }
    attributes.insert("totalValue".into(), decimal_string(total).into());

    Ok(
        Document::new(Resource::new(StreamKind::BuyOrders.endpoint(), attributes))
            .with_included(included),
    )
}

/// `line_items` arrives either as an array or as a string holding one.
fn line_items(raw: &Value) -> Result<Vec<Map<String, Value>>, PayloadError> {
    let parsed;
    let array = match raw {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text)
                .map_err(|e| PayloadError::InvalidLineItems(e.to_string()))?;
            &parsed
        }
        other => other,
    };

    let Value::Array(items) = array else {
        return Err(PayloadError::InvalidLineItems(format!(
            "expected an array, got {array}"
        )));
    };

    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map.clone()),
            other => Err(PayloadError::InvalidLineItems(format!(
                "expected an object, got {other}"
            ))),
        })
        .collect()
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            // i64::MAX as f64 rounds up to 2^63, which is already out of range
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decimal rendering used for monetary attributes: always carries a
/// fractional part (`10` becomes `"10.0"`).
fn decimal_string(value: f64) -> String {
    let mut rendered = value.to_string();
    if value.is_finite() && !rendered.contains('.') {
        rendered.push_str(".0");
    }
    rendered
}
