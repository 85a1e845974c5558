//! Streams the target accepts and the Optiply resources they map onto.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// A supported Singer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Products,
    Suppliers,
    SupplierProducts,
    BuyOrders,
    BuyOrderLines,
    SellOrders,
    SellOrderLines,
}

impl StreamKind {
    pub const ALL: [StreamKind; 7] = [
        Self::Products,
        Self::Suppliers,
        Self::SupplierProducts,
        Self::BuyOrders,
        Self::BuyOrderLines,
        Self::SellOrders,
        Self::SellOrderLines,
    ];

    /// Stream name as it appears in SCHEMA and RECORD messages.
    pub fn stream_name(self) -> &'static str {
        match self {
            Self::Products => "Products",
            Self::Suppliers => "Suppliers",
            Self::SupplierProducts => "SupplierProducts",
            Self::BuyOrders => "BuyOrders",
            Self::BuyOrderLines => "BuyOrderLines",
            Self::SellOrders => "SellOrders",
            Self::SellOrderLines => "SellOrderLines",
        }
    }

    /// API path segment, which is also the JSON:API resource type.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Suppliers => "suppliers",
            Self::SupplierProducts => "supplierProducts",
            Self::BuyOrders => "buyOrders",
            Self::BuyOrderLines => "buyOrderLines",
            Self::SellOrders => "sellOrders",
            Self::SellOrderLines => "sellOrderLines",
        }
    }

    /// Fields a record must carry to be created.
    pub fn mandatory_fields(self) -> &'static [&'static str] {
        match self {
            Self::Products => &["name", "stockLevel", "unlimitedStock"],
            Self::Suppliers => &["name"],
            Self::SupplierProducts => &["supplierId", "productId"],
            Self::BuyOrders => &["transaction_date", "supplier_remoteId", "line_items"],
            Self::BuyOrderLines => &["buyOrderId", "productId", "quantity", "price"],
            Self::SellOrders => &["placed", "totalValue"],
            Self::SellOrderLines => &["sellOrderId", "productId", "quantity", "price"],
        }
    }

    /// Record field to API attribute pairs.
    ///
    /// Buy orders are assembled by hand and have no mapping table.
    pub fn field_mappings(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Products => &[
                ("name", "name"),
                ("skuCode", "skuCode"),
                ("price", "price"),
                ("stockLevel", "stockLevel"),
                ("unlimitedStock", "unlimitedStock"),
                ("status", "status"),
                ("remoteDataSyncedToDate", "remoteDataSyncedToDate"),
            ],
            Self::Suppliers => &[
                ("name", "name"),
                ("remoteId", "remoteId"),
                ("leadTime", "leadTime"),
                ("minimumOrderValue", "minimumOrderValue"),
                ("orderCosts", "orderCosts"),
                ("status", "status"),
            ],
            Self::SupplierProducts => &[
                ("supplierId", "supplierId"),
                ("productId", "productId"),
                ("remoteId", "remoteId"),
                ("price", "price"),
                ("minimumPurchaseQuantity", "minimumPurchaseQuantity"),
                ("lotSize", "lotSize"),
                ("availability", "availability"),
                ("availabilityDate", "availabilityDate"),
                ("preferred", "preferred"),
                ("deliveryTime", "deliveryTime"),
                ("status", "status"),
            ],
            Self::BuyOrders => &[],
            Self::BuyOrderLines => &[
                ("buyOrderId", "buyOrderId"),
                ("productId", "productId"),
                ("quantity", "quantity"),
                ("price", "price"),
                ("status", "status"),
            ],
            Self::SellOrders => &[
                ("placed", "placed"),
                ("totalValue", "totalValue"),
                ("remoteId", "remoteId"),
                ("completed", "completed"),
                ("status", "status"),
            ],
            Self::SellOrderLines => &[
                ("sellOrderId", "sellOrderId"),
                ("productId", "productId"),
                ("quantity", "quantity"),
                ("price", "price"),
                ("status", "status"),
            ],
        }
    }

    /// Mandatory fields that are absent, null, or blank in `record`.
    pub fn missing_fields(self, record: &serde_json::Map<String, Value>) -> Vec<&'static str> {
        self.mandatory_fields()
            .iter()
            .copied()
            .filter(|field| match record.get(*field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .collect()
    }
}

impl FromStr for StreamKind {
    type Err = UnsupportedStream;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.stream_name() == name)
            .ok_or_else(|| UnsupportedStream(name.to_string()))
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stream_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported stream: {0}")]
pub struct UnsupportedStream(pub String);
