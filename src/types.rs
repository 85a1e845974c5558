use serde::Serialize;
use serde_json::{Map, Value};

/// Media type of every Optiply API request and response.
pub const JSON_API: &str = "application/vnd.api+json";

/// JSON:API request document sent to the Optiply API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub data: Resource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<Resource>>,
}

impl Document {
    pub fn new(data: Resource) -> Self {
        Self {
            data,
            included: None,
        }
    }

    pub fn with_included(mut self, included: Vec<Resource>) -> Self {
        self.included = Some(included);
        self
    }
}

/// A single resource object: its type and attribute map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            attributes,
        }
    }
}

/// HTTP method chosen for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    /// Create a new resource.
    Post,
    /// Update the resource named by the record's `id`.
    Patch,
}

impl WriteMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
        }
    }
}

impl std::fmt::Display for WriteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Post => write!(f, "POST"),
            Self::Patch => write!(f, "PATCH"),
        }
    }
}
