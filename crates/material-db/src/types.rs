use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;

/// Material request row returned from SELECT queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MaterialRequest {
    pub id: i32,
    pub request_id: String,
    pub submitted_at: DateTime<Utc>,
    pub store_id: i32,
    pub store_label: String,
    pub requester_name: String,
    pub requester_phone: Option<String>,
    pub ticket_number: Option<String>,
    pub team_type: String,
    /// Only set when the work is done by an outside contractor
    pub contractor: Option<String>,
    pub service_type: String,
    pub affected_system: String,
    pub service_description: String,
    pub created_at: DateTime<Utc>,
}

/// Material item row returned from SELECT queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MaterialItem {
    pub id: i32,
    pub request_id: String,
    pub description: String,
    pub specification: Option<String>,
    pub quantity: i32,
    pub unit: String,
    pub urgency: String,
    pub photo1_url: Option<String>,
    pub photo2_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A material request together with its items, as served by the detail query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RequestDetail {
    #[serde(rename = "solicitacao")]
    pub request: MaterialRequest,
    #[serde(rename = "itens")]
    pub items: Vec<MaterialItem>,
}
