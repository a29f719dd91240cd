use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fields the platform does not interpret but faithfully stores and returns.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Number of marathons returned by the featured/upcoming sampling endpoints.
pub const SAMPLE_SIZE: usize = 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Marathon {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub id: Option<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Registration window, stored as the creator supplied it (string form).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_reg_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reg_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marathon_start_date: Option<String>,
    /// Email of the creating user; drives the owner filter on `/allmarathons`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Live registrant counter, only ever moved by atomic ±1 updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reg_count: Option<i64>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub id: Option<ObjectId>,
    /// Hex id of the marathon this signup refers to. Not a foreign key: the
    /// referenced marathon may be gone, readers skip dangling references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marathon_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Display name derived from first/last name when checkout is initiated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
    /// Correlates the payment-gateway callback back to this record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tran_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RegistrationStatus>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Extra,
}

impl Registration {
    /// "first last", with either half tolerated missing.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{} {}", first, last).trim().to_string()
    }
}

/// Recognized values of the `sortOption` query parameter; anything else means
/// store-default ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarathonSort {
    RegistrationStart,
    MarathonStart,
}

impl MarathonSort {
    pub fn parse(option: &str) -> Option<Self> {
        match option {
            "registration" => Some(MarathonSort::RegistrationStart),
            "marathon" => Some(MarathonSort::MarathonStart),
            _ => None,
        }
    }
}

// Write outcomes are reported to clients the way the store reports them;
// zero counts stand in for "not found" on delete/update paths.

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub inserted_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}
