//! Provisioning audit trail (`tenant_module_log` in the registry database).
//!
//! Each attempt is one row that moves `pending -> schema_created -> success`, or to `failed`.
//! A row left in `schema_created` means the physical schema exists but the registry may not
//! reflect it yet; the reconciler picks those up.

use crate::tenant::ServiceModule;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const PROVISION_ACTION: &str = "provision";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    SchemaCreated,
    Success,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::SchemaCreated => "schema_created",
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "schema_created" => Ok(AuditStatus::SchemaCreated),
            "success" => Ok(AuditStatus::Success),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(format!("unknown audit status: {}", other)),
        }
    }
}

/// Row written at the start of an attempt (status `pending`).
#[derive(Clone, Debug)]
pub struct NewAuditEntry {
    pub tenant_id: Uuid,
    pub module: ServiceModule,
    pub schema_name: String,
    pub actor: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningAuditEntry {
    pub id: i64,
    pub tenant_id: Uuid,
    pub module_name: String,
    pub action: String,
    pub schema_name: String,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Which audit rows a status update applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuditTarget {
    /// The row returned by the insert.
    Entry(i64),
    /// Every still-pending provision row for the tenant and module. Only used to mark a failed
    /// attempt whose own insert failed.
    Pending { tenant_id: Uuid, module: ServiceModule },
}
