//! Tenant identity as recorded in the shared tenant registry.

pub mod registry;
pub mod resolver;
pub mod slug;

pub use registry::{PgRegistry, RegistryStore};
pub use resolver::SchemaResolver;
pub use slug::{sanitize_schema_slug, schema_name_for};

use crate::error::TenantError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Product module served by a deployment. Each module has its own schema column in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceModule {
    Finance,
    Operations,
    Inventory,
    Hrms,
}

impl ServiceModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceModule::Finance => "finance",
            ServiceModule::Operations => "operations",
            ServiceModule::Inventory => "inventory",
            ServiceModule::Hrms => "hrms",
        }
    }

    /// Registry column holding this module's schema name. Static, so safe to splice into SQL.
    pub fn schema_column(&self) -> &'static str {
        match self {
            ServiceModule::Finance => "finance_schema",
            ServiceModule::Operations => "operations_schema",
            ServiceModule::Inventory => "inventory_schema",
            ServiceModule::Hrms => "hrms_schema",
        }
    }

    /// Prefix for schema names this module provisions.
    pub fn schema_prefix(&self) -> &'static str {
        match self {
            ServiceModule::Finance => "fin_",
            ServiceModule::Operations => "ops_",
            ServiceModule::Inventory => "inv_",
            ServiceModule::Hrms => "hrms_",
        }
    }

    /// Stored procedure (operations database) that creates a tenant schema for this module.
    pub fn provision_procedure(&self) -> String {
        format!("ensure_{}_tenant_schema", self.as_str())
    }
}

impl std::fmt::Display for ServiceModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceModule {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "finance" => Ok(ServiceModule::Finance),
            "operations" => Ok(ServiceModule::Operations),
            "inventory" => Ok(ServiceModule::Inventory),
            "hrms" => Ok(ServiceModule::Hrms),
            _ => Err(TenantError::UnknownService(s.to_string())),
        }
    }
}

/// Per-module schema columns of a registry row.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ModuleSchemas {
    pub finance: Option<String>,
    pub operations: Option<String>,
    pub inventory: Option<String>,
    pub hrms: Option<String>,
}

impl ModuleSchemas {
    /// Schema for `module`, treating blank values as unset.
    pub fn get(&self, module: ServiceModule) -> Option<&str> {
        let value = match module {
            ServiceModule::Finance => &self.finance,
            ServiceModule::Operations => &self.operations,
            ServiceModule::Inventory => &self.inventory,
            ServiceModule::Hrms => &self.hrms,
        };
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, module: ServiceModule, schema: impl Into<String>) {
        let slot = match module {
            ServiceModule::Finance => &mut self.finance,
            ServiceModule::Operations => &mut self.operations,
            ServiceModule::Inventory => &mut self.inventory,
            ServiceModule::Hrms => &mut self.hrms,
        };
        *slot = Some(schema.into());
    }
}

/// One row of `tenant_registry`. Activation and subscriptions are owned by tenant management;
/// this service only writes its own schema column.
#[derive(Clone, Debug, Serialize)]
pub struct TenantRecord {
    pub tenant_id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub contact_email: Option<String>,
    pub is_active: bool,
    pub modules_subscribed: Vec<String>,
    pub schemas: ModuleSchemas,
    pub modified_at: Option<DateTime<Utc>>,
}

impl TenantRecord {
    pub fn is_subscribed(&self, module: ServiceModule) -> bool {
        self.modules_subscribed
            .iter()
            .any(|m| m.eq_ignore_ascii_case(module.as_str()))
    }
}
