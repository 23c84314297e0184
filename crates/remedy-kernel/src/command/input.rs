//! Command input contract
//!
//! Input arrives as camelCase JSON. Every field is optional at the serde
//! level so that a missing field surfaces as a [`ValidationError`] naming it,
//! rather than an opaque deserialization failure.

use super::CommandKind;
use crate::error::ValidationError;
use crate::repository::IncidentQuery;
use crate::types::{CorrelationId, IncidentId, TenantId};
use serde::{Deserialize, Serialize};

/// Raw, unvalidated command input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandInput {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub unresolved_only: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CommandInput {
    /// Input for a command against one incident
    #[must_use]
    pub fn new(
        command: CommandKind,
        tenant_id: impl Into<String>,
        incident_id: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            correlation_id: Some(correlation_id.into()),
            incident_id: Some(incident_id.into()),
            command: Some(command.as_str().to_string()),
            ..Self::default()
        }
    }

    /// With an operator reason
    #[inline]
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// With query filters
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, unresolved_only: bool, limit: Option<usize>) -> Self {
        self.unresolved_only = Some(unresolved_only);
        self.limit = limit;
        self
    }

    /// Parse a JSON document
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(raw).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Check the contract and produce a typed request
    pub fn validate(&self) -> Result<CommandRequest, ValidationError> {
        let tenant_id = required(&self.tenant_id, "tenantId")?;
        let correlation_id = required(&self.correlation_id, "correlationId")?;
        let incident_id = required(&self.incident_id, "incidentId")?;
        let kind: CommandKind = required(&self.command, "command")?.parse()?;

        Ok(CommandRequest {
            kind,
            tenant_id: TenantId::from(tenant_id),
            correlation_id: CorrelationId::from(correlation_id),
            incident_id: IncidentId::from(incident_id),
            reason: self.reason.clone().filter(|r| !r.trim().is_empty()),
            unresolved_only: self.unresolved_only.unwrap_or(false),
            limit: self.limit,
        })
    }
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// Validated command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub kind: CommandKind,
    pub tenant_id: TenantId,
    pub correlation_id: CorrelationId,
    pub incident_id: IncidentId,
    pub reason: Option<String>,
    pub unresolved_only: bool,
    pub limit: Option<usize>,
}

impl CommandRequest {
    /// Incident filter for `query`, always scoped to the caller's tenant
    #[must_use]
    pub fn incident_query(&self) -> IncidentQuery {
        IncidentQuery::for_tenant(self.tenant_id.clone())
            .with_unresolved_only(self.unresolved_only)
            .with_limit(self.limit)
    }
}
