//! Data models consumed by the engine.
//!
//! These are the tabular records the surrounding system hands in: cost
//! observations for anomaly detection and forecasting, and utilization,
//! instance and storage snapshots for the optimization engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cloud provider a cost was incurred on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    Aws,
    Azure,
    OnPremises,
    /// Any provider outside the fixed encoding
    Other(String),
}

impl Provider {
    /// Sentinel code for providers outside the fixed mapping.
    pub const UNKNOWN_CODE: u8 = 3;

    /// Categorical encoding used as a model feature.
    pub fn code(&self) -> u8 {
        match self {
            Provider::Aws => 0,
            Provider::Azure => 1,
            Provider::OnPremises => 2,
            Provider::Other(_) => Self::UNKNOWN_CODE,
        }
    }

    /// Canonical lowercase name (also the catalog key).
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::OnPremises => "onpremises",
            Provider::Other(name) => name,
        }
    }
}

impl From<String> for Provider {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "aws" => Provider::Aws,
            "azure" => Provider::Azure,
            "onpremises" => Provider::OnPremises,
            _ => Provider::Other(value),
        }
    }
}

impl From<&str> for Provider {
    fn from(value: &str) -> Self {
        Provider::from(value.to_string())
    }
}

impl From<Provider> for String {
    fn from(value: Provider) -> Self {
        value.as_str().to_string()
    }
}

impl Default for Provider {
    fn default() -> Self {
        Provider::Aws
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cost observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// When the cost was incurred
    pub timestamp: DateTime<Utc>,

    /// Provider (aws, azure, onpremises, ...)
    pub provider: Provider,

    /// Service name (e.g., "ec2", "storage")
    pub service: String,

    /// Resource identifier
    pub resource_id: String,

    /// Cost in USD, never negative
    pub cost: f64,

    /// Usage hours in the period, if reported
    #[serde(default)]
    pub usage_hours: Option<f64>,

    /// Number of resources behind the cost, if reported
    #[serde(default)]
    pub resource_count: Option<u32>,
}

impl CostRecord {
    /// Create a new CostRecord with required fields.
    pub fn new(
        timestamp: DateTime<Utc>,
        provider: impl Into<Provider>,
        service: impl Into<String>,
        resource_id: impl Into<String>,
        cost: f64,
    ) -> Self {
        Self {
            timestamp,
            provider: provider.into(),
            service: service.into(),
            resource_id: resource_id.into(),
            cost,
            usage_hours: None,
            resource_count: None,
        }
    }

    /// Set usage hours.
    pub fn with_usage_hours(mut self, hours: f64) -> Self {
        self.usage_hours = Some(hours);
        self
    }

    /// Set resource count.
    pub fn with_resource_count(mut self, count: u32) -> Self {
        self.resource_count = Some(count);
        self
    }
}

/// Utilization snapshot of one resource, input to clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub resource_id: String,

    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_compute_service")]
    pub service: String,

    /// CPU utilization percentage (0-100)
    #[serde(default)]
    pub cpu_utilization: Option<f64>,

    /// Memory utilization percentage (0-100)
    #[serde(default)]
    pub memory_utilization: Option<f64>,

    /// Network throughput (any consistent unit)
    #[serde(default)]
    pub network_io: Option<f64>,

    /// Disk throughput (any consistent unit)
    #[serde(default)]
    pub disk_io: Option<f64>,

    /// Monthly cost in USD, if known
    #[serde(default)]
    pub monthly_cost: Option<f64>,
}

impl ResourceUtilization {
    /// Create a utilization record with CPU and memory figures.
    pub fn new(resource_id: impl Into<String>, cpu: f64, memory: f64) -> Self {
        Self {
            resource_id: resource_id.into(),
            provider: Provider::Aws,
            service: default_compute_service(),
            cpu_utilization: Some(cpu),
            memory_utilization: Some(memory),
            network_io: None,
            disk_io: None,
            monthly_cost: None,
        }
    }

    /// Set IO figures.
    pub fn with_io(mut self, network: f64, disk: f64) -> Self {
        self.network_io = Some(network);
        self.disk_io = Some(disk);
        self
    }

    /// Set monthly cost.
    pub fn with_monthly_cost(mut self, cost: f64) -> Self {
        self.monthly_cost = Some(cost);
        self
    }
}

/// A running compute instance considered for rightsizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeInstance {
    pub resource_id: String,

    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_compute_service")]
    pub service: String,

    /// Catalog instance type (e.g., "m5.4xlarge")
    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    /// CPU utilization percentage (0-100)
    #[serde(default = "default_utilization")]
    pub cpu_utilization: f64,

    /// Memory utilization percentage (0-100)
    #[serde(default = "default_utilization")]
    pub memory_utilization: f64,

    /// Current monthly cost in USD
    #[serde(default = "default_instance_cost")]
    pub monthly_cost: f64,
}

impl ComputeInstance {
    /// Create an instance record.
    pub fn new(
        resource_id: impl Into<String>,
        provider: impl Into<Provider>,
        instance_type: impl Into<String>,
        cpu_utilization: f64,
        memory_utilization: f64,
        monthly_cost: f64,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            provider: provider.into(),
            service: default_compute_service(),
            instance_type: instance_type.into(),
            cpu_utilization,
            memory_utilization,
            monthly_cost,
        }
    }

    /// Set service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}

/// A storage bucket or volume considered for tiering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageResource {
    pub resource_id: String,

    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_storage_service")]
    pub service: String,

    /// Current storage class (e.g., "standard", "hot")
    #[serde(default = "default_storage_class")]
    pub storage_class: String,

    /// Days since the data was last read
    #[serde(default)]
    pub last_accessed_days: u32,

    /// Current monthly cost in USD
    #[serde(default)]
    pub monthly_cost: f64,

    /// Stored volume in GB
    #[serde(default)]
    pub size_gb: f64,
}

impl StorageResource {
    /// Create a storage record.
    pub fn new(
        resource_id: impl Into<String>,
        provider: impl Into<Provider>,
        storage_class: impl Into<String>,
        last_accessed_days: u32,
        monthly_cost: f64,
        size_gb: f64,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            provider: provider.into(),
            service: default_storage_service(),
            storage_class: storage_class.into(),
            last_accessed_days,
            monthly_cost,
            size_gb,
        }
    }
}

fn default_compute_service() -> String {
    "compute".to_string()
}

fn default_storage_service() -> String {
    "storage".to_string()
}

fn default_instance_type() -> String {
    "m5.large".to_string()
}

fn default_storage_class() -> String {
    "standard".to_string()
}

fn default_utilization() -> f64 {
    50.0
}

fn default_instance_cost() -> f64 {
    100.0
}
