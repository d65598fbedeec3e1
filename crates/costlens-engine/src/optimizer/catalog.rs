//! Instance and storage pricing tables.
//!
//! Both catalogs default to built-in list prices and can be replaced from YAML
//! so prices change without touching the engine:
//!
//! ```yaml
//! aws:
//!   - { name: t3.nano, cpu: 2, memory_gb: 0.5, monthly_cost: 3.50 }
//!   - { name: m5.large, cpu: 2, memory_gb: 8, monthly_cost: 70.02 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::models::Provider;

/// Hours in a billing month.
pub const HOURS_PER_MONTH: f64 = 730.0;

/// One catalog instance type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,

    /// vCPU count
    pub cpu: u32,

    pub memory_gb: f64,

    /// On-demand monthly price in USD
    pub monthly_cost: f64,
}

impl InstanceType {
    pub fn new(name: impl Into<String>, cpu: u32, memory_gb: f64, monthly_cost: f64) -> Self {
        Self {
            name: name.into(),
            cpu,
            memory_gb,
            monthly_cost,
        }
    }

    /// On-demand hourly price.
    pub fn hourly_cost(&self) -> f64 {
        self.monthly_cost / HOURS_PER_MONTH
    }
}

/// Instance types per provider, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceCatalog {
    providers: BTreeMap<String, Vec<InstanceType>>,
}

impl Default for InstanceCatalog {
    fn default() -> Self {
        let aws = vec![
            InstanceType::new("t3.nano", 2, 0.5, 3.50),
            InstanceType::new("t3.micro", 2, 1.0, 7.00),
            InstanceType::new("t3.small", 2, 2.0, 14.00),
            InstanceType::new("t3.medium", 2, 4.0, 28.00),
            InstanceType::new("t3.large", 2, 8.0, 56.00),
            InstanceType::new("m5.large", 2, 8.0, 70.02),
            InstanceType::new("m5.xlarge", 4, 16.0, 140.16),
            InstanceType::new("m5.2xlarge", 8, 32.0, 280.32),
            InstanceType::new("m5.4xlarge", 16, 64.0, 560.16),
        ];
        let azure = vec![
            InstanceType::new("Standard_B1s", 1, 1.0, 7.52),
            InstanceType::new("Standard_B2s", 2, 4.0, 30.08),
            InstanceType::new("Standard_D2s_v4", 2, 8.0, 70.08),
            InstanceType::new("Standard_D4s_v4", 4, 16.0, 140.16),
            InstanceType::new("Standard_D8s_v4", 8, 32.0, 280.32),
        ];

        Self::empty()
            .with_provider(Provider::Aws, aws)
            .with_provider(Provider::Azure, azure)
    }
}

impl InstanceCatalog {
    /// A catalog with no providers.
    pub fn empty() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Add or replace one provider's instance list.
    pub fn with_provider(mut self, provider: Provider, instances: Vec<InstanceType>) -> Self {
        self.providers.insert(provider.as_str().to_string(), instances);
        self
    }

    /// Parse a catalog from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        for (provider, instances) in &self.providers {
            if let Some(bad) = instances
                .iter()
                .find(|i| !i.monthly_cost.is_finite() || i.monthly_cost < 0.0 || i.memory_gb < 0.0)
            {
                return Err(EngineError::Config(format!(
                    "instance {} for {} has an invalid price or memory size",
                    bad.name, provider
                )));
            }
        }
        Ok(())
    }

    /// Instance types offered by a provider.
    pub fn instances(&self, provider: &Provider) -> Option<&[InstanceType]> {
        self.providers.get(provider.as_str()).map(Vec::as_slice)
    }

    /// Look up a single instance type.
    pub fn lookup(&self, provider: &Provider, name: &str) -> Option<&InstanceType> {
        self.instances(provider)?.iter().find(|i| i.name == name)
    }
}

/// One rung of a storage tier ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageTier {
    /// Storage class name (e.g., "standard_ia")
    pub class: String,

    /// Highest days-since-access served by this tier, `None` for the last rung
    #[serde(default)]
    pub max_days: Option<u32>,

    /// Monthly price per GB in USD
    pub price_per_gb: f64,
}

impl StorageTier {
    pub fn new(class: impl Into<String>, max_days: Option<u32>, price_per_gb: f64) -> Self {
        Self {
            class: class.into(),
            max_days,
            price_per_gb,
        }
    }
}

/// Storage tier ladders per provider, hottest tier first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoragePricing {
    providers: BTreeMap<String, Vec<StorageTier>>,
}

impl Default for StoragePricing {
    fn default() -> Self {
        let aws = vec![
            StorageTier::new("standard", Some(30), 0.023),
            StorageTier::new("standard_ia", Some(90), 0.0125),
            StorageTier::new("glacier", Some(365), 0.004),
            StorageTier::new("glacier_deep", None, 0.00099),
        ];
        let azure = vec![
            StorageTier::new("hot", Some(30), 0.0184),
            StorageTier::new("cool", Some(90), 0.01),
            StorageTier::new("archive", None, 0.00099),
        ];

        Self::empty()
            .with_provider(Provider::Aws, aws)
            .with_provider(Provider::Azure, azure)
    }
}

impl StoragePricing {
    /// A pricing table with no providers.
    pub fn empty() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Add or replace one provider's tier ladder.
    pub fn with_provider(mut self, provider: Provider, tiers: Vec<StorageTier>) -> Self {
        self.providers.insert(provider.as_str().to_string(), tiers);
        self
    }

    /// Parse pricing from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let pricing: Self = serde_yaml::from_str(yaml)?;
        pricing.validate()?;
        Ok(pricing)
    }

    /// Load pricing from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        for (provider, tiers) in &self.providers {
            if tiers.is_empty() {
                return Err(EngineError::Config(format!(
                    "storage tiers for {} are empty",
                    provider
                )));
            }
            if tiers.iter().any(|t| !t.price_per_gb.is_finite() || t.price_per_gb < 0.0) {
                return Err(EngineError::Config(format!(
                    "storage tiers for {} contain an invalid price",
                    provider
                )));
            }
        }
        Ok(())
    }

    /// Tier for data last read `days` ago. The last rung catches everything older.
    pub fn tier_for(&self, provider: &Provider, days: u32) -> Option<&StorageTier> {
        let tiers = self.providers.get(provider.as_str())?;
        tiers
            .iter()
            .find(|t| t.max_days.is_none_or(|max| days <= max))
            .or_else(|| tiers.last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_instance_catalog() {
        let catalog = InstanceCatalog::default();
        let m5 = catalog.lookup(&Provider::Aws, "m5.4xlarge").unwrap();
        assert_eq!(m5.cpu, 16);
        assert_eq!(m5.monthly_cost, 560.16);
        assert!((m5.hourly_cost() - 0.767_342).abs() < 1e-5);

        assert_eq!(catalog.instances(&Provider::Azure).unwrap().len(), 5);
        assert!(catalog.instances(&Provider::from("gcp")).is_none());
        assert!(catalog.lookup(&Provider::Aws, "x9.huge").is_none());
    }

    #[test]
    fn test_storage_ladder() {
        let pricing = StoragePricing::default();
        let aws = Provider::Aws;

        assert_eq!(pricing.tier_for(&aws, 0).unwrap().class, "standard");
        assert_eq!(pricing.tier_for(&aws, 30).unwrap().class, "standard");
        assert_eq!(pricing.tier_for(&aws, 31).unwrap().class, "standard_ia");
        assert_eq!(pricing.tier_for(&aws, 365).unwrap().class, "glacier");
        assert_eq!(pricing.tier_for(&aws, 366).unwrap().class, "glacier_deep");
        assert_eq!(pricing.tier_for(&Provider::Azure, 91).unwrap().class, "archive");
        assert!(pricing.tier_for(&Provider::OnPremises, 400).is_none());
    }

    #[test]
    fn test_catalog_from_yaml() {
        let yaml = r#"
aws:
  - { name: small, cpu: 1, memory_gb: 1, monthly_cost: 5.0 }
  - { name: big, cpu: 8, memory_gb: 32, monthly_cost: 200.0 }
"#;
        let catalog = InstanceCatalog::from_yaml_str(yaml).unwrap();
        assert_eq!(catalog.instances(&Provider::Aws).unwrap()[1].name, "big");
        assert!(catalog.instances(&Provider::Azure).is_none());

        let bad = "aws:\n  - { name: x, cpu: 1, memory_gb: 1, monthly_cost: -1 }\n";
        assert!(matches!(
            InstanceCatalog::from_yaml_str(bad).unwrap_err(),
            EngineError::Config(_)
        ));
    }

    #[test]
    fn test_storage_pricing_from_yaml() {
        let yaml = r#"
aws:
  - { class: hot, max_days: 7, price_per_gb: 0.03 }
  - { class: cold, price_per_gb: 0.001 }
"#;
        let pricing = StoragePricing::from_yaml_str(yaml).unwrap();
        assert_eq!(pricing.tier_for(&Provider::Aws, 8).unwrap().class, "cold");
        assert!(StoragePricing::from_yaml_str("aws: []").is_err());
    }
}
