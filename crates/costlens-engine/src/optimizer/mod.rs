//! Rule-based cost optimization.
//!
//! This module turns resource snapshots into savings recommendations:
//! - **Budget tiers**: category-specific savings levers against current spend
//! - **Utilization clustering**: k-means over CPU/memory/IO to find idle and hot groups
//! - **Rightsizing**: cheapest catalog instance covering utilization plus headroom
//! - **Storage tiering**: cheaper storage class by days since last access
//! - **Reserved instances**: commitment savings for steadily utilized resources
//!
//! ## Usage
//!
//! ```no_run
//! use costlens_engine::{OptimizerConfig, ResourceInventory, ResourceOptimizer};
//!
//! fn run(inventory: &ResourceInventory) {
//!     let optimizer = ResourceOptimizer::new(OptimizerConfig::default());
//!     let report = optimizer.generate_report(inventory);
//!     println!("Potential savings: ${:.2}/month", report.total_potential_savings);
//!
//!     let budget = optimizer.optimize_for_budget(180_000.0, 250_000.0);
//!     println!("{} tier, {:.1}% reduction", budget.budget_category, budget.cost_reduction_percentage);
//! }
//! ```

pub mod budget;
pub mod catalog;
pub mod clustering;
pub mod rightsizing;
pub mod storage;

pub use budget::{BudgetCategory, BudgetOptimization, SavingsLever, TimelinePhase};
pub use catalog::{InstanceCatalog, InstanceType, StoragePricing, StorageTier};
pub use clustering::{
    ClusterAssignment, ClusterSummary, ClusterType, KMeans, OptimizationPotential,
    UtilizationAnalysis, UtilizationRecommendation,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::models::{ComputeInstance, Provider, ResourceUtilization, StorageResource};
use crate::stats;

/// Configuration for the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Upper bound on utilization clusters (default: 5)
    pub max_clusters: usize,

    /// K-means restarts (default: 10)
    pub kmeans_restarts: usize,

    /// K-means iteration cap per restart (default: 300)
    pub kmeans_max_iter: usize,

    /// Mean CPU below which a cluster is underutilized (default: 30%)
    pub cpu_underutilized: f64,

    /// Mean CPU above which a cluster is overutilized (default: 80%)
    pub cpu_overutilized: f64,

    /// Memory below which the rule fallback flags a resource (default: 40%)
    pub memory_underutilized: f64,

    /// Capacity multiplier applied to observed utilization (default: 1.2)
    pub headroom: f64,

    /// Minimum monthly savings to recommend rightsizing (default: $10)
    pub min_rightsizing_savings: f64,

    /// Minimum monthly savings to recommend a storage move (default: $5)
    pub min_storage_savings: f64,

    /// Confidence attached to storage recommendations (default: 0.85)
    pub storage_confidence: f64,

    /// Savings share of a reserved-instance commitment (default: 0.30)
    pub reserved_instance_savings: f64,

    /// Random seed for clustering (default: 42)
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_clusters: 5,
            kmeans_restarts: 10,
            kmeans_max_iter: 300,
            cpu_underutilized: 30.0,
            cpu_overutilized: 80.0,
            memory_underutilized: 40.0,
            headroom: 1.2,
            min_rightsizing_savings: 10.0,
            min_storage_savings: 5.0,
            storage_confidence: 0.85,
            reserved_instance_savings: 0.30,
            seed: 42,
        }
    }
}

impl OptimizerConfig {
    /// Set the cluster cap (at least 1).
    pub fn with_max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = max_clusters.max(1);
        self
    }

    /// Set the headroom multiplier (at least 1.0).
    pub fn with_headroom(mut self, headroom: f64) -> Self {
        self.headroom = headroom.max(1.0);
        self
    }

    /// Set the minimum savings thresholds.
    pub fn with_min_savings(mut self, rightsizing: f64, storage: f64) -> Self {
        self.min_rightsizing_savings = rightsizing.max(0.0);
        self.min_storage_savings = storage.max(0.0);
        self
    }
}

/// Kind of recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    /// Move to a cheaper instance type
    Rightsizing,
    /// Commit to reserved capacity
    ReservedInstance,
    /// Move data to a cheaper storage class
    StorageOptimization,
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationType::Rightsizing => write!(f, "rightsizing"),
            RecommendationType::ReservedInstance => write!(f, "reserved_instance"),
            RecommendationType::StorageOptimization => write!(f, "storage_optimization"),
        }
    }
}

/// Type-specific recommendation fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationDetails {
    Rightsizing {
        current_instance: String,
        recommended_instance: String,
        cpu_utilization: f64,
        memory_utilization: f64,
    },
    ReservedInstance {
        cluster_id: usize,
        avg_cpu: f64,
    },
    Storage {
        current_storage_class: String,
        recommended_storage_class: String,
        size_gb: f64,
        last_accessed_days: u32,
    },
}

/// A single savings recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecommendation {
    pub resource_id: String,
    pub provider: Provider,
    pub service: String,
    pub recommendation_type: RecommendationType,

    /// Current monthly cost
    pub current_cost: f64,

    /// Monthly cost after the change
    pub projected_cost: f64,

    pub monthly_savings: f64,
    pub savings_percentage: f64,

    /// 0.0-1.0
    pub confidence: f64,

    pub reasoning: String,
    pub details: RecommendationDetails,
}

/// Stable sort, largest savings first.
pub fn sort_by_savings(recommendations: &mut [OptimizationRecommendation]) {
    recommendations.sort_by(|a, b| b.monthly_savings.total_cmp(&a.monthly_savings));
}

/// Resource snapshots handed to [`ResourceOptimizer::generate_report`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceInventory {
    pub instances: Vec<ComputeInstance>,
    pub storage: Vec<StorageResource>,
    pub utilization: Vec<ResourceUtilization>,
}

/// Aggregated optimization output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// When this report was generated
    pub generated_at: DateTime<Utc>,

    /// Sum of monthly savings over all recommendations
    pub total_potential_savings: f64,

    pub rightsizing_count: usize,
    pub storage_count: usize,
    pub reserved_instance_count: usize,

    /// All recommendations, savings descending
    pub recommendations: Vec<OptimizationRecommendation>,

    /// Clustering output the reserved-instance pass used
    pub utilization: UtilizationAnalysis,
}

/// Optimization engine over a configurable instance catalog and storage pricing.
#[derive(Debug, Clone, Default)]
pub struct ResourceOptimizer {
    config: OptimizerConfig,
    catalog: InstanceCatalog,
    storage_pricing: StoragePricing,
}

impl ResourceOptimizer {
    /// Create an optimizer with the built-in pricing tables.
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            catalog: InstanceCatalog::default(),
            storage_pricing: StoragePricing::default(),
        }
    }

    /// Replace the instance catalog.
    pub fn with_catalog(mut self, catalog: InstanceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the storage pricing.
    pub fn with_storage_pricing(mut self, pricing: StoragePricing) -> Self {
        self.storage_pricing = pricing;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Savings projection for a budget tier.
    pub fn optimize_for_budget(
        &self,
        current_monthly_cost: f64,
        monthly_budget: f64,
    ) -> BudgetOptimization {
        budget::optimize_for_budget(current_monthly_cost, monthly_budget)
    }

    /// Cluster resources by utilization.
    pub fn analyze_utilization(&self, resources: &[ResourceUtilization]) -> UtilizationAnalysis {
        clustering::analyze_utilization(resources, &self.config)
    }

    /// Rightsizing recommendations, savings descending.
    pub fn rightsizing_recommendations(
        &self,
        instances: &[ComputeInstance],
    ) -> Vec<OptimizationRecommendation> {
        rightsizing::rightsizing_recommendations(instances, &self.catalog, &self.config)
    }

    /// Storage tiering recommendations, savings descending.
    pub fn storage_recommendations(
        &self,
        resources: &[StorageResource],
    ) -> Vec<OptimizationRecommendation> {
        storage::storage_recommendations(resources, &self.storage_pricing, &self.config)
    }

    /// Reserved-capacity recommendations for resources in optimal clusters.
    ///
    /// Only resources with a known monthly cost qualify.
    pub fn reserved_instance_recommendations(
        &self,
        resources: &[ResourceUtilization],
        analysis: &UtilizationAnalysis,
    ) -> Vec<OptimizationRecommendation> {
        let mut recommendations: Vec<OptimizationRecommendation> = analysis
            .assignments
            .iter()
            .filter_map(|assignment| {
                let cluster = analysis
                    .clusters
                    .iter()
                    .find(|c| c.cluster_id == assignment.cluster_id)?;
                if cluster.cluster_type != ClusterType::Optimal {
                    return None;
                }
                let resource = resources
                    .iter()
                    .find(|r| r.resource_id == assignment.resource_id)?;
                let cost = resource.monthly_cost.filter(|c| c.is_finite() && *c > 0.0)?;

                let share = cluster.optimization_potential.savings_share();
                let savings = cost * share;
                if savings <= self.config.min_rightsizing_savings {
                    return None;
                }

                Some(OptimizationRecommendation {
                    resource_id: resource.resource_id.clone(),
                    provider: resource.provider.clone(),
                    service: resource.service.clone(),
                    recommendation_type: RecommendationType::ReservedInstance,
                    current_cost: stats::round2(cost),
                    projected_cost: stats::round2(cost - savings),
                    monthly_savings: stats::round2(savings),
                    savings_percentage: stats::round1(share * 100.0),
                    confidence: 0.8,
                    reasoning: format!(
                        "Steady utilization (cluster average CPU {:.1}%) suits reserved capacity.",
                        cluster.avg_cpu
                    ),
                    details: RecommendationDetails::ReservedInstance {
                        cluster_id: cluster.cluster_id,
                        avg_cpu: cluster.avg_cpu,
                    },
                })
            })
            .collect();

        sort_by_savings(&mut recommendations);
        recommendations
    }

    /// Run every pass over an inventory and merge the results.
    pub fn generate_report(&self, inventory: &ResourceInventory) -> OptimizationReport {
        let rightsizing = self.rightsizing_recommendations(&inventory.instances);
        let storage = self.storage_recommendations(&inventory.storage);
        let utilization = self.analyze_utilization(&inventory.utilization);
        let reserved = self.reserved_instance_recommendations(&inventory.utilization, &utilization);

        let rightsizing_count = rightsizing.len();
        let storage_count = storage.len();
        let reserved_instance_count = reserved.len();

        let mut recommendations: Vec<OptimizationRecommendation> = rightsizing
            .into_iter()
            .chain(storage)
            .chain(reserved)
            .collect();
        sort_by_savings(&mut recommendations);

        let total_potential_savings =
            stats::round2(recommendations.iter().map(|r| r.monthly_savings).sum());

        info!(
            recommendations = recommendations.len(),
            rightsizing = rightsizing_count,
            storage = storage_count,
            reserved = reserved_instance_count,
            total_potential_savings,
            "optimization report generated"
        );

        OptimizationReport {
            generated_at: Utc::now(),
            total_potential_savings,
            rightsizing_count,
            storage_count,
            reserved_instance_count,
            recommendations,
            utilization,
        }
    }
}
