//! Storage tiering by access recency.

use tracing::{debug, warn};

use super::catalog::StoragePricing;
use super::{OptimizationRecommendation, OptimizerConfig, RecommendationDetails, RecommendationType};
use crate::models::StorageResource;
use crate::stats;

/// Justification text for a days-since-access figure.
pub fn storage_reasoning(last_accessed_days: u32) -> String {
    if last_accessed_days > 365 {
        format!(
            "Data not accessed for {} days. Archive storage recommended.",
            last_accessed_days
        )
    } else if last_accessed_days > 90 {
        format!(
            "Infrequent access pattern ({} days). Cold storage suitable.",
            last_accessed_days
        )
    } else if last_accessed_days > 30 {
        format!(
            "Access pattern suggests infrequent tier ({} days).",
            last_accessed_days
        )
    } else {
        "Current storage class appears optimal for access pattern.".to_string()
    }
}

/// Storage class recommendations, savings descending.
pub fn storage_recommendations(
    resources: &[StorageResource],
    pricing: &StoragePricing,
    config: &OptimizerConfig,
) -> Vec<OptimizationRecommendation> {
    let mut recommendations: Vec<OptimizationRecommendation> = resources
        .iter()
        .filter_map(|storage| {
            if !storage.monthly_cost.is_finite()
                || !storage.size_gb.is_finite()
                || storage.monthly_cost < 0.0
                || storage.size_gb < 0.0
            {
                warn!(
                    resource_id = %storage.resource_id,
                    cost = storage.monthly_cost,
                    size_gb = storage.size_gb,
                    "skipping storage with invalid cost or size"
                );
                return None;
            }

            let Some(tier) = pricing.tier_for(&storage.provider, storage.last_accessed_days) else {
                debug!(
                    resource_id = %storage.resource_id,
                    provider = %storage.provider,
                    "no storage pricing for provider"
                );
                return None;
            };
            if tier.class == storage.storage_class {
                return None;
            }

            let projected_cost = storage.size_gb * tier.price_per_gb;
            let savings = storage.monthly_cost - projected_cost;
            if savings <= config.min_storage_savings {
                return None;
            }

            let savings_percentage = if storage.monthly_cost > 0.0 {
                stats::round1(savings / storage.monthly_cost * 100.0)
            } else {
                0.0
            };

            Some(OptimizationRecommendation {
                resource_id: storage.resource_id.clone(),
                provider: storage.provider.clone(),
                service: storage.service.clone(),
                recommendation_type: RecommendationType::StorageOptimization,
                current_cost: stats::round2(storage.monthly_cost),
                projected_cost: stats::round2(projected_cost),
                monthly_savings: stats::round2(savings),
                savings_percentage,
                confidence: config.storage_confidence,
                reasoning: storage_reasoning(storage.last_accessed_days),
                details: RecommendationDetails::Storage {
                    current_storage_class: storage.storage_class.clone(),
                    recommended_storage_class: tier.class.clone(),
                    size_gb: storage.size_gb,
                    last_accessed_days: storage.last_accessed_days,
                },
            })
        })
        .collect();

    super::sort_by_savings(&mut recommendations);
    recommendations
}
