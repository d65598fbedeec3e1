//! Instance rightsizing against a pricing catalog.
//!
//! Required capacity is the current type's vCPU and memory scaled by observed
//! utilization plus headroom. The cheapest catalog entry that still meets both
//! figures and undercuts the current type wins.

use tracing::{debug, warn};

use super::catalog::{InstanceCatalog, InstanceType};
use super::{OptimizationRecommendation, OptimizerConfig, RecommendationDetails, RecommendationType};
use crate::models::ComputeInstance;
use crate::stats;

/// Confidence ceiling for rightsizing.
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Cheapest catalog type covering the headroom-adjusted requirement.
///
/// Returns `None` when the provider or current type is not in the catalog, and
/// the current type itself when nothing cheaper qualifies.
pub fn find_optimal_instance<'a>(
    catalog: &'a InstanceCatalog,
    instance: &ComputeInstance,
    headroom: f64,
) -> Option<&'a InstanceType> {
    let current = catalog.lookup(&instance.provider, &instance.instance_type)?;

    let required_cpu =
        ((f64::from(current.cpu) * instance.cpu_utilization / 100.0 * headroom) as u32).max(1);
    let required_memory =
        (current.memory_gb * instance.memory_utilization / 100.0 * headroom).max(0.5);

    let best = catalog
        .instances(&instance.provider)?
        .iter()
        .filter(|t| t.cpu >= required_cpu && t.memory_gb >= required_memory)
        .fold(current, |best, t| {
            if t.monthly_cost < best.monthly_cost { t } else { best }
        });

    debug!(
        resource_id = %instance.resource_id,
        required_cpu,
        required_memory,
        selected = %best.name,
        "rightsizing search"
    );
    Some(best)
}

/// Confidence from utilization headroom and savings ratio.
pub fn recommendation_confidence(cpu: f64, memory: f64, savings_ratio: f64) -> f64 {
    let mut confidence = 0.5;

    if cpu < 20.0 {
        confidence += 0.3;
    } else if cpu < 40.0 {
        confidence += 0.2;
    }

    if memory < 30.0 {
        confidence += 0.2;
    } else if memory < 50.0 {
        confidence += 0.1;
    }

    if savings_ratio > 0.5 {
        confidence += 0.2;
    } else if savings_ratio > 0.3 {
        confidence += 0.1;
    }

    f64::min(MAX_CONFIDENCE, confidence)
}

fn reasoning(cpu: f64, memory: f64, savings_ratio: f64) -> String {
    let mut reasons = Vec::new();
    if cpu < 25.0 {
        reasons.push(format!("CPU utilization is low at {:.1}%", cpu));
    }
    if memory < 40.0 {
        reasons.push(format!("Memory utilization is low at {:.1}%", memory));
    }
    if savings_ratio > 0.4 {
        reasons.push(format!(
            "Significant cost savings potential ({:.1}%)",
            savings_ratio * 100.0
        ));
    }

    if reasons.is_empty() {
        "Utilization fits a smaller instance type.".to_string()
    } else {
        format!("{}.", reasons.join(". "))
    }
}

fn is_valid(instance: &ComputeInstance) -> bool {
    instance.cpu_utilization.is_finite()
        && instance.memory_utilization.is_finite()
        && instance.monthly_cost.is_finite()
        && instance.cpu_utilization >= 0.0
        && instance.memory_utilization >= 0.0
        && instance.monthly_cost >= 0.0
}

/// Rightsizing recommendations, savings descending.
///
/// Invalid instances and instances missing from the catalog are skipped.
pub fn rightsizing_recommendations(
    instances: &[ComputeInstance],
    catalog: &InstanceCatalog,
    config: &OptimizerConfig,
) -> Vec<OptimizationRecommendation> {
    let mut recommendations: Vec<OptimizationRecommendation> = instances
        .iter()
        .filter_map(|instance| {
            if !is_valid(instance) {
                warn!(
                    resource_id = %instance.resource_id,
                    cpu = instance.cpu_utilization,
                    memory = instance.memory_utilization,
                    cost = instance.monthly_cost,
                    "skipping instance with invalid utilization or cost"
                );
                return None;
            }

            let Some(optimal) = find_optimal_instance(catalog, instance, config.headroom) else {
                debug!(
                    resource_id = %instance.resource_id,
                    provider = %instance.provider,
                    instance_type = %instance.instance_type,
                    "instance type not in catalog"
                );
                return None;
            };
            if optimal.name == instance.instance_type {
                return None;
            }

            let current_cost = instance.monthly_cost;
            let savings = current_cost - optimal.monthly_cost;
            if savings <= config.min_rightsizing_savings {
                return None;
            }
            let ratio = savings / current_cost;

            Some(OptimizationRecommendation {
                resource_id: instance.resource_id.clone(),
                provider: instance.provider.clone(),
                service: instance.service.clone(),
                recommendation_type: RecommendationType::Rightsizing,
                current_cost: stats::round2(current_cost),
                projected_cost: stats::round2(optimal.monthly_cost),
                monthly_savings: stats::round2(savings),
                savings_percentage: stats::round1(ratio * 100.0),
                confidence: recommendation_confidence(
                    instance.cpu_utilization,
                    instance.memory_utilization,
                    ratio,
                ),
                reasoning: reasoning(instance.cpu_utilization, instance.memory_utilization, ratio),
                details: RecommendationDetails::Rightsizing {
                    current_instance: instance.instance_type.clone(),
                    recommended_instance: optimal.name.clone(),
                    cpu_utilization: instance.cpu_utilization,
                    memory_utilization: instance.memory_utilization,
                },
            })
        })
        .collect();

    super::sort_by_savings(&mut recommendations);
    recommendations
}
