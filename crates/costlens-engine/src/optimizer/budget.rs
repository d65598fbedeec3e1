//! Budget-tier savings projection.
//!
//! A monthly budget picks one of four [`BudgetCategory`] tiers. Each tier
//! applies a fixed set of savings levers to the current monthly spend and
//! carries its own recommendation list and rollout timeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::stats;

/// Budget tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCategory {
    /// [$100K, $500K)
    Small,
    /// [$500K, $2M)
    Medium,
    /// [$2M, $5M)
    Large,
    /// $5M and up, plus anything matching no lower bracket
    Enterprise,
}

impl BudgetCategory {
    /// Bracket lookup. Boundaries belong to the higher bracket.
    pub fn from_budget(monthly_budget: f64) -> Self {
        const BRACKETS: [(f64, f64, BudgetCategory); 3] = [
            (100_000.0, 500_000.0, BudgetCategory::Small),
            (500_000.0, 2_000_000.0, BudgetCategory::Medium),
            (2_000_000.0, 5_000_000.0, BudgetCategory::Large),
        ];

        BRACKETS
            .iter()
            .find(|(lo, hi, _)| *lo <= monthly_budget && monthly_budget < *hi)
            .map(|(_, _, category)| *category)
            .unwrap_or(BudgetCategory::Enterprise)
    }

    /// Savings levers applied to current spend.
    pub fn levers(&self) -> &'static [(&'static str, f64)] {
        match self {
            BudgetCategory::Small | BudgetCategory::Medium => {
                &[("rightsizing", 0.15), ("reserved_instances", 0.20)]
            }
            BudgetCategory::Large => &[
                ("rightsizing", 0.20),
                ("spot_instances", 0.15),
                ("storage_optimization", 0.10),
            ],
            BudgetCategory::Enterprise => &[
                ("compute_optimization", 0.25),
                ("network_optimization", 0.08),
                ("storage_optimization", 0.12),
            ],
        }
    }

    /// Recommended actions for this tier.
    pub fn recommendations(&self) -> &'static [&'static str] {
        match self {
            BudgetCategory::Small | BudgetCategory::Medium => &[
                "Implement auto-scaling for development environments",
                "Purchase reserved instances for stable workloads",
                "Right-size oversized instances based on utilization",
            ],
            BudgetCategory::Large => &[
                "Implement spot instance strategies for non-critical workloads",
                "Optimize data lifecycle and storage tiers",
                "Deploy advanced monitoring and automated scaling",
                "Implement cost allocation tags for chargeback",
            ],
            BudgetCategory::Enterprise => &[
                "Deploy enterprise discount programs and volume commitments",
                "Implement multi-cloud cost arbitrage strategies",
                "Advanced workload placement optimization",
                "Enterprise-grade FinOps governance framework",
                "Automated cost anomaly detection and remediation",
            ],
        }
    }

    /// Ordered rollout phases as (phase, duration).
    pub fn timeline(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            BudgetCategory::Small => &[
                ("quick_wins", "1-2 weeks"),
                ("rightsizing", "1 month"),
                ("reserved_instances", "2-3 months"),
            ],
            BudgetCategory::Medium => &[
                ("quick_wins", "2-3 weeks"),
                ("automation", "2 months"),
                ("governance", "3-4 months"),
            ],
            BudgetCategory::Large => &[
                ("assessment", "1 month"),
                ("pilot_implementation", "2-3 months"),
                ("full_rollout", "6-9 months"),
            ],
            BudgetCategory::Enterprise => &[
                ("strategy_development", "2 months"),
                ("pilot_programs", "3-6 months"),
                ("enterprise_rollout", "12-18 months"),
            ],
        }
    }
}

impl fmt::Display for BudgetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetCategory::Small => write!(f, "small"),
            BudgetCategory::Medium => write!(f, "medium"),
            BudgetCategory::Large => write!(f, "large"),
            BudgetCategory::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// One applied savings lever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsLever {
    pub name: String,
    pub rate: f64,
    pub monthly_savings: f64,
}

/// One rollout phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePhase {
    pub phase: String,
    pub duration: String,
}

/// Savings projection for a budget tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetOptimization {
    pub budget_category: BudgetCategory,
    pub current_monthly_cost: f64,
    pub projected_monthly_savings: f64,

    /// Savings as a percentage of current spend, 0 when spend is 0
    pub cost_reduction_percentage: f64,

    /// `projected_monthly_savings * 12`
    pub annual_savings: f64,

    pub levers: Vec<SavingsLever>,
    pub recommendations: Vec<String>,
    pub implementation_timeline: Vec<TimelinePhase>,
}

/// Project savings for `current_monthly_cost` under the tier of `monthly_budget`.
pub fn optimize_for_budget(current_monthly_cost: f64, monthly_budget: f64) -> BudgetOptimization {
    let category = BudgetCategory::from_budget(monthly_budget);

    let levers: Vec<SavingsLever> = category
        .levers()
        .iter()
        .map(|(name, rate)| SavingsLever {
            name: (*name).to_string(),
            rate: *rate,
            monthly_savings: current_monthly_cost * rate,
        })
        .collect();
    let projected_monthly_savings: f64 = levers.iter().map(|l| l.monthly_savings).sum();

    let cost_reduction_percentage = if current_monthly_cost > 0.0 {
        projected_monthly_savings / current_monthly_cost * 100.0
    } else {
        0.0
    };

    debug!(
        %category,
        current_monthly_cost,
        projected_monthly_savings,
        "budget projection"
    );

    BudgetOptimization {
        budget_category: category,
        current_monthly_cost,
        projected_monthly_savings,
        cost_reduction_percentage: stats::round2(cost_reduction_percentage),
        annual_savings: projected_monthly_savings * 12.0,
        levers,
        recommendations: category
            .recommendations()
            .iter()
            .map(|r| (*r).to_string())
            .collect(),
        implementation_timeline: category
            .timeline()
            .iter()
            .map(|(phase, duration)| TimelinePhase {
                phase: (*phase).to_string(),
                duration: (*duration).to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_brackets() {
        assert_eq!(BudgetCategory::from_budget(250_000.0), BudgetCategory::Small);
        assert_eq!(BudgetCategory::from_budget(7_000_000.0), BudgetCategory::Enterprise);
        assert_eq!(BudgetCategory::from_budget(1_000_000.0), BudgetCategory::Medium);
        assert_eq!(BudgetCategory::from_budget(3_000_000.0), BudgetCategory::Large);
    }

    #[test]
    fn test_boundaries_go_up() {
        assert_eq!(BudgetCategory::from_budget(100_000.0), BudgetCategory::Small);
        assert_eq!(BudgetCategory::from_budget(500_000.0), BudgetCategory::Medium);
        assert_eq!(BudgetCategory::from_budget(2_000_000.0), BudgetCategory::Large);
        assert_eq!(BudgetCategory::from_budget(5_000_000.0), BudgetCategory::Enterprise);
    }

    #[test]
    fn test_unmatched_budgets_default_to_enterprise() {
        assert_eq!(BudgetCategory::from_budget(50_000.0), BudgetCategory::Enterprise);
        assert_eq!(BudgetCategory::from_budget(0.0), BudgetCategory::Enterprise);
        assert_eq!(BudgetCategory::from_budget(f64::NAN), BudgetCategory::Enterprise);
    }

    #[test]
    fn test_enterprise_projection() {
        let result = optimize_for_budget(6_500_000.0, 7_000_000.0);

        assert_eq!(result.budget_category, BudgetCategory::Enterprise);
        assert!(result.cost_reduction_percentage >= 35.0);
        assert_eq!(result.cost_reduction_percentage, 45.0);
        assert_eq!(result.annual_savings, result.projected_monthly_savings * 12.0);
        assert_eq!(result.levers.len(), 3);
        assert_eq!(result.recommendations.len(), 5);
        assert_eq!(result.implementation_timeline[0].phase, "strategy_development");
    }

    #[test]
    fn test_small_projection() {
        let result = optimize_for_budget(200_000.0, 250_000.0);

        assert_eq!(result.budget_category, BudgetCategory::Small);
        assert!((result.projected_monthly_savings - 70_000.0).abs() < 1e-6);
        assert_eq!(result.cost_reduction_percentage, 35.0);
        assert_eq!(result.implementation_timeline[2].duration, "2-3 months");
    }

    #[test]
    fn test_zero_spend() {
        let result = optimize_for_budget(0.0, 250_000.0);
        assert_eq!(result.projected_monthly_savings, 0.0);
        assert_eq!(result.cost_reduction_percentage, 0.0);
        assert_eq!(result.annual_savings, 0.0);
    }
}
