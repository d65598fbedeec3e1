//! Utilization clustering.
//!
//! Resources are grouped by standardized CPU, memory, network and disk
//! figures with k-means (k-means++ seeding, best of several restarts). Each
//! cluster is classified by its mean CPU and given an optimization potential.
//! When no utilization metric is present at all, a per-resource rule takes
//! over: CPU under 30% with memory under 40% is a rightsizing candidate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::OptimizerConfig;
use crate::anomaly::StandardScaler;
use crate::error::{EngineError, Result};
use crate::models::ResourceUtilization;
use crate::stats;

/// Utilization value assumed for missing CPU or memory in the rule fallback.
const FALLBACK_UTILIZATION: f64 = 50.0;

/// Savings share assigned by the rule fallback.
const FALLBACK_POTENTIAL: f64 = 0.4;

/// Confidence of cluster-derived recommendations.
const CLUSTER_CONFIDENCE: f64 = 0.8;

/// K-means fit on a row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    centroids: Vec<Vec<f64>>,
    labels: Vec<usize>,
    inertia: f64,
}

impl KMeans {
    /// Fit `k` clusters, keeping the lowest-inertia run of `n_init` restarts.
    pub fn fit(data: &[Vec<f64>], k: usize, n_init: usize, max_iter: usize, seed: u64) -> Result<Self> {
        if data.is_empty() || k == 0 {
            return Err(EngineError::computation("k-means needs data and at least one cluster"));
        }
        let dim = data[0].len();
        if dim == 0 || data.iter().any(|row| row.len() != dim) {
            return Err(EngineError::computation("ragged or empty k-means input"));
        }

        let k = k.min(data.len());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut best: Option<KMeans> = None;

        for _ in 0..n_init.max(1) {
            let run = Self::lloyd(data, seed_centroids(data, k, &mut rng), max_iter);
            if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        best.ok_or_else(|| EngineError::computation("k-means produced no run"))
    }

    fn lloyd(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize) -> Self {
        let k = centroids.len();
        let mut labels = vec![usize::MAX; data.len()];

        for _ in 0..max_iter.max(1) {
            let mut changed = false;
            for (i, point) in data.iter().enumerate() {
                let nearest = nearest(point, &centroids).0;
                if labels[i] != nearest {
                    labels[i] = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let dim = data[0].len();
            let mut sums = vec![vec![0.0; dim]; k];
            let mut counts = vec![0usize; k];
            for (point, &label) in data.iter().zip(&labels) {
                counts[label] += 1;
                for (s, v) in sums[label].iter_mut().zip(point) {
                    *s += v;
                }
            }

            for c in 0..k {
                if counts[c] > 0 {
                    centroids[c] = sums[c].iter().map(|s| s / counts[c] as f64).collect();
                } else {
                    // Re-seed an empty cluster at the point worst served by its centroid
                    let (far, _) = data
                        .iter()
                        .enumerate()
                        .map(|(i, p)| (i, squared_distance(p, &centroids[labels[i]])))
                        .fold((0, f64::NEG_INFINITY), |acc, x| if x.1 > acc.1 { x } else { acc });
                    centroids[c] = data[far].clone();
                    labels[far] = c;
                }
            }
        }

        let inertia = data
            .iter()
            .zip(&labels)
            .map(|(p, &l)| squared_distance(p, &centroids[l]))
            .sum();

        Self {
            centroids,
            labels,
            inertia,
        }
    }

    /// Cluster index per input row.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }

    /// Sum of squared distances to assigned centroids.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .fold((0, f64::INFINITY), |acc, x| if x.1 < acc.1 { x } else { acc })
}

/// k-means++ seeding.
fn seed_centroids(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![data[rng.random_range(0..data.len())].clone()];

    while centroids.len() < k {
        let weights: Vec<f64> = data.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();

        let pick = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            weights
                .iter()
                .position(|&w| {
                    target -= w;
                    target <= 0.0
                })
                .unwrap_or(data.len() - 1)
        } else {
            rng.random_range(0..data.len())
        };
        centroids.push(data[pick].clone());
    }
    centroids
}

/// Utilization class of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    Underutilized,
    Optimal,
    Overutilized,
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterType::Underutilized => write!(f, "underutilized"),
            ClusterType::Optimal => write!(f, "optimal"),
            ClusterType::Overutilized => write!(f, "overutilized"),
        }
    }
}

/// What a cluster could gain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizationPotential {
    Rightsizing { potential_savings: f64 },
    ScalingUp { performance_improvement: f64 },
    ReservedInstance { potential_savings: f64 },
}

impl OptimizationPotential {
    /// Savings share, zero for scale-up.
    pub fn savings_share(&self) -> f64 {
        match self {
            OptimizationPotential::Rightsizing { potential_savings }
            | OptimizationPotential::ReservedInstance { potential_savings } => *potential_savings,
            OptimizationPotential::ScalingUp { .. } => 0.0,
        }
    }
}

/// Per-cluster statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub cluster_type: ClusterType,
    pub size: usize,
    pub avg_cpu: f64,
    pub avg_memory: f64,
    pub avg_cost: f64,
    pub optimization_potential: OptimizationPotential,
}

/// Cluster membership of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub resource_id: String,
    pub cluster_id: usize,
}

/// Per-resource rightsizing hint from the utilization analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationRecommendation {
    pub resource_id: String,

    /// Savings share of current spend
    pub potential_savings: f64,

    /// Cluster mean CPU, for cluster-derived hints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_utilization: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<usize>,

    /// Rule text, for fallback hints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of [`analyze_utilization`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UtilizationAnalysis {
    pub clusters: Vec<ClusterSummary>,
    pub assignments: Vec<ClusterAssignment>,
    pub recommendations: Vec<UtilizationRecommendation>,

    /// True when clustering was not possible and the per-resource rule ran
    pub used_fallback: bool,
}

type Metric = fn(&ResourceUtilization) -> Option<f64>;

fn cpu(r: &ResourceUtilization) -> Option<f64> {
    r.cpu_utilization
}

fn memory(r: &ResourceUtilization) -> Option<f64> {
    r.memory_utilization
}

fn network(r: &ResourceUtilization) -> Option<f64> {
    r.network_io
}

fn disk(r: &ResourceUtilization) -> Option<f64> {
    r.disk_io
}

fn cost(r: &ResourceUtilization) -> Option<f64> {
    r.monthly_cost
}

const METRICS: [(&str, Metric); 4] = [
    ("cpu_utilization", cpu),
    ("memory_utilization", memory),
    ("network_io", network),
    ("disk_io", disk),
];

/// Cluster resources and derive per-cluster and per-resource hints.
///
/// Clustering failures degrade to the per-resource rule and never fail the call.
pub fn analyze_utilization(
    resources: &[ResourceUtilization],
    config: &OptimizerConfig,
) -> UtilizationAnalysis {
    if resources.is_empty() {
        return UtilizationAnalysis::default();
    }

    match cluster_analysis(resources, config) {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!(error = %e, resources = resources.len(), "clustering failed, using rule fallback");
            fallback_analysis(resources, config)
        }
    }
}

fn cluster_analysis(
    resources: &[ResourceUtilization],
    config: &OptimizerConfig,
) -> Result<UtilizationAnalysis> {
    let available: Vec<(&str, Metric)> = METRICS
        .iter()
        .copied()
        .filter(|(_, metric)| resources.iter().any(|r| metric(r).is_some()))
        .collect();
    if available.is_empty() {
        return Err(EngineError::computation("no utilization metrics found"));
    }

    let matrix: Vec<Vec<f64>> = resources
        .iter()
        .map(|r| available.iter().map(|(_, m)| m(r).unwrap_or(0.0)).collect())
        .collect();
    if matrix.iter().flatten().any(|v| !v.is_finite()) {
        return Err(EngineError::computation("utilization metrics contain non-finite values"));
    }

    let scaled = StandardScaler::fit(&matrix)?.transform(&matrix)?;
    let k = config.max_clusters.min(resources.len());
    let kmeans = KMeans::fit(&scaled, k, config.kmeans_restarts, config.kmeans_max_iter, config.seed)?;

    let names: Vec<&str> = available.iter().map(|(n, _)| *n).collect();
    debug!(
        metrics = %names.join(", "),
        k,
        inertia = kmeans.inertia(),
        "utilization clustering complete"
    );

    let mut cluster_ids: Vec<usize> = kmeans.labels().to_vec();
    cluster_ids.sort_unstable();
    cluster_ids.dedup();

    let clusters: Vec<ClusterSummary> = cluster_ids
        .iter()
        .map(|&id| {
            let members: Vec<&ResourceUtilization> = resources
                .iter()
                .zip(kmeans.labels())
                .filter(|(_, l)| **l == id)
                .map(|(r, _)| r)
                .collect();
            summarize_cluster(id, &members, config)
        })
        .collect();

    let assignments = resources
        .iter()
        .zip(kmeans.labels())
        .map(|(r, &cluster_id)| ClusterAssignment {
            resource_id: r.resource_id.clone(),
            cluster_id,
        })
        .collect();

    let recommendations = resources
        .iter()
        .zip(kmeans.labels())
        .filter_map(|(r, &label)| {
            let cluster = clusters.iter().find(|c| c.cluster_id == label)?;
            (cluster.cluster_type == ClusterType::Underutilized).then(|| UtilizationRecommendation {
                resource_id: r.resource_id.clone(),
                potential_savings: cluster.optimization_potential.savings_share(),
                current_utilization: Some(cluster.avg_cpu),
                confidence: Some(CLUSTER_CONFIDENCE),
                cluster: Some(label),
                reason: None,
            })
        })
        .collect();

    Ok(UtilizationAnalysis {
        clusters,
        assignments,
        recommendations,
        used_fallback: false,
    })
}

fn mean_of(members: &[&ResourceUtilization], metric: Metric) -> f64 {
    let values: Vec<f64> = members.iter().filter_map(|r| metric(r)).collect();
    stats::mean(&values)
}

fn summarize_cluster(
    cluster_id: usize,
    members: &[&ResourceUtilization],
    config: &OptimizerConfig,
) -> ClusterSummary {
    let avg_cpu = mean_of(members, cpu);

    let cluster_type = if avg_cpu < config.cpu_underutilized {
        ClusterType::Underutilized
    } else if avg_cpu > config.cpu_overutilized {
        ClusterType::Overutilized
    } else {
        ClusterType::Optimal
    };

    let optimization_potential = match cluster_type {
        ClusterType::Underutilized => {
            let potential_savings = if avg_cpu < 20.0 {
                0.70
            } else if avg_cpu < 30.0 {
                0.50
            } else {
                0.25
            };
            OptimizationPotential::Rightsizing { potential_savings }
        }
        ClusterType::Overutilized => OptimizationPotential::ScalingUp {
            performance_improvement: 0.30,
        },
        ClusterType::Optimal => OptimizationPotential::ReservedInstance {
            potential_savings: config.reserved_instance_savings,
        },
    };

    ClusterSummary {
        cluster_id,
        cluster_type,
        size: members.len(),
        avg_cpu,
        avg_memory: mean_of(members, memory),
        avg_cost: mean_of(members, cost),
        optimization_potential,
    }
}

fn fallback_analysis(
    resources: &[ResourceUtilization],
    config: &OptimizerConfig,
) -> UtilizationAnalysis {
    let recommendations = resources
        .iter()
        .filter(|r| {
            r.cpu_utilization.unwrap_or(FALLBACK_UTILIZATION) < config.cpu_underutilized
                && r.memory_utilization.unwrap_or(FALLBACK_UTILIZATION) < config.memory_underutilized
        })
        .map(|r| UtilizationRecommendation {
            resource_id: r.resource_id.clone(),
            potential_savings: FALLBACK_POTENTIAL,
            current_utilization: None,
            confidence: None,
            cluster: None,
            reason: Some("Low CPU and memory utilization".to_string()),
        })
        .collect();

    UtilizationAnalysis {
        clusters: Vec::new(),
        assignments: Vec::new(),
        recommendations,
        used_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet() -> Vec<ResourceUtilization> {
        let mut resources = Vec::new();
        for i in 0..6 {
            resources.push(
                ResourceUtilization::new(format!("idle-{}", i), 8.0 + i as f64, 15.0)
                    .with_monthly_cost(400.0),
            );
        }
        for i in 0..6 {
            resources.push(ResourceUtilization::new(format!("busy-{}", i), 90.0 + i as f64, 85.0));
        }
        for i in 0..6 {
            resources.push(ResourceUtilization::new(format!("steady-{}", i), 55.0 + i as f64, 60.0));
        }
        resources
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let data: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![i as f64 * 0.01, 0.0])
            .chain((0..10).map(|i| vec![100.0 + i as f64 * 0.01, 100.0]))
            .collect();
        let km = KMeans::fit(&data, 2, 10, 300, 42).unwrap();

        let labels = km.labels();
        assert!(labels[..10].iter().all(|&l| l == labels[0]));
        assert!(labels[10..].iter().all(|&l| l == labels[10]));
        assert_ne!(labels[0], labels[10]);
        assert!(km.inertia() < 1.0);
        assert_eq!(km.centroids().len(), 2);
    }

    #[test]
    fn test_kmeans_is_seeded() {
        let data: Vec<Vec<f64>> = (0..30).map(|i| vec![(i * 7 % 13) as f64, (i % 5) as f64]).collect();
        let a = KMeans::fit(&data, 4, 10, 300, 42).unwrap();
        let b = KMeans::fit(&data, 4, 10, 300, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_k_capped_by_records() {
        let resources = vec![
            ResourceUtilization::new("a", 10.0, 10.0),
            ResourceUtilization::new("b", 90.0, 90.0),
        ];
        let analysis = analyze_utilization(&resources, &OptimizerConfig::default());
        assert!(!analysis.used_fallback);
        assert_eq!(analysis.clusters.len(), 2);
        assert_eq!(analysis.assignments.len(), 2);
    }

    #[test]
    fn test_cluster_classification() {
        let analysis = analyze_utilization(&fleet(), &OptimizerConfig::default().with_max_clusters(3));
        assert_eq!(analysis.clusters.len(), 3);

        let kinds: Vec<ClusterType> = analysis.clusters.iter().map(|c| c.cluster_type).collect();
        assert!(kinds.contains(&ClusterType::Underutilized));
        assert!(kinds.contains(&ClusterType::Overutilized));
        assert!(kinds.contains(&ClusterType::Optimal));

        let idle = analysis
            .clusters
            .iter()
            .find(|c| c.cluster_type == ClusterType::Underutilized)
            .unwrap();
        assert_eq!(idle.size, 6);
        assert_eq!(idle.avg_cost, 400.0);
        assert_eq!(
            idle.optimization_potential,
            OptimizationPotential::Rightsizing {
                potential_savings: 0.70
            }
        );

        assert_eq!(analysis.recommendations.len(), 6);
        assert!(analysis.recommendations.iter().all(|r| r.resource_id.starts_with("idle-")));
        assert!(analysis.recommendations.iter().all(|r| r.confidence == Some(0.8)));
    }

    #[test]
    fn test_fallback_without_metrics() {
        let mut bare = ResourceUtilization::new("bare", 0.0, 0.0);
        bare.cpu_utilization = None;
        bare.memory_utilization = None;

        let analysis = analyze_utilization(&[bare], &OptimizerConfig::default());
        assert!(analysis.used_fallback);
        assert!(analysis.clusters.is_empty());
        // missing metrics count as 50%, so no candidate
        assert!(analysis.recommendations.is_empty());
    }

    #[test]
    fn test_fallback_on_non_finite_metrics() {
        let resources = vec![
            ResourceUtilization::new("nan", f64::NAN, 10.0),
            ResourceUtilization::new("low", 10.0, 20.0),
        ];
        let analysis = analyze_utilization(&resources, &OptimizerConfig::default());
        assert!(analysis.used_fallback);
        assert_eq!(analysis.recommendations.len(), 1);
        assert_eq!(analysis.recommendations[0].resource_id, "low");
        assert_eq!(analysis.recommendations[0].potential_savings, 0.4);
    }

    #[test]
    fn test_empty_input() {
        let analysis = analyze_utilization(&[], &OptimizerConfig::default());
        assert_eq!(analysis, UtilizationAnalysis::default());
    }
}
