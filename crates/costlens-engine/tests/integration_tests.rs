//! Integration tests for costlens-engine across components.

use chrono::{DateTime, Duration, TimeZone, Utc};
use costlens_engine::{
    BudgetCategory, ComputeInstance, CostAnomalyDetector, CostForecaster, CostRecord,
    EngineConfig, EngineError, ForecastConfig, InstanceCatalog, OptimizerConfig,
    RecommendationType, ResourceInventory, ResourceOptimizer, ResourceUtilization, Severity,
    StoragePricing, StorageResource,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::{NamedTempFile, tempdir};

const SPIKE_DAYS: [usize; 3] = [20, 40, 55];

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

/// One record per day with a mild weekly cycle and cost spikes on [`SPIKE_DAYS`].
fn billing_with_spikes(days: usize) -> Vec<CostRecord> {
    (0..days)
        .map(|i| {
            let base = 1000.0 + ((i * 13) % 7) as f64 * 15.0;
            let cost = if SPIKE_DAYS.contains(&i) { 20_000.0 } else { base };
            CostRecord::new(start() + Duration::days(i as i64), "aws", "ec2", "i-0a1b2c3d", cost)
        })
        .collect()
}

/// Several records per day across providers with trend and weekly seasonality.
fn daily_billing(days: usize) -> Vec<CostRecord> {
    let mut records = Vec::new();
    for i in 0..days {
        let ts = start() + Duration::days(i as i64);
        let weekly = if i % 7 >= 5 { -150.0 } else { 50.0 };
        let total = 1200.0 + 4.0 * i as f64 + weekly;
        records.push(CostRecord::new(ts, "aws", "ec2", "i-0a1b2c3d", total * 0.6));
        records.push(CostRecord::new(ts, "azure", "vm", "vm-web-01", total * 0.4));
    }
    records
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_spikes_flagged_and_detect_is_idempotent() {
    costlens_core::logging::init_test_logging();
    let records = billing_with_spikes(60);

    let mut detector = CostAnomalyDetector::default();
    detector.train(&records).unwrap();

    let first = detector.detect(&records).unwrap();
    let second = detector.detect(&records).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), records.len());

    for day in SPIKE_DAYS {
        let result = &first[day];
        assert!(result.is_anomaly, "spike on day {} not flagged", day);
        assert!(result.anomaly_score < 0.0);
        assert!(result.severity >= Severity::Low);
    }
    for result in &first {
        assert_eq!(result.is_anomaly, result.anomaly_score < 0.0);
        assert_eq!(result.is_anomaly, result.severity != Severity::Normal);
    }

    let summary = CostAnomalyDetector::summarize(&first);
    assert_eq!(summary.total_records, 60);
    assert!(summary.anomalies_detected >= SPIKE_DAYS.len());
    let counted: usize = summary.severity_breakdown.values().sum();
    assert_eq!(counted, summary.anomalies_detected);
}

#[test]
fn test_detection_uses_training_schema() {
    let records = billing_with_spikes(60);
    let mut detector = CostAnomalyDetector::default();
    let model = detector.train(&records).unwrap();

    // Later data carries usage hours, but the fitted columns stay fixed
    let later: Vec<CostRecord> = records
        .iter()
        .map(|r| r.clone().with_usage_hours(24.0))
        .collect();
    let results = detector.detect(&later).unwrap();
    assert_eq!(results.len(), later.len());
    assert_eq!(detector.model().unwrap().schema(), model.schema());
}

#[test]
fn test_concurrent_detection_on_shared_snapshot() {
    let records = billing_with_spikes(60);
    let mut detector = CostAnomalyDetector::default();
    let model = detector.train(&records).unwrap();
    let expected = model.detect(&records).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let model = Arc::clone(&model);
            let records = &records;
            let expected = &expected;
            scope.spawn(move || {
                let results = model.detect(records).unwrap();
                assert_eq!(&results, expected);
            });
        }
    });

    // Retraining swaps the snapshot; the old one keeps answering
    detector.train(&daily_billing(30)).unwrap();
    assert_eq!(model.detect(&records).unwrap(), expected);
}

#[test]
fn test_alerts_for_spikes() {
    let records = billing_with_spikes(60);
    let mut detector = CostAnomalyDetector::default();
    detector.train(&records).unwrap();
    let results = detector.detect(&records).unwrap();

    let alerts = CostAnomalyDetector::alert(&results, &Default::default());
    let json = serde_json::to_value(&alerts).unwrap();
    for alert in json.as_array().unwrap() {
        assert!(alert.get("type").is_some());
        assert!(alert.get("recommended_action").is_some());
    }
}

#[test]
fn test_forecaster_lifecycle() {
    let mut forecaster = CostForecaster::default();
    assert!(matches!(
        forecaster.predict(7).unwrap_err(),
        EngineError::NotTrained { .. }
    ));

    let err = forecaster.train(&daily_billing(5)).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientHistory {
            available: 5,
            required: 14
        }
    ));
    assert!(err.is_precondition());

    let records = daily_billing(90);
    forecaster.train(&records).unwrap();

    let points = forecaster.predict(14).unwrap();
    assert_eq!(points.len(), 14);
    let last_day = (start() + Duration::days(89)).date_naive();
    assert_eq!(points[0].date, last_day + Duration::days(1));
    for (i, point) in points.iter().enumerate() {
        assert!(point.confidence_lower >= 0.0);
        assert!(point.confidence_lower <= point.predicted_cost);
        assert!(point.predicted_cost <= point.confidence_upper);
        if i > 0 {
            assert_eq!(point.date, points[i - 1].date + Duration::days(1));
        }
    }

    let fitted = forecaster.fitted_history().unwrap();
    assert_eq!(fitted.len(), 90);

    let analysis = forecaster.trend_analysis().unwrap();
    assert_eq!(analysis.trend_direction.to_string(), "increasing");
    let accuracy = analysis.model_accuracy.unwrap();
    assert!((0.0..=1.0).contains(&accuracy));
}

#[test]
fn test_forecaster_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("forecast.json");

    let untrained = CostForecaster::default();
    assert!(matches!(
        untrained.save_model(&path).unwrap_err(),
        EngineError::NotTrained { .. }
    ));

    let mut forecaster = CostForecaster::new(ForecastConfig::default().with_interval_width(0.9));
    forecaster.train(&daily_billing(60)).unwrap();
    forecaster.save_model(&path).unwrap();
    assert!(path.exists());

    let mut restored = CostForecaster::default();
    let model = restored.load_model(&path).unwrap();
    assert_eq!(model.config().interval_width, 0.9);
    assert_eq!(model.history().len(), 60);

    let expected = forecaster.predict(10).unwrap();
    let actual = restored.predict(10).unwrap();
    assert_eq!(expected.len(), actual.len());
    for (e, a) in expected.iter().zip(&actual) {
        assert_eq!(e.date, a.date);
        assert!((e.predicted_cost - a.predicted_cost).abs() < 1e-6);
        assert!((e.confidence_lower - a.confidence_lower).abs() < 1e-6);
        assert!((e.confidence_upper - a.confidence_upper).abs() < 1e-6);
    }
}

#[test]
fn test_saved_model_file_is_complete() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("forecast.json");

    let mut forecaster = CostForecaster::default();
    forecaster.train(&daily_billing(45)).unwrap();
    forecaster.save_model(&path).unwrap();

    // Readable straight away, without going through the forecaster
    let raw = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(json.get("config").is_some());
    assert_eq!(json["history"].as_array().unwrap().len(), 45);
}

#[test]
fn test_forecaster_rejects_malformed_costs() {
    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let mut records = daily_billing(30);
        records[10].cost = bad;
        records[10].resource_id = "vm-broken".to_string();

        let mut forecaster = CostForecaster::default();
        let err = forecaster.train(&records).unwrap_err();
        assert!(
            matches!(&err, EngineError::InvalidRecord { resource_id, .. } if resource_id == "vm-broken"),
            "cost {} gave {:?}",
            bad,
            err
        );
        assert!(!err.is_precondition());
        assert!(matches!(
            forecaster.predict(1).unwrap_err(),
            EngineError::NotTrained { .. }
        ));
    }
}

#[test]
fn test_forecast_horizon_limit() {
    let mut forecaster = CostForecaster::default();
    forecaster.train(&daily_billing(30)).unwrap();

    assert_eq!(forecaster.predict(365).unwrap().len(), 365);
    let err = forecaster.predict(u32::MAX).unwrap_err();
    assert!(matches!(err, EngineError::HorizonTooLong { max: 3650, .. }));
    assert!(err.friendly_message().contains("3650"));
}

#[test]
fn test_load_missing_model() {
    let dir = tempdir().unwrap();
    let mut forecaster = CostForecaster::default();

    let err = forecaster.load_model(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, EngineError::ModelNotFound(_)));
    assert!(!forecaster.is_trained());
}

#[test]
fn test_budget_scenarios() {
    let optimizer = ResourceOptimizer::default();

    let small = optimizer.optimize_for_budget(200_000.0, 250_000.0);
    assert_eq!(small.budget_category, BudgetCategory::Small);

    let enterprise = optimizer.optimize_for_budget(6_000_000.0, 7_000_000.0);
    assert_eq!(enterprise.budget_category, BudgetCategory::Enterprise);
    assert!(enterprise.cost_reduction_percentage >= 35.0);
    assert_eq!(enterprise.annual_savings, enterprise.projected_monthly_savings * 12.0);
}

#[test]
fn test_rightsizing_and_storage_scenarios() {
    let optimizer = ResourceOptimizer::default();

    let idle = ComputeInstance::new("i-idle", "aws", "m5.4xlarge", 25.0, 30.0, 560.16);
    let busy = ComputeInstance::new("i-busy", "aws", "m5.4xlarge", 75.0, 80.0, 560.16);
    let recs = optimizer.rightsizing_recommendations(&[idle.clone()]);
    assert_eq!(recs.len(), 1);
    assert!(recs[0].monthly_savings > 0.0);

    // A busy instance either gets no recommendation or a less confident one
    let busy_recs = optimizer.rightsizing_recommendations(&[busy]);
    if let Some(busy_rec) = busy_recs.first() {
        assert!(recs[0].confidence > busy_rec.confidence);
    }

    let cold = StorageResource::new("bucket-cold", "aws", "standard", 45, 245.80, 10_691.0);
    let warm = StorageResource::new("bucket-warm", "aws", "standard", 15, 245.80, 10_691.0);
    let storage = optimizer.storage_recommendations(&[cold, warm]);
    assert_eq!(storage.len(), 1);
    assert_eq!(storage[0].resource_id, "bucket-cold");
    assert_eq!(storage[0].recommendation_type, RecommendationType::StorageOptimization);
}

#[test]
fn test_catalog_files_replace_builtin_tables() {
    let catalog = write_temp(
        r#"
aws:
  - { name: c.small, cpu: 2, memory_gb: 4, monthly_cost: 50.0 }
  - { name: c.medium, cpu: 8, memory_gb: 32, monthly_cost: 280.0 }
  - { name: c.large, cpu: 16, memory_gb: 64, monthly_cost: 560.16 }
"#,
    );
    let pricing = write_temp(
        r#"
aws:
  - { class: hot, max_days: 10, price_per_gb: 0.02 }
  - { class: glacier, price_per_gb: 0.001 }
"#,
    );

    let optimizer = ResourceOptimizer::new(OptimizerConfig::default())
        .with_catalog(InstanceCatalog::from_yaml_file(catalog.path()).unwrap())
        .with_storage_pricing(StoragePricing::from_yaml_file(pricing.path()).unwrap());

    let recs = optimizer.rightsizing_recommendations(&[ComputeInstance::new(
        "i-1", "aws", "c.large", 25.0, 30.0, 560.16,
    )]);
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].projected_cost, 280.0);

    // Built-in type names no longer resolve
    assert!(optimizer
        .rightsizing_recommendations(&[ComputeInstance::new(
            "i-2", "aws", "m5.4xlarge", 25.0, 30.0, 560.16,
        )])
        .is_empty());

    let storage = optimizer.storage_recommendations(&[StorageResource::new(
        "bucket", "aws", "hot", 30, 200.0, 10_000.0,
    )]);
    assert_eq!(storage.len(), 1);
    assert_eq!(storage[0].projected_cost, 10.0);
}

#[test]
fn test_engine_config_from_file() {
    let catalog = write_temp("aws:\n  - { name: only, cpu: 4, memory_gb: 16, monthly_cost: 100.0 }\n");
    let config_file = write_temp(&format!(
        "anomaly:\n  contamination: 0.05\noptimizer:\n  max_clusters: 2\ninstance_catalog: {}\n",
        catalog.path().display()
    ));

    let config = EngineConfig::from_yaml_file(config_file.path()).unwrap();
    assert_eq!(config.anomaly.contamination, 0.05);
    assert_eq!(config.detector().config().contamination, 0.05);
    assert_eq!(config.forecaster().config().interval_width, 0.8);

    let optimizer = config.optimizer().unwrap();
    assert_eq!(optimizer.config().max_clusters, 2);
    assert!(optimizer
        .rightsizing_recommendations(&[ComputeInstance::new(
            "i-1", "aws", "m5.4xlarge", 25.0, 30.0, 560.16,
        )])
        .is_empty());
}

#[test]
fn test_report_skips_malformed_entries() {
    let inventory = ResourceInventory {
        instances: vec![
            ComputeInstance::new("i-nan-cpu", "aws", "m5.4xlarge", f64::NAN, 30.0, 560.16),
            ComputeInstance::new("i-idle", "aws", "m5.4xlarge", 25.0, 30.0, 560.16),
            ComputeInstance::new("i-neg-cost", "aws", "m5.4xlarge", 25.0, 30.0, -10.0),
        ],
        storage: vec![
            StorageResource::new("bucket-nan", "aws", "standard", 45, f64::NAN, 10_691.0),
            StorageResource::new("bucket-cold", "aws", "standard", 45, 245.80, 10_691.0),
            StorageResource::new("bucket-neg", "aws", "standard", 45, 245.80, -1.0),
        ],
        utilization: Vec::new(),
    };

    let report = ResourceOptimizer::default().generate_report(&inventory);

    assert_eq!(report.rightsizing_count, 1);
    assert_eq!(report.storage_count, 1);
    let ids: Vec<&str> = report.recommendations.iter().map(|r| r.resource_id.as_str()).collect();
    assert!(ids.contains(&"i-idle"));
    assert!(ids.contains(&"bucket-cold"));
    assert!(report.recommendations.iter().all(|r| r.monthly_savings.is_finite()));
    assert!(report.total_potential_savings.is_finite());
    assert!(report.total_potential_savings > 0.0);
}

#[test]
fn test_report_over_inventory() {
    let mut utilization: Vec<ResourceUtilization> = (0..5)
        .map(|i| {
            ResourceUtilization::new(format!("web-{}", i), 55.0 + i as f64, 60.0)
                .with_io(120.0, 40.0)
                .with_monthly_cost(300.0)
        })
        .collect();
    utilization.extend((0..5).map(|i| {
        ResourceUtilization::new(format!("batch-{}", i), 8.0 + i as f64, 12.0)
            .with_io(5.0, 2.0)
            .with_monthly_cost(450.0)
    }));

    let inventory = ResourceInventory {
        instances: vec![ComputeInstance::new("i-idle", "aws", "m5.4xlarge", 25.0, 30.0, 560.16)],
        storage: vec![StorageResource::new("bucket-cold", "aws", "standard", 45, 245.80, 10_691.0)],
        utilization,
    };

    let optimizer = ResourceOptimizer::new(OptimizerConfig::default().with_max_clusters(2));
    let report = optimizer.generate_report(&inventory);

    assert_eq!(report.rightsizing_count, 1);
    assert_eq!(report.storage_count, 1);
    assert_eq!(report.reserved_instance_count, 5);
    assert_eq!(report.recommendations.len(), 7);
    assert!(report
        .recommendations
        .windows(2)
        .all(|w| w[0].monthly_savings >= w[1].monthly_savings));

    let total: f64 = report.recommendations.iter().map(|r| r.monthly_savings).sum();
    assert!((report.total_potential_savings - total).abs() < 0.01);

    assert!(!report.utilization.used_fallback);
    assert_eq!(report.utilization.recommendations.len(), 5);
    assert!(report
        .utilization
        .recommendations
        .iter()
        .all(|r| r.resource_id.starts_with("batch-")));

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"recommendation_type\":\"reserved_instance\""));
}
