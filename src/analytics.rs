use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::{Dataset, SchemaVariant, EXTRA_CURRICULAR, FINAL_GRADE};
use crate::model::{FitResult, LinearModel};

pub const ERROR_HISTOGRAM_BINS: usize = 15;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FeatureImportance {
    pub feature: String,
    pub coefficient: f64,
    pub impact: f64,
}

/// Coefficients in feature order.
pub fn feature_importance(model: &LinearModel) -> Vec<FeatureImportance> {
    model
        .coefficient_pairs()
        .map(|(feature, coefficient)| FeatureImportance {
            feature: feature.to_string(),
            coefficient,
            impact: coefficient.abs(),
        })
        .collect()
}

/// Same entries ordered by absolute impact, largest first.
pub fn feature_impact(model: &LinearModel) -> Vec<FeatureImportance> {
    let mut ranked = feature_importance(model);
    ranked.sort_by(|a, b| b.impact.partial_cmp(&a.impact).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

pub fn correlation_matrix(dataset: &Dataset) -> CorrelationMatrix {
    let numeric: Vec<(&str, &[f64])> = dataset
        .columns()
        .iter()
        .filter_map(|c| c.as_numeric().map(|values| (c.name.as_str(), values)))
        .collect();

    let values: Vec<Vec<Option<f64>>> = numeric
        .iter()
        .map(|(_, x)| numeric.iter().map(|(_, y)| pearson(x, y)).collect())
        .collect();

    CorrelationMatrix {
        labels: numeric.iter().map(|(name, _)| name.to_string()).collect(),
        values,
    }
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n == 0 || n != y.len() {
        return None;
    }
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x * var_y).sqrt())
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub group: Option<f64>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width bins spanning the data; a constant input gets a unit-wide range.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + width * i as f64,
            end: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BoxSummary {
    pub group: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

fn box_summary(group: String, mut values: Vec<f64>) -> BoxSummary {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    BoxSummary {
        group,
        count: values.len(),
        min: values[0],
        q1: quantile(&values, 0.25),
        median: quantile(&values, 0.5),
        q3: quantile(&values, 0.75),
        max: values[values.len() - 1],
    }
}

/// Final-grade distribution per extra-curricular value.
pub fn grade_by_activity(dataset: &Dataset) -> Vec<BoxSummary> {
    let (Some(flags), Some(grades)) = (
        dataset.numeric_column(EXTRA_CURRICULAR),
        dataset.numeric_column(FINAL_GRADE),
    ) else {
        return Vec::new();
    };

    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (flag, grade) in flags.iter().zip(grades) {
        groups.entry(flag.to_string()).or_default().push(*grade);
    }
    groups
        .into_iter()
        .map(|(group, values)| box_summary(group, values))
        .collect()
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GroupSummary {
    pub group: String,
    pub students: usize,
    pub avg_hours_studied: f64,
    pub avg_ca_score: f64,
    pub avg_exam_score: f64,
    pub avg_final_grade: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-group averages for detailed uploads, groups in key order.
pub fn group_summary(dataset: &Dataset, by: &str) -> Option<Vec<GroupSummary>> {
    if dataset.schema() != SchemaVariant::Detailed {
        return None;
    }
    let key = dataset.column(by)?;

    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for row in 0..dataset.n_rows() {
        groups.entry(key.text_at(row).unwrap_or_default()).or_default().push(row);
    }

    let mean = |rows: &[usize], pick: fn(&crate::data::StudentRecord) -> Option<f64>| {
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|&row| pick(&dataset.record(row)))
            .collect();
        if values.is_empty() {
            f64::NAN
        } else {
            round2(values.iter().sum::<f64>() / values.len() as f64)
        }
    };

    Some(
        groups
            .into_iter()
            .map(|(group, rows)| GroupSummary {
                students: rows.len(),
                avg_hours_studied: mean(&rows, |r| r.hours_studied),
                avg_ca_score: mean(&rows, |r| r.continuous_assessment),
                avg_exam_score: mean(&rows, |r| r.exam_score),
                avg_final_grade: mean(&rows, |r| Some(r.final_grade)),
                group,
            })
            .collect(),
    )
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChartData {
    pub actual_vs_predicted: Vec<ScatterPoint>,
    /// `[min, max]` of the actual test grades.
    pub identity_line: Option<[f64; 2]>,
    pub error_histogram: Vec<HistogramBin>,
    pub hours_vs_grade: Vec<ScatterPoint>,
    pub grade_by_activity: Vec<BoxSummary>,
    pub correlation: CorrelationMatrix,
}

pub fn chart_data(dataset: &Dataset, fit: &FitResult) -> ChartData {
    let actual_vs_predicted = fit
        .test_actual
        .iter()
        .zip(&fit.test_predicted)
        .map(|(&x, &y)| ScatterPoint { x, y, group: None })
        .collect();

    let identity_line = if fit.test_actual.is_empty() {
        None
    } else {
        let lo = fit.test_actual.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = fit.test_actual.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some([lo, hi])
    };

    let errors: Vec<f64> = fit
        .test_actual
        .iter()
        .zip(&fit.test_predicted)
        .map(|(a, p)| a - p)
        .collect();

    let hours_vs_grade = match (
        dataset.numeric_column("hours_studied"),
        dataset.numeric_column(FINAL_GRADE),
    ) {
        (Some(hours), Some(grades)) => {
            let flags = dataset.numeric_column(EXTRA_CURRICULAR);
            hours
                .iter()
                .zip(grades)
                .enumerate()
                .map(|(row, (&x, &y))| ScatterPoint {
                    x,
                    y,
                    group: flags.map(|f| f[row]),
                })
                .collect()
        }
        _ => Vec::new(),
    };

    ChartData {
        actual_vs_predicted,
        identity_line,
        error_histogram: histogram(&errors, ERROR_HISTOGRAM_BINS),
        hours_vs_grade,
        grade_by_activity: grade_by_activity(dataset),
        correlation: correlation_matrix(dataset),
    }
}
