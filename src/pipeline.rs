use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::analytics::{self, ChartData, FeatureImportance, GroupSummary};
use crate::data::{normalize, Dataset, RawTable, SchemaVariant};
use crate::error::Result;
use crate::evaluation::{evaluate, Evaluation, Metrics, StudentPrediction};
use crate::model::{self, FitResult, LinearModel, SplitParams};
use crate::report::{self, LogHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Uploaded,
    Sample,
}

impl DataSource {
    pub fn label(&self) -> &'static str {
        match self {
            DataSource::Uploaded => "Uploaded File",
            DataSource::Sample => "Sample Data",
        }
    }
}

/// Everything produced by one normalize → select → fit → evaluate pass.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub source: DataSource,
    pub params: SplitParams,
    pub dataset: Dataset,
    pub fit: FitResult,
    pub evaluation: Evaluation,
}

pub fn run(table: &RawTable, source: DataSource, params: SplitParams) -> Result<PipelineRun> {
    let dataset = normalize(table)?;
    debug!(
        schema = ?dataset.schema(),
        rows = dataset.n_rows(),
        "normalized upload"
    );

    let (features, target) = model::select_features(&dataset)?;
    let fit = model::fit(&features, &target, &params)?;
    let evaluation = evaluate(&dataset, &fit);

    info!(
        source = source.label(),
        features = features.n_features(),
        train = fit.partition.train.len(),
        test = fit.partition.test.len(),
        mse = evaluation.metrics.mse,
        r2 = ?evaluation.metrics.r2,
        "pipeline run complete"
    );

    Ok(PipelineRun {
        source,
        params,
        dataset,
        fit,
        evaluation,
    })
}

/// Runs a CSV file from disk as an upload and renders its prediction log.
pub fn log_for_file(
    path: &Path,
    params: SplitParams,
    username: &str,
    timestamp: NaiveDateTime,
) -> Result<String> {
    let table = RawTable::from_path(path)?;
    let run = run(&table, DataSource::Uploaded, params)?;
    Ok(run.log(username, timestamp))
}

/// Dashboard payload returned to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub schema: SchemaVariant,
    pub source: &'static str,
    pub params: SplitParams,
    pub columns: Vec<String>,
    pub rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: Metrics,
    pub model: LinearModel,
    pub importance: Vec<FeatureImportance>,
    pub impact: Vec<FeatureImportance>,
    pub predictions: Vec<StudentPrediction>,
    pub charts: ChartData,
    pub course_summary: Option<Vec<GroupSummary>>,
    pub semester_summary: Option<Vec<GroupSummary>>,
    pub log_header: LogHeader,
    pub log: String,
    pub log_file_name: String,
}

impl PipelineRun {
    pub fn log(&self, username: &str, timestamp: NaiveDateTime) -> String {
        report::render_log(self, username, timestamp)
    }

    pub fn dashboard(&self, username: &str, timestamp: NaiveDateTime) -> Dashboard {
        Dashboard {
            schema: self.dataset.schema(),
            source: self.source.label(),
            params: self.params,
            columns: self
                .dataset
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            rows: self.dataset.n_rows(),
            train_rows: self.fit.partition.train.len(),
            test_rows: self.fit.partition.test.len(),
            metrics: self.evaluation.metrics,
            model: self.fit.model.clone(),
            importance: analytics::feature_importance(&self.fit.model),
            impact: analytics::feature_impact(&self.fit.model),
            predictions: self.evaluation.predictions.clone(),
            charts: analytics::chart_data(&self.dataset, &self.fit),
            course_summary: analytics::group_summary(&self.dataset, "course"),
            semester_summary: analytics::group_summary(&self.dataset, "semester"),
            log_header: report::log_header(self, username, timestamp),
            log: self.log(username, timestamp),
            log_file_name: report::log_file_name(timestamp),
        }
    }
}
