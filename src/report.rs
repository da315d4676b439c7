use std::fmt::Write;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::pipeline::PipelineRun;

const LOG_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const FILE_TIMESTAMP: &str = "%Y%m%d_%H%M%S";
const MODEL_TYPE: &str = "Linear Regression";

/// Summary lines shown above the full log on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct LogHeader {
    pub generated: String,
    pub user: String,
    pub model: &'static str,
    pub dataset_size: usize,
    pub test_set_size: usize,
    pub r2: Option<f64>,
    pub mse: f64,
}

impl LogHeader {
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Generated: {}", self.generated),
            format!("User: {}", self.user),
            format!("Model: {}", self.model),
            format!("Dataset Size: {} records", self.dataset_size),
            format!("Test Set Size: {} records", self.test_set_size),
            format!(
                "Model Performance: R² = {}, MSE = {:.4}",
                fixed(self.r2, 4),
                self.mse
            ),
        ]
    }
}

pub fn log_header(run: &PipelineRun, username: &str, timestamp: NaiveDateTime) -> LogHeader {
    LogHeader {
        generated: timestamp.format(LOG_TIMESTAMP).to_string(),
        user: username.to_string(),
        model: MODEL_TYPE,
        dataset_size: run.dataset.n_rows(),
        test_set_size: run.fit.partition.test.len(),
        r2: run.evaluation.metrics.r2,
        mse: run.evaluation.metrics.mse,
    }
}

pub fn log_file_name(timestamp: NaiveDateTime) -> String {
    format!("prediction_log_{}.txt", timestamp.format(FILE_TIMESTAMP))
}

fn fixed(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "nan".to_string(),
    }
}

/// Renders the downloadable prediction log.
pub fn render_log(run: &PipelineRun, username: &str, timestamp: NaiveDateTime) -> String {
    let ts = timestamp.format(LOG_TIMESTAMP).to_string();
    let metrics = &run.evaluation.metrics;
    let rule = "=".repeat(60);
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "STUDENT PERFORMANCE PREDICTION SYSTEM - LOG FILE");
    let _ = writeln!(out, "================================================");
    let _ = writeln!(out, "Timestamp: {ts}");
    let _ = writeln!(out, "User: {username}");
    let _ = writeln!(out, "Model Type: {MODEL_TYPE}");
    let _ = writeln!(out, "Dataset: {}", run.source.label());
    let _ = writeln!(out);
    let _ = writeln!(out, "MODEL CONFIGURATION:");
    let _ = writeln!(out, "- Test Size: {}", run.params.test_fraction);
    let _ = writeln!(out, "- Random State: {}", run.params.seed);
    let _ = writeln!(out, "- Features Used: {}", run.fit.model.feature_names.join(", "));
    let _ = writeln!(out, "- Training Samples: {}", run.fit.partition.train.len());
    let _ = writeln!(out, "- Testing Samples: {}", run.fit.partition.test.len());
    let _ = writeln!(out);
    let _ = writeln!(out, "MODEL PERFORMANCE:");
    let _ = writeln!(out, "- R-squared Score: {}", fixed(metrics.r2, 4));
    let _ = writeln!(out, "- Mean Squared Error: {:.4}", metrics.mse);
    let _ = writeln!(out, "- Model Accuracy: {}%", fixed(metrics.r2.map(|r2| r2 * 100.0), 2));
    let _ = writeln!(out);
    let _ = writeln!(out, "FEATURE IMPORTANCE:");
    for (feature, coef) in run.fit.model.coefficient_pairs() {
        let _ = writeln!(out, "- {feature}: {coef:.4}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "PREDICTION RESULTS:");
    let _ = writeln!(out, "{rule}");
    for prediction in &run.evaluation.predictions {
        let status = if prediction.passes() { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "Student {}: Actual={:.2}, Predicted={:.2}, Status={status}",
            prediction.student, prediction.actual, prediction.predicted
        );
    }

    let _ = writeln!(out);
    let _ = write!(out, "{rule}");
    let _ = writeln!(out);
    let _ = writeln!(out, "End of Log - {ts}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample_table;
    use crate::model::SplitParams;
    use crate::pipeline::{self, DataSource};
    use chrono::NaiveDate;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap()
    }

    #[test]
    fn log_file_name_uses_compact_timestamp() {
        assert_eq!(log_file_name(timestamp()), "prediction_log_20240305_140709.txt");
    }

    #[test]
    fn log_lists_configuration_and_every_test_row() {
        let run = pipeline::run(&sample_table(), DataSource::Sample, SplitParams::default()).unwrap();
        let log = render_log(&run, "avery", timestamp());

        assert!(log.starts_with("\nSTUDENT PERFORMANCE PREDICTION SYSTEM - LOG FILE\n"));
        assert!(log.contains("\nTimestamp: 2024-03-05 14:07:09\n"));
        assert!(log.contains("\nUser: avery\n"));
        assert!(log.contains("\nDataset: Sample Data\n"));
        assert!(log.contains("\n- Test Size: 0.2\n- Random State: 42\n"));
        assert!(log.contains(
            "\n- Features Used: hours_studied, credit_unit, continuous_assessment, exam_score, extra_curricular\n"
        ));
        assert!(log.contains("\n- Training Samples: 8\n- Testing Samples: 2\n"));
        assert!(log.contains("\n- continuous_assessment: 1.0000\n"));
        assert!(log.ends_with(&format!("\n\n{}\nEnd of Log - 2024-03-05 14:07:09\n", "=".repeat(60))));

        let result_lines: Vec<&str> = log.lines().filter(|l| l.starts_with("Student ")).collect();
        assert_eq!(result_lines.len(), 2);
        for line in result_lines {
            assert!(line.starts_with("Student STU0"));
            assert!(line.ends_with("Status=PASS"));
        }
    }

    #[test]
    fn header_reports_metrics_to_four_places() {
        let run = pipeline::run(&sample_table(), DataSource::Sample, SplitParams::default()).unwrap();
        let header = log_header(&run, "avery", timestamp());
        let lines = header.lines();
        assert_eq!(lines[0], "Generated: 2024-03-05 14:07:09");
        assert_eq!(lines[3], "Dataset Size: 10 records");
        assert_eq!(lines[4], "Test Set Size: 2 records");
    }

    #[test]
    fn undefined_r2_prints_nan() {
        assert_eq!(fixed(None, 4), "nan");
        assert_eq!(fixed(Some(0.98765), 4), "0.9877");
    }
}
