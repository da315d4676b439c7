use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that terminate a single pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The uploaded columns match neither accepted schema.
    #[error(
        "The uploaded file must contain either basic columns ({basic}) or detailed columns ({detailed})"
    )]
    Schema { basic: String, detailed: String },

    /// A column that must be numeric holds a value that does not parse.
    #[error("Column `{column}` must be numeric, found {value:?} in row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Required column `{0}` is missing")]
    MissingColumn(String),

    #[error("No feature columns remain after excluding identifier, categorical and target columns")]
    EmptyFeatureSet,

    #[error("Feature column `{column}` contains non-numeric values")]
    NonNumericFeature { column: String },

    #[error(
        "Not enough training rows: {train_rows} available, at least {required} needed for {features} features"
    )]
    InsufficientData {
        train_rows: usize,
        features: usize,
        required: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Model fitting failed: {0}")]
    Fit(String),

    #[error("Remote prediction failed: {0}")]
    Remote(String),
}
