use linfa::traits::{Fit, Predict};
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::data::{Dataset, SchemaVariant, FINAL_GRADE};
use crate::error::{PipelineError, Result};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

const ALWAYS_EXCLUDED: [&str; 2] = ["student_id", FINAL_GRADE];
const DETAILED_EXCLUDED: [&str; 3] = ["course", "course_title", "semester"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitParams {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        SplitParams {
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

/// Numeric regression inputs; `names[j]` labels column `j` of `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Self {
        debug_assert_eq!(names.len(), values.ncols());
        FeatureMatrix { names, values }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.values.outer_iter().map(|row| row.to_vec()).collect()
    }
}

/// Splits a dataset into the feature matrix and the `final_grade` target.
pub fn select_features(dataset: &Dataset) -> Result<(FeatureMatrix, Array1<f64>)> {
    let detailed = dataset.schema() == SchemaVariant::Detailed;
    let excluded = |name: &str| {
        ALWAYS_EXCLUDED.contains(&name) || (detailed && DETAILED_EXCLUDED.contains(&name))
    };

    let selected: Vec<_> = dataset
        .columns()
        .iter()
        .filter(|c| !excluded(&c.name))
        .collect();
    if selected.is_empty() {
        return Err(PipelineError::EmptyFeatureSet);
    }

    let mut columns = Vec::with_capacity(selected.len());
    for column in &selected {
        let values = column
            .as_numeric()
            .ok_or_else(|| PipelineError::NonNumericFeature {
                column: column.name.clone(),
            })?;
        columns.push(values);
    }

    let target = dataset
        .numeric_column(FINAL_GRADE)
        .ok_or_else(|| PipelineError::MissingColumn(FINAL_GRADE.to_string()))?;

    let n_rows = dataset.n_rows();
    let values = Array2::from_shape_fn((n_rows, columns.len()), |(i, j)| columns[j][i]);
    let names = selected.iter().map(|c| c.name.clone()).collect();

    Ok((FeatureMatrix::new(names, values), Array1::from_vec(target.to_vec())))
}

/// Row indices assigned to each side of the split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Seeded shuffle of `0..n_rows`; the first `round(fraction * n)` rows are held out.
pub fn split_indices(n_rows: usize, params: &SplitParams) -> Result<Partition> {
    let fraction = params.test_fraction;
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(PipelineError::InvalidParameter(format!(
            "test fraction must be between 0 and 1, got {fraction}"
        )));
    }

    let n_test = ((fraction * n_rows as f64).round() as usize)
        .max(1)
        .min(n_rows);

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(params.seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(Partition {
        train,
        test: indices,
    })
}

/// Fitted coefficients in feature order plus the intercept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn coefficient_pairs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.feature_names
            .iter()
            .map(String::as_str)
            .zip(self.coefficients.iter().copied())
    }
}

/// Anything that can turn feature rows into grade predictions.
pub trait GradePredictor {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;
}

impl GradePredictor for LinearModel {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.names() != self.feature_names.as_slice() {
            return Err(PipelineError::InvalidParameter(format!(
                "model expects features [{}], got [{}]",
                self.feature_names.join(", "),
                features.names().join(", ")
            )));
        }
        let coefficients = Array1::from_vec(self.coefficients.clone());
        let predictions = features.values().dot(&coefficients) + self.intercept;
        Ok(predictions.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub model: LinearModel,
    pub partition: Partition,
    pub test_actual: Vec<f64>,
    pub test_predicted: Vec<f64>,
}

/// Partitions the rows and fits ordinary least squares on the train side.
pub fn fit(features: &FeatureMatrix, target: &Array1<f64>, params: &SplitParams) -> Result<FitResult> {
    let partition = split_indices(features.n_rows(), params)?;

    let required = features.n_features() + 1;
    if partition.train.len() < required {
        return Err(PipelineError::InsufficientData {
            train_rows: partition.train.len(),
            features: features.n_features(),
            required,
        });
    }

    let x_train = features.values().select(Axis(0), &partition.train);
    let y_train = target.select(Axis(0), &partition.train);
    let x_test = features.values().select(Axis(0), &partition.test);
    let y_test = target.select(Axis(0), &partition.test);

    let train_set = linfa::Dataset::new(x_train, y_train);
    let fitted = LinearRegression::new()
        .fit(&train_set)
        .map_err(|e| PipelineError::Fit(e.to_string()))?;
    let predicted: Array1<f64> = fitted.predict(&x_test);

    Ok(FitResult {
        model: LinearModel {
            feature_names: features.names().to_vec(),
            coefficients: fitted.params().to_vec(),
            intercept: fitted.intercept(),
        },
        partition,
        test_actual: y_test.to_vec(),
        test_predicted: predicted.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{normalize, sample_table, Column, RawTable};

    fn sample_features() -> (FeatureMatrix, Array1<f64>) {
        let dataset = normalize(&sample_table()).unwrap();
        select_features(&dataset).unwrap()
    }

    #[test]
    fn detailed_features_skip_identifiers_and_categories() {
        let (features, target) = sample_features();
        assert_eq!(
            features.names(),
            &[
                "hours_studied",
                "credit_unit",
                "continuous_assessment",
                "exam_score",
                "extra_curricular"
            ]
        );
        assert_eq!(features.n_rows(), 10);
        assert_eq!(target[0], 63.0);
    }

    #[test]
    fn identifier_and_target_only_is_an_empty_feature_set() {
        let dataset = Dataset::new(
            SchemaVariant::Basic,
            vec![
                Column::text("student_id", vec!["STU001".to_string()]),
                Column::numeric(FINAL_GRADE, vec![70.0]),
            ],
        );
        assert!(matches!(
            select_features(&dataset),
            Err(PipelineError::EmptyFeatureSet)
        ));
    }

    #[test]
    fn textual_feature_column_is_rejected() {
        let raw = RawTable::from_reader(
            "hours_studied,final_grade,extra_curricular\n5,70,Yes\n2,45,Maybe\n".as_bytes(),
        )
        .unwrap();
        let dataset = normalize(&raw).unwrap();
        match select_features(&dataset) {
            Err(PipelineError::NonNumericFeature { column }) => assert_eq!(column, "extra_curricular"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn split_sizes_follow_rounded_fraction() {
        let partition = split_indices(10, &SplitParams::default()).unwrap();
        assert_eq!(partition.test.len(), 2);
        assert_eq!(partition.train.len(), 8);

        let mut all: Vec<usize> = partition.train.iter().chain(&partition.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        let partition = split_indices(9, &SplitParams { test_fraction: 0.5, seed: 1 }).unwrap();
        assert_eq!(partition.test.len(), 5);
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        let params = SplitParams { test_fraction: 0.3, seed: 7 };
        assert_eq!(split_indices(20, &params).unwrap(), split_indices(20, &params).unwrap());
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        for fraction in [0.0, 1.0, -0.2, f64::NAN] {
            let params = SplitParams { test_fraction: fraction, seed: 42 };
            assert!(matches!(
                split_indices(10, &params),
                Err(PipelineError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn sample_fit_recovers_grade_components() {
        let (features, target) = sample_features();
        let result = fit(&features, &target, &SplitParams::default()).unwrap();

        assert_eq!(result.partition.train.len(), 8);
        assert_eq!(result.partition.test.len(), 2);

        let expected = [0.0, 0.0, 1.0, 1.0, 0.0];
        for (coef, want) in result.model.coefficients.iter().zip(expected) {
            assert!((coef - want).abs() < 1e-6, "coefficient {coef} != {want}");
        }
        assert!(
            result.model.intercept.abs() < 1e-6,
            "intercept {} != 0",
            result.model.intercept
        );
        for (actual, predicted) in result.test_actual.iter().zip(&result.test_predicted) {
            assert!((actual - predicted).abs() < 1e-6);
        }
    }

    #[test]
    fn identical_inputs_give_identical_fits() {
        let (features, target) = sample_features();
        let params = SplitParams::default();
        let first = fit(&features, &target, &params).unwrap();
        let second = fit(&features, &target, &params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn too_few_train_rows_is_insufficient_data() {
        let (features, target) = sample_features();
        let params = SplitParams { test_fraction: 0.5, seed: 42 };
        match fit(&features, &target, &params) {
            Err(PipelineError::InsufficientData { train_rows, features, required }) => {
                assert_eq!(train_rows, 5);
                assert_eq!(features, 5);
                assert_eq!(required, 6);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn linear_model_predicts_with_intercept() {
        let model = LinearModel {
            feature_names: vec!["hours_studied".to_string()],
            coefficients: vec![2.0],
            intercept: 10.0,
        };
        let features = FeatureMatrix::new(
            vec!["hours_studied".to_string()],
            Array2::from_shape_vec((2, 1), vec![1.0, 5.0]).unwrap(),
        );
        assert_eq!(model.predict(&features).unwrap(), vec![12.0, 20.0]);
    }
}
