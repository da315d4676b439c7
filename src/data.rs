use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

pub const DETAILED_COLUMNS: [&str; 8] = [
    "student_id",
    "hours_studied",
    "course",
    "course_title",
    "credit_unit",
    "continuous_assessment",
    "exam_score",
    "semester",
];

pub const BASIC_COLUMNS: [&str; 3] = ["hours_studied", "final_grade", "extra_curricular"];

pub const FINAL_GRADE: &str = "final_grade";
pub const EXTRA_CURRICULAR: &str = "extra_curricular";

/// Uploaded table before any interpretation: a header and rows of text cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().trim(Trim::Fields).from_reader(reader);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();

        for result in rdr.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(RawTable { headers, rows })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(file)
    }

    fn column_cells(&self, index: usize) -> Vec<String> {
        self.rows.iter().map(|row| row[index].clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    Basic,
    Detailed,
}

impl SchemaVariant {
    /// Resolves the schema from a set of column names, detailed first.
    pub fn detect<'a, I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: HashSet<&str> = columns.into_iter().collect();

        if DETAILED_COLUMNS.iter().all(|c| present.contains(c)) {
            Ok(SchemaVariant::Detailed)
        } else if BASIC_COLUMNS.iter().all(|c| present.contains(c)) {
            Ok(SchemaVariant::Basic)
        } else {
            Err(PipelineError::Schema {
                basic: BASIC_COLUMNS.join(", "),
                detailed: DETAILED_COLUMNS.join(", "),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ColumnValues {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Column {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Column {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }

    /// Numeric when every cell parses as a finite number, text otherwise.
    pub fn from_cells(name: impl Into<String>, cells: Vec<String>) -> Self {
        let parsed: Option<Vec<f64>> = cells.iter().map(|cell| parse_number(cell)).collect();
        match parsed {
            Some(values) => Column::numeric(name, values),
            None => Column::text(name, cells),
        }
    }

    pub fn len(&self) -> usize {
        match &self.values {
            ColumnValues::Numeric(values) => values.len(),
            ColumnValues::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match &self.values {
            ColumnValues::Numeric(values) => Some(values),
            ColumnValues::Text(_) => None,
        }
    }

    pub fn number_at(&self, row: usize) -> Option<f64> {
        match &self.values {
            ColumnValues::Numeric(values) => values.get(row).copied(),
            ColumnValues::Text(values) => values.get(row).and_then(|cell| parse_number(cell)),
        }
    }

    pub fn text_at(&self, row: usize) -> Option<String> {
        match &self.values {
            ColumnValues::Numeric(values) => values.get(row).map(|v| v.to_string()),
            ColumnValues::Text(values) => values.get(row).cloned(),
        }
    }

    /// Numeric view, or the first offending cell as an error.
    fn require_numeric(&self) -> Result<&[f64]> {
        match &self.values {
            ColumnValues::Numeric(values) => Ok(values),
            ColumnValues::Text(values) => {
                let (row, value) = values
                    .iter()
                    .enumerate()
                    .find(|(_, cell)| parse_number(cell).is_none())
                    .map(|(row, cell)| (row, cell.clone()))
                    .unwrap_or_default();
                Err(PipelineError::NonNumeric {
                    column: self.name.clone(),
                    row,
                    value,
                })
            }
        }
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One row with every normalized column, as persisted by the store.
pub type RowDocument = serde_json::Map<String, Value>;

/// One student row, typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub hours_studied: Option<f64>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub credit_unit: Option<f64>,
    #[serde(default)]
    pub continuous_assessment: Option<f64>,
    #[serde(default)]
    pub exam_score: Option<f64>,
    #[serde(default)]
    pub semester: Option<String>,
    #[serde(default)]
    pub extra_curricular: Option<f64>,
    pub final_grade: f64,
}

/// Column-oriented student table with a single resolved schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    schema: SchemaVariant,
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new(schema: SchemaVariant, columns: Vec<Column>) -> Self {
        Dataset { schema, columns }
    }

    pub fn schema(&self) -> SchemaVariant {
        self.schema
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn numeric_column(&self, name: &str) -> Option<&[f64]> {
        self.column(name).and_then(Column::as_numeric)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    fn text_at(&self, name: &str, row: usize) -> Option<String> {
        self.column(name).and_then(|c| c.text_at(row))
    }

    fn number_at(&self, name: &str, row: usize) -> Option<f64> {
        self.column(name).and_then(|c| c.number_at(row))
    }

    pub fn record(&self, row: usize) -> StudentRecord {
        StudentRecord {
            student_id: self.text_at("student_id", row),
            hours_studied: self.number_at("hours_studied", row),
            course: self.text_at("course", row),
            course_title: self.text_at("course_title", row),
            credit_unit: self.number_at("credit_unit", row),
            continuous_assessment: self.number_at("continuous_assessment", row),
            exam_score: self.number_at("exam_score", row),
            semester: self.text_at("semester", row),
            extra_curricular: self.number_at(EXTRA_CURRICULAR, row),
            final_grade: self.number_at(FINAL_GRADE, row).unwrap_or(f64::NAN),
        }
    }

    pub fn records(&self) -> Vec<StudentRecord> {
        (0..self.n_rows()).map(|row| self.record(row)).collect()
    }

    /// Every column of one row, keyed by column name. Numeric columns stay numbers.
    pub fn row_document(&self, row: usize) -> RowDocument {
        self.columns
            .iter()
            .map(|column| {
                let value = match &column.values {
                    ColumnValues::Numeric(values) => values
                        .get(row)
                        .copied()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number),
                    ColumnValues::Text(values) => values.get(row).cloned().map(Value::String),
                };
                (column.name.clone(), value.unwrap_or(Value::Null))
            })
            .collect()
    }

    /// The value of `name` in `row` as text, for columns stored outside the document.
    pub fn cell_text(&self, name: &str, row: usize) -> Option<String> {
        self.text_at(name, row)
    }

    /// Writes the dataset back out as CSV with the same column order.
    pub fn to_csv(&self) -> Result<String> {
        let mut bytes = Vec::new();
        {
            let mut wtr = Writer::from_writer(&mut bytes);
            wtr.write_record(self.column_names())?;

            for row in 0..self.n_rows() {
                let cells: Vec<String> = self
                    .columns
                    .iter()
                    .map(|c| c.text_at(row).unwrap_or_default())
                    .collect();
                wtr.write_record(&cells)?;
            }
            wtr.flush().map_err(csv::Error::from)?;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Resolves the schema, derives `final_grade` and maps the Yes/No flag.
pub fn normalize(table: &RawTable) -> Result<Dataset> {
    let schema = SchemaVariant::detect(table.headers.iter().map(String::as_str))?;

    let mut columns: Vec<Column> = table
        .headers
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let cells = table.column_cells(index);
            if name == EXTRA_CURRICULAR {
                Column::from_cells(name.clone(), map_yes_no(cells))
            } else {
                Column::from_cells(name.clone(), cells)
            }
        })
        .collect();

    let has_final_grade = columns.iter().any(|c| c.name == FINAL_GRADE);
    if schema == SchemaVariant::Detailed && !has_final_grade {
        let final_grade = derive_final_grade(&columns)?;
        columns.push(Column::numeric(FINAL_GRADE, final_grade));
    }

    let dataset = Dataset::new(schema, columns);
    dataset
        .column(FINAL_GRADE)
        .ok_or_else(|| PipelineError::MissingColumn(FINAL_GRADE.to_string()))?
        .require_numeric()?;

    Ok(dataset)
}

fn derive_final_grade(columns: &[Column]) -> Result<Vec<f64>> {
    let find = |name: &str| {
        columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    };
    let ca = find("continuous_assessment")?.require_numeric()?;
    let exam = find("exam_score")?.require_numeric()?;

    Ok(ca.iter().zip(exam).map(|(ca, exam)| ca + exam).collect())
}

/// "Yes"/"No" become 1/0; anything else is passed through untouched.
fn map_yes_no(cells: Vec<String>) -> Vec<String> {
    cells
        .into_iter()
        .map(|cell| match cell.as_str() {
            "Yes" => "1".to_string(),
            "No" => "0".to_string(),
            _ => cell,
        })
        .collect()
}

/// Built-in detailed dataset shown before anything is uploaded.
pub fn sample_table() -> RawTable {
    let headers = [
        "student_id",
        "hours_studied",
        "course",
        "course_title",
        "credit_unit",
        "continuous_assessment",
        "exam_score",
        "semester",
        "extra_curricular",
    ];
    let rows = [
        ["STU001", "2", "CS101", "Introduction to Programming", "3", "21", "42", "FIRST", "Yes"],
        ["STU002", "5", "CS102", "Data Structures", "4", "27", "56", "FIRST", "No"],
        ["STU003", "3", "CS101", "Introduction to Programming", "3", "18", "49", "SECOND", "Yes"],
        ["STU004", "7", "CS103", "Database Systems", "3", "28", "63", "FIRST", "Yes"],
        ["STU005", "4", "CS102", "Data Structures", "4", "24", "52", "SECOND", "No"],
        ["STU006", "6", "CS101", "Introduction to Programming", "3", "26", "58", "FIRST", "Yes"],
        ["STU007", "8", "CS103", "Database Systems", "3", "29", "65", "SECOND", "Yes"],
        ["STU008", "3", "CS102", "Data Structures", "4", "20", "44", "FIRST", "No"],
        ["STU009", "5", "CS101", "Introduction to Programming", "3", "25", "53", "SECOND", "Yes"],
        ["STU010", "4", "CS103", "Database Systems", "3", "22", "48", "FIRST", "No"],
    ];

    RawTable {
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect(),
    }
}
