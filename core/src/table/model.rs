use crate::prelude::{ScreenError, ScreenResult};
use serde::Serialize;
use std::collections::BTreeMap;

pub const TITLE_KEY: &str = "Title";

/// Named, ordered list of string values such as `Distance = ["10", "[cm]"]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    name: String,
    values: Vec<String>,
}

impl Property {
    /// Builds a property, dropping empty values.
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|value| {
                let value: String = value.into();
                value.trim().to_string()
            })
            .filter(|v| !v.is_empty())
            .collect();
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// Numeric values, skipping bracketed unit annotations.
    pub fn numbers(&self) -> Option<Vec<f64>> {
        self.values
            .iter()
            .filter(|v| !is_annotation(v))
            .map(|v| v.parse::<f64>().ok())
            .collect()
    }

    /// Unit annotation, e.g. `cm` for `["10", "[cm]"]`.
    pub fn unit(&self) -> Option<&str> {
        self.values
            .iter()
            .find(|v| is_annotation(v))
            .map(|v| v[1..v.len() - 1].trim())
    }
}

fn is_annotation(value: &str) -> bool {
    value.len() >= 2 && value.starts_with('[') && value.ends_with(']')
}

/// Variable samples; `None` marks a missing numeric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Samples {
    Numeric(Vec<Option<f64>>),
    Text(Vec<String>),
}

impl Samples {
    /// Numeric when every non-blank cell parses as a number, textual otherwise.
    /// Textual samples keep their cells verbatim, surrounding whitespace included.
    pub fn from_cells(cells: Vec<String>) -> Self {
        let numeric: Option<Vec<Option<f64>>> = cells
            .iter()
            .map(|cell| {
                let cell = cell.trim();
                if cell.is_empty() {
                    Some(None)
                } else {
                    cell.parse::<f64>().ok().map(Some)
                }
            })
            .collect();
        match numeric {
            Some(values) => Samples::Numeric(values),
            None => Samples::Text(cells),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::Numeric(values) => values.len(),
            Samples::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell text for row `index`; missing values render as an empty cell.
    pub fn cell(&self, index: usize) -> String {
        match self {
            Samples::Numeric(values) => match values.get(index).copied().flatten() {
                Some(value) => value.to_string(),
                None => String::new(),
            },
            Samples::Text(values) => values.get(index).cloned().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    name: String,
    unit: String,
    samples: Samples,
}

impl Variable {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, samples: Samples) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            samples,
        }
    }

    pub fn numeric(name: impl Into<String>, unit: impl Into<String>, values: &[f64]) -> Self {
        Self::new(
            name,
            unit,
            Samples::Numeric(values.iter().copied().map(Some).collect()),
        )
    }

    /// Splits a header cell `Name [Unit]` into name and unit.
    pub fn parse_header(cell: &str) -> (String, String) {
        let cell = cell.trim();
        if let Some(open) = cell.rfind('[') {
            if cell.ends_with(']') && open < cell.len() - 1 {
                let name = cell[..open].trim().to_string();
                let unit = cell[open + 1..cell.len() - 1].trim().to_string();
                if !name.is_empty() {
                    return (name, unit);
                }
            }
        }
        (cell.to_string(), String::new())
    }

    pub fn header_label(&self) -> String {
        if self.unit.is_empty() {
            self.name.clone()
        } else {
            format!("{} [{}]", self.name, self.unit)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.samples {
            Samples::Numeric(values) => Some(values),
            Samples::Text(_) => None,
        }
    }

    /// Numeric samples with no gaps, as required by spectral analysis.
    pub fn dense(&self) -> ScreenResult<Vec<f64>> {
        let values = self.as_numeric().ok_or_else(|| {
            ScreenError::DataConsistency(format!("variable '{}' is not numeric", self.name))
        })?;
        values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                value.ok_or_else(|| {
                    ScreenError::DataConsistency(format!(
                        "variable '{}' has no value at sample {}",
                        self.name, index
                    ))
                })
            })
            .collect()
    }
}

/// One sensor's properties and index-aligned variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    id: String,
    properties: BTreeMap<String, Property>,
    variables: Vec<Variable>,
}

impl Dataset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
            variables: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Inserts or overwrites a property of the same name.
    pub fn set_property(&mut self, property: Property) {
        self.properties.insert(property.name.clone(), property);
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.set_property(property);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Property> {
        &self.properties
    }

    /// Adds a variable; every variable must share the dataset's row count.
    pub fn add_variable(&mut self, variable: Variable) -> ScreenResult<()> {
        if self.variable(variable.name()).is_some() {
            return Err(ScreenError::DataConsistency(format!(
                "dataset '{}' already has a variable named '{}'",
                self.id,
                variable.name()
            )));
        }
        if let Some(existing) = self.variables.first() {
            if existing.len() != variable.len() {
                return Err(ScreenError::DataConsistency(format!(
                    "dataset '{}': variable '{}' has {} samples but '{}' has {}",
                    self.id,
                    variable.name(),
                    variable.len(),
                    existing.name(),
                    existing.len()
                )));
            }
        }
        self.variables.push(variable);
        Ok(())
    }

    pub fn with_variable(mut self, variable: Variable) -> ScreenResult<Self> {
        self.add_variable(variable)?;
        Ok(self)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name() == name)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn row_count(&self) -> usize {
        self.variables.first().map(Variable::len).unwrap_or(0)
    }
}

/// Global properties and an ordered list of datasets; read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    globals: BTreeMap<String, Property>,
    datasets: Vec<Dataset>,
}

impl Table {
    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    pub fn title(&self) -> Option<&str> {
        self.global(TITLE_KEY).and_then(Property::first)
    }

    pub fn global(&self, name: &str) -> Option<&Property> {
        self.globals.get(name)
    }

    /// First value of a global property.
    pub fn global_value(&self, name: &str) -> Option<&str> {
        self.global(name).and_then(Property::first)
    }

    pub fn globals(&self) -> &BTreeMap<String, Property> {
        &self.globals
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn dataset(&self, id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.id() == id)
    }
}

#[derive(Debug, Default)]
pub struct TableBuilder {
    globals: BTreeMap<String, Property>,
    datasets: Vec<Dataset>,
}

impl TableBuilder {
    pub fn title(self, title: &str) -> Self {
        self.global(Property::new(TITLE_KEY, [title]))
    }

    /// Inserts or overwrites a global property.
    pub fn global(mut self, property: Property) -> Self {
        self.globals.insert(property.name().to_string(), property);
        self
    }

    pub fn dataset(mut self, dataset: Dataset) -> Self {
        self.datasets.push(dataset);
        self
    }

    pub fn build(self) -> ScreenResult<Table> {
        for (index, dataset) in self.datasets.iter().enumerate() {
            if self.datasets[..index].iter().any(|d| d.id() == dataset.id()) {
                return Err(ScreenError::DataConsistency(format!(
                    "duplicate dataset identifier '{}'",
                    dataset.id()
                )));
            }
        }
        Ok(Table {
            globals: self.globals,
            datasets: self.datasets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_drops_empty_values_and_finds_unit() {
        let prop = Property::new("Distance", ["10", "[cm]", "", " "]);
        assert_eq!(prop.values(), &["10".to_string(), "[cm]".to_string()]);
        assert_eq!(prop.unit(), Some("cm"));
        assert_eq!(prop.numbers(), Some(vec![10.0]));
    }

    #[test]
    fn header_cell_splits_name_and_unit() {
        assert_eq!(
            Variable::parse_header("Bx [nT]"),
            ("Bx".to_string(), "nT".to_string())
        );
        assert_eq!(
            Variable::parse_header("time offset [s]"),
            ("time offset".to_string(), "s".to_string())
        );
        assert_eq!(Variable::parse_header("Label"), ("Label".to_string(), String::new()));
    }

    #[test]
    fn cells_coerce_to_numeric_with_missing_sentinel() {
        let samples = Samples::from_cells(vec!["1.5".into(), "".into(), "-2".into()]);
        assert_eq!(samples, Samples::Numeric(vec![Some(1.5), None, Some(-2.0)]));
        let text = Samples::from_cells(vec!["1.5".into(), "n/a".into()]);
        assert!(matches!(text, Samples::Text(_)));
    }

    #[test]
    fn dataset_rejects_unequal_lengths() {
        let mut dataset = Dataset::new("0");
        dataset
            .add_variable(Variable::numeric("Bx", "nT", &[1.0, 2.0]))
            .unwrap();
        let err = dataset
            .add_variable(Variable::numeric("By", "nT", &[1.0]))
            .unwrap_err();
        assert!(matches!(err, ScreenError::DataConsistency(_)));
        assert_eq!(dataset.row_count(), 2);
    }

    #[test]
    fn repeated_property_overwrites() {
        let dataset = Dataset::new("0")
            .with_property(Property::new("Sensor", ["A"]))
            .with_property(Property::new("Sensor", ["B"]));
        assert_eq!(dataset.property("Sensor").and_then(Property::first), Some("B"));
    }

    #[test]
    fn dense_reports_missing_index() {
        let variable = Variable::new("Bz", "nT", Samples::Numeric(vec![Some(1.0), None]));
        let err = variable.dense().unwrap_err();
        assert!(err.to_string().contains("sample 1"));
    }

    #[test]
    fn builder_rejects_duplicate_dataset_ids() {
        let result = Table::builder()
            .title("Run")
            .dataset(Dataset::new("0"))
            .dataset(Dataset::new("0"))
            .build();
        assert!(result.is_err());
    }
}
