use std::collections::{
    BTreeMap,
    HashSet,
};

use itertools::Itertools;
use polars::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::ContractError;

/// One sample sheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Barcode of the array slide, e.g. `9247377093`.
    pub sentrix_id:       String,
    /// Position on the slide, e.g. `R02C01`.
    pub sentrix_position: String,
    /// Human readable name; defaults to the sample id.
    pub sample_name:      String,
    /// Group metadata columns (sample group, tissue, ...).
    #[serde(default)]
    pub metadata:         BTreeMap<String, String>,
}

impl Sample {
    pub fn new(
        sentrix_id: &str,
        sentrix_position: &str,
    ) -> Self {
        Self {
            sentrix_id:       sentrix_id.to_string(),
            sentrix_position: sentrix_position.to_string(),
            sample_name:      format!("{}_{}", sentrix_id, sentrix_position),
            metadata:         BTreeMap::new(),
        }
    }

    pub fn with_name(
        mut self,
        name: &str,
    ) -> Self {
        self.sample_name = name.to_string();
        self
    }

    pub fn with_meta(
        mut self,
        key: &str,
        value: &str,
    ) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// `<sentrix_id>_<sentrix_position>`, the key of intensity files.
    pub fn sample_id(&self) -> String {
        format!("{}_{}", self.sentrix_id, self.sentrix_position)
    }

    fn matches(
        &self,
        name: &str,
    ) -> bool {
        self.sample_name == name || self.sample_id() == name
    }
}

/// Ordered list of samples of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSheet {
    samples: Vec<Sample>,
}

impl SampleSheet {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Restricts the sheet to the named samples, keeping sheet order.
    /// Names match either the sample name or the Sentrix sample id.
    pub fn select(
        &self,
        names: &[String],
    ) -> Result<SampleSheet, ContractError> {
        let unknown = names
            .iter()
            .filter(|name| !self.samples.iter().any(|s| s.matches(name)))
            .cloned()
            .collect_vec();
        if !unknown.is_empty() {
            return Err(ContractError::UnknownSamples(unknown));
        }
        Ok(SampleSheet::new(
            self.samples
                .iter()
                .filter(|s| names.iter().any(|name| s.matches(name)))
                .cloned()
                .collect(),
        ))
    }

    /// Sample sheet metadata as a table, one row per sample.
    pub fn to_data_frame(&self) -> PolarsResult<DataFrame> {
        let meta_keys = self
            .samples
            .iter()
            .flat_map(|s| s.metadata.keys().cloned())
            .unique()
            .sorted()
            .collect_vec();

        let mut columns = vec![
            Column::new(
                "Sample_ID".into(),
                self.samples
                    .iter()
                    .map(Sample::sample_id)
                    .collect_vec(),
            ),
            Column::new(
                "Sample_Name".into(),
                self.samples
                    .iter()
                    .map(|s| s.sample_name.as_str())
                    .collect_vec(),
            ),
            Column::new(
                "Sentrix_ID".into(),
                self.samples
                    .iter()
                    .map(|s| s.sentrix_id.as_str())
                    .collect_vec(),
            ),
            Column::new(
                "Sentrix_Position".into(),
                self.samples
                    .iter()
                    .map(|s| s.sentrix_position.as_str())
                    .collect_vec(),
            ),
        ];
        let mut used = columns
            .iter()
            .map(|c| c.name().to_string())
            .collect::<HashSet<_>>();
        for key in meta_keys {
            // Sheet columns shadowing the fixed ones keep their values under a prefix.
            let mut name = key.clone();
            while used.contains(&name) {
                name = format!("meta_{}", name);
            }
            used.insert(name.clone());
            columns.push(Column::new(
                name.as_str().into(),
                self.samples
                    .iter()
                    .map(|s| s.metadata.get(&key).map(String::as_str))
                    .collect_vec(),
            ));
        }
        DataFrame::new(columns)
    }
}
