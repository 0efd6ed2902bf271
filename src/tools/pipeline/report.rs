use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use itertools::Itertools;
use polars::prelude::*;

use crate::data_structs::container::{
    SampleDataContainer,
    SampleWarning,
};
use crate::data_structs::control::ControlTable;
use crate::data_structs::probe_table::{
    ProbeIndex,
    ProbeTable,
};
use crate::data_structs::sample_sheet::{
    Sample,
    SampleSheet,
};
use crate::data_structs::typedef::MaybeValue;
use crate::data_structs::Stage;
use crate::errors::{
    ContractError,
    ProcessingError,
};

/// File stem of the consolidated matrix of a stage.
pub fn matrix_name(stage: Stage) -> &'static str {
    match stage {
        Stage::RawMethylated => "meth_values",
        Stage::RawUnmethylated => "unmeth_values",
        Stage::NoobMethylated => "noob_meth_values",
        Stage::NoobUnmethylated => "noob_unmeth_values",
        Stage::Beta => "beta_values",
        Stage::MValue => "m_values",
    }
}

/// Probe × sample matrix of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageMatrix {
    stage:   Stage,
    index:   Arc<ProbeIndex>,
    samples: Vec<String>,
    columns: Vec<Vec<MaybeValue>>,
}

impl StageMatrix {
    pub fn new(
        stage: Stage,
        index: Arc<ProbeIndex>,
    ) -> Self {
        Self {
            stage,
            index,
            samples: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Appends the column of one sample. The table must be aligned to the
    /// run probe index.
    pub fn push(
        &mut self,
        sample_id: &str,
        table: &ProbeTable,
    ) -> Result<(), ContractError> {
        table.check_aligned(&self.index, self.stage)?;
        self.samples.push(sample_id.to_string());
        self.columns.push(table.values().to_vec());
        Ok(())
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn index(&self) -> &Arc<ProbeIndex> {
        &self.index
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn column(
        &self,
        sample_id: &str,
    ) -> Option<&[MaybeValue]> {
        self.samples
            .iter()
            .position(|s| s == sample_id)
            .map(|pos| self.columns[pos].as_slice())
    }

    pub fn get(
        &self,
        probe_id: &str,
        sample_id: &str,
    ) -> Option<MaybeValue> {
        let row = self.index.position(probe_id)?;
        self.column(sample_id).map(|col| col[row])
    }

    /// `IlmnID` followed by one column per sample.
    pub fn to_data_frame(&self) -> PolarsResult<DataFrame> {
        let columns = std::iter::once(self.index.to_column("IlmnID"))
            .chain(
                self.samples
                    .iter()
                    .zip(self.columns.iter())
                    .map(|(name, values)| Column::new(name.as_str().into(), values)),
            )
            .collect_vec();
        DataFrame::new(columns)
    }
}

/// Consolidated outputs of a run, in sample-sheet order.
#[derive(Debug, Clone, Default)]
pub struct RunMatrices {
    stages:   BTreeMap<Stage, StageMatrix>,
    controls: Vec<(String, ControlTable)>,
    samples:  Vec<Sample>,
}

impl RunMatrices {
    /// Appends every derived table and the control table of `container`.
    pub fn add_sample(
        &mut self,
        container: &SampleDataContainer,
    ) -> Result<(), ContractError> {
        let sample_id = container.sample_id();
        for stage in [
            Stage::RawMethylated,
            Stage::RawUnmethylated,
            Stage::NoobMethylated,
            Stage::NoobUnmethylated,
            Stage::Beta,
            Stage::MValue,
        ] {
            if let Some(table) = container.table(stage) {
                self.stages
                    .entry(stage)
                    .or_insert_with(|| StageMatrix::new(stage, container.probe_index().clone()))
                    .push(sample_id, table)?;
            }
        }
        if let Some(controls) = container.controls() {
            self.controls
                .push((sample_id.to_string(), controls.clone()));
        }
        self.samples.push(container.sample().clone());
        Ok(())
    }

    pub fn matrix(
        &self,
        stage: Stage,
    ) -> Option<&StageMatrix> {
        self.stages.get(&stage)
    }

    pub fn matrices(&self) -> impl Iterator<Item = (&Stage, &StageMatrix)> {
        self.stages.iter()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn controls(&self) -> &[(String, ControlTable)] {
        &self.controls
    }

    /// Control probes of every sample stacked, with a leading `Sample_ID`.
    pub fn control_data_frame(&self) -> PolarsResult<Option<DataFrame>> {
        let mut stacked: Option<DataFrame> = None;
        for (sample_id, table) in &self.controls {
            let mut df = table.to_data_frame()?;
            let ids = vec![sample_id.as_str(); df.height()];
            df.insert_column(0, Column::new("Sample_ID".into(), ids))?;
            match stacked.as_mut() {
                Some(acc) => {
                    acc.vstack_mut(&df)?;
                },
                None => stacked = Some(df),
            }
        }
        Ok(stacked)
    }

    /// Sample sheet metadata of the processed samples.
    pub fn sample_sheet(&self) -> SampleSheet {
        SampleSheet::new(self.samples.clone())
    }
}

/// A sample skipped because of a sample-scoped error.
#[derive(Debug)]
pub struct SampleFailure {
    pub sample: Sample,
    pub error:  ProcessingError,
}

/// Outcome of a pipeline run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Finished containers; only kept when the run is not batched.
    pub containers: Vec<SampleDataContainer>,
    pub failures:   Vec<SampleFailure>,
    /// Warnings of every processed sample, keyed by sample id.
    pub warnings:   Vec<(String, Vec<SampleWarning>)>,
    pub matrices:   RunMatrices,
}

impl RunReport {
    pub fn n_processed(&self) -> usize {
        self.matrices.n_samples()
    }

    pub fn n_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn container(
        &self,
        sample_id: &str,
    ) -> Option<&SampleDataContainer> {
        self.containers
            .iter()
            .find(|c| c.sample_id() == sample_id)
    }

    pub fn warned_samples(&self) -> impl Iterator<Item = &str> {
        self.warnings
            .iter()
            .filter(|(_, w)| !w.is_empty())
            .map(|(id, _)| id.as_str())
    }
}

impl Display for RunReport {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(
            f,
            "{} samples processed, {} failed",
            self.n_processed(),
            self.n_failed()
        )?;
        for failure in &self.failures {
            writeln!(
                f,
                "  FAILED {}: {}",
                failure.sample.sample_id(),
                failure.error
            )?;
        }
        for (sample_id, warnings) in &self.warnings {
            for warning in warnings {
                writeln!(f, "  WARNING {}: {}", sample_id, warning)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structs::typedef::ProbeId;

    fn index(ids: &[&str]) -> Arc<ProbeIndex> {
        Arc::new(ProbeIndex::try_new(ids.iter().map(|s| ProbeId::from(*s)).collect()).unwrap())
    }

    #[test]
    fn test_stage_matrix_columns() {
        let idx = index(&["cg1", "cg2"]);
        let mut matrix = StageMatrix::new(Stage::Beta, idx.clone());
        matrix
            .push("s1", &ProbeTable::try_new(idx.clone(), vec![Some(0.2), None]).unwrap())
            .unwrap();
        matrix
            .push("s2", &ProbeTable::try_new(idx, vec![Some(0.4), Some(0.6)]).unwrap())
            .unwrap();

        assert_eq!(matrix.n_samples(), 2);
        assert_eq!(matrix.get("cg2", "s1"), Some(None));
        assert_eq!(matrix.get("cg2", "s2"), Some(Some(0.6)));
        let df = matrix.to_data_frame().unwrap();
        assert_eq!(df.get_column_names_str(), vec!["IlmnID", "s1", "s2"]);
    }

    #[test]
    fn test_stage_matrix_rejects_misaligned() {
        let mut matrix = StageMatrix::new(Stage::MValue, index(&["cg1", "cg2"]));
        let err = matrix
            .push("s1", &ProbeTable::missing(index(&["cg1"])))
            .unwrap_err();
        assert_eq!(err, ContractError::MisalignedStage {
            stage:   Stage::MValue,
            missing: 1,
            extra:   0,
        });
        assert_eq!(matrix.n_samples(), 0);
        assert_eq!(
            ProcessingError::from(err).to_string(),
            "stage m_value is not aligned to the probe index: 1 probes missing, 0 unexpected"
        );
    }
}
