//! Per-sample state: the raw intensities, every derived table and the
//! warnings collected while processing.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use itertools::Itertools;
use log::debug;
use polars::prelude::*;

use super::control::ControlTable;
use super::enums::{
    Channel,
    SampleState,
    Stage,
};
use super::layout::ProbeLayoutIndex;
use super::probe_table::{
    ProbeIndex,
    ProbeTable,
};
use super::sample_sheet::Sample;
use super::signal::RawSignalTable;
use super::typedef::ProbeId;
use crate::errors::{
    ContractError,
    IncompleteStageError,
    ProcessingResult,
};
use crate::tools::noob::NoobFit;

/// Recoverable condition recorded on a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleWarning {
    /// Probes missing one of their paired addresses.
    IncompleteProbes { probe_ids: Vec<ProbeId> },
    /// Background spread too small to fit; offset-only correction.
    DegenerateBackground { channel: Channel, sigma: f64 },
    /// Dye bias derived from in-band intensities instead of the requested
    /// reference.
    DyeBiasFallback,
    BetaClamped { count: usize },
}

impl Display for SampleWarning {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            SampleWarning::IncompleteProbes { probe_ids } => {
                write!(f, "{} incomplete probes", probe_ids.len())
            },
            SampleWarning::DegenerateBackground { channel, sigma } => {
                write!(
                    f,
                    "degenerate {} background (sigma={:.3e}), offset-only \
                     correction",
                    channel, sigma
                )
            },
            SampleWarning::DyeBiasFallback => {
                write!(f, "dye bias derived from in-band intensities")
            },
            SampleWarning::BetaClamped { count } => {
                write!(f, "{} beta values clamped", count)
            },
        }
    }
}

/// Tables an export call asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRequest {
    /// Export noob-corrected signal; raw signal otherwise.
    pub noob:        bool,
    pub betas:       bool,
    pub m_value:     bool,
    pub uncorrected: bool,
    pub control:     bool,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            noob:        true,
            betas:       true,
            m_value:     true,
            uncorrected: false,
            control:     false,
        }
    }
}

/// Export-ready tables of one sample. Every frame starts with `IlmnID`.
#[derive(Debug, Clone)]
pub struct ExportView {
    pub sample:      Sample,
    /// Signal and value columns over the CpG probe index.
    pub processed:   DataFrame,
    /// Combined raw signal over the same index.
    pub uncorrected: Option<DataFrame>,
    pub control:     Option<DataFrame>,
    pub snp:         Option<DataFrame>,
}

#[derive(Debug, Clone)]
pub struct SampleDataContainer {
    sample:     Sample,
    sample_id:  String,
    layout:     Arc<ProbeLayoutIndex>,
    raw:        Option<Arc<RawSignalTable>>,
    state:      SampleState,
    tables:     BTreeMap<Stage, ProbeTable>,
    snp_tables: BTreeMap<Stage, ProbeTable>,
    controls:   Option<ControlTable>,
    noob_fit:   Option<NoobFit>,
    warnings:   Vec<SampleWarning>,
}

impl SampleDataContainer {
    /// Starts a sample. Every address of `raw` must resolve in `layout`.
    pub fn new(
        sample: Sample,
        layout: Arc<ProbeLayoutIndex>,
        raw: Arc<RawSignalTable>,
    ) -> Result<Self, ContractError> {
        raw.check_resolves(&layout)?;
        Ok(Self {
            sample_id: sample.sample_id(),
            sample,
            layout,
            raw: Some(raw),
            state: SampleState::Loaded,
            tables: BTreeMap::new(),
            snp_tables: BTreeMap::new(),
            controls: None,
            noob_fit: None,
            warnings: Vec::new(),
        })
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn layout(&self) -> &Arc<ProbeLayoutIndex> {
        &self.layout
    }

    pub fn probe_index(&self) -> &Arc<ProbeIndex> {
        self.layout.probe_index()
    }

    pub fn state(&self) -> SampleState {
        self.state
    }

    pub fn raw(&self) -> Result<&RawSignalTable, ContractError> {
        self.raw
            .as_deref()
            .ok_or_else(|| ContractError::Released(self.sample_id.clone()))
    }

    pub fn is_released(&self) -> bool {
        self.raw.is_none()
    }

    pub fn table(
        &self,
        stage: Stage,
    ) -> Option<&ProbeTable> {
        self.tables.get(&stage)
    }

    pub fn snp_table(
        &self,
        stage: Stage,
    ) -> Option<&ProbeTable> {
        self.snp_tables.get(&stage)
    }

    /// The `stage` table, or the error an operation producing `requested`
    /// reports when it is absent.
    pub fn require(
        &self,
        stage: Stage,
        requested: Stage,
    ) -> Result<&ProbeTable, IncompleteStageError> {
        self.table(stage).ok_or(IncompleteStageError {
            requested,
            missing: stage,
        })
    }

    pub fn controls(&self) -> Option<&ControlTable> {
        self.controls.as_ref()
    }

    pub fn noob_fit(&self) -> Option<&NoobFit> {
        self.noob_fit.as_ref()
    }

    pub fn warnings(&self) -> &[SampleWarning] {
        &self.warnings
    }

    pub fn push_warning(
        &mut self,
        warning: SampleWarning,
    ) {
        self.warnings.push(warning);
    }

    pub(crate) fn set_noob_fit(
        &mut self,
        fit: NoobFit,
    ) {
        self.noob_fit = Some(fit);
    }

    pub fn set_controls(
        &mut self,
        controls: ControlTable,
    ) {
        self.controls = Some(controls);
    }

    fn check_order(
        &self,
        stage: Stage,
    ) -> Result<(), ContractError> {
        let ready = if stage.produced_in() == SampleState::Combined {
            self.state <= SampleState::Combined
        }
        else {
            self.state >= SampleState::Combined && self.state < SampleState::Exported
        };
        if ready {
            Ok(())
        }
        else {
            Err(ContractError::OutOfOrder {
                stage,
                state: self.state,
            })
        }
    }

    /// Stores a derived CpG table. The table must be aligned to the
    /// container's probe index. Replacing the noob tables discards value
    /// tables computed from the previous ones.
    pub fn add_stage_result(
        &mut self,
        stage: Stage,
        table: ProbeTable,
    ) -> Result<(), ContractError> {
        self.check_order(stage)?;
        table.check_aligned(self.layout.probe_index(), stage)?;

        if matches!(stage, Stage::NoobMethylated | Stage::NoobUnmethylated)
            && self.state == SampleState::Valued
        {
            debug!(
                "Sample {}: noob tables replaced, discarding value tables",
                self.sample_id
            );
            for value_stage in [Stage::Beta, Stage::MValue] {
                self.tables.remove(&value_stage);
                self.snp_tables.remove(&value_stage);
            }
        }
        self.tables.insert(stage, table);
        self.refresh_state();
        Ok(())
    }

    /// Stores a derived SNP table, aligned to the layout's SNP probes.
    pub fn add_snp_stage_result(
        &mut self,
        stage: Stage,
        table: ProbeTable,
    ) -> Result<(), ContractError> {
        if self.state == SampleState::Exported {
            return Err(ContractError::OutOfOrder {
                stage,
                state: self.state,
            });
        }
        table.check_aligned(self.layout.snp().index(), stage)?;
        self.snp_tables.insert(stage, table);
        Ok(())
    }

    /// Derives the state from the stored tables. Signal stages only count
    /// once both of their tables are present.
    fn refresh_state(&mut self) {
        self.state = self
            .tables
            .keys()
            .filter(|stage| {
                stage
                    .partner()
                    .map_or(true, |partner| self.tables.contains_key(&partner))
            })
            .map(Stage::produced_in)
            .max()
            .unwrap_or(SampleState::Loaded);
    }

    /// Builds the export-ready tables of `request`.
    pub fn export_view(
        &self,
        request: &ExportRequest,
    ) -> ProcessingResult<ExportView> {
        let index = self.layout.probe_index();
        let requested = if request.betas {
            Stage::Beta
        }
        else if request.m_value {
            Stage::MValue
        }
        else if request.noob {
            Stage::NoobMethylated
        }
        else {
            Stage::RawMethylated
        };

        let signal_stages = if request.noob {
            [Stage::NoobMethylated, Stage::NoobUnmethylated]
        }
        else {
            [Stage::RawMethylated, Stage::RawUnmethylated]
        };
        let mut value_stages = Vec::new();
        if request.betas {
            value_stages.push(Stage::Beta);
        }
        if request.m_value {
            value_stages.push(Stage::MValue);
        }

        let mut columns = vec![index.to_column("IlmnID")];
        for stage in signal_stages.into_iter().chain(value_stages) {
            let table = self.require(stage, requested)?;
            columns.push(table.to_column(stage.column_name()));
        }
        let processed = DataFrame::new(columns)?;

        let uncorrected = if request.uncorrected && !request.noob {
            debug!(
                "Sample {}: raw signal is already the processed signal",
                self.sample_id
            );
            None
        }
        else if request.uncorrected {
            let mut columns = vec![index.to_column("IlmnID")];
            for stage in [Stage::RawMethylated, Stage::RawUnmethylated] {
                let table = self.require(stage, stage)?;
                columns.push(table.to_column(stage.column_name()));
            }
            Some(DataFrame::new(columns)?)
        }
        else {
            None
        };

        let (control, snp) = if request.control {
            let control = match &self.controls {
                Some(table) => Some(table.to_data_frame()?),
                None => {
                    debug!("Sample {}: no control table extracted", self.sample_id);
                    None
                },
            };
            (control, self.snp_frame()?)
        }
        else {
            (None, None)
        };

        Ok(ExportView {
            sample: self.sample.clone(),
            processed,
            uncorrected,
            control,
            snp,
        })
    }

    fn snp_frame(&self) -> PolarsResult<Option<DataFrame>> {
        if self.snp_tables.is_empty() || self.layout.snp().is_empty() {
            return Ok(None);
        }
        let columns = std::iter::once(self.layout.snp().index().to_column("IlmnID"))
            .chain(
                self.snp_tables
                    .iter()
                    .map(|(stage, table)| table.to_column(stage.column_name())),
            )
            .collect_vec();
        DataFrame::new(columns).map(Some)
    }

    pub fn mark_exported(&mut self) {
        self.state = SampleState::Exported;
    }

    /// Drops the raw intensities. Derived tables stay available.
    pub fn release_raw(&mut self) {
        if self.raw.take().is_some() {
            debug!("Sample {}: raw intensities released", self.sample_id);
        }
    }
}
