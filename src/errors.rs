//! Error taxonomy of the processing pipeline.
//!
//! Structural errors ([`ManifestIntegrityError`], [`ContractError`]) abort a
//! run because every sample depends on the shared layout. Data-quality errors
//! ([`InsufficientControlDataError`]) are scoped to one sample, which is
//! skipped and reported. [`IncompleteStageError`] is returned by the export
//! call that requested a stage which never ran.

use thiserror::Error;

use crate::data_structs::typedef::{
    ProbeAddress,
    ProbeId,
};
use crate::data_structs::{
    Allele,
    Channel,
    Chemistry,
    Stage,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManifestIntegrityError {
    #[error(
        "probe {probe_id} at address {address} is {chemistry} but declares \
         the {channel} channel (expected {expected})"
    )]
    ChannelMismatch {
        address:   ProbeAddress,
        probe_id:  ProbeId,
        chemistry: Chemistry,
        channel:   Channel,
        expected:  Channel,
    },
    #[error(
        "probe {probe_id} at address {address} is {chemistry} but declares \
         allele {allele}"
    )]
    AlleleMismatch {
        address:   ProbeAddress,
        probe_id:  ProbeId,
        chemistry: Chemistry,
        allele:    Allele,
    },
    #[error("address {address} maps to both {first} and {second}")]
    ConflictingAddress {
        address: ProbeAddress,
        first:   ProbeId,
        second:  ProbeId,
    },
    #[error(
        "probe {probe_id} declares allele {allele} at two addresses ({first} \
         and {second})"
    )]
    DuplicateAllele {
        probe_id: ProbeId,
        allele:   Allele,
        first:    ProbeAddress,
        second:   ProbeAddress,
    },
    #[error("probe {probe_id} changes chemistry from {first} to {second}")]
    ConflictingChemistry {
        probe_id: ProbeId,
        first:    Chemistry,
        second:   Chemistry,
    },
    #[error("control probe {probe_id} at address {address} has no control group")]
    MissingControlGroup {
        address:  ProbeAddress,
        probe_id: ProbeId,
    },
    #[error(
        "non-control probe {probe_id} at address {address} carries control \
         group '{group}'"
    )]
    UnexpectedControlGroup {
        address:  ProbeAddress,
        probe_id: ProbeId,
        group:    String,
    },
    #[error("manifest contains no probe records")]
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "only {found} out-of-band intensities on the {channel} channel, at least \
     {required} are required to fit the background"
)]
pub struct InsufficientControlDataError {
    pub channel:  Channel,
    pub found:    usize,
    pub required: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot export {requested}: stage {missing} has not run")]
pub struct IncompleteStageError {
    pub requested: Stage,
    pub missing:   Stage,
}

/// Violations of the contract between the core and its collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("sample {sample}: address {address} does not resolve in the manifest")]
    UnresolvedAddress {
        sample:  String,
        address: ProbeAddress,
    },
    #[error(
        "sample {sample}: address {address} has invalid {channel} intensity \
         {value}"
    )]
    InvalidIntensity {
        sample:  String,
        address: ProbeAddress,
        channel: Channel,
        value:   f64,
    },
    #[error(
        "stage {stage} is not aligned to the probe index: {missing} probes \
         missing, {extra} unexpected"
    )]
    MisalignedStage {
        stage:   Stage,
        missing: usize,
        extra:   usize,
    },
    #[error("stage {stage} can not run while the sample is {state}")]
    OutOfOrder {
        stage: Stage,
        state: crate::data_structs::SampleState,
    },
    #[error("raw intensities of sample {0} were already released")]
    Released(String),
    #[error("samples not found in the sample sheet: {0:?}")]
    UnknownSamples(Vec<String>),
}

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error(transparent)]
    ManifestIntegrity(#[from] ManifestIntegrityError),
    #[error(transparent)]
    InsufficientControlData(#[from] InsufficientControlDataError),
    #[error(transparent)]
    IncompleteStage(#[from] IncompleteStageError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("collaborator failed: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl ProcessingError {
    /// Whether the error only invalidates the sample it was raised for.
    pub fn is_sample_scoped(&self) -> bool {
        matches!(self, ProcessingError::InsufficientControlData(_))
    }
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
