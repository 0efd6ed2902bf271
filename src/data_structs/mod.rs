//! Core data structures of the array processing pipeline.
//!
//! - [`layout`]: the probe layout of an array ([`ProbeLayoutIndex`]), built
//!   from manifest records and shared read-only by every sample.
//! - [`signal`]: decoded per-address green/red intensities of one sample
//!   ([`RawSignalTable`]).
//! - [`probe_table`]: per-probe value columns aligned to a shared
//!   [`ProbeIndex`]. Missing values are `None`.
//! - [`container`]: the per-sample state ([`SampleDataContainer`]) holding
//!   every derived table, the noob fit and recoverable warnings.
//! - [`control`]: control probe readings of a sample.
//! - [`sample_sheet`]: sample identifiers and group metadata.
//! - Enumerations of channels, probe chemistries, alleles, stages and sample
//!   states.
//! - [`typedef`]: type aliases and intensity constants.
//!
//! [`ProbeLayoutIndex`]: layout::ProbeLayoutIndex
//! [`RawSignalTable`]: signal::RawSignalTable
//! [`ProbeIndex`]: probe_table::ProbeIndex
//! [`SampleDataContainer`]: container::SampleDataContainer

pub mod container;
pub mod control;
mod enums;
pub mod layout;
pub mod probe_table;
pub mod sample_sheet;
pub mod signal;
pub mod typedef;


pub use enums::{
    Allele,
    Channel,
    Chemistry,
    SampleState,
    Stage,
};
