//! Collaborator interfaces of the pipeline and their implementations.
//!
//! The pipeline never touches files itself. Manifest records, decoded
//! intensities and sample sheets are pulled from the source traits, and
//! export views are pushed to a [`SampleExporter`].
//!
//! - [`readers`]: CSV manifest, intensity and sample sheet sources.
//! - [`export`]: CSV exporter writing per-sample and run-level tables.
//! - [`memory`]: in-memory sources and exporter.

pub mod export;
pub mod memory;
pub mod readers;

use crate::data_structs::container::ExportView;
use crate::data_structs::layout::ProbeRecord;
use crate::data_structs::sample_sheet::{
    Sample,
    SampleSheet,
};
use crate::data_structs::signal::ChannelIntensity;
use crate::data_structs::typedef::ProbeAddress;
use crate::tools::pipeline::report::RunMatrices;

/// Supplies the probe records of an array manifest.
pub trait ManifestSource {
    fn probe_records(&self) -> anyhow::Result<Vec<ProbeRecord>>;
}

/// Supplies the decoded green/red intensities of a sample.
pub trait IntensitySource: Send + Sync {
    fn channel_intensities(
        &self,
        sample: &Sample,
    ) -> anyhow::Result<Vec<(ProbeAddress, ChannelIntensity)>>;
}

pub trait SampleSheetSource {
    fn samples(&self) -> anyhow::Result<SampleSheet>;
}

/// Persists export views. Calls arrive in sample-sheet order.
pub trait SampleExporter {
    fn export_sample(
        &mut self,
        view: &ExportView,
    ) -> anyhow::Result<()>;

    /// Called once after every batch has been exported.
    fn export_run(
        &mut self,
        matrices: &RunMatrices,
    ) -> anyhow::Result<()>;
}
