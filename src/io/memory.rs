use anyhow::anyhow;
use hashbrown::HashMap;

use super::{
    IntensitySource,
    ManifestSource,
    SampleExporter,
    SampleSheetSource,
};
use crate::data_structs::container::ExportView;
use crate::data_structs::layout::ProbeRecord;
use crate::data_structs::sample_sheet::{
    Sample,
    SampleSheet,
};
use crate::data_structs::signal::ChannelIntensity;
use crate::data_structs::typedef::ProbeAddress;
use crate::tools::pipeline::report::RunMatrices;

/// Manifest, sample sheet and intensities held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub records:     Vec<ProbeRecord>,
    pub sheet:       SampleSheet,
    /// Intensities keyed by sample id.
    pub intensities: HashMap<String, Vec<(ProbeAddress, ChannelIntensity)>>,
}

impl MemorySource {
    pub fn new(records: Vec<ProbeRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    /// Adds a sample to the sheet together with its intensities.
    pub fn with_sample(
        mut self,
        sample: Sample,
        intensities: Vec<(ProbeAddress, ChannelIntensity)>,
    ) -> Self {
        self.intensities
            .insert(sample.sample_id(), intensities);
        let mut samples = self.sheet.samples().to_vec();
        samples.push(sample);
        self.sheet = SampleSheet::new(samples);
        self
    }
}

impl ManifestSource for MemorySource {
    fn probe_records(&self) -> anyhow::Result<Vec<ProbeRecord>> {
        Ok(self.records.clone())
    }
}

impl SampleSheetSource for MemorySource {
    fn samples(&self) -> anyhow::Result<SampleSheet> {
        Ok(self.sheet.clone())
    }
}

impl IntensitySource for MemorySource {
    fn channel_intensities(
        &self,
        sample: &Sample,
    ) -> anyhow::Result<Vec<(ProbeAddress, ChannelIntensity)>> {
        self.intensities
            .get(&sample.sample_id())
            .cloned()
            .ok_or_else(|| anyhow!("no intensities for sample {}", sample.sample_id()))
    }
}

/// Keeps every export view and the run matrices.
#[derive(Debug, Default)]
pub struct MemoryExporter {
    pub views:    Vec<ExportView>,
    pub matrices: Option<RunMatrices>,
}

impl MemoryExporter {
    pub fn view(
        &self,
        sample_id: &str,
    ) -> Option<&ExportView> {
        self.views
            .iter()
            .find(|v| v.sample.sample_id() == sample_id)
    }
}

impl SampleExporter for MemoryExporter {
    fn export_sample(
        &mut self,
        view: &ExportView,
    ) -> anyhow::Result<()> {
        self.views.push(view.clone());
        Ok(())
    }

    fn export_run(
        &mut self,
        matrices: &RunMatrices,
    ) -> anyhow::Result<()> {
        self.matrices = Some(matrices.clone());
        Ok(())
    }
}
