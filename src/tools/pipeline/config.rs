use std::path::Path;

use anyhow::Context;
use serde::{
    Deserialize,
    Serialize,
};

use crate::data_structs::container::ExportRequest;
use crate::data_structs::typedef::IntensityType;
use crate::tools::noob::{
    DyeBiasReference,
    FitScope,
    NoobParams,
};
use crate::tools::values::ValueCalculator;
use crate::with_field_fn;

/// Settings of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hand per-sample export views to the exporter.
    pub export:             bool,
    /// Export the combined raw signal alongside the corrected one.
    pub save_uncorrected:   bool,
    /// Export the control and SNP probe tables.
    pub save_control:       bool,
    pub betas:              bool,
    pub m_value:            bool,
    /// Samples per batch; `None` processes the whole sheet at once and keeps
    /// every container in the run report.
    pub batch_size:         Option<usize>,
    /// Restrict the run to these sample names or Sentrix ids.
    pub sample_name:        Option<Vec<String>>,
    /// Run noob correction. Values are computed from raw signal otherwise.
    pub noob:               bool,
    pub noob_offset:        IntensityType,
    pub beta_offset:        IntensityType,
    pub min_oob_probes:     usize,
    pub background_scope:   FitScope,
    pub dye_bias_scope:     FitScope,
    pub dye_bias_reference: DyeBiasReference,
    /// Process the samples of a batch on the crate thread pool.
    pub parallel:           bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            export:             true,
            save_uncorrected:   false,
            save_control:       false,
            betas:              true,
            m_value:            true,
            batch_size:         None,
            sample_name:        None,
            noob:               true,
            noob_offset:        15.0,
            beta_offset:        100.0,
            min_oob_probes:     200,
            background_scope:   FitScope::Sample,
            dye_bias_scope:     FitScope::Sample,
            dye_bias_reference: DyeBiasReference::InBand,
            parallel:           false,
        }
    }
}

impl PipelineConfig {
    with_field_fn!(export, bool);

    with_field_fn!(save_uncorrected, bool);

    with_field_fn!(save_control, bool);

    with_field_fn!(betas, bool);

    with_field_fn!(m_value, bool);

    with_field_fn!(batch_size, Option<usize>);

    with_field_fn!(sample_name, Option<Vec<String>>);

    with_field_fn!(noob, bool);

    with_field_fn!(noob_offset, IntensityType);

    with_field_fn!(beta_offset, IntensityType);

    with_field_fn!(min_oob_probes, usize);

    with_field_fn!(background_scope, FitScope);

    with_field_fn!(dye_bias_scope, FitScope);

    with_field_fn!(dye_bias_reference, DyeBiasReference);

    with_field_fn!(parallel, bool);

    /// Reads a configuration from a JSON file. Missing keys keep their
    /// defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("reading configuration {}", path.as_ref().display())
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: Self =
            serde_json::from_str(content).context("parsing pipeline configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == Some(0) {
            anyhow::bail!("batch_size must be positive");
        }
        if !(self.beta_offset >= 0.0) {
            anyhow::bail!("beta_offset must be non-negative");
        }
        if !(self.noob_offset >= 0.0) {
            anyhow::bail!("noob_offset must be non-negative");
        }
        Ok(())
    }

    pub fn noob_params(&self) -> NoobParams {
        NoobParams {
            offset:             self.noob_offset,
            min_oob_probes:     self.min_oob_probes,
            dye_bias_reference: self.dye_bias_reference,
        }
    }

    pub fn value_calculator(&self) -> ValueCalculator {
        ValueCalculator {
            beta_offset: self.beta_offset,
            betas:       self.betas,
            m_values:    self.m_value,
            use_noob:    self.noob,
        }
    }

    pub fn export_request(&self) -> ExportRequest {
        ExportRequest {
            noob:        self.noob,
            betas:       self.betas,
            m_value:     self.m_value,
            uncorrected: self.save_uncorrected,
            control:     self.save_control,
        }
    }

    /// Whether any model parameter is shared across a batch.
    pub fn fits_batch(&self) -> bool {
        self.noob
            && (self.background_scope == FitScope::Batch
                || self.dye_bias_scope == FitScope::Batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_partial_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"batch_size": 2, "save_control": true, "dye_bias_scope": "batch"}"#,
        )
        .unwrap();
        assert_eq!(config.batch_size, Some(2));
        assert!(config.save_control);
        assert_eq!(config.dye_bias_scope, FitScope::Batch);
        assert_eq!(config.background_scope, FitScope::Sample);
        assert_eq!(config.noob_offset, 15.0);
        assert!(config.fits_batch());
    }

    #[test]
    fn test_invalid_batch_size() {
        assert!(PipelineConfig::from_json(r#"{"batch_size": 0}"#).is_err());
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::default()
            .with_noob(false)
            .with_save_uncorrected(true);
        let request = config.export_request();
        assert!(!request.noob);
        assert!(request.uncorrected);
        assert!(!config.value_calculator().use_noob);
    }
}
