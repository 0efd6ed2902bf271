use std::path::PathBuf;
use std::process::exit;

use clap::{Args, ValueEnum};
use console::style;
use indicatif::ProgressBar;
use itertools::Itertools;
use methprep::prelude::*;
use methprep::tools::pipeline::RunMatrices;

use crate::utils::{init_pbar, UtilsArgs};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum ScopeArg {
    Sample,
    Batch,
}

impl From<ScopeArg> for FitScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Sample => FitScope::Sample,
            ScopeArg::Batch => FitScope::Batch,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum DyeReferenceArg {
    InBand,
    NormControls,
}

impl From<DyeReferenceArg> for DyeBiasReference {
    fn from(value: DyeReferenceArg) -> Self {
        match value {
            DyeReferenceArg::InBand => DyeBiasReference::InBand,
            DyeReferenceArg::NormControls => DyeBiasReference::NormalizationControls,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ProcessArgs {
    #[arg(
        short,
        long,
        required = true,
        help = "Manifest CSV with AddressID, IlmnID, Chemistry, Channel and Allele columns."
    )]
    manifest:     PathBuf,
    #[arg(
        short,
        long,
        required = true,
        help = "Illumina sample sheet CSV."
    )]
    sample_sheet: PathBuf,
    #[arg(
        short,
        long,
        required = true,
        help = "Directory with one <Sentrix_ID>_<Sentrix_Position>.csv intensity file per sample."
    )]
    intensities:  PathBuf,
    #[arg(
        short,
        long,
        required = true,
        help = "Output directory."
    )]
    output:       PathBuf,
    #[arg(
        short,
        long,
        required = false,
        help = "JSON run configuration. Command line flags override its values."
    )]
    config:       Option<PathBuf>,

    #[arg(
        long,
        num_args = 1..,
        help_heading = "SELECTION",
        help = "Process only these sample names or Sentrix ids."
    )]
    sample_name: Option<Vec<String>>,
    #[arg(
        short,
        long,
        help_heading = "SELECTION",
        help = "Samples per batch. Containers are released after each batch."
    )]
    batch_size:  Option<usize>,

    #[arg(
        long,
        default_value_t = false,
        help_heading = "CORRECTION",
        help = "Skip noob correction and compute values from raw signal."
    )]
    no_noob:            bool,
    #[arg(
        long,
        help_heading = "CORRECTION",
        help = "Offset added to noob-corrected intensities. [default: 15]"
    )]
    noob_offset:        Option<f64>,
    #[arg(
        long,
        help_heading = "CORRECTION",
        help = "Minimal number of out-of-band intensities per channel. [default: 200]"
    )]
    min_oob_probes:     Option<usize>,
    #[arg(
        long,
        value_enum,
        help_heading = "CORRECTION",
        help = "Fit the background per sample or per batch. [default: sample]"
    )]
    background_scope:   Option<ScopeArg>,
    #[arg(
        long,
        value_enum,
        help_heading = "CORRECTION",
        help = "Fit the dye bias per sample or per batch. [default: sample]"
    )]
    dye_bias_scope:     Option<ScopeArg>,
    #[arg(
        long,
        value_enum,
        help_heading = "CORRECTION",
        help = "Intensities the dye bias is derived from. [default: in-band]"
    )]
    dye_bias_reference: Option<DyeReferenceArg>,

    #[arg(
        long,
        help_heading = "VALUES",
        help = "Offset of the beta value denominator. [default: 100]"
    )]
    beta_offset: Option<f64>,
    #[arg(
        long,
        default_value_t = false,
        help_heading = "VALUES",
        help = "Do not compute beta values."
    )]
    no_betas:    bool,
    #[arg(
        long,
        default_value_t = false,
        help_heading = "VALUES",
        help = "Do not compute m-values."
    )]
    no_m_value:  bool,

    #[arg(
        long,
        default_value_t = false,
        help_heading = "EXPORT",
        help = "Also export the uncorrected signal."
    )]
    save_uncorrected: bool,
    #[arg(
        long,
        default_value_t = false,
        help_heading = "EXPORT",
        help = "Also export control and SNP probe tables."
    )]
    save_control:     bool,
}

impl ProcessArgs {
    fn build_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if self.sample_name.is_some() {
            config = config.with_sample_name(self.sample_name.clone());
        }
        if self.batch_size.is_some() {
            config = config.with_batch_size(self.batch_size);
        }
        if self.no_noob {
            config = config.with_noob(false);
        }
        if let Some(offset) = self.noob_offset {
            config = config.with_noob_offset(offset);
        }
        if let Some(min_oob) = self.min_oob_probes {
            config = config.with_min_oob_probes(min_oob);
        }
        if let Some(scope) = self.background_scope {
            config = config.with_background_scope(scope.into());
        }
        if let Some(scope) = self.dye_bias_scope {
            config = config.with_dye_bias_scope(scope.into());
        }
        if let Some(reference) = self.dye_bias_reference {
            config = config.with_dye_bias_reference(reference.into());
        }
        if let Some(offset) = self.beta_offset {
            config = config.with_beta_offset(offset);
        }
        if self.no_betas {
            config = config.with_betas(false);
        }
        if self.no_m_value {
            config = config.with_m_value(false);
        }
        if self.save_uncorrected {
            config = config.with_save_uncorrected(true);
        }
        if self.save_control {
            config = config.with_save_control(true);
        }
        Ok(config.with_parallel(true))
    }

    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        for path in [&self.manifest, &self.sample_sheet] {
            if !path.is_file() {
                eprintln!("Path {} is not a file.", style(path.display()).red());
                exit(-1);
            }
        }
        if !self.intensities.is_dir() {
            eprintln!(
                "Path {} is not a directory.",
                style(self.intensities.display()).red()
            );
            exit(-1);
        }

        let config = self.build_config()?;
        let sheet = CsvSampleSheet::new(&self.sample_sheet).samples()?;
        let pipeline = Pipeline::from_manifest(config, &CsvManifest::new(&self.manifest))?;
        println!(
            "[{}] Manifest with {} CpG, {} SNP and {} control probes",
            style("V").green(),
            style(pipeline.layout().cpg().len()).green(),
            style(pipeline.layout().snp().len()).green(),
            style(pipeline.layout().controls().len()).green(),
        );

        let n_samples = match &pipeline.config().sample_name {
            Some(names) => names.len(),
            None => sheet.len(),
        };
        let progress_bar = if utils.progress {
            init_pbar(n_samples)?
        }
        else {
            ProgressBar::hidden()
        };

        let mut exporter = ProgressExporter {
            inner: CsvExporter::try_new(&self.output)?,
            progress_bar: progress_bar.clone(),
        };
        let report = pipeline.run(
            &sheet,
            &CsvIntensities::new(&self.intensities),
            &mut exporter,
        )?;
        progress_bar.finish();

        for failure in report.failures.iter() {
            eprintln!(
                "[{}] Sample {} skipped: {}",
                style("X").red(),
                style(failure.sample.sample_id()).red(),
                failure.error
            );
        }
        for (sample_id, warnings) in report.warnings.iter().filter(|(_, w)| !w.is_empty()) {
            eprintln!(
                "[{}] Sample {}: {}",
                style("!").yellow(),
                style(sample_id).yellow(),
                warnings.iter().map(|w| w.to_string()).join("; ")
            );
        }
        println!(
            "{}",
            style(format!(
                "{} samples processed, {} failed.",
                report.n_processed(),
                report.n_failed()
            ))
            .green()
            .bold()
        );
        Ok(())
    }
}

/// Ticks the progress bar on every exported sample.
struct ProgressExporter<E: SampleExporter> {
    inner:        E,
    progress_bar: ProgressBar,
}

impl<E: SampleExporter> SampleExporter for ProgressExporter<E> {
    fn export_sample(
        &mut self,
        view: &ExportView,
    ) -> anyhow::Result<()> {
        self.inner.export_sample(view)?;
        self.progress_bar
            .set_message(format!("{}", style(view.sample.sample_id()).blue()));
        self.progress_bar.inc(1);
        Ok(())
    }

    fn export_run(
        &mut self,
        matrices: &RunMatrices,
    ) -> anyhow::Result<()> {
        self.progress_bar.set_message("Writing run matrices...");
        self.inner.export_run(matrices)
    }
}
