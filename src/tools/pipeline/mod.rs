//! Batch orchestration of the per-sample stages.
//!
//! Every sample moves through `Loaded → Combined → Corrected → Valued →
//! Exported`. Samples are independent unless a noob model parameter is fit
//! with [`FitScope::Batch`], in which case the fit is shared by all samples
//! of a batch. Exports always run in sample-sheet order.

pub mod config;
pub mod report;

use std::sync::Arc;

use itertools::Itertools;
use log::{
    debug,
    info,
    warn,
};
use rayon::prelude::*;

pub use self::config::PipelineConfig;
pub use self::report::{
    RunMatrices,
    RunReport,
    SampleFailure,
    StageMatrix,
};
use crate::data_structs::container::{
    SampleDataContainer,
    SampleWarning,
};
use crate::data_structs::layout::ProbeLayoutIndex;
use crate::data_structs::sample_sheet::{
    Sample,
    SampleSheet,
};
use crate::data_structs::signal::RawSignalTable;
use crate::data_structs::Stage;
use crate::errors::{
    InsufficientControlDataError,
    ProcessingError,
    ProcessingResult,
};
use crate::io::{
    IntensitySource,
    ManifestSource,
    SampleExporter,
};
use crate::tools::combine::combine_probes;
use crate::tools::control;
use crate::tools::noob::{
    ChannelData,
    ChannelFits,
    FitScope,
    NoobCorrector,
    NoobFit,
};
use crate::utils::{
    n_threads,
    THREAD_POOL,
};

/// Noob fit of one sample of a batch, with the warnings raised while
/// fitting.
type FitOutcome = (
    Result<NoobFit, InsufficientControlDataError>,
    Vec<SampleWarning>,
);

pub struct Pipeline {
    config: PipelineConfig,
    layout: Arc<ProbeLayoutIndex>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        layout: Arc<ProbeLayoutIndex>,
    ) -> ProcessingResult<Self> {
        config
            .validate()
            .map_err(|e| ProcessingError::Config(e.to_string()))?;
        Ok(Self { config, layout })
    }

    /// Builds the layout from `manifest` and wraps it in a pipeline.
    pub fn from_manifest<M: ManifestSource + ?Sized>(
        config: PipelineConfig,
        manifest: &M,
    ) -> ProcessingResult<Self> {
        let records = manifest.probe_records()?;
        let layout = ProbeLayoutIndex::try_from_records(records)?;
        Self::new(config, Arc::new(layout))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &Arc<ProbeLayoutIndex> {
        &self.layout
    }

    /// Processes every selected sample of `sheet`.
    ///
    /// Manifest, contract and collaborator errors abort the run. A sample
    /// without enough out-of-band intensities is skipped and reported in
    /// [`RunReport::failures`].
    pub fn run<I, E>(
        &self,
        sheet: &SampleSheet,
        intensities: &I,
        exporter: &mut E,
    ) -> ProcessingResult<RunReport>
    where
        I: IntensitySource + ?Sized,
        E: SampleExporter + ?Sized, {
        let sheet = match &self.config.sample_name {
            Some(names) => sheet.select(names)?,
            None => sheet.clone(),
        };
        let batch_size = self
            .config
            .batch_size
            .unwrap_or(sheet.len())
            .max(1);
        let n_batches = sheet.len().div_ceil(batch_size);
        info!(
            "Processing {} samples in {} batches of up to {}",
            sheet.len(),
            n_batches,
            batch_size
        );
        if self.config.parallel {
            debug!("Using {} worker threads", n_threads());
        }
        if self.config.fits_batch() && n_batches > 1 {
            warn!(
                "Noob parameters are shared within a batch; results depend on \
                 the batch size"
            );
        }

        let mut report = RunReport::default();
        for (batch_idx, batch) in sheet.samples().chunks(batch_size).enumerate() {
            debug!("Batch {}/{}", batch_idx + 1, n_batches);
            let (containers, failures) = self.run_batch(batch, intensities)?;
            report.failures.extend(failures);

            for mut container in containers {
                if self.config.export {
                    let view = container.export_view(&self.config.export_request())?;
                    exporter.export_sample(&view)?;
                    container.mark_exported();
                }
                report.matrices.add_sample(&container)?;
                report.warnings.push((
                    container.sample_id().to_string(),
                    container.warnings().to_vec(),
                ));
                if self.config.batch_size.is_some() {
                    container.release_raw();
                }
                else {
                    report.containers.push(container);
                }
            }
        }

        if self.config.export {
            exporter.export_run(&report.matrices)?;
        }
        info!(
            "Run finished: {} processed, {} failed",
            report.n_processed(),
            report.n_failed()
        );
        Ok(report)
    }

    /// Runs every stage short of export on one batch.
    fn run_batch<I>(
        &self,
        batch: &[Sample],
        intensities: &I,
    ) -> ProcessingResult<(Vec<SampleDataContainer>, Vec<SampleFailure>)>
    where
        I: IntensitySource + ?Sized, {
        let containers = self
            .map_batch(batch.iter().collect_vec(), |sample| {
                self.load_and_combine(sample, intensities)
            })
            .into_iter()
            .collect::<ProcessingResult<Vec<_>>>()?;

        if !self.config.noob {
            let containers = self
                .map_batch(containers, |c| self.finish_sample(c, None))
                .into_iter()
                .collect::<ProcessingResult<Vec<_>>>()?;
            return Ok((containers, Vec::new()));
        }

        let fits = self.fit_batch(&containers)?;
        let mut failures = Vec::new();
        let mut fitted = Vec::with_capacity(containers.len());
        for (mut container, (fit, warnings)) in containers.into_iter().zip(fits) {
            for warning in warnings {
                container.push_warning(warning);
            }
            match fit {
                Ok(fit) => fitted.push((container, fit)),
                Err(err) => {
                    warn!("Skipping sample {}: {}", container.sample_id(), err);
                    failures.push(SampleFailure {
                        sample: container.sample().clone(),
                        error:  ProcessingError::from(err),
                    });
                },
            }
        }

        let containers = self
            .map_batch(fitted, |(c, fit)| self.finish_sample(c, Some(fit)))
            .into_iter()
            .collect::<ProcessingResult<Vec<_>>>()?;
        Ok((containers, failures))
    }

    /// Maps `f` over a batch on the crate thread pool when parallelism is
    /// enabled. Output order follows input order.
    fn map_batch<T, R, F>(
        &self,
        items: Vec<T>,
        f: F,
    ) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync, {
        if self.config.parallel {
            THREAD_POOL.install(|| items.into_par_iter().map(f).collect())
        }
        else {
            items.into_iter().map(f).collect()
        }
    }

    fn load_and_combine<I>(
        &self,
        sample: &Sample,
        intensities: &I,
    ) -> ProcessingResult<SampleDataContainer>
    where
        I: IntensitySource + ?Sized, {
        let sample_id = sample.sample_id();
        let raw = RawSignalTable::from_iter_checked(
            sample_id.as_str(),
            intensities.channel_intensities(sample)?,
        )?;
        debug!(
            "Sample {}: {} addresses, {} saturated",
            sample_id,
            raw.len(),
            raw.n_saturated()
        );
        let raw = Arc::new(raw);
        let mut container =
            SampleDataContainer::new(sample.clone(), self.layout.clone(), raw.clone())?;

        let cpg = combine_probes(self.layout.cpg(), &raw);
        let snp = combine_probes(self.layout.snp(), &raw);
        let incomplete = cpg
            .incomplete
            .into_iter()
            .chain(snp.incomplete)
            .collect_vec();
        if !incomplete.is_empty() {
            container.push_warning(SampleWarning::IncompleteProbes {
                probe_ids: incomplete,
            });
        }
        container.add_stage_result(Stage::RawMethylated, cpg.methylated)?;
        container.add_stage_result(Stage::RawUnmethylated, cpg.unmethylated)?;
        container.add_snp_stage_result(Stage::RawMethylated, snp.methylated)?;
        container.add_snp_stage_result(Stage::RawUnmethylated, snp.unmethylated)?;
        info!("Sample {}: combined", sample_id);
        Ok(container)
    }

    /// Fits the noob model of every sample of a batch, sharing the
    /// background and/or dye-bias fit across the batch as configured.
    fn fit_batch(
        &self,
        containers: &[SampleDataContainer],
    ) -> ProcessingResult<Vec<FitOutcome>> {
        let corrector = NoobCorrector::new(self.config.noob_params());
        let data = containers
            .iter()
            .map(|c| corrector.channel_data(c))
            .collect::<ProcessingResult<Vec<_>>>()?;

        let pooled_backgrounds = match self.config.background_scope {
            FitScope::Batch => {
                let pooled = ChannelData::pooled(data.iter());
                let fits = corrector.fit_backgrounds(&pooled);
                if let Ok(fits) = &fits {
                    debug!(
                        "Batch background: green mu={:.3} sigma={:.3}, red mu={:.3} \
                         sigma={:.3}",
                        fits.green.mu, fits.green.sigma, fits.red.mu, fits.red.sigma
                    );
                }
                Some(fits)
            },
            FitScope::Sample => None,
        };
        let backgrounds: Vec<Result<ChannelFits, InsufficientControlDataError>> = data
            .iter()
            .map(|d| {
                match &pooled_backgrounds {
                    Some(pooled) => pooled.clone(),
                    None => corrector.fit_backgrounds(d),
                }
            })
            .collect();

        let offset = self.config.noob_offset;
        let outcomes: Vec<FitOutcome> = match self.config.dye_bias_scope {
            FitScope::Batch => {
                let usable = backgrounds
                    .iter()
                    .zip(data.iter())
                    .filter_map(|(fits, d)| fits.as_ref().ok().map(|f| (*f, d)))
                    .collect_vec();
                let mut batch_warnings = Vec::new();
                let dye = corrector.fit_dye_bias(&usable, &mut batch_warnings);
                backgrounds
                    .into_iter()
                    .map(|fits| {
                        match fits {
                            Ok(fits) => (Ok(fits.with_dye(dye, offset)), batch_warnings.clone()),
                            Err(err) => (Err(err), Vec::new()),
                        }
                    })
                    .collect()
            },
            FitScope::Sample => {
                backgrounds
                    .into_iter()
                    .zip(data.iter())
                    .map(|(fits, d)| {
                        let mut warnings = Vec::new();
                        let fit = fits.map(|fits| {
                            let dye = corrector.fit_dye_bias(&[(fits, d)], &mut warnings);
                            fits.with_dye(dye, offset)
                        });
                        (fit, warnings)
                    })
                    .collect()
            },
        };
        Ok(outcomes)
    }

    /// Applies the fit, computes values and extracts control probes.
    fn finish_sample(
        &self,
        mut container: SampleDataContainer,
        fit: Option<NoobFit>,
    ) -> ProcessingResult<SampleDataContainer> {
        if let Some(fit) = fit {
            NoobCorrector::new(self.config.noob_params()).apply(&mut container, &fit)?;
        }
        if self.config.betas || self.config.m_value {
            self.config
                .value_calculator()
                .apply(&mut container)?;
        }
        control::apply(&mut container)?;
        info!(
            "Sample {}: {} ({} warnings)",
            container.sample_id(),
            container.state(),
            container.warnings().len()
        );
        Ok(container)
    }
}
