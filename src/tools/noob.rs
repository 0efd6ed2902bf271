//! Normal-exponential out-of-band ("noob") background and dye-bias
//! correction.
//!
//! Per channel, the readings of Infinium I probes on the channel they were
//! not designed for carry only background fluorescence. Their robust location
//! and spread parameterise the normal background of a normal-exponential
//! convolution model; every in-band intensity is replaced by its expected
//! true signal under that model. A per-channel scale factor then equalises
//! the mean corrected intensity of the two dyes.

use log::{
    debug,
    info,
    warn,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::data_structs::container::{
    SampleDataContainer,
    SampleWarning,
};
use crate::data_structs::layout::{
    ProbeLayoutIndex,
    ProbeSet,
};
use crate::data_structs::probe_table::ProbeTable;
use crate::data_structs::signal::RawSignalTable;
use crate::data_structs::typedef::{
    IntensityType,
    INTENSITY_EPSILON,
};
use crate::data_structs::{
    Channel,
    Stage,
};
use crate::errors::{
    InsufficientControlDataError,
    ProcessingResult,
};
use crate::utils::stats::{
    huber,
    normexp_signal,
};
use crate::getter_fn;

/// Background spread below which the normal-exponential model is not fitted.
pub const DEGENERATE_SIGMA: f64 = 1e-6;
/// Lower bound of the exponential signal mean.
pub const MIN_ALPHA: f64 = 10.0;
/// Tuning constant of the Huber estimator.
pub const HUBER_K: f64 = 1.5;

/// Whether a model parameter is fit for each sample or jointly for all
/// samples of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitScope {
    #[default]
    Sample,
    Batch,
}

/// Intensities the dye-bias factor is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DyeBiasReference {
    /// Mean corrected in-band intensity of each channel.
    #[default]
    InBand,
    /// Mean corrected intensity of the NORM_A/T (red) and NORM_C/G (green)
    /// control probes.
    NormalizationControls,
}

/// Settings of the corrector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoobParams {
    /// Constant added to every corrected intensity.
    pub offset:             IntensityType,
    /// Out-of-band readings required per channel.
    pub min_oob_probes:     usize,
    pub dye_bias_reference: DyeBiasReference,
}

impl Default for NoobParams {
    fn default() -> Self {
        Self {
            offset:             15.0,
            min_oob_probes:     200,
            dye_bias_reference: DyeBiasReference::InBand,
        }
    }
}

/// Fitted normal-exponential background of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundFit {
    /// Location of the normal background.
    pub mu:    f64,
    /// Spread of the normal background.
    pub sigma: f64,
    /// Mean of the exponential signal.
    pub alpha: f64,
    /// Number of out-of-band readings the fit used.
    pub n_oob: usize,
}

impl BackgroundFit {
    pub fn is_degenerate(&self) -> bool {
        self.sigma < DEGENERATE_SIGMA
    }

    /// Background-corrected intensity, floored at [`INTENSITY_EPSILON`],
    /// plus `offset`. A degenerate fit only subtracts the location.
    pub fn correct(
        &self,
        x: IntensityType,
        offset: IntensityType,
    ) -> IntensityType {
        let signal = if self.is_degenerate() {
            x - self.mu
        }
        else {
            normexp_signal(x, self.mu, self.sigma, self.alpha)
        };
        let signal = if signal.is_finite() {
            signal
        }
        else {
            INTENSITY_EPSILON
        };
        signal.max(INTENSITY_EPSILON) + offset
    }
}

/// Multiplicative dye-bias factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DyeBias {
    pub green: f64,
    pub red:   f64,
}

impl DyeBias {
    pub fn identity() -> Self {
        Self {
            green: 1.0,
            red:   1.0,
        }
    }

    pub fn factor(
        &self,
        channel: Channel,
    ) -> f64 {
        match channel {
            Channel::Green => self.green,
            Channel::Red => self.red,
            Channel::Both => 1.0,
        }
    }

    /// Scales both channels to the mean of the two channel means.
    fn from_means(
        green_mean: f64,
        red_mean: f64,
    ) -> Option<Self> {
        if !(green_mean > 0.0 && red_mean > 0.0) {
            return None;
        }
        let reference = (green_mean + red_mean) / 2.0;
        Some(Self {
            green: reference / green_mean,
            red:   reference / red_mean,
        })
    }
}

/// Complete correction model applied to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoobFit {
    pub green:  BackgroundFit,
    pub red:    BackgroundFit,
    pub dye:    DyeBias,
    pub offset: IntensityType,
}

impl NoobFit {
    pub fn background(
        &self,
        channel: Channel,
    ) -> &BackgroundFit {
        match channel {
            Channel::Red => &self.red,
            Channel::Green | Channel::Both => &self.green,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.green.is_degenerate() || self.red.is_degenerate()
    }

    /// Background- and dye-corrected value of a reading on `channel`.
    pub fn correct(
        &self,
        x: IntensityType,
        channel: Channel,
    ) -> IntensityType {
        self.background(channel).correct(x, self.offset) * self.dye.factor(channel)
    }
}

/// Readings of one channel the model is fit on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSample {
    /// Background-only readings.
    pub out_of_band:   Vec<IntensityType>,
    /// Readings carrying signal on this channel.
    pub in_band:       Vec<IntensityType>,
    /// Normalization control readings on this channel.
    pub norm_controls: Vec<IntensityType>,
}

/// Per-channel readings of one sample, or of a pooled batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelData {
    pub green: ChannelSample,
    pub red:   ChannelSample,
}

impl ChannelData {
    /// Collects the model inputs of one sample. In-band values come from the
    /// combined raw tables so incomplete probes do not contribute.
    pub fn collect(
        layout: &ProbeLayoutIndex,
        raw: &RawSignalTable,
        meth: &ProbeTable,
        unmeth: &ProbeTable,
    ) -> Self {
        let mut data = ChannelData::default();
        for channel in [Channel::Green, Channel::Red] {
            let sample = data.channel_mut(channel);
            sample.out_of_band = layout
                .out_of_band(channel)
                .filter_map(|address| raw.read(address, channel))
                .collect();
            sample.norm_controls = layout
                .normalization_controls(channel)
                .filter_map(|c| raw.read(c.address, channel))
                .collect();
        }

        let designs = layout.cpg().designs();
        for (table, methylated) in [(meth, true), (unmeth, false)] {
            for (value, design) in table.values().iter().zip(designs) {
                if let Some(v) = value {
                    data.channel_mut(design.channel_of(methylated))
                        .in_band
                        .push(*v);
                }
            }
        }
        data
    }

    /// Concatenates the readings of several samples.
    pub fn pooled<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a ChannelData>, {
        samples
            .into_iter()
            .fold(ChannelData::default(), |mut acc, data| {
                for channel in [Channel::Green, Channel::Red] {
                    let src = data.channel(channel);
                    let dst = acc.channel_mut(channel);
                    dst.out_of_band.extend_from_slice(&src.out_of_band);
                    dst.in_band.extend_from_slice(&src.in_band);
                    dst.norm_controls.extend_from_slice(&src.norm_controls);
                }
                acc
            })
    }

    pub fn channel(
        &self,
        channel: Channel,
    ) -> &ChannelSample {
        match channel {
            Channel::Red => &self.red,
            Channel::Green | Channel::Both => &self.green,
        }
    }

    fn channel_mut(
        &mut self,
        channel: Channel,
    ) -> &mut ChannelSample {
        match channel {
            Channel::Red => &mut self.red,
            Channel::Green | Channel::Both => &mut self.green,
        }
    }
}

/// Background fits of both channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelFits {
    pub green: BackgroundFit,
    pub red:   BackgroundFit,
}

impl ChannelFits {
    pub fn with_dye(
        self,
        dye: DyeBias,
        offset: IntensityType,
    ) -> NoobFit {
        NoobFit {
            green: self.green,
            red: self.red,
            dye,
            offset,
        }
    }
}

fn in_band_values(sample: &ChannelSample) -> &[IntensityType] {
    &sample.in_band
}

fn norm_control_values(sample: &ChannelSample) -> &[IntensityType] {
    &sample.norm_controls
}

/// Fits and applies the noob model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoobCorrector {
    params: NoobParams,
}

impl NoobCorrector {
    pub fn new(params: NoobParams) -> Self {
        Self { params }
    }

    getter_fn!(params, NoobParams);

    /// Fits the background model of one channel.
    pub fn fit_background(
        &self,
        channel: Channel,
        sample: &ChannelSample,
    ) -> Result<BackgroundFit, InsufficientControlDataError> {
        let insufficient = InsufficientControlDataError {
            channel,
            found: sample.out_of_band.len(),
            required: self.params.min_oob_probes,
        };
        if sample.out_of_band.len() < self.params.min_oob_probes {
            return Err(insufficient);
        }
        let oob = huber(&sample.out_of_band, HUBER_K).ok_or(insufficient)?;
        let alpha = huber(&sample.in_band, HUBER_K)
            .map(|ib| ib.mu - oob.mu)
            .unwrap_or(MIN_ALPHA)
            .max(MIN_ALPHA);

        let fit = BackgroundFit {
            mu: oob.mu,
            sigma: oob.scale,
            alpha,
            n_oob: sample.out_of_band.len(),
        };
        debug!(
            "{} background fit: mu={:.3}, sigma={:.3}, alpha={:.3}, n_oob={}",
            channel, fit.mu, fit.sigma, fit.alpha, fit.n_oob
        );
        Ok(fit)
    }

    /// Fits the background of both channels.
    pub fn fit_backgrounds(
        &self,
        data: &ChannelData,
    ) -> Result<ChannelFits, InsufficientControlDataError> {
        Ok(ChannelFits {
            green: self.fit_background(Channel::Green, &data.green)?,
            red:   self.fit_background(Channel::Red, &data.red)?,
        })
    }

    /// Derives dye-bias factors from background-corrected intensities of one
    /// or more samples, each corrected with its own background fit. Returns
    /// identity factors when any channel background is degenerate.
    pub fn fit_dye_bias(
        &self,
        samples: &[(ChannelFits, &ChannelData)],
        warnings: &mut Vec<SampleWarning>,
    ) -> DyeBias {
        let mut degenerate = false;
        for (fits, _) in samples {
            for (channel, fit) in [(Channel::Green, &fits.green), (Channel::Red, &fits.red)] {
                if fit.is_degenerate() {
                    warn!(
                        "{} background is degenerate (sigma={:.3e}); correcting \
                         offset only, without dye-bias rescaling",
                        channel, fit.sigma
                    );
                    warnings.push(SampleWarning::DegenerateBackground {
                        channel,
                        sigma: fit.sigma,
                    });
                    degenerate = true;
                }
            }
        }
        if degenerate {
            return DyeBias::identity();
        }

        let offset = self.params.offset;
        let corrected_means = |select: fn(&ChannelSample) -> &[IntensityType]| {
            let mut totals = [(0.0f64, 0usize); 2];
            for (fits, data) in samples {
                for (slot, channel, fit) in
                    [(0, Channel::Green, &fits.green), (1, Channel::Red, &fits.red)]
                {
                    for x in select(data.channel(channel)) {
                        totals[slot].0 += fit.correct(*x, offset);
                        totals[slot].1 += 1;
                    }
                }
            }
            let mean = |(sum, n): (f64, usize)| (n > 0).then(|| sum / n as f64);
            mean(totals[0]).zip(mean(totals[1]))
        };

        let norm_means = match self.params.dye_bias_reference {
            DyeBiasReference::InBand => None,
            DyeBiasReference::NormalizationControls => {
                let means = corrected_means(norm_control_values);
                if means.is_none() {
                    warn!(
                        "Normalization control probes missing; deriving dye \
                         bias from in-band intensities"
                    );
                    warnings.push(SampleWarning::DyeBiasFallback);
                }
                means
            },
        };
        let means = norm_means.or_else(|| corrected_means(in_band_values));

        match means.and_then(|(g, r)| DyeBias::from_means(g, r)) {
            Some(dye) => {
                debug!(
                    "Dye-bias factors: green={:.4}, red={:.4}",
                    dye.green, dye.red
                );
                dye
            },
            None => {
                warn!("No in-band intensities to derive dye bias from");
                warnings.push(SampleWarning::DyeBiasFallback);
                DyeBias::identity()
            },
        }
    }

    /// Fits background and dye bias on `data`.
    pub fn fit(
        &self,
        data: &ChannelData,
        warnings: &mut Vec<SampleWarning>,
    ) -> Result<NoobFit, InsufficientControlDataError> {
        let fits = self.fit_backgrounds(data)?;
        let dye = self.fit_dye_bias(&[(fits, data)], warnings);
        Ok(fits.with_dye(dye, self.params.offset))
    }

    /// Collects the model inputs of a combined sample.
    pub fn channel_data(
        &self,
        container: &SampleDataContainer,
    ) -> ProcessingResult<ChannelData> {
        let raw = container.raw()?;
        let meth = container.require(Stage::RawMethylated, Stage::NoobMethylated)?;
        let unmeth =
            container.require(Stage::RawUnmethylated, Stage::NoobUnmethylated)?;
        Ok(ChannelData::collect(
            container.layout(),
            raw,
            meth,
            unmeth,
        ))
    }

    /// Fits a model on the sample's own readings.
    pub fn fit_sample(
        &self,
        container: &mut SampleDataContainer,
    ) -> ProcessingResult<NoobFit> {
        let data = self.channel_data(container)?;
        let mut warnings = Vec::new();
        let fit = self.fit(&data, &mut warnings)?;
        for warning in warnings {
            container.push_warning(warning);
        }
        Ok(fit)
    }

    /// Writes the noob tables of `container` from its raw tables using
    /// `fit`. Applying the fit already in place is a no-op.
    pub fn apply(
        &self,
        container: &mut SampleDataContainer,
        fit: &NoobFit,
    ) -> ProcessingResult<()> {
        if container.noob_fit() == Some(fit)
            && container.table(Stage::NoobMethylated).is_some()
            && container.table(Stage::NoobUnmethylated).is_some()
        {
            debug!(
                "Sample {}: noob fit already applied",
                container.sample_id()
            );
            return Ok(());
        }

        let layout = container.layout().clone();
        let cpg_meth = container.require(Stage::RawMethylated, Stage::NoobMethylated)?;
        let cpg_unmeth =
            container.require(Stage::RawUnmethylated, Stage::NoobUnmethylated)?;
        let noob_meth = correct_table(layout.cpg(), cpg_meth, fit, true);
        let noob_unmeth = correct_table(layout.cpg(), cpg_unmeth, fit, false);

        let snp_tables = match (
            container.snp_table(Stage::RawMethylated),
            container.snp_table(Stage::RawUnmethylated),
        ) {
            (Some(m), Some(u)) => {
                Some((
                    correct_table(layout.snp(), m, fit, true),
                    correct_table(layout.snp(), u, fit, false),
                ))
            },
            _ => None,
        };

        container.set_noob_fit(*fit);
        container.add_stage_result(Stage::NoobMethylated, noob_meth)?;
        container.add_stage_result(Stage::NoobUnmethylated, noob_unmeth)?;
        if let Some((m, u)) = snp_tables {
            container.add_snp_stage_result(Stage::NoobMethylated, m)?;
            container.add_snp_stage_result(Stage::NoobUnmethylated, u)?;
        }
        info!(
            "Sample {}: noob correction applied (dye factors green={:.4}, \
             red={:.4})",
            container.sample_id(),
            fit.dye.green,
            fit.dye.red
        );
        Ok(())
    }
}

fn correct_table(
    probes: &ProbeSet,
    raw: &ProbeTable,
    fit: &NoobFit,
    methylated: bool,
) -> ProbeTable {
    let designs = probes.designs();
    let values = raw.values();
    ProbeTable::from_fn(raw.index().clone(), |i| {
        values[i].map(|x| fit.correct(x, designs[i].channel_of(methylated)))
    })
}
