//! Beta and M values from methylated/unmethylated signal.

use log::{
    debug,
    warn,
};

use crate::data_structs::container::{
    SampleDataContainer,
    SampleWarning,
};
use crate::data_structs::probe_table::ProbeTable;
use crate::data_structs::typedef::{
    IntensityType,
    MaybeValue,
};
use crate::data_structs::Stage;
use crate::errors::{
    ContractError,
    ProcessingResult,
};

/// Beta value of one probe. Values outside `[0, 1]` are clamped and
/// reported through the returned flag; non-finite ratios are missing.
pub fn beta(
    meth: IntensityType,
    unmeth: IntensityType,
    offset: IntensityType,
) -> (MaybeValue, bool) {
    let value = meth / (meth + unmeth + offset);
    if !value.is_finite() {
        return (None, false);
    }
    let clamped = value.clamp(0.0, 1.0);
    (Some(clamped), clamped != value)
}

/// M value of one probe: `log2((M + 1) / (U + 1))`. Non-finite results are
/// missing.
pub fn m_value(
    meth: IntensityType,
    unmeth: IntensityType,
) -> MaybeValue {
    let value = ((meth + 1.0) / (unmeth + 1.0)).log2();
    value.is_finite().then_some(value)
}

/// Per-probe beta values with the count of clamped probes.
pub fn beta_table(
    meth: &ProbeTable,
    unmeth: &ProbeTable,
    offset: IntensityType,
) -> Result<(ProbeTable, usize), ContractError> {
    let mut n_clamped = 0;
    let table = meth.zip_map(unmeth, Stage::Beta, |m, u| {
        let (value, clamped) = beta(m, u, offset);
        n_clamped += clamped as usize;
        value
    })?;
    Ok((table, n_clamped))
}

pub fn m_value_table(
    meth: &ProbeTable,
    unmeth: &ProbeTable,
) -> Result<ProbeTable, ContractError> {
    meth.zip_map(unmeth, Stage::MValue, m_value)
}

/// Computes value stages of a sample from its noob tables, or from the raw
/// tables when `use_noob` is false.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueCalculator {
    pub beta_offset: IntensityType,
    pub betas:       bool,
    pub m_values:    bool,
    pub use_noob:    bool,
}

impl Default for ValueCalculator {
    fn default() -> Self {
        Self {
            beta_offset: 100.0,
            betas:       true,
            m_values:    true,
            use_noob:    true,
        }
    }
}

impl ValueCalculator {
    fn inputs(&self) -> (Stage, Stage) {
        if self.use_noob {
            (Stage::NoobMethylated, Stage::NoobUnmethylated)
        }
        else {
            (Stage::RawMethylated, Stage::RawUnmethylated)
        }
    }

    /// Adds the requested value stages to `container`, CpG and SNP probes
    /// alike.
    pub fn apply(
        &self,
        container: &mut SampleDataContainer,
    ) -> ProcessingResult<()> {
        let (meth_stage, unmeth_stage) = self.inputs();

        let meth = container.require(meth_stage, Stage::Beta)?;
        let unmeth = container.require(unmeth_stage, Stage::Beta)?;
        let beta = if self.betas {
            Some(beta_table(meth, unmeth, self.beta_offset)?)
        }
        else {
            None
        };
        let m = if self.m_values {
            Some(m_value_table(meth, unmeth)?)
        }
        else {
            None
        };

        let snp_beta = match (
            container.snp_table(meth_stage),
            container.snp_table(unmeth_stage),
        ) {
            (Some(m), Some(u)) if self.betas => {
                Some(beta_table(m, u, self.beta_offset)?)
            },
            _ => None,
        };

        if let Some((table, n_clamped)) = beta {
            if n_clamped > 0 {
                warn!(
                    "Sample {}: {} beta values clamped to [0, 1]",
                    container.sample_id(),
                    n_clamped
                );
                container.push_warning(SampleWarning::BetaClamped { count: n_clamped });
            }
            debug!(
                "Sample {}: {} beta values missing",
                container.sample_id(),
                table.n_missing()
            );
            container.add_stage_result(Stage::Beta, table)?;
        }
        if let Some(table) = m {
            container.add_stage_result(Stage::MValue, table)?;
        }
        if let Some((table, _)) = snp_beta {
            container.add_snp_stage_result(Stage::Beta, table)?;
        }
        Ok(())
    }
}
