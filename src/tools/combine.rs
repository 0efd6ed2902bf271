//! Probe-type combiner: turns per-channel readings into methylated and
//! unmethylated signal according to each probe's chemistry.

use log::{
    debug,
    warn,
};

use crate::data_structs::layout::{
    ProbeDesign,
    ProbeSet,
};
use crate::data_structs::probe_table::ProbeTable;
use crate::data_structs::signal::RawSignalTable;
use crate::data_structs::typedef::{
    IntensityType,
    ProbeId,
};
use crate::data_structs::Channel;

/// Methylated and unmethylated signal of one probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethUnmeth {
    pub methylated:   IntensityType,
    pub unmethylated: IntensityType,
}

impl ProbeDesign {
    /// Reads the probe's signal pair from `raw`. `None` when an address is
    /// undeclared or absent from the sample.
    pub fn combine(
        &self,
        raw: &RawSignalTable,
    ) -> Option<MethUnmeth> {
        match *self {
            ProbeDesign::TypeII { address } => {
                raw.get(address).map(|v| {
                    MethUnmeth {
                        methylated:   v.green,
                        unmethylated: v.red,
                    }
                })
            },
            ProbeDesign::TypeI {
                channel,
                methylated,
                unmethylated,
            } => {
                let m = raw.read(methylated?, channel)?;
                let u = raw.read(unmethylated?, channel)?;
                Some(MethUnmeth {
                    methylated:   m,
                    unmethylated: u,
                })
            },
        }
    }

    /// Channel a given side of the pair was read from.
    pub fn channel_of(
        &self,
        methylated: bool,
    ) -> Channel {
        if methylated {
            self.methylated_channel()
        }
        else {
            self.unmethylated_channel()
        }
    }
}

/// Output of the combiner for one probe set.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSignal {
    pub methylated:   ProbeTable,
    pub unmethylated: ProbeTable,
    /// Probes missing one of their paired addresses.
    pub incomplete:   Vec<ProbeId>,
}

/// Combines every probe of `probes`, aligned to the set's index.
pub fn combine_probes(
    probes: &ProbeSet,
    raw: &RawSignalTable,
) -> CombinedSignal {
    let mut meth = Vec::with_capacity(probes.len());
    let mut unmeth = Vec::with_capacity(probes.len());
    let mut incomplete = Vec::new();

    for (probe_id, design) in probes.iter() {
        match design.combine(raw) {
            Some(pair) => {
                meth.push(Some(pair.methylated));
                unmeth.push(Some(pair.unmethylated));
            },
            None => {
                meth.push(None);
                unmeth.push(None);
                incomplete.push(probe_id.clone());
            },
        }
    }

    if !incomplete.is_empty() {
        warn!(
            "Sample {}: {} incomplete probes set to missing (first: {})",
            raw.sample_id(),
            incomplete.len(),
            incomplete[0]
        );
    }
    debug!(
        "Sample {}: combined {} probes",
        raw.sample_id(),
        probes.len() - incomplete.len()
    );

    // Lengths match the index by construction.
    CombinedSignal {
        methylated: ProbeTable::from_fn(probes.index().clone(), |i| meth[i]),
        unmethylated: ProbeTable::from_fn(probes.index().clone(), |i| unmeth[i]),
        incomplete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structs::layout::{
        ProbeLayoutIndex,
        ProbeRecord,
    };
    use crate::data_structs::signal::ChannelIntensity;
    use crate::data_structs::{
        Allele,
        Chemistry,
    };

    fn layout() -> ProbeLayoutIndex {
        ProbeLayoutIndex::try_from_records(vec![
            ProbeRecord::new(10, "cg01", Chemistry::TypeII, Allele::Both),
            ProbeRecord::new(20, "cg02", Chemistry::TypeIRed, Allele::Unmethylated),
            ProbeRecord::new(21, "cg02", Chemistry::TypeIRed, Allele::Methylated),
            ProbeRecord::new(30, "cg03", Chemistry::TypeIGreen, Allele::Unmethylated),
            ProbeRecord::new(31, "cg03", Chemistry::TypeIGreen, Allele::Methylated),
            // Only the U bead is declared.
            ProbeRecord::new(40, "cg04", Chemistry::TypeIGreen, Allele::Unmethylated),
        ])
        .unwrap()
    }

    fn raw() -> RawSignalTable {
        RawSignalTable::from_iter_checked("s1", [
            (10, ChannelIntensity::new(2712.0, 4479.96501260212)),
            (20, ChannelIntensity::new(50.0, 800.0)),
            (21, ChannelIntensity::new(60.0, 3000.0)),
            (30, ChannelIntensity::new(1500.0, 70.0)),
            (31, ChannelIntensity::new(500.0, 80.0)),
            (40, ChannelIntensity::new(900.0, 90.0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_type_ii_reads_both_channels() {
        let combined = combine_probes(layout().cpg(), &raw());
        assert_eq!(combined.methylated.get("cg01"), Some(Some(2712.0)));
        assert_eq!(
            combined.unmethylated.get("cg01"),
            Some(Some(4479.96501260212))
        );
    }

    #[test]
    fn test_type_i_pairs_same_channel() {
        let combined = combine_probes(layout().cpg(), &raw());
        assert_eq!(combined.methylated.get("cg02"), Some(Some(3000.0)));
        assert_eq!(combined.unmethylated.get("cg02"), Some(Some(800.0)));
        assert_eq!(combined.methylated.get("cg03"), Some(Some(500.0)));
        assert_eq!(combined.unmethylated.get("cg03"), Some(Some(1500.0)));
    }

    #[test]
    fn test_incomplete_probe_is_missing_not_zero() {
        let combined = combine_probes(layout().cpg(), &raw());
        assert_eq!(combined.methylated.get("cg04"), Some(None));
        assert_eq!(combined.unmethylated.get("cg04"), Some(None));
        assert_eq!(combined.incomplete, vec![ProbeId::from("cg04")]);
    }

    #[test]
    fn test_address_absent_from_sample() {
        let partial = RawSignalTable::from_iter_checked("s2", [(
            20,
            ChannelIntensity::new(1.0, 2.0),
        )])
        .unwrap();
        let combined = combine_probes(layout().cpg(), &partial);
        assert_eq!(combined.incomplete.len(), 4);
        assert_eq!(combined.methylated.n_missing(), 4);
        assert_eq!(combined.methylated.len(), 4);
    }
}
