//! Probe layout of an array, built once per manifest and shared read-only by
//! every sample of a run.

use std::sync::Arc;

use arcstr::ArcStr;
use hashbrown::HashMap;
use itertools::Itertools;
use log::{
    debug,
    info,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::enums::{
    Allele,
    Channel,
    Chemistry,
};
use super::probe_table::ProbeIndex;
use super::typedef::{
    ProbeAddress,
    ProbeId,
};
use crate::errors::ManifestIntegrityError;

/// One manifest row: a single bead address and what it measures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub address:       ProbeAddress,
    pub probe_id:      ProbeId,
    pub chemistry:     Chemistry,
    pub channel:       Channel,
    pub allele:        Allele,
    #[serde(default)]
    pub control_group: Option<String>,
    #[serde(default)]
    pub snp:           bool,
}

impl ProbeRecord {
    pub fn new(
        address: ProbeAddress,
        probe_id: &str,
        chemistry: Chemistry,
        allele: Allele,
    ) -> Self {
        Self {
            address,
            probe_id: ProbeId::from(probe_id),
            chemistry,
            channel: chemistry.expected_channel(),
            allele,
            control_group: None,
            snp: false,
        }
    }

    pub fn control(
        address: ProbeAddress,
        probe_id: &str,
        group: &str,
    ) -> Self {
        Self {
            control_group: Some(group.to_string()),
            ..Self::new(address, probe_id, Chemistry::Control, Allele::Both)
        }
    }

    pub fn with_snp(
        mut self,
        snp: bool,
    ) -> Self {
        self.snp = snp;
        self
    }

    pub fn with_channel(
        mut self,
        channel: Channel,
    ) -> Self {
        self.channel = channel;
        self
    }

    fn validate(&self) -> Result<(), ManifestIntegrityError> {
        let expected = self.chemistry.expected_channel();
        if self.channel != expected {
            return Err(ManifestIntegrityError::ChannelMismatch {
                address: self.address,
                probe_id: self.probe_id.clone(),
                chemistry: self.chemistry,
                channel: self.channel,
                expected,
            });
        }
        let allele_ok = match self.chemistry {
            Chemistry::TypeIRed | Chemistry::TypeIGreen => {
                self.allele != Allele::Both
            },
            Chemistry::TypeII | Chemistry::Control => self.allele == Allele::Both,
        };
        if !allele_ok {
            return Err(ManifestIntegrityError::AlleleMismatch {
                address:   self.address,
                probe_id:  self.probe_id.clone(),
                chemistry: self.chemistry,
                allele:    self.allele,
            });
        }
        match (&self.chemistry, &self.control_group) {
            (Chemistry::Control, None) => {
                Err(ManifestIntegrityError::MissingControlGroup {
                    address:  self.address,
                    probe_id: self.probe_id.clone(),
                })
            },
            (Chemistry::Control, Some(_)) | (_, None) => Ok(()),
            (_, Some(group)) => {
                Err(ManifestIntegrityError::UnexpectedControlGroup {
                    address:  self.address,
                    probe_id: self.probe_id.clone(),
                    group:    group.clone(),
                })
            },
        }
    }
}

/// How the methylated and unmethylated signal of a probe is read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDesign {
    /// Single address; methylated on green, unmethylated on red.
    TypeII { address: ProbeAddress },
    /// Two addresses read on the same channel. An address the manifest does
    /// not declare is `None`.
    TypeI {
        channel:      Channel,
        methylated:   Option<ProbeAddress>,
        unmethylated: Option<ProbeAddress>,
    },
}

impl ProbeDesign {
    pub fn addresses(&self) -> impl Iterator<Item = ProbeAddress> {
        let (a, b) = match *self {
            ProbeDesign::TypeII { address } => (Some(address), None),
            ProbeDesign::TypeI {
                methylated,
                unmethylated,
                ..
            } => (methylated, unmethylated),
        };
        a.into_iter().chain(b)
    }

    /// Channel carrying the methylated signal.
    pub fn methylated_channel(&self) -> Channel {
        match self {
            ProbeDesign::TypeII { .. } => Channel::Green,
            ProbeDesign::TypeI { channel, .. } => *channel,
        }
    }

    /// Channel carrying the unmethylated signal.
    pub fn unmethylated_channel(&self) -> Channel {
        match self {
            ProbeDesign::TypeII { .. } => Channel::Red,
            ProbeDesign::TypeI { channel, .. } => *channel,
        }
    }
}

/// Classification of a resolved address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub probe_id:  ProbeId,
    pub chemistry: Chemistry,
    pub allele:    Allele,
    pub snp:       bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlProbe {
    pub address:  ProbeAddress,
    pub probe_id: ProbeId,
    pub group:    ArcStr,
}

/// A set of probes sharing an index, with one design per position.
#[derive(Debug, Clone, Default)]
pub struct ProbeSet {
    index:   Arc<ProbeIndex>,
    designs: Vec<ProbeDesign>,
}

impl ProbeSet {
    pub fn index(&self) -> &Arc<ProbeIndex> {
        &self.index
    }

    pub fn designs(&self) -> &[ProbeDesign] {
        &self.designs
    }

    pub fn len(&self) -> usize {
        self.designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.designs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProbeId, &ProbeDesign)> {
        self.index.ids().iter().zip(self.designs.iter())
    }
}

/// Immutable lookup from probe address to chemistry, and from probe
/// identifier to its read-out design.
#[derive(Debug, Clone)]
pub struct ProbeLayoutIndex {
    addresses: HashMap<ProbeAddress, AddressEntry>,
    cpg:       ProbeSet,
    snp:       ProbeSet,
    controls:  Vec<ControlProbe>,
}

struct DesignBuilder {
    chemistry:    Chemistry,
    snp:          bool,
    methylated:   Option<ProbeAddress>,
    unmethylated: Option<ProbeAddress>,
}

impl DesignBuilder {
    fn set(
        &mut self,
        probe_id: &ProbeId,
        allele: Allele,
        address: ProbeAddress,
    ) -> Result<(), ManifestIntegrityError> {
        let slot = match allele {
            Allele::Methylated | Allele::Both => &mut self.methylated,
            Allele::Unmethylated => &mut self.unmethylated,
        };
        if let Some(first) = *slot {
            if first != address {
                return Err(ManifestIntegrityError::DuplicateAllele {
                    probe_id: probe_id.clone(),
                    allele,
                    first,
                    second: address,
                });
            }
        }
        *slot = Some(address);
        Ok(())
    }

    fn finish(self) -> ProbeDesign {
        match self.chemistry {
            Chemistry::TypeII | Chemistry::Control => {
                ProbeDesign::TypeII {
                    address: self.methylated.unwrap_or_default(),
                }
            },
            chem => {
                ProbeDesign::TypeI {
                    channel:      chem.expected_channel(),
                    methylated:   self.methylated,
                    unmethylated: self.unmethylated,
                }
            },
        }
    }
}

impl ProbeLayoutIndex {
    /// Builds the index from manifest records.
    pub fn try_from_records<I>(records: I) -> Result<Self, ManifestIntegrityError>
    where
        I: IntoIterator<Item = ProbeRecord>, {
        let mut addresses: HashMap<ProbeAddress, AddressEntry> = HashMap::new();
        let mut builders: Vec<(ProbeId, DesignBuilder)> = Vec::new();
        let mut builder_pos: HashMap<ProbeId, usize> = HashMap::new();
        let mut controls = Vec::new();
        let mut n_records = 0usize;
        let mut n_duplicates = 0usize;

        for record in records {
            n_records += 1;
            record.validate()?;

            let entry = AddressEntry {
                probe_id:  record.probe_id.clone(),
                chemistry: record.chemistry,
                allele:    record.allele,
                snp:       record.snp,
            };
            if let Some(existing) = addresses.get(&record.address) {
                if *existing == entry {
                    n_duplicates += 1;
                    continue;
                }
                return Err(ManifestIntegrityError::ConflictingAddress {
                    address: record.address,
                    first:   existing.probe_id.clone(),
                    second:  record.probe_id.clone(),
                });
            }
            addresses.insert(record.address, entry);

            if record.chemistry == Chemistry::Control {
                controls.push(ControlProbe {
                    address:  record.address,
                    probe_id: record.probe_id,
                    group:    ArcStr::from(
                        record.control_group.unwrap_or_default(),
                    ),
                });
                continue;
            }

            let pos = *builder_pos
                .entry(record.probe_id.clone())
                .or_insert_with(|| {
                    builders.push((record.probe_id.clone(), DesignBuilder {
                        chemistry:    record.chemistry,
                        snp:          record.snp,
                        methylated:   None,
                        unmethylated: None,
                    }));
                    builders.len() - 1
                });
            let (probe_id, builder) = &mut builders[pos];
            if builder.chemistry != record.chemistry {
                return Err(ManifestIntegrityError::ConflictingChemistry {
                    probe_id: probe_id.clone(),
                    first:    builder.chemistry,
                    second:   record.chemistry,
                });
            }
            builder.set(probe_id, record.allele, record.address)?;
        }

        if n_records == 0 {
            return Err(ManifestIntegrityError::Empty);
        }
        if n_duplicates > 0 {
            debug!("Skipped {} duplicate manifest records", n_duplicates);
        }

        let (snp_builders, cpg_builders): (Vec<_>, Vec<_>) =
            builders.into_iter().partition(|(_, b)| b.snp);
        let cpg = Self::probe_set(cpg_builders);
        let snp = Self::probe_set(snp_builders);

        info!(
            "Built probe layout: {} CpG probes, {} SNP probes, {} control \
             probes, {} addresses",
            cpg.len(),
            snp.len(),
            controls.len(),
            addresses.len()
        );

        Ok(Self {
            addresses,
            cpg,
            snp,
            controls,
        })
    }

    fn probe_set(builders: Vec<(ProbeId, DesignBuilder)>) -> ProbeSet {
        let (ids, designs): (Vec<_>, Vec<_>) = builders
            .into_iter()
            .map(|(id, builder)| (id, builder.finish()))
            .unzip();
        // Identifiers were deduplicated while grouping records.
        let index = ProbeIndex::try_new(ids).unwrap_or_default();
        ProbeSet {
            index: Arc::new(index),
            designs,
        }
    }

    pub fn resolve(
        &self,
        address: ProbeAddress,
    ) -> Option<&AddressEntry> {
        self.addresses.get(&address)
    }

    pub fn n_addresses(&self) -> usize {
        self.addresses.len()
    }

    /// CpG probes; the index every derived table is aligned to.
    pub fn cpg(&self) -> &ProbeSet {
        &self.cpg
    }

    pub fn snp(&self) -> &ProbeSet {
        &self.snp
    }

    pub fn probe_index(&self) -> &Arc<ProbeIndex> {
        &self.cpg.index
    }

    pub fn controls(&self) -> &[ControlProbe] {
        &self.controls
    }

    /// Control probes grouped by their control-group label.
    pub fn control_groups(&self) -> Vec<(ArcStr, Vec<&ControlProbe>)> {
        self.controls
            .iter()
            .into_group_map_by(|c| c.group.clone())
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .collect_vec()
    }

    /// Addresses whose `channel` reading carries only background: the
    /// opposite channel of every Infinium I CpG probe designed on the other
    /// channel.
    pub fn out_of_band(
        &self,
        channel: Channel,
    ) -> impl Iterator<Item = ProbeAddress> + '_ {
        self.cpg
            .designs
            .iter()
            .filter(move |design| {
                matches!(design, ProbeDesign::TypeI { channel: c, .. } if c.opposite() == channel)
            })
            .flat_map(|design| design.addresses())
    }

    /// Normalization control probes reporting on `channel`.
    pub fn normalization_controls(
        &self,
        channel: Channel,
    ) -> impl Iterator<Item = &ControlProbe> + '_ {
        let labels: &'static [&'static str] = match channel {
            Channel::Red => &["NORM_A", "NORM_T"],
            Channel::Green => &["NORM_C", "NORM_G"],
            Channel::Both => &[],
        };
        self.controls.iter().filter(move |c| {
            labels
                .iter()
                .any(|l| c.group.eq_ignore_ascii_case(l))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_manifest() -> Vec<ProbeRecord> {
        vec![
            ProbeRecord::new(10, "cg01", Chemistry::TypeII, Allele::Both),
            ProbeRecord::new(20, "cg02", Chemistry::TypeIRed, Allele::Unmethylated),
            ProbeRecord::new(21, "cg02", Chemistry::TypeIRed, Allele::Methylated),
            ProbeRecord::new(30, "cg03", Chemistry::TypeIGreen, Allele::Unmethylated),
            ProbeRecord::new(31, "cg03", Chemistry::TypeIGreen, Allele::Methylated),
            ProbeRecord::new(40, "rs01", Chemistry::TypeII, Allele::Both).with_snp(true),
            ProbeRecord::control(50, "NORM_A.1", "NORM_A"),
            ProbeRecord::control(51, "STAINING.1", "STAINING"),
        ]
    }

    #[test]
    fn test_build_classifies_probes() {
        let layout = ProbeLayoutIndex::try_from_records(small_manifest()).unwrap();

        assert_eq!(layout.cpg().len(), 3);
        assert_eq!(layout.snp().len(), 1);
        assert_eq!(layout.controls().len(), 2);
        assert_eq!(layout.n_addresses(), 8);
        assert_eq!(layout.cpg().designs()[1], ProbeDesign::TypeI {
            channel:      Channel::Red,
            methylated:   Some(21),
            unmethylated: Some(20),
        });
        assert_eq!(
            layout.resolve(31).map(|e| e.allele),
            Some(Allele::Methylated)
        );
        assert!(layout.resolve(99).is_none());
    }

    #[test]
    fn test_out_of_band_addresses() {
        let layout = ProbeLayoutIndex::try_from_records(small_manifest()).unwrap();
        let red_oob = layout.out_of_band(Channel::Red).sorted().collect_vec();
        let green_oob = layout.out_of_band(Channel::Green).sorted().collect_vec();
        assert_eq!(red_oob, vec![30, 31]);
        assert_eq!(green_oob, vec![20, 21]);
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let mut records = small_manifest();
        records.push(
            ProbeRecord::new(60, "cg09", Chemistry::TypeIRed, Allele::Methylated)
                .with_channel(Channel::Green),
        );
        assert!(matches!(
            ProbeLayoutIndex::try_from_records(records),
            Err(ManifestIntegrityError::ChannelMismatch { address: 60, .. })
        ));
    }

    #[test]
    fn test_conflicting_address_rejected() {
        let mut records = small_manifest();
        records.push(ProbeRecord::new(10, "cg99", Chemistry::TypeII, Allele::Both));
        assert!(matches!(
            ProbeLayoutIndex::try_from_records(records),
            Err(ManifestIntegrityError::ConflictingAddress { address: 10, .. })
        ));
    }

    #[test]
    fn test_exact_duplicate_tolerated() {
        let mut records = small_manifest();
        records.push(ProbeRecord::new(10, "cg01", Chemistry::TypeII, Allele::Both));
        let layout = ProbeLayoutIndex::try_from_records(records).unwrap();
        assert_eq!(layout.cpg().len(), 3);
    }

    #[test]
    fn test_duplicate_allele_rejected() {
        let mut records = small_manifest();
        records.push(ProbeRecord::new(22, "cg02", Chemistry::TypeIRed, Allele::Methylated));
        assert!(matches!(
            ProbeLayoutIndex::try_from_records(records),
            Err(ManifestIntegrityError::DuplicateAllele { first: 21, second: 22, .. })
        ));
    }

    #[test]
    fn test_control_group_required() {
        let mut record = ProbeRecord::control(70, "EXT.1", "EXTENSION");
        record.control_group = None;
        assert!(matches!(
            ProbeLayoutIndex::try_from_records(vec![record]),
            Err(ManifestIntegrityError::MissingControlGroup { .. })
        ));
        assert_eq!(
            ProbeLayoutIndex::try_from_records(Vec::new()).unwrap_err(),
            ManifestIntegrityError::Empty
        );
    }

    #[test]
    fn test_normalization_controls() {
        let layout = ProbeLayoutIndex::try_from_records(small_manifest()).unwrap();
        assert_eq!(layout.normalization_controls(Channel::Red).count(), 1);
        assert_eq!(layout.normalization_controls(Channel::Green).count(), 0);
        let groups = layout.control_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.as_str(), "NORM_A");
    }
}
