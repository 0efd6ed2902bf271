#![allow(dead_code)]
use std::collections::HashMap;

use methprep::prelude::*;
use rand::rngs::StdRng;
use rand::{
    Rng,
    SeedableRng,
};
use rand_distr::{
    Distribution,
    Normal,
};

/// Generates a synthetic array: a manifest with every probe chemistry and
/// per-sample intensities following a normal background plus signal model.
pub struct DemoArrayBuilder {
    n_type_i:         usize,
    n_type_ii:        usize,
    n_snp:            usize,
    green_background: (f64, f64),
    red_background:   (f64, f64),
    seed:             u64,
}

impl DemoArrayBuilder {
    pub fn new(
        n_type_i: usize,
        n_type_ii: usize,
        seed: u64,
    ) -> Self {
        Self {
            n_type_i,
            n_type_ii,
            n_snp: 10,
            green_background: (300.0, 40.0),
            red_background: (250.0, 35.0),
            seed,
        }
    }

    pub fn records(&self) -> Vec<ProbeRecord> {
        let mut records = Vec::new();
        let mut address: ProbeAddress = 1000;
        let mut next = || {
            address += 1;
            address
        };

        for (chem, prefix) in [
            (Chemistry::TypeIRed, "cgR"),
            (Chemistry::TypeIGreen, "cgG"),
        ] {
            for i in 0..self.n_type_i {
                let id = format!("{}{:05}", prefix, i);
                records.push(ProbeRecord::new(next(), &id, chem, Allele::Unmethylated));
                records.push(ProbeRecord::new(next(), &id, chem, Allele::Methylated));
            }
        }
        for i in 0..self.n_type_ii {
            let id = format!("cgII{:05}", i);
            records.push(ProbeRecord::new(next(), &id, Chemistry::TypeII, Allele::Both));
        }
        for i in 0..self.n_snp {
            let id = format!("rs{:04}", i);
            records.push(
                ProbeRecord::new(next(), &id, Chemistry::TypeII, Allele::Both).with_snp(true),
            );
        }
        for group in ["NORM_A", "NORM_T", "NORM_C", "NORM_G", "STAINING", "BISULFITE"] {
            for k in 1..=3 {
                let id = format!("{}.{}", group, k);
                records.push(ProbeRecord::control(next(), &id, group));
            }
        }
        records
    }

    pub fn layout(&self) -> ProbeLayoutIndex {
        ProbeLayoutIndex::try_from_records(self.records()).unwrap()
    }

    /// Addresses of every Infinium I probe.
    pub fn type_i_addresses(&self) -> Vec<ProbeAddress> {
        self.records()
            .into_iter()
            .filter(|r| r.chemistry.is_type_i())
            .map(|r| r.address)
            .collect()
    }

    pub fn address_of(
        &self,
        probe_id: &str,
    ) -> ProbeAddress {
        self.records()
            .into_iter()
            .find(|r| r.probe_id.as_str() == probe_id)
            .map(|r| r.address)
            .unwrap()
    }

    /// Intensities of one sample. Samples differ in background draws and in
    /// their red dye efficiency.
    pub fn sample_intensities(
        &self,
        sample_idx: usize,
    ) -> Vec<(ProbeAddress, ChannelIntensity)> {
        let records = self.records();

        let mut truth_rng = StdRng::seed_from_u64(self.seed);
        let mut truth: HashMap<ProbeId, (f64, f64)> = HashMap::new();
        for record in records.iter() {
            truth
                .entry(record.probe_id.clone())
                .or_insert_with(|| {
                    (
                        truth_rng.gen_range(0.0..1.0),
                        truth_rng.gen_range(2000.0..8000.0),
                    )
                });
        }

        let mut rng = StdRng::seed_from_u64(self.seed + 1 + sample_idx as u64);
        let green_bg = Normal::new(self.green_background.0, self.green_background.1).unwrap();
        let red_bg = Normal::new(self.red_background.0, self.red_background.1).unwrap();
        let dye_red = 0.7 + 0.1 * sample_idx as f64;

        records
            .iter()
            .map(|record| {
                let green = green_bg.sample(&mut rng).max(0.0);
                let red = red_bg.sample(&mut rng).max(0.0);
                let (p, signal) = truth[&record.probe_id];
                let allele_signal = match record.allele {
                    Allele::Methylated => p * signal,
                    Allele::Unmethylated => (1.0 - p) * signal,
                    Allele::Both => signal,
                };
                let value = match record.chemistry {
                    Chemistry::TypeIRed => (green, red + allele_signal * dye_red),
                    Chemistry::TypeIGreen => (green + allele_signal, red),
                    Chemistry::TypeII => {
                        (green + p * signal, red + (1.0 - p) * signal * dye_red)
                    },
                    Chemistry::Control => {
                        let group = record.control_group.as_deref().unwrap_or_default();
                        match group {
                            "NORM_A" | "NORM_T" => (green, red + 5000.0 * dye_red),
                            "NORM_C" | "NORM_G" => (green + 5000.0, red),
                            _ => (green + 1000.0, red + 1000.0 * dye_red),
                        }
                    },
                };
                (record.address, ChannelIntensity::new(value.0, value.1))
            })
            .collect()
    }

    pub fn sample(
        &self,
        sample_idx: usize,
    ) -> Sample {
        Sample::new(
            &format!("20400000{}", sample_idx / 4),
            &format!("R0{}C01", sample_idx % 4 + 1),
        )
        .with_name(&format!("Sample{}", sample_idx + 1))
        .with_meta(
            "Sample_Group",
            if sample_idx % 2 == 0 {
                "case"
            }
            else {
                "control"
            },
        )
    }

    pub fn source(
        &self,
        n_samples: usize,
    ) -> MemorySource {
        (0..n_samples).fold(MemorySource::new(self.records()), |source, idx| {
            source.with_sample(self.sample(idx), self.sample_intensities(idx))
        })
    }
}
