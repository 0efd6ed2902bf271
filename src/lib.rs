//! # methprep
//!
//! `methprep` turns the decoded green/red intensities of Illumina Infinium
//! methylation arrays into normalized methylation estimates. Each sample is
//! taken through probe-type combination, normal-exponential out-of-band
//! ("noob") background and dye-bias correction, beta and M value computation
//! and control probe extraction, then handed to an exporter.
//!
//! ## Structure
//!
//! * [`data_structs`]: the probe layout of an array, raw signal tables,
//!   per-probe value tables aligned to a shared probe index and the
//!   per-sample [`SampleDataContainer`].
//! * [`tools`]: the processing stages and the batch [`Pipeline`].
//! * [`io`]: collaborator traits (manifest, intensities, sample sheet,
//!   exporter) with CSV and in-memory implementations.
//! * [`errors`]: the error taxonomy. Manifest and contract errors abort a run,
//!   insufficient out-of-band data only skips the affected sample.
//! * [`utils`]: robust statistics and the crate thread pool.
//!
//! Number of threads used for parallel sample processing can be configured
//! with the `METHPREP_NUM_THREADS` environment variable.
//!
//! ## Usage
//!
//! ```no_run
//! use methprep::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let manifest = CsvManifest::new("manifest.csv");
//!     let sheet = CsvSampleSheet::new("samplesheet.csv").samples()?;
//!     let intensities = CsvIntensities::new("intensities/");
//!     let mut exporter = CsvExporter::try_new("out/")?;
//!
//!     let config = PipelineConfig::default()
//!         .with_batch_size(Some(8))
//!         .with_save_control(true);
//!     let pipeline = Pipeline::from_manifest(config, &manifest)?;
//!     let report = pipeline.run(&sheet, &intensities, &mut exporter)?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```
//!
//! [`SampleDataContainer`]: data_structs::container::SampleDataContainer
//! [`Pipeline`]: tools::pipeline::Pipeline
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod data_structs;
pub mod errors;
pub mod io;
pub mod prelude;
pub mod tools;
pub mod utils;
