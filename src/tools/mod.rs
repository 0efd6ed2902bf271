//! Processing stages of the pipeline and their orchestration.
//!
//! - [`combine`]: reads methylated/unmethylated signal pairs according to
//!   each probe's chemistry.
//! - [`noob`]: normal-exponential out-of-band background correction and
//!   dye-bias equalisation.
//! - [`values`]: beta and M values.
//! - [`control`]: control probe extraction.
//! - [`pipeline`]: per-sample state machine, batching and export.
pub mod combine;
pub mod control;
pub mod noob;
pub mod pipeline;
pub mod values;
