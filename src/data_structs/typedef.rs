//! Type aliases shared by the layout, signal and derived tables.

use arcstr::ArcStr;

/// Physical bead address reading out one green and one red intensity.
pub type ProbeAddress = u32;
/// Probe identifier as written in the manifest (e.g. `cg00035864`).
pub type ProbeId = ArcStr;
/// Channel intensity and every value derived from it.
pub type IntensityType = f64;
/// A derived value; `None` marks a missing probe.
pub type MaybeValue = Option<IntensityType>;

/// Ceiling of the scanner's 16-bit intensity readout.
pub const SATURATION_CEILING: IntensityType = 65535.0;
/// Floor applied to corrected intensities so ratios stay defined.
pub const INTENSITY_EPSILON: IntensityType = 1e-6;
