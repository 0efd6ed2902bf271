use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{
    Deserialize,
    Serialize,
};

/// Scanner color channel.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, PartialOrd, Ord)]
pub enum Channel {
    /// Green (Cy3) channel.
    Green,
    /// Red (Cy5) channel.
    Red,
    /// Both channels are read out at the address.
    Both,
}

impl Channel {
    /// The channel carrying background for probes designed on `self`.
    pub fn opposite(&self) -> Channel {
        match self {
            Channel::Green => Channel::Red,
            Channel::Red => Channel::Green,
            Channel::Both => Channel::Both,
        }
    }
}

impl Display for Channel {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Channel::Green => write!(f, "Grn"),
            Channel::Red => write!(f, "Red"),
            Channel::Both => write!(f, "Both"),
        }
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grn" | "green" | "g" => Ok(Channel::Green),
            "red" | "r" => Ok(Channel::Red),
            "both" | "" => Ok(Channel::Both),
            other => Err(anyhow!("unknown color channel '{}'", other)),
        }
    }
}

/// Probe chemistry as declared by the manifest.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, PartialOrd, Ord)]
pub enum Chemistry {
    /// Infinium I, signal read on the red channel.
    TypeIRed,
    /// Infinium I, signal read on the green channel.
    TypeIGreen,
    /// Infinium II, methylated on green and unmethylated on red.
    TypeII,
    /// Quality-control probe.
    Control,
}

impl Chemistry {
    /// Channel every record of this chemistry must declare.
    pub fn expected_channel(&self) -> Channel {
        match self {
            Chemistry::TypeIRed => Channel::Red,
            Chemistry::TypeIGreen => Channel::Green,
            Chemistry::TypeII | Chemistry::Control => Channel::Both,
        }
    }

    pub fn is_type_i(&self) -> bool {
        matches!(self, Chemistry::TypeIRed | Chemistry::TypeIGreen)
    }
}

impl Display for Chemistry {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Chemistry::TypeIRed => write!(f, "IR"),
            Chemistry::TypeIGreen => write!(f, "IG"),
            Chemistry::TypeII => write!(f, "II"),
            Chemistry::Control => write!(f, "Control"),
        }
    }
}

impl FromStr for Chemistry {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IR" | "TYPEIRED" | "I-RED" => Ok(Chemistry::TypeIRed),
            "IG" | "TYPEIGREEN" | "I-GREEN" => Ok(Chemistry::TypeIGreen),
            "II" | "TYPEII" => Ok(Chemistry::TypeII),
            "CONTROL" => Ok(Chemistry::Control),
            other => Err(anyhow!("unknown probe chemistry '{}'", other)),
        }
    }
}

/// Which allele an address reads out.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, PartialOrd, Ord)]
pub enum Allele {
    /// The "M" bead of an Infinium I probe.
    Methylated,
    /// The "U" bead of an Infinium I probe.
    Unmethylated,
    /// A single bead carrying both alleles (Infinium II, controls).
    Both,
}

impl Display for Allele {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Allele::Methylated => write!(f, "M"),
            Allele::Unmethylated => write!(f, "U"),
            Allele::Both => write!(f, "MU"),
        }
    }
}

impl FromStr for Allele {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "M" | "METHYLATED" | "B" => Ok(Allele::Methylated),
            "U" | "UNMETHYLATED" | "A" => Ok(Allele::Unmethylated),
            "MU" | "BOTH" | "" => Ok(Allele::Both),
            other => Err(anyhow!("unknown allele '{}'", other)),
        }
    }
}

/// A derived per-probe table produced by one of the pipeline stages.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, PartialOrd, Ord)]
pub enum Stage {
    RawMethylated,
    RawUnmethylated,
    NoobMethylated,
    NoobUnmethylated,
    Beta,
    MValue,
}

impl Stage {
    /// Column name used in export views and run matrices.
    pub fn column_name(&self) -> &'static str {
        match self {
            Stage::RawMethylated => "meth",
            Stage::RawUnmethylated => "unmeth",
            Stage::NoobMethylated => "noob_meth",
            Stage::NoobUnmethylated => "noob_unmeth",
            Stage::Beta => "beta_value",
            Stage::MValue => "m_value",
        }
    }

    /// The state a container reaches once this table is present.
    pub fn produced_in(&self) -> SampleState {
        match self {
            Stage::RawMethylated | Stage::RawUnmethylated => {
                SampleState::Combined
            },
            Stage::NoobMethylated | Stage::NoobUnmethylated => {
                SampleState::Corrected
            },
            Stage::Beta | Stage::MValue => SampleState::Valued,
        }
    }

    /// The other half of a methylated/unmethylated signal pair.
    pub fn partner(&self) -> Option<Stage> {
        match self {
            Stage::RawMethylated => Some(Stage::RawUnmethylated),
            Stage::RawUnmethylated => Some(Stage::RawMethylated),
            Stage::NoobMethylated => Some(Stage::NoobUnmethylated),
            Stage::NoobUnmethylated => Some(Stage::NoobMethylated),
            Stage::Beta | Stage::MValue => None,
        }
    }
}

impl Display for Stage {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.column_name())
    }
}

/// Per-sample processing state. Transitions are strictly ordered.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, PartialOrd, Ord)]
pub enum SampleState {
    Loaded,
    Combined,
    Corrected,
    Valued,
    Exported,
}

impl Display for SampleState {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            SampleState::Loaded => write!(f, "loaded"),
            SampleState::Combined => write!(f, "combined"),
            SampleState::Corrected => write!(f, "corrected"),
            SampleState::Valued => write!(f, "valued"),
            SampleState::Exported => write!(f, "exported"),
        }
    }
}

macro_rules! serde_via_str {
    ($ty: ty) => {
        impl Serialize for $ty {
            fn serialize<S>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer, {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>, {
                let s = String::deserialize(deserializer)?;
                FromStr::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_via_str!(Channel);
serde_via_str!(Chemistry);
serde_via_str!(Allele);
