use hashbrown::HashMap;
use serde::{
    Deserialize,
    Serialize,
};

use super::enums::Channel;
use super::layout::ProbeLayoutIndex;
use super::typedef::{
    IntensityType,
    ProbeAddress,
    SATURATION_CEILING,
};
use crate::errors::ContractError;

/// Green and red readings of one bead address.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelIntensity {
    pub green: IntensityType,
    pub red:   IntensityType,
}

impl ChannelIntensity {
    pub fn new(
        green: IntensityType,
        red: IntensityType,
    ) -> Self {
        Self { green, red }
    }

    pub fn channel(
        &self,
        channel: Channel,
    ) -> IntensityType {
        match channel {
            Channel::Green => self.green,
            Channel::Red => self.red,
            Channel::Both => self.green + self.red,
        }
    }

    pub fn is_saturated(&self) -> bool {
        self.green >= SATURATION_CEILING || self.red >= SATURATION_CEILING
    }
}

/// Decoded per-sample intensities keyed by bead address. Immutable once
/// loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignalTable {
    sample_id:   String,
    intensities: HashMap<ProbeAddress, ChannelIntensity>,
}

impl RawSignalTable {
    /// Wraps decoded intensities, rejecting negative or non-finite values.
    pub fn try_new(
        sample_id: impl Into<String>,
        intensities: HashMap<ProbeAddress, ChannelIntensity>,
    ) -> Result<Self, ContractError> {
        let sample_id = sample_id.into();
        for (address, value) in intensities.iter() {
            for channel in [Channel::Green, Channel::Red] {
                let v = value.channel(channel);
                if !v.is_finite() || v < 0.0 {
                    return Err(ContractError::InvalidIntensity {
                        sample: sample_id,
                        address: *address,
                        channel,
                        value: v,
                    });
                }
            }
        }
        Ok(Self {
            sample_id,
            intensities,
        })
    }

    pub fn from_iter_checked<I>(
        sample_id: impl Into<String>,
        iter: I,
    ) -> Result<Self, ContractError>
    where
        I: IntoIterator<Item = (ProbeAddress, ChannelIntensity)>, {
        Self::try_new(sample_id, iter.into_iter().collect())
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    pub fn get(
        &self,
        address: ProbeAddress,
    ) -> Option<&ChannelIntensity> {
        self.intensities.get(&address)
    }

    pub fn read(
        &self,
        address: ProbeAddress,
        channel: Channel,
    ) -> Option<IntensityType> {
        self.get(address).map(|v| v.channel(channel))
    }

    pub fn n_saturated(&self) -> usize {
        self.intensities
            .values()
            .filter(|v| v.is_saturated())
            .count()
    }

    /// Fails on the first address the layout does not know.
    pub fn check_resolves(
        &self,
        layout: &ProbeLayoutIndex,
    ) -> Result<(), ContractError> {
        match self
            .intensities
            .keys()
            .find(|address| layout.resolve(**address).is_none())
        {
            Some(address) => {
                Err(ContractError::UnresolvedAddress {
                    sample:  self.sample_id.clone(),
                    address: *address,
                })
            },
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_intensity_rejected() {
        let res = RawSignalTable::from_iter_checked("s1", [
            (1, ChannelIntensity::new(10.0, 20.0)),
            (2, ChannelIntensity::new(10.0, -1.0)),
        ]);
        assert!(matches!(
            res,
            Err(ContractError::InvalidIntensity {
                address: 2,
                channel: Channel::Red,
                ..
            })
        ));
    }

    #[test]
    fn test_zero_and_nan() {
        assert!(RawSignalTable::from_iter_checked("s1", [(
            1,
            ChannelIntensity::new(0.0, 0.0)
        )])
        .is_ok());
        assert!(RawSignalTable::from_iter_checked("s1", [(
            1,
            ChannelIntensity::new(f64::NAN, 0.0)
        )])
        .is_err());
    }

    #[test]
    fn test_read_channels() {
        let table = RawSignalTable::from_iter_checked("s1", [(
            7,
            ChannelIntensity::new(2712.0, SATURATION_CEILING),
        )])
        .unwrap();
        assert_eq!(table.read(7, Channel::Green), Some(2712.0));
        assert_eq!(table.read(7, Channel::Red), Some(SATURATION_CEILING));
        assert_eq!(table.read(8, Channel::Red), None);
        assert_eq!(table.n_saturated(), 1);
    }
}
