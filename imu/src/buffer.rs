//! Fixed-capacity columnar sample storage.
//!
//! All memory is allocated up front so that appending inside the timed loop
//! never allocates.

use crate::error::{AcquisitionError, ConfigError};
use crate::record::{ChannelColumn, SessionRecord};
use imu_traits::{SensorSource, Vector3};
use std::collections::HashSet;
use thiserror::Error;

const BYTES_PER_CHANNEL_SAMPLE: usize = 3 * std::mem::size_of::<f32>();

/// Returned by [`SampleBuffer::append`] when every slot is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sample buffer is full ({capacity} samples)")]
pub struct CapacityExceeded {
    pub capacity: usize,
}

/// Ordered, unique channel names. A row passed to the buffer lists one
/// vector per channel in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    names: Vec<String>,
}

impl ChannelLayout {
    pub fn new<I, S>(names: I) -> Result<Self, AcquisitionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(AcquisitionError::DuplicateChannel(name.clone()));
            }
        }
        Ok(Self { names })
    }

    /// `<source>_<kind>` for every declared channel of every source, in source order.
    pub fn from_sources<S: SensorSource>(sources: &[S]) -> Result<Self, AcquisitionError> {
        if sources.is_empty() {
            return Err(AcquisitionError::NoSources);
        }
        let mut names = Vec::new();
        for source in sources {
            if source.channels().is_empty() {
                return Err(AcquisitionError::EmptySource(source.name().to_string()));
            }
            names.extend(source.channels().iter().map(|k| k.channel_name(source.name())));
        }
        Self::new(names)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub struct SampleBuffer {
    layout: ChannelLayout,
    capacity: usize,
    valid_length: usize,
    timestamps: Vec<f64>,
    columns: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Allocates `capacity` zeroed timestamps and `capacity × 3` zeroed
    /// scalars per channel.
    ///
    /// Fails when the arrays could not be addressed at all; the limit an
    /// [`AcquisitionConfig`](crate::AcquisitionConfig) enforces is far lower.
    pub fn new(capacity: usize, layout: ChannelLayout) -> Result<Self, AcquisitionError> {
        let too_large = || ConfigError::CapacityTooLarge {
            requested: capacity as f64,
            limit: isize::MAX as usize / BYTES_PER_CHANNEL_SAMPLE,
        };
        let scalars = capacity.checked_mul(3).ok_or_else(too_large)?;
        let row_bytes = layout
            .len()
            .checked_mul(BYTES_PER_CHANNEL_SAMPLE)
            .and_then(|b| b.checked_add(std::mem::size_of::<f64>()))
            .ok_or_else(too_large)?;
        match capacity.checked_mul(row_bytes) {
            Some(bytes) if bytes <= isize::MAX as usize => {}
            _ => return Err(too_large().into()),
        }

        let columns = (0..layout.len()).map(|_| vec![0.0f32; scalars]).collect();
        Ok(Self {
            layout,
            capacity,
            valid_length: 0,
            timestamps: vec![0.0; capacity],
            columns,
        })
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.valid_length
    }

    pub fn is_empty(&self) -> bool {
        self.valid_length == 0
    }

    pub fn is_full(&self) -> bool {
        self.valid_length == self.capacity
    }

    /// Writes one sample at the cursor and advances it.
    ///
    /// `row` holds one vector per layout channel, in layout order. A full
    /// buffer is left untouched.
    ///
    /// # Panics
    /// If `row.len()` differs from the layout width. This is checked before
    /// anything is written.
    pub fn append(&mut self, timestamp: f64, row: &[Vector3]) -> Result<(), CapacityExceeded> {
        assert_eq!(
            row.len(),
            self.columns.len(),
            "row width does not match channel layout"
        );
        if self.is_full() {
            return Err(CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let i = self.valid_length;
        self.timestamps[i] = timestamp;
        for (column, v) in self.columns.iter_mut().zip(row) {
            column[i * 3..i * 3 + 3].copy_from_slice(&v.to_array());
        }
        self.valid_length += 1;
        Ok(())
    }

    /// Consumes the buffer, keeping only `[0, len())` of every array.
    pub fn trim(self) -> SessionRecord {
        let n = self.valid_length;
        let mut timestamps = self.timestamps;
        timestamps.truncate(n);
        let channels = self
            .layout
            .names
            .into_iter()
            .zip(self.columns)
            .map(|(name, mut values)| {
                values.truncate(n * 3);
                ChannelColumn::new(name, values)
            })
            .collect();
        SessionRecord::new(timestamps, channels)
    }
}
