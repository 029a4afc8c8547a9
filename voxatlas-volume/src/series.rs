//! Time-series playback by moving frame buffers in and out of a volume.
//!
//! Each frame owns its channel buffers. Showing a frame moves its buffers
//! into the [`Volume`] and moves the buffers that were displayed back into
//! their frame slot, so no two frames ever share a buffer.

use log::debug;

use voxatlas_core::{ChannelBuffer, Error, Result, VolumeDims};

use crate::volume::Volume;

/// Channel buffers of one time point.
#[derive(Debug, Clone)]
pub struct FrameData {
    channels: Vec<ChannelBuffer>,
}

impl FrameData {
    /// Wraps a set of channel buffers.
    #[must_use]
    pub fn new(channels: Vec<ChannelBuffer>) -> Self {
        Self { channels }
    }

    /// Unloaded buffers matching `volume`'s channel names and dimensions.
    #[must_use]
    pub fn empty_like(volume: &Volume) -> Self {
        let dims = volume.dims();
        Self::new(
            volume
                .channel_names()
                .map(|name| ChannelBuffer::new(name, dims))
                .collect(),
        )
    }

    /// Channel buffers in index order.
    #[must_use]
    pub fn channels(&self) -> &[ChannelBuffer] {
        &self.channels
    }

    /// Mutable access for loaders filling the frame.
    #[must_use]
    pub fn channels_mut(&mut self) -> &mut [ChannelBuffer] {
        &mut self.channels
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the frame has no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Shared dimensions, if there is at least one channel.
    #[must_use]
    pub fn dims(&self) -> Option<VolumeDims> {
        self.channels.first().map(ChannelBuffer::dims)
    }

    /// Returns true once every channel holds data.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(ChannelBuffer::is_loaded)
    }

    /// Consumes the frame, returning its buffers.
    #[must_use]
    pub fn into_channels(self) -> Vec<ChannelBuffer> {
        self.channels
    }
}

/// Frames of a time series, one slot per time index.
///
/// The frame currently shown lives inside the [`Volume`]; its slot is empty
/// until another frame replaces it.
#[derive(Debug, Default)]
pub struct TimeSeries {
    frames: Vec<Option<FrameData>>,
    current: Option<usize>,
}

impl TimeSeries {
    /// Creates `len` empty slots with no frame shown.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            frames: std::iter::repeat_with(|| None).take(len).collect(),
            current: None,
        }
    }

    /// Creates `len` empty slots, treating the volume's present data as frame
    /// `current`.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if `current` is not below `len`.
    pub fn with_current(len: usize, current: usize) -> Result<Self> {
        let mut series = Self::new(len);
        series.check_index(current)?;
        series.current = Some(current);
        Ok(series)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.frames.len() {
            Ok(())
        } else {
            Err(Error::ConfigError(format!(
                "frame {index} out of range ({} frames)",
                self.frames.len()
            )))
        }
    }

    /// Number of time points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if there are no time points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame currently held by the volume.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Returns true if frame `index` is stored and ready to show.
    #[must_use]
    pub fn is_ready(&self, index: usize) -> bool {
        self.frames
            .get(index)
            .and_then(Option::as_ref)
            .is_some_and(FrameData::is_loaded)
    }

    /// Stores a frame, returning whatever occupied the slot.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if `index` is out of range or is the
    /// frame currently shown.
    pub fn insert(&mut self, index: usize, frame: FrameData) -> Result<Option<FrameData>> {
        self.check_index(index)?;
        if self.current == Some(index) {
            return Err(Error::ConfigError(format!(
                "frame {index} is displayed and owned by the volume"
            )));
        }
        Ok(self.frames[index].replace(frame))
    }

    /// Stored frame at `index`.
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&FrameData> {
        self.frames.get(index).and_then(Option::as_ref)
    }

    /// Moves frame `index` into `volume` and the displayed buffers back into
    /// their slot. Showing the current frame again is a no-op.
    ///
    /// On error both the series and the volume are unchanged.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the frame is missing, or
    /// [`Error::DimensionMismatch`] if it does not fit the volume.
    pub fn advance_to(&mut self, index: usize, volume: &mut Volume) -> Result<()> {
        self.check_index(index)?;
        if self.current == Some(index) {
            return Ok(());
        }
        let frame = self.frames[index]
            .as_ref()
            .ok_or_else(|| Error::ConfigError(format!("frame {index} is not loaded")))?;
        volume.store().check_compatible(frame.channels())?;

        let Some(frame) = self.frames[index].take() else {
            return Err(Error::ConfigError(format!("frame {index} is not loaded")));
        };
        let previous = volume.swap_channels(frame.channels)?;
        if let Some(current) = self.current {
            self.frames[current] = Some(FrameData::new(previous));
        }
        debug!("time series: showing frame {index} (was {:?})", self.current);
        self.current = Some(index);
        Ok(())
    }

    /// Shows the next frame, wrapping at the end.
    ///
    /// # Errors
    /// See [`Self::advance_to`].
    pub fn advance(&mut self, volume: &mut Volume) -> Result<usize> {
        if self.frames.is_empty() {
            return Err(Error::ConfigError("time series has no frames".to_string()));
        }
        let next = self.current.map_or(0, |c| (c + 1) % self.frames.len());
        self.advance_to(next, volume)?;
        Ok(next)
    }
}
