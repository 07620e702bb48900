use crate::errors::{PipelineError, Result};

/// Decoded pixel buffer with explicit dimensions and channel count.
///
/// Single-channel rasters are grayscale; three-channel rasters are BGR
/// interleaved, matching the capture pipeline. The buffer length always
/// equals `width * height * channels` — this is checked at construction and
/// cannot be broken afterwards because the buffer is never exposed mutably.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if channels != 1 && channels != 3 {
            return Err(PipelineError::UnsupportedChannels { channels });
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(PipelineError::InvalidRaster {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Re-checks the length invariant. Unreachable from `new`-constructed
    /// values; callers on the compute path verify it anyway before trusting
    /// dimensions for indexing.
    pub fn validate(&self) -> Result<()> {
        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.data.len() != expected {
            return Err(PipelineError::InvalidRaster {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_construction() {
        let raster = Raster::new(2, 2, 1, vec![0, 0, 255, 255]).unwrap();
        assert_eq!(raster.width(), 2);
        assert_eq!(raster.height(), 2);
        assert_eq!(raster.pixel_count(), 4);
        assert!(raster.validate().is_ok());
    }

    #[test]
    fn test_buffer_length_mismatch() {
        let err = Raster::new(2, 2, 3, vec![0; 11]).unwrap_err();
        match err {
            PipelineError::InvalidRaster { expected, actual } => {
                assert_eq!(expected, 12);
                assert_eq!(actual, 11);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unsupported_channel_count() {
        let err = Raster::new(1, 1, 4, vec![0; 4]).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_CHANNELS");
    }
}
