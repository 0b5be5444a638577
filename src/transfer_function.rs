//! Transfer functions mapping scalar values to opacity.

use std::path::Path;

use crate::{constants::TF_CHANNELS, error::ConfigError};

/// A lookup table of `resolution` RGBA entries indexed by quantized scalar value.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferFunction {
    rgba: Vec<f32>,
    opacity: Vec<f32>,
}

impl TransferFunction {
    /// Create a transfer function from interleaved RGBA values.
    pub fn from_rgba(rgba: Vec<f32>) -> Result<Self, ConfigError> {
        if rgba.is_empty() || rgba.len() % TF_CHANNELS != 0 {
            return Err(ConfigError::MalformedTransferFunction(format!(
                "{} floats is not a positive multiple of {}",
                rgba.len(),
                TF_CHANNELS
            )));
        }

        let opacity = rgba
            .chunks_exact(TF_CHANNELS)
            .map(|entry| entry[TF_CHANNELS - 1])
            .collect();

        Ok(Self { rgba, opacity })
    }

    /// Create a transfer function from an opacity ramp, with black color channels.
    pub fn from_opacity(opacity: &[f32]) -> Result<Self, ConfigError> {
        let rgba = opacity
            .iter()
            .flat_map(|&alpha| [0.0, 0.0, 0.0, alpha])
            .collect();
        Self::from_rgba(rgba)
    }

    /// Decode the binary file image: `resolution * 4` little-endian `f32` values.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() % std::mem::size_of::<f32>() != 0 {
            return Err(ConfigError::MalformedTransferFunction(format!(
                "{} bytes is not a whole number of floats",
                bytes.len()
            )));
        }

        let rgba = bytes
            .chunks_exact(std::mem::size_of::<f32>())
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Self::from_rgba(rgba)
    }

    /// Read a transfer function file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|err| ConfigError::TransferFunctionFile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Number of entries in the table.
    pub fn resolution(&self) -> usize {
        self.opacity.len()
    }

    /// The interleaved RGBA values.
    pub fn rgba(&self) -> &[f32] {
        &self.rgba
    }

    /// The opacity (alpha) channel.
    pub fn opacity_map(&self) -> &[f32] {
        &self.opacity
    }

    /// Opacity of a scalar value.
    ///
    /// The value is quantized as `value * (resolution - 1)` and clamped to the table.
    pub fn opacity(&self, value: f32) -> f32 {
        let last = self.resolution() - 1;
        let index = (value * last as f32) as isize;
        self.opacity[num::clamp(index, 0, last as isize) as usize]
    }
}

#[cfg(test)]
mod test {
    use super::TransferFunction;

    #[test]
    fn test_opacity_lookup() {
        let tf = TransferFunction::from_opacity(&[0.0, 0.1, 0.5, 1.0]).unwrap();

        assert_eq!(4, tf.resolution());
        assert_eq!(0.0, tf.opacity(0.0));
        assert_eq!(0.5, tf.opacity(0.7));
        assert_eq!(1.0, tf.opacity(1.0));
        // Values outside [0, 1] are clamped to the table.
        assert_eq!(1.0, tf.opacity(3.0));
        assert_eq!(0.0, tf.opacity(-1.0));
    }

    #[test]
    fn test_from_bytes() {
        let floats = [0.1f32, 0.2, 0.3, 0.25, 0.5, 0.6, 0.7, 0.75];
        let bytes = floats.iter().flat_map(|f| f.to_le_bytes()).collect::<Vec<_>>();

        let tf = TransferFunction::from_bytes(&bytes).unwrap();

        assert_eq!(2, tf.resolution());
        assert_eq!(&[0.25, 0.75], tf.opacity_map());
    }

    #[test]
    fn test_reject_malformed() {
        assert!(TransferFunction::from_rgba(vec![0.0; 6]).is_err());
        assert!(TransferFunction::from_bytes(&[0u8; 7]).is_err());
        assert!(TransferFunction::from_rgba(Vec::new()).is_err());
    }
}
