//! Transformation parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::encoding::EncodingProfile;
use crate::error::ModelError;

/// Absolute difference in width/height ratio below which a source is left uncropped.
pub const ASPECT_TOLERANCE: f64 = 0.1;

/// Default maximum length of a short, in seconds.
pub const DEFAULT_MAX_DURATION_SECS: f64 = 60.0;

/// Output aspect ratio as a `width:height` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Vertical short (9:16)
    pub const PORTRAIT: AspectRatio = AspectRatio {
        width: 9,
        height: 16,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the aspect ratio as a decimal (0.0 when the height is zero).
    pub fn as_f64(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| AspectRatioParseError::InvalidFormat(s.to_string()))?;

        let width = w
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(w.to_string()))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(h.to_string()))?;

        if width == 0 || height == 0 {
            return Err(AspectRatioParseError::ZeroValue);
        }

        Ok(AspectRatio { width, height })
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Invalid number in aspect ratio: {0}")]
    InvalidNumber(String),
    #[error("Aspect ratio values must be greater than zero")]
    ZeroValue,
}

/// Parameters for one shorts transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransformSpec {
    /// Output is hard-cut at this many seconds
    pub max_duration_secs: f64,
    /// Output aspect ratio
    pub target_aspect: AspectRatio,
    /// Encoder settings
    #[serde(default)]
    pub encoding: EncodingProfile,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            target_aspect: AspectRatio::PORTRAIT,
            encoding: EncodingProfile::default(),
        }
    }
}

impl TransformSpec {
    pub fn new(max_duration_secs: f64, target_aspect: AspectRatio) -> Self {
        Self {
            max_duration_secs,
            target_aspect,
            encoding: EncodingProfile::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingProfile) -> Self {
        self.encoding = encoding;
        self
    }

    /// Target ratio as a decimal.
    pub fn target_ratio(&self) -> f64 {
        self.target_aspect.as_f64()
    }

    /// Require a positive finite duration and ratio.
    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(ModelError::invalid_spec(format!(
                "max duration must be positive, got {}",
                self.max_duration_secs
            )));
        }
        if self.target_aspect.width == 0 || self.target_aspect.height == 0 {
            return Err(ModelError::invalid_spec(format!(
                "target aspect ratio must be positive, got {}",
                self.target_aspect
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::PORTRAIT);
        assert_eq!(" 4 : 5 ".parse::<AspectRatio>().unwrap(), AspectRatio::new(4, 5));
        assert!(matches!(
            "916".parse::<AspectRatio>(),
            Err(AspectRatioParseError::InvalidFormat(_))
        ));
        assert_eq!("0:16".parse::<AspectRatio>(), Err(AspectRatioParseError::ZeroValue));
    }

    #[test]
    fn test_aspect_ratio_decimal() {
        assert!((AspectRatio::PORTRAIT.as_f64() - 0.5625).abs() < 1e-9);
        assert_eq!(AspectRatio::new(9, 0).as_f64(), 0.0);
    }

    #[test]
    fn test_default_spec_is_valid() {
        let spec = TransformSpec::default();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.max_duration_secs, 60.0);
        assert_eq!(spec.target_aspect.to_string(), "9:16");
    }

    #[test]
    fn test_spec_rejects_non_positive_values() {
        assert!(TransformSpec::new(0.0, AspectRatio::PORTRAIT).validate().is_err());
        assert!(TransformSpec::new(-5.0, AspectRatio::PORTRAIT).validate().is_err());
        assert!(TransformSpec::new(f64::NAN, AspectRatio::PORTRAIT).validate().is_err());
        assert!(TransformSpec::new(60.0, AspectRatio::new(0, 16)).validate().is_err());
    }
}
