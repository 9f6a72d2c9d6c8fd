//! Inference configuration and its joint validity rules
//!
//! The network comes in two backbones. ResNet50 only ships with a 1.0
//! multiplier and output strides 16 or 32; MobileNetV1 ships every
//! multiplier with output strides 8 or 16. Writing one parameter through
//! [`InferenceConfig`]'s setters keeps that value and force-corrects the
//! others, so a config is always loadable.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unsupported multiplier {0}, expected 0.5, 0.75 or 1.0")]
    Multiplier(f32),

    #[error("unsupported output stride {0}, expected 8, 16 or 32")]
    OutputStride(u32),

    #[error("unsupported quantization {0} bytes, expected 1, 2 or 4")]
    QuantBytes(u32),

    #[error("internal resolution {0} out of range, expected a value in (0, 1]")]
    InternalResolution(f32),

    #[error("malformed {parameter} '{value}', expected a number")]
    Malformed {
        parameter: &'static str,
        value: String,
    },

    #[error("unknown internal resolution '{0}', expected low, medium, high, full or a number")]
    InternalResolutionName(String),

    #[error("unknown architecture '{0}', expected mobilenet-v1 or resnet50")]
    Architecture(String),

    #[error("blur radius {radius} exceeds the maximum of {max}")]
    BlurRadius { radius: u32, max: u32 },

    #[error("{architecture} does not support {detail}")]
    Incompatible {
        architecture: Architecture,
        detail: String,
    },
}

fn malformed(parameter: &'static str, value: &str) -> ConfigError {
    ConfigError::Malformed {
        parameter,
        value: value.to_string(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Architecture {
    #[default]
    MobileNetV1,
    ResNet50,
}

impl Architecture {
    fn slug(self) -> &'static str {
        match self {
            Architecture::MobileNetV1 => "mobilenet_v1",
            Architecture::ResNet50 => "resnet50",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::MobileNetV1 => f.write_str("MobileNetV1"),
            Architecture::ResNet50 => f.write_str("ResNet50"),
        }
    }
}

impl FromStr for Architecture {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "mobilenetv1" | "mobilenet" => Ok(Architecture::MobileNetV1),
            "resnet50" | "resnet" => Ok(Architecture::ResNet50),
            _ => Err(ConfigError::Architecture(s.to_string())),
        }
    }
}

/// MobileNet depth multiplier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Multiplier {
    Half,
    #[default]
    ThreeQuarters,
    Full,
}

impl Multiplier {
    pub fn as_f32(self) -> f32 {
        match self {
            Multiplier::Half => 0.5,
            Multiplier::ThreeQuarters => 0.75,
            Multiplier::Full => 1.0,
        }
    }
}

impl TryFrom<f32> for Multiplier {
    type Error = ConfigError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        match value {
            v if v == 0.5 => Ok(Multiplier::Half),
            v if v == 0.75 => Ok(Multiplier::ThreeQuarters),
            v if v == 1.0 => Ok(Multiplier::Full),
            v => Err(ConfigError::Multiplier(v)),
        }
    }
}

impl FromStr for Multiplier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s.parse().map_err(|_| malformed("multiplier", s))?;
        Multiplier::try_from(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputStride {
    S8,
    #[default]
    S16,
    S32,
}

impl OutputStride {
    pub fn as_u32(self) -> u32 {
        match self {
            OutputStride::S8 => 8,
            OutputStride::S16 => 16,
            OutputStride::S32 => 32,
        }
    }
}

impl TryFrom<u32> for OutputStride {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(OutputStride::S8),
            16 => Ok(OutputStride::S16),
            32 => Ok(OutputStride::S32),
            v => Err(ConfigError::OutputStride(v)),
        }
    }
}

impl FromStr for OutputStride {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s.parse().map_err(|_| malformed("output stride", s))?;
        OutputStride::try_from(value)
    }
}

/// Bytes per weight in the quantized model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QuantBytes {
    One,
    Two,
    #[default]
    Four,
}

impl QuantBytes {
    pub fn as_u32(self) -> u32 {
        match self {
            QuantBytes::One => 1,
            QuantBytes::Two => 2,
            QuantBytes::Four => 4,
        }
    }
}

impl TryFrom<u32> for QuantBytes {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(QuantBytes::One),
            2 => Ok(QuantBytes::Two),
            4 => Ok(QuantBytes::Four),
            v => Err(ConfigError::QuantBytes(v)),
        }
    }
}

impl FromStr for QuantBytes {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s.parse().map_err(|_| malformed("quantization", s))?;
        QuantBytes::try_from(value)
    }
}

/// Scale at which the network sees a frame, in (0, 1]
///
/// Lower is faster and coarser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InternalResolution(f32);

impl InternalResolution {
    pub const LOW: InternalResolution = InternalResolution(0.25);
    pub const MEDIUM: InternalResolution = InternalResolution(0.5);
    pub const HIGH: InternalResolution = InternalResolution(0.75);
    pub const FULL: InternalResolution = InternalResolution(1.0);

    pub fn new(value: f32) -> Result<Self, ConfigError> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ConfigError::InternalResolution(value))
        }
    }

    pub fn as_f32(self) -> f32 {
        self.0
    }
}

impl Default for InternalResolution {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl FromStr for InternalResolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::LOW),
            "medium" => Ok(Self::MEDIUM),
            "high" => Ok(Self::HIGH),
            "full" => Ok(Self::FULL),
            other => other
                .parse::<f32>()
                .map_err(|_| ConfigError::InternalResolutionName(s.to_string()))
                .and_then(Self::new),
        }
    }
}

/// Which parameter was written last and therefore wins during normalisation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pinned {
    Architecture,
    Multiplier,
    OutputStride,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InferenceConfig {
    architecture: Architecture,
    multiplier: Multiplier,
    output_stride: OutputStride,
    quant_bytes: QuantBytes,
    internal_resolution: InternalResolution,
}

impl InferenceConfig {
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    pub fn output_stride(&self) -> OutputStride {
        self.output_stride
    }

    pub fn quant_bytes(&self) -> QuantBytes {
        self.quant_bytes
    }

    pub fn internal_resolution(&self) -> InternalResolution {
        self.internal_resolution
    }

    pub fn set_architecture(&mut self, architecture: Architecture) {
        self.architecture = architecture;
        *self = normalize(*self, Pinned::Architecture);
    }

    pub fn set_multiplier(&mut self, multiplier: Multiplier) {
        self.multiplier = multiplier;
        *self = normalize(*self, Pinned::Multiplier);
    }

    pub fn set_output_stride(&mut self, output_stride: OutputStride) {
        self.output_stride = output_stride;
        *self = normalize(*self, Pinned::OutputStride);
    }

    pub fn set_quant_bytes(&mut self, quant_bytes: QuantBytes) {
        self.quant_bytes = quant_bytes;
    }

    pub fn set_internal_resolution(&mut self, internal_resolution: InternalResolution) {
        self.internal_resolution = internal_resolution;
    }

    /// File name of the exported model for this configuration
    pub fn model_file_name(&self) -> String {
        format!(
            "{}_{:03}_stride{}_q{}.onnx",
            self.architecture.slug(),
            (self.multiplier.as_f32() * 100.0).round() as u32,
            self.output_stride.as_u32(),
            self.quant_bytes.as_u32(),
        )
    }
}

/// Force-correct `config` into a loadable combination, keeping the `pinned` parameter
pub fn normalize(mut config: InferenceConfig, pinned: Pinned) -> InferenceConfig {
    match pinned {
        Pinned::Architecture => {}
        Pinned::Multiplier => {
            if config.multiplier != Multiplier::Full {
                config.architecture = Architecture::MobileNetV1;
            }
        }
        Pinned::OutputStride => match config.output_stride {
            OutputStride::S8 => config.architecture = Architecture::MobileNetV1,
            OutputStride::S32 => config.architecture = Architecture::ResNet50,
            OutputStride::S16 => {}
        },
    }

    match config.architecture {
        Architecture::ResNet50 => {
            config.multiplier = Multiplier::Full;
            if config.output_stride == OutputStride::S8 {
                config.output_stride = OutputStride::S16;
            }
        }
        Architecture::MobileNetV1 => {
            if config.output_stride == OutputStride::S32 {
                config.output_stride = OutputStride::S16;
            }
        }
    }
    config
}

/// Check the joint rules without correcting anything
pub fn validate(config: &InferenceConfig) -> Result<(), ConfigError> {
    match config.architecture {
        Architecture::ResNet50 if config.multiplier != Multiplier::Full => {
            Err(ConfigError::Incompatible {
                architecture: config.architecture,
                detail: format!("multiplier {}", config.multiplier.as_f32()),
            })
        }
        Architecture::ResNet50 if config.output_stride == OutputStride::S8 => {
            Err(ConfigError::Incompatible {
                architecture: config.architecture,
                detail: "output stride 8".to_string(),
            })
        }
        Architecture::MobileNetV1 if config.output_stride == OutputStride::S32 => {
            Err(ConfigError::Incompatible {
                architecture: config.architecture,
                detail: "output stride 32".to_string(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = InferenceConfig::default();
        assert_eq!(config.architecture(), Architecture::MobileNetV1);
        assert_eq!(config.multiplier(), Multiplier::ThreeQuarters);
        assert_eq!(config.output_stride(), OutputStride::S16);
        assert_eq!(config.quant_bytes(), QuantBytes::Four);
        assert_eq!(config.internal_resolution(), InternalResolution::MEDIUM);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn resnet_forces_full_multiplier() {
        let mut config = InferenceConfig::default();
        config.set_architecture(Architecture::ResNet50);
        assert_eq!(config.multiplier(), Multiplier::Full);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn resnet_widens_narrowest_stride() {
        let mut config = InferenceConfig::default();
        config.set_output_stride(OutputStride::S8);
        config.set_architecture(Architecture::ResNet50);
        assert_eq!(config.output_stride(), OutputStride::S16);
    }

    #[test]
    fn mobilenet_narrows_resnet_only_stride() {
        let mut config = InferenceConfig::default();
        config.set_architecture(Architecture::ResNet50);
        config.set_output_stride(OutputStride::S32);
        config.set_architecture(Architecture::MobileNetV1);
        assert_eq!(config.output_stride(), OutputStride::S16);
        assert_eq!(config.multiplier(), Multiplier::Full);
    }

    #[test]
    fn partial_multiplier_selects_mobilenet() {
        let mut config = InferenceConfig::default();
        config.set_output_stride(OutputStride::S32);
        assert_eq!(config.architecture(), Architecture::ResNet50);

        config.set_multiplier(Multiplier::Half);
        assert_eq!(config.architecture(), Architecture::MobileNetV1);
        assert_eq!(config.output_stride(), OutputStride::S16);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn narrowest_stride_selects_mobilenet() {
        let mut config = InferenceConfig::default();
        config.set_architecture(Architecture::ResNet50);
        config.set_output_stride(OutputStride::S8);
        assert_eq!(config.architecture(), Architecture::MobileNetV1);
        assert_eq!(config.output_stride(), OutputStride::S8);
    }

    #[test]
    fn validate_reports_incompatible_pairs() {
        let config = InferenceConfig {
            architecture: Architecture::ResNet50,
            multiplier: Multiplier::ThreeQuarters,
            ..InferenceConfig::default()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Incompatible { .. })
        ));
        assert!(validate(&normalize(config, Pinned::Architecture)).is_ok());
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert_eq!(Multiplier::try_from(0.6), Err(ConfigError::Multiplier(0.6)));
        assert_eq!(OutputStride::try_from(12), Err(ConfigError::OutputStride(12)));
        assert_eq!(QuantBytes::try_from(3), Err(ConfigError::QuantBytes(3)));
        assert!(InternalResolution::new(0.0).is_err());
        assert!(InternalResolution::new(1.5).is_err());
        assert!("huge".parse::<InternalResolution>().is_err());
    }

    #[test]
    fn unparsable_text_is_kept_in_the_error() {
        let err = "abc".parse::<Multiplier>().unwrap_err();
        assert_eq!(
            err,
            ConfigError::Malformed {
                parameter: "multiplier",
                value: "abc".to_string()
            }
        );
        assert_eq!(err.to_string(), "malformed multiplier 'abc', expected a number");
        assert!(matches!(
            "x16".parse::<OutputStride>(),
            Err(ConfigError::Malformed { value, .. }) if value == "x16"
        ));
        assert_eq!("3".parse::<QuantBytes>(), Err(ConfigError::QuantBytes(3)));
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("resnet50".parse::<Architecture>().unwrap(), Architecture::ResNet50);
        assert_eq!("mobilenet-v1".parse::<Architecture>().unwrap(), Architecture::MobileNetV1);
        assert_eq!("0.5".parse::<Multiplier>().unwrap(), Multiplier::Half);
        assert_eq!("high".parse::<InternalResolution>().unwrap(), InternalResolution::HIGH);
        assert_eq!("0.3".parse::<InternalResolution>().unwrap().as_f32(), 0.3);
    }

    #[test]
    fn model_file_name_encodes_parameters() {
        let mut config = InferenceConfig::default();
        assert_eq!(config.model_file_name(), "mobilenet_v1_075_stride16_q4.onnx");
        config.set_architecture(Architecture::ResNet50);
        config.set_quant_bytes(QuantBytes::Two);
        assert_eq!(config.model_file_name(), "resnet50_100_stride16_q2.onnx");
    }
}
