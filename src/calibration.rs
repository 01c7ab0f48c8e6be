//! Assemble per-acquisition calibration contexts and convert raw
//! frames into temperature fields.
//!
//! A [`CalibrationContext`] is built once per acquisition from the
//! camera's calibration registers (via a [`CalibrationSource`]) and
//! the selected [`IRFormat`], then handed by reference to anything
//! that needs to convert frames. Assembly is the only fallible step;
//! conversion itself is a pure, infallible transformation.

use ndarray::Array2;
use tracing::debug;

use crate::temperature::{
    linear_100mk_to_celsius, linear_10mk_to_celsius, CalibrationConstants, CalibrationError,
    EnvironmentalParameters, RadiometricTransform,
};

/// A raw frame as produced by the acquisition pipeline: one
/// unsigned 16-bit count per pixel, row-major.
pub type RawFrame = Array2<u16>;

/// A converted frame: one temperature in degrees Celsius per pixel,
/// same shape as the raw frame it came from. May contain `NaN` for
/// pixels outside the radiometric model's domain.
pub type TemperatureField = Array2<f64>;

/// Read-only access to the camera's calibration registers.
///
/// Implemented by the device node map in a live deployment and by
/// [`JsonCalibration`][crate::acquisition::JsonCalibration] for
/// file-driven runs and synthetic test contexts. Reads must have no
/// side effects.
pub trait CalibrationSource {
    /// Value of a floating-point register, `None` when the register
    /// is missing or unreadable.
    fn read_float(&self, register: &str) -> Option<f64>;

    /// Value of an integer register.
    fn read_integer(&self, register: &str) -> Option<i64>;
}

impl CalibrationConstants {
    /// Reads all calibration registers from a device metadata
    /// interface. Any missing register aborts the acquisition
    /// attempt with [`CalibrationError::Unavailable`].
    pub fn from_source(source: &dyn CalibrationSource) -> Result<Self, CalibrationError> {
        let float = |register: &'static str| {
            source
                .read_float(register)
                .ok_or(CalibrationError::Unavailable { register })
        };

        let constants = CalibrationConstants {
            r: float("R")?,
            b: float("B")?,
            f: float("F")?,
            x: float("X")?,
            alpha1: float("alpha1")?,
            alpha2: float("alpha2")?,
            beta1: float("beta1")?,
            beta2: float("beta2")?,
            gain: float("J1")?,
            offset: source
                .read_integer("J0")
                .ok_or(CalibrationError::Unavailable { register: "J0" })?,
        };
        constants.validate()?;
        debug!(?constants, "calibration registers read");
        Ok(constants)
    }
}

/// The camera's IR streaming format, fixed at acquisition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IRFormat {
    /// Counts are 10 mK steps above absolute zero.
    Linear10mK,
    /// Counts are 100 mK steps above absolute zero.
    Linear100mK,
    /// Counts are pseudo-radiance; conversion runs the full
    /// thermographic model and requires [`EnvironmentalParameters`].
    Radiometric,
}

impl IRFormat {
    /// Maps the numeric selector the capture tooling uses (`1`, `2`,
    /// `3`); anything else is an unsupported mode.
    pub fn from_code(code: i64) -> Result<Self, CalibrationError> {
        match code {
            1 => Ok(IRFormat::Linear10mK),
            2 => Ok(IRFormat::Linear100mK),
            3 => Ok(IRFormat::Radiometric),
            code => Err(CalibrationError::UnsupportedMode { code }),
        }
    }

    /// Entry name of the camera's `IRFormat` enumeration register
    /// for this format.
    pub fn stream_entry(&self) -> &'static str {
        match self {
            IRFormat::Linear10mK => "TemperatureLinear10mK",
            IRFormat::Linear100mK => "TemperatureLinear100mK",
            IRFormat::Radiometric => "Radiometric",
        }
    }

    /// Whether conversion in this format needs environmental
    /// parameters.
    pub fn requires_parameters(&self) -> bool {
        matches!(self, IRFormat::Radiometric)
    }
}

/// Conversion dispatch, closed over the three supported formats.
///
/// The radiometric variant owns its fully-built transform, so a
/// context that reports `Radiometric` can never be missing its
/// parameters.
#[derive(Debug, Clone, Copy)]
pub enum ConversionMode {
    Linear10mK,
    Linear100mK,
    Radiometric(RadiometricTransform),
}

impl ConversionMode {
    #[inline]
    fn count_to_celsius(&self, count: f64) -> f64 {
        match self {
            ConversionMode::Linear10mK => linear_10mk_to_celsius(count),
            ConversionMode::Linear100mK => linear_100mk_to_celsius(count),
            ConversionMode::Radiometric(transform) => transform.count_to_celsius(count),
        }
    }
}

/// Immutable calibration context for one acquisition: the camera's
/// calibration constants plus the conversion mode built for the
/// selected IR format.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationContext {
    constants: CalibrationConstants,
    mode: ConversionMode,
}

impl CalibrationContext {
    /// Builds a context from already-read constants. For
    /// [`IRFormat::Radiometric`] the environmental parameters are
    /// required and the per-frame scalars are computed here, so all
    /// domain errors surface before any per-pixel work.
    pub fn new(
        constants: CalibrationConstants,
        format: IRFormat,
        params: Option<&EnvironmentalParameters>,
    ) -> Result<Self, CalibrationError> {
        constants.validate()?;
        let mode = match format {
            IRFormat::Linear10mK => ConversionMode::Linear10mK,
            IRFormat::Linear100mK => ConversionMode::Linear100mK,
            IRFormat::Radiometric => {
                let params = params.ok_or(CalibrationError::MissingParameters)?;
                ConversionMode::Radiometric(RadiometricTransform::new(&constants, params)?)
            }
        };
        Ok(CalibrationContext { constants, mode })
    }

    /// Reads the constants from a [`CalibrationSource`] and builds
    /// the context in one step.
    pub fn assemble(
        source: &dyn CalibrationSource,
        format: IRFormat,
        params: Option<&EnvironmentalParameters>,
    ) -> Result<Self, CalibrationError> {
        let constants = CalibrationConstants::from_source(source)?;
        Self::new(constants, format, params)
    }

    pub fn constants(&self) -> &CalibrationConstants {
        &self.constants
    }

    pub fn mode(&self) -> &ConversionMode {
        &self.mode
    }

    /// The IR format this context was assembled for.
    pub fn format(&self) -> IRFormat {
        match self.mode {
            ConversionMode::Linear10mK => IRFormat::Linear10mK,
            ConversionMode::Linear100mK => IRFormat::Linear100mK,
            ConversionMode::Radiometric(_) => IRFormat::Radiometric,
        }
    }

    /// Converts a raw frame into a temperature field of the same
    /// shape. Never fails: pixels outside the radiometric log
    /// domain come back as `NaN`, everything else passes through
    /// unclamped. The raw frame is only read; the returned field is
    /// independent storage owned by the caller.
    pub fn convert(&self, raw: &RawFrame) -> TemperatureField {
        raw.mapv(|count| self.mode.count_to_celsius(count as f64))
    }
}
