//! Library to convert raw frames from FLIR A-series thermal
//! cameras into calibrated temperature maps.
//!
//! This crate provides two functionalities:
//!
//! 1. Compute [temperature] from raw sensor counts, the camera's
//! calibration registers and ambient parameters, for all three IR
//! streaming formats the cameras expose (`TemperatureLinear10mK`,
//! `TemperatureLinear100mK` and fully radiometric counts).
//!
//! 2. [Assemble](calibration::CalibrationContext) an immutable
//! per-acquisition calibration context from any register source
//! and convert whole frames with it, plus the file-level glue a
//! single-shot capture pipeline needs ([statistics](stats),
//! [persistence](sink), [configuration](config)).
//!
//! # Usage
//!
//! Obtaining pixel-wise temperature values involves (1) assembling
//! a [`CalibrationContext`] from the calibration registers, the
//! selected [`IRFormat`] and (for radiometric streams) the
//! [`EnvironmentalParameters`]; and (2) converting raw frames with
//! it.
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! use std::path::Path;
//! use thermocal::acquisition::{read_raw_tiff, JsonCalibration};
//! use thermocal::{CalibrationContext, EnvironmentalParameters, IRFormat};
//!
//! let registers = JsonCalibration::from_path(Path::new("calibration.json"))?;
//! let context = CalibrationContext::assemble(
//!     &registers,
//!     IRFormat::Radiometric,
//!     Some(&EnvironmentalParameters::default()),
//! )?;
//!
//! let raw = read_raw_tiff(Path::new("frame.tif"))?;
//! let temperatures = context.convert(&raw);
//! # Ok(())
//! # }
//! ```
//!
//! The linear formats need no parameters; the context then applies
//! the fixed 10 mK / 100 mK scale. Conversion is a pure, read-only
//! transformation: independent contexts and frames may be processed
//! concurrently, as the accompanying binaries do via [`rayon`].

pub mod temperature;
pub mod calibration;
pub mod acquisition;
pub mod stats;
pub mod config;
pub mod sink;

pub mod cli;
pub mod logger;

pub use crate::calibration::{
    CalibrationContext, CalibrationSource, ConversionMode, IRFormat, RawFrame, TemperatureField,
};
pub use crate::temperature::{
    CalibrationConstants, CalibrationError, EnvironmentalParameters, RadiometricTransform,
};
