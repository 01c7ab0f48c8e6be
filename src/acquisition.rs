//! Acquisition-boundary glue: frame sources and file-backed
//! calibration registers.
//!
//! The live device pipeline (GenICam node maps, stream buffer
//! handling, single-frame capture) stays outside this crate; what
//! crosses the boundary is an owned [`RawFrame`] plus readable
//! calibration registers. The implementations here cover the
//! file-driven case: Mono8/Mono16 TIFF frames on disk and register
//! dumps as JSON objects.

use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use image::{ColorType, ImageDecoder};
use ndarray::Array2;

use crate::calibration::{CalibrationSource, RawFrame};

/// A source of raw frames.
///
/// Implementations own the interaction with whatever produces the
/// pixels (device buffer, file, synthetic generator) and hand out
/// frames as independent owned arrays. Any underlying device buffer
/// must be released by the implementation before `grab` returns,
/// whether or not the caller's conversion later succeeds.
pub trait FrameSource {
    fn grab(&mut self) -> Result<RawFrame>;
}

/// Single-shot frame source backed by a TIFF file.
pub struct TiffFrameSource {
    path: PathBuf,
}

impl TiffFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TiffFrameSource { path: path.into() }
    }
}

impl FrameSource for TiffFrameSource {
    fn grab(&mut self) -> Result<RawFrame> {
        read_raw_tiff(&self.path)
            .with_context(|| format!("could not read raw frame from {}", self.path.display()))
    }
}

/// Reads a raw count frame from a grayscale TIFF. Mono16 is the
/// camera's native pixel format; Mono8 is widened for convenience.
pub fn read_raw_tiff(path: &Path) -> Result<RawFrame> {
    use image::tiff::TiffDecoder;
    let decoder = TiffDecoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions();
    let width = width as usize;
    let height = height as usize;

    use zerocopy::AsBytes;
    fn image_as_counts<'a, R>(decoder: R) -> Result<Vec<u16>>
    where
        R: ImageDecoder<'a>,
    {
        let (width, height) = decoder.dimensions();
        let num_pixels = (width * height) as usize;
        let mut image: Vec<u16> = Vec::with_capacity(num_pixels);
        unsafe {
            image.set_len(num_pixels);
        }
        decoder.read_image(image.as_bytes_mut())?;
        Ok(image)
    }

    let counts = match decoder.color_type() {
        ColorType::L16 => image_as_counts(decoder)?,
        ColorType::L8 => {
            let mut image: Vec<u8> = vec![0; decoder.total_bytes() as usize];
            decoder.read_image(&mut image)?;
            image.into_iter().map(u16::from).collect()
        }
        other => bail!("unsupported color type for raw frame: {:?}", other),
    };

    Ok(Array2::from_shape_vec((height, width), counts)?)
}

/// Calibration registers backed by a JSON object, keyed by register
/// name. Stands in for the device metadata interface in file-driven
/// runs and synthetic test contexts.
#[derive(Debug)]
pub struct JsonCalibration(HashMap<String, serde_json::Value>);

impl JsonCalibration {
    pub fn from_path(path: &Path) -> Result<Self> {
        let map = serde_json::from_reader(BufReader::new(File::open(path)?))
            .with_context(|| format!("could not parse calibration json {}", path.display()))?;
        Ok(JsonCalibration(map))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(JsonCalibration(serde_json::from_value(value)?))
    }
}

impl CalibrationSource for JsonCalibration {
    fn read_float(&self, register: &str) -> Option<f64> {
        self.0.get(register)?.as_f64()
    }

    fn read_integer(&self, register: &str) -> Option<i64> {
        self.0.get(register)?.as_i64()
    }
}
