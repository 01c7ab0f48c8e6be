//! Persist converted temperature fields.
//!
//! Each frame produces two artifacts under a shared timestamped
//! stem: the raw temperatures as CSV, and a 16-bit grayscale PNG
//! render scaled to the configured display limits. Shipping the
//! artifacts anywhere else goes through the [`RemoteSink`]
//! contract; the conversion core carries no transfer mechanism.

use std::{
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use byteordered::ByteOrdered;
use chrono::Local;
use itertools::iproduct;
use tracing::info;

use crate::calibration::TemperatureField;
use crate::config::CaptureConfig;

/// Affine map from degrees Celsius onto the full `u16` range, given
/// display limits. Out-of-range temperatures clamp; `NaN` pixels
/// render as 0.
#[derive(Debug, Clone, Copy)]
pub struct DisplayScale {
    coeffs: [f64; 2],
}

impl DisplayScale {
    pub fn new(vmin: f64, vmax: f64) -> Self {
        let factor = u16::MAX as f64 / (vmax - vmin);
        DisplayScale {
            coeffs: [-vmin * factor, factor],
        }
    }

    pub fn apply(&self, val: f64) -> u16 {
        let tval = self.coeffs[0] + self.coeffs[1] * val;
        tval.max(0.).min(u16::MAX as f64) as u16
    }
}

/// File stem for one acquisition, e.g. `2026_08_06-03_22_41-PM`.
pub fn timestamp_stem() -> String {
    Local::now().format("%Y_%m_%d-%I_%M_%S-%p").to_string()
}

/// Paths written for one persisted frame.
#[derive(Debug)]
pub struct PersistedFrame {
    pub raw: PathBuf,
    pub image: PathBuf,
}

/// Writes temperature fields into the configured directories.
pub struct FileSink {
    raw_dir: PathBuf,
    image_dir: PathBuf,
    scale: DisplayScale,
}

impl FileSink {
    pub fn from_config(config: &CaptureConfig) -> Self {
        FileSink {
            raw_dir: config.paths.raw_temperatures.clone(),
            image_dir: config.paths.thermal_images.clone(),
            scale: DisplayScale::new(config.thermal.vmin as f64, config.thermal.vmax as f64),
        }
    }

    pub fn persist(&self, field: &TemperatureField, stem: &str) -> Result<PersistedFrame> {
        create_dir_all(&self.raw_dir)?;
        create_dir_all(&self.image_dir)?;

        let raw = self.raw_dir.join(stem).with_extension("csv");
        write_temperature_csv(&raw, field)
            .with_context(|| format!("could not write {}", raw.display()))?;

        let image = self.image_dir.join(stem).with_extension("png");
        write_scaled_png(&image, field, &self.scale)
            .with_context(|| format!("could not write {}", image.display()))?;

        Ok(PersistedFrame { raw, image })
    }
}

fn write_temperature_csv(path: &Path, field: &TemperatureField) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "x,y,temp")?;
    let (ht, wid) = field.dim();
    for (row, col) in iproduct!(0..ht, 0..wid) {
        writeln!(writer, "{},{},{}", row, col, field[(row, col)])?;
    }
    Ok(())
}

fn write_scaled_png(path: &Path, field: &TemperatureField, scale: &DisplayScale) -> Result<()> {
    let (ht, wid) = field.dim();
    let image_writer = BufWriter::new(File::create(path)?);
    let mut png_writer = {
        let mut encoder = png::Encoder::new(image_writer, wid as u32, ht as u32);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Sixteen);
        encoder.write_header()?
    };
    let mut png_streamer = ByteOrdered::be(png_writer.stream_writer());

    for (row, col) in iproduct!(0..ht, 0..wid) {
        png_streamer.write_u16(scale.apply(field[(row, col)]))?;
    }
    png_streamer.into_inner().finish()?;

    Ok(())
}

/// Contract for shipping persisted artifacts to a remote store.
/// Implementations live with the deployment; the tooling here only
/// decides *whether* to upload, never *how*.
pub trait RemoteSink {
    fn upload(&self, local: &Path, remote_dir: &Path) -> Result<()>;
}

/// Stand-in remote that records upload requests in the log. Used
/// until a deployment wires in a real transfer backend.
pub struct LoggingRemote {
    host: Option<String>,
}

impl LoggingRemote {
    pub fn from_config(config: &CaptureConfig) -> Self {
        LoggingRemote {
            host: config.ftp.as_ref().map(|ftp| ftp.host.clone()),
        }
    }
}

impl RemoteSink for LoggingRemote {
    fn upload(&self, local: &Path, remote_dir: &Path) -> Result<()> {
        info!(
            host = self.host.as_deref().unwrap_or("<unconfigured>"),
            file = %local.display(),
            remote_dir = %remote_dir.display(),
            "upload requested"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scale_maps_limits_to_u16_range() {
        // 0..255 makes the scale factor (257) exact in binary.
        let scale = DisplayScale::new(0., 255.);
        assert_eq!(scale.apply(0.), 0);
        assert_eq!(scale.apply(255.), u16::MAX);
        assert_eq!(scale.apply(51.), 51 * 257);
    }

    #[test]
    fn scale_clamps_and_blanks_nan() {
        let scale = DisplayScale::new(0., 100.);
        assert_eq!(scale.apply(-40.), 0);
        assert_eq!(scale.apply(1e6), u16::MAX);
        assert_eq!(scale.apply(f64::NAN), 0);
    }

    #[test]
    fn persists_csv_and_png() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = CaptureConfig::default();
        config.paths.raw_temperatures = dir.path().join("raw");
        config.paths.thermal_images = dir.path().join("img");

        let field = array![[20.5, 21.0], [f64::NAN, 19.0]];
        let sink = FileSink::from_config(&config);
        let persisted = sink.persist(&field, "2026_08_06-01_02_03-PM")?;

        assert!(persisted.raw.exists());
        assert!(persisted.image.exists());

        let csv = std::fs::read_to_string(&persisted.raw)?;
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("x,y,temp"));
        assert_eq!(lines.next(), Some("0,0,20.5"));
        assert_eq!(csv.lines().count(), 5);
        Ok(())
    }

    #[test]
    fn timestamp_stem_shape() {
        let stem = timestamp_stem();
        // e.g. 2026_08_06-03_22_41-PM
        assert_eq!(stem.len(), "2026_08_06-03_22_41-PM".len());
        assert!(stem.ends_with('M'));
    }
}
