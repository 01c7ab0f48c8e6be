//! Capture configuration: output locations, display scale limits
//! and remote-transfer settings.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use serde_derive::*;

/// Configuration for a capture run, loaded from a JSON file. All
/// sections have defaults, so a missing file is not an error for
/// the tooling; a present-but-invalid one is.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub paths: OutputPaths,
    pub thermal: ThermalLimits,
    /// Remote transfer credentials; absent when no remote is
    /// configured.
    pub ftp: Option<FtpSettings>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OutputPaths {
    /// Directory for raw temperature dumps.
    pub raw_temperatures: PathBuf,
    /// Directory for rendered frame images.
    pub thermal_images: PathBuf,
    /// Base directory on the remote store.
    pub ftp_root: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct ThermalLimits {
    /// Lower display limit, degrees Celsius.
    pub vmin: i32,
    /// Upper display limit, degrees Celsius.
    pub vmax: i32,
    /// Fraction of each axis trimmed from the edges when looking
    /// for the frame maximum, in `[0, 1)`.
    pub shape_tolerance: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FtpSettings {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            paths: OutputPaths::default(),
            thermal: ThermalLimits::default(),
            ftp: None,
        }
    }
}

impl Default for OutputPaths {
    fn default() -> Self {
        OutputPaths {
            raw_temperatures: PathBuf::from("raw_temperatures"),
            thermal_images: PathBuf::from("thermal_images"),
            ftp_root: PathBuf::from("."),
        }
    }
}

impl Default for ThermalLimits {
    fn default() -> Self {
        ThermalLimits {
            vmin: 0,
            vmax: 100,
            shape_tolerance: 0.5,
        }
    }
}

impl CaptureConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let config: CaptureConfig = serde_json::from_reader(BufReader::new(
            File::open(path).with_context(|| format!("could not open {}", path.display()))?,
        ))
        .with_context(|| format!("could not parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.thermal.vmax > self.thermal.vmin,
            "vmax must be greater than vmin"
        );
        ensure!(
            (0. ..1.).contains(&self.thermal.shape_tolerance),
            "shape tolerance must be in [0, 1)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        CaptureConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_partial_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        let mut file = File::create(&path)?;
        write!(
            file,
            r#"{{
                "thermal": {{ "vmin": 20, "vmax": 45, "shape_tolerance": 0.4 }},
                "ftp": {{ "host": "ftp.example.org", "user": "barn", "password": "secret" }}
            }}"#
        )?;

        let config = CaptureConfig::from_path(&path)?;
        assert_eq!(config.thermal.vmin, 20);
        assert_eq!(config.thermal.vmax, 45);
        assert_eq!(config.ftp.as_ref().unwrap().host, "ftp.example.org");
        // untouched section keeps its defaults
        assert_eq!(config.paths.raw_temperatures, PathBuf::from("raw_temperatures"));
        Ok(())
    }

    #[test]
    fn rejects_inverted_limits() {
        let mut config = CaptureConfig::default();
        config.thermal.vmin = 50;
        config.thermal.vmax = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_tolerance() {
        let mut config = CaptureConfig::default();
        config.thermal.shape_tolerance = 1.0;
        assert!(config.validate().is_err());
    }
}
