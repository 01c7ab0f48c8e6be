mod args;

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use args::Args;
use tracing::{error, info};

use thermocal::acquisition::JsonCalibration;
use thermocal::cli::process_paths_par;
use thermocal::config::CaptureConfig;
use thermocal::sink::{timestamp_stem, FileSink, LoggingRemote, RemoteSink};
use thermocal::stats::central_maximum;
use thermocal::{CalibrationContext, EnvironmentalParameters, IRFormat};

fn main() -> Result<()> {
    thermocal::logger::init();
    let args = Args::from_cmd_line()?;

    let config = match &args.config {
        Some(path) => CaptureConfig::from_path(path)?,
        None => CaptureConfig::default(),
    };

    let format = IRFormat::from_code(args.ir_type)?;
    let params = match (&args.params, format) {
        (Some(path), _) => Some(load_parameters(path)?),
        (None, IRFormat::Radiometric) => Some(EnvironmentalParameters::default()),
        (None, _) => None,
    };

    let registers = JsonCalibration::from_path(&args.calibration)?;
    let context = CalibrationContext::assemble(&registers, format, params.as_ref())?;
    info!(format = format.stream_entry(), "calibration context assembled");

    let sink = FileSink::from_config(&config);
    let remote = LoggingRemote::from_config(&config);
    let remote_raw = config.paths.ftp_root.join(&config.paths.raw_temperatures);
    let remote_images = config.paths.ftp_root.join(&config.paths.thermal_images);
    let tolerance = config.thermal.shape_tolerance;
    let ftp = args.ftp;

    use rayon::prelude::*;
    let (converted, failed) = process_paths_par(args.frames)
        .into_par_iter()
        .map(|input| -> Result<()> {
            let input = input?;
            let field = context.convert(&input.frame);

            let stem = format!("{}-{}", timestamp_stem(), file_stem(&input.filename));
            let persisted = sink.persist(&field, &stem)?;
            if ftp {
                remote.upload(&persisted.raw, &remote_raw)?;
                remote.upload(&persisted.image, &remote_images)?;
            }

            match central_maximum(&field, tolerance) {
                Some(max) => info!(
                    file = %input.filename,
                    "maximum temperature: {:.1}", max
                ),
                None => info!(file = %input.filename, "no valid pixel in central region"),
            }
            Ok(())
        })
        // a failed frame doesn't abort the rest of the run
        .map(|res| match res {
            Ok(()) => (1usize, 0usize),
            Err(err) => {
                error!("{:#}", err);
                (0, 1)
            }
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    info!(converted, failed, "capture complete");
    Ok(())
}

fn load_parameters(path: &Path) -> Result<EnvironmentalParameters> {
    serde_json::from_reader(BufReader::new(File::open(path)?))
        .with_context(|| format!("could not parse parameters {}", path.display()))
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".into())
}
