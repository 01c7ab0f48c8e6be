mod args;

use std::{fs::File, io::BufReader};

use anyhow::{Context, Result};
use args::Args;
use serde_derive::*;

use thermocal::acquisition::JsonCalibration;
use thermocal::cli::process_paths_par;
use thermocal::stats::PixelStats;
use thermocal::{CalibrationContext, EnvironmentalParameters, IRFormat};

fn main() -> Result<()> {
    thermocal::logger::init();
    let args = Args::from_cmd_line()?;

    let format = IRFormat::from_code(args.ir_type)?;
    let params = match (&args.params, format) {
        (Some(path), _) => Some(
            serde_json::from_reader(BufReader::new(File::open(path)?))
                .with_context(|| format!("could not parse parameters {}", path.display()))?,
        ),
        (None, IRFormat::Radiometric) => Some(EnvironmentalParameters::default()),
        (None, _) => None,
    };

    let registers = JsonCalibration::from_path(&args.calibration)?;
    let context = CalibrationContext::assemble(&registers, format, params.as_ref())?;

    use rayon::prelude::*;
    let (stats, cumulative) = process_paths_par(args.frames)
        .into_par_iter()
        .map(|input| -> Result<_> {
            let input = input?;
            let field = context.convert(&input.frame);
            let (ht, wid) = field.dim();
            Ok(FrameStats {
                path: input.filename,
                width: wid,
                height: ht,
                stats: PixelStats::from_field(&field),
            })
        })
        .try_fold(
            || (vec![], PixelStats::default()),
            |mut acc, item| -> Result<_> {
                let item = item?;
                acc.1 += &item.stats;
                acc.0.push(item);
                Ok(acc)
            },
        )
        .try_reduce(
            || (vec![], PixelStats::default()),
            |mut acc1, acc2| -> Result<_> {
                acc1.0.extend(acc2.0);
                acc1.1 += &acc2.1;
                Ok(acc1)
            },
        )?;

    #[derive(Debug, Serialize)]
    struct OutputJson {
        frame_stats: Vec<FrameStats>,
        cumulative: PixelStats,
    }

    serde_json::to_writer(
        std::io::stdout().lock(),
        &OutputJson {
            frame_stats: stats,
            cumulative,
        },
    )?;

    Ok(())
}

#[derive(Serialize, Debug)]
pub struct FrameStats {
    path: String,
    width: usize,
    height: usize,
    stats: PixelStats,
}
