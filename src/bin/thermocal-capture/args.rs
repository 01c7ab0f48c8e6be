use anyhow::Result;
use clap::value_t_or_exit;
use std::path::PathBuf;
use thermocal::{arg, args_parser, opt};

pub struct Args {
    pub ir_type: i64,
    pub calibration: PathBuf,
    pub config: Option<PathBuf>,
    pub params: Option<PathBuf>,
    pub ftp: bool,
    pub frames: Vec<String>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermocal-capture")
            .about("Convert raw thermal frames and persist temperature maps.")
            .arg(
                opt!("ir type")
                    .short("t")
                    .help("IR format code: 1 = Linear10mK, 2 = Linear100mK, 3 = Radiometric. Default is 2"),
            )
            .arg(
                opt!("calibration")
                    .short("c")
                    .required(true)
                    .help("JSON file with the camera calibration registers"),
            )
            .arg(opt!("config").help("Capture configuration JSON (defaults apply when omitted)"))
            .arg(
                opt!("params")
                    .short("p")
                    .help("Environmental parameters JSON for radiometric mode (static defaults when omitted)"),
            )
            .arg(
                opt!("ftp")
                    .takes_value(false)
                    .help("Request upload of the persisted files to the configured remote"),
            )
            .arg(
                arg!("frames")
                    .required(true)
                    .multiple(true)
                    .help("Raw 16-bit TIFF frame paths"),
            )
            .get_matches();

        let ir_type = matches
            .is_present("ir type")
            .then(|| value_t_or_exit!(matches.value_of("ir type"), i64))
            .unwrap_or(2);
        let calibration = value_t_or_exit!(matches, "calibration", PathBuf);
        let config = matches
            .is_present("config")
            .then(|| value_t_or_exit!(matches.value_of("config"), PathBuf));
        let params = matches
            .is_present("params")
            .then(|| value_t_or_exit!(matches.value_of("params"), PathBuf));
        let ftp = matches.is_present("ftp");
        let frames = matches
            .values_of("frames")
            .unwrap()
            .map(|f| f.into())
            .collect();

        Ok(Args {
            ir_type,
            calibration,
            config,
            params,
            ftp,
            frames,
        })
    }
}
