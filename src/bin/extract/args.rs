use anyhow::{Context, Result};
use clap::value_t_or_exit;
use gantry_raster::{arg, args_parser, geo::GeolocationStrategy, opt, PipelineConfig};
use std::path::PathBuf;

pub struct Args {
    pub datasets: Vec<String>,
    pub config: PipelineConfig,
    pub progress: bool,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("extract")
            .about("Convert raw sensor datasets into georeferenced rasters and traits.")
            .arg(
                opt!("config")
                    .short("c")
                    .help("JSON pipeline configuration (default: built-in defaults)"),
            )
            .arg(
                opt!("output")
                    .short("o")
                    .help("Output root directory.  Overrides the configuration"),
            )
            .arg(
                opt!("overwrite")
                    .takes_value(false)
                    .help("Recompute outputs that already exist"),
            )
            .arg(
                opt!("geolocation")
                    .short("g")
                    .possible_values(&["great-circle", "affine"])
                    .help("Geolocation strategy.  Default is great-circle"),
            )
            .arg(
                opt!("features tool")
                    .help("Run this octave binary for PSII feature images"),
            )
            .arg(
                opt!("quiet")
                    .short("q")
                    .takes_value(false)
                    .help("Hide the progress bar"),
            )
            .arg(
                arg!("datasets")
                    .required(true)
                    .multiple(true)
                    .help("Dataset directories"),
            )
            .get_matches();

        let mut config = match matches.value_of("config") {
            Some(path) => PipelineConfig::from_json_path(path.as_ref())
                .with_context(|| format!("could not load configuration {}", path))?,
            None => PipelineConfig::default(),
        };
        if matches.is_present("output") {
            config.output_root = value_t_or_exit!(matches, "output", PathBuf);
        }
        if matches.is_present("overwrite") {
            config.overwrite = true;
        }
        if matches.is_present("geolocation") {
            config.geolocation.strategy = value_t_or_exit!(matches, "geolocation", GeolocationStrategy);
        }
        if let Some(tool) = matches.value_of("features tool") {
            config.fluorescence.features = true;
            config.fluorescence.features_tool = tool.into();
        }

        let datasets = matches
            .values_of("datasets")
            .unwrap()
            .map(|f| f.into())
            .collect();

        Ok(Args {
            datasets,
            config,
            progress: !matches.is_present("quiet"),
        })
    }
}
