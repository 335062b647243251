mod args;

use anyhow::{ensure, Result};
use gantry_raster::{
    cli::process_datasets_par, features::OctaveFeatureExtractor, logger,
    platform::LocalPlatform, raster::GeoTiffWriter, Pipeline,
};

use crate::args::Args;

fn main() -> Result<()> {
    logger::init();
    let args = Args::from_cmd_line()?;

    let platform = LocalPlatform::new(&args.config.output_root);
    let features = OctaveFeatureExtractor {
        program: args.config.fluorescence.features_tool.clone(),
    };
    let pipeline = Pipeline::new(args.config, GeoTiffWriter, features);

    let summary = process_datasets_par(&pipeline, &platform, &args.datasets, args.progress);

    eprintln!(
        "Processed {} datasets, skipped {}, failed {}",
        summary.processed, summary.skipped, summary.failed
    );
    ensure!(summary.failed == 0, "{} datasets failed", summary.failed);
    Ok(())
}
