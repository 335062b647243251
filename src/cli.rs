//! Helpers to parse CLI arguments and run batches in the
//! accompanying binary.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

pub use clap::{App, Arg};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::error;

use crate::{
    features::FeatureExtractor, pipeline::RunOutcome, platform::Platform, raster::RasterSink,
    Pipeline,
};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Tally of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn merge(self, other: Self) -> Self {
        BatchSummary {
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
        }
    }
}

/// Run every dataset in parallel. Each dataset runs to completion
/// on one worker; errors are logged and counted, never propagated.
pub fn process_datasets_par<S, F, P>(
    pipeline: &Pipeline<S, F>,
    platform: &P,
    dataset_ids: &[String],
    show_progress: bool,
) -> BatchSummary
where
    S: RasterSink + Sync,
    F: FeatureExtractor + Sync,
    P: Platform + Sync,
{
    let bar = if show_progress {
        ProgressBar::new(dataset_ids.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );

    dataset_ids
        .par_iter()
        .progress_with(bar)
        .map(|id| match pipeline.run(platform, id) {
            Ok(RunOutcome::Processed(report)) if report.is_complete() => BatchSummary {
                processed: 1,
                ..Default::default()
            },
            Ok(RunOutcome::Processed(_)) => BatchSummary {
                failed: 1,
                ..Default::default()
            },
            Ok(RunOutcome::Skipped(_)) => BatchSummary {
                skipped: 1,
                ..Default::default()
            },
            Err(e) => {
                error!("{}: {}", id, e);
                BatchSummary {
                    failed: 1,
                    ..Default::default()
                }
            }
        })
        .reduce(BatchSummary::default, BatchSummary::merge)
}
