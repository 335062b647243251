//! Per-dataset orchestration.
//!
//! A dataset goes through [`Pipeline::check`] (should it be
//! processed at all?) and [`Pipeline::process`] (decode, calibrate,
//! geolocate, emit). [`Pipeline::run`] ties both to a [`Platform`],
//! uploads what was produced and records completion metadata.
//!
//! Everything that establishes the physical grid or its bounding
//! box happens before the first file is written, so a dataset
//! either fails without output or produces its artifacts. Each
//! artifact is written independently: one failing does not stop
//! the others, but it does withhold the completion record so the
//! dataset is picked up again later.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ndarray::Array2;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::PipelineConfig,
    decode::{decode, decode_spectral_value},
    error::{Error, Result},
    features::FeatureExtractor,
    fluorescence::{analyze_sequence, Histogram},
    geo::{self, BoundingBox},
    metadata::{MeasurementMetadata, MEASUREMENT_KEY},
    platform::Platform,
    preview::{create_image, render_histogram, write_grayscale_png},
    raster::RasterSink,
    sensor::SensorKind,
    temperature::{calibrate, CalibrationParameters},
    trait_table::{write_mean_temperature, write_spectral_values, MeanTemperatureRecord},
};

const METADATA_CONTEXT: &str = "https://clowder.ncsa.illinois.edu/contexts/metadata.jsonld";
const THERMAL_SUFFIX: &str = "_ir.bin";
const DATASET_METADATA_SUFFIX: &str = "_dataset_metadata.json";
const METADATA_SUFFIX: &str = "_metadata.json";

pub const HISTOGRAM_NAME: &str = "combined_hist.png";
pub const FVFM_PREVIEW_NAME: &str = "combined_pseudocolored.png";
pub const FVFM_RASTER_NAME: &str = "combined_fvfm.tif";
pub const FVFM_VISUAL_RASTER_NAME: &str = "combined_pseudocolored.tif";
pub const SPECTRAL_TABLE_NAME: &str = "extracted_values.csv";

/// A dataset as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub files: Vec<PathBuf>,
}

impl Dataset {
    /// Name is the last component of `id`.
    pub fn new<S: Into<String>>(id: S, files: Vec<PathBuf>) -> Self {
        let id = id.into();
        let name = Path::new(&id)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone());
        Dataset { id, name, files }
    }

    fn find_file(&self, suffix: &str) -> Option<&PathBuf> {
        self.files.iter().find(|p| file_name(p).ends_with(suffix))
    }

    fn missing(&self, pattern: &str) -> Error {
        Error::NotFound(Path::new(&self.id).join(pattern))
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Whether a dataset should be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDecision {
    Ignore(String),
    Download,
    AlreadyProcessed,
}

/// Outputs of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    pub dataset_id: String,
    pub kind: SensorKind,
    pub created: Vec<PathBuf>,
    /// Outputs left in place from an earlier run.
    pub existing: Vec<PathBuf>,
    pub failures: Vec<String>,
}

impl ProcessReport {
    fn new(dataset_id: &str, kind: SensorKind) -> Self {
        ProcessReport {
            dataset_id: dataset_id.into(),
            kind,
            created: vec![],
            existing: vec![],
            failures: vec![],
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Write one artifact, recording its outcome. Existing files are
    /// kept unless `overwrite`.
    fn emit<W>(&mut self, overwrite: bool, path: PathBuf, write: W)
    where
        W: FnOnce(&Path) -> Result<()>,
    {
        if !overwrite && path.exists() {
            debug!("keeping existing {}", path.display());
            self.existing.push(path);
            return;
        }
        match write(&path) {
            Ok(()) => {
                info!("wrote {}", path.display());
                self.created.push(path);
            }
            Err(e) => {
                error!("{}: {}", self.dataset_id, e);
                // a partial file would pass for finished output next run
                if path.exists() {
                    if let Err(rm) = fs::remove_file(&path) {
                        warn!("could not remove {}: {}", path.display(), rm);
                    }
                }
                self.failures.push(e.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Processed(ProcessReport),
    Skipped(String),
}

/// `"<sensor> - <date>__<time>"` maps to `<root>/<date>/<date>__<time>`.
pub fn output_dir(root: &Path, dataset_name: &str) -> PathBuf {
    let timestamp = match dataset_name.find(" - ") {
        Some(idx) => &dataset_name[idx + 3..],
        None => dataset_name,
    };
    match timestamp.find("__") {
        Some(idx) => root.join(&timestamp[..idx]).join(timestamp),
        None => root.join(timestamp),
    }
}

/// Whether `record` is a completion record written by `extractor`.
pub fn is_completed_by(record: &Value, extractor: &str) -> bool {
    record
        .get("agent")
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
        .map_or(false, |name| name.contains(extractor))
}

pub struct Pipeline<S, F> {
    config: PipelineConfig,
    sink: S,
    features: F,
}

impl<S: RasterSink, F: FeatureExtractor> Pipeline<S, F> {
    pub fn new(config: PipelineConfig, sink: S, features: F) -> Self {
        Pipeline {
            config,
            sink,
            features,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Measurement metadata from platform records, then from
    /// sidecar files of the dataset.
    pub fn find_metadata(
        &self,
        dataset: &Dataset,
        records: &[Value],
    ) -> Result<Option<MeasurementMetadata>> {
        if let Some(md) = MeasurementMetadata::find_in_records(records) {
            return Ok(Some(md));
        }
        let sidecar = dataset.find_file(DATASET_METADATA_SUFFIX).or_else(|| {
            dataset
                .files
                .iter()
                .find(|p| file_name(p).ends_with(METADATA_SUFFIX) && file_name(p) != METADATA_SUFFIX)
        });
        match sidecar {
            Some(path) => MeasurementMetadata::from_json_path(path).map(Some),
            None => Ok(None),
        }
    }

    pub fn resolve_kind(&self, dataset: &Dataset, metadata: Option<&MeasurementMetadata>) -> Option<SensorKind> {
        SensorKind::resolve(
            metadata.and_then(MeasurementMetadata::sensor_fixed),
            &dataset.name,
            dataset.files.iter().map(|p| file_name(p)),
        )
    }

    fn frame_files(&self, dataset: &Dataset) -> Vec<Option<PathBuf>> {
        (0..self.config.fluorescence.frame_count)
            .map(|idx| dataset.find_file(&format!("{:04}.bin", idx)).cloned())
            .collect()
    }

    /// Primary outputs whose presence means the dataset was done.
    fn expected_outputs(&self, dataset: &Dataset, kind: SensorKind) -> Vec<PathBuf> {
        let out_dir = output_dir(&self.config.output_root, &dataset.name);
        match kind {
            SensorKind::Thermal => match dataset.find_file(THERMAL_SUFFIX) {
                Some(bin) => {
                    let base = file_name(bin).trim_end_matches(THERMAL_SUFFIX);
                    vec![
                        out_dir.join(format!("{}.png", base)),
                        out_dir.join(format!("{}.tif", base)),
                    ]
                }
                None => vec![],
            },
            SensorKind::Fluorescence => vec![
                out_dir.join(HISTOGRAM_NAME),
                out_dir.join(FVFM_PREVIEW_NAME),
                out_dir.join(FVFM_RASTER_NAME),
            ],
            SensorKind::Ndvi | SensorKind::Pri => vec![out_dir.join(SPECTRAL_TABLE_NAME)],
        }
    }

    pub fn check(&self, dataset: &Dataset, records: &[Value]) -> CheckDecision {
        let metadata = match self.find_metadata(dataset, records) {
            Ok(md) => md,
            Err(e) => return CheckDecision::Ignore(format!("unreadable metadata: {}", e)),
        };
        let kind = match self.resolve_kind(dataset, metadata.as_ref()) {
            Some(kind) => kind,
            None => return CheckDecision::Ignore("unrecognised sensor".into()),
        };

        if !self.config.overwrite {
            if records
                .iter()
                .any(|r| is_completed_by(r, &self.config.extractor_name))
            {
                return CheckDecision::AlreadyProcessed;
            }
            let expected = self.expected_outputs(dataset, kind);
            if !expected.is_empty() && expected.iter().all(|p| p.exists()) {
                return CheckDecision::AlreadyProcessed;
            }
        }

        match kind {
            SensorKind::Thermal if dataset.find_file(THERMAL_SUFFIX).is_none() => {
                return CheckDecision::Ignore(format!("no {} file", THERMAL_SUFFIX));
            }
            SensorKind::Fluorescence => {
                let found = self.frame_files(dataset).iter().filter(|f| f.is_some()).count();
                let needed = self.config.fluorescence.frame_count;
                if found < needed {
                    return CheckDecision::Ignore(format!(
                        "only {} of {} fluorescence frames",
                        found, needed
                    ));
                }
            }
            SensorKind::Ndvi | SensorKind::Pri if dataset.find_file(".bin").is_none() => {
                return CheckDecision::Ignore("no .bin files".into());
            }
            _ => {}
        }

        let needs_metadata = matches!(kind, SensorKind::Thermal | SensorKind::Fluorescence);
        if needs_metadata && metadata.is_none() {
            return CheckDecision::Ignore("no measurement metadata".into());
        }
        CheckDecision::Download
    }

    /// Produce all outputs of a downloaded dataset.
    pub fn process(&self, dataset: &Dataset, records: &[Value]) -> Result<ProcessReport> {
        let metadata = self.find_metadata(dataset, records)?;
        let kind = self
            .resolve_kind(dataset, metadata.as_ref())
            .ok_or_else(|| Error::Metadata(format!("cannot tell sensor of {}", dataset.name)))?;

        let out_dir = output_dir(&self.config.output_root, &dataset.name);
        fs::create_dir_all(&out_dir)?;
        info!(?kind, "writing outputs to {}", out_dir.display());

        let mut report = ProcessReport::new(&dataset.id, kind);
        match kind {
            SensorKind::Thermal => {
                self.process_thermal(dataset, metadata.as_ref(), &out_dir, &mut report)?
            }
            SensorKind::Fluorescence => {
                self.process_fluorescence(dataset, metadata.as_ref(), &out_dir, &mut report)?
            }
            SensorKind::Ndvi | SensorKind::Pri => {
                self.process_spectral(dataset, kind, &out_dir, &mut report)?
            }
        }
        Ok(report)
    }

    fn bounding_box(&self, metadata: &MeasurementMetadata) -> Result<BoundingBox> {
        let position = metadata.position()?;
        let bbox = geo::resolve(&position, &self.config.geolocation)?;
        debug!(?bbox, "resolved extent");
        Ok(bbox)
    }

    fn process_thermal(
        &self,
        dataset: &Dataset,
        metadata: Option<&MeasurementMetadata>,
        out_dir: &Path,
        report: &mut ProcessReport,
    ) -> Result<()> {
        let cfg = &self.config;
        let bin = dataset
            .find_file(THERMAL_SUFFIX)
            .ok_or_else(|| dataset.missing("*_ir.bin"))?;
        let md = metadata.ok_or_else(|| Error::missing_key(MEASUREMENT_KEY))?;
        let base = file_name(bin).trim_end_matches(THERMAL_SUFFIX).to_string();

        let frame = decode(bin, &cfg.thermal.layout)?.rotated(cfg.thermal.rotation);
        let calib = CalibrationParameters::from_sensor_fixed(md.sensor_fixed_map()?);
        let temps = calibrate(&frame, &calib, &cfg.ambient)?;
        let position = md.position()?;
        let bbox = self.bounding_box(md)?;

        // a fixed window is given in raw counts
        let raw_preview = cfg.thermal.preview.window.map(|_| frame.to_f64());
        let preview_grid = raw_preview.as_ref().unwrap_or(&temps);

        let overwrite = cfg.overwrite;
        report.emit(overwrite, out_dir.join(format!("{}.png", base)), |p| {
            create_image(preview_grid, &cfg.thermal.preview, p)
        });
        report.emit(overwrite, out_dir.join(format!("{}.tif", base)), |p| {
            self.sink.write_float(&temps, &bbox, p)
        });
        match temps.mean() {
            Some(mean) => {
                let record = MeanTemperatureRecord::new(&position.scan_time, mean, &dataset.name);
                report.emit(overwrite, out_dir.join(format!("{}_meantemp.csv", base)), |p| {
                    write_mean_temperature(p, &record)
                });
            }
            None => warn!("empty temperature grid; no mean temperature"),
        }
        Ok(())
    }

    fn process_fluorescence(
        &self,
        dataset: &Dataset,
        metadata: Option<&MeasurementMetadata>,
        out_dir: &Path,
        report: &mut ProcessReport,
    ) -> Result<()> {
        let cfg = &self.config.fluorescence;
        let overwrite = self.config.overwrite;

        let paths = self
            .frame_files(dataset)
            .into_iter()
            .enumerate()
            .map(|(idx, p)| p.ok_or_else(|| dataset.missing(&format!("*{:04}.bin", idx))))
            .collect::<Result<Vec<_>>>()?;
        let frames = paths
            .iter()
            .map(|p| decode(p, &cfg.layout)?.into_u8())
            .collect::<Result<Vec<Array2<u8>>>>()?;

        let result = analyze_sequence(&frames)?;
        info!(fmax = result.fmax_index, "Fv/Fm computed");
        let md = metadata.ok_or_else(|| Error::missing_key(MEASUREMENT_KEY))?;
        let bbox = self.bounding_box(md)?;

        if cfg.frame_previews {
            for (path, frame) in paths.iter().zip(frames.iter()) {
                let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                report.emit(overwrite, out_dir.join(format!("{}.png", stem)), |p| {
                    write_grayscale_png(frame, p)
                });
            }
        }

        let hist = Histogram::from_values(&result.fv_fm, cfg.histogram_bins);
        report.emit(overwrite, out_dir.join(HISTOGRAM_NAME), |p| render_histogram(&hist, p));
        report.emit(overwrite, out_dir.join(FVFM_PREVIEW_NAME), |p| {
            create_image(&result.fv_fm, &cfg.preview, p)
        });
        report.emit(overwrite, out_dir.join(FVFM_RASTER_NAME), |p| {
            self.sink.write_float(&result.fv_fm, &bbox, p)
        });
        report.emit(overwrite, out_dir.join(FVFM_VISUAL_RASTER_NAME), |p| {
            self.sink.write_rgb(&cfg.preview.colorize(&result.fv_fm), &bbox, p)
        });

        if cfg.features {
            let leaf = out_dir.file_name().map(PathBuf::from).unwrap_or_default();
            let out_base = out_dir.join(leaf);
            match self.features.extract(Path::new(&dataset.id), &out_base) {
                Ok(outputs) => report.created.extend(outputs),
                Err(e) => {
                    error!("{}: {}", dataset.id, e);
                    report.failures.push(e.to_string());
                }
            }
        }
        Ok(())
    }

    fn process_spectral(
        &self,
        dataset: &Dataset,
        kind: SensorKind,
        out_dir: &Path,
        report: &mut ProcessReport,
    ) -> Result<()> {
        let values = dataset
            .files
            .iter()
            .filter(|p| file_name(p).ends_with(".bin"))
            .map(|p| Ok((p.clone(), decode_spectral_value(p, self.config.spectral_value_range.clone())?)))
            .collect::<Result<Vec<_>>>()?;
        if values.is_empty() {
            return Err(dataset.missing("*.bin"));
        }
        report.emit(self.config.overwrite, out_dir.join(SPECTRAL_TABLE_NAME), |p| {
            write_spectral_values(p, kind, &values)
        });
        Ok(())
    }

    /// JSON-LD record marking the dataset as done.
    pub fn completion_record(&self, dataset_id: &str, file_ids: &[String]) -> Value {
        let name = &self.config.extractor_name;
        json!({
            "@context": [METADATA_CONTEXT],
            "dataset_id": dataset_id,
            "content": {
                "status": "COMPLETED",
                "files_created": file_ids,
            },
            "agent": {
                "@type": "cat:extractor",
                "name": name,
                "extractor_id": format!("https://clowder.ncsa.illinois.edu/api/extractors/{}", name),
            }
        })
    }

    /// Check, process, upload and mark one dataset.
    #[instrument(skip(self, platform))]
    pub fn run<P: Platform>(&self, platform: &P, dataset_id: &str) -> Result<RunOutcome> {
        let records = platform.get_metadata(dataset_id)?;
        let files = platform.download(dataset_id)?;
        let dataset = Dataset::new(dataset_id, files);

        match self.check(&dataset, &records) {
            CheckDecision::Ignore(reason) => {
                info!("skipping {}: {}", dataset_id, reason);
                return Ok(RunOutcome::Skipped(reason));
            }
            CheckDecision::AlreadyProcessed => {
                info!("skipping {}: already processed", dataset_id);
                return Ok(RunOutcome::Skipped("already processed".into()));
            }
            CheckDecision::Download => {}
        }

        let mut report = self.process(&dataset, &records)?;

        let mut file_ids = vec![];
        for path in report.created.iter().filter(|p| !dataset.files.contains(p)) {
            match platform.upload(dataset_id, path) {
                Ok(id) => file_ids.push(id),
                Err(e) => {
                    error!("upload of {} failed: {}", path.display(), e);
                    report.failures.push(e.to_string());
                }
            }
        }

        if report.is_complete() {
            platform.put_metadata(dataset_id, self.completion_record(dataset_id, &file_ids))?;
            info!(files = file_ids.len(), "completed {}", dataset_id);
        } else {
            warn!(
                failures = report.failures.len(),
                "{} incomplete; not marking as processed", dataset_id
            );
        }
        Ok(RunOutcome::Processed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        features::StaticFeatureExtractor,
        metadata::tests::sample_record,
        platform::LocalPlatform,
        raster::GeoTiffWriter,
        sensor::{FrameLayout, SampleType},
    };
    use ndarray::Array3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
    }

    impl RasterSink for CountingSink {
        fn write_float(&self, grid: &Array2<f64>, bbox: &BoundingBox, path: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            GeoTiffWriter.write_float(grid, bbox, path)
        }

        fn write_rgb(&self, rgb: &Array3<u8>, bbox: &BoundingBox, path: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            GeoTiffWriter.write_rgb(rgb, bbox, path)
        }
    }

    struct FailingSink;

    impl RasterSink for FailingSink {
        fn write_float(&self, _: &Array2<f64>, _: &BoundingBox, path: &Path) -> Result<()> {
            Err(Error::raster_write(path, "disk full"))
        }

        fn write_rgb(&self, _: &Array3<u8>, _: &BoundingBox, path: &Path) -> Result<()> {
            Err(Error::raster_write(path, "disk full"))
        }
    }

    /// Leaves a truncated file behind before failing.
    struct PartialSink;

    impl RasterSink for PartialSink {
        fn write_float(&self, _: &Array2<f64>, _: &BoundingBox, path: &Path) -> Result<()> {
            fs::write(path, b"II*\0")?;
            Err(Error::raster_write(path, "connection reset"))
        }

        fn write_rgb(&self, _: &Array3<u8>, _: &BoundingBox, path: &Path) -> Result<()> {
            fs::write(path, b"II*\0")?;
            Err(Error::raster_write(path, "connection reset"))
        }
    }

    const SMALL_THERMAL: FrameLayout = FrameLayout {
        width: 8,
        height: 6,
        sample: SampleType::U16,
        header_bytes: 0,
    };

    fn config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::builder().output_root(root).build().unwrap();
        config.thermal.layout = SMALL_THERMAL;
        config.fluorescence.layout = FrameLayout {
            width: 4,
            height: 3,
            sample: SampleType::U8,
            header_bytes: 0,
        };
        config.fluorescence.frame_count = 6;
        config
    }

    fn thermal_dataset(dir: &Path) -> PathBuf {
        let ds = dir.join("flirIrCamera - 2017-04-27__10-00-00");
        fs::create_dir_all(&ds).unwrap();
        let raw: Vec<u8> = (0..SMALL_THERMAL.num_samples())
            .flat_map(|i| (3000 + i as u16).to_le_bytes().to_vec())
            .collect();
        fs::write(ds.join("0a1b_ir.bin"), raw).unwrap();
        fs::write(
            ds.join("0a1b_metadata.json"),
            serde_json::to_vec(&sample_record()).unwrap(),
        )
        .unwrap();
        ds
    }

    #[test]
    fn output_directory_convention() {
        let root = Path::new("/out");
        assert_eq!(
            output_dir(root, "flirIrCamera - 2017-04-27__10-00-00-123"),
            Path::new("/out/2017-04-27/2017-04-27__10-00-00-123")
        );
        assert_eq!(output_dir(root, "loose"), Path::new("/out/loose"));
    }

    #[test]
    fn completion_records_are_recognised() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path()), GeoTiffWriter, StaticFeatureExtractor::default());
        let record = pipeline.completion_record("ds", &["a".into()]);
        assert!(is_completed_by(&record, "terra.gantry-raster"));
        assert_eq!(record["content"]["files_created"], json!(["a"]));
        assert!(!is_completed_by(&json!({"agent": {"name": "other"}}), "terra.gantry-raster"));
    }

    #[test]
    fn check_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let ds = thermal_dataset(dir.path());
        let pipeline = Pipeline::new(config(&dir.path().join("out")), GeoTiffWriter, StaticFeatureExtractor::default());

        let files = LocalPlatform::new(dir.path()).download(ds.to_str().unwrap()).unwrap();
        let dataset = Dataset::new(ds.to_str().unwrap(), files.clone());
        assert_eq!(pipeline.check(&dataset, &[]), CheckDecision::Download);

        let done = pipeline.completion_record(&dataset.id, &[]);
        assert_eq!(pipeline.check(&dataset, &[done]), CheckDecision::AlreadyProcessed);

        let no_bin = Dataset::new(
            dataset.id.clone(),
            files.into_iter().filter(|p| !file_name(p).ends_with(THERMAL_SUFFIX)).collect(),
        );
        assert!(matches!(pipeline.check(&no_bin, &[]), CheckDecision::Ignore(_)));

        let unknown = Dataset::new("/data/stereoTop - 2017", vec![]);
        assert_eq!(
            pipeline.check(&unknown, &[]),
            CheckDecision::Ignore("unrecognised sensor".into())
        );
    }

    #[test]
    fn thermal_outputs_and_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let ds = thermal_dataset(dir.path());
        let out = dir.path().join("out");
        let pipeline = Pipeline::new(config(&out), CountingSink::default(), StaticFeatureExtractor::default());
        let platform = LocalPlatform::new(&out);
        let id = ds.to_str().unwrap();

        let report = match pipeline.run(&platform, id).unwrap() {
            RunOutcome::Processed(report) => report,
            other => panic!("unexpected: {:?}", other),
        };
        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(report.kind, SensorKind::Thermal);
        assert_eq!(report.created.len(), 3);
        let out_dir = out.join("2017-04-27").join("2017-04-27__10-00-00");
        for name in ["0a1b.png", "0a1b.tif", "0a1b_meantemp.csv"].iter() {
            assert!(out_dir.join(name).is_file(), "{}", name);
        }
        assert_eq!(pipeline.sink().calls.load(Ordering::SeqCst), 1);

        let tif = fs::read(out_dir.join("0a1b.tif")).unwrap();
        assert_eq!(
            pipeline.run(&platform, id).unwrap(),
            RunOutcome::Skipped("already processed".into())
        );
        assert_eq!(pipeline.sink().calls.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read(out_dir.join("0a1b.tif")).unwrap(), tif);
        assert_eq!(platform.get_metadata(id).unwrap().len(), 1);
    }

    #[test]
    fn failed_artifact_withholds_completion() {
        let dir = tempfile::tempdir().unwrap();
        let ds = thermal_dataset(dir.path());
        let out = dir.path().join("out");
        let pipeline = Pipeline::new(config(&out), FailingSink, StaticFeatureExtractor::default());
        let platform = LocalPlatform::new(&out);

        let report = match pipeline.run(&platform, ds.to_str().unwrap()).unwrap() {
            RunOutcome::Processed(report) => report,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(report.failures.len(), 1);
        // preview and table still written
        assert_eq!(report.created.len(), 2);
        assert!(platform.get_metadata(ds.to_str().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn partial_artifact_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let ds = thermal_dataset(dir.path());
        let out = dir.path().join("out");
        let platform = LocalPlatform::new(&out);
        let id = ds.to_str().unwrap();
        let tif = out.join("2017-04-27").join("2017-04-27__10-00-00").join("0a1b.tif");

        let broken = Pipeline::new(config(&out), PartialSink, StaticFeatureExtractor::default());
        match broken.run(&platform, id).unwrap() {
            RunOutcome::Processed(report) => assert_eq!(report.failures.len(), 1),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!tif.exists());

        let healthy = Pipeline::new(config(&out), CountingSink::default(), StaticFeatureExtractor::default());
        let report = match healthy.run(&platform, id).unwrap() {
            RunOutcome::Processed(report) => report,
            other => panic!("unexpected: {:?}", other),
        };
        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(report.created, vec![tif.clone()]);
        assert_eq!(report.existing.len(), 2);
        assert_eq!(healthy.sink().calls.load(Ordering::SeqCst), 1);
        assert!(fs::metadata(&tif).unwrap().len() > 4);
    }

    #[test]
    fn truncated_capture_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let ds = thermal_dataset(dir.path());
        fs::write(ds.join("0a1b_ir.bin"), [0u8; 10]).unwrap();
        let out = dir.path().join("out");
        let pipeline = Pipeline::new(config(&out), CountingSink::default(), StaticFeatureExtractor::default());

        let err = pipeline.run(&LocalPlatform::new(&out), ds.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.aborts_dataset());
        assert_eq!(pipeline.sink().calls.load(Ordering::SeqCst), 0);
        let out_dir = out.join("2017-04-27").join("2017-04-27__10-00-00");
        assert_eq!(fs::read_dir(out_dir).unwrap().count(), 0);
    }

    #[test]
    fn fluorescence_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dir.path().join("ps2Top - 2017-06-01__03-14-15");
        fs::create_dir_all(&ds).unwrap();
        for idx in 0..6u8 {
            let value = match idx {
                0 => 2,
                1 => 100,
                4 => 200,
                _ => 150,
            };
            fs::write(ds.join(format!("ab_{:04}.bin", idx)), vec![value; 12]).unwrap();
        }
        fs::write(ds.join("ab_0006.bin"), b"<xml/>").unwrap();
        fs::write(ds.join("ab_metadata.json"), serde_json::to_vec(&sample_record()).unwrap()).unwrap();

        let out = dir.path().join("out");
        let mut cfg = config(&out);
        cfg.fluorescence.features = true;
        let pipeline = Pipeline::new(cfg, CountingSink::default(), StaticFeatureExtractor::default());
        let report = match pipeline.run(&LocalPlatform::new(&out), ds.to_str().unwrap()).unwrap() {
            RunOutcome::Processed(report) => report,
            other => panic!("unexpected: {:?}", other),
        };
        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(report.kind, SensorKind::Fluorescence);
        // 6 frames, 4 aggregates, 11 features
        assert_eq!(report.created.len(), 21);
        assert_eq!(pipeline.sink().calls.load(Ordering::SeqCst), 2);

        let out_dir = out.join("2017-06-01").join("2017-06-01__03-14-15");
        assert!(out_dir.join("ab_0005.png").is_file());
        assert!(!out_dir.join("ab_0006.png").exists());
        assert!(out_dir.join("2017-06-01__03-14-15_Rfd.png").is_file());
        assert!(out_dir.join(FVFM_VISUAL_RASTER_NAME).is_file());
    }

    #[test]
    fn spectral_values_table() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dir.path().join("ndviSensor - 2017-05-01__12-00-00");
        fs::create_dir_all(&ds).unwrap();
        let mut record = vec![b' '; 80];
        record[49..55].copy_from_slice(b"0.6125");
        fs::write(ds.join("a.bin"), &record).unwrap();

        let out = dir.path().join("out");
        let pipeline = Pipeline::new(config(&out), CountingSink::default(), StaticFeatureExtractor::default());
        let outcome = pipeline.run(&LocalPlatform::new(&out), ds.to_str().unwrap()).unwrap();
        assert!(matches!(outcome, RunOutcome::Processed(ref r) if r.kind == SensorKind::Ndvi));

        let table = out.join("2017-05-01").join("2017-05-01__12-00-00").join(SPECTRAL_TABLE_NAME);
        assert_eq!(fs::read_to_string(table).unwrap(), "file_name,NDVI\na.bin,0.6125\n");
    }
}
