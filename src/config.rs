//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is built once (from defaults, a JSON file
//! or the builder) and passed by reference to every stage.

use std::{fs::File, io::BufReader, ops::Range, path::{Path, PathBuf}};

use serde_derive::*;

use crate::{
    decode::SPECTRAL_VALUE_RANGE,
    error::{Error, Result},
    geo::{GeolocationConfig, GeolocationStrategy},
    preview::PreviewConfig,
    sensor::FrameLayout,
    temperature::AmbientConditions,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ThermalConfig {
    pub layout: FrameLayout,
    /// Counter-clockwise quarter turns applied after decoding.
    pub rotation: u8,
    pub preview: PreviewConfig,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        ThermalConfig {
            layout: FrameLayout::THERMAL,
            rotation: 3,
            preview: PreviewConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FluorescenceConfig {
    pub layout: FrameLayout,
    /// Frames `0000..frame_count` of a sequence are used.
    pub frame_count: usize,
    /// Write each frame as a grayscale PNG.
    pub frame_previews: bool,
    pub histogram_bins: usize,
    pub preview: PreviewConfig,
    /// Run the external feature extractor as well.
    pub features: bool,
    pub features_tool: String,
}

impl Default for FluorescenceConfig {
    fn default() -> Self {
        FluorescenceConfig {
            layout: FrameLayout::FLUORESCENCE,
            frame_count: 101,
            frame_previews: true,
            histogram_bins: 20,
            preview: PreviewConfig::default(),
            features: false,
            features_tool: "octave".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_root: PathBuf,
    pub overwrite: bool,
    /// Agent name of the completion metadata this pipeline writes.
    pub extractor_name: String,
    pub geolocation: GeolocationConfig,
    pub ambient: AmbientConditions,
    pub thermal: ThermalConfig,
    pub fluorescence: FluorescenceConfig,
    pub spectral_value_range: Range<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            output_root: "./output".into(),
            overwrite: false,
            extractor_name: "terra.gantry-raster".into(),
            geolocation: GeolocationConfig::default(),
            ambient: AmbientConditions::default(),
            thermal: ThermalConfig::default(),
            fluorescence: FluorescenceConfig::default(),
            spectral_value_range: SPECTRAL_VALUE_RANGE,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load from JSON; absent fields take their defaults.
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let rdr = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(rdr)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for layout in [&self.thermal.layout, &self.fluorescence.layout].iter() {
            if layout.num_samples() == 0 {
                return Err(Error::Config(format!("empty frame layout {:?}", layout)));
            }
        }
        if self.fluorescence.frame_count < 2 {
            return Err(Error::Config("fluorescence sequences need at least 2 frames".into()));
        }
        if self.fluorescence.histogram_bins == 0 {
            return Err(Error::Config("histogram needs at least one bin".into()));
        }
        for preview in [&self.thermal.preview, &self.fluorescence.preview].iter() {
            if let Some((lo, hi)) = preview.window {
                if !(hi > lo) {
                    return Err(Error::Config(format!("empty preview window {}..{}", lo, hi)));
                }
            }
        }
        if self.spectral_value_range.start >= self.spectral_value_range.end {
            return Err(Error::Config("empty spectral value range".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn output_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.config.output_root = root.into();
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    pub fn extractor_name(mut self, name: &str) -> Self {
        self.config.extractor_name = name.into();
        self
    }

    pub fn geolocation(mut self, strategy: GeolocationStrategy) -> Self {
        self.config.geolocation.strategy = strategy;
        self
    }

    pub fn height_corrected_fov(mut self, enable: bool) -> Self {
        self.config.geolocation.height_corrected_fov = enable;
        self
    }

    pub fn ambient(mut self, ambient: AmbientConditions) -> Self {
        self.config.ambient = ambient;
        self
    }

    pub fn thermal(mut self, thermal: ThermalConfig) -> Self {
        self.config.thermal = thermal;
        self
    }

    pub fn fluorescence(mut self, fluorescence: FluorescenceConfig) -> Self {
        self.config.fluorescence = fluorescence;
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl From<PipelineConfig> for PipelineConfigBuilder {
    fn from(config: PipelineConfig) -> Self {
        PipelineConfigBuilder { config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SampleType;
    use std::fs;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert!(!config.overwrite);
        assert_eq!(config.thermal.layout.sample, SampleType::U16);
        assert_eq!(config.thermal.rotation, 3);
        assert_eq!(config.fluorescence.frame_count, 101);
        assert_eq!(config.spectral_value_range, 49..66);
        assert_eq!(config.geolocation.strategy, GeolocationStrategy::GreatCircle);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "overwrite": true,
                "geolocation": { "strategy": "surveyed-affine" },
                "thermal": { "preview": { "palette": "jet", "window": [13000, 18000] } }
            }"#,
        )
        .unwrap();
        let config = PipelineConfig::from_json_path(&path).unwrap();
        assert!(config.overwrite);
        assert_eq!(config.geolocation.strategy, GeolocationStrategy::SurveyedAffine);
        assert!(!config.geolocation.height_corrected_fov);
        assert_eq!(config.thermal.preview.window, Some((13000., 18000.)));
        assert_eq!(config.thermal.layout, FrameLayout::THERMAL);
        assert_eq!(config.ambient, AmbientConditions::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PipelineConfig::builder()
            .fluorescence(FluorescenceConfig {
                frame_count: 1,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "overwrite": "yes" }"#).unwrap();
        assert!(matches!(PipelineConfig::from_json_path(&path), Err(Error::Config(_))));
    }

    #[test]
    fn builder_overrides() {
        let config = PipelineConfig::builder()
            .output_root("/tmp/out")
            .overwrite(true)
            .geolocation(GeolocationStrategy::SurveyedAffine)
            .build()
            .unwrap();
        assert_eq!(config.output_root, PathBuf::from("/tmp/out"));
        assert!(config.overwrite);
    }
}
