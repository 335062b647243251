//! Fluorescence feature images produced by an external tool.
//!
//! The PSII feature set (dark- and light-adapted Fm, Fv, Fv/Fm,
//! Phi_PSII, NPQ, qN, qP, Rfd) is computed by a compiled octave
//! program. It reads a directory of frame captures and writes one
//! PNG per feature next to a given output base name.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{info, warn};

use crate::error::{Error, Result};

/// Suffixes of the feature images, appended to the output base.
pub const FEATURE_SUFFIXES: [&str; 11] = [
    "_Fm_dark",
    "_Fv_dark",
    "_FvFm_dark",
    "_Fm_light",
    "_Fv_light",
    "_FvFm_light",
    "_Phi_PSII",
    "_NPQ",
    "_qN",
    "_qP",
    "_Rfd",
];

pub fn feature_paths(out_base: &Path) -> Vec<PathBuf> {
    FEATURE_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut name = out_base.as_os_str().to_owned();
            name.push(suffix);
            name.push(".png");
            PathBuf::from(name)
        })
        .collect()
}

/// Produces feature images from a directory of frames.
pub trait FeatureExtractor {
    /// Returns the feature images that exist after extraction.
    fn extract(&self, input_dir: &Path, out_base: &Path) -> Result<Vec<PathBuf>>;
}

fn existing_outputs(out_base: &Path) -> Vec<PathBuf> {
    feature_paths(out_base)
        .into_iter()
        .filter(|p| {
            let found = p.is_file();
            if !found {
                warn!("feature image missing: {}", p.display());
            }
            found
        })
        .collect()
}

/// Invokes `octave --eval "PSII('<dark>','<light>','<out>')"`.
#[derive(Debug, Clone)]
pub struct OctaveFeatureExtractor {
    pub program: String,
}

impl Default for OctaveFeatureExtractor {
    fn default() -> Self {
        OctaveFeatureExtractor {
            program: "octave".into(),
        }
    }
}

impl FeatureExtractor for OctaveFeatureExtractor {
    fn extract(&self, input_dir: &Path, out_base: &Path) -> Result<Vec<PathBuf>> {
        // light-adapted frames currently share the dark directory
        let script = format!(
            "PSII('{}','{}','{}')",
            input_dir.display(),
            input_dir.display(),
            out_base.display()
        );
        info!("running {} --eval {:?}", self.program, script);

        let status = Command::new(&self.program)
            .arg("--eval")
            .arg(&script)
            .status()
            .map_err(|e| Error::ExternalTool(format!("could not start `{}`: {}", self.program, e)))?;
        if !status.success() {
            return Err(Error::ExternalTool(format!(
                "`{}` exited with {}",
                self.program, status
            )));
        }
        Ok(existing_outputs(out_base))
    }
}

/// Writes fixed bytes to every feature path. Used where the
/// external tool is unavailable.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatureExtractor {
    pub contents: Vec<u8>,
}

impl FeatureExtractor for StaticFeatureExtractor {
    fn extract(&self, _input_dir: &Path, out_base: &Path) -> Result<Vec<PathBuf>> {
        let paths = feature_paths(out_base);
        for p in paths.iter() {
            fs::write(p, &self.contents)?;
        }
        Ok(paths)
    }
}
