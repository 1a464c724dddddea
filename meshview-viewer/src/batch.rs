//! Headless batch export: load, render and encode each input in turn.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::config::ViewerConfig;
use crate::error::RenderError;
use crate::renderer::SceneRenderer;

/// Outcome of one batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failures: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    /// A run succeeds only if at least one file was exported; an empty input list is a failure.
    pub fn is_success(&self) -> bool {
        self.succeeded > 0
    }
}

/// `.stl` extension, any case.
pub(crate) fn is_stl(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("stl"))
        .unwrap_or(false)
}

/// Explicit files first, then the `.stl` files directly inside `dir` in name order.
pub fn collect_inputs(files: &[PathBuf], dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut inputs = files.to_vec();

    if let Some(dir) = dir {
        let mut found = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
        {
            let path = entry
                .with_context(|| format!("Failed to list {}", dir.display()))?
                .path();
            if path.is_file() && is_stl(&path) {
                found.push(path);
            }
        }
        found.sort();
        info!("Found {} STL files in {}", found.len(), dir.display());
        inputs.extend(found);
    }

    Ok(inputs)
}

/// `<stem>_render.png` beside the input, or `<output_dir>/<stem>.png`.
pub fn output_path_for(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "mesh".into());

    match output_dir {
        Some(dir) => {
            let mut name = stem;
            name.push(".png");
            dir.join(name)
        }
        None => {
            let mut name = stem;
            name.push("_render.png");
            input.with_file_name(name)
        }
    }
}

fn export_one<R: SceneRenderer>(
    renderer: &mut R,
    input: &Path,
    output: &Path,
    config: &ViewerConfig,
) -> Result<(), RenderError> {
    renderer.load_mesh(input)?;
    renderer.apply_camera_config(&config.camera);
    renderer.render_to_file(output, config.render.transparent_background)
}

/// Export every input sequentially. Failures are logged and counted; the run never stops early.
pub fn run_batch<R: SceneRenderer>(
    renderer: &mut R,
    inputs: &[PathBuf],
    config: &ViewerConfig,
    output_dir: Option<&Path>,
) -> BatchSummary {
    if inputs.is_empty() {
        warn!("No STL files to export");
    }

    let (width, height) = config.render.output_size();
    renderer.set_output_size(width, height);

    let progress = ProgressBar::new(inputs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut summary = BatchSummary::default();
    for input in inputs {
        progress.set_message(input.display().to_string());
        let output = output_path_for(input, output_dir);

        summary.processed += 1;
        match export_one(renderer, input, &output, config) {
            Ok(()) => summary.succeeded += 1,
            Err(err) => {
                warn!("Failed to export {}: {err}", input.display());
                summary.failures.push((input.clone(), err.to_string()));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    info!(
        "Exported {}/{} files",
        summary.succeeded, summary.processed
    );
    summary
}
