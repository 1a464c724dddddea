/// meshview - STL viewer and PNG exporter
///
/// With no inputs the interactive viewer opens on a placeholder cube.
/// Files or `--batch-dir` export one PNG per mesh without opening a window.
/// Controls in the viewer:
///   - Left drag: Orbit
///   - Wheel: Zoom
///   - C / R: Centre on mesh / reset view
///   - P: Toggle perspective / orthographic
///   - S: Save the current view
///   - Q/ESC: Quit
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;
use meshview_core::Color;
use meshview_viewer::config::DEFAULT_CONFIG_FILE;
use meshview_viewer::{
    collect_inputs, run_batch, RenderCoordinator, RenderTarget, ViewerApp, ViewerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "meshview", version, about = "View STL meshes and export PNG renders")]
struct Cli {
    /// STL files to export (or to open with --interactive)
    files: Vec<PathBuf>,

    /// Export every .stl file in this directory
    #[arg(long, value_name = "DIR")]
    batch_dir: Option<PathBuf>,

    /// Write `<stem>.png` here instead of `<stem>_render.png` next to each input
    #[arg(long, short, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Export RGBA with a transparent background
    #[arg(long)]
    transparent: bool,

    #[arg(long, value_name = "R,G,B")]
    background: Option<Color>,

    /// Model colour
    #[arg(long, value_name = "R,G,B")]
    color: Option<Color>,

    #[arg(long, allow_negative_numbers = true)]
    yaw: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pitch: Option<f32>,

    #[arg(long)]
    distance: Option<f32>,

    /// Frame each mesh instead of using the stored orbit
    #[arg(long)]
    frame: bool,

    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Open the first file in the viewer instead of exporting
    #[arg(long, short)]
    interactive: bool,
}

impl Cli {
    fn is_batch(&self) -> bool {
        !self.interactive && (!self.files.is_empty() || self.batch_dir.is_some())
    }

    fn apply_overrides(&self, config: &mut ViewerConfig) {
        if let Some(width) = self.width {
            config.render.output_width = width;
        }
        if let Some(height) = self.height {
            config.render.output_height = height;
        }
        if self.transparent {
            config.render.transparent_background = true;
        }
        if let Some(background) = self.background {
            config.render.background_color = background.into();
        }
        if let Some(color) = self.color {
            config.render.model_color = color.into();
        }
        if let Some(yaw) = self.yaw {
            config.camera.yaw = yaw;
        }
        if let Some(pitch) = self.pitch {
            config.camera.pitch = pitch;
        }
        if let Some(distance) = self.distance {
            config.camera.distance = distance;
        }
        if self.frame {
            config.camera.frame_on_load = true;
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = ViewerConfig::load(&cli.config).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    if !cli.is_batch() {
        ViewerApp::new(config, cli.config.clone(), cli.files.first().cloned()).run()?;
        return Ok(ExitCode::SUCCESS);
    }

    let inputs = collect_inputs(&cli.files, cli.batch_dir.as_deref())?;
    if inputs.is_empty() {
        error!("No STL files to export");
        return Ok(ExitCode::FAILURE);
    }
    if let Some(dir) = &cli.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let (width, height) = config.render.output_size();
    let mut renderer = RenderCoordinator::initialize(width, height, RenderTarget::Headless)
        .context("Failed to initialize headless renderer")?;
    renderer.set_background_color(config.render.background());
    renderer.set_model_color(config.render.model());

    let summary = run_batch(&mut renderer, &inputs, &config, cli.output_dir.as_deref());
    for (path, reason) in &summary.failures {
        error!("{}: {reason}", path.display());
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_inputs_opens_viewer() {
        let cli = Cli::try_parse_from(["meshview"]).unwrap();
        assert!(!cli.is_batch());
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_files_select_batch_unless_interactive() {
        let cli = Cli::try_parse_from(["meshview", "a.stl", "b.stl"]).unwrap();
        assert!(cli.is_batch());
        assert_eq!(cli.files.len(), 2);

        let cli = Cli::try_parse_from(["meshview", "a.stl", "--interactive"]).unwrap();
        assert!(!cli.is_batch());

        let cli = Cli::try_parse_from(["meshview", "--batch-dir", "models"]).unwrap();
        assert!(cli.is_batch());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "meshview",
            "part.stl",
            "--width",
            "640",
            "--transparent",
            "--background",
            "0,0,0",
            "--color",
            "0.1, 0.2, 0.9",
            "--yaw",
            "-1.2",
            "--pitch",
            "-0.4",
            "--frame",
        ])
        .unwrap();

        let mut config = ViewerConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.render.output_size(), (640, 1024));
        assert!(config.render.transparent_background);
        assert_eq!(config.render.background_color, [0.0, 0.0, 0.0]);
        assert_eq!(config.render.model_color, [0.1, 0.2, 0.9]);
        assert_eq!(config.camera.yaw, -1.2);
        assert_eq!(config.camera.pitch, -0.4);
        assert_eq!(config.camera.distance, 2.0);
        assert!(config.camera.frame_on_load);
    }

    #[test]
    fn test_bad_colour_is_rejected() {
        assert!(Cli::try_parse_from(["meshview", "--color", "orange"]).is_err());
    }
}
