/// Example: Load an STL file and export a single framed render without a window
///
/// Usage: cargo run --example load_stl -- path/to/file.stl [output.png]
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use meshview_viewer::batch::output_path_for;
use meshview_viewer::{RenderCoordinator, RenderTarget, SceneRenderer};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <stl-file> [output.png]", args[0]);
        std::process::exit(1);
    }

    let input = PathBuf::from(&args[1]);
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| output_path_for(&input, None));

    let mut renderer = RenderCoordinator::initialize(800, 800, RenderTarget::Headless)
        .context("Failed to initialize renderer")?;
    renderer
        .load_mesh(&input)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    if let Some(mesh) = renderer.mesh() {
        println!(
            "Loaded {} triangles, extent {:?}",
            mesh.triangles.len(),
            mesh.dimensions()
        );
    }

    renderer.center_camera_on_mesh();
    renderer.render_to_file(&output, false)?;
    println!("Wrote {}", output.display());
    Ok(())
}
