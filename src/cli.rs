// ============================================================================
// PaintFE core CLI: headless inspection and export of project files
// ============================================================================
//
// Usage examples:
//   paintfe-core info drawing.pfc
//   paintfe-core export-layer drawing.pfc --layer 1 --output ink.png
//   paintfe-core new --width 800 --height 600 --output blank.pfc
//
// Everything runs synchronously on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::canvas::Document;
use crate::io::{self, ProjectError};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "paintfe-core",
    about = "Inspect, export and create PaintFE project files without a GUI"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print canvas size, layer stack and selection of a project.
    Info {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },
    /// Write one layer of a project as a PNG image.
    ExportLayer {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        /// Stack index, 0 = bottom layer.
        #[arg(short, long, default_value_t = 0)]
        layer: usize,
        #[arg(short, long, value_name = "FILE.png")]
        output: PathBuf,
    },
    /// Create an empty project with a white background layer.
    New {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(short, long, value_name = "FILE.pfc")]
        output: PathBuf,
    },
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one CLI command and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let result = match args.command {
        CliCommand::Info { project } => info(&project).map(|text| print!("{}", text)),
        CliCommand::ExportLayer { project, layer, output } => export_layer(&project, layer, &output),
        CliCommand::New { width, height, output } => new_project(width, height, &output),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Human-readable summary of a project file.
pub fn info(path: &Path) -> Result<String, ProjectError> {
    let doc = io::load_project(path)?;
    Ok(describe(&doc))
}

fn describe(doc: &Document) -> String {
    let mut out = format!(
        "Canvas: {}x{}\nLayers: {}\n",
        doc.width(),
        doc.height(),
        doc.layer_count()
    );
    let active = doc.active_layer_id();
    for (index, layer) in doc.layers().enumerate() {
        out.push_str(&format!(
            "  [{}] {}{} (opacity {:.0}%, {}{})\n",
            index,
            layer.name,
            if Some(layer.id) == active { " *" } else { "" },
            layer.opacity * 100.0,
            layer.blend_mode.name(),
            if layer.visible { "" } else { ", hidden" },
        ));
    }
    match doc.selection().bounds() {
        Some(b) => out.push_str(&format!(
            "Selection: {:?} at ({}, {}) {}x{}\n",
            doc.selection().shape(),
            b.x,
            b.y,
            b.width,
            b.height
        )),
        None => out.push_str("Selection: none\n"),
    }
    out
}

pub fn export_layer(project: &Path, index: usize, output: &Path) -> Result<(), ProjectError> {
    let doc = io::load_project(project)?;
    let layer = doc.layer_at(index).ok_or_else(|| {
        ProjectError::InvalidFormat(format!(
            "layer index {} out of range (project has {} layers)",
            index,
            doc.layer_count()
        ))
    })?;
    layer
        .pixels
        .save_with_format(output, image::ImageFormat::Png)
        .map_err(|e| ProjectError::InvalidFormat(format!("failed to write {}: {}", output.display(), e)))?;
    log_info!("exported layer {} of {} to {}", index, project.display(), output.display());
    Ok(())
}

pub fn new_project(width: u32, height: u32, output: &Path) -> Result<(), ProjectError> {
    if width == 0 || height == 0 || width > io::MAX_DIMENSION || height > io::MAX_DIMENSION {
        return Err(ProjectError::InvalidFormat(format!(
            "canvas size {}x{} outside 1..={}",
            width,
            height,
            io::MAX_DIMENSION
        )));
    }
    io::save_project(&Document::new(width, height), output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_export_layer() {
        let args = CliArgs::try_parse_from([
            "paintfe-core",
            "export-layer",
            "a.pfc",
            "--layer",
            "2",
            "--output",
            "out.png",
        ])
        .unwrap();
        match args.command {
            CliCommand::ExportLayer { layer, output, .. } => {
                assert_eq!(layer, 2);
                assert_eq!(output, PathBuf::from("out.png"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn new_rejects_zero_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.pfc");
        assert!(new_project(0, 10, &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn new_then_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.pfc");
        new_project(12, 7, &path).unwrap();
        let text = info(&path).unwrap();
        assert!(text.starts_with("Canvas: 12x7\nLayers: 1\n"));
        assert!(text.contains("Background *"));
        assert!(text.ends_with("Selection: none\n"));
    }

    #[test]
    fn export_missing_layer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.pfc");
        new_project(4, 4, &path).unwrap();
        let err = export_layer(&path, 3, &dir.path().join("x.png")).unwrap_err();
        assert!(matches!(err, ProjectError::InvalidFormat(_)));
    }

    #[test]
    fn export_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.pfc");
        let png = dir.path().join("bg.png");
        new_project(5, 3, &path).unwrap();
        export_layer(&path, 0, &png).unwrap();
        let img = image::open(&png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (5, 3));
        assert_eq!(img.get_pixel(4, 2).0, [255, 255, 255, 255]);
    }
}
