// crates/bactrace-cli/src/sink.rs

//! File-writing sink: best-fit, overlay, and residual images per frame,
//! plus the lineage CSV at the end of the run.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use bactrace_core::engine::{FrameArtifacts, FrameSink, LineageRow};
use bactrace_core::Result;
use bactrace_imaging::{save_grayscale, save_rgb};

/// Writes every artifact under the configured directories, naming each
/// output after the input micrograph of its frame.
pub struct PngSink {
    image_names: Vec<String>,
    bestfit_dir: PathBuf,
    output_dir: PathBuf,
    residual_dir: Option<PathBuf>,
    lineage_path: PathBuf,
}

impl PngSink {
    pub fn new(
        image_names: Vec<String>,
        bestfit_dir: PathBuf,
        output_dir: PathBuf,
        residual_dir: Option<PathBuf>,
        lineage_path: PathBuf,
    ) -> Result<Self> {
        fs::create_dir_all(&bestfit_dir)?;
        fs::create_dir_all(&output_dir)?;
        if let Some(dir) = &residual_dir {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            image_names,
            bestfit_dir,
            output_dir,
            residual_dir,
            lineage_path,
        })
    }
}

impl FrameSink for PngSink {
    fn emit_frame(&mut self, artifacts: &FrameArtifacts<'_>) -> Result<()> {
        let name = self.image_names[artifacts.frame_index].as_str();
        save_grayscale(&self.bestfit_dir.join(name), artifacts.bestfit)?;
        save_rgb(&self.output_dir.join(name), &artifacts.overlay)?;
        if let (Some(dir), Some(residual)) = (&self.residual_dir, &artifacts.residual) {
            save_rgb(&dir.join(name), residual)?;
        }
        Ok(())
    }

    fn emit_lineage(&mut self, rows: &[LineageRow]) -> Result<()> {
        let file = File::create(&self.lineage_path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "image_name,cell_name,x,y,width,length,rotation")?;
        for row in rows {
            writeln!(
                writer,
                "{},{},{},{},{},{},{}",
                self.image_names[row.frame_index],
                row.name,
                row.x,
                row.y,
                row.width,
                row.length,
                row.rotation
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn writes_artifacts_and_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSink::new(
            vec!["frame0.png".into()],
            dir.path().join("bestfit"),
            dir.path().join("output"),
            Some(dir.path().join("residual")),
            dir.path().join("lineage.csv"),
        )
        .unwrap();

        let bestfit = Array2::from_elem((8, 8), 0.5);
        let overlay = Array3::from_elem((8, 8, 3), 0.5);
        let residual = Array3::from_elem((8, 8, 3), 1.0);
        sink.emit_frame(&FrameArtifacts {
            frame_index: 0,
            bestfit: &bestfit,
            overlay,
            residual: Some(residual),
        })
        .unwrap();

        sink.emit_lineage(&[LineageRow {
            frame_index: 0,
            name: "a".into(),
            x: 4.0,
            y: 4.0,
            width: 3.0,
            length: 6.0,
            rotation: 0.0,
        }])
        .unwrap();

        assert!(dir.path().join("bestfit/frame0.png").exists());
        assert!(dir.path().join("output/frame0.png").exists());
        assert!(dir.path().join("residual/frame0.png").exists());
        let csv = std::fs::read_to_string(dir.path().join("lineage.csv")).unwrap();
        assert!(csv.starts_with("image_name,cell_name"));
        assert!(csv.contains("frame0.png,a,4,4,3,6,0"));
    }
}
