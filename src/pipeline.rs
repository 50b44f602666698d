//! Batch conversion pipeline
//!
//! Architecture:
//! - Resolution: targets -> absolute PNG paths + overrides (batch-fatal on error)
//! - Per image, strictly in order and one at a time:
//!   prepare -> compress -> remove temp file -> patch spritesheet -> delete source
//! - A failure anywhere in one image's chain is logged and recorded, and the
//!   batch moves on to the next image

use crate::crunch::{quality_byte, CompressionJob, Compressor};
use crate::error::ConvertError;
use crate::overrides::OverrideStore;
use crate::paths;
use crate::request::{ConversionRequest, ImageDescriptor};
use crate::resolver::resolve_targets;
use crate::spritesheet::patch_spritesheet;
use crate::textures::prepare_image;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// An image that didn't make it through the pipeline
#[derive(Debug)]
pub struct FailedImage {
    pub path: PathBuf,
    pub error: ConvertError,
}

/// Statistics from a batch run
#[derive(Debug, Default)]
pub struct BatchStats {
    pub images_total: usize,
    pub images_converted: usize,
    pub images_failed: usize,
    pub spritesheets_patched: usize,
    pub sources_deleted: usize,
    /// Details of failed images, in processing order
    pub failures: Vec<FailedImage>,
}

impl BatchStats {
    pub fn has_failures(&self) -> bool {
        self.images_failed > 0
    }
}

/// What happened to one successfully converted image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutcome {
    pub output: PathBuf,
    pub spritesheet_patched: bool,
    pub source_deleted: bool,
}

/// Resolve a request into per-image descriptors.
///
/// The override store lives only for the duration of this call.
pub fn plan(request: &ConversionRequest) -> Result<Vec<ImageDescriptor>, ConvertError> {
    let mut store = OverrideStore::new();
    let images = resolve_targets(&request.targets, &mut store)?;

    Ok(images
        .iter()
        .map(|path| ImageDescriptor::resolve(path, &store, &request.options))
        .collect())
}

fn remove_file(path: &Path) -> Result<(), ConvertError> {
    std::fs::remove_file(path).map_err(|e| ConvertError::io(path, e))
}

/// Drives images through preparation, the encoder, and cleanup
pub struct Pipeline<C: Compressor> {
    compressor: C,
    show_progress: bool,
}

impl<C: Compressor> Pipeline<C> {
    pub fn new(compressor: C) -> Self {
        Self {
            compressor,
            show_progress: false,
        }
    }

    /// Show a progress bar on stderr while processing
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn compressor(&self) -> &C {
        &self.compressor
    }

    /// Resolve and convert a whole batch.
    ///
    /// Only resolution errors are returned; per-image failures are in the stats.
    pub fn run(&self, request: &ConversionRequest) -> Result<BatchStats, ConvertError> {
        let images = plan(request)?;
        Ok(self.process_all(&images))
    }

    /// Convert images one after another, isolating failures
    pub fn process_all(&self, images: &[ImageDescriptor]) -> BatchStats {
        let mut stats = BatchStats {
            images_total: images.len(),
            ..Default::default()
        };

        let pb = if self.show_progress {
            let pb = ProgressBar::new(images.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] Converting [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
                    .expect("progress template is valid")
                    .progress_chars("=>-"),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };

        for desc in images {
            pb.set_message(paths::file_name(&desc.source));

            match self.process_image(desc) {
                Ok(outcome) => {
                    debug!("wrote {}", paths::display_relative(&outcome.output));
                    stats.images_converted += 1;
                    if outcome.spritesheet_patched {
                        stats.spritesheets_patched += 1;
                    }
                    if outcome.source_deleted {
                        stats.sources_deleted += 1;
                    }
                }
                Err(e) => {
                    error!("failed on {}: {}", paths::display_relative(&desc.source), e);
                    stats.images_failed += 1;
                    stats.failures.push(FailedImage {
                        path: desc.source.clone(),
                        error: e,
                    });
                }
            }

            pb.inc(1);
        }

        pb.finish_and_clear();

        info!(
            "Conversion complete: {}/{} succeeded",
            stats.images_converted, stats.images_total
        );

        stats
    }

    /// Run one image through the full chain
    pub fn process_image(&self, desc: &ImageDescriptor) -> Result<ImageOutcome, ConvertError> {
        info!("handling {}", paths::display_relative(&desc.source));

        let prepared = prepare_image(desc)?;

        let job = CompressionJob {
            input: prepared.input.clone(),
            output: desc.output_path(),
            quality: quality_byte(desc.quality),
            format: desc.format,
            rescale: prepared.rescale,
        };

        let compressed = self.compressor.compress(&job);

        // The temp file goes whether or not the encoder succeeded
        if let Some(temp) = &prepared.temp_file {
            info!("removing temp image {}", paths::display_relative(temp));
            let removed = remove_file(temp);
            match (&compressed, removed) {
                (Ok(()), Err(e)) => return Err(e),
                (Err(_), Err(e)) => warn!("{}", e),
                _ => {}
            }
        }
        compressed?;

        let spritesheet_patched = patch_spritesheet(&desc.source, &job.output)?;

        let source_deleted = if desc.delete_source {
            info!("removing source image {}", paths::display_relative(&desc.source));
            remove_file(&desc.source)?;
            true
        } else {
            false
        };

        Ok(ImageOutcome {
            output: job.output,
            spritesheet_patched,
            source_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::ResizeMode;
    use crate::request::{ConvertOptions, OutputFormat, TargetSpec};
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    /// Writes a placeholder texture and remembers every job it was given
    #[derive(Default)]
    struct FakeCompressor {
        jobs: RefCell<Vec<CompressionJob>>,
        fail_on: Option<String>,
    }

    impl Compressor for FakeCompressor {
        fn compress(&self, job: &CompressionJob) -> Result<(), ConvertError> {
            self.jobs.borrow_mut().push(job.clone());
            assert!(job.input.exists(), "encoder input missing: {:?}", job.input);

            if let Some(name) = &self.fail_on {
                if job.input.to_string_lossy().contains(name.as_str()) {
                    return Err(ConvertError::Compression {
                        path: job.input.clone(),
                        message: "encoder exited with 1: boom".to_string(),
                    });
                }
            }

            fs::write(&job.output, b"CRN").map_err(|e| ConvertError::io(&job.output, e))
        }
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba([120, 60, 30, 255]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    fn pattern(dir: &Path, rest: &str) -> String {
        dir.join(rest).to_string_lossy().into_owned()
    }

    fn request(targets: TargetSpec, options: ConvertOptions) -> ConversionRequest {
        ConversionRequest::new(targets, options).unwrap()
    }

    #[test]
    fn test_single_image_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_png(dir, "hero.png", 64, 64);
        fs::write(dir.join("hero.json"), r#"{"meta":{"image":"hero.png"}}"#).unwrap();

        let pipeline = Pipeline::new(FakeCompressor::default());
        let stats = pipeline
            .run(&request(
                TargetSpec::Pattern(pattern(dir, "hero.png")),
                ConvertOptions::default(),
            ))
            .unwrap();

        assert_eq!(stats.images_total, 1);
        assert_eq!(stats.images_converted, 1);
        assert_eq!(stats.spritesheets_patched, 1);
        assert!(!stats.has_failures());

        assert!(dir.join("hero.crn").exists());
        assert!(!dir.join("hero_pma.png").exists());
        assert!(dir.join("hero.png").exists());
        assert_eq!(
            fs::read_to_string(dir.join("hero.json")).unwrap(),
            r#"{"meta":{"image":"hero.crn"}}"#
        );

        let jobs = pipeline.compressor().jobs.borrow();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].input, dir.join("hero_pma.png"));
        assert_eq!(jobs[0].output, dir.join("hero.crn"));
        assert_eq!(jobs[0].quality, 128);
        assert_eq!(jobs[0].format, OutputFormat::Crn);
        assert_eq!(jobs[0].rescale, None);
    }

    #[test]
    fn test_invalid_image_does_not_stop_batch() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_png(dir, "first.png", 64, 64);
        write_png(dir, "second.png", 62, 64);
        write_png(dir, "third.png", 128, 64);

        let manifest = dir.join("list.txt");
        fs::write(
            &manifest,
            format!(
                "{}\n{}\n{}\n",
                pattern(dir, "first.png"),
                pattern(dir, "second.png"),
                pattern(dir, "third.png")
            ),
        )
        .unwrap();

        let pipeline = Pipeline::new(FakeCompressor::default());
        let stats = pipeline
            .run(&request(TargetSpec::Manifest(manifest), ConvertOptions::default()))
            .unwrap();

        assert_eq!(stats.images_total, 3);
        assert_eq!(stats.images_converted, 2);
        assert_eq!(stats.images_failed, 1);
        assert_eq!(stats.failures[0].path, dir.join("second.png"));
        assert!(matches!(
            stats.failures[0].error,
            ConvertError::InvalidDimensions { .. }
        ));

        assert!(dir.join("first.crn").exists());
        assert!(!dir.join("second.crn").exists());
        assert!(dir.join("third.crn").exists());
        assert_eq!(pipeline.compressor().jobs.borrow().len(), 2);
    }

    #[test]
    fn test_compression_failure_cleans_temp_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_png(dir, "a.png", 64, 64);
        write_png(dir, "b.png", 64, 64);
        fs::write(dir.join("a.json"), r#"{"meta":{"image":"a.png"}}"#).unwrap();

        let pipeline = Pipeline::new(FakeCompressor {
            fail_on: Some("a_pma".to_string()),
            ..Default::default()
        });
        let options = ConvertOptions {
            delete_source: true,
            ..Default::default()
        };
        let stats = pipeline
            .run(&request(TargetSpec::Pattern(pattern(dir, "*.png")), options))
            .unwrap();

        assert_eq!(stats.images_failed, 1);
        assert!(matches!(stats.failures[0].error, ConvertError::Compression { .. }));

        // Failed image: temp gone, source and json untouched
        assert!(!dir.join("a_pma.png").exists());
        assert!(dir.join("a.png").exists());
        assert_eq!(
            fs::read_to_string(dir.join("a.json")).unwrap(),
            r#"{"meta":{"image":"a.png"}}"#
        );

        // Next image still converted and its source deleted
        assert!(dir.join("b.crn").exists());
        assert!(!dir.join("b.png").exists());
        assert_eq!(stats.sources_deleted, 1);
    }

    #[test]
    fn test_malformed_spritesheet_fails_image() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_png(dir, "sheet.png", 64, 64);
        fs::write(dir.join("sheet.json"), "{ nope").unwrap();

        let pipeline = Pipeline::new(FakeCompressor::default());
        let options = ConvertOptions {
            delete_source: true,
            ..Default::default()
        };
        let stats = pipeline
            .run(&request(TargetSpec::Pattern(pattern(dir, "sheet.png")), options))
            .unwrap();

        assert_eq!(stats.images_failed, 1);
        assert!(matches!(stats.failures[0].error, ConvertError::MetadataParse { .. }));
        // Source is kept when the chain stops before deletion
        assert!(dir.join("sheet.png").exists());
    }

    #[test]
    fn test_manifest_overrides_reach_encoder() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::create_dir_all(dir.join("icons")).unwrap();
        write_png(dir, "icons/small.png", 30, 30);
        write_png(dir, "plain.png", 64, 64);

        let manifest = dir.join("list.txt");
        fs::write(
            &manifest,
            format!("{} 1 scale\n{}\n", pattern(dir, "icons"), pattern(dir, "plain.png")),
        )
        .unwrap();

        let pipeline = Pipeline::new(FakeCompressor::default());
        let options = ConvertOptions {
            quality: 0.0,
            premultiply: false,
            format: OutputFormat::Dds,
            ..Default::default()
        };
        let stats = pipeline
            .run(&request(TargetSpec::Manifest(manifest), options))
            .unwrap();
        assert_eq!(stats.images_converted, 2);

        let jobs = pipeline.compressor().jobs.borrow();
        assert_eq!(jobs[0].input, dir.join("icons/small.png"));
        assert_eq!(jobs[0].quality, 255);
        assert_eq!(jobs[0].rescale, Some((64, 64)));
        assert_eq!(jobs[0].output, dir.join("icons/small.dds"));

        assert_eq!(jobs[1].quality, 0);
        assert_eq!(jobs[1].rescale, None);
    }

    #[test]
    fn test_path_override_wins_over_earlier_glob() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_png(dir, "a.png", 64, 64);
        write_png(dir, "b.png", 64, 64);

        let manifest = dir.join("list.txt");
        fs::write(
            &manifest,
            format!("{}\n{} 1\n", pattern(dir, "*.png"), pattern(dir, "b.png")),
        )
        .unwrap();

        let pipeline = Pipeline::new(FakeCompressor::default());
        let stats = pipeline
            .run(&request(TargetSpec::Manifest(manifest), ConvertOptions::default()))
            .unwrap();
        assert_eq!(stats.images_converted, 2);

        let jobs = pipeline.compressor().jobs.borrow();
        let quality_for = |name: &str| {
            jobs.iter()
                .find(|j| j.output == dir.join(name))
                .map(|j| j.quality)
        };
        assert_eq!(quality_for("a.crn"), Some(128));
        assert_eq!(quality_for("b.crn"), Some(255));
    }

    #[test]
    fn test_process_image_reports_output() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let source = write_png(dir, "tile.png", 64, 64);

        let pipeline = Pipeline::new(FakeCompressor::default());
        let options = ConvertOptions {
            format: OutputFormat::Dds,
            ..Default::default()
        };
        let desc = ImageDescriptor::resolve(&source, &OverrideStore::new(), &options);

        let outcome = pipeline.process_image(&desc).unwrap();
        assert_eq!(outcome.output, dir.join("tile.dds"));
        assert!(outcome.output.exists());
        assert!(!outcome.spritesheet_patched);
        assert!(!outcome.source_deleted);
    }

    #[test]
    fn test_border_mode_cleans_padded_copy() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_png(dir, "odd.png", 50, 70);

        let pipeline = Pipeline::new(FakeCompressor::default());
        let options = ConvertOptions {
            premultiply: false,
            resize: ResizeMode::Border,
            ..Default::default()
        };
        let stats = pipeline
            .run(&request(TargetSpec::Pattern(pattern(dir, "odd.png")), options))
            .unwrap();

        assert_eq!(stats.images_converted, 1);
        let jobs = pipeline.compressor().jobs.borrow();
        assert_eq!(jobs[0].input, dir.join("odd_border.png"));
        assert!(!dir.join("odd_border.png").exists());
    }

    #[test]
    fn test_resolution_failure_aborts_before_images() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_png(dir, "a.png", 64, 64);

        let pipeline = Pipeline::new(FakeCompressor::default());
        let targets = TargetSpec::Patterns(vec![pattern(dir, "a.png"), pattern(dir, "[.png")]);
        let err = pipeline
            .run(&request(targets, ConvertOptions::default()))
            .unwrap_err();

        assert!(err.is_batch_fatal());
        assert!(pipeline.compressor().jobs.borrow().is_empty());
        assert!(!dir.join("a.crn").exists());
    }

    #[test]
    fn test_undecodable_png_is_per_image() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("bad.png"), b"garbage").unwrap();
        write_png(dir, "good.png", 64, 64);

        let pipeline = Pipeline::new(FakeCompressor::default());
        let stats = pipeline
            .run(&request(
                TargetSpec::Pattern(pattern(dir, "*.png")),
                ConvertOptions::default(),
            ))
            .unwrap();

        assert_eq!(stats.images_failed, 1);
        assert!(matches!(stats.failures[0].error, ConvertError::Decode { .. }));
        assert!(dir.join("good.crn").exists());
    }
}
