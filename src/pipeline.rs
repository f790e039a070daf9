use crate::catalog::VoiceProfile;
use crate::config::{Config, OutputFormat, UploadFormat};
use crate::convert::{ConversionRequest, ConvertedSegment, ElevenLabsClient, VoiceConverter};
use crate::cost::CostLedger;
use crate::error::{Result, RevoiceError};
use crate::media::{
    classify, encode_for_upload, extract_audio, merge_segments, read_wav_metadata, replace_audio,
    split_wav, MediaAsset, MediaKind, Segment,
};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Longest segment sent to the converter, in milliseconds.
    pub max_segment_ms: u64,
    pub upload_format: UploadFormat,
    /// Encoding the converter returns.
    pub output_format: OutputFormat,
    /// Conversions in flight at once. Results are always consumed in order.
    pub concurrency: usize,
    pub show_progress: bool,
    /// Parent for the per-run scratch directory (system temp dir if unset).
    pub work_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_segment_ms: config.max_segment_ms,
            upload_format: config.upload_format,
            output_format: config.output_format,
            concurrency: config.concurrency.max(1),
            show_progress: true,
            work_dir: None,
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Classifying,
    Extracting,
    Segmenting,
    Converting { index: usize, total: usize },
    Merging,
    Reassembling,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Classifying => write!(f, "classifying"),
            PipelineStage::Extracting => write!(f, "extracting"),
            PipelineStage::Segmenting => write!(f, "segmenting"),
            PipelineStage::Converting { index, total } => {
                write!(f, "converting {}/{}", index + 1, total)
            }
            PipelineStage::Merging => write!(f, "merging"),
            PipelineStage::Reassembling => write!(f, "reassembling"),
            PipelineStage::Done => write!(f, "done"),
            PipelineStage::Failed => write!(f, "failed"),
        }
    }
}

/// Statistics from one run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub conversion_time: Duration,
    /// Stages entered, in order.
    pub stages: Vec<PipelineStage>,
    pub converter: String,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct PipelineResult {
    pub output_path: PathBuf,
    pub kind: MediaKind,
    pub voice_id: String,
    pub segments: usize,
    /// Converted audio duration.
    pub duration_ms: u64,
    /// Billed minutes, rounded up.
    pub minutes: u64,
    pub cost: f64,
    pub stats: PipelineStats,
}

/// Scratch directory for one run, removed when dropped.
struct WorkDir {
    temp_dir: Option<TempDir>,
    cancelled: Arc<AtomicBool>,
}

impl WorkDir {
    fn create(parent: Option<&Path>, cancelled: Arc<AtomicBool>) -> Result<Self> {
        let temp_dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                TempDir::new_in(parent)?
            }
            None => TempDir::new()?,
        };
        debug!("Using temp directory: {:?}", temp_dir.path());
        Ok(Self {
            temp_dir: Some(temp_dir),
            cancelled,
        })
    }

    fn path(&self) -> &Path {
        self.temp_dir
            .as_ref()
            .map(|t| t.path())
            .unwrap_or_else(|| Path::new("."))
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Some(temp_dir) = self.temp_dir.take() {
            let path = temp_dir.path().to_path_buf();
            if self.cancelled.load(Ordering::Relaxed) {
                warn!("Pipeline cancelled, cleaning up temp files: {:?}", path);
            } else {
                debug!("Cleaning up temp directory: {:?}", path);
            }
            if let Err(e) = temp_dir.close() {
                warn!("Failed to remove {:?}: {e}", path);
            }
        }
    }
}

/// Splits media into segments, converts them in order and reassembles the result.
pub struct VoiceChangePipeline {
    converter: Arc<dyn VoiceConverter>,
    config: PipelineConfig,
}

impl VoiceChangePipeline {
    pub fn new(config: PipelineConfig, converter: Arc<dyn VoiceConverter>) -> Self {
        Self { converter, config }
    }

    /// Convert `input` into `output` with `voice`.
    ///
    /// Setting `cancelled` stops the run between stages and before the next
    /// segment is submitted.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        voice: &VoiceProfile,
        cancelled: Arc<AtomicBool>,
    ) -> Result<PipelineResult> {
        let mut stages = Vec::new();
        let result = self
            .execute(input, output, voice, cancelled, &mut stages)
            .await;

        if let Err(ref e) = result {
            enter(&mut stages, PipelineStage::Failed);
            match e.segment_index() {
                Some(index) => warn!("Voice change failed at segment {index}: {}", e.root()),
                None => warn!("Voice change failed: {e}"),
            }
        }
        result
    }

    async fn execute(
        &self,
        input: &Path,
        output: &Path,
        voice: &VoiceProfile,
        cancelled: Arc<AtomicBool>,
        stages: &mut Vec<PipelineStage>,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();

        if !input.exists() {
            return Err(RevoiceError::FileNotFound(input.display().to_string()));
        }

        enter(stages, PipelineStage::Classifying);
        let kind = classify(input);
        info!("Input {} classified as {}", input.display(), kind);
        check_output_path(kind, output)?;

        let work_dir = WorkDir::create(self.config.work_dir.as_deref(), cancelled.clone())?;
        let work_path = work_dir.path().to_path_buf();
        check_cancelled(&cancelled)?;

        // Stage 1: decoded audio buffer
        let extraction_start = Instant::now();
        let source = match (kind, read_wav_metadata(input)) {
            (MediaKind::Audio, Ok(metadata)) => {
                debug!("Input is already 16-bit PCM WAV");
                MediaAsset {
                    path: input.to_path_buf(),
                    kind,
                    duration_ms: metadata.duration_ms,
                }
            }
            _ => {
                enter(stages, PipelineStage::Extracting);
                let decoded = work_path.join("source.wav");
                let metadata = extract_audio(input, &decoded).await?;
                MediaAsset {
                    path: decoded,
                    kind,
                    duration_ms: metadata.duration_ms,
                }
            }
        };
        let extraction_time = extraction_start.elapsed();
        debug!(
            "Source {} audio: {:.1}s at {}",
            source.kind,
            source.duration_ms as f64 / 1000.0,
            source.path.display()
        );
        check_cancelled(&cancelled)?;

        // Stage 2: segmentation
        enter(stages, PipelineStage::Segmenting);
        let segment_dir = work_path.join("segments");
        let segments = split_wav(&source.path, self.config.max_segment_ms, &segment_dir)?;
        let segment_count = segments.len();
        check_cancelled(&cancelled)?;

        // Stage 3: conversion
        let conversion_start = Instant::now();
        let mut ledger = CostLedger::new(voice.price_per_min);
        let converted = self
            .convert_all(segments, &voice.id, &segment_dir, &mut ledger, &cancelled, stages)
            .await?;
        let conversion_time = conversion_start.elapsed();

        // Stage 4: merge
        let merged = if converted.is_empty() {
            info!("No audio to convert; output keeps the empty input audio");
            source.path.clone()
        } else {
            enter(stages, PipelineStage::Merging);
            let target = match kind {
                MediaKind::Audio => output.to_path_buf(),
                MediaKind::Video => work_path.join("merged.wav"),
            };
            let merged = merge_segments(
                converted,
                segment_count,
                self.config.output_format,
                &work_path,
                &target,
            )
            .await;
            if let Err(e) = merged {
                if target.exists() {
                    let _ = fs::remove_file(&target);
                }
                return Err(e);
            }
            target
        };

        // Stage 5: output
        match kind {
            MediaKind::Audio => {
                if merged != output {
                    fs::copy(&merged, output)?;
                }
            }
            MediaKind::Video => {
                check_cancelled(&cancelled)?;
                enter(stages, PipelineStage::Reassembling);
                replace_audio(input, &merged, output).await?;
            }
        }

        enter(stages, PipelineStage::Done);
        drop(work_dir);

        info!(
            "Converted {} segments ({} min billed, ${:.2})",
            segment_count,
            ledger.minutes(),
            ledger.cost()
        );

        Ok(PipelineResult {
            output_path: output.to_path_buf(),
            kind,
            voice_id: voice.id.clone(),
            segments: segment_count,
            duration_ms: ledger.total_ms(),
            minutes: ledger.minutes(),
            cost: ledger.cost(),
            stats: PipelineStats {
                total_time: start_time.elapsed(),
                extraction_time,
                conversion_time,
                stages: stages.clone(),
                converter: self.converter.name().to_string(),
            },
        })
    }

    /// Convert segments in index order, stopping at the first failure.
    ///
    /// Each segment file is deleted once its conversion lands. On failure the
    /// remaining segment files and all converted audio are discarded before the
    /// error is returned.
    async fn convert_all(
        &self,
        segments: Vec<Segment>,
        voice_id: &str,
        segment_dir: &Path,
        ledger: &mut CostLedger,
        cancelled: &Arc<AtomicBool>,
        stages: &mut Vec<PipelineStage>,
    ) -> Result<Vec<ConvertedSegment>> {
        let total = segments.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        info!(
            "Converting {} segments with {} (concurrency: {})",
            total,
            self.converter.name(),
            self.config.concurrency
        );

        let progress_bar = if self.config.show_progress {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let upload_format = self.config.upload_format;
        let in_flight = self.config.concurrency.max(1);
        let mut results = Box::pin(
            stream::iter(segments.into_iter().map(|segment| {
                let converter = self.converter.clone();
                let voice_id = voice_id.to_string();
                let cancelled = cancelled.clone();
                async move {
                    if cancelled.load(Ordering::Relaxed) {
                        return (segment, Err(RevoiceError::Cancelled));
                    }
                    let outcome =
                        convert_segment(converter.as_ref(), &segment, &voice_id, upload_format)
                            .await;
                    (segment, outcome)
                }
            }))
            .buffered(in_flight),
        );

        let mut converted = Vec::with_capacity(total);
        let mut submitted = 0;

        loop {
            // `buffered` pulls the next segments in on this poll, keeping
            // `in_flight` requests open behind the ones already landed.
            while submitted < total && submitted < converted.len() + in_flight {
                enter(
                    stages,
                    PipelineStage::Converting {
                        index: submitted,
                        total,
                    },
                );
                submitted += 1;
            }

            let Some((segment, outcome)) = results.next().await else {
                break;
            };
            remove_segment_file(&segment);

            match outcome {
                Ok(audio) => {
                    ledger.record(segment.duration_ms);
                    debug!(
                        "Segment {} converted ({} bytes, {}ms)",
                        segment.index,
                        audio.len(),
                        segment.duration_ms
                    );
                    converted.push(ConvertedSegment {
                        index: segment.index,
                        audio,
                        voice_id: voice_id.to_string(),
                        duration_ms: segment.duration_ms,
                    });
                    if let Some(ref pb) = progress_bar {
                        pb.inc(1);
                    }
                }
                Err(e) => {
                    drop(results);
                    drop(converted);
                    if let Some(pb) = progress_bar {
                        pb.abandon_with_message("Conversion failed");
                    }
                    if segment_dir.exists() {
                        if let Err(io) = fs::remove_dir_all(segment_dir) {
                            warn!("Failed to remove {:?}: {io}", segment_dir);
                        }
                    }
                    warn!(
                        "Stopped after {}/{} segments; {:.1} min converted so far (${:.2})",
                        ledger.segments(),
                        total,
                        ledger.total_ms() as f64 / 60_000.0,
                        ledger.cost()
                    );
                    if matches!(e, RevoiceError::Cancelled) {
                        return Err(e);
                    }
                    return Err(RevoiceError::Segment {
                        index: segment.index,
                        source: Box::new(e),
                    });
                }
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Conversion complete");
        }

        Ok(converted)
    }
}

async fn convert_segment(
    converter: &dyn VoiceConverter,
    segment: &Segment,
    voice_id: &str,
    upload_format: UploadFormat,
) -> Result<Vec<u8>> {
    let payload = encode_for_upload(&segment.path, upload_format).await?;
    let request = ConversionRequest {
        index: segment.index,
        voice_id: voice_id.to_string(),
        audio: payload,
    };
    converter.convert(&request).await
}

fn enter(stages: &mut Vec<PipelineStage>, stage: PipelineStage) {
    match stage {
        PipelineStage::Converting { .. } | PipelineStage::Done | PipelineStage::Failed => {
            debug!("Stage: {}", stage)
        }
        _ => info!("Stage: {}", stage),
    }
    stages.push(stage);
}

/// Audio runs write PCM WAV, so the output must carry a `.wav` extension.
pub fn check_output_path(kind: MediaKind, output: &Path) -> Result<()> {
    if kind == MediaKind::Video {
        return Ok(());
    }
    let is_wav = output
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    if !is_wav {
        return Err(RevoiceError::Config(format!(
            "Audio output is written as WAV; use a .wav path instead of {}",
            output.display()
        )));
    }
    Ok(())
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(RevoiceError::Cancelled);
    }
    Ok(())
}

fn remove_segment_file(segment: &Segment) {
    if segment.path.exists() {
        if let Err(e) = fs::remove_file(&segment.path) {
            warn!("Failed to remove segment file {}: {e}", segment.path.display());
        }
    }
}

/// Default output path: `<stem>_changed_<voice>.wav`, or the input's
/// extension for video.
pub fn derive_output_path(input: &Path, kind: MediaKind, voice_id: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let extension = match kind {
        MediaKind::Audio => "wav".to_string(),
        MediaKind::Video => input
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string()),
    };
    input.with_file_name(format!("{stem}_changed_{voice_id}.{extension}"))
}

/// Convert `input` with the ElevenLabs client built from `config`.
pub async fn change_voice(
    input: &Path,
    output: &Path,
    config: &Config,
    voice: &VoiceProfile,
    cancelled: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    config.validate()?;
    let client = ElevenLabsClient::from_config(config)?;
    let pipeline = VoiceChangePipeline::new(PipelineConfig::from_config(config), Arc::new(client));
    pipeline.run(input, output, voice, cancelled).await
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Voice Change Complete                     ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", result.output_path.display());
    println!("  Voice:      {}", result.voice_id);
    println!("  Converter:  {}", result.stats.converter);
    println!(
        "  Duration:   {:.1}s audio in {} segments",
        result.duration_ms as f64 / 1000.0,
        result.segments
    );
    println!("  Billed:     {} min", result.minutes);
    println!("  Cost:       ${:.2}", result.cost);
    println!();
    println!("  Timing:");
    println!(
        "    Extract:     {:.2}s",
        result.stats.extraction_time.as_secs_f64()
    );
    println!(
        "    Convert:     {:.2}s",
        result.stats.conversion_time.as_secs_f64()
    );
    println!(
        "    Total:       {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
