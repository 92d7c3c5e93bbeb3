//! FFmpeg-based transcoder implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::config::TranscoderConfig;
use super::error::TranscodeError;
use super::traits::Transcoder;
use super::types::{MixOptions, OutputFormat, SequenceOutput, SequenceRequest, SequenceStage};

/// Filters applied when enhancement is requested, in order.
const ENHANCEMENT_FILTERS: &[&str] = &[
    "highpass=f=80",
    "lowpass=f=16000",
    "acompressor=threshold=-20dB:ratio=3",
    "loudnorm=I=-14:TP=-2:LRA=11",
];

/// Stereo widening filter.
const STEREO_FILTER: &str = "stereotools=mlev=1.2";

/// Number of trailing stderr lines kept in failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// FFmpeg-based transcoder implementation.
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    /// Creates a new FFmpeg transcoder with the given configuration.
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Creates a transcoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TranscoderConfig::default())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Builds an `acrossfade` chain joining `count` inputs into `[out]`.
    fn crossfade_graph(count: usize, crossfade_secs: f64) -> String {
        let mut parts = Vec::with_capacity(count.saturating_sub(1));
        let mut current = "0:a".to_string();

        for i in 1..count {
            let next = if i == count - 1 {
                "out".to_string()
            } else {
                format!("cf{}", i)
            };
            parts.push(format!(
                "[{}][{}:a]acrossfade=d={:.3}:c1=tri:c2=tri[{}]",
                current, i, crossfade_secs, next
            ));
            current = next;
        }

        parts.join(";")
    }

    /// Builds a plain `concat` filter joining `count` inputs into `[out]`.
    fn concat_graph(count: usize) -> String {
        let labels: String = (0..count).map(|i| format!("[{}:a]", i)).collect();
        format!("{}concat=n={}:v=0:a=1[out]", labels, count)
    }

    /// Renders a concat demuxer list file.
    fn concat_list(inputs: &[PathBuf]) -> String {
        inputs
            .iter()
            .map(|path| {
                let escaped = path.to_string_lossy().replace('\'', "'\\''");
                format!("file '{}'\n", escaped)
            })
            .collect()
    }

    /// Arguments shared by every invocation.
    fn base_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-y".to_string(),
        ]
    }

    /// Codec arguments for intermediate files.
    fn intermediate_codec_args(&self) -> Vec<String> {
        vec![
            "-vn".to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            self.config.mp3_bitrate.clone(),
        ]
    }

    /// Metadata arguments from the configured tags.
    fn metadata_args(&self) -> Vec<String> {
        self.config
            .metadata
            .iter()
            .flat_map(|(key, value)| ["-metadata".to_string(), format!("{}={}", key, value)])
            .collect()
    }

    /// Builds ffmpeg arguments for the final encode.
    fn build_final_args(&self, input: &Path, output: &Path, options: &MixOptions) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(["-i".to_string(), input.to_string_lossy().to_string()]);
        args.push("-vn".to_string());

        let mut filters: Vec<&str> = Vec::new();
        if options.enhance {
            filters.extend(ENHANCEMENT_FILTERS);
        }
        if options.stereo {
            filters.push(STEREO_FILTER);
        }
        if !filters.is_empty() {
            args.extend(["-af".to_string(), filters.join(",")]);
        }
        if options.stereo {
            args.extend(["-ac".to_string(), "2".to_string()]);
        }

        match options.format {
            OutputFormat::Wav => {
                args.extend(["-c:a".to_string(), self.config.wav_codec.clone()]);
            }
            OutputFormat::Mp3 => {
                args.extend([
                    "-c:a".to_string(),
                    "libmp3lame".to_string(),
                    "-b:a".to_string(),
                    self.config.mp3_bitrate.clone(),
                ]);
            }
        }

        args.extend(["-ar".to_string(), self.config.sample_rate_hz.to_string()]);
        args.extend(self.metadata_args());
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Builds ffmpeg arguments that join `inputs` through a filter graph.
    fn build_graph_args(&self, inputs: &[PathBuf], graph: &str, output: &Path) -> Vec<String> {
        let mut args = self.base_args();
        for input in inputs {
            args.extend(["-i".to_string(), input.to_string_lossy().to_string()]);
        }
        args.extend([
            "-filter_complex".to_string(),
            graph.to_string(),
            "-map".to_string(),
            "[out]".to_string(),
        ]);
        args.extend(self.intermediate_codec_args());
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Parses `ffprobe -show_entries format=duration` output.
    fn parse_duration(output: &str) -> Result<f64, TranscodeError> {
        let trimmed = output.trim();
        let duration = trimmed.parse::<f64>().map_err(|e| {
            TranscodeError::probe_failed(format!("failed to parse duration '{}': {}", trimmed, e))
        })?;
        if !duration.is_finite() || duration < 0.0 {
            return Err(TranscodeError::probe_failed(format!(
                "invalid duration: {}",
                trimmed
            )));
        }
        Ok(duration)
    }

    /// Keeps the tail of a stderr dump.
    fn stderr_tail(stderr: &[u8]) -> String {
        let text = String::from_utf8_lossy(stderr);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }

    /// Runs ffmpeg with the given arguments.
    async fn run_ffmpeg(&self, step: &str, args: &[String]) -> Result<(), TranscodeError> {
        debug!(step, ?args, "Running ffmpeg");

        let output = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    TranscodeError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(TranscodeError::failed(
                step,
                output.status.code(),
                Self::stderr_tail(&output.stderr),
            ));
        }

        Ok(())
    }

    /// Runs ffprobe and returns its stdout.
    async fn run_ffprobe(&self, args: &[&str], path: &Path) -> Result<String, TranscodeError> {
        let output = Command::new(&self.config.ffprobe_path)
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    TranscodeError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(TranscodeError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Joins the request's inputs into `dest`.
    async fn build_sequence(
        &self,
        request: &SequenceRequest,
        dest: &Path,
    ) -> Result<(), TranscodeError> {
        let inputs = &request.inputs;

        if inputs.len() == 1 {
            let mut args = self.base_args();
            args.extend(["-i".to_string(), inputs[0].to_string_lossy().to_string()]);
            args.extend(self.intermediate_codec_args());
            args.push(dest.to_string_lossy().to_string());
            return self.run_ffmpeg("sequence", &args).await;
        }

        if request.options.crossfade_secs <= 0.0 {
            let absolute = inputs
                .iter()
                .map(std::path::absolute)
                .collect::<Result<Vec<_>, _>>()?;
            let list_path = request.work_dir.join("concat_list.txt");
            tokio::fs::write(&list_path, Self::concat_list(&absolute)).await?;

            let mut args = self.base_args();
            args.extend([
                "-f".to_string(),
                "concat".to_string(),
                "-safe".to_string(),
                "0".to_string(),
                "-i".to_string(),
                list_path.to_string_lossy().to_string(),
            ]);
            args.extend(self.intermediate_codec_args());
            args.push(dest.to_string_lossy().to_string());

            let result = self.run_ffmpeg("concat", &args).await;
            let _ = tokio::fs::remove_file(&list_path).await;
            return result;
        }

        let graph = Self::crossfade_graph(inputs.len(), request.options.crossfade_secs);
        let args = self.build_graph_args(inputs, &graph, dest);
        self.run_ffmpeg("crossfade", &args).await
    }

    /// Repeats `sequence` `loops` times into `dest`, crossfading at the seams.
    async fn build_loops(
        &self,
        sequence: &Path,
        options: &MixOptions,
        dest: &Path,
    ) -> Result<(), TranscodeError> {
        let loops = options.loops as usize;
        let copies = vec![sequence.to_path_buf(); loops];

        let graph = if options.crossfade_secs > 0.0 {
            let duration = self.probe_duration(sequence).await?;
            let crossfade = options.crossfade_secs.min(duration / 2.0);
            Self::crossfade_graph(loops, crossfade)
        } else {
            Self::concat_graph(loops)
        };

        let args = self.build_graph_args(&copies, &graph, dest);
        self.run_ffmpeg("loop", &args).await
    }

    /// Runs the full sequencing algorithm.
    async fn run_sequence(
        &self,
        request: &SequenceRequest,
        stage_tx: Option<mpsc::UnboundedSender<SequenceStage>>,
    ) -> Result<SequenceOutput, TranscodeError> {
        let start = Instant::now();
        let report = |stage: SequenceStage| {
            if let Some(ref tx) = stage_tx {
                let _ = tx.send(stage);
            }
        };

        if request.inputs.is_empty() {
            return Err(TranscodeError::invalid_request("no input files provided"));
        }
        request.options.validate()?;

        tokio::fs::create_dir_all(&request.work_dir).await?;
        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        report(SequenceStage::Sequencing);
        let sequence_path = request.work_dir.join("sequence.mp3");
        self.build_sequence(request, &sequence_path).await?;

        let mut final_source = sequence_path.clone();
        if request.options.loops > 1 {
            report(SequenceStage::Looping);
            let looped_path = request.work_dir.join("looped.mp3");
            self.build_loops(&sequence_path, &request.options, &looped_path)
                .await?;
            final_source = looped_path;
        }

        if request.options.enhance {
            report(SequenceStage::Enhancing);
        } else {
            report(SequenceStage::Finalizing);
        }
        let args = self.build_final_args(&final_source, &request.output_path, &request.options);
        self.run_ffmpeg("encode", &args).await?;

        if request.options.enhance {
            report(SequenceStage::Finalizing);
        }

        let _ = tokio::fs::remove_file(&sequence_path).await;
        if final_source != sequence_path {
            let _ = tokio::fs::remove_file(&final_source).await;
        }

        let meta = tokio::fs::metadata(&request.output_path)
            .await
            .map_err(|_| TranscodeError::OutputMissing {
                path: request.output_path.clone(),
            })?;

        Ok(SequenceOutput {
            output_path: request.output_path.clone(),
            size_bytes: meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(TranscodeError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(TranscodeError::Io(e));
        }

        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(TranscodeError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(TranscodeError::Io(e));
        }

        Ok(())
    }

    async fn validate_input(&self, path: &Path) -> Result<(), TranscodeError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(TranscodeError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !self.supported_input_formats().contains(&extension.as_str()) {
            return Err(TranscodeError::UnsupportedInput { format: extension });
        }

        let stdout = self
            .run_ffprobe(
                &[
                    "-v",
                    "error",
                    "-select_streams",
                    "a:0",
                    "-show_entries",
                    "stream=codec_type",
                    "-of",
                    "csv=p=0",
                ],
                path,
            )
            .await
            .map_err(|e| match e {
                TranscodeError::ProbeFailed { reason } => TranscodeError::InvalidAudio {
                    path: path.to_path_buf(),
                    reason,
                },
                other => other,
            })?;

        if stdout.trim() != "audio" {
            return Err(TranscodeError::InvalidAudio {
                path: path.to_path_buf(),
                reason: "file does not contain an audio stream".to_string(),
            });
        }

        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError> {
        let stdout = self
            .run_ffprobe(
                &[
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ],
                path,
            )
            .await?;
        Self::parse_duration(&stdout)
    }

    async fn sequence(&self, request: SequenceRequest) -> Result<SequenceOutput, TranscodeError> {
        self.run_sequence(&request, None).await
    }

    async fn sequence_with_progress(
        &self,
        request: SequenceRequest,
        stage_tx: mpsc::UnboundedSender<SequenceStage>,
    ) -> Result<SequenceOutput, TranscodeError> {
        self.run_sequence(&request, Some(stage_tx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_crossfade_graph_two_inputs() {
        let graph = FfmpegTranscoder::crossfade_graph(2, 2.0);
        assert_eq!(graph, "[0:a][1:a]acrossfade=d=2.000:c1=tri:c2=tri[out]");
    }

    #[test]
    fn test_crossfade_graph_chain() {
        let graph = FfmpegTranscoder::crossfade_graph(4, 1.5);
        let parts: Vec<&str> = graph.split(';').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "[0:a][1:a]acrossfade=d=1.500:c1=tri:c2=tri[cf1]");
        assert_eq!(parts[1], "[cf1][2:a]acrossfade=d=1.500:c1=tri:c2=tri[cf2]");
        assert_eq!(parts[2], "[cf2][3:a]acrossfade=d=1.500:c1=tri:c2=tri[out]");
    }

    #[test]
    fn test_concat_graph() {
        assert_eq!(
            FfmpegTranscoder::concat_graph(3),
            "[0:a][1:a][2:a]concat=n=3:v=0:a=1[out]"
        );
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = FfmpegTranscoder::concat_list(&[
            PathBuf::from("/a/one.mp3"),
            PathBuf::from("/a/it's.wav"),
        ]);
        assert_eq!(list, "file '/a/one.mp3'\nfile '/a/it'\\''s.wav'\n");
    }

    #[test]
    fn test_final_args_mp3_enhanced() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig::default().with_tag("artist", "me"));
        let options = MixOptions::default();
        let args = transcoder.build_final_args(
            Path::new("/tmp/looped.mp3"),
            Path::new("/out/mix.mp3"),
            &options,
        );

        let af = args.iter().position(|a| a == "-af").unwrap();
        assert!(args[af + 1].starts_with("highpass=f=80,lowpass=f=16000"));
        assert!(args[af + 1].ends_with("loudnorm=I=-14:TP=-2:LRA=11"));
        assert!(args.contains(&"libmp3lame".to_string()));
        assert!(args.contains(&"320k".to_string()));
        assert!(args.contains(&"48000".to_string()));
        assert!(args.contains(&"artist=me".to_string()));
        assert!(!args.contains(&"-ac".to_string()));
        assert_eq!(args.last().unwrap(), "/out/mix.mp3");
    }

    #[test]
    fn test_final_args_wav_stereo_plain() {
        let transcoder = FfmpegTranscoder::with_defaults();
        let options = MixOptions {
            enhance: false,
            stereo: true,
            format: OutputFormat::Wav,
            ..Default::default()
        };
        let args = transcoder.build_final_args(
            Path::new("/tmp/sequence.mp3"),
            Path::new("/out/mix.wav"),
            &options,
        );

        let af = args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(args[af + 1], STEREO_FILTER);
        let ac = args.iter().position(|a| a == "-ac").unwrap();
        assert_eq!(args[ac + 1], "2");
        assert!(args.contains(&"pcm_s24le".to_string()));
        assert!(!args.contains(&"libmp3lame".to_string()));
    }

    #[test]
    fn test_final_args_without_filters() {
        let transcoder = FfmpegTranscoder::with_defaults();
        let options = MixOptions {
            enhance: false,
            ..Default::default()
        };
        let args = transcoder.build_final_args(
            Path::new("/tmp/sequence.mp3"),
            Path::new("/out/mix.mp3"),
            &options,
        );
        assert!(!args.contains(&"-af".to_string()));
    }

    #[test]
    fn test_graph_args_map_output() {
        let transcoder = FfmpegTranscoder::with_defaults();
        let inputs = vec![PathBuf::from("/a.mp3"), PathBuf::from("/b.mp3")];
        let graph = FfmpegTranscoder::crossfade_graph(2, 2.0);
        let args = transcoder.build_graph_args(&inputs, &graph, Path::new("/tmp/seq.mp3"));

        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        let map = args.iter().position(|a| a == "-map").unwrap();
        assert_eq!(args[map + 1], "[out]");
    }

    #[test]
    fn test_parse_duration() {
        let duration = FfmpegTranscoder::parse_duration("183.456000\n").unwrap();
        assert!((duration - 183.456).abs() < 1e-9);
        assert!(FfmpegTranscoder::parse_duration("N/A").is_err());
        assert!(FfmpegTranscoder::parse_duration("-3").is_err());
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = FfmpegTranscoder::stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[tokio::test]
    async fn test_validate_input_missing_file() {
        let transcoder = FfmpegTranscoder::with_defaults();
        let result = transcoder
            .validate_input(Path::new("/nonexistent/track.mp3"))
            .await;
        assert!(matches!(result, Err(TranscodeError::InputNotFound { .. })));
    }

    #[tokio::test]
    async fn test_validate_input_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.ogg");
        std::fs::write(&path, b"not audio").unwrap();

        let transcoder = FfmpegTranscoder::with_defaults();
        let result = transcoder.validate_input(&path).await;
        match result {
            Err(TranscodeError::UnsupportedInput { format }) => assert_eq!(format, "ogg"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sequence_reports_missing_ffmpeg() {
        let dir = TempDir::new().unwrap();
        let transcoder = FfmpegTranscoder::new(TranscoderConfig::with_paths(
            PathBuf::from("/nonexistent/ffmpeg"),
            PathBuf::from("/nonexistent/ffprobe"),
        ));

        let request = SequenceRequest {
            inputs: vec![dir.path().join("a.mp3")],
            output_path: dir.path().join("out").join("mix.mp3"),
            work_dir: dir.path().join("work"),
            options: MixOptions::default(),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = transcoder.sequence_with_progress(request, tx).await;
        assert!(matches!(result, Err(TranscodeError::FfmpegNotFound { .. })));
        assert_eq!(rx.recv().await, Some(SequenceStage::Sequencing));
    }

    #[tokio::test]
    async fn test_sequence_rejects_empty_request() {
        let dir = TempDir::new().unwrap();
        let transcoder = FfmpegTranscoder::with_defaults();
        let request = SequenceRequest {
            inputs: vec![],
            output_path: dir.path().join("mix.mp3"),
            work_dir: dir.path().to_path_buf(),
            options: MixOptions::default(),
        };
        let result = transcoder.sequence(request).await;
        assert!(matches!(result, Err(TranscodeError::InvalidRequest { .. })));
    }
}
