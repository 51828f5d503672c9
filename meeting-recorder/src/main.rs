//! Records a meeting for a fixed number of seconds.
//!
//! ```text
//! meeting-recorder [SECONDS] [OUTPUT_DIR] [CONFIG_JSON]
//! ```
//!
//! Writes `<timestamp>_hq.wav` (float32 stereo 48 kHz) and `<timestamp>_asr.wav`
//! (int16 mono 16 kHz) into the output directory. `RUST_LOG=debug` shows the
//! backend's negotiated formats and flush activity.

mod platform;

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Local;

use meeting_capture_core::{
    parse_wav_header, CaptureConfiguration, CaptureDelegate, CaptureError, CaptureState,
    RecordingResult, Recorder, WavFileSummary,
};

const DEFAULT_SECONDS: u64 = 10;

/// How long to wait for finalization after stop.
const FINISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line options, all positional.
#[derive(Debug, Clone, PartialEq)]
struct Options {
    seconds: u64,
    output_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let seconds = match args.first() {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("invalid duration {:?}, expected whole seconds", raw))?,
        None => DEFAULT_SECONDS,
    };
    if seconds == 0 {
        return Err("duration must be at least one second".into());
    }
    if args.len() > 3 {
        return Err(format!("unexpected argument {:?}", args[3]));
    }
    Ok(Options {
        seconds,
        output_dir: args.get(1).map(PathBuf::from),
        config_path: args.get(2).map(PathBuf::from),
    })
}

fn default_output_dir() -> PathBuf {
    dirs_next::audio_dir()
        .or_else(dirs_next::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Meeting Recordings")
}

/// `(hq, asr)` paths sharing one timestamp stem.
fn output_paths(dir: &Path, stem: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}_hq.wav", stem)),
        dir.join(format!("{}_asr.wav", stem)),
    )
}

/// Logs every notification so the console shows the session lifecycle.
struct LogDelegate;

impl CaptureDelegate for LogDelegate {
    fn on_state_changed(&self, state: CaptureState) {
        log::debug!("capture state: {:?}", state);
    }

    fn on_capture_started(&self) {
        log::info!("capture started");
    }

    fn on_capture_stopped(&self) {
        log::info!("capture stopped");
    }

    fn on_capture_failed(&self, error: &CaptureError) {
        log::error!("capture failed: {}", error);
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("{}", error);
    }

    fn on_writing_finished(&self, result: &RecordingResult) {
        log::info!("recording finished ({:.2}s)", result.duration_secs);
    }
}

fn load_config(path: Option<&Path>) -> Result<CaptureConfiguration, CaptureError> {
    let config = match path {
        Some(path) => CaptureConfiguration::from_json_file(path)?,
        None => CaptureConfiguration::default(),
    };
    config.validate().map_err(CaptureError::ConfigurationFailed)?;
    Ok(config)
}

fn describe_file(label: &str, summary: &WavFileSummary) -> Result<(), CaptureError> {
    let mut header = [0u8; 44];
    fs::File::open(&summary.path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map_err(|e| CaptureError::StorageError(format!("{}: {}", summary.path.display(), e)))?;
    let parsed = parse_wav_header(&header)?;
    println!(
        "{:<4} {}\n     format {} | {} ch | {} Hz | {} bit | {} data bytes | {:.2}s\n     sha256 {}",
        label,
        summary.path.display(),
        parsed.format_code,
        parsed.channels,
        parsed.sample_rate,
        parsed.bits_per_sample,
        parsed.data_size,
        summary.duration_secs(),
        summary.checksum
    );
    Ok(())
}

fn run(options: Options) -> Result<(), CaptureError> {
    let config = load_config(options.config_path.as_deref())?;
    let dir = options.output_dir.unwrap_or_else(default_output_dir);
    let stem = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let (hq_path, asr_path) = output_paths(&dir, &stem);

    let delegate: Arc<dyn CaptureDelegate> = Arc::new(LogDelegate);
    let recorder = Recorder::new(platform::make_backend, Some(delegate))?;

    recorder.start_session(&hq_path, &asr_path, config)?;
    println!("recording {}s into {}", options.seconds, dir.display());
    thread::sleep(Duration::from_secs(options.seconds));
    recorder.stop_session();

    let result = recorder
        .wait_finished(FINISH_TIMEOUT)
        .ok_or_else(|| CaptureError::Unknown("timed out waiting for the writer to finalize".into()))??;
    recorder.shutdown();

    describe_file("hq", &result.hq)?;
    describe_file("asr", &result.asr)?;
    let metadata = serde_json::to_string_pretty(&result.metadata)
        .map_err(|e| CaptureError::Unknown(format!("metadata serialization failed: {}", e)))?;
    println!("{}", metadata);
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}\nusage: meeting-recorder [SECONDS] [OUTPUT_DIR] [CONFIG_JSON]", message);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(options) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults() {
        let options = parse_args(&[]).unwrap();
        assert_eq!(options.seconds, DEFAULT_SECONDS);
        assert!(options.output_dir.is_none());
        assert!(options.config_path.is_none());
    }

    #[test]
    fn test_parse_all_positionals() {
        let options = parse_args(&args(&["30", "/tmp/out", "cfg.json"])).unwrap();
        assert_eq!(options.seconds, 30);
        assert_eq!(options.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(options.config_path, Some(PathBuf::from("cfg.json")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(&args(&["ten"])).is_err());
        assert!(parse_args(&args(&["0"])).is_err());
        assert!(parse_args(&args(&["5", "a", "b", "c"])).is_err());
    }

    #[test]
    fn test_output_paths_share_stem() {
        let (hq, asr) = output_paths(Path::new("out"), "20260101_120000");
        assert_eq!(hq, Path::new("out").join("20260101_120000_hq.wav"));
        assert_eq!(asr, Path::new("out").join("20260101_120000_asr.wav"));
    }

    #[test]
    fn test_load_default_config() {
        let config = load_config(None).unwrap();
        assert_eq!(config, CaptureConfiguration::default());
    }
}
