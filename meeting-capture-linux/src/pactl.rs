//! `pactl` helpers: default device discovery and per-session module routing.
//!
//! The microphone is routed through a private null sink so that both inputs
//! can be read the same way, from a sink monitor:
//!
//! ```text
//! default source ──module-loopback──→ mic_sink (module-null-sink)
//!                                        └─ mic_sink.monitor  → mic stream
//! default sink ─────────────────────────── <sink>.monitor     → system stream
//! ```

use std::process::Command;

use meeting_capture_core::models::error::CaptureError;

/// Name of the null sink the microphone is looped into.
pub const MIC_SINK: &str = "mic_sink";
const MIC_SINK_DESCRIPTION: &str = "MicSink";

const SINK_LABEL: &str = "Default Sink:";
const SOURCE_LABEL: &str = "Default Source:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultDevices {
    pub sink: String,
    pub source: String,
}

/// Extract the default sink and source from `pactl info` output.
///
/// Expects the untranslated labels; `pactl` is always run in the C locale.
pub fn parse_default_devices(info: &str) -> Option<DefaultDevices> {
    Some(DefaultDevices {
        sink: labeled_value(info, SINK_LABEL)?,
        source: labeled_value(info, SOURCE_LABEL)?,
    })
}

fn labeled_value(info: &str, label: &str) -> Option<String> {
    info.lines().find_map(|line| {
        line.trim()
            .strip_prefix(label)
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
    })
}

/// Monitor source of a sink.
pub fn monitor_of(sink: &str) -> String {
    if sink.ends_with(".monitor") {
        sink.to_string()
    } else {
        format!("{}.monitor", sink)
    }
}

/// Module index printed by `pactl load-module`.
pub fn parse_module_id(stdout: &str) -> Option<u32> {
    stdout.trim().parse().ok()
}

pub fn null_sink_args() -> Vec<String> {
    vec![
        format!("sink_name={}", MIC_SINK),
        format!("sink_properties=device.description={}", MIC_SINK_DESCRIPTION),
    ]
}

pub fn loopback_args(source: &str) -> Vec<String> {
    vec![format!("source={}", source), format!("sink={}", MIC_SINK)]
}

/// `pactl` with its output pinned to the C locale.
fn pactl_command(args: &[&str]) -> Command {
    let mut command = Command::new("pactl");
    command.env("LC_ALL", "C").args(args);
    command
}

fn pactl(args: &[&str]) -> Result<String, CaptureError> {
    let output = pactl_command(args)
        .output()
        .map_err(|e| CaptureError::DeviceNotAvailable(format!("failed to run pactl: {}", e)))?;
    if !output.status.success() {
        return Err(CaptureError::ConfigurationFailed(format!(
            "pactl {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Default sink and source of the running sound server.
pub fn query_default_devices() -> Result<DefaultDevices, CaptureError> {
    let info = pactl(&["info"])?;
    parse_default_devices(&info)
        .ok_or_else(|| CaptureError::DeviceNotAvailable("pactl info reports no default sink/source".into()))
}

/// A loaded server module, unloaded again on drop.
#[derive(Debug)]
pub struct LoadedModule {
    id: u32,
    name: String,
}

impl LoadedModule {
    pub fn load(name: &str, args: &[String]) -> Result<Self, CaptureError> {
        let mut argv = vec!["load-module", name];
        argv.extend(args.iter().map(String::as_str));
        let stdout = pactl(&argv)?;
        let id = parse_module_id(&stdout).ok_or_else(|| {
            CaptureError::ConfigurationFailed(format!("unexpected load-module output for {}: {:?}", name, stdout))
        })?;
        log::info!("pactl: loaded {} as module {}", name, id);
        Ok(Self {
            id,
            name: name.to_string(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        match pactl(&["unload-module", &self.id.to_string()]) {
            Ok(_) => log::info!("pactl: unloaded {} (module {})", self.name, self.id),
            Err(e) => log::warn!("pactl: could not unload {} (module {}): {}", self.name, self.id, e),
        }
    }
}

/// Null sink plus loopback for one session.
pub struct VirtualMicRoute {
    // Unload in reverse order of loading: loopback first.
    loopback: LoadedModule,
    null_sink: LoadedModule,
}

impl VirtualMicRoute {
    pub fn create(mic_source: &str) -> Result<Self, CaptureError> {
        let null_sink = LoadedModule::load("module-null-sink", &null_sink_args())?;
        // On failure the null sink is dropped and unloaded here.
        let loopback = LoadedModule::load("module-loopback", &loopback_args(mic_source))?;
        Ok(Self { loopback, null_sink })
    }

    /// Source carrying the routed microphone.
    pub fn monitor(&self) -> String {
        monitor_of(MIC_SINK)
    }

    pub fn module_ids(&self) -> (u32, u32) {
        (self.null_sink.id(), self.loopback.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_EN: &str = "\
Server String: /run/user/1000/pulse/native
Library Protocol Version: 35
Server Name: PulseAudio (on PipeWire 1.0.5)
Default Sample Specification: float32le 2ch 48000Hz
Default Sink: alsa_output.pci-0000_00_1f.3.analog-stereo
Default Source: alsa_input.pci-0000_00_1f.3.analog-stereo
Cookie: 1b2c:3d4e
";

    const INFO_DE: &str = "\
Server-Zeichenkette: /run/user/1000/pulse/native
Standard-Ziel: bluez_output.00_11_22_33_44_55.1
Standard-Quelle: alsa_input.usb-Headset-00.mono-fallback
";

    #[test]
    fn command_runs_in_c_locale() {
        use std::ffi::OsStr;

        let command = pactl_command(&["info"]);
        let envs: Vec<_> = command.get_envs().collect();
        assert_eq!(envs, vec![(OsStr::new("LC_ALL"), Some(OsStr::new("C")))]);
        assert_eq!(command.get_args().collect::<Vec<_>>(), vec![OsStr::new("info")]);
    }

    #[test]
    fn parses_english_info() {
        let devices = parse_default_devices(INFO_EN).unwrap();
        assert_eq!(devices.sink, "alsa_output.pci-0000_00_1f.3.analog-stereo");
        assert_eq!(devices.source, "alsa_input.pci-0000_00_1f.3.analog-stereo");
    }

    #[test]
    fn translated_labels_are_not_parsed() {
        assert!(parse_default_devices(INFO_DE).is_none());
    }

    #[test]
    fn missing_source_is_none() {
        assert!(parse_default_devices("Default Sink: foo\n").is_none());
        assert!(parse_default_devices("").is_none());
    }

    #[test]
    fn sample_specification_line_is_not_a_sink() {
        let info = "Default Sample Specification: s16le 2ch 44100Hz\nDefault Sink: a\nDefault Source: b\n";
        let devices = parse_default_devices(info).unwrap();
        assert_eq!(devices.sink, "a");
    }

    #[test]
    fn monitor_names() {
        assert_eq!(monitor_of("mic_sink"), "mic_sink.monitor");
        assert_eq!(monitor_of("out.monitor"), "out.monitor");
    }

    #[test]
    fn module_id_from_stdout() {
        assert_eq!(parse_module_id("536870913\n"), Some(536_870_913));
        assert_eq!(parse_module_id("Failure: Module initialization failed"), None);
    }

    #[test]
    fn module_arguments() {
        assert_eq!(
            null_sink_args(),
            vec!["sink_name=mic_sink", "sink_properties=device.description=MicSink"]
        );
        assert_eq!(loopback_args("alsa_input.x"), vec!["source=alsa_input.x", "sink=mic_sink"]);
    }
}
