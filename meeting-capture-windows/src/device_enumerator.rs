//! Windows audio endpoint lookup via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to resolve the render endpoint used for
//! loopback and the capture endpoint used for the microphone, either the
//! console default or the first active endpoint whose friendly name contains
//! a configured fragment.

use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;

use meeting_capture_core::models::audio_models::SourceKind;
use meeting_capture_core::models::error::CaptureError;

/// Audio endpoint enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new device enumerator.
    ///
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::Unknown(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// Resolve the endpoint for `kind` together with its friendly name.
    ///
    /// System audio is captured from a render endpoint, the microphone from a
    /// capture endpoint. With `name_fragment` set, the first active endpoint
    /// whose name contains it (case-insensitive) is used.
    pub fn endpoint(&self, kind: SourceKind, name_fragment: Option<&str>) -> Result<(IMMDevice, String), CaptureError> {
        let flow = data_flow(kind);
        match name_fragment {
            None => unsafe {
                let device = self
                    .enumerator
                    .GetDefaultAudioEndpoint(flow, eConsole)
                    .map_err(|e| CaptureError::DeviceNotAvailable(format!("no default {:?} endpoint: {}", kind, e)))?;
                let name = friendly_name(&device).unwrap_or_else(|| format!("default {:?} endpoint", kind));
                Ok((device, name))
            },
            Some(fragment) => {
                let devices = self.active_endpoints(flow)?;
                let names: Vec<String> = devices.iter().map(|(_, name)| name.clone()).collect();
                devices
                    .into_iter()
                    .find(|(_, name)| name_matches(name, fragment))
                    .ok_or_else(|| {
                        CaptureError::DeviceNotAvailable(format!(
                            "no {:?} endpoint matching '{}' (found: {})",
                            kind,
                            fragment,
                            names.join(", ")
                        ))
                    })
            }
        }
    }

    fn active_endpoints(&self, flow: EDataFlow) -> Result<Vec<(IMMDevice, String)>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::Unknown(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::Unknown(format!("GetCount failed: {}", e)))?;

            let mut devices = Vec::new();
            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(_) => continue,
                };
                let name = friendly_name(&device).unwrap_or_else(|| format!("Device {}", i));
                devices.push((device, name));
            }
            Ok(devices)
        }
    }
}

fn data_flow(kind: SourceKind) -> EDataFlow {
    match kind {
        SourceKind::System => eRender,
        SourceKind::Mic => eCapture,
    }
}

fn name_matches(name: &str, fragment: &str) -> bool {
    name.to_lowercase().contains(&fragment.to_lowercase())
}

/// Read the PKEY_Device_FriendlyName property from a device.
fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;

        let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
        store.GetValue(&PKEY_Device_FriendlyName, &mut prop_variant).ok()?;

        let name = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
            let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
            if !pwsz.is_null() {
                let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
                Some(String::from_utf16_lossy(std::slice::from_raw_parts(pwsz, len)))
            } else {
                None
            }
        } else {
            None
        };

        PropVariantClear(&mut prop_variant).ok();
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_match_ignores_case() {
        assert!(name_matches("Speakers (Realtek High Definition Audio)", "realtek"));
        assert!(!name_matches("Microphone Array", "headset"));
    }
}
