// Desktop notification for hostwatch alerts
// A system-modal message box plus an audible beep

use crate::error::{DriverError, DriverResult};

#[cfg(windows)]
use winapi::um::utilapiset::Beep;
#[cfg(windows)]
use winapi::um::winuser::{MessageBoxW, MB_ICONINFORMATION, MB_SYSTEMMODAL};

#[cfg(windows)]
fn to_wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Show a system-modal message box. Blocks until the user dismisses it.
#[cfg(windows)]
pub fn show_popup(title: &str, message: &str) -> DriverResult<()> {
    let title = to_wide(title);
    let message = to_wide(message);

    let result = unsafe {
        MessageBoxW(
            std::ptr::null_mut(),
            message.as_ptr(),
            title.as_ptr(),
            MB_ICONINFORMATION | MB_SYSTEMMODAL,
        )
    };

    if result == 0 {
        return Err(DriverError::Windows(format!(
            "MessageBoxW failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn show_popup(_title: &str, _message: &str) -> DriverResult<()> {
    Err(DriverError::Unsupported("popups require Windows".to_string()))
}

/// Sound the speaker at `frequency` Hz for `duration_ms`
#[cfg(windows)]
pub fn beep(frequency: u32, duration_ms: u32) -> DriverResult<()> {
    if unsafe { Beep(frequency, duration_ms) } == 0 {
        return Err(DriverError::Windows(format!(
            "Beep failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn beep(_frequency: u32, _duration_ms: u32) -> DriverResult<()> {
    Err(DriverError::Unsupported("beep requires Windows".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(windows))]
    fn test_notifications_unsupported_off_windows() {
        assert!(matches!(show_popup("t", "m"), Err(DriverError::Unsupported(_))));
        assert!(matches!(beep(1000, 10), Err(DriverError::Unsupported(_))));
    }
}
