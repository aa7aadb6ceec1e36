// Registry access for hostwatch
// Value reads go through winreg, change notification through RegNotifyChangeKeyValue

use crate::error::{DriverError, DriverResult};
use std::time::Duration;

#[cfg(windows)]
use log::debug;
#[cfg(windows)]
use std::io;
#[cfg(windows)]
use std::ptr;
#[cfg(windows)]
use winapi::shared::minwindef::{FALSE, HKEY, TRUE};
#[cfg(windows)]
use winapi::shared::winerror::{ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_SUCCESS, WAIT_TIMEOUT};
#[cfg(windows)]
use winapi::um::handleapi::CloseHandle;
#[cfg(windows)]
use winapi::um::synchapi::{CreateEventW, ResetEvent, WaitForSingleObject};
#[cfg(windows)]
use winapi::um::winbase::WAIT_OBJECT_0;
#[cfg(windows)]
use winapi::um::winnt::{
    HANDLE, KEY_NOTIFY, REG_NOTIFY_CHANGE_ATTRIBUTES, REG_NOTIFY_CHANGE_LAST_SET,
    REG_NOTIFY_CHANGE_NAME, REG_NOTIFY_CHANGE_SECURITY,
};
#[cfg(windows)]
use winapi::um::winreg::{RegCloseKey, RegNotifyChangeKeyValue, RegOpenKeyExW};

/// Registry hive a watched key lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hive {
    CurrentUser,
    LocalMachine,
}

/// Outcome of one bounded wait on a key notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

// Keeps the registration alive when the registering thread exits (Windows 8+)
#[cfg(windows)]
const REG_NOTIFY_THREAD_AGNOSTIC: u32 = 0x1000_0000;

#[cfg(windows)]
impl Hive {
    fn raw(self) -> HKEY {
        match self {
            Hive::CurrentUser => winapi::um::winreg::HKEY_CURRENT_USER,
            Hive::LocalMachine => winapi::um::winreg::HKEY_LOCAL_MACHINE,
        }
    }
}

// ============================================================================
// Value Reads
// ============================================================================

/// Read a registry value and render it as text
///
/// Returns `Ok(None)` when the key exists but the value does not.
/// String types are returned as-is, DWORD/QWORD as decimal and
/// MULTI_SZ joined with ", ".
#[cfg(windows)]
pub fn read_value(hive: Hive, subkey: &str, value: &str) -> DriverResult<Option<String>> {
    use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ};
    use winreg::RegKey;

    debug!("Reading registry value: {}\\{}", subkey, value);

    let root = match hive {
        Hive::CurrentUser => RegKey::predef(HKEY_CURRENT_USER),
        Hive::LocalMachine => RegKey::predef(HKEY_LOCAL_MACHINE),
    };
    let key = root
        .open_subkey_with_flags(subkey, KEY_READ)
        .map_err(|e| map_open_error(subkey, e))?;

    let raw = match key.get_raw_value(value) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DriverError::Io(e)),
    };

    render_value(&raw).map(Some)
}

#[cfg(not(windows))]
pub fn read_value(_hive: Hive, _subkey: &str, _value: &str) -> DriverResult<Option<String>> {
    Err(DriverError::Unsupported("registry reads require Windows".to_string()))
}

#[cfg(windows)]
fn render_value(raw: &winreg::RegValue) -> DriverResult<String> {
    use winreg::enums::RegType;
    use winreg::types::FromRegValue;

    match raw.vtype {
        RegType::REG_SZ | RegType::REG_EXPAND_SZ => Ok(String::from_reg_value(raw)?),
        RegType::REG_DWORD => Ok(u32::from_reg_value(raw)?.to_string()),
        RegType::REG_QWORD => Ok(u64::from_reg_value(raw)?.to_string()),
        RegType::REG_MULTI_SZ => Ok(Vec::<String>::from_reg_value(raw)?.join(", ")),
        ref other => Err(DriverError::UnsupportedType(format!("{:?}", other))),
    }
}

#[cfg(windows)]
fn map_open_error(subkey: &str, err: io::Error) -> DriverError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => DriverError::AccessDenied(subkey.to_string()),
        io::ErrorKind::NotFound => DriverError::Registry(format!("key not found: {}", subkey)),
        _ => DriverError::Io(err),
    }
}

// ============================================================================
// Change Notification
// ============================================================================

/// An open key registered for change notification
///
/// Holds the key handle (opened with KEY_NOTIFY) and a manual-reset event.
/// Both handles are released on drop.
#[cfg(windows)]
pub struct KeyNotification {
    key: HKEY,
    event: HANDLE,
    armed: bool,
}

// The raw handles are only ever used from the thread that owns the value.
#[cfg(windows)]
unsafe impl Send for KeyNotification {}

#[cfg(windows)]
impl KeyNotification {
    /// Open `subkey` for notification rights and create the wait event
    pub fn open(hive: Hive, subkey: &str) -> DriverResult<Self> {
        let wide: Vec<u16> = subkey.encode_utf16().chain(std::iter::once(0)).collect();
        let mut key: HKEY = ptr::null_mut();

        let status = unsafe { RegOpenKeyExW(hive.raw(), wide.as_ptr(), 0, KEY_NOTIFY, &mut key) };
        if status != ERROR_SUCCESS as i32 {
            return Err(match status as u32 {
                ERROR_ACCESS_DENIED => DriverError::AccessDenied(subkey.to_string()),
                ERROR_FILE_NOT_FOUND => DriverError::Registry(format!("key not found: {}", subkey)),
                _ => DriverError::Windows(format!(
                    "RegOpenKeyExW({}) failed: {}",
                    subkey,
                    io::Error::from_raw_os_error(status)
                )),
            });
        }

        let event = unsafe { CreateEventW(ptr::null_mut(), TRUE, FALSE, ptr::null()) };
        if event.is_null() {
            unsafe { RegCloseKey(key) };
            return Err(DriverError::Windows(format!(
                "CreateEventW failed: {}",
                io::Error::last_os_error()
            )));
        }

        Ok(KeyNotification { key, event, armed: false })
    }

    /// Register for name, attribute, value and security changes on the key
    ///
    /// The registration is not tied to the calling thread, so a key can be
    /// armed on one thread and waited on from another.
    ///
    /// A registration stays pending until it fires, so re-arming an armed key is a no-op.
    pub fn arm(&mut self) -> DriverResult<()> {
        if self.armed {
            return Ok(());
        }

        let filter = REG_NOTIFY_CHANGE_NAME
            | REG_NOTIFY_CHANGE_ATTRIBUTES
            | REG_NOTIFY_CHANGE_LAST_SET
            | REG_NOTIFY_CHANGE_SECURITY
            | REG_NOTIFY_THREAD_AGNOSTIC;

        let status = unsafe { RegNotifyChangeKeyValue(self.key, TRUE, filter, self.event, TRUE) };
        if status != ERROR_SUCCESS as i32 {
            return Err(DriverError::Windows(format!(
                "RegNotifyChangeKeyValue failed: {}",
                io::Error::from_raw_os_error(status)
            )));
        }

        self.armed = true;
        Ok(())
    }

    /// Block on the event for at most `timeout`
    pub fn wait(&mut self, timeout: Duration) -> DriverResult<WaitStatus> {
        let millis = timeout.as_millis().min(u32::MAX as u128 - 1) as u32;

        match unsafe { WaitForSingleObject(self.event, millis) } {
            WAIT_OBJECT_0 => Ok(WaitStatus::Signaled),
            WAIT_TIMEOUT => Ok(WaitStatus::TimedOut),
            _ => Err(DriverError::Windows(format!(
                "WaitForSingleObject failed: {}",
                io::Error::last_os_error()
            ))),
        }
    }

    /// Reset the event after a signal so the next registration can fire it
    pub fn reset(&mut self) {
        unsafe { ResetEvent(self.event) };
        self.armed = false;
    }
}

#[cfg(windows)]
impl Drop for KeyNotification {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.event);
            RegCloseKey(self.key);
        }
    }
}

/// Non-Windows placeholder; `open` always fails
#[cfg(not(windows))]
pub struct KeyNotification {
    _private: (),
}

#[cfg(not(windows))]
impl KeyNotification {
    pub fn open(_hive: Hive, _subkey: &str) -> DriverResult<Self> {
        Err(DriverError::Unsupported(
            "registry notification requires Windows".to_string(),
        ))
    }

    pub fn arm(&mut self) -> DriverResult<()> {
        Ok(())
    }

    pub fn wait(&mut self, timeout: Duration) -> DriverResult<WaitStatus> {
        std::thread::sleep(timeout);
        Ok(WaitStatus::TimedOut)
    }

    pub fn reset(&mut self) {}
}
