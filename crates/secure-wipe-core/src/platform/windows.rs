use super::parse::{self, StorageLimit};
use crate::query::{QueryError, SystemQuery};
use std::ffi::OsString;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::{Component, Path};
use std::process::Command;
use winapi::um::fileapi::{GetFileAttributesW, SetFileAttributesW, INVALID_FILE_ATTRIBUTES};
use winapi::um::winnt::{FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_READONLY, FILE_ATTRIBUTE_SYSTEM};

pub fn get_drive_letter(path: &Path) -> Option<OsString> {
    for component in path.components() {
        if let Component::Prefix(prefix_comp) = component {
            match prefix_comp.kind() {
                std::path::Prefix::Disk(letter) | std::path::Prefix::VerbatimDisk(letter) => {
                    let drive_letter = format!("{}:", letter as char);
                    return Some(OsString::from(drive_letter));
                }
                _ => (),
            }
        }
    }
    None
}

/// Strip read-only, hidden and system attributes so the file can be opened for writing.
pub fn clear_protective_attributes(path: &Path) -> io::Result<()> {
    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let attributes = unsafe { GetFileAttributesW(wide.as_ptr()) };
    if attributes == INVALID_FILE_ATTRIBUTES {
        return Err(io::Error::last_os_error());
    }

    let cleared =
        attributes & !(FILE_ATTRIBUTE_READONLY | FILE_ATTRIBUTE_HIDDEN | FILE_ATTRIBUTE_SYSTEM);
    if cleared != attributes && unsafe { SetFileAttributesW(wide.as_ptr(), cleared) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Capacity queries answered by `fsutil` and `vssadmin` for one drive. Both need an
/// elevated prompt; without it they fail and the flood that asked fails fast.
pub struct WindowsSystemQuery {
    drive: OsString,
}

impl WindowsSystemQuery {
    pub fn new(drive: OsString) -> Self {
        Self { drive }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String, QueryError> {
        let output = Command::new(program).args(args).arg(&self.drive).output()?;
        if !output.status.success() {
            return Err(QueryError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn shadow_storage(&self) -> Result<parse::ShadowStorageInfo, QueryError> {
        let mut for_arg = OsString::from("/for=");
        for_arg.push(&self.drive);
        let output = Command::new("vssadmin")
            .args(["list", "shadowstorage"])
            .arg(for_arg)
            .output()?;
        if !output.status.success() {
            return Err(QueryError::CommandFailed {
                command: "vssadmin list shadowstorage".to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(parse::parse_shadow_storage(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

impl SystemQuery for WindowsSystemQuery {
    fn journal_capacity_bytes(&self) -> Result<u64, QueryError> {
        let output = self.run("fsutil", &["usn", "queryjournal"])?;
        parse::parse_journal_info(&output)
            .max_size
            .ok_or(QueryError::Parse("journal maximum size"))
    }

    fn shadow_storage_max_bytes(&self) -> Result<u64, QueryError> {
        match self.shadow_storage()?.max {
            Some(StorageLimit::Bytes(bytes)) => Ok(bytes),
            Some(StorageLimit::Unbounded) => Err(QueryError::Unbounded("shadow storage")),
            None => Err(QueryError::Parse("maximum shadow storage space")),
        }
    }

    fn shadow_storage_used_bytes(&self) -> Result<u64, QueryError> {
        self.shadow_storage()?
            .used
            .ok_or(QueryError::Parse("used shadow storage space"))
    }
}
