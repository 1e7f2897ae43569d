#[cfg(target_os = "windows")]
pub mod windows;

pub mod parse;

use crate::query::{SystemQuery, UnavailableQuery};
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

#[cfg(target_os = "windows")]
pub fn get_drive_letter(path: &Path) -> Option<OsString> {
    windows::get_drive_letter(path)
}

#[cfg(not(target_os = "windows"))]
pub fn get_drive_letter(_path: &Path) -> Option<OsString> {
    None
}

/// The capacity query for the volume holding `path`.
#[cfg(target_os = "windows")]
pub fn system_query_for(path: &Path) -> Box<dyn SystemQuery> {
    match get_drive_letter(path) {
        Some(drive) => Box::new(windows::WindowsSystemQuery::new(drive)),
        None => Box::new(UnavailableQuery),
    }
}

#[cfg(not(target_os = "windows"))]
pub fn system_query_for(_path: &Path) -> Box<dyn SystemQuery> {
    Box::new(UnavailableQuery)
}

/// Make a file writable before it is overwritten.
pub fn clear_protection(path: &Path, metadata: &Metadata) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = metadata.permissions();
        if perms.mode() & 0o200 == 0 {
            perms.set_mode(perms.mode() | 0o200);
            fs::set_permissions(path, perms)?;
        }
    }

    #[cfg(not(unix))]
    {
        let mut perms = metadata.permissions();
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(path, perms)?;
        }
    }

    #[cfg(target_os = "windows")]
    windows::clear_protective_attributes(path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_no_drive_letter_off_windows() {
        assert!(get_drive_letter(Path::new("/tmp/x")).is_none());
        let query = system_query_for(Path::new("/tmp/x"));
        assert!(query.journal_capacity_bytes().is_err());
    }

    #[test]
    fn test_clear_protection_makes_file_writable() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("locked");
        fs::write(&file, b"x").unwrap();
        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        let metadata = fs::metadata(&file).unwrap();
        clear_protection(&file, &metadata).unwrap();
        assert!(!fs::metadata(&file).unwrap().permissions().readonly());
    }
}
