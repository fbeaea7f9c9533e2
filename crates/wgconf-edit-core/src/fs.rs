use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::EditResult;

/// Replaces `path` with `content` through a sibling temporary file, keeping the
/// original permissions. With `backup`, the previous content is kept at
/// [`backup_path`].
pub fn write_atomic(path: &Path, content: &str, backup: bool) -> EditResult<()> {
    let permissions = fs::metadata(path)?.permissions();
    let tmp_path = unique_sibling(path, "tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    let result = finish(path, &tmp_path, permissions, backup);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn finish(
    path: &Path,
    tmp_path: &Path,
    permissions: fs::Permissions,
    backup: bool,
) -> EditResult<()> {
    // Private keys live in these files; the replacement must not widen access.
    fs::set_permissions(tmp_path, permissions)?;

    if backup {
        let backup = backup_path(path);
        fs::copy(path, &backup)?;
        debug!(backup = %backup.display(), "wrote backup");
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

/// `wg0.conf` → `wg0.conf.bak`.
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, "bak")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn unique_sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut counter = 0u32;
    loop {
        let candidate = if counter == 0 {
            with_suffix(path, suffix)
        } else {
            with_suffix(path, &format!("{suffix}{counter}"))
        };

        if !candidate.exists() {
            return candidate;
        }

        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replaces_content_and_keeps_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        fs::write(&path, "[Interface]\n").unwrap();

        write_atomic(&path, "[Interface]\nMTU = 1280\n", true).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[Interface]\nMTU = 1280\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("wg0.conf.bak")).unwrap(),
            "[Interface]\n"
        );
        assert!(!dir.path().join("wg0.conf.tmp").exists());
    }

    #[test]
    fn skips_backup_when_disabled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, "new", false).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn missing_target_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = write_atomic(&dir.path().join("absent.conf"), "x", true).unwrap_err();
        assert!(matches!(err, crate::EditError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn keeps_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        write_atomic(&path, "new", false).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
