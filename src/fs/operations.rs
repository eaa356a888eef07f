use std::path::{Path, PathBuf};

use tokio::{fs::File, io::{self, AsyncWriteExt}};

/// Replaces contents of `path` in one step. Data is written into a sibling temporary file which is
/// then renamed over the target, so readers see either the old or the new contents, never a
/// truncated file. This also holds when the writing future gets dropped half way through.
pub async fn replace_file(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let temp_path = temporary_path(path);

    let mut file = File::create(&temp_path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await
}

/// Path of the file used by [replace_file] while writing.
pub fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    let mut name_with_dot = std::ffi::OsString::from(".");
    name_with_dot.push(name);
    path.with_file_name(name_with_dot)
}

/// Path of the advisory lock guarding `path` between processes.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}
