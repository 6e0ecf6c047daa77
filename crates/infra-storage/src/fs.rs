use std::path::Path;

use inbox_error::InboxError;

/// Writes `bytes` to a sibling temp file and renames it over `path`.
pub(crate) async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), InboxError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| InboxError::internal(format!("mkdir {}: {e}", parent.display())))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| InboxError::internal(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| InboxError::internal(format!("rename {}: {e}", path.display())))
}
