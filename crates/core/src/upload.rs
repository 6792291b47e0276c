//! Completed-upload references.
//!
//! The upload collaborator performs the transfer and hands back a
//! `{file_name, file_url, file_type}` record. This core only ever
//! attaches such records to submissions, revision requests, and
//! messages; it never uploads anything itself.

use serde::{Deserialize, Serialize};

/// Result of a completed upload, as returned by the upload collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub file_url: String,
    /// MIME type or collaborator-specific type tag.
    pub file_type: String,
}

/// Validate that an attached file reference is usable.
///
/// The upload must already be complete: a name and a resolvable URL are
/// required. URL resolvability is a shape check (`http(s)://` prefix),
/// not a network probe.
pub fn validate_file_ref(file: &UploadedFile) -> Result<(), String> {
    if file.file_name.trim().is_empty() {
        return Err("Attached file is missing a name".to_string());
    }
    if !(file.file_url.starts_with("http://") || file.file_url.starts_with("https://")) {
        return Err(format!(
            "Attached file '{}' has no resolvable URL",
            file.file_name
        ));
    }
    Ok(())
}
