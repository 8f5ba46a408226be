//! Control-plane endpoint URL builders

use uuid::Uuid;

/// Build prepare-upload endpoint URL
pub fn prepare_upload_url(base_url: &str) -> String {
    format!("{}/api/v1/projects/prepare", base_url.trim_end_matches('/'))
}

/// Build finish-upload endpoint URL
pub fn finish_upload_url(base_url: &str, project_id: &Uuid) -> String {
    format!(
        "{}/api/v1/projects/{}/finish",
        base_url.trim_end_matches('/'),
        project_id
    )
}
