//! Row models returned by the profile repository.

use crate::credentials::StoredProfile;

/// One row of the `profiles` table.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub user_id: String,
    pub canvas_base_url: Option<String>,
    pub canvas_access_token: Option<String>,
    pub updated_at: String,
}

impl ProfileRow {
    pub fn into_stored(self) -> StoredProfile {
        StoredProfile {
            canvas_base_url: self.canvas_base_url,
            canvas_access_token: self.canvas_access_token,
        }
    }
}
