use serde::Deserialize;

/// Summary of an account as shown after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub full_name: Option<String>,
    pub post_count: u64,
    pub follower_count: u64,
    pub following_count: u64,
    pub is_private: bool,
}

// ===== API response types =====

/// Envelope returned by `/api/v1/users/web_profile_info/`.
#[derive(Debug, Deserialize)]
pub struct WebProfileInfoResponse {
    pub data: Option<WebProfileData>,
}

#[derive(Debug, Deserialize)]
pub struct WebProfileData {
    pub user: Option<WebProfileUser>,
}

#[derive(Debug, Deserialize)]
pub struct WebProfileUser {
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub edge_owner_to_timeline_media: EdgeCount,
    #[serde(default)]
    pub edge_followed_by: EdgeCount,
    #[serde(default)]
    pub edge_follow: EdgeCount,
}

#[derive(Debug, Default, Deserialize)]
pub struct EdgeCount {
    #[serde(default)]
    pub count: u64,
}

impl WebProfileInfoResponse {
    /// Extract the profile, or `None` when the server answered without a user.
    pub fn into_profile(self) -> Option<Profile> {
        let user = self.data?.user?;
        Some(Profile {
            username: user.username,
            full_name: user.full_name.filter(|name| !name.is_empty()),
            post_count: user.edge_owner_to_timeline_media.count,
            follower_count: user.edge_followed_by.count,
            following_count: user.edge_follow.count,
            is_private: user.is_private,
        })
    }
}
