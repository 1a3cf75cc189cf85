use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::LauncherResult;

const OFFLINE_ACCESS_TOKEN: &str = "offline_access_token";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountMode {
    Offline,
    Microsoft,
}

/// Identity handed to the game. Only the result of the auth flow is
/// consumed here; the flow itself lives with the host.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthProfile {
    pub mode: AccountMode,
    pub username: String,
    pub uuid: String,
    pub access_token: String,
    pub user_type: String,
}

impl std::fmt::Debug for AuthProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProfile")
            .field("mode", &self.mode)
            .field("username", &self.username)
            .field("uuid", &self.uuid)
            .field("access_token", &"<redacted>")
            .field("user_type", &self.user_type)
            .finish()
    }
}

impl AuthProfile {
    pub fn offline(username: &str) -> Self {
        let username = username.trim().to_string();
        Self {
            mode: AccountMode::Offline,
            uuid: offline_uuid(&username),
            username,
            access_token: OFFLINE_ACCESS_TOKEN.into(),
            user_type: "legacy".into(),
        }
    }

    /// A profile the game can start with: non-blank username and token.
    pub fn is_usable(&self) -> bool {
        !self.username.trim().is_empty() && !self.access_token.trim().is_empty()
    }

    pub fn sanitized(mut self) -> Self {
        if self.uuid.trim().is_empty() {
            self.uuid = offline_uuid(self.username.trim());
        }
        if self.user_type.trim().is_empty() {
            self.user_type = match self.mode {
                AccountMode::Offline => "legacy".into(),
                AccountMode::Microsoft => "msa".into(),
            };
        }
        self
    }
}

/// Name-based UUID the vanilla server assigns to offline players
/// (MD5 of `OfflinePlayer:<name>`, version 3).
pub fn offline_uuid(username: &str) -> String {
    let digest = Md5::digest(format!("OfflinePlayer:{username}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    bytes[6] = (bytes[6] & 0x0f) | 0x30;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes).hyphenated().to_string()
}

/// Source of the identity used for a play session.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` means there is no usable profile; the session stops
    /// without touching the install directory.
    async fn authenticate(&self) -> LauncherResult<Option<AuthProfile>>;
}

/// Offline play under a fixed username.
pub struct OfflineAuthProvider {
    username: Option<String>,
}

impl OfflineAuthProvider {
    pub fn new(username: Option<String>) -> Self {
        Self { username }
    }
}

#[async_trait]
impl AuthProvider for OfflineAuthProvider {
    async fn authenticate(&self) -> LauncherResult<Option<AuthProfile>> {
        Ok(self
            .username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(AuthProfile::offline))
    }
}
