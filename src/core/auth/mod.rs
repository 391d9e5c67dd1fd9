// ─── Session ───
// Authentication itself lives outside this crate; launching only needs the
// identity of the current player.

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::core::error::LauncherResult;

pub const CLIENT_ID_FALLBACK: &str = "00000000402B5328";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    /// Dashed UUID string.
    pub player_uuid: String,
    pub player_name: String,
    #[serde(default = "default_user_type")]
    pub user_type: String,
    #[serde(default)]
    pub xuid: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_user_type() -> String {
    "msa".into()
}

fn default_client_id() -> String {
    CLIENT_ID_FALLBACK.into()
}

impl Session {
    /// Offline session with the name-derived UUID servers in offline mode expect.
    pub fn offline(player_name: &str) -> Self {
        let name = match player_name.trim() {
            "" => "Player",
            trimmed => trimmed,
        };
        Self {
            access_token: "offline_access_token".into(),
            player_uuid: offline_uuid(name),
            player_name: name.to_string(),
            user_type: "legacy".into(),
            xuid: "0".into(),
            client_id: CLIENT_ID_FALLBACK.into(),
        }
    }
}

/// Name-based v3 UUID over `OfflinePlayer:<name>` without a namespace.
pub fn offline_uuid(player_name: &str) -> String {
    let digest = Md5::digest(format!("OfflinePlayer:{}", player_name).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    bytes[6] = (bytes[6] & 0x0f) | 0x30;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).hyphenated().to_string()
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_session(&self) -> LauncherResult<Session>;
}

/// Always returns the same session; used for offline play and by the CLI.
#[derive(Debug, Clone)]
pub struct StaticSession(pub Session);

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_session(&self) -> LauncherResult<Session> {
        Ok(self.0.clone())
    }
}
