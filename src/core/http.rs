use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

const APP_USER_AGENT: &str = concat!("ProfileLauncher/", env!("CARGO_PKG_VERSION"));

/// Shared client for catalog, descriptor, asset and profile requests.
///
/// Content is hashed byte-for-byte after download, so transparent
/// compression is disabled.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(std::time::Duration::from_secs(15))
        .build()
}
