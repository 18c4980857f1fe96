//! Controller configuration: API endpoint, credentials, timeouts, read-back
//! policy and capability overrides.

pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, validate_config};
pub use schema::{
    ApiConfig, ConvergeConfig, CredentialsConfig, PermissionOverride, ReadBackConfig,
    TimeoutsConfig, DEFAULT_BASE_URL,
};

use crate::client::HttpTransport;
use crate::error::Result;

impl ConvergeConfig {
    /// Resolves the credential and builds an HTTP transport.
    pub fn transport(&self) -> Result<HttpTransport> {
        let token = self.credentials.sources().resolve()?;
        let transport = HttpTransport::with_timeouts(
            self.api.base_url.clone(),
            token,
            self.api.connect_timeout(),
            self.api.request_timeout(),
        )?;
        Ok(transport)
    }
}
