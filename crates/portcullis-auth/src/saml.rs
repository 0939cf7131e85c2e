//! Identity provider settings.
//!
//! The SAML configuration folder uses the python3-saml layout: a `settings.json` with `sp`
//! and `idp` sections. Only the endpoints needed to send users to the identity provider are
//! read here; assertions are handled by whatever terminates the SAML exchange.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use url::Url;

pub const SETTINGS_FILE: &str = "settings.json";

#[cfg(feature = "cli")]
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SamlArgs {
    /// Folder which contains the SAML configuration.
    #[arg(long)]
    pub saml_path: Option<std::path::PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SamlSettings {
    pub sp: ServiceProvider,
    pub idp: IdentityProvider,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServiceProvider {
    #[serde(rename = "entityId")]
    pub entity_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IdentityProvider {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "singleSignOnService")]
    pub single_sign_on_service: Endpoint,
    #[serde(rename = "singleLogoutService", default)]
    pub single_logout_service: Option<Endpoint>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Endpoint {
    pub url: String,
}

impl SamlSettings {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SAML settings at {}", path.display()))?;
        let settings: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse SAML settings at {}", path.display()))?;
        Url::parse(&settings.idp.single_sign_on_service.url).context("idp.singleSignOnService.url")?;
        if let Some(slo) = &settings.idp.single_logout_service {
            Url::parse(&slo.url).context("idp.singleLogoutService.url")?;
        }
        Ok(settings)
    }

    /// Without a configured path, or when loading fails, the server runs without SAML so that
    /// other means of authentication stay usable.
    pub fn load_optional(dir: Option<&Path>) -> Option<Self> {
        let Some(dir) = dir else {
            tracing::info!("No SAML path configured, SAML login disabled");
            return None;
        };
        match Self::load(dir) {
            Ok(settings) => {
                tracing::info!(idp = %settings.idp.entity_id, sp = %settings.sp.entity_id, "Loaded SAML settings");
                Some(settings)
            }
            Err(e) => {
                tracing::error!("Could not load SAML: {e:#}");
                None
            }
        }
    }

    /// Where to send the browser to log in. `relay_state` comes back from the identity
    /// provider and is where the user ends up afterwards.
    pub fn login_url(&self, relay_state: Option<&str>) -> anyhow::Result<String> {
        let mut url = Url::parse(&self.idp.single_sign_on_service.url)?;
        if let Some(relay_state) = relay_state.filter(|s| !s.is_empty()) {
            url.query_pairs_mut().append_pair("RelayState", relay_state);
        }
        Ok(url.into())
    }

    pub fn logout_url(&self) -> Option<&str> {
        self.idp.single_logout_service.as_ref().map(|e| e.url.as_str())
    }
}
