use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::Period;
use crate::store::Record;

/// Third-party sources a partner can pull data from (plataformas).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Uber,
    Bolt,
    ViaVerde,
    Combustivel,
    Carregamento,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Earnings,
    Tolls,
    Fuel,
    Charging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMode {
    Csv,
    Api,
    Rpa,
}

impl Platform {
    pub const fn all() -> [Self; 5] {
        [
            Self::Uber,
            Self::Bolt,
            Self::ViaVerde,
            Self::Combustivel,
            Self::Carregamento,
        ]
    }

    pub const fn slug(self) -> &'static str {
        match self {
            Self::Uber => "uber",
            Self::Bolt => "bolt",
            Self::ViaVerde => "via_verde",
            Self::Combustivel => "combustivel",
            Self::Carregamento => "carregamento",
        }
    }

    pub fn from_slug(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::all().into_iter().find(|platform| platform.slug() == wanted)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Uber => "Uber",
            Self::Bolt => "Bolt",
            Self::ViaVerde => "Via Verde",
            Self::Combustivel => "Cartão combustível",
            Self::Carregamento => "Cartão de carregamento",
        }
    }

    pub const fn category(self) -> DataCategory {
        match self {
            Self::Uber | Self::Bolt => DataCategory::Earnings,
            Self::ViaVerde => DataCategory::Tolls,
            Self::Combustivel => DataCategory::Fuel,
            Self::Carregamento => DataCategory::Charging,
        }
    }

    pub const fn modes(self) -> &'static [IntegrationMode] {
        match self {
            Self::Uber => &[IntegrationMode::Csv, IntegrationMode::Rpa],
            Self::Bolt => &[IntegrationMode::Csv, IntegrationMode::Api],
            Self::ViaVerde => &[IntegrationMode::Csv, IntegrationMode::Rpa],
            Self::Combustivel | Self::Carregamento => &[IntegrationMode::Csv],
        }
    }

    pub fn supports(self, mode: IntegrationMode) -> bool {
        self.modes().contains(&mode)
    }

    pub fn info(self) -> PlatformInfo {
        PlatformInfo {
            platform: self,
            label: self.label(),
            category: self.category(),
            modes: self.modes().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub label: &'static str,
    pub category: DataCategory,
    pub modes: Vec<IntegrationMode>,
}

/// Login material a partner stores for a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCredentials {
    pub id: String,
    pub partner_id: String,
    pub platform: Platform,
    pub username: String,
    pub password: String,
    pub api_client_id: Option<String>,
    pub api_client_secret: Option<String>,
    /// Fixed second-factor code for accounts configured with one.
    pub two_factor_code: Option<String>,
    pub preferred_mode: IntegrationMode,
    pub active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl PlatformCredentials {
    pub fn view(&self) -> CredentialsView {
        CredentialsView {
            platform: self.platform,
            username: self.username.clone(),
            has_password: !self.password.is_empty(),
            has_api_secret: self
                .api_client_secret
                .as_deref()
                .is_some_and(|secret| !secret.is_empty()),
            preferred_mode: self.preferred_mode,
            active: self.active,
            last_sync_at: self.last_sync_at,
        }
    }

    pub fn has_api_access(&self) -> bool {
        self.api_client_id.as_deref().is_some_and(|id| !id.is_empty())
            && self
                .api_client_secret
                .as_deref()
                .is_some_and(|secret| !secret.is_empty())
    }
}

impl Record for PlatformCredentials {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

/// Secret-free projection returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialsView {
    pub platform: Platform,
    pub username: String,
    pub has_password: bool,
    pub has_api_secret: bool,
    pub preferred_mode: IntegrationMode,
    pub active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    EmCurso,
    Sucesso,
    Erro,
}

/// One import or synchronisation attempt (log de sincronização).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: String,
    pub partner_id: String,
    pub platform: Platform,
    pub mode: IntegrationMode,
    pub period: Period,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub imported: usize,
    pub unmatched: usize,
    pub message: Option<String>,
    pub execution_id: Option<String>,
}

impl SyncLog {
    pub fn start(
        partner_id: &str,
        platform: Platform,
        mode: IntegrationMode,
        period: Period,
    ) -> Self {
        Self {
            id: crate::store::new_id(),
            partner_id: partner_id.to_string(),
            platform,
            mode,
            period,
            started_at: Utc::now(),
            finished_at: None,
            status: SyncStatus::EmCurso,
            imported: 0,
            unmatched: 0,
            message: None,
            execution_id: None,
        }
    }

    pub fn succeed(&mut self, imported: usize, unmatched: usize) {
        self.status = SyncStatus::Sucesso;
        self.imported = imported;
        self.unmatched = unmatched;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = SyncStatus::Erro;
        self.message = Some(message.into());
        self.finished_at = Some(Utc::now());
    }
}

impl Record for SyncLog {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_round_trip_with_dashes() {
        assert_eq!(Platform::from_slug("via-verde"), Some(Platform::ViaVerde));
        assert_eq!(Platform::from_slug(" UBER "), Some(Platform::Uber));
        assert_eq!(Platform::from_slug("lyft"), None);
    }

    #[test]
    fn only_browser_driven_platforms_support_rpa() {
        assert!(Platform::Uber.supports(IntegrationMode::Rpa));
        assert!(Platform::ViaVerde.supports(IntegrationMode::Rpa));
        assert!(!Platform::Bolt.supports(IntegrationMode::Rpa));
        assert!(Platform::Bolt.supports(IntegrationMode::Api));
    }

    #[test]
    fn credentials_view_hides_secrets() {
        let credentials = PlatformCredentials {
            id: "c1".to_string(),
            partner_id: "p1".to_string(),
            platform: Platform::Bolt,
            username: "frota@parceiro.pt".to_string(),
            password: "segredo".to_string(),
            api_client_id: Some("client".to_string()),
            api_client_secret: Some("secret".to_string()),
            two_factor_code: None,
            preferred_mode: IntegrationMode::Api,
            active: true,
            last_sync_at: None,
        };
        let json = serde_json::to_string(&credentials.view()).expect("serialize");
        assert!(!json.contains("segredo"));
        assert!(!json.contains("\"secret\""));
        assert!(credentials.has_api_access());
    }
}
