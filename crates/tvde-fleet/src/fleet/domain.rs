use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::commission::billing::PlanTier;
use crate::storage::StorageSettings;
use crate::store::Record;

/// Fleet-owning tenant (parceiro).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: String,
    pub name: String,
    pub nif: String,
    pub email: String,
    pub phone: Option<String>,
    pub plan: PlanTier,
    pub storage: StorageSettings,
    /// Requests above this amount need the partner owner or an admin to approve.
    pub approval_limit: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for Partner {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Pendente,
    Ativo,
    Inativo,
}

impl DriverStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pendente => "Pendente",
            Self::Ativo => "Ativo",
            Self::Inativo => "Inativo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    CartaConducao,
    CertificadoTvde,
    RegistoCriminal,
    ComprovativoMorada,
    Iban,
}

impl DocumentKind {
    /// Documents a driver must hand over before activation.
    pub const fn mandatory() -> [Self; 5] {
        [
            Self::CartaConducao,
            Self::CertificadoTvde,
            Self::RegistoCriminal,
            Self::ComprovativoMorada,
            Self::Iban,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::CartaConducao => "Carta de condução",
            Self::CertificadoTvde => "Certificado TVDE",
            Self::RegistoCriminal => "Registo criminal",
            Self::ComprovativoMorada => "Comprovativo de morada",
            Self::Iban => "Comprovativo de IBAN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDocument {
    pub kind: DocumentKind,
    pub storage_path: Option<String>,
    pub valid_until: Option<NaiveDate>,
    pub uploaded_at: DateTime<Utc>,
}

/// Motorista record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub partner_id: String,
    pub name: String,
    pub nif: String,
    pub email: String,
    pub phone: Option<String>,
    pub licence_number: String,
    pub licence_expiry: NaiveDate,
    pub tvde_certificate_expiry: Option<NaiveDate>,
    pub iban: Option<String>,
    pub status: DriverStatus,
    pub uber_uuid: Option<String>,
    pub bolt_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub classification: Option<String>,
    pub documents: Vec<DriverDocument>,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn missing_documents(&self, today: NaiveDate) -> Vec<DocumentKind> {
        DocumentKind::mandatory()
            .into_iter()
            .filter(|kind| {
                !self.documents.iter().any(|doc| {
                    doc.kind == *kind && doc.valid_until.map_or(true, |until| until >= today)
                })
            })
            .collect()
    }
}

impl Record for Driver {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Energy {
    Combustao,
    Hibrido,
    Eletrico,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Disponivel,
    Atribuido,
    Manutencao,
    Inativo,
}

impl VehicleStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disponivel => "Disponível",
            Self::Atribuido => "Atribuído",
            Self::Manutencao => "Em manutenção",
            Self::Inativo => "Inativo",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub partner_id: String,
    pub plate: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    pub energy: Energy,
    pub via_verde_obu: Option<String>,
    pub fuel_card: Option<String>,
    pub charging_card: Option<String>,
    pub insurance_expiry: Option<NaiveDate>,
    pub inspection_expiry: Option<NaiveDate>,
    pub status: VehicleStatus,
    pub driver_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for Vehicle {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

/// How the partner is paid by a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum ContractKind {
    Aluguer { weekly_rent: f64 },
    /// `None` falls back to the driver's classification level.
    Comissao { percentage: Option<f64> },
    Slot { weekly_fee: f64 },
}

impl ContractKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Aluguer { .. } => "Aluguer",
            Self::Comissao { .. } => "Comissão",
            Self::Slot { .. } => "Slot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub partner_id: String,
    pub driver_id: String,
    pub vehicle_id: Option<String>,
    pub kind: ContractKind,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    /// Caução held by the partner.
    pub deposit: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    /// Number of days inside `period` (inclusive) covered by the contract.
    pub fn active_days_in(&self, period: &Period) -> u32 {
        let start = self.start.max(period.start);
        let end = match self.end {
            Some(end) => end.min(period.end),
            None => period.end,
        };
        if end < start {
            0
        } else {
            ((end - start).num_days() + 1) as u32
        }
    }
}

impl Record for Contract {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

/// Inclusive date range used for imports, syncs and statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Monday–Sunday week containing `day`.
    pub fn week_of(day: NaiveDate) -> Self {
        use chrono::Datelike;
        let offset = day.weekday().num_days_from_monday() as i64;
        let start = day - Duration::days(offset);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn days(&self) -> u32 {
        ((self.end - self.start).num_days() + 1) as u32
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn slug(&self) -> String {
        format!(
            "{}_{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryKind {
    Seguro,
    Inspecao,
    CartaConducao,
    CertificadoTvde,
}

impl ExpiryKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Seguro => "Seguro",
            Self::Inspecao => "Inspeção periódica",
            Self::CartaConducao => "Carta de condução",
            Self::CertificadoTvde => "Certificado TVDE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiryAlert {
    pub kind: ExpiryKind,
    pub kind_label: &'static str,
    pub subject_id: String,
    pub subject_label: String,
    pub expires_on: NaiveDate,
    pub days_remaining: i64,
    pub expired: bool,
}

impl ExpiryAlert {
    pub(crate) fn new(
        kind: ExpiryKind,
        subject_id: &str,
        subject_label: &str,
        expires_on: NaiveDate,
        today: NaiveDate,
    ) -> Self {
        let days_remaining = (expires_on - today).num_days();
        Self {
            kind,
            kind_label: kind.label(),
            subject_id: subject_id.to_string(),
            subject_label: subject_label.to_string(),
            expires_on,
            days_remaining,
            expired: days_remaining < 0,
        }
    }
}

/// Portuguese NIF: nine digits with a mod-11 check digit.
pub fn is_valid_nif(raw: &str) -> bool {
    let digits: Vec<u32> = raw.trim().chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 9 || raw.trim().chars().count() != 9 {
        return false;
    }
    if !matches!(digits[0], 1 | 2 | 3 | 5 | 6 | 8 | 9) {
        return false;
    }
    let sum: u32 = digits[..8]
        .iter()
        .enumerate()
        .map(|(index, digit)| digit * (9 - index as u32))
        .sum();
    let check = match 11 - (sum % 11) {
        10 | 11 => 0,
        value => value,
    };
    check == digits[8]
}

pub fn is_plausible_email(raw: &str) -> bool {
    let trimmed = raw.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !trimmed.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Normalises Portuguese plates to `AA-00-BB`.
pub fn normalize_plate(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if compact.len() != 6 {
        return None;
    }
    Some(format!(
        "{}-{}-{}",
        &compact[0..2],
        &compact[2..4],
        &compact[4..6]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn nif_checksum_is_enforced() {
        assert!(is_valid_nif("123456789"));
        assert!(is_valid_nif("501442600"));
        assert!(!is_valid_nif("123456780"));
        assert!(!is_valid_nif("12345678"));
        assert!(!is_valid_nif("12345678a"));
        assert!(!is_valid_nif("423456789"));
    }

    #[test]
    fn plates_are_normalised() {
        assert_eq!(normalize_plate("aa 12 bb").as_deref(), Some("AA-12-BB"));
        assert_eq!(normalize_plate("12-AB-34").as_deref(), Some("12-AB-34"));
        assert!(normalize_plate("AB-12").is_none());
    }

    #[test]
    fn week_of_starts_on_monday() {
        let week = Period::week_of(date(2025, 3, 13));
        assert_eq!(week.start, date(2025, 3, 10));
        assert_eq!(week.end, date(2025, 3, 16));
        assert_eq!(week.days(), 7);
    }

    #[test]
    fn contract_active_days_clip_to_period() {
        let week = Period::week_of(date(2025, 3, 10));
        let contract = Contract {
            id: "c1".to_string(),
            partner_id: "p1".to_string(),
            driver_id: "d1".to_string(),
            vehicle_id: None,
            kind: ContractKind::Slot { weekly_fee: 70.0 },
            start: date(2025, 3, 13),
            end: None,
            deposit: 0.0,
            active: true,
            created_at: Utc::now(),
        };
        assert_eq!(contract.active_days_in(&week), 4);

        let ended = Contract {
            end: Some(date(2025, 3, 9)),
            ..contract
        };
        assert_eq!(ended.active_days_in(&week), 0);
    }

    #[test]
    fn email_check_requires_domain() {
        assert!(is_plausible_email("frota@parceiro.pt"));
        assert!(!is_plausible_email("frota@parceiro"));
        assert!(!is_plausible_email("frota parceiro.pt"));
    }
}
