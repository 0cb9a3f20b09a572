use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;

use super::domain::{
    is_plausible_email, is_valid_nif, normalize_plate, Contract, ContractKind, DocumentKind,
    Driver, DriverDocument, DriverStatus, Energy, ExpiryAlert, ExpiryKind, Partner, Vehicle,
    VehicleStatus,
};
use super::platforms::{CredentialsView, IntegrationMode, Platform, PlatformCredentials, SyncLog};
use crate::commission::billing::{plan_change_charge, PlanChangeCharge, PlanTier};
use crate::storage::StorageSettings;
use crate::store::{new_id, Collection, MemoryCollection, RepositoryError};

const DEFAULT_APPROVAL_LIMIT: f64 = 500.0;

/// Every collection the fleet domain reads and writes.
#[derive(Clone)]
pub struct FleetStores {
    pub partners: Arc<dyn Collection<Partner>>,
    pub drivers: Arc<dyn Collection<Driver>>,
    pub vehicles: Arc<dyn Collection<Vehicle>>,
    pub contracts: Arc<dyn Collection<Contract>>,
    pub credentials: Arc<dyn Collection<PlatformCredentials>>,
    pub sync_logs: Arc<dyn Collection<SyncLog>>,
}

impl FleetStores {
    pub fn in_memory() -> Self {
        Self {
            partners: MemoryCollection::shared(),
            drivers: MemoryCollection::shared(),
            vehicles: MemoryCollection::shared(),
            contracts: MemoryCollection::shared(),
            credentials: MemoryCollection::shared(),
            sync_logs: MemoryCollection::shared(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPartner {
    pub name: String,
    pub nif: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(default)]
    pub approval_limit: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDriver {
    pub name: String,
    pub nif: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub licence_number: String,
    pub licence_expiry: NaiveDate,
    #[serde(default)]
    pub tvde_certificate_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub uber_uuid: Option<String>,
    #[serde(default)]
    pub bolt_id: Option<String>,
}

/// Partial driver update; absent fields stay untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub licence_number: Option<String>,
    pub licence_expiry: Option<NaiveDate>,
    pub tvde_certificate_expiry: Option<NaiveDate>,
    pub iban: Option<String>,
    pub uber_uuid: Option<String>,
    pub bolt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentUpload {
    pub kind: DocumentKind,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVehicle {
    pub plate: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    pub energy: Energy,
    #[serde(default)]
    pub via_verde_obu: Option<String>,
    #[serde(default)]
    pub fuel_card: Option<String>,
    #[serde(default)]
    pub charging_card: Option<String>,
    #[serde(default)]
    pub insurance_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub inspection_expiry: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub driver_id: String,
    pub kind: ContractKind,
    pub start: NaiveDate,
    #[serde(default)]
    pub deposit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsInput {
    pub username: String,
    /// `None` keeps the stored password.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_client_id: Option<String>,
    #[serde(default)]
    pub api_client_secret: Option<String>,
    #[serde(default)]
    pub two_factor_code: Option<String>,
    #[serde(default)]
    pub preferred_mode: Option<IntegrationMode>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid NIF {0}")]
    InvalidNif(String),
    #[error("invalid email address {0}")]
    InvalidEmail(String),
    #[error("invalid plate {0}")]
    InvalidPlate(String),
    #[error("plate {0} is already registered")]
    DuplicatePlate(String),
    #[error("a driver with NIF {0} already exists")]
    DuplicateDriver(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("driver {0} is not active")]
    DriverNotActive(String),
    #[error("driver cannot be activated, missing documents: {}", .0.join(", "))]
    MissingDocuments(Vec<&'static str>),
    #[error("driving licence expired on {0}")]
    LicenceExpired(NaiveDate),
    #[error("vehicle {plate} is {status}")]
    VehicleUnavailable { plate: String, status: &'static str },
    #[error("vehicle {0} has no active contract")]
    VehicleNotAssigned(String),
    #[error("{platform} does not support {mode:?} integration")]
    UnsupportedMode {
        platform: &'static str,
        mode: IntegrationMode,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl FleetError {
    fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Partner, driver, vehicle and contract operations.
#[derive(Clone)]
pub struct FleetService {
    stores: FleetStores,
}

impl FleetService {
    pub fn new(stores: FleetStores) -> Self {
        Self { stores }
    }

    pub fn stores(&self) -> &FleetStores {
        &self.stores
    }

    pub fn create_partner(&self, input: NewPartner) -> Result<Partner, FleetError> {
        let name = required(&input.name, "name")?;
        let nif = input.nif.trim().to_string();
        if !is_valid_nif(&nif) {
            return Err(FleetError::InvalidNif(nif));
        }
        if !is_plausible_email(&input.email) {
            return Err(FleetError::InvalidEmail(input.email));
        }
        let approval_limit = input.approval_limit.unwrap_or(DEFAULT_APPROVAL_LIMIT);
        if approval_limit < 0.0 {
            return Err(FleetError::Validation(
                "approval limit cannot be negative".to_string(),
            ));
        }
        if self.stores.partners.all()?.iter().any(|p| p.nif == nif) {
            return Err(FleetError::Validation(format!(
                "a partner with NIF {nif} already exists"
            )));
        }

        let partner = self.stores.partners.insert(Partner {
            id: new_id(),
            name,
            nif,
            email: input.email.trim().to_lowercase(),
            phone: input.phone,
            plan: input.plan,
            storage: StorageSettings::default(),
            approval_limit,
            active: true,
            created_at: Utc::now(),
        })?;
        tracing::info!(partner_id = %partner.id, plan = partner.plan.label(), "partner created");
        Ok(partner)
    }

    pub fn list_partners(&self) -> Result<Vec<Partner>, FleetError> {
        Ok(self.stores.partners.all()?)
    }

    pub fn get_partner(&self, partner_id: &str) -> Result<Partner, FleetError> {
        self.stores
            .partners
            .get(partner_id)?
            .ok_or_else(|| FleetError::not_found("partner", partner_id))
    }

    pub fn update_storage_settings(
        &self,
        partner_id: &str,
        settings: StorageSettings,
    ) -> Result<Partner, FleetError> {
        let mut partner = self.get_partner(partner_id)?;
        partner.storage = settings;
        self.stores.partners.update(partner.clone())?;
        tracing::info!(
            partner_id,
            provider = partner.storage.provider.label(),
            "storage settings updated"
        );
        Ok(partner)
    }

    /// Switches plan and returns the pro-rata adjustment for the current month.
    pub fn change_plan(
        &self,
        partner_id: &str,
        plan: PlanTier,
        change_date: NaiveDate,
    ) -> Result<PlanChangeCharge, FleetError> {
        let mut partner = self.get_partner(partner_id)?;
        let vehicles = self.billable_vehicles(partner_id)?;
        let charge = plan_change_charge(partner.plan, plan, vehicles, change_date);
        partner.plan = plan;
        self.stores.partners.update(partner)?;
        tracing::info!(partner_id, amount = charge.amount, "plan changed");
        Ok(charge)
    }

    pub fn billable_vehicles(&self, partner_id: &str) -> Result<u32, FleetError> {
        Ok(self
            .stores
            .vehicles
            .list(partner_id)?
            .iter()
            .filter(|vehicle| vehicle.status != VehicleStatus::Inativo)
            .count() as u32)
    }

    pub fn register_driver(&self, partner_id: &str, input: NewDriver) -> Result<Driver, FleetError> {
        self.get_partner(partner_id)?;
        let name = required(&input.name, "name")?;
        let licence_number = required(&input.licence_number, "licence_number")?;
        let nif = input.nif.trim().to_string();
        if !is_valid_nif(&nif) {
            return Err(FleetError::InvalidNif(nif));
        }
        if !is_plausible_email(&input.email) {
            return Err(FleetError::InvalidEmail(input.email));
        }
        if self
            .stores
            .drivers
            .list(partner_id)?
            .iter()
            .any(|driver| driver.nif == nif)
        {
            return Err(FleetError::DuplicateDriver(nif));
        }

        let driver = self.stores.drivers.insert(Driver {
            id: new_id(),
            partner_id: partner_id.to_string(),
            name,
            nif,
            email: input.email.trim().to_lowercase(),
            phone: input.phone,
            licence_number,
            licence_expiry: input.licence_expiry,
            tvde_certificate_expiry: input.tvde_certificate_expiry,
            iban: input.iban,
            status: DriverStatus::Pendente,
            uber_uuid: non_blank(input.uber_uuid),
            bolt_id: non_blank(input.bolt_id),
            vehicle_id: None,
            classification: None,
            documents: Vec::new(),
            created_at: Utc::now(),
        })?;
        tracing::info!(partner_id, driver_id = %driver.id, "driver registered");
        Ok(driver)
    }

    pub fn list_drivers(&self, partner_id: &str) -> Result<Vec<Driver>, FleetError> {
        Ok(self.stores.drivers.list(partner_id)?)
    }

    pub fn get_driver(&self, partner_id: &str, driver_id: &str) -> Result<Driver, FleetError> {
        self.stores
            .drivers
            .get_for(partner_id, driver_id)?
            .ok_or_else(|| FleetError::not_found("driver", driver_id))
    }

    pub fn update_driver(
        &self,
        partner_id: &str,
        driver_id: &str,
        update: DriverUpdate,
    ) -> Result<Driver, FleetError> {
        let mut driver = self.get_driver(partner_id, driver_id)?;
        if let Some(name) = update.name {
            driver.name = required(&name, "name")?;
        }
        if let Some(email) = update.email {
            if !is_plausible_email(&email) {
                return Err(FleetError::InvalidEmail(email));
            }
            driver.email = email.trim().to_lowercase();
        }
        if let Some(licence_number) = update.licence_number {
            driver.licence_number = required(&licence_number, "licence_number")?;
        }
        if update.phone.is_some() {
            driver.phone = update.phone;
        }
        if let Some(expiry) = update.licence_expiry {
            driver.licence_expiry = expiry;
        }
        if update.tvde_certificate_expiry.is_some() {
            driver.tvde_certificate_expiry = update.tvde_certificate_expiry;
        }
        if update.iban.is_some() {
            driver.iban = update.iban;
        }
        if update.uber_uuid.is_some() {
            driver.uber_uuid = non_blank(update.uber_uuid);
        }
        if update.bolt_id.is_some() {
            driver.bolt_id = non_blank(update.bolt_id);
        }
        self.stores.drivers.update(driver.clone())?;
        Ok(driver)
    }

    /// Adds or replaces a checklist document.
    pub fn attach_document(
        &self,
        partner_id: &str,
        driver_id: &str,
        upload: DocumentUpload,
    ) -> Result<Driver, FleetError> {
        let mut driver = self.get_driver(partner_id, driver_id)?;
        driver.documents.retain(|doc| doc.kind != upload.kind);
        driver.documents.push(DriverDocument {
            kind: upload.kind,
            storage_path: upload.storage_path,
            valid_until: upload.valid_until,
            uploaded_at: Utc::now(),
        });
        driver.documents.sort_by_key(|doc| doc.kind);
        self.stores.drivers.update(driver.clone())?;
        tracing::debug!(partner_id, driver_id, kind = upload.kind.label(), "document attached");
        Ok(driver)
    }

    pub fn activate_driver(
        &self,
        partner_id: &str,
        driver_id: &str,
        today: NaiveDate,
    ) -> Result<Driver, FleetError> {
        let mut driver = self.get_driver(partner_id, driver_id)?;
        let missing = driver.missing_documents(today);
        if !missing.is_empty() {
            return Err(FleetError::MissingDocuments(
                missing.into_iter().map(DocumentKind::label).collect(),
            ));
        }
        if driver.licence_expiry < today {
            return Err(FleetError::LicenceExpired(driver.licence_expiry));
        }
        driver.status = DriverStatus::Ativo;
        self.stores.drivers.update(driver.clone())?;
        tracing::info!(partner_id, driver_id, "driver activated");
        Ok(driver)
    }

    /// Marks the driver inactive and hands back any assigned vehicle.
    pub fn deactivate_driver(
        &self,
        partner_id: &str,
        driver_id: &str,
        today: NaiveDate,
    ) -> Result<Driver, FleetError> {
        let mut driver = self.get_driver(partner_id, driver_id)?;
        self.close_driver_contracts(partner_id, driver_id, today + Duration::days(1))?;
        driver.vehicle_id = None;
        driver.status = DriverStatus::Inativo;
        self.stores.drivers.update(driver.clone())?;
        tracing::info!(partner_id, driver_id, "driver deactivated");
        Ok(driver)
    }

    pub fn set_classification(
        &self,
        partner_id: &str,
        driver_id: &str,
        level: &str,
    ) -> Result<(), FleetError> {
        let mut driver = self.get_driver(partner_id, driver_id)?;
        if driver.classification.as_deref() != Some(level) {
            driver.classification = Some(level.to_string());
            self.stores.drivers.update(driver)?;
        }
        Ok(())
    }

    pub fn register_vehicle(
        &self,
        partner_id: &str,
        input: NewVehicle,
    ) -> Result<Vehicle, FleetError> {
        self.get_partner(partner_id)?;
        let plate = normalize_plate(&input.plate)
            .ok_or_else(|| FleetError::InvalidPlate(input.plate.clone()))?;
        if self
            .stores
            .vehicles
            .list(partner_id)?
            .iter()
            .any(|vehicle| vehicle.plate == plate)
        {
            return Err(FleetError::DuplicatePlate(plate));
        }

        let vehicle = self.stores.vehicles.insert(Vehicle {
            id: new_id(),
            partner_id: partner_id.to_string(),
            plate,
            make: required(&input.make, "make")?,
            model: required(&input.model, "model")?,
            year: input.year,
            energy: input.energy,
            via_verde_obu: non_blank(input.via_verde_obu),
            fuel_card: non_blank(input.fuel_card),
            charging_card: non_blank(input.charging_card),
            insurance_expiry: input.insurance_expiry,
            inspection_expiry: input.inspection_expiry,
            status: VehicleStatus::Disponivel,
            driver_id: None,
            created_at: Utc::now(),
        })?;
        tracing::info!(partner_id, vehicle_id = %vehicle.id, plate = %vehicle.plate, "vehicle registered");
        Ok(vehicle)
    }

    pub fn list_vehicles(&self, partner_id: &str) -> Result<Vec<Vehicle>, FleetError> {
        Ok(self.stores.vehicles.list(partner_id)?)
    }

    pub fn get_vehicle(&self, partner_id: &str, vehicle_id: &str) -> Result<Vehicle, FleetError> {
        self.stores
            .vehicles
            .get_for(partner_id, vehicle_id)?
            .ok_or_else(|| FleetError::not_found("vehicle", vehicle_id))
    }

    /// Moves a vehicle between available, maintenance and inactive.
    /// Assignment only happens through [`FleetService::assign_vehicle`].
    pub fn update_vehicle_status(
        &self,
        partner_id: &str,
        vehicle_id: &str,
        status: VehicleStatus,
    ) -> Result<Vehicle, FleetError> {
        let mut vehicle = self.get_vehicle(partner_id, vehicle_id)?;
        if status == VehicleStatus::Atribuido {
            return Err(FleetError::Validation(
                "use the assignment endpoint to assign a vehicle".to_string(),
            ));
        }
        if vehicle.status == VehicleStatus::Atribuido {
            return Err(FleetError::VehicleUnavailable {
                plate: vehicle.plate,
                status: VehicleStatus::Atribuido.label(),
            });
        }
        vehicle.status = status;
        self.stores.vehicles.update(vehicle.clone())?;
        Ok(vehicle)
    }

    /// Hands a vehicle to an active driver under a new contract.
    ///
    /// Any contract the driver still has open ends the day before `start`.
    pub fn assign_vehicle(
        &self,
        partner_id: &str,
        vehicle_id: &str,
        assignment: Assignment,
    ) -> Result<Contract, FleetError> {
        let driver = self.get_driver(partner_id, &assignment.driver_id)?;
        if driver.status != DriverStatus::Ativo {
            return Err(FleetError::DriverNotActive(driver.name));
        }
        let mut vehicle = self.get_vehicle(partner_id, vehicle_id)?;
        if vehicle.status != VehicleStatus::Disponivel {
            return Err(FleetError::VehicleUnavailable {
                plate: vehicle.plate,
                status: vehicle.status.label(),
            });
        }
        validate_contract(&assignment.kind, assignment.deposit)?;
        self.ensure_starts_after_open_contracts(partner_id, &driver.id, assignment.start)?;

        self.close_driver_contracts(partner_id, &driver.id, assignment.start)?;
        let contract = self.stores.contracts.insert(Contract {
            id: new_id(),
            partner_id: partner_id.to_string(),
            driver_id: driver.id.clone(),
            vehicle_id: Some(vehicle.id.clone()),
            kind: assignment.kind,
            start: assignment.start,
            end: None,
            deposit: assignment.deposit,
            active: true,
            created_at: Utc::now(),
        })?;

        vehicle.status = VehicleStatus::Atribuido;
        vehicle.driver_id = Some(driver.id.clone());
        self.stores.vehicles.update(vehicle)?;
        let mut driver = self.get_driver(partner_id, &driver.id)?;
        driver.vehicle_id = Some(vehicle_id.to_string());
        self.stores.drivers.update(driver)?;

        tracing::info!(partner_id, vehicle_id, contract_id = %contract.id, "vehicle assigned");
        Ok(contract)
    }

    /// Contract for a driver working with their own vehicle.
    pub fn own_vehicle_contract(
        &self,
        partner_id: &str,
        driver_id: &str,
        kind: ContractKind,
        start: NaiveDate,
    ) -> Result<Contract, FleetError> {
        let driver = self.get_driver(partner_id, driver_id)?;
        if driver.status != DriverStatus::Ativo {
            return Err(FleetError::DriverNotActive(driver.name));
        }
        if matches!(kind, ContractKind::Aluguer { .. }) {
            return Err(FleetError::Validation(
                "rental contracts need a vehicle".to_string(),
            ));
        }
        validate_contract(&kind, 0.0)?;
        self.ensure_starts_after_open_contracts(partner_id, driver_id, start)?;

        self.close_driver_contracts(partner_id, driver_id, start)?;
        if driver.vehicle_id.is_some() {
            let mut driver = driver;
            driver.vehicle_id = None;
            self.stores.drivers.update(driver)?;
        }
        let contract = self.stores.contracts.insert(Contract {
            id: new_id(),
            partner_id: partner_id.to_string(),
            driver_id: driver_id.to_string(),
            vehicle_id: None,
            kind,
            start,
            end: None,
            deposit: 0.0,
            active: true,
            created_at: Utc::now(),
        })?;
        Ok(contract)
    }

    /// Ends the vehicle's active contract on `end` and makes it available again.
    pub fn release_vehicle(
        &self,
        partner_id: &str,
        vehicle_id: &str,
        end: NaiveDate,
    ) -> Result<Contract, FleetError> {
        let mut vehicle = self.get_vehicle(partner_id, vehicle_id)?;
        let mut contract = self
            .stores
            .contracts
            .list(partner_id)?
            .into_iter()
            .find(|contract| contract.active && contract.vehicle_id.as_deref() == Some(vehicle_id))
            .ok_or_else(|| FleetError::VehicleNotAssigned(vehicle.plate.clone()))?;
        if end < contract.start {
            return Err(FleetError::Validation(format!(
                "contract cannot end before it starts on {}",
                contract.start
            )));
        }

        close_contract(&mut contract, end);
        self.stores.contracts.update(contract.clone())?;

        if let Some(mut driver) = self
            .stores
            .drivers
            .get_for(partner_id, &contract.driver_id)?
        {
            if driver.vehicle_id.as_deref() == Some(vehicle_id) {
                driver.vehicle_id = None;
                self.stores.drivers.update(driver)?;
            }
        }
        vehicle.status = VehicleStatus::Disponivel;
        vehicle.driver_id = None;
        self.stores.vehicles.update(vehicle)?;

        tracing::info!(partner_id, vehicle_id, contract_id = %contract.id, "vehicle released");
        Ok(contract)
    }

    pub fn list_contracts(
        &self,
        partner_id: &str,
        driver_id: Option<&str>,
    ) -> Result<Vec<Contract>, FleetError> {
        let mut contracts: Vec<Contract> = self
            .stores
            .contracts
            .list(partner_id)?
            .into_iter()
            .filter(|contract| driver_id.map_or(true, |id| contract.driver_id == id))
            .collect();
        contracts.sort_by(|a, b| b.start.cmp(&a.start));
        Ok(contracts)
    }

    /// Documents expiring within `horizon_days` of `today`, or already expired.
    pub fn expiry_alerts(
        &self,
        partner_id: &str,
        today: NaiveDate,
        horizon_days: i64,
    ) -> Result<Vec<ExpiryAlert>, FleetError> {
        let limit = today + Duration::days(horizon_days);
        let mut alerts = Vec::new();

        for vehicle in self.stores.vehicles.list(partner_id)? {
            if vehicle.status == VehicleStatus::Inativo {
                continue;
            }
            let dates = [
                (ExpiryKind::Seguro, vehicle.insurance_expiry),
                (ExpiryKind::Inspecao, vehicle.inspection_expiry),
            ];
            for (kind, date) in dates {
                if let Some(date) = date.filter(|date| *date <= limit) {
                    alerts.push(ExpiryAlert::new(kind, &vehicle.id, &vehicle.plate, date, today));
                }
            }
        }

        for driver in self.stores.drivers.list(partner_id)? {
            if driver.status == DriverStatus::Inativo {
                continue;
            }
            let dates = [
                (ExpiryKind::CartaConducao, Some(driver.licence_expiry)),
                (ExpiryKind::CertificadoTvde, driver.tvde_certificate_expiry),
            ];
            for (kind, date) in dates {
                if let Some(date) = date.filter(|date| *date <= limit) {
                    alerts.push(ExpiryAlert::new(kind, &driver.id, &driver.name, date, today));
                }
            }
        }

        alerts.sort_by(|a, b| a.expires_on.cmp(&b.expires_on));
        Ok(alerts)
    }

    pub fn save_credentials(
        &self,
        partner_id: &str,
        platform: Platform,
        input: CredentialsInput,
    ) -> Result<CredentialsView, FleetError> {
        self.get_partner(partner_id)?;
        let username = required(&input.username, "username")?;
        let existing = self.credentials(partner_id, platform)?;
        let preferred_mode = input
            .preferred_mode
            .or(existing.as_ref().map(|creds| creds.preferred_mode))
            .unwrap_or(IntegrationMode::Csv);
        if !platform.supports(preferred_mode) {
            return Err(FleetError::UnsupportedMode {
                platform: platform.label(),
                mode: preferred_mode,
            });
        }

        let credentials = match existing {
            Some(mut creds) => {
                creds.username = username;
                if let Some(password) = input.password {
                    creds.password = password;
                }
                if input.api_client_id.is_some() {
                    creds.api_client_id = non_blank(input.api_client_id);
                }
                if input.api_client_secret.is_some() {
                    creds.api_client_secret = non_blank(input.api_client_secret);
                }
                if input.two_factor_code.is_some() {
                    creds.two_factor_code = non_blank(input.two_factor_code);
                }
                creds.preferred_mode = preferred_mode;
                creds.active = input.active.unwrap_or(creds.active);
                self.stores.credentials.update(creds.clone())?;
                creds
            }
            None => self.stores.credentials.insert(PlatformCredentials {
                id: new_id(),
                partner_id: partner_id.to_string(),
                platform,
                username,
                password: input.password.unwrap_or_default(),
                api_client_id: non_blank(input.api_client_id),
                api_client_secret: non_blank(input.api_client_secret),
                two_factor_code: non_blank(input.two_factor_code),
                preferred_mode,
                active: input.active.unwrap_or(true),
                last_sync_at: None,
            })?,
        };

        if credentials.preferred_mode == IntegrationMode::Rpa && credentials.password.is_empty() {
            tracing::warn!(partner_id, platform = platform.slug(), "rpa credentials saved without password");
        }
        Ok(credentials.view())
    }

    pub fn credentials_view(&self, partner_id: &str) -> Result<Vec<CredentialsView>, FleetError> {
        Ok(self
            .stores
            .credentials
            .list(partner_id)?
            .iter()
            .map(PlatformCredentials::view)
            .collect())
    }

    pub fn credentials(
        &self,
        partner_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformCredentials>, FleetError> {
        Ok(self
            .stores
            .credentials
            .list(partner_id)?
            .into_iter()
            .find(|creds| creds.platform == platform))
    }

    pub fn mark_synced(
        &self,
        partner_id: &str,
        platform: Platform,
    ) -> Result<(), FleetError> {
        if let Some(mut creds) = self.credentials(partner_id, platform)? {
            creds.last_sync_at = Some(Utc::now());
            self.stores.credentials.update(creds)?;
        }
        Ok(())
    }

    fn active_contracts_of(
        &self,
        partner_id: &str,
        driver_id: &str,
    ) -> Result<Vec<Contract>, FleetError> {
        Ok(self
            .stores
            .contracts
            .list(partner_id)?
            .into_iter()
            .filter(|contract| contract.active && contract.driver_id == driver_id)
            .collect())
    }

    fn ensure_starts_after_open_contracts(
        &self,
        partner_id: &str,
        driver_id: &str,
        start: NaiveDate,
    ) -> Result<(), FleetError> {
        match self
            .active_contracts_of(partner_id, driver_id)?
            .into_iter()
            .map(|contract| contract.start)
            .max()
        {
            Some(latest) if start < latest => Err(FleetError::Validation(format!(
                "new contract cannot start before the open contract starting {latest}"
            ))),
            _ => Ok(()),
        }
    }

    /// Open contracts end the day before `next_start`; one starting that same day
    /// is left covering no days at all.
    fn close_driver_contracts(
        &self,
        partner_id: &str,
        driver_id: &str,
        next_start: NaiveDate,
    ) -> Result<(), FleetError> {
        for mut contract in self.active_contracts_of(partner_id, driver_id)? {
            if let Some(vehicle_id) = contract.vehicle_id.clone() {
                if let Some(mut vehicle) = self.stores.vehicles.get_for(partner_id, &vehicle_id)? {
                    vehicle.status = VehicleStatus::Disponivel;
                    vehicle.driver_id = None;
                    self.stores.vehicles.update(vehicle)?;
                }
            }
            close_contract(&mut contract, next_start - Duration::days(1));
            self.stores.contracts.update(contract)?;
        }
        Ok(())
    }
}

fn close_contract(contract: &mut Contract, end: NaiveDate) {
    contract.end = Some(end);
    contract.active = false;
}

fn validate_contract(kind: &ContractKind, deposit: f64) -> Result<(), FleetError> {
    if deposit < 0.0 {
        return Err(FleetError::Validation("deposit cannot be negative".to_string()));
    }
    match kind {
        ContractKind::Aluguer { weekly_rent } if *weekly_rent < 0.0 => Err(FleetError::Validation(
            "weekly rent cannot be negative".to_string(),
        )),
        ContractKind::Slot { weekly_fee } if *weekly_fee < 0.0 => Err(FleetError::Validation(
            "weekly fee cannot be negative".to_string(),
        )),
        ContractKind::Comissao {
            percentage: Some(pct),
        } if !(0.0..=100.0).contains(pct) => Err(FleetError::Validation(
            "commission percentage must be between 0 and 100".to_string(),
        )),
        _ => Ok(()),
    }
}

fn required(value: &str, field: &str) -> Result<String, FleetError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(FleetError::Validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|inner| inner.trim().to_string())
        .filter(|inner| !inner.is_empty())
}
