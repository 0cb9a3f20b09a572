//! Tenants, drivers, vehicles, contracts and third-party platform accounts.

pub mod domain;
pub mod platforms;
pub mod router;
pub mod service;

pub use domain::{
    is_plausible_email, is_valid_nif, normalize_plate, Contract, ContractKind, DocumentKind,
    Driver, DriverDocument, DriverStatus, Energy, ExpiryAlert, ExpiryKind, Partner, Period,
    Vehicle, VehicleStatus,
};
pub use platforms::{
    CredentialsView, DataCategory, IntegrationMode, Platform, PlatformCredentials, PlatformInfo,
    SyncLog, SyncStatus,
};
pub use router::fleet_router;
pub use service::{
    Assignment, CredentialsInput, DocumentUpload, DriverUpdate, FleetError, FleetService,
    FleetStores, NewDriver, NewPartner, NewVehicle,
};
