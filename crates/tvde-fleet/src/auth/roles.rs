use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    /// Fleet manager working on behalf of a partner.
    Gestor,
    /// Partner owner.
    Parceiro,
    Contabilidade,
    Motorista,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManagePartners,
    ManageFleet,
    ManageDrivers,
    ImportData,
    ManageAutomations,
    RequestFinancial,
    ApproveFinancial,
    PayFinancial,
    ViewReports,
}

impl Permission {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ManagePartners => "gerir parceiros",
            Self::ManageFleet => "gerir frota",
            Self::ManageDrivers => "gerir motoristas",
            Self::ImportData => "importar dados",
            Self::ManageAutomations => "gerir automações",
            Self::RequestFinancial => "submeter pedidos financeiros",
            Self::ApproveFinancial => "aprovar pedidos financeiros",
            Self::PayFinancial => "pagar pedidos financeiros",
            Self::ViewReports => "consultar relatórios",
        }
    }
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "Administrador",
            Self::Gestor => "Gestor de frota",
            Self::Parceiro => "Parceiro",
            Self::Contabilidade => "Contabilidade",
            Self::Motorista => "Motorista",
        }
    }

    /// Static permission matrix.
    pub const fn allows(self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Self::Admin => true,
            Self::Parceiro => !matches!(permission, ManagePartners),
            Self::Gestor => matches!(
                permission,
                ManageFleet
                    | ManageDrivers
                    | ImportData
                    | ManageAutomations
                    | RequestFinancial
                    | ApproveFinancial
                    | ViewReports
            ),
            Self::Contabilidade => matches!(
                permission,
                RequestFinancial | ApproveFinancial | PayFinancial | ViewReports | ImportData
            ),
            Self::Motorista => matches!(permission, RequestFinancial),
        }
    }

    /// Roles allowed to approve amounts above the partner's approval limit.
    pub const fn approves_above_limit(self) -> bool {
        matches!(self, Self::Admin | Self::Parceiro)
    }
}
