//! User directory and role models

use serde::{Deserialize, Serialize};

/// Roles known to the plant user directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Security Officer")]
    SecurityOfficer,
    #[serde(rename = "Warehouse Manager")]
    WarehouseManager,
    #[serde(rename = "Procurement Officer")]
    ProcurementOfficer,
    #[serde(rename = "QA Head")]
    QaHead,
    #[serde(rename = "QA Manager")]
    QaManager,
    #[serde(rename = "QA Operator")]
    QaOperator,
    #[serde(rename = "QC Head")]
    QcHead,
    #[serde(rename = "QC Manager")]
    QcManager,
    #[serde(rename = "QC Operator")]
    QcOperator,
    #[serde(rename = "Production Head")]
    ProductionHead,
    #[serde(rename = "Production Manager")]
    ProductionManager,
    #[serde(rename = "Production Operator")]
    ProductionOperator,
    #[serde(rename = "Finance Officer")]
    FinanceOfficer,
    #[serde(rename = "System Admin")]
    SystemAdmin,
    #[serde(rename = "Plant Head")]
    PlantHead,
    #[serde(rename = "Management")]
    Management,
    #[serde(rename = "Sales Person")]
    SalesPerson,
}

impl Role {
    pub const ALL: [Role; 17] = [
        Role::SecurityOfficer,
        Role::WarehouseManager,
        Role::ProcurementOfficer,
        Role::QaHead,
        Role::QaManager,
        Role::QaOperator,
        Role::QcHead,
        Role::QcManager,
        Role::QcOperator,
        Role::ProductionHead,
        Role::ProductionManager,
        Role::ProductionOperator,
        Role::FinanceOfficer,
        Role::SystemAdmin,
        Role::PlantHead,
        Role::Management,
        Role::SalesPerson,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SecurityOfficer => "Security Officer",
            Role::WarehouseManager => "Warehouse Manager",
            Role::ProcurementOfficer => "Procurement Officer",
            Role::QaHead => "QA Head",
            Role::QaManager => "QA Manager",
            Role::QaOperator => "QA Operator",
            Role::QcHead => "QC Head",
            Role::QcManager => "QC Manager",
            Role::QcOperator => "QC Operator",
            Role::ProductionHead => "Production Head",
            Role::ProductionManager => "Production Manager",
            Role::ProductionOperator => "Production Operator",
            Role::FinanceOfficer => "Finance Officer",
            Role::SystemAdmin => "System Admin",
            Role::PlantHead => "Plant Head",
            Role::Management => "Management",
            Role::SalesPerson => "Sales Person",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Role::ALL.iter().copied().find(|role| role.as_str() == s)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated identity performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

/// A row of the user directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: String,
    pub plant_id: Option<String>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_labels_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("Superuser"), None);
    }

    #[test]
    fn role_serializes_as_label() {
        let json = serde_json::to_string(&Role::QaManager).unwrap();
        assert_eq!(json, "\"QA Manager\"");
    }
}
