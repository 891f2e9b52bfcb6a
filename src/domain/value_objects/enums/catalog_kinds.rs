use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Catalog rows carry either a recurring plan or a one-off lead package.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    #[default]
    Plan,
    LeadPackage,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Plan => "plan",
            CatalogKind::LeadPackage => "lead_package",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "plan" => Some(CatalogKind::Plan),
            "lead_package" => Some(CatalogKind::LeadPackage),
            _ => None,
        }
    }
}

impl Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
