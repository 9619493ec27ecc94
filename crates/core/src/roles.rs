//! Role and capability gating for the client UI
//!
//! Roles arrive from the backend as display names ("Warehouse Manager",
//! "SuperAdmin", ...). Consumers gate screens on [`Capability`] values instead
//! of comparing those strings. None of this is a security boundary: the
//! backend still authorizes every request.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A user role as assigned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    SuperAdmin,
    Administrator,
    DepartmentManager,
    WarehouseManager,
    Supplier,
    /// Any role name the client does not know about
    Other(String),
}

impl Role {
    /// Parse a backend role name
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "SuperAdmin" => Self::SuperAdmin,
            "Administrator" => Self::Administrator,
            "Department Manager" => Self::DepartmentManager,
            "Warehouse Manager" => Self::WarehouseManager,
            "Supplier" => Self::Supplier,
            other => Self::Other(other.to_string()),
        }
    }

    /// The backend display name of this role
    pub fn name(&self) -> &str {
        match self {
            Self::SuperAdmin => "SuperAdmin",
            Self::Administrator => "Administrator",
            Self::DepartmentManager => "Department Manager",
            Self::WarehouseManager => "Warehouse Manager",
            Self::Supplier => "Supplier",
            Self::Other(name) => name,
        }
    }

    /// Check whether this role grants a capability
    pub fn can(&self, capability: Capability) -> bool {
        capability.allows(self)
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Screens and actions the client gates on role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    ViewDashboard,
    ViewOrders,
    CreateOrder,
    ManageInventory,
    Chat,
}

impl Capability {
    /// All capabilities, in menu order
    pub const ALL: [Self; 5] = [
        Self::ViewDashboard,
        Self::ViewOrders,
        Self::CreateOrder,
        Self::ManageInventory,
        Self::Chat,
    ];

    /// Check whether a role is allowed to use this capability
    pub fn allows(self, role: &Role) -> bool {
        match self {
            Self::ViewDashboard | Self::ViewOrders | Self::Chat => true,
            Self::CreateOrder => matches!(role, Role::DepartmentManager | Role::SuperAdmin),
            Self::ManageInventory => matches!(
                role,
                Role::WarehouseManager | Role::SuperAdmin | Role::Administrator
            ),
        }
    }
}

/// Check a role against an allow-list; an empty list admits everyone
pub fn role_allowed(role: &Role, allowed: &[Role]) -> bool {
    allowed.is_empty() || allowed.contains(role)
}
