//! Registration defaults and the sentinel identity.

use callrelay_core::types::{ConnectionClass, RegistrationDefaults};
use serde::{Deserialize, Serialize};

/// Registry settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// Identity shared by non-addressable service connections.
    pub sentinel_identity: String,
    /// Class assigned when a registration declares none.
    pub default_class: ConnectionClass,
    /// Display name for registrations without one; `{identity}` is substituted.
    pub display_name_template: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            sentinel_identity: "service".to_string(),
            default_class: ConnectionClass::Generic,
            display_name_template: "Agent {identity}".to_string(),
        }
    }
}

impl RegistrySettings {
    /// Defaults handed to the lifecycle manager.
    pub fn registration_defaults(&self) -> RegistrationDefaults {
        RegistrationDefaults {
            default_class: self.default_class.clone(),
            display_name_template: self.display_name_template.clone(),
        }
    }
}
