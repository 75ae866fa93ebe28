//! Devices discovered on a tailnet
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// JSON `null` decodes the same as a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One machine on the tailnet, as reported by a discovery backend.
///
/// Field names follow the public Tailscale API's JSON. `api` and `tailnet` are
/// never read from the upstream body: the discoverer that produced the record
/// stamps them before handing the list out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    /// Tailnet addresses; the first entry is the primary address
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub client_version: String,
    #[serde(default)]
    pub authorized: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,

    /// Host of the API which served this record
    #[serde(default, skip_deserializing)]
    pub api: String,
    /// Tailnet this device belongs to
    #[serde(default, skip_deserializing)]
    pub tailnet: String,
}

impl Device {
    /// Address a scraper should use to reach this device: the primary tailnet
    /// address, or failing that the hostname, or the fully qualified name.
    pub fn target(&self) -> Option<&str> {
        self.addresses
            .iter()
            .map(String::as_str)
            .chain([self.hostname.as_str(), self.name.as_str()])
            .find(|candidate| !candidate.is_empty())
    }

    /// Record which API and tailnet this device came from
    pub fn stamp(&mut self, api: &str, tailnet: &str) {
        self.api = api.to_string();
        self.tailnet = tailnet.to_string();
    }
}
