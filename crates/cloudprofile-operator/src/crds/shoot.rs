use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::CloudProfileReference;

/// Read-only view of a Shoot cluster, reduced to the fields that tie it to a profile.
///
/// The Shoot API is served by the Gardener API server; this type is only used to
/// list and watch shoots and is never installed as a CRD.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "Shoot",
    plural = "shoots",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_profile_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_profile: Option<CloudProfileReference>,
}

impl Shoot {
    /// Whether this shoot provisions from the profile `kind`/`name` in its own namespace.
    pub fn references(&self, kind: &str, name: &str) -> bool {
        let by_reference = self
            .spec
            .cloud_profile
            .as_ref()
            .is_some_and(|reference| reference.kind == kind && reference.name == name);
        by_reference || self.spec.cloud_profile_name.as_deref() == Some(name)
    }

    /// Profile names this shoot may provision from, for the given child kind.
    pub fn referenced_profiles(&self, kind: &str) -> Vec<String> {
        let mut names: Vec<String> = self.spec.cloud_profile_name.iter().cloned().collect();
        if let Some(reference) = &self.spec.cloud_profile
            && reference.kind == kind
            && !names.contains(&reference.name)
        {
            names.push(reference.name.clone());
        }
        names
    }
}
