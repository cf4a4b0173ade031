use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::catalog::{
    KubernetesSettings, MachineImage, MachineType, Region, SeedSelector, VolumeType,
};

/// Cluster wide catalog that namespaced and private profiles extend.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "CloudProfile",
    plural = "cloudprofiles",
    shortname = "cprofile",
    shortname = "cpfl",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudProfileSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    #[serde(default)]
    pub kubernetes: KubernetesSettings,
    #[serde(default)]
    pub machine_images: Vec<MachineImage>,
    #[serde(default)]
    pub machine_types: Vec<MachineType>,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_selector: Option<SeedSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_types: Vec<VolumeType>,
    /// Provider type, e.g. aws, gcp, openstack
    #[serde(rename = "type", default)]
    pub provider_type: String,
}
