use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::LabelSelector};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantNames};
use time::OffsetDateTime;

/// Lifecycle stage of a Kubernetes or machine image version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum VersionClassification {
    Preview,
    Supported,
    Deprecated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum MachineImageUpdateStrategy {
    Patch,
    Minor,
    Major,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum CriName {
    Containerd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

/// Catalog sections a child profile adds on top of its parent.
///
/// Every section is optional; a missing section contributes nothing to the
/// effective catalog and is skipped by validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSpec {
    /// PEM encoded CA bundle appended to the parent's bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_images: Option<Vec<MachineImage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_types: Option<Vec<MachineType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<Region>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_selector: Option<SeedSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_types: Option<Vec<VolumeType>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSettings {
    #[serde(default)]
    pub versions: Vec<ExpirableVersion>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpirableVersion {
    pub version: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    #[schemars(with = "Option<String>")]
    pub expiration_date: Option<OffsetDateTime>,
    /// One of preview, supported, deprecated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
}

impl ExpirableVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_classification(mut self, classification: VersionClassification) -> Self {
        self.classification = Some(classification.to_string());
        self
    }

    pub fn expiring_at(mut self, date: OffsetDateTime) -> Self {
        self.expiration_date = Some(date);
        self
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiration_date.is_some_and(|date| date < now)
    }

    pub fn is_classified_as(&self, classification: VersionClassification) -> bool {
        self.classification.as_deref() == Some(classification.as_ref())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineImage {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<MachineImageVersion>,
    /// One of patch, minor, major
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineImageVersion {
    #[serde(flatten)]
    pub expirable: ExpirableVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cri: Option<Vec<Cri>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
    /// Semantic version range the kubelet version must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_version_constraint: Option<String>,
}

impl MachineImageVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            expirable: ExpirableVersion::new(version),
            cri: Some(vec![Cri::new(CriName::Containerd.as_ref())]),
            ..Default::default()
        }
    }

    pub fn version(&self) -> &str {
        &self.expirable.version
    }
}

/// Container runtime interface supported by a machine image version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cri {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_runtimes: Option<Vec<ContainerRuntime>>,
}

impl Cri {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container_runtimes: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContainerRuntime {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineType {
    pub name: String,
    pub cpu: Quantity,
    pub gpu: Quantity,
    pub memory: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<MachineTypeStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usable: Option<bool>,
    /// One of amd64, arm64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

impl MachineType {
    pub fn new(name: impl Into<String>, cpu: &str, gpu: &str, memory: &str) -> Self {
        Self {
            name: name.into(),
            cpu: Quantity(cpu.into()),
            gpu: Quantity(gpu.into()),
            memory: Quantity(memory.into()),
            ..Default::default()
        }
    }
}

/// Root disk of a machine type. Exactly one of `size` and `minSize` is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineTypeStorage {
    pub class: String,
    #[serde(rename = "size", default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<Quantity>,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeType {
    pub name: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<Quantity>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub name: String,
    #[serde(default)]
    pub zones: Vec<AvailabilityZone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

impl Region {
    pub fn new(name: impl Into<String>, zones: &[&str]) -> Self {
        Self {
            name: name.into(),
            zones: zones.iter().map(|zone| AvailabilityZone::new(*zone)).collect(),
            labels: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityZone {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable_machine_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable_volume_types: Vec<String>,
}

impl AvailabilityZone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Restricts the seed clusters a shoot using this profile may be scheduled on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeedSelector {
    #[serde(flatten)]
    pub label_selector: LabelSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_types: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_enum_literals() {
        assert_eq!(
            "supported".parse::<VersionClassification>().unwrap(),
            VersionClassification::Supported
        );
        assert!("dummy".parse::<VersionClassification>().is_err());
        assert_eq!(CriName::VARIANTS, &["containerd"]);
        assert_eq!(Architecture::VARIANTS, &["amd64", "arm64"]);
    }

    #[test]
    fn expiration_is_strictly_before_now() {
        let now = datetime!(2024-06-01 00:00 UTC);
        let version = ExpirableVersion::new("1.30.1").expiring_at(now);
        assert!(!version.is_expired(now));
        assert!(version.is_expired(datetime!(2024-06-01 00:01 UTC)));
        assert!(!ExpirableVersion::new("1.30.2").is_expired(now));
    }

    #[test]
    fn machine_image_version_flattens_expirable_fields() {
        let version: MachineImageVersion = serde_json::from_value(serde_json::json!({
            "version": "1.2.3",
            "classification": "preview",
            "expirationDate": "2030-01-01T00:00:00Z",
            "cri": [{"name": "containerd", "containerRuntimes": [{"type": "gvisor"}]}],
            "architectures": ["arm64"]
        }))
        .unwrap();

        assert_eq!(version.version(), "1.2.3");
        assert!(version.expirable.is_classified_as(VersionClassification::Preview));
        assert_eq!(
            version.expirable.expiration_date,
            Some(datetime!(2030-01-01 00:00 UTC))
        );
        let runtimes = version.cri.unwrap()[0].container_runtimes.clone().unwrap();
        assert_eq!(runtimes[0].type_, "gvisor");
    }

    #[test]
    fn storage_size_is_serialized_as_size() {
        let storage = MachineTypeStorage {
            class: "standard".into(),
            storage_size: Some(Quantity("20Gi".into())),
            min_size: None,
            type_: "default".into(),
        };
        let value = serde_json::to_value(&storage).unwrap();
        assert_eq!(value["size"], "20Gi");
        assert!(value.get("minSize").is_none());
    }
}
