//! Builds the effective catalog of a child profile from its parent.
//!
//! The merge is additive: parent entries come first, child entries are appended
//! in their own order, and nothing is deduplicated. Keeping children from
//! redefining parent entries is the admission check's job.

use kube::{Resource, ResourceExt, core::ObjectMeta};

use crate::crds::{
    ChildProfile,
    catalog::CatalogSpec,
    cloud_profile::{CloudProfile, CloudProfileSpec},
};

/// Merges `child` into a copy of `parent`.
///
/// The seed selector is not merged; the effective catalog carries none.
pub fn merge_catalogs(parent: &CloudProfileSpec, child: &CatalogSpec) -> CloudProfileSpec {
    let mut merged = parent.clone();

    if let Some(kubernetes) = &child.kubernetes {
        merged
            .kubernetes
            .versions
            .extend(kubernetes.versions.iter().cloned());
    }
    append(&mut merged.machine_images, &child.machine_images);
    append(&mut merged.machine_types, &child.machine_types);
    append(&mut merged.regions, &child.regions);
    append(&mut merged.volume_types, &child.volume_types);

    merged.ca_bundle = match (&parent.ca_bundle, &child.ca_bundle) {
        (Some(parent), Some(child)) => Some(format!("{parent}{child}")),
        (parent, child) => parent.clone().or_else(|| child.clone()),
    };
    merged.seed_selector = None;

    merged
}

fn append<T: Clone>(into: &mut Vec<T>, from: &Option<Vec<T>>) {
    if let Some(items) = from {
        into.extend(items.iter().cloned());
    }
}

/// The effective catalog of `child`, presented as a root profile named after the child.
pub fn merge_cloud_profiles<K: ChildProfile>(parent: &CloudProfile, child: &K) -> CloudProfile {
    present_as_child(child, merge_catalogs(&parent.spec, child.catalog()))
}

/// Wraps `spec` in a [`CloudProfile`] carrying the identity of `child`.
pub fn present_as_child<K: Resource>(child: &K, spec: CloudProfileSpec) -> CloudProfile {
    CloudProfile {
        metadata: ObjectMeta {
            name: Some(child.name_any()),
            creation_timestamp: child.meta().creation_timestamp.clone(),
            ..Default::default()
        },
        spec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{
        CloudProfileReference,
        catalog::{ExpirableVersion, KubernetesSettings, MachineType, Region},
        namespaced_cloud_profile::{NamespacedCloudProfile, NamespacedCloudProfileSpec},
    };

    fn parent() -> CloudProfile {
        CloudProfile::new(
            "aws",
            CloudProfileSpec {
                ca_bundle: Some("PARENT".into()),
                kubernetes: KubernetesSettings {
                    versions: vec![ExpirableVersion::new("1.30.0")],
                },
                machine_types: vec![MachineType::new("m5.large", "2", "0", "8Gi")],
                regions: vec![Region::new("eu-west-1", &["eu-west-1a"])],
                provider_type: "aws".into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn child_without_sections_inherits_the_parent() {
        let merged = merge_catalogs(&parent().spec, &CatalogSpec::default());
        let mut expected = parent().spec;
        expected.seed_selector = None;
        assert_eq!(merged, expected);
    }

    #[test]
    fn ca_bundles_are_concatenated_without_separator() {
        let child = CatalogSpec {
            ca_bundle: Some("CHILD".into()),
            ..Default::default()
        };
        assert_eq!(
            merge_catalogs(&parent().spec, &child).ca_bundle.as_deref(),
            Some("PARENTCHILD")
        );

        let mut no_bundle = parent().spec;
        no_bundle.ca_bundle = None;
        assert_eq!(
            merge_catalogs(&no_bundle, &child).ca_bundle.as_deref(),
            Some("CHILD")
        );
    }

    #[test]
    fn effective_profile_takes_the_child_identity() {
        let mut child = NamespacedCloudProfile::new(
            "team-profile",
            NamespacedCloudProfileSpec {
                parent: CloudProfileReference::cloud_profile("aws"),
                catalog: CatalogSpec {
                    machine_types: Some(vec![MachineType::new("team-large", "4", "0", "16Gi")]),
                    ..Default::default()
                },
            },
        );
        child.metadata.namespace = Some("garden-team".into());

        let merged = merge_cloud_profiles(&parent(), &child);
        assert_eq!(merged.name_any(), "team-profile");
        assert_eq!(merged.metadata.namespace, None);
        let names: Vec<&str> = merged
            .spec
            .machine_types
            .iter()
            .map(|machine_type| machine_type.name.as_str())
            .collect();
        assert_eq!(names, vec!["m5.large", "team-large"]);
    }
}
