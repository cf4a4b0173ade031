use time::OffsetDateTime;

use crate::crds::{ChildProfile, catalog::CatalogSpec};

/// Removes Kubernetes and machine image versions that expired before `now`.
pub fn drop_expired_versions(catalog: &mut CatalogSpec, now: OffsetDateTime) {
    if let Some(kubernetes) = &mut catalog.kubernetes {
        kubernetes.versions.retain(|version| !version.is_expired(now));
    }
    for image in catalog.machine_images.iter_mut().flatten() {
        image
            .versions
            .retain(|version| !version.expirable.is_expired(now));
    }
}

/// Normalizes a profile before it is first persisted.
pub fn prepare_for_create<K: ChildProfile>(profile: &mut K, now: OffsetDateTime) {
    profile.clear_status();
    drop_expired_versions(profile.catalog_mut(), now);
}

/// Normalizes a profile before an update is persisted. The status is left alone.
pub fn prepare_for_update<K: ChildProfile>(profile: &mut K, now: OffsetDateTime) {
    drop_expired_versions(profile.catalog_mut(), now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{
        CloudProfileReference, ProfileStatus,
        catalog::{ExpirableVersion, KubernetesSettings, MachineImage, MachineImageVersion},
        cloud_profile::CloudProfileSpec,
        namespaced_cloud_profile::{NamespacedCloudProfile, NamespacedCloudProfileSpec},
    };
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    fn image_version(version: &str, expires: Option<OffsetDateTime>) -> MachineImageVersion {
        let mut image_version = MachineImageVersion::new(version);
        image_version.expirable.expiration_date = expires;
        image_version
    }

    fn profile() -> NamespacedCloudProfile {
        let mut profile = NamespacedCloudProfile::new(
            "profile",
            NamespacedCloudProfileSpec {
                parent: CloudProfileReference::cloud_profile("aws"),
                catalog: CatalogSpec {
                    machine_images: Some(vec![MachineImage {
                        name: "gardenlinux".into(),
                        versions: vec![
                            image_version("1.0.0", Some(datetime!(2024-01-01 00:00 UTC))),
                            image_version("1.1.0", Some(datetime!(2025-01-01 00:00 UTC))),
                            image_version("1.2.0", None),
                        ],
                        update_strategy: None,
                    }]),
                    ..Default::default()
                },
            },
        );
        profile.status = Some(ProfileStatus::materialized(CloudProfileSpec::default()));
        profile
    }

    #[test]
    fn prunes_kubernetes_and_image_versions_independently() {
        let mut catalog = CatalogSpec {
            kubernetes: Some(KubernetesSettings {
                versions: vec![
                    ExpirableVersion::new("1.29.0").expiring_at(datetime!(2024-05-31 00:00 UTC)),
                    ExpirableVersion::new("1.30.0"),
                ],
            }),
            ..profile().spec.catalog
        };
        drop_expired_versions(&mut catalog, NOW);

        let kubernetes: Vec<&str> = catalog
            .kubernetes
            .iter()
            .flat_map(|k| k.versions.iter().map(|v| v.version.as_str()))
            .collect();
        assert_eq!(kubernetes, vec!["1.30.0"]);
        let images: Vec<&str> = catalog.machine_images.as_ref().unwrap()[0]
            .versions
            .iter()
            .map(MachineImageVersion::version)
            .collect();
        assert_eq!(images, vec!["1.1.0", "1.2.0"]);
    }

    #[test]
    fn prunes_images_without_a_kubernetes_section() {
        let mut profile = profile();
        prepare_for_update(&mut profile, NOW);
        assert_eq!(
            profile.spec.catalog.machine_images.unwrap()[0].versions.len(),
            2
        );
        assert!(profile.status.is_some());
    }

    #[test]
    fn create_resets_the_status() {
        let mut profile = profile();
        prepare_for_create(&mut profile, NOW);
        assert_eq!(profile.status, None);
    }
}
