//! Resolves the catalog a shoot provisions from, whether it names a root, a
//! namespaced or a private profile.

use async_trait::async_trait;
use kube::{Api, Client, ResourceExt};
use thiserror::Error;

use crate::{
    crds::{
        ChildProfile, cloud_profile::CloudProfile,
        namespaced_cloud_profile::NamespacedCloudProfile,
        private_cloud_profile::PrivateCloudProfile,
    },
    merge::present_as_child,
};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("cloud profile {name:?} not found in namespace {namespace:?} or cluster wide")]
    NotFound { name: String, namespace: String },
    #[error("{kind} {namespace}/{name} has no effective catalog yet")]
    NotMaterialized {
        kind: String,
        name: String,
        namespace: String,
    },
    #[error(transparent)]
    Kube(#[from] kube::Error),
}

/// Read access to the profiles a lookup may land on.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn cloud_profile(&self, name: &str) -> Result<Option<CloudProfile>, kube::Error>;

    async fn child_profile<K: ChildProfile>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, kube::Error>;
}

#[async_trait]
impl ProfileSource for Client {
    async fn cloud_profile(&self, name: &str) -> Result<Option<CloudProfile>, kube::Error> {
        Api::<CloudProfile>::all(self.clone()).get_opt(name).await
    }

    async fn child_profile<K: ChildProfile>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, kube::Error> {
        Api::<K>::namespaced(self.clone(), namespace)
            .get_opt(name)
            .await
    }
}

/// Presents the effective catalog of `profile` as a root profile.
pub fn effective_cloud_profile<K: ChildProfile>(profile: &K) -> Result<CloudProfile, LookupError> {
    let spec = profile
        .profile_status()
        .and_then(|status| status.cloud_profile_spec())
        .cloned()
        .ok_or_else(|| LookupError::NotMaterialized {
            kind: K::kind(&()).to_string(),
            name: profile.name_any(),
            namespace: profile.namespace().unwrap_or_default(),
        })?;
    Ok(present_as_child(profile, spec))
}

/// Looks `name` up as a root profile first, then as a namespaced and finally as a
/// private profile in `namespace`.
pub async fn get_cloud_profile<S: ProfileSource>(
    source: &S,
    name: &str,
    namespace: &str,
) -> Result<CloudProfile, LookupError> {
    if let Some(root) = source.cloud_profile(name).await? {
        return Ok(root);
    }
    if let Some(profile) = source
        .child_profile::<NamespacedCloudProfile>(namespace, name)
        .await?
    {
        return effective_cloud_profile(&profile);
    }
    if let Some(profile) = source
        .child_profile::<PrivateCloudProfile>(namespace, name)
        .await?
    {
        return effective_cloud_profile(&profile);
    }
    Err(LookupError::NotFound {
        name: name.to_owned(),
        namespace: namespace.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::crds::{
        CloudProfileReference, ProfileStatus,
        cloud_profile::CloudProfileSpec,
        namespaced_cloud_profile::NamespacedCloudProfileSpec,
        private_cloud_profile::PrivateCloudProfileSpec,
    };

    const NAMESPACE: &str = "garden-team";

    #[derive(Default)]
    struct Profiles {
        roots: BTreeMap<String, CloudProfile>,
        // (kind, namespace, name)
        children: BTreeMap<(String, String, String), serde_json::Value>,
        unavailable: bool,
    }

    impl Profiles {
        fn with_child<K: ChildProfile>(mut self, profile: K) -> Self {
            let key = (
                K::kind(&()).to_string(),
                profile.namespace().unwrap_or_default(),
                profile.name_any(),
            );
            self.children.insert(key, serde_json::to_value(&profile).unwrap());
            self
        }
    }

    #[async_trait]
    impl ProfileSource for Profiles {
        async fn cloud_profile(&self, name: &str) -> Result<Option<CloudProfile>, kube::Error> {
            if self.unavailable {
                return Err(kube::Error::Service("connection refused".into()));
            }
            Ok(self.roots.get(name).cloned())
        }

        async fn child_profile<K: ChildProfile>(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<K>, kube::Error> {
            let key = (K::kind(&()).to_string(), namespace.to_owned(), name.to_owned());
            Ok(self
                .children
                .get(&key)
                .map(|value| serde_json::from_value(value.clone()).unwrap()))
        }
    }

    fn spec() -> CloudProfileSpec {
        CloudProfileSpec {
            provider_type: "aws".into(),
            ..Default::default()
        }
    }

    fn namespaced(status: Option<CloudProfileSpec>) -> NamespacedCloudProfile {
        let mut profile = NamespacedCloudProfile::new(
            "team",
            NamespacedCloudProfileSpec {
                parent: CloudProfileReference::cloud_profile("aws"),
                ..Default::default()
            },
        );
        profile.metadata.namespace = Some(NAMESPACE.into());
        profile.status = status.map(ProfileStatus::materialized);
        profile
    }

    fn private(status: Option<CloudProfileSpec>) -> PrivateCloudProfile {
        let mut profile = PrivateCloudProfile::new(
            "tenant",
            PrivateCloudProfileSpec {
                parent: "aws".into(),
                ..Default::default()
            },
        );
        profile.metadata.namespace = Some(NAMESPACE.into());
        profile.status = status.map(ProfileStatus::materialized);
        profile
    }

    #[tokio::test]
    async fn prefers_the_root_profile() {
        let root = CloudProfile::new("team", CloudProfileSpec::default());
        let mut profiles = Profiles::default().with_child(namespaced(Some(spec())));
        profiles.roots.insert("team".into(), root.clone());

        let resolved = get_cloud_profile(&profiles, "team", NAMESPACE).await.unwrap();
        assert_eq!(resolved, root);
    }

    #[tokio::test]
    async fn presents_the_effective_catalog_of_a_namespaced_profile() {
        let profiles = Profiles::default().with_child(namespaced(Some(spec())));

        let resolved = get_cloud_profile(&profiles, "team", NAMESPACE).await.unwrap();
        assert_eq!(resolved.name_any(), "team");
        assert_eq!(resolved.spec, spec());
    }

    #[tokio::test]
    async fn falls_back_to_private_profiles() {
        let profiles = Profiles::default().with_child(private(Some(spec())));

        let resolved = get_cloud_profile(&profiles, "tenant", NAMESPACE).await.unwrap();
        assert_eq!(resolved.name_any(), "tenant");
        assert_eq!(resolved.spec, spec());
    }

    #[tokio::test]
    async fn distinguishes_missing_and_unmaterialized_profiles() {
        let profiles = Profiles::default().with_child(private(None));

        assert!(matches!(
            get_cloud_profile(&profiles, "tenant", NAMESPACE).await,
            Err(LookupError::NotMaterialized { kind, .. }) if kind == "PrivateCloudProfile"
        ));
        assert!(matches!(
            get_cloud_profile(&profiles, "tenant", "garden-other").await,
            Err(LookupError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn propagates_api_errors() {
        let profiles = Profiles {
            unavailable: true,
            ..Default::default()
        }
        .with_child(namespaced(Some(spec())));

        assert!(matches!(
            get_cloud_profile(&profiles, "team", NAMESPACE).await,
            Err(LookupError::Kube(_))
        ));
    }
}
