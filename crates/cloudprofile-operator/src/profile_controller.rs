use std::sync::Arc;

use kube::{
    Api, Client, ResourceExt,
    runtime::{
        controller::{self, Action, Controller},
        reflector::ObjectRef,
        watcher,
    },
};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    config::OperatorConfig,
    crds::{ChildProfile, ProfileStatus, cloud_profile::CloudProfile, shoot::Shoot},
    error::ReconcileError,
    merge::merge_catalogs,
    store::ProfileStore,
};

pub const FINALIZER: &str = "gardener";

/// Event reason used when shoots still block the deletion of a profile.
pub const REASON_RESOURCE_REFERENCED: &str = "ResourceReferenced";

pub struct Ctx<S> {
    pub store: S,
    pub reconcile_timeout: Duration,
}

/// Controller for one child profile kind. Parent changes requeue every cached
/// child of that parent, shoot changes requeue the profile they reference.
pub fn controller<K: ChildProfile>(client: Client, config: &OperatorConfig) -> Controller<K> {
    let profiles: Api<K> = Api::all(client.clone());
    let controller = Controller::new(profiles, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(config.concurrent_syncs));
    let children = controller.store();

    controller
        .watches(
            Api::<CloudProfile>::all(client.clone()),
            watcher::Config::default(),
            move |parent| {
                let parent_name = parent.name_any();
                children
                    .state()
                    .into_iter()
                    .filter(|child| child.parent_name() == parent_name)
                    .map(|child| ObjectRef::from_obj(&*child))
                    .collect::<Vec<_>>()
            },
        )
        .watches(
            Api::<Shoot>::all(client),
            watcher::Config::default(),
            |shoot| {
                let namespace = shoot.namespace();
                shoot
                    .referenced_profiles(&K::kind(&()))
                    .into_iter()
                    .map(|name| {
                        let reference = ObjectRef::<K>::new(&name);
                        match &namespace {
                            Some(namespace) => reference.within(namespace),
                            None => reference,
                        }
                    })
                    .collect::<Vec<_>>()
            },
        )
        .shutdown_on_signal()
}

pub async fn reconcile<K, S>(profile: Arc<K>, ctx: Arc<Ctx<S>>) -> Result<Action, ReconcileError>
where
    K: ChildProfile,
    S: ProfileStore<K>,
{
    let timeout = ctx.reconcile_timeout;
    tokio::time::timeout(timeout, reconcile_profile(profile.as_ref(), &ctx.store))
        .await
        .map_err(|_| ReconcileError::Timeout(timeout))?
}

async fn reconcile_profile<K, S>(profile: &K, store: &S) -> Result<Action, ReconcileError>
where
    K: ChildProfile,
    S: ProfileStore<K>,
{
    let kind = K::kind(&());
    let name = profile.name_any();
    let namespace = profile.namespace().unwrap_or_default();
    let has_finalizer = profile.finalizers().iter().any(|f| f == FINALIZER);

    // Handle deletion via finalizer. Runs before the parent lookup so profiles of
    // deleted parents can still go away.
    if profile.meta().deletion_timestamp.is_some() {
        if !has_finalizer {
            return Ok(Action::await_change());
        }
        let shoots = store.referencing_shoots(profile).await?;
        if shoots.is_empty() {
            store.remove_finalizer(profile, FINALIZER).await?;
            info!(%kind, %name, %namespace, "removed finalizer");
        } else {
            let note = format!(
                "Cannot delete {kind}, because the following Shoots are still referencing it: {}",
                shoots.join(", ")
            );
            info!(%kind, %name, %namespace, shoots = ?shoots, "deletion blocked by shoots");
            if let Err(err) = store
                .publish_event(profile, REASON_RESOURCE_REFERENCED, note)
                .await
            {
                warn!(error = ?err, %kind, %name, %namespace, "failed to publish event");
            }
        }
        return Ok(Action::await_change());
    }

    let Some(parent) = store.get_parent(profile.parent_name()).await? else {
        debug!(%kind, %name, %namespace, parent = profile.parent_name(), "parent not found");
        return Ok(Action::await_change());
    };

    if !has_finalizer {
        store.add_finalizer(profile, FINALIZER).await?;
        info!(%kind, %name, %namespace, "added finalizer");
    }

    let merged = merge_catalogs(&parent.spec, profile.catalog());
    let current = profile
        .profile_status()
        .and_then(ProfileStatus::cloud_profile_spec);
    if current != Some(&merged) {
        store
            .patch_status(profile, ProfileStatus::materialized(merged))
            .await?;
        info!(%kind, %name, %namespace, parent = %parent.name_any(), "updated effective catalog");
    }

    Ok(Action::requeue(Duration::from_secs(600)))
}

pub fn error_policy<K, S>(profile: Arc<K>, err: &ReconcileError, _ctx: Arc<Ctx<S>>) -> Action
where
    K: ChildProfile,
{
    warn!(
        error = ?err,
        kind = %K::kind(&()),
        name = %profile.name_any(),
        namespace = ?profile.namespace(),
        "profile reconcile failed"
    );
    Action::requeue(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crds::{
            CloudProfileReference,
            catalog::{CatalogSpec, MachineType},
            cloud_profile::CloudProfileSpec,
            namespaced_cloud_profile::{NamespacedCloudProfile, NamespacedCloudProfileSpec},
            private_cloud_profile::{PrivateCloudProfile, PrivateCloudProfileSpec},
            shoot::ShootSpec,
        },
        store::MemoryStore,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    const NAMESPACE: &str = "garden-dev";

    fn deletion_time() -> Time {
        serde_json::from_value(serde_json::json!("2024-06-01T00:00:00Z")).unwrap()
    }

    fn parent() -> CloudProfile {
        CloudProfile::new(
            "aws",
            CloudProfileSpec {
                machine_types: vec![MachineType::new("m5.large", "2", "0", "8Gi")],
                provider_type: "aws".into(),
                ..Default::default()
            },
        )
    }

    fn child() -> NamespacedCloudProfile {
        let mut profile = NamespacedCloudProfile::new(
            "team",
            NamespacedCloudProfileSpec {
                parent: CloudProfileReference::cloud_profile("aws"),
                catalog: CatalogSpec {
                    machine_types: Some(vec![MachineType::new("team-xl", "8", "0", "32Gi")]),
                    ..Default::default()
                },
            },
        );
        profile.metadata.namespace = Some(NAMESPACE.into());
        profile
    }

    fn shoot(name: &str, profile: &str) -> Shoot {
        let mut shoot = Shoot::new(
            name,
            ShootSpec {
                cloud_profile_name: None,
                cloud_profile: Some(CloudProfileReference {
                    kind: "NamespacedCloudProfile".into(),
                    name: profile.into(),
                }),
            },
        );
        shoot.metadata.namespace = Some(NAMESPACE.into());
        shoot
    }

    fn ctx<K: ChildProfile>(store: MemoryStore<K>) -> Arc<Ctx<MemoryStore<K>>> {
        Arc::new(Ctx {
            store,
            reconcile_timeout: Duration::from_secs(5),
        })
    }

    async fn reconcile_stored(ctx: &Arc<Ctx<MemoryStore<NamespacedCloudProfile>>>) -> Action {
        let current = ctx.store.profile(NAMESPACE, "team").await.unwrap();
        reconcile(Arc::new(current), ctx.clone()).await.unwrap()
    }

    #[tokio::test]
    async fn materializes_the_effective_catalog_and_adds_the_finalizer() {
        let store = MemoryStore::new();
        store.put_parent(parent()).await;
        store.put_profile(child()).await;
        let ctx = ctx(store);

        reconcile_stored(&ctx).await;

        let stored = ctx.store.profile(NAMESPACE, "team").await.unwrap();
        assert_eq!(stored.finalizers(), &[FINALIZER.to_owned()]);
        let effective = stored.status.unwrap();
        let names: Vec<&str> = effective
            .cloud_profile_spec()
            .unwrap()
            .machine_types
            .iter()
            .map(|machine_type| machine_type.name.as_str())
            .collect();
        assert_eq!(names, vec!["m5.large", "team-xl"]);
    }

    #[tokio::test]
    async fn second_pass_without_changes_does_not_patch() {
        let store = MemoryStore::new();
        store.put_parent(parent()).await;
        store.put_profile(child()).await;
        let ctx = ctx(store);

        reconcile_stored(&ctx).await;
        reconcile_stored(&ctx).await;

        assert_eq!(ctx.store.status_patches().await, 1);
    }

    #[tokio::test]
    async fn missing_parent_is_not_an_error() {
        let store = MemoryStore::new();
        store.put_profile(child()).await;
        let ctx = ctx(store);

        assert_eq!(reconcile_stored(&ctx).await, Action::await_change());
        let stored = ctx.store.profile(NAMESPACE, "team").await.unwrap();
        assert!(stored.finalizers().is_empty());
        assert_eq!(stored.status, None);
    }

    #[tokio::test]
    async fn referenced_profile_survives_deletion_until_the_shoot_is_gone() {
        let store = MemoryStore::new();
        store.put_parent(parent()).await;
        store.put_profile(child()).await;
        let ctx = ctx(store);
        reconcile_stored(&ctx).await;

        ctx.store.put_shoot(shoot("shoot-a", "team")).await;
        ctx.store.delete_profile(NAMESPACE, "team", deletion_time()).await;
        reconcile_stored(&ctx).await;

        assert!(ctx.store.profile(NAMESPACE, "team").await.is_some());
        let events = ctx.store.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, REASON_RESOURCE_REFERENCED);
        assert_eq!(
            events[0].note,
            "Cannot delete NamespacedCloudProfile, because the following Shoots are still referencing it: shoot-a"
        );

        ctx.store.delete_shoot(NAMESPACE, "shoot-a").await;
        reconcile_stored(&ctx).await;
        assert!(ctx.store.profile(NAMESPACE, "team").await.is_none());
    }

    #[tokio::test]
    async fn deletion_does_not_need_the_parent() {
        let store = MemoryStore::new();
        let mut profile = child();
        profile.metadata.finalizers = Some(vec![FINALIZER.into()]);
        store.put_profile(profile).await;
        store.delete_profile(NAMESPACE, "team", deletion_time()).await;
        let ctx = ctx(store);

        reconcile_stored(&ctx).await;
        assert!(ctx.store.profile(NAMESPACE, "team").await.is_none());
    }

    #[tokio::test]
    async fn failing_shoot_query_keeps_the_finalizer() {
        let store = MemoryStore::new();
        let mut profile = child();
        profile.metadata.finalizers = Some(vec![FINALIZER.into()]);
        store.put_profile(profile).await;
        store.delete_profile(NAMESPACE, "team", deletion_time()).await;
        store.fail_shoot_queries(true).await;
        let ctx = ctx(store);

        let current = ctx.store.profile(NAMESPACE, "team").await.unwrap();
        assert!(reconcile(Arc::new(current), ctx.clone()).await.is_err());
        assert!(ctx.store.profile(NAMESPACE, "team").await.is_some());
    }

    /// Answers parent lookups only after `delay`.
    struct SlowParents {
        inner: MemoryStore<NamespacedCloudProfile>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ProfileStore<NamespacedCloudProfile> for SlowParents {
        async fn get_parent(&self, name: &str) -> Result<Option<CloudProfile>, ReconcileError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_parent(name).await
        }

        async fn patch_status(
            &self,
            profile: &NamespacedCloudProfile,
            status: ProfileStatus,
        ) -> Result<(), ReconcileError> {
            self.inner.patch_status(profile, status).await
        }

        async fn add_finalizer(
            &self,
            profile: &NamespacedCloudProfile,
            finalizer: &str,
        ) -> Result<(), ReconcileError> {
            self.inner.add_finalizer(profile, finalizer).await
        }

        async fn remove_finalizer(
            &self,
            profile: &NamespacedCloudProfile,
            finalizer: &str,
        ) -> Result<(), ReconcileError> {
            self.inner.remove_finalizer(profile, finalizer).await
        }

        async fn referencing_shoots(
            &self,
            profile: &NamespacedCloudProfile,
        ) -> Result<Vec<String>, ReconcileError> {
            self.inner.referencing_shoots(profile).await
        }

        async fn publish_event(
            &self,
            profile: &NamespacedCloudProfile,
            reason: &str,
            note: String,
        ) -> Result<(), ReconcileError> {
            self.inner.publish_event(profile, reason, note).await
        }
    }

    #[tokio::test]
    async fn attempt_past_the_deadline_times_out_without_writing() {
        let inner = MemoryStore::new();
        inner.put_parent(parent()).await;
        inner.put_profile(child()).await;
        let ctx = Arc::new(Ctx {
            store: SlowParents {
                inner: inner.clone(),
                delay: Duration::from_secs(30),
            },
            reconcile_timeout: Duration::from_millis(50),
        });

        let err = reconcile(Arc::new(child()), ctx).await.unwrap_err();

        assert!(matches!(err, ReconcileError::Timeout(timeout) if timeout == Duration::from_millis(50)));
        let stored = inner.profile(NAMESPACE, "team").await.unwrap();
        assert!(stored.finalizers().is_empty());
        assert_eq!(stored.status, None);
        assert_eq!(inner.status_patches().await, 0);
    }

    #[tokio::test]
    async fn private_profiles_resolve_the_parent_by_name() {
        let store = MemoryStore::new();
        store.put_parent(parent()).await;
        let mut profile = PrivateCloudProfile::new(
            "tenant",
            PrivateCloudProfileSpec {
                parent: "aws".into(),
                ..Default::default()
            },
        );
        profile.metadata.namespace = Some(NAMESPACE.into());
        store.put_profile(profile.clone()).await;
        let ctx = ctx(store);

        reconcile(Arc::new(profile), ctx.clone()).await.unwrap();
        let stored = ctx.store.profile(NAMESPACE, "tenant").await.unwrap();
        assert_eq!(
            stored.status.unwrap().cloud_profile_spec(),
            Some(&parent().spec)
        );
    }
}
