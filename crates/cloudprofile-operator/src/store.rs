//! Object store seam of the profile controller.

use async_trait::async_trait;
use kube::{
    Api, Client, ResourceExt,
    api::{ListParams, Patch, PatchParams},
    runtime::events::{Event, EventType, Recorder, Reporter},
};

use crate::{
    crds::{ChildProfile, ProfileStatus, cloud_profile::CloudProfile, shoot::Shoot},
    error::ReconcileError,
};

pub const FIELD_MANAGER: &str = "cloudprofile-operator";

/// Everything the reconciler reads from or writes to the cluster.
#[async_trait]
pub trait ProfileStore<K: ChildProfile>: Send + Sync {
    async fn get_parent(&self, name: &str) -> Result<Option<CloudProfile>, ReconcileError>;

    /// Replaces the status of `profile`. Only the reconciler calls this.
    async fn patch_status(&self, profile: &K, status: ProfileStatus) -> Result<(), ReconcileError>;

    async fn add_finalizer(&self, profile: &K, finalizer: &str) -> Result<(), ReconcileError>;

    async fn remove_finalizer(&self, profile: &K, finalizer: &str) -> Result<(), ReconcileError>;

    /// Names of the shoots in the profile's namespace that provision from it.
    async fn referencing_shoots(&self, profile: &K) -> Result<Vec<String>, ReconcileError>;

    async fn publish_event(&self, profile: &K, reason: &str, note: String) -> Result<(), ReconcileError>;
}

fn namespace_of<K: ChildProfile>(profile: &K) -> Result<String, ReconcileError> {
    profile.namespace().ok_or_else(|| {
        anyhow::anyhow!("{} {} has no namespace", K::kind(&()), profile.name_any()).into()
    })
}

pub struct KubeStore {
    client: Client,
    recorder: Recorder,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        let recorder = Recorder::new(
            client.clone(),
            Reporter {
                controller: FIELD_MANAGER.into(),
                instance: None,
            },
        );
        Self { client, recorder }
    }

    fn api<K: ChildProfile>(&self, profile: &K) -> Result<Api<K>, ReconcileError> {
        Ok(Api::namespaced(self.client.clone(), &namespace_of(profile)?))
    }

    async fn patch_finalizers<K: ChildProfile>(
        &self,
        profile: &K,
        finalizers: Vec<String>,
    ) -> Result<(), ReconcileError> {
        // resourceVersion makes the API server reject the patch on a stale read
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": profile.resource_version(),
            }
        });
        self.api(profile)?
            .patch(&profile.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<K: ChildProfile> ProfileStore<K> for KubeStore {
    async fn get_parent(&self, name: &str) -> Result<Option<CloudProfile>, ReconcileError> {
        let api: Api<CloudProfile> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn patch_status(&self, profile: &K, status: ProfileStatus) -> Result<(), ReconcileError> {
        let patch = serde_json::json!({
            "apiVersion": K::api_version(&()),
            "kind": K::kind(&()),
            "status": serde_json::to_value(&status)?,
        });
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.api(profile)?
            .patch_status(&profile.name_any(), &params, &Patch::Apply(&patch))
            .await?;
        Ok(())
    }

    async fn add_finalizer(&self, profile: &K, finalizer: &str) -> Result<(), ReconcileError> {
        let mut finalizers = profile.finalizers().to_vec();
        finalizers.push(finalizer.to_owned());
        self.patch_finalizers(profile, finalizers).await
    }

    async fn remove_finalizer(&self, profile: &K, finalizer: &str) -> Result<(), ReconcileError> {
        let finalizers = profile
            .finalizers()
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect();
        self.patch_finalizers(profile, finalizers).await
    }

    async fn referencing_shoots(&self, profile: &K) -> Result<Vec<String>, ReconcileError> {
        let shoots: Api<Shoot> = Api::namespaced(self.client.clone(), &namespace_of(profile)?);
        let kind = K::kind(&());
        let name = profile.name_any();
        let mut names: Vec<String> = shoots
            .list(&ListParams::default())
            .await?
            .into_iter()
            .filter(|shoot| shoot.references(&kind, &name))
            .map(|shoot| shoot.name_any())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn publish_event(&self, profile: &K, reason: &str, note: String) -> Result<(), ReconcileError> {
        self.recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: reason.into(),
                    note: Some(note),
                    action: "Delete".into(),
                    secondary: None,
                },
                &profile.object_ref(&()),
            )
            .await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use self::memory::{MemoryStore, RecordedEvent};

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::{collections::BTreeMap, sync::Arc};

    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::ResourceExt;
    use tokio::sync::RwLock;

    use super::{ProfileStore, namespace_of};
    use crate::{
        crds::{ChildProfile, ProfileStatus, cloud_profile::CloudProfile, shoot::Shoot},
        error::ReconcileError,
    };

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct RecordedEvent {
        pub object: String,
        pub reason: String,
        pub note: String,
    }

    struct State<K> {
        parents: BTreeMap<String, CloudProfile>,
        profiles: BTreeMap<(String, String), K>,
        shoots: Vec<Shoot>,
        events: Vec<RecordedEvent>,
        status_patches: usize,
        fail_shoot_queries: bool,
    }

    /// In-process stand-in for the API server. Objects whose deletion timestamp is
    /// set disappear once their last finalizer is removed.
    #[derive(Clone)]
    pub struct MemoryStore<K> {
        state: Arc<RwLock<State<K>>>,
    }

    impl<K: ChildProfile> Default for MemoryStore<K> {
        fn default() -> Self {
            Self::new()
        }
    }

    fn key<K: ChildProfile>(profile: &K) -> (String, String) {
        (profile.namespace().unwrap_or_default(), profile.name_any())
    }

    impl<K: ChildProfile> MemoryStore<K> {
        pub fn new() -> Self {
            Self {
                state: Arc::new(RwLock::new(State {
                    parents: BTreeMap::new(),
                    profiles: BTreeMap::new(),
                    shoots: Vec::new(),
                    events: Vec::new(),
                    status_patches: 0,
                    fail_shoot_queries: false,
                })),
            }
        }

        pub async fn put_parent(&self, parent: CloudProfile) {
            let mut state = self.state.write().await;
            state.parents.insert(parent.name_any(), parent);
        }

        pub async fn put_profile(&self, profile: K) {
            let mut state = self.state.write().await;
            state.profiles.insert(key(&profile), profile);
        }

        pub async fn put_shoot(&self, shoot: Shoot) {
            self.state.write().await.shoots.push(shoot);
        }

        pub async fn delete_shoot(&self, namespace: &str, name: &str) {
            self.state.write().await.shoots.retain(|shoot| {
                shoot.namespace().as_deref() != Some(namespace) || shoot.name_any() != name
            });
        }

        /// Marks the profile as deleted. It stays visible while finalizers remain.
        pub async fn delete_profile(&self, namespace: &str, name: &str, at: Time) {
            let mut state = self.state.write().await;
            let key = (namespace.to_owned(), name.to_owned());
            let Some(profile) = state.profiles.get_mut(&key) else {
                return;
            };
            if profile.finalizers().is_empty() {
                state.profiles.remove(&key);
            } else {
                profile.meta_mut().deletion_timestamp = Some(at);
            }
        }

        pub async fn profile(&self, namespace: &str, name: &str) -> Option<K> {
            let state = self.state.read().await;
            state
                .profiles
                .get(&(namespace.to_owned(), name.to_owned()))
                .cloned()
        }

        pub async fn events(&self) -> Vec<RecordedEvent> {
            self.state.read().await.events.clone()
        }

        pub async fn status_patches(&self) -> usize {
            self.state.read().await.status_patches
        }

        pub async fn fail_shoot_queries(&self, fail: bool) {
            self.state.write().await.fail_shoot_queries = fail;
        }

        async fn update<F>(&self, profile: &K, change: F) -> Result<(), ReconcileError>
        where
            F: FnOnce(&mut K) + Send,
        {
            let mut state = self.state.write().await;
            let key = key(profile);
            let stored = state.profiles.get_mut(&key).ok_or_else(|| {
                anyhow::anyhow!("{} {}/{} not found", K::kind(&()), key.0, key.1)
            })?;
            change(stored);
            if stored.meta().deletion_timestamp.is_some() && stored.finalizers().is_empty() {
                state.profiles.remove(&key);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<K: ChildProfile> ProfileStore<K> for MemoryStore<K> {
        async fn get_parent(&self, name: &str) -> Result<Option<CloudProfile>, ReconcileError> {
            Ok(self.state.read().await.parents.get(name).cloned())
        }

        async fn patch_status(&self, profile: &K, status: ProfileStatus) -> Result<(), ReconcileError> {
            self.update(profile, move |stored| stored.set_status(status))
                .await?;
            self.state.write().await.status_patches += 1;
            Ok(())
        }

        async fn add_finalizer(&self, profile: &K, finalizer: &str) -> Result<(), ReconcileError> {
            let finalizer = finalizer.to_owned();
            self.update(profile, move |stored| stored.finalizers_mut().push(finalizer))
                .await
        }

        async fn remove_finalizer(&self, profile: &K, finalizer: &str) -> Result<(), ReconcileError> {
            let finalizer = finalizer.to_owned();
            self.update(profile, move |stored| {
                stored.finalizers_mut().retain(|f| *f != finalizer)
            })
            .await
        }

        async fn referencing_shoots(&self, profile: &K) -> Result<Vec<String>, ReconcileError> {
            let state = self.state.read().await;
            if state.fail_shoot_queries {
                return Err(anyhow::anyhow!("listing shoots failed").into());
            }
            let namespace = namespace_of(profile)?;
            let kind = K::kind(&());
            let name = profile.name_any();
            let mut names: Vec<String> = state
                .shoots
                .iter()
                .filter(|shoot| shoot.namespace().as_deref() == Some(namespace.as_str()))
                .filter(|shoot| shoot.references(&kind, &name))
                .map(|shoot| shoot.name_any())
                .collect();
            names.sort();
            Ok(names)
        }

        async fn publish_event(&self, profile: &K, reason: &str, note: String) -> Result<(), ReconcileError> {
            self.state.write().await.events.push(RecordedEvent {
                object: profile.name_any(),
                reason: reason.to_owned(),
                note,
            });
            Ok(())
        }
    }
}
