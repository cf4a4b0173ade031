use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub mod catalog;
pub mod cloud_profile;
pub mod namespaced_cloud_profile;
pub mod private_cloud_profile;
pub mod shoot;

use self::{catalog::CatalogSpec, cloud_profile::CloudProfileSpec};

/// Kind every child profile must extend.
pub const PARENT_KIND: &str = "CloudProfile";

/// Reference from a namespaced child profile to its parent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudProfileReference {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

impl CloudProfileReference {
    pub fn cloud_profile(name: impl Into<String>) -> Self {
        Self {
            kind: PARENT_KIND.into(),
            name: name.into(),
        }
    }
}

/// How a child profile points at its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParentRef<'a> {
    /// `spec.parent: {kind, name}`
    Structured(&'a CloudProfileReference),
    /// `spec.parent: name`
    Named(&'a str),
}

impl<'a> ParentRef<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            ParentRef::Structured(reference) => &reference.name,
            ParentRef::Named(name) => name,
        }
    }
}

/// Status shared by all child profiles.
///
/// Only the reconciler materializes the effective catalog. Everything else can
/// observe it or reset it to the empty status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cloud_profile_spec: Option<CloudProfileSpec>,
}

impl ProfileStatus {
    pub(crate) fn materialized(spec: CloudProfileSpec) -> Self {
        Self {
            cloud_profile_spec: Some(spec),
        }
    }

    /// The effective catalog, parent merged with the child.
    pub fn cloud_profile_spec(&self) -> Option<&CloudProfileSpec> {
        self.cloud_profile_spec.as_ref()
    }
}

/// A namespaced profile that extends a [`cloud_profile::CloudProfile`].
pub trait ChildProfile:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn catalog(&self) -> &CatalogSpec;

    fn catalog_mut(&mut self) -> &mut CatalogSpec;

    fn parent_ref(&self) -> ParentRef<'_>;

    fn profile_status(&self) -> Option<&ProfileStatus>;

    fn set_status(&mut self, status: ProfileStatus);

    fn clear_status(&mut self);

    fn same_spec(&self, other: &Self) -> bool;

    fn parent_name(&self) -> &str {
        self.parent_ref().name()
    }
}
