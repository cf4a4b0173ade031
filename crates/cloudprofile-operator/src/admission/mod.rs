//! Admission of child profiles: schema validation, parent lookup and the
//! no-shadowing rule, plus the expired-version pruning applied on write.

use std::time::Duration;

use futures::FutureExt;
use kube::{
    Resource, ResourceExt,
    core::admission::{AdmissionRequest, AdmissionResponse, Operation},
    runtime::reflector::{ObjectRef, Store},
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub mod shadowing;
pub mod webhook;

pub use self::shadowing::{ShadowingError, ShadowingScope, check_no_shadowing};

use crate::{
    crds::{ChildProfile, cloud_profile::CloudProfile},
    strategy,
    validation::{self, ErrorList, aggregate},
};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("not yet ready to handle request")]
    NotReady,
    #[error("{0}")]
    Internal(String),
    #[error("{kind} {name:?} is invalid: {}", aggregate(.errors))]
    Invalid {
        kind: String,
        name: String,
        errors: ErrorList,
    },
    #[error("parent CloudProfile could not be found")]
    ParentNotFound,
    #[error(transparent)]
    Shadowing(#[from] ShadowingError),
}

impl AdmissionError {
    /// HTTP status code reported in the admission response.
    pub fn code(&self) -> u16 {
        match self {
            AdmissionError::NotReady => 403,
            AdmissionError::Internal(_) => 500,
            AdmissionError::Invalid { .. } => 422,
            AdmissionError::ParentNotFound | AdmissionError::Shadowing(_) => 400,
        }
    }

    /// Machine readable reason, as in a Kubernetes `Status`.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::NotReady => "Forbidden",
            AdmissionError::Internal(_) => "InternalError",
            AdmissionError::Invalid { .. } => "Invalid",
            AdmissionError::ParentNotFound | AdmissionError::Shadowing(_) => "BadRequest",
        }
    }

    /// Turns `response` into a denial carrying this error.
    pub fn deny(&self, response: AdmissionResponse) -> AdmissionResponse {
        let mut response = response.deny(self.to_string());
        response.result.code = self.code();
        response.result.reason = self.reason().to_owned();
        response
    }
}

/// Admits NamespacedCloudProfiles and PrivateCloudProfiles against the cached parents.
#[derive(Clone)]
pub struct CloudProfileValidator {
    parents: Store<CloudProfile>,
    scope: ShadowingScope,
    ready_timeout: Duration,
}

impl CloudProfileValidator {
    pub fn new(parents: Store<CloudProfile>, scope: ShadowingScope, ready_timeout: Duration) -> Self {
        Self {
            parents,
            scope,
            ready_timeout,
        }
    }

    /// Whether the parent cache has completed its initial sync.
    pub fn is_ready(&self) -> bool {
        self.parents
            .wait_until_ready()
            .now_or_never()
            .is_some_and(|ready| ready.is_ok())
    }

    async fn wait_for_ready(&self) -> Result<(), AdmissionError> {
        match tokio::time::timeout(self.ready_timeout, self.parents.wait_until_ready()).await {
            Ok(Ok(())) => Ok(()),
            _ => Err(AdmissionError::NotReady),
        }
    }

    /// Runs the validating admission for `request` and builds the response.
    pub async fn admit<K: ChildProfile>(&self, request: &AdmissionRequest<K>) -> AdmissionResponse {
        let response = AdmissionResponse::from(request);
        match self.validate(request).await {
            Ok(()) => response,
            Err(err) => {
                warn!(
                    kind = %request.kind.kind,
                    name = %request.name,
                    namespace = ?request.namespace,
                    error = %err,
                    "admission denied"
                );
                err.deny(response)
            }
        }
    }

    pub async fn validate<K: ChildProfile>(
        &self,
        request: &AdmissionRequest<K>,
    ) -> Result<(), AdmissionError> {
        let kind = K::kind(&());
        if !handles(request) {
            return Ok(());
        }

        self.wait_for_ready().await?;

        let profile = request
            .object
            .as_ref()
            .ok_or_else(|| AdmissionError::Internal(format!("could not convert object to {kind}")))?;

        let old = match request.operation {
            Operation::Update => Some(request.old_object.as_ref().ok_or_else(|| {
                AdmissionError::Internal(format!(
                    "could not convert old resource into {kind} object"
                ))
            })?),
            _ => None,
        };

        let errors = match old {
            Some(old) => validation::validate_child_profile_update(profile, old),
            None => validation::validate_child_profile(profile),
        };
        if !errors.is_empty() {
            return Err(AdmissionError::Invalid {
                kind: kind.to_string(),
                name: profile.name_any(),
                errors,
            });
        }

        if let Some(old) = old
            && profile.same_spec(old)
        {
            if profile.meta() == old.meta() {
                debug!(name = %profile.name_any(), %kind, "spec and metadata unchanged");
                return Ok(());
            }
            // finalizer release of a terminating profile must not depend on its parent
            if profile.meta().deletion_timestamp.is_some() {
                debug!(name = %profile.name_any(), %kind, "terminating profile, spec unchanged");
                return Ok(());
            }
        }

        let parent = self
            .parents
            .get(&ObjectRef::new(profile.parent_name()))
            .ok_or(AdmissionError::ParentNotFound)?;

        check_no_shadowing(
            &kind,
            &parent.spec,
            profile.catalog(),
            old.map(|old| old.catalog()),
            self.scope,
        )?;

        info!(
            name = %profile.name_any(),
            namespace = ?profile.namespace(),
            %kind,
            parent = %parent.name_any(),
            "admitted"
        );
        Ok(())
    }

    /// Computes the JSON patch that prunes expired versions (and resets the status on create).
    ///
    /// Returns `None` when the object is already normalized.
    pub fn mutate<K: ChildProfile>(
        &self,
        request: &AdmissionRequest<K>,
        now: OffsetDateTime,
    ) -> Result<Option<json_patch::Patch>, AdmissionError> {
        if !handles(request) {
            return Ok(None);
        }
        let Some(original) = request.object.as_ref() else {
            return Err(AdmissionError::Internal(format!(
                "could not convert object to {}",
                K::kind(&())
            )));
        };

        let mut mutated = original.clone();
        match request.operation {
            Operation::Create => strategy::prepare_for_create(&mut mutated, now),
            _ => strategy::prepare_for_update(&mut mutated, now),
        }
        if &mutated == original {
            return Ok(None);
        }

        let to_value = |profile: &K| {
            serde_json::to_value(profile).map_err(|err| AdmissionError::Internal(err.to_string()))
        };
        Ok(Some(json_patch::diff(&to_value(original)?, &to_value(&mutated)?)))
    }

    /// Runs the mutating admission for `request` and builds the response.
    pub fn admit_mutation<K: ChildProfile>(
        &self,
        request: &AdmissionRequest<K>,
        now: OffsetDateTime,
    ) -> AdmissionResponse {
        let response = AdmissionResponse::from(request);
        match self.mutate(request, now) {
            Ok(None) => response,
            Ok(Some(patch)) => match response.with_patch(patch) {
                Ok(response) => response,
                Err(err) => AdmissionError::Internal(err.to_string()).deny(AdmissionResponse::from(request)),
            },
            Err(err) => err.deny(response),
        }
    }
}

/// Only creates and updates of the profile itself are admitted here; everything
/// else passes through.
fn handles<K: Resource<DynamicType = ()>>(request: &AdmissionRequest<K>) -> bool {
    let subresource = request.sub_resource.as_deref().is_some_and(|s| !s.is_empty());
    matches!(request.operation, Operation::Create | Operation::Update)
        && !subresource
        && request.kind.kind == K::kind(&())
}
