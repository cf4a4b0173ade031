//! HTTP surface of the admission plugins. TLS is terminated in front of the pod.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use kube::core::{
    DynamicObject,
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use time::OffsetDateTime;

use super::CloudProfileValidator;
use crate::crds::{
    ChildProfile, namespaced_cloud_profile::NamespacedCloudProfile,
    private_cloud_profile::PrivateCloudProfile,
};

type Validator = Arc<CloudProfileValidator>;

pub fn router(validator: Validator) -> Router {
    Router::new()
        .route(
            "/validate/namespacedcloudprofiles",
            post(validate::<NamespacedCloudProfile>),
        )
        .route(
            "/validate/privatecloudprofiles",
            post(validate::<PrivateCloudProfile>),
        )
        .route(
            "/mutate/namespacedcloudprofiles",
            post(mutate::<NamespacedCloudProfile>),
        )
        .route(
            "/mutate/privatecloudprofiles",
            post(mutate::<PrivateCloudProfile>),
        )
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(validator)
}

fn into_request<K: ChildProfile>(
    review: AdmissionReview<K>,
) -> Result<AdmissionRequest<K>, Json<AdmissionReview<DynamicObject>>> {
    review.try_into().map_err(|err| {
        Json(AdmissionResponse::invalid(format!("failed to convert to request: {err}")).into_review())
    })
}

async fn validate<K: ChildProfile>(
    State(validator): State<Validator>,
    Json(review): Json<AdmissionReview<K>>,
) -> Json<AdmissionReview<DynamicObject>> {
    match into_request(review) {
        Ok(request) => Json(validator.admit(&request).await.into_review()),
        Err(rejected) => rejected,
    }
}

async fn mutate<K: ChildProfile>(
    State(validator): State<Validator>,
    Json(review): Json<AdmissionReview<K>>,
) -> Json<AdmissionReview<DynamicObject>> {
    match into_request(review) {
        Ok(request) => Json(
            validator
                .admit_mutation(&request, OffsetDateTime::now_utc())
                .into_review(),
        ),
        Err(rejected) => rejected,
    }
}

async fn readyz(State(validator): State<Validator>) -> (StatusCode, &'static str) {
    if validator.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "parent cache not synced")
    }
}
