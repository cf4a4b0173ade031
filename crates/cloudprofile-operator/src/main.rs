use cloudprofile_operator::{
    admission::{CloudProfileValidator, webhook},
    config::OperatorConfig,
    crds::{
        ChildProfile, cloud_profile::CloudProfile,
        namespaced_cloud_profile::NamespacedCloudProfile,
        private_cloud_profile::PrivateCloudProfile,
    },
    profile_controller as profiles,
    store::KubeStore,
};
use futures::{StreamExt, future};
use kube::{
    Api, Client,
    runtime::{WatchStreamExt, reflector, watcher},
};
use std::{future::IntoFuture, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("cloudprofile-operator starting up");

    let config = OperatorConfig::from_env()?;
    let client = Client::try_default().await?;

    // Parent cache for admission
    let (parents, writer) = reflector::store::<CloudProfile>();
    let parent_reflector = watcher(Api::<CloudProfile>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .touched_objects()
        .for_each(|res| {
            if let Err(e) = res {
                tracing::warn!(error = ?e, "cloud profile watch error");
            }
            future::ready(())
        });

    // Admission webhook
    let validator = Arc::new(CloudProfileValidator::new(
        parents,
        config.shadowing_scope,
        config.cache_sync_timeout,
    ));
    let listener = tokio::net::TcpListener::bind(config.webhook_bind_address).await?;
    info!(address = %config.webhook_bind_address, "serving admission webhook");
    let webhook_server = axum::serve(listener, webhook::router(validator)).into_future();

    // Profile controllers
    let namespaced_controller = run_controller::<NamespacedCloudProfile>(&client, &config);
    let private_controller = run_controller::<PrivateCloudProfile>(&client, &config);

    tokio::select! {
        _ = parent_reflector => {},
        res = webhook_server => { res?; },
        _ = namespaced_controller => {},
        _ = private_controller => {},
        _ = tokio::signal::ctrl_c() => { info!("shutdown signal received"); }
    }
    Ok(())
}

async fn run_controller<K: ChildProfile>(client: &Client, config: &OperatorConfig) {
    let ctx = Arc::new(profiles::Ctx {
        store: KubeStore::new(client.clone()),
        reconcile_timeout: config.reconcile_timeout,
    });
    profiles::controller::<K>(client.clone(), config)
        .run(
            profiles::reconcile::<K, KubeStore>,
            profiles::error_policy::<K, KubeStore>,
            ctx,
        )
        .for_each(|res| async move {
            if let Err(e) = res {
                tracing::warn!(error = ?e, "profile reconcile error");
            }
        })
        .await
}
