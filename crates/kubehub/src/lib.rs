//! KubeDev kubehub – lists the searchable workload kinds from the cluster

#![forbid(unsafe_code)]

use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams};
use kube::Client;
use kubedev_core::{RawResourceList, RawResourceSet, ResourceType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Source of the raw search payload.
#[async_trait::async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self) -> Result<RawResourceSet>;
}

/// Lists pods, services, deployments, jobs and cron jobs from the current
/// kube context, across all namespaces unless one is given.
pub struct KubeFetcher {
    client: Client,
    namespace: Option<String>,
}

impl KubeFetcher {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    pub async fn try_default(namespace: Option<String>) -> Result<Self> {
        let client = Client::try_default().await.context("building kube client")?;
        Ok(Self::new(client, namespace))
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match self.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

#[async_trait::async_trait]
impl ResourceFetcher for KubeFetcher {
    async fn fetch(&self) -> Result<RawResourceSet> {
        let started = Instant::now();
        let (pods, services, deployments, jobs, cron_jobs) = futures::join!(
            list_kind(self.api::<Pod>(), ResourceType::Pod),
            list_kind(self.api::<Service>(), ResourceType::Service),
            list_kind(self.api::<Deployment>(), ResourceType::Deployment),
            list_kind(self.api::<Job>(), ResourceType::Job),
            list_kind(self.api::<CronJob>(), ResourceType::CronJob),
        );
        let set = merge_lists([
            (ResourceType::Pod, pods),
            (ResourceType::Service, services),
            (ResourceType::Deployment, deployments),
            (ResourceType::Job, jobs),
            (ResourceType::CronJob, cron_jobs),
        ])?;
        metrics::histogram!("kubehub_fetch_ms", started.elapsed().as_secs_f64() * 1_000.0);
        info!(ns = ?self.namespace, items = set.total_items(), "fetched search payload");
        Ok(set)
    }
}

/// Keep the kinds that listed; a failing kind is logged and left absent.
/// Fails only when nothing listed at all.
fn merge_lists(results: [(ResourceType, Result<RawResourceList>); 5]) -> Result<RawResourceSet> {
    let mut set = RawResourceSet::default();
    let mut last_err = None;
    for (kind, res) in results {
        match res {
            Ok(list) => set.set(kind, list),
            Err(e) => {
                metrics::counter!("kubehub_list_errors_total", 1u64, "kind" => kind.tag());
                warn!(kind = %kind, error = ?e, "list failed; kind left out of search payload");
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) if set.lists().next().is_none() => Err(e.context("no resource kind could be listed")),
        _ => Ok(set),
    }
}

async fn list_kind<K>(api: Api<K>, kind: ResourceType) -> Result<RawResourceList>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let list = api
        .list(&ListParams::default())
        .await
        .with_context(|| format!("listing {}", kind.kind()))?;
    let items = list
        .items
        .iter()
        .map(|o| {
            let mut v = serde_json::to_value(o).context("serializing listed object")?;
            strip_managed_fields(&mut v);
            Ok(v)
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(kind = %kind, count = items.len(), "listed");
    Ok(RawResourceList::new(items))
}

fn strip_managed_fields(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

/// Reads a saved search payload (JSON) from disk; used for offline search.
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ResourceFetcher for FileFetcher {
    async fn fetch(&self) -> Result<RawResourceSet> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading payload {}", self.path.display()))?;
        let set: RawResourceSet = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing payload {}", self.path.display()))?;
        if set.lists().next().is_none() {
            return Err(anyhow!("payload {} has no resource lists", self.path.display()));
        }
        Ok(set)
    }
}
