//! KubeDev core types: resource kinds, raw cluster listings, searchable records
//! and the navigation targets the dashboard router consumes.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

pub mod normalize;

pub use normalize::{normalize, NormalizeError};

/// Workload kinds the search box covers.
///
/// Declaration order is the order used when sorting records by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ResourceType {
    Pod,
    Service,
    Deployment,
    Job,
    CronJob,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Pod,
        ResourceType::Service,
        ResourceType::Deployment,
        ResourceType::Job,
        ResourceType::CronJob,
    ];

    /// Route segment used by the dashboard (`/{ns}/{tag}/{name}/info`).
    pub fn tag(self) -> &'static str {
        match self {
            ResourceType::Pod => "pods",
            ResourceType::Service => "services",
            ResourceType::Deployment => "deployments",
            ResourceType::Job => "jobs",
            ResourceType::CronJob => "cron-jobs",
        }
    }

    /// Kubernetes API kind name.
    pub fn kind(self) -> &'static str {
        match self {
            ResourceType::Pod => "Pod",
            ResourceType::Service => "Service",
            ResourceType::Deployment => "Deployment",
            ResourceType::Job => "Job",
            ResourceType::CronJob => "CronJob",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type: {0}")]
pub struct ParseResourceTypeError(pub String);

impl FromStr for ResourceType {
    type Err = ParseResourceTypeError;

    /// Accepts route tags (`cron-jobs`), singular forms, API kinds (`CronJob`)
    /// and kubectl short names (`po`, `svc`, `deploy`, `cj`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let singular = folded.strip_suffix('s').unwrap_or(&folded);
        match singular {
            "pod" | "po" => Ok(ResourceType::Pod),
            "service" | "svc" => Ok(ResourceType::Service),
            "deployment" | "deploy" => Ok(ResourceType::Deployment),
            "job" => Ok(ResourceType::Job),
            "cronjob" | "cj" => Ok(ResourceType::CronJob),
            _ => Err(ParseResourceTypeError(s.to_string())),
        }
    }
}

impl TryFrom<String> for ResourceType {
    type Error = ParseResourceTypeError;
    fn try_from(v: String) -> Result<Self, Self::Error> {
        v.parse()
    }
}

impl From<ResourceType> for &'static str {
    fn from(v: ResourceType) -> Self {
        v.tag()
    }
}

/// List-style payload for one kind, as returned by the cluster API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResourceList {
    /// Opaque items; only `metadata.namespace` / `metadata.name` are read.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<serde_json::Value>,
}

impl RawResourceList {
    pub fn new(items: Vec<serde_json::Value>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn null_as_empty<'de, D>(de: D) -> Result<Vec<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<serde_json::Value>>::deserialize(de)?.unwrap_or_default())
}

/// Search payload: one optional listing per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResourceSet {
    #[serde(default, alias = "Pods", skip_serializing_if = "Option::is_none")]
    pub pods: Option<RawResourceList>,
    #[serde(default, alias = "Services", skip_serializing_if = "Option::is_none")]
    pub services: Option<RawResourceList>,
    #[serde(default, alias = "Deployments", skip_serializing_if = "Option::is_none")]
    pub deployments: Option<RawResourceList>,
    #[serde(default, alias = "Jobs", skip_serializing_if = "Option::is_none")]
    pub jobs: Option<RawResourceList>,
    #[serde(default, alias = "CronJobs", skip_serializing_if = "Option::is_none")]
    pub cron_jobs: Option<RawResourceList>,
}

impl RawResourceSet {
    pub fn get(&self, kind: ResourceType) -> Option<&RawResourceList> {
        match kind {
            ResourceType::Pod => self.pods.as_ref(),
            ResourceType::Service => self.services.as_ref(),
            ResourceType::Deployment => self.deployments.as_ref(),
            ResourceType::Job => self.jobs.as_ref(),
            ResourceType::CronJob => self.cron_jobs.as_ref(),
        }
    }

    pub fn set(&mut self, kind: ResourceType, list: RawResourceList) {
        let slot = match kind {
            ResourceType::Pod => &mut self.pods,
            ResourceType::Service => &mut self.services,
            ResourceType::Deployment => &mut self.deployments,
            ResourceType::Job => &mut self.jobs,
            ResourceType::CronJob => &mut self.cron_jobs,
        };
        *slot = Some(list);
    }

    /// Builder form of [`RawResourceSet::set`].
    pub fn with(mut self, kind: ResourceType, list: RawResourceList) -> Self {
        self.set(kind, list);
        self
    }

    /// Present listings in [`ResourceType::ALL`] order.
    pub fn lists(&self) -> impl Iterator<Item = (ResourceType, &RawResourceList)> + '_ {
        ResourceType::ALL
            .into_iter()
            .filter_map(move |k| self.get(k).map(|l| (k, l)))
    }

    pub fn total_items(&self) -> usize {
        self.lists().map(|(_, l)| l.len()).sum()
    }
}

/// Normalized, kind-independent view of one cluster resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchableRecord {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub namespace: String,
    pub name: String,
}

impl SearchableRecord {
    pub fn new(kind: ResourceType, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind, namespace: namespace.into(), name: name.into() }
    }

    pub fn nav_target(&self) -> NavTarget {
        NavTarget {
            namespace: self.namespace.clone(),
            kind: self.kind,
            name: self.name.clone(),
        }
    }
}

/// Detail view a selection routes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavTarget {
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("expected /<namespace>/<type>/<name>/info, got {0:?}")]
    Shape(String),
    #[error(transparent)]
    Type(#[from] ParseResourceTypeError),
}

impl NavTarget {
    pub fn path(&self) -> String {
        format!("/{}/{}/{}/info", self.namespace, self.kind.tag(), self.name)
    }

    pub fn parse_path(path: &str) -> Result<Self, RouteError> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [ns, kind, name, "info"] if !ns.is_empty() && !name.is_empty() => Ok(Self {
                namespace: (*ns).to_string(),
                kind: kind.parse()?,
                name: (*name).to_string(),
            }),
            _ => Err(RouteError::Shape(path.to_string())),
        }
    }
}

impl fmt::Display for NavTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_accepts_common_spellings() {
        for s in ["pods", "Pod", "po", "POD"] {
            assert_eq!(s.parse::<ResourceType>().unwrap(), ResourceType::Pod);
        }
        for s in ["cron-jobs", "CronJob", "cronjob", "cj"] {
            assert_eq!(s.parse::<ResourceType>().unwrap(), ResourceType::CronJob);
        }
        assert_eq!("svc".parse::<ResourceType>().unwrap(), ResourceType::Service);
        assert_eq!("deploy".parse::<ResourceType>().unwrap(), ResourceType::Deployment);
        assert!("configmap".parse::<ResourceType>().is_err());
    }

    #[test]
    fn resource_type_serializes_as_route_tag() {
        let v = serde_json::to_value(ResourceType::CronJob).unwrap();
        assert_eq!(v, serde_json::json!("cron-jobs"));
        let back: ResourceType = serde_json::from_value(serde_json::json!("Deployment")).unwrap();
        assert_eq!(back, ResourceType::Deployment);
    }

    #[test]
    fn nav_path_for_selected_pod() {
        let rec = SearchableRecord::new(ResourceType::Pod, "kube-system", "coredns-1");
        assert_eq!(rec.nav_target().path(), "/kube-system/pods/coredns-1/info");
    }

    #[test]
    fn parse_path_round_trips_and_rejects_other_shapes() {
        let t = NavTarget::parse_path("/default/cron-jobs/backup/info").unwrap();
        assert_eq!(t.kind, ResourceType::CronJob);
        assert_eq!(t.path(), "/default/cron-jobs/backup/info");
        assert!(matches!(NavTarget::parse_path("/default/pods/x/logs"), Err(RouteError::Shape(_))));
        assert!(matches!(NavTarget::parse_path("/default/widgets/x/info"), Err(RouteError::Type(_))));
    }

    #[test]
    fn payload_accepts_go_field_names_and_null_items() {
        let set: RawResourceSet = serde_json::from_value(serde_json::json!({
            "Pods": { "items": [ { "metadata": { "name": "a", "namespace": "default" } } ] },
            "CronJobs": { "items": null },
            "services": {}
        }))
        .unwrap();
        assert_eq!(set.get(ResourceType::Pod).map(|l| l.len()), Some(1));
        assert_eq!(set.get(ResourceType::CronJob).map(|l| l.len()), Some(0));
        assert_eq!(set.get(ResourceType::Service).map(|l| l.len()), Some(0));
        assert!(set.get(ResourceType::Job).is_none());
        assert_eq!(set.total_items(), 1);
    }
}
