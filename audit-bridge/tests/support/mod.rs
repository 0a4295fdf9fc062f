#![allow(dead_code)]

use async_trait::async_trait;
use audit_bridge::{Ack, DeliveryError, EventSink, QueueMessage, TargetAuditEvent};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub fn gke_event(insert_id: &str, resource_name: &str) -> Value {
    json!({
        "insertId": insert_id,
        "logName": "projects/demo/logs/cloudaudit.googleapis.com%2Factivity",
        "timestamp": "2019-03-01T10:15:30.123456Z",
        "receiveTimestamp": "2019-03-01T10:15:31.000Z",
        "labels": {
            "authorization.k8s.io/decision": "allow",
            "authorization.k8s.io/reason": ""
        },
        "operation": {
            "id": "0a1b2c",
            "producer": "k8s.io",
            "first": true,
            "last": true
        },
        "protoPayload": {
            "@type": "type.googleapis.com/google.cloud.audit.AuditLog",
            "authenticationInfo": { "principalEmail": "dev@example.com" },
            "authorizationInfo": [
                { "granted": true, "permission": "io.k8s.core.v1.pods.create", "resource": "core/v1/namespaces/default/pods" }
            ],
            "methodName": "io.k8s.core.v1.pods.create",
            "requestMetadata": {
                "callerIp": "203.0.113.7",
                "callerSuppliedUserAgent": "kubectl/v1.13.0"
            },
            "resourceName": resource_name,
            "serviceName": "k8s.io",
            "request": {
                "kind": "Pod",
                "apiVersion": "v1",
                "metadata": { "name": "nginx", "namespace": "default" }
            },
            "response": {
                "kind": "Pod",
                "apiVersion": "v1",
                "metadata": {
                    "name": "nginx",
                    "namespace": "default",
                    "uid": "6f0e9a52-3b1c-11e9-b8a5-42010a800002",
                    "resourceVersion": "1234"
                }
            }
        },
        "resource": {
            "type": "k8s_cluster",
            "labels": { "cluster_name": "prod", "location": "europe-west1", "project_id": "demo" }
        }
    })
}

pub fn payload(event: &Value) -> Vec<u8> {
    serde_json::to_vec(event).expect("serialize fixture")
}

/// Counts acknowledgments across every message built from it.
#[derive(Clone, Default)]
pub struct AckCounter {
    count: Arc<AtomicUsize>,
}

impl AckCounter {
    pub fn message(&self, id: &str, data: Vec<u8>) -> QueueMessage {
        QueueMessage::new(id, data, CountingAck { count: Arc::clone(&self.count) })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

struct CountingAck {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl Ack for CountingAck {
    async fn ack(self: Box<Self>) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink that answers from a script, then succeeds once the script runs out.
#[derive(Default)]
pub struct ScriptedSink {
    failures: Mutex<VecDeque<u16>>,
    delivered: Mutex<Vec<TargetAuditEvent>>,
    attempts: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

impl ScriptedSink {
    pub fn failing(statuses: &[u16]) -> Self {
        Self { failures: Mutex::new(statuses.iter().copied().collect()), ..Self::default() }
    }

    pub fn always_failing() -> Self {
        Self::failing(&[503; 64])
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<TargetAuditEvent> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn start_times(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for ScriptedSink {
    async fn deliver(&self, event: &TargetAuditEvent) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(Instant::now());
        if let Some(status) = self.failures.lock().unwrap().pop_front() {
            return Err(DeliveryError::Status {
                status: reqwest::StatusCode::from_u16(status).unwrap(),
                body: "scripted failure".into(),
            });
        }
        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Sink whose first `held` deliveries stay in flight until `release`, keeping
/// workers busy while later messages queue behind them.
pub struct HeldSink {
    held: usize,
    release: Instant,
    calls: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

impl HeldSink {
    pub fn new(held: usize, release: Instant) -> Self {
        Self { held, release, calls: AtomicUsize::new(0), started: Mutex::new(Vec::new()) }
    }

    pub fn start_times(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for HeldSink {
    async fn deliver(&self, _event: &TargetAuditEvent) -> Result<(), DeliveryError> {
        self.started.lock().unwrap().push(Instant::now());
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.held {
            tokio::time::sleep_until(self.release).await;
        }
        Ok(())
    }
}
