//! Conversion of GKE audit log entries into Kubernetes audit events.
//!
//! The GKE `resourceName` packs group, version, namespace, kind, name and
//! subresource into one slash-delimited string. It is decomposed with a single
//! anchored grammar:
//!
//! ```text
//! {apiGroup}/{apiVersion}[/namespaces/{namespace}]/{resource}/{name}[/{subresource}]
//! ```
//!
//! Anything that does not match the whole grammar yields an event without an
//! `objectRef`; that is not a conversion failure.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::model::{
    EventMetadata, ObjectReference, RawAuditEvent, ResponseStatus, TargetAuditEvent, UserInfo,
    TARGET_API_VERSION, TARGET_KIND, TARGET_LEVEL, TARGET_STAGE,
};

const DEFAULT_RESPONSE_CODE: i64 = 200;
const CORE_API_VERSION: &str = "v1";

static RESOURCE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z0-9-]+)/([A-Za-z0-9-]+)(?:/namespaces/([A-Za-z0-9-]+))?/([A-Za-z0-9-]+)/([A-Za-z0-9-]+)(?:/([A-Za-z0-9-]+))?$",
    )
    .expect("resource name pattern compiles")
});

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("payload is not a valid audit log entry: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid event timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[error("method name {0:?} has no dot-delimited verb")]
    MissingVerb(String),
}

/// Decode a queue payload into a raw audit entry.
pub fn decode(payload: &[u8]) -> Result<RawAuditEvent, TransformError> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn transform(raw: &RawAuditEvent) -> Result<TargetAuditEvent, TransformError> {
    let timestamp = canonical_timestamp(&raw.timestamp)?;
    let payload = &raw.proto_payload;
    let verb = verb_from_method(&payload.method_name)?;

    let uid = payload
        .response
        .as_ref()
        .and_then(|response| response.pointer("/metadata/uid"))
        .and_then(|uid| uid.as_str())
        .map(str::to_owned);
    let object_ref = parse_resource_name(&payload.resource_name).map(|mut object_ref| {
        object_ref.uid = uid;
        object_ref
    });

    let code = payload
        .response
        .as_ref()
        .and_then(|response| response.get("code"))
        .and_then(|code| code.as_i64())
        .filter(|code| *code != 0)
        .unwrap_or(DEFAULT_RESPONSE_CODE);

    Ok(TargetAuditEvent {
        kind: TARGET_KIND.to_string(),
        api_version: TARGET_API_VERSION.to_string(),
        metadata: EventMetadata { creation_timestamp: timestamp.clone() },
        level: TARGET_LEVEL.to_string(),
        timestamp: timestamp.clone(),
        audit_id: raw.insert_id.clone(),
        stage: TARGET_STAGE.to_string(),
        request_uri: payload.resource_name.clone(),
        verb,
        user: UserInfo {
            username: payload.authentication_info.principal_email.clone(),
            groups: Vec::new(),
        },
        source_ips: payload.request_metadata.caller_ip.iter().cloned().collect(),
        object_ref,
        response_status: ResponseStatus { metadata: serde_json::Map::new(), code },
        request_object: payload.request.clone(),
        response_object: payload.response.clone(),
        request_received_timestamp: timestamp.clone(),
        stage_timestamp: timestamp,
        annotations: raw.labels.clone(),
    })
}

/// RFC 3339 input, rendered back in UTC with millisecond precision.
fn canonical_timestamp(value: &str) -> Result<String, TransformError> {
    let parsed = DateTime::parse_from_rfc3339(value).map_err(|source| {
        TransformError::InvalidTimestamp { value: value.to_string(), source }
    })?;
    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn verb_from_method(method_name: &str) -> Result<String, TransformError> {
    match method_name.rsplit_once('.') {
        Some((_, verb)) if !verb.is_empty() => Ok(verb.to_string()),
        _ => Err(TransformError::MissingVerb(method_name.to_string())),
    }
}

/// Decompose a GKE resource name. `uid` is left for the caller to fill.
pub fn parse_resource_name(resource_name: &str) -> Option<ObjectReference> {
    let captures = RESOURCE_NAME.captures(resource_name)?;
    let group = captures.get(1)?.as_str();
    let version = captures.get(2)?.as_str();
    // Core group resources carry a bare version; everything else is group/version.
    let api_version = if version == CORE_API_VERSION {
        version.to_string()
    } else {
        format!("{group}/{version}")
    };
    Some(ObjectReference {
        resource: captures.get(4)?.as_str().to_string(),
        namespace: captures.get(3).map(|m| m.as_str().to_string()),
        name: captures.get(5)?.as_str().to_string(),
        uid: None,
        api_version,
        subresource: captures.get(6).map(|m| m.as_str().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_resource_with_subresource() {
        let object_ref = parse_resource_name("core/v1/namespaces/default/pods/nginx-7d8f/exec")
            .expect("matches");
        assert_eq!(object_ref.resource, "pods");
        assert_eq!(object_ref.namespace.as_deref(), Some("default"));
        assert_eq!(object_ref.name, "nginx-7d8f");
        assert_eq!(object_ref.subresource.as_deref(), Some("exec"));
        assert_eq!(object_ref.api_version, "v1");
    }

    #[test]
    fn cluster_scoped_resource() {
        let object_ref = parse_resource_name("rbac.authorization.k8s.io/v1/clusterroles/admin");
        // dots are outside the segment alphabet
        assert!(object_ref.is_none());

        let object_ref = parse_resource_name("core/v1/nodes/node-1").expect("matches");
        assert_eq!(object_ref.resource, "nodes");
        assert_eq!(object_ref.name, "node-1");
        assert!(object_ref.namespace.is_none());
        assert!(object_ref.subresource.is_none());
    }

    #[test]
    fn non_core_versions_are_group_qualified() {
        let object_ref = parse_resource_name("batch/v1beta1/namespaces/jobs/cronjobs/nightly")
            .expect("matches");
        assert_eq!(object_ref.api_version, "batch/v1beta1");
        assert_eq!(object_ref.namespace.as_deref(), Some("jobs"));

        // only the version is compared, so apps/v1 is emitted bare
        let object_ref = parse_resource_name("apps/v1/namespaces/web/deployments/frontend")
            .expect("matches");
        assert_eq!(object_ref.api_version, "v1");
    }

    #[test]
    fn partial_matches_are_rejected() {
        assert!(parse_resource_name("core/v1").is_none());
        assert!(parse_resource_name("core/v1/pods").is_none());
        assert!(parse_resource_name("core/v1/namespaces/default/pods/nginx/log/extra").is_none());
        assert!(parse_resource_name("/core/v1/namespaces/default/pods/nginx").is_none());
        assert!(parse_resource_name("projects/p/zones/z/clusters/c/k8s/pods").is_none());
    }

    #[test]
    fn verb_is_last_method_segment() {
        assert_eq!(verb_from_method("io.k8s.core.v1.pods.create").unwrap(), "create");
        assert!(matches!(verb_from_method("create"), Err(TransformError::MissingVerb(_))));
        assert!(matches!(verb_from_method(""), Err(TransformError::MissingVerb(_))));
        assert!(matches!(verb_from_method("io.k8s."), Err(TransformError::MissingVerb(_))));
    }

    #[test]
    fn timestamps_are_normalised_to_utc_millis() {
        assert_eq!(
            canonical_timestamp("2019-03-01T10:15:30.123456Z").unwrap(),
            "2019-03-01T10:15:30.123Z"
        );
        assert_eq!(
            canonical_timestamp("2019-03-01T12:15:30+02:00").unwrap(),
            "2019-03-01T10:15:30.000Z"
        );
        assert!(canonical_timestamp("yesterday").is_err());
    }
}
