//! The fixed set of named caches backing the status store.
//!
//! Each entry binds a cache name to its value type and key shape. The typed
//! binding itself lives in [`crate::cache::Caches`]; this table carries the
//! per-cache metadata used during provisioning and bulk maintenance.

/// Name under which [`PROTO_SCHEMA`] is registered on the remote server.
pub const PROTO_SCHEMA_NAME: &str = "karavan.proto";

/// Protobuf messages for every remote key and value type. Field names match
/// the JSON documents the remote handles send, so the server can transcode
/// them to its protostream storage format.
pub const PROTO_SCHEMA: &str = r#"syntax = "proto2";
package karavan;

message GroupedKey {
    optional string groupId = 1;
    optional string itemId = 2;
}

message Project {
    optional string projectId = 1;
    optional string name = 2;
    optional string description = 3;
    optional string runtime = 4;
    optional string lastCommit = 5;
    optional int64 lastCommitTimestamp = 6;
}

message ProjectFile {
    optional string name = 1;
    optional string code = 2;
    optional string projectId = 3;
    optional int64 lastUpdate = 4;
}

message PipelineStatus {
    optional string projectId = 1;
    optional string pipelineName = 2;
    optional string result = 3;
    optional string startTime = 4;
    optional string completionTime = 5;
    optional string env = 6;
}

message DeploymentStatus {
    optional string id = 1;
    optional string name = 2;
    optional string namespace = 3;
    optional string env = 4;
    optional string cluster = 5;
    optional string image = 6;
    optional int32 replicas = 7;
    optional int32 readyReplicas = 8;
    optional int32 unavailableReplicas = 9;
}

message ServiceStatus {
    optional string id = 1;
    optional string name = 2;
    optional string namespace = 3;
    optional string env = 4;
    optional string cluster = 5;
    optional int32 port = 6;
    optional int32 targetPort = 7;
    optional string clusterIp = 8;
    optional string type = 9;
}

message PodStatus {
    optional string name = 1;
    optional string phase = 2;
    optional bool initialized = 3;
    optional bool ready = 4;
    optional bool terminating = 5;
    optional string reason = 6;
    optional string deployment = 7;
    optional string project = 8;
    optional string env = 9;
    optional string requestMemory = 10;
    optional string requestCpu = 11;
    optional string limitMemory = 12;
    optional string limitCpu = 13;
    optional string creationTimestamp = 14;
}

message CamelStatusValue {
    optional string name = 1;
    optional string status = 2;
}

message CamelStatus {
    optional string projectId = 1;
    optional string env = 2;
    repeated CamelStatusValue statuses = 3;
}

message Environment {
    optional string name = 1;
    optional string cluster = 2;
    optional string namespace = 3;
    optional string cicd = 4;
}
"#;

/// How a cache's content is treated across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Durable artifacts, kept across restarts.
    Durable,
    /// Scratch state, reset when an embedded store starts.
    Volatile,
    /// Scratch status state, reset on start and by `clear_all_statuses`.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSpec {
    pub name: &'static str,
    /// Indexed message type; `None` for caches holding plain strings.
    pub type_name: Option<&'static str>,
    /// Keyed by [`GroupedKey`](crate::GroupedKey) rather than a flat string.
    pub grouped: bool,
    pub kind: CacheKind,
}

impl CacheSpec {
    pub fn is_volatile(&self) -> bool {
        self.kind != CacheKind::Durable
    }

    pub fn is_status(&self) -> bool {
        self.kind == CacheKind::Status
    }

    /// Declarative remote definition: protostream encoding with grouping.
    pub fn remote_definition(&self) -> String {
        format!(
            "<distributed-cache name=\"{}\">\
             <encoding media-type=\"application/x-protostream\"/>\
             <groups enabled=\"true\"/>\
             </distributed-cache>",
            self.name
        )
    }
}

pub const PROJECTS: CacheSpec = CacheSpec {
    name: "projects",
    type_name: Some("karavan.Project"),
    grouped: true,
    kind: CacheKind::Durable,
};

pub const FILES: CacheSpec = CacheSpec {
    name: "files",
    type_name: Some("karavan.ProjectFile"),
    grouped: true,
    kind: CacheKind::Durable,
};

pub const PIPELINE_STATUSES: CacheSpec = CacheSpec {
    name: "pipeline_statuses",
    type_name: Some("karavan.PipelineStatus"),
    grouped: true,
    kind: CacheKind::Status,
};

pub const DEPLOYMENT_STATUSES: CacheSpec = CacheSpec {
    name: "deployment_statuses",
    type_name: Some("karavan.DeploymentStatus"),
    grouped: true,
    kind: CacheKind::Status,
};

pub const POD_STATUSES: CacheSpec = CacheSpec {
    name: "pod_statuses",
    type_name: Some("karavan.PodStatus"),
    grouped: true,
    kind: CacheKind::Status,
};

pub const CAMEL_STATUSES: CacheSpec = CacheSpec {
    name: "camel_statuses",
    type_name: Some("karavan.CamelStatus"),
    grouped: true,
    kind: CacheKind::Status,
};

pub const SERVICE_STATUSES: CacheSpec = CacheSpec {
    name: "service_statuses",
    type_name: Some("karavan.ServiceStatus"),
    grouped: true,
    kind: CacheKind::Volatile,
};

pub const ENVIRONMENTS: CacheSpec = CacheSpec {
    name: "environments",
    type_name: Some("karavan.Environment"),
    grouped: false,
    kind: CacheKind::Volatile,
};

pub const COMMITS: CacheSpec = CacheSpec {
    name: "commits",
    type_name: None,
    grouped: false,
    kind: CacheKind::Durable,
};

pub const RUNNER_STATUSES: CacheSpec = CacheSpec {
    name: "runner_statuses",
    type_name: None,
    grouped: true,
    kind: CacheKind::Status,
};

/// Every cache, in provisioning order.
pub const CATALOG: [CacheSpec; 10] = [
    ENVIRONMENTS,
    PROJECTS,
    FILES,
    PIPELINE_STATUSES,
    DEPLOYMENT_STATUSES,
    POD_STATUSES,
    SERVICE_STATUSES,
    CAMEL_STATUSES,
    COMMITS,
    RUNNER_STATUSES,
];

/// Look up a catalog entry by cache name.
pub fn spec_for(name: &str) -> Option<&'static CacheSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use std::collections::HashSet;

    /// Field names declared by `message <name> { ... }` in the schema.
    fn schema_fields(message: &str) -> Vec<String> {
        let header = format!("message {message} {{");
        let start = PROTO_SCHEMA
            .find(&header)
            .unwrap_or_else(|| panic!("no message {message}"));
        let body = &PROTO_SCHEMA[start + header.len()..];
        let body = &body[..body.find('}').unwrap()];
        body.lines()
            .filter_map(|line| line.split('=').next()?.split_whitespace().nth(2))
            .map(str::to_string)
            .collect()
    }

    fn json_fields(value: serde_json::Value) -> Vec<String> {
        let mut fields: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        fields.sort();
        fields
    }

    fn assert_message_matches(type_name: &str, value: serde_json::Value) {
        let message = type_name.strip_prefix("karavan.").unwrap();
        let mut declared = schema_fields(message);
        declared.sort();
        assert_eq!(declared, json_fields(value), "{type_name}");
    }

    #[test]
    fn cache_names_are_unique() {
        let names: HashSet<_> = CATALOG.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), CATALOG.len());
    }

    #[test]
    fn exactly_five_status_caches() {
        let status: Vec<_> = CATALOG.iter().filter(|s| s.is_status()).map(|s| s.name).collect();
        assert_eq!(
            status,
            vec![
                "pipeline_statuses",
                "deployment_statuses",
                "pod_statuses",
                "camel_statuses",
                "runner_statuses",
            ]
        );
    }

    #[test]
    fn durable_caches_are_not_volatile() {
        for name in ["projects", "files", "commits"] {
            assert!(!spec_for(name).unwrap().is_volatile(), "{name}");
        }
        assert!(spec_for("environments").unwrap().is_volatile());
        assert!(spec_for("service_statuses").unwrap().is_volatile());
    }

    #[test]
    fn schema_declares_every_remote_type() {
        for spec in CATALOG.iter().filter_map(|s| s.type_name) {
            let message = spec.strip_prefix("karavan.").unwrap();
            assert!(!schema_fields(message).is_empty(), "{spec}");
        }
        assert!(!schema_fields("GroupedKey").is_empty());
    }

    #[test]
    fn schema_fields_match_documents() {
        let mut project = Project::new("p", "", "", "");
        project.last_commit = Some("abc".to_string());
        let docs = [
            ("karavan.Project", serde_json::to_value(project).unwrap()),
            ("karavan.ProjectFile", serde_json::to_value(ProjectFile::default()).unwrap()),
            ("karavan.PipelineStatus", serde_json::to_value(PipelineStatus::default()).unwrap()),
            (
                "karavan.DeploymentStatus",
                serde_json::to_value(DeploymentStatus::default()).unwrap(),
            ),
            ("karavan.ServiceStatus", serde_json::to_value(ServiceStatus::default()).unwrap()),
            ("karavan.PodStatus", serde_json::to_value(PodStatus::default()).unwrap()),
            ("karavan.CamelStatus", serde_json::to_value(CamelStatus::default()).unwrap()),
            (
                "karavan.CamelStatusValue",
                serde_json::to_value(CamelStatusValue::default()).unwrap(),
            ),
            ("karavan.Environment", serde_json::to_value(Environment::default()).unwrap()),
            (
                "karavan.GroupedKey",
                serde_json::to_value(crate::GroupedKey::create("g", "i")).unwrap(),
            ),
        ];
        for (type_name, doc) in docs {
            assert_message_matches(type_name, doc);
        }
    }

    #[test]
    fn remote_definition_format() {
        assert_eq!(
            PROJECTS.remote_definition(),
            "<distributed-cache name=\"projects\">\
             <encoding media-type=\"application/x-protostream\"/>\
             <groups enabled=\"true\"/>\
             </distributed-cache>"
        );
    }
}
