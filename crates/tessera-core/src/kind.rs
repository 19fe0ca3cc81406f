//! Entity kinds and their static per-kind configuration
//!
//! Every catalog entity is tagged with an [`EntityKind`]. Behaviour that
//! differs between kinds (how the fully-qualified name is minted, which
//! fields are cosmetic versus structural, which child list an entity owns and
//! how updates to it are merged) is looked up in a [`KindConfig`] table
//! rather than implemented per type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of catalog entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    DatabaseService,
    Database,
    Table,
    MessagingService,
    Topic,
    DashboardService,
    Dashboard,
    Chart,
    PipelineService,
    Pipeline,
    Task,
    User,
    Team,
}

impl EntityKind {
    pub const ALL: [EntityKind; 13] = [
        Self::DatabaseService,
        Self::Database,
        Self::Table,
        Self::MessagingService,
        Self::Topic,
        Self::DashboardService,
        Self::Dashboard,
        Self::Chart,
        Self::PipelineService,
        Self::Pipeline,
        Self::Task,
        Self::User,
        Self::Team,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseService => "databaseService",
            Self::Database => "database",
            Self::Table => "table",
            Self::MessagingService => "messagingService",
            Self::Topic => "topic",
            Self::DashboardService => "dashboardService",
            Self::Dashboard => "dashboard",
            Self::Chart => "chart",
            Self::PipelineService => "pipelineService",
            Self::Pipeline => "pipeline",
            Self::Task => "task",
            Self::User => "user",
            Self::Team => "team",
        }
    }

    /// Static configuration for this kind
    pub fn config(&self) -> &'static KindConfig {
        match self {
            Self::DatabaseService => &DATABASE_SERVICE,
            Self::Database => &DATABASE,
            Self::Table => &TABLE,
            Self::MessagingService => &MESSAGING_SERVICE,
            Self::Topic => &TOPIC,
            Self::DashboardService => &DASHBOARD_SERVICE,
            Self::Dashboard => &DASHBOARD,
            Self::Chart => &CHART,
            Self::PipelineService => &PIPELINE_SERVICE,
            Self::Pipeline => &PIPELINE,
            Self::Task => &TASK,
            Self::User => &USER,
            Self::Team => &TEAM,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| crate::Error::Validation(format!("Unknown entity type: {}", s)))
    }
}

/// How a proposed child list is combined with the stored one on update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildMerge {
    /// Children are attached by creating the child; updates can't touch the list
    Derived,
    /// The proposed list replaces the stored one
    Replace,
    /// The proposed list is unioned into the stored one, keyed by child id
    Union,
}

/// Entities reachable from a parent through CONTAINS edges
#[derive(Debug, Clone, Copy)]
pub struct ChildSpec {
    pub kind: EntityKind,
    /// Field name the child list is exposed under (e.g. `tasks`)
    pub field: &'static str,
    pub merge: ChildMerge,
    /// Refuse deletion of the parent while children are linked
    pub blocks_delete: bool,
}

/// Static per-kind configuration
#[derive(Debug)]
pub struct KindConfig {
    pub kind: EntityKind,
    /// Kinds allowed as the container; empty means the FQN is the bare name
    pub containers: &'static [EntityKind],
    pub children: Option<ChildSpec>,
    pub has_owner: bool,
    pub has_followers: bool,
    pub has_tags: bool,
    /// Users and teams expose the entities they own
    pub has_owns: bool,
    /// Users list the teams whose membership CONTAINS them
    pub has_teams: bool,
    /// Users expose the entities they follow
    pub has_follows: bool,
    /// Fields whose change is a MINOR update
    pub minor_fields: &'static [&'static str],
    /// Fields whose change is a MAJOR update
    pub major_fields: &'static [&'static str],
    /// Fields an update must not change; attempting to fails the update
    pub read_only_fields: &'static [&'static str],
    /// Delete marks the entity deleted instead of removing the document
    pub soft_delete: bool,
}

impl KindConfig {
    /// Fields tracked for change descriptions, minor first
    pub fn versioned_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.minor_fields
            .iter()
            .chain(self.major_fields.iter())
            .copied()
    }

    pub fn is_versioned(&self, field: &str) -> bool {
        self.minor_fields.contains(&field) || self.major_fields.contains(&field)
    }

    pub fn is_major(&self, field: &str) -> bool {
        self.major_fields.contains(&field)
    }

    /// Name of the child list field, if the kind has one
    pub fn child_field(&self) -> Option<&'static str> {
        self.children.map(|c| c.field)
    }

    /// Whether the child list can be changed through an update
    pub fn children_updatable(&self) -> bool {
        matches!(
            self.children.map(|c| c.merge),
            Some(ChildMerge::Replace) | Some(ChildMerge::Union)
        )
    }

    /// Derive the fully-qualified name from the container FQN and local name
    pub fn fqn(&self, container_fqn: Option<&str>, name: &str) -> String {
        match container_fqn {
            Some(parent) if !self.containers.is_empty() => format!("{}.{}", parent, name),
            _ => name.to_string(),
        }
    }
}

const SERVICE_MINOR: &[&str] = &["display_name", "description", "service_url", "ingestion_schedule"];

static DATABASE_SERVICE: KindConfig = KindConfig {
    kind: EntityKind::DatabaseService,
    containers: &[],
    children: Some(ChildSpec {
        kind: EntityKind::Database,
        field: "databases",
        merge: ChildMerge::Derived,
        blocks_delete: true,
    }),
    has_owner: false,
    has_followers: false,
    has_tags: false,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &["display_name", "description", "jdbc", "ingestion_schedule"],
    major_fields: &["service_type"],
    read_only_fields: &[],
    soft_delete: false,
};

static DATABASE: KindConfig = KindConfig {
    kind: EntityKind::Database,
    containers: &[EntityKind::DatabaseService],
    children: Some(ChildSpec {
        kind: EntityKind::Table,
        field: "tables",
        merge: ChildMerge::Derived,
        blocks_delete: true,
    }),
    has_owner: true,
    has_followers: false,
    has_tags: false,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &["display_name", "description", "owner"],
    major_fields: &[],
    read_only_fields: &[],
    soft_delete: false,
};

static TABLE: KindConfig = KindConfig {
    kind: EntityKind::Table,
    containers: &[EntityKind::Database],
    children: None,
    has_owner: true,
    has_followers: true,
    has_tags: true,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &["display_name", "description", "owner", "tags", "table_type"],
    major_fields: &["columns", "table_constraints"],
    read_only_fields: &[],
    soft_delete: false,
};

static MESSAGING_SERVICE: KindConfig = KindConfig {
    kind: EntityKind::MessagingService,
    containers: &[],
    children: Some(ChildSpec {
        kind: EntityKind::Topic,
        field: "topics",
        merge: ChildMerge::Derived,
        blocks_delete: true,
    }),
    has_owner: false,
    has_followers: false,
    has_tags: false,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &["display_name", "description", "brokers", "schema_registry", "ingestion_schedule"],
    major_fields: &["service_type"],
    read_only_fields: &[],
    soft_delete: false,
};

static TOPIC: KindConfig = KindConfig {
    kind: EntityKind::Topic,
    containers: &[EntityKind::MessagingService],
    children: None,
    has_owner: true,
    has_followers: true,
    has_tags: true,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &[
        "display_name",
        "description",
        "owner",
        "tags",
        "retention_size",
        "retention_time",
        "maximum_message_size",
        "minimum_in_sync_replicas",
        "replication_factor",
    ],
    major_fields: &["partitions", "schema_type", "schema_text", "cleanup_policies"],
    read_only_fields: &[],
    soft_delete: false,
};

static DASHBOARD_SERVICE: KindConfig = KindConfig {
    kind: EntityKind::DashboardService,
    containers: &[],
    children: Some(ChildSpec {
        kind: EntityKind::Dashboard,
        field: "dashboards",
        merge: ChildMerge::Derived,
        blocks_delete: true,
    }),
    has_owner: false,
    has_followers: false,
    has_tags: false,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: SERVICE_MINOR,
    major_fields: &["service_type"],
    read_only_fields: &[],
    soft_delete: false,
};

static DASHBOARD: KindConfig = KindConfig {
    kind: EntityKind::Dashboard,
    containers: &[EntityKind::DashboardService],
    children: Some(ChildSpec {
        kind: EntityKind::Chart,
        field: "charts",
        merge: ChildMerge::Replace,
        blocks_delete: false,
    }),
    has_owner: true,
    has_followers: true,
    has_tags: true,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &["display_name", "description", "owner", "tags", "dashboard_url", "charts"],
    major_fields: &[],
    read_only_fields: &[],
    soft_delete: false,
};

static CHART: KindConfig = KindConfig {
    kind: EntityKind::Chart,
    containers: &[EntityKind::DashboardService],
    children: None,
    has_owner: true,
    has_followers: true,
    has_tags: true,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &["display_name", "description", "owner", "tags", "chart_url"],
    major_fields: &["chart_type"],
    read_only_fields: &[],
    soft_delete: false,
};

static PIPELINE_SERVICE: KindConfig = KindConfig {
    kind: EntityKind::PipelineService,
    containers: &[],
    children: Some(ChildSpec {
        kind: EntityKind::Pipeline,
        field: "pipelines",
        merge: ChildMerge::Derived,
        blocks_delete: true,
    }),
    has_owner: false,
    has_followers: false,
    has_tags: false,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: SERVICE_MINOR,
    major_fields: &["service_type"],
    read_only_fields: &[],
    soft_delete: false,
};

static PIPELINE: KindConfig = KindConfig {
    kind: EntityKind::Pipeline,
    containers: &[EntityKind::PipelineService],
    children: Some(ChildSpec {
        kind: EntityKind::Task,
        field: "tasks",
        merge: ChildMerge::Union,
        blocks_delete: true,
    }),
    has_owner: true,
    has_followers: true,
    has_tags: true,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &[
        "display_name",
        "description",
        "owner",
        "tags",
        "pipeline_url",
        "concurrency",
        "start_date",
        "tasks",
    ],
    major_fields: &[],
    read_only_fields: &[],
    soft_delete: false,
};

static TASK: KindConfig = KindConfig {
    kind: EntityKind::Task,
    containers: &[EntityKind::PipelineService],
    children: None,
    has_owner: true,
    has_followers: false,
    has_tags: true,
    has_owns: false,
    has_teams: false,
    has_follows: false,
    minor_fields: &[
        "display_name",
        "description",
        "owner",
        "tags",
        "task_url",
        "downstream_tasks",
        "start_date",
        "end_date",
    ],
    major_fields: &["task_sql"],
    read_only_fields: &[],
    soft_delete: false,
};

static USER: KindConfig = KindConfig {
    kind: EntityKind::User,
    containers: &[],
    children: None,
    has_owner: false,
    has_followers: false,
    has_tags: false,
    has_owns: true,
    has_teams: true,
    has_follows: true,
    minor_fields: &["display_name", "email", "timezone", "profile", "is_bot", "is_admin", "teams"],
    major_fields: &[],
    read_only_fields: &["deleted"],
    soft_delete: true,
};

static TEAM: KindConfig = KindConfig {
    kind: EntityKind::Team,
    containers: &[],
    children: Some(ChildSpec {
        kind: EntityKind::User,
        field: "users",
        merge: ChildMerge::Replace,
        blocks_delete: false,
    }),
    has_owner: false,
    has_followers: false,
    has_tags: false,
    has_owns: true,
    has_teams: false,
    has_follows: false,
    minor_fields: &["display_name", "description", "profile", "users"],
    major_fields: &[],
    read_only_fields: &["deleted"],
    soft_delete: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
            assert_eq!(kind.config().kind, kind);
        }
        assert!("warehouse".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_fqn_derivation() {
        let pipeline = EntityKind::Pipeline.config();
        assert_eq!(pipeline.fqn(Some("airflow"), "etl_daily"), "airflow.etl_daily");

        let team = EntityKind::Team.config();
        assert_eq!(team.fqn(None, "data-platform"), "data-platform");
    }

    #[test]
    fn test_child_list_fields_are_classified() {
        for kind in EntityKind::ALL {
            let config = kind.config();
            if config.children_updatable() {
                let field = config.child_field().unwrap();
                assert!(config.is_versioned(field), "{} child list is not versioned", kind);
            }
        }
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&EntityKind::PipelineService).unwrap();
        assert_eq!(json, "\"pipelineService\"");
    }
}
