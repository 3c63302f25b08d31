use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bottleneck::BottleneckKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationArea {
    Api,
    Database,
    Frontend,
    System,
}

impl OptimizationArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationArea::Api => "api",
            OptimizationArea::Database => "database",
            OptimizationArea::Frontend => "frontend",
            OptimizationArea::System => "system",
        }
    }
}

impl fmt::Display for OptimizationArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A known optimization and the improvement range it may yield
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationDefinition {
    pub id: &'static str,
    pub area: OptimizationArea,
    pub name: &'static str,
    pub description: &'static str,
    /// Percent
    pub min_improvement: f64,
    /// Percent
    pub max_improvement: f64,
    pub duration_ms: u64,
    pub addresses: &'static [BottleneckKind],
}

use BottleneckKind::*;
use OptimizationArea::*;

pub static CATALOG: &[OptimizationDefinition] = &[
    OptimizationDefinition {
        id: "api-response-cache",
        area: Api,
        name: "Response caching",
        description: "Cache idempotent GET responses for a short TTL",
        min_improvement: 20.0,
        max_improvement: 45.0,
        duration_ms: 1500,
        addresses: &[SlowEndpoint, TailLatency],
    },
    OptimizationDefinition {
        id: "api-compression",
        area: Api,
        name: "Payload compression",
        description: "Compress large JSON responses",
        min_improvement: 5.0,
        max_improvement: 15.0,
        duration_ms: 800,
        addresses: &[SlowEndpoint],
    },
    OptimizationDefinition {
        id: "api-pagination",
        area: Api,
        name: "Enforced pagination",
        description: "Cap unbounded list endpoints with default page sizes",
        min_improvement: 10.0,
        max_improvement: 30.0,
        duration_ms: 1000,
        addresses: &[SlowEndpoint, HighMemory],
    },
    OptimizationDefinition {
        id: "db-index-tuning",
        area: Database,
        name: "Index tuning",
        description: "Add indexes for the most frequent filter columns",
        min_improvement: 25.0,
        max_improvement: 60.0,
        duration_ms: 2500,
        addresses: &[SlowEndpoint, HighCpuLoad],
    },
    OptimizationDefinition {
        id: "db-query-batching",
        area: Database,
        name: "Query batching",
        description: "Collapse N+1 lookups into batched queries",
        min_improvement: 15.0,
        max_improvement: 40.0,
        duration_ms: 2000,
        addresses: &[SlowEndpoint, TailLatency],
    },
    OptimizationDefinition {
        id: "db-connection-pool",
        area: Database,
        name: "Connection pool sizing",
        description: "Resize the pool to match request concurrency",
        min_improvement: 10.0,
        max_improvement: 25.0,
        duration_ms: 1200,
        addresses: &[HighErrorRate, TailLatency],
    },
    OptimizationDefinition {
        id: "db-archive-cold-data",
        area: Database,
        name: "Cold data archiving",
        description: "Move rarely read records out of hot tables",
        min_improvement: 5.0,
        max_improvement: 20.0,
        duration_ms: 3000,
        addresses: &[HighMemory, SlowEndpoint],
    },
    OptimizationDefinition {
        id: "fe-bundle-splitting",
        area: Frontend,
        name: "Bundle splitting",
        description: "Split the dashboard bundle per route",
        min_improvement: 15.0,
        max_improvement: 35.0,
        duration_ms: 1800,
        addresses: &[],
    },
    OptimizationDefinition {
        id: "fe-asset-caching",
        area: Frontend,
        name: "Static asset caching",
        description: "Serve hashed assets with long-lived cache headers",
        min_improvement: 10.0,
        max_improvement: 30.0,
        duration_ms: 600,
        addresses: &[],
    },
    OptimizationDefinition {
        id: "fe-lazy-widgets",
        area: Frontend,
        name: "Lazy widget loading",
        description: "Defer below-the-fold dashboard widgets and their API calls",
        min_improvement: 5.0,
        max_improvement: 20.0,
        duration_ms: 900,
        addresses: &[SlowEndpoint],
    },
    OptimizationDefinition {
        id: "sys-memory-compaction",
        area: System,
        name: "Memory compaction",
        description: "Shrink caches and release retained buffers",
        min_improvement: 10.0,
        max_improvement: 30.0,
        duration_ms: 1000,
        addresses: &[HighMemory],
    },
    OptimizationDefinition {
        id: "sys-worker-offload",
        area: System,
        name: "Background offload",
        description: "Move report generation off request threads",
        min_improvement: 15.0,
        max_improvement: 35.0,
        duration_ms: 2000,
        addresses: &[HighCpuLoad, TailLatency],
    },
    OptimizationDefinition {
        id: "sys-retry-backoff",
        area: System,
        name: "Retry with backoff",
        description: "Wrap flaky upstream calls in bounded retries",
        min_improvement: 5.0,
        max_improvement: 15.0,
        duration_ms: 700,
        addresses: &[HighErrorRate],
    },
];

pub fn find(id: &str) -> Option<&'static OptimizationDefinition> {
    CATALOG.iter().find(|d| d.id == id)
}

pub fn by_area(area: Option<OptimizationArea>) -> Vec<&'static OptimizationDefinition> {
    CATALOG
        .iter()
        .filter(|d| area.map_or(true, |a| d.area == a))
        .collect()
}
