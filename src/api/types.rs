//! Wire types of the module registry protocol.

use serde::{Deserialize, Serialize};

use crate::module::Module;

/// One module version as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleView {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub provider: String,
    pub version: String,
}

impl From<Module> for ModuleView {
    fn from(module: Module) -> Self {
        Self {
            id: module.to_string(),
            namespace: module.namespace,
            name: module.name,
            provider: module.provider,
            version: module.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub limit: usize,
    pub current_offset: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_url: Option<String>,
}

#[derive(Serialize)]
struct PageQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
    limit: usize,
    offset: usize,
}

impl PaginationMeta {
    /// Meta for a window at `offset` of `limit` over `total` records. Page
    /// links point back at `path` with the same provider filter.
    pub fn new(
        path: &str,
        provider: Option<&str>,
        offset: usize,
        limit: usize,
        total: usize,
    ) -> Self {
        let next_offset = offset
            .checked_add(limit)
            .filter(|next| limit > 0 && *next < total);
        let prev_offset = (offset > 0).then(|| offset.saturating_sub(limit));

        let link = |offset: usize| {
            let query = PageQuery {
                provider,
                limit,
                offset,
            };
            serde_urlencoded::to_string(&query)
                .ok()
                .map(|query| format!("{}?{}", path, query))
        };

        Self {
            limit,
            current_offset: offset,
            total,
            next_offset,
            prev_offset,
            next_url: next_offset.and_then(link),
            prev_url: prev_offset.and_then(link),
        }
    }

    /// Meta for a complete, unwindowed result.
    pub fn whole(count: usize) -> Self {
        Self {
            limit: count,
            current_offset: 0,
            total: count,
            next_offset: None,
            prev_offset: None,
            next_url: None,
            prev_url: None,
        }
    }
}

/// The `{meta, modules}` envelope of list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedList {
    pub meta: PaginationMeta,
    pub modules: Vec<ModuleView>,
}

impl PaginatedList {
    pub fn new(meta: PaginationMeta, modules: Vec<Module>) -> Self {
        Self {
            meta,
            modules: modules.into_iter().map(ModuleView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersions {
    pub source: String,
    pub versions: Vec<ModuleView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionsList {
    pub modules: Vec<ModuleVersions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub errors: Vec<String>,
}
