//! MCP server exposing the document store and change detection over stdio.
//!
//! Each tool takes a JSON object of arguments and answers with JSON text.
//! A failing tool produces an MCP tool error result; only an unknown tool
//! name is a protocol error.
//!
//! | Tool | Purpose |
//! |------|---------|
//! | `context_list_collections` | Collection names, paginated |
//! | `context_create_collection` | Get-or-create a collection |
//! | `context_get_collection_info` | Name, metadata and document count |
//! | `context_get_collection_count` | Document count |
//! | `context_peek_collection` | First N documents |
//! | `context_add_documents` | Insert documents |
//! | `context_query_documents` | Free-text search |
//! | `context_get_documents` | Fetch by ids or filter |
//! | `context_update_documents` | Replace content and/or metadata |
//! | `context_delete_documents` | Delete by ids |
//! | `context_modify_collection` | Rename and/or replace metadata |
//! | `context_delete_collection` | Drop a collection |
//! | `context_fork_collection` | Copy a collection |
//! | `context_check_document_changed` | Compare a file with its fingerprint |
//! | `context_list_changed_documents` | Files needing reindex, deleted files |

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use specfold_core::models::{
    DocumentUpdate, GetRequest, Metadata, NewDocument, QueryRequest,
};
use specfold_core::store::DocumentStore;
use tracing::{debug, warn};

use crate::error::SpecfoldError;
use crate::fingerprint::{FingerprintStore, JsonFingerprintStore};
use crate::project::Project;
use crate::sqlite_store::SqliteStore;

/// Static description of one tool.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub read_only: bool,
    pub schema: Value,
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Every tool the server registers, in listing order.
pub fn tool_specs() -> Vec<ToolSpec> {
    let name_only = || object_schema(json!({ "name": { "type": "string" } }), &["name"]);
    let filter_props = json!({
        "metadata": { "type": "object", "description": "Equality filter on metadata keys" },
        "content_contains": { "type": "string", "description": "Substring the content must contain" },
    });

    let mut query_props = filter_props.clone();
    if let Some(props) = query_props.as_object_mut() {
        props.insert("collection".into(), json!({ "type": "string" }));
        props.insert("text".into(), json!({ "type": "string" }));
        props.insert(
            "n_results".into(),
            json!({ "type": "integer", "minimum": 1, "default": 5 }),
        );
    }

    let mut get_props = filter_props;
    if let Some(props) = get_props.as_object_mut() {
        props.insert("collection".into(), json!({ "type": "string" }));
        props.insert(
            "ids".into(),
            json!({ "type": "array", "items": { "type": "string" } }),
        );
        props.insert("limit".into(), json!({ "type": "integer", "minimum": 0 }));
        props.insert("offset".into(), json!({ "type": "integer", "minimum": 0 }));
    }

    vec![
        ToolSpec {
            name: "context_list_collections",
            description: "List collection names in name order.",
            read_only: true,
            schema: object_schema(
                json!({
                    "limit": { "type": "integer", "minimum": 0 },
                    "offset": { "type": "integer", "minimum": 0 },
                }),
                &[],
            ),
        },
        ToolSpec {
            name: "context_create_collection",
            description: "Create a collection if it does not exist.",
            read_only: false,
            schema: object_schema(
                json!({
                    "name": { "type": "string" },
                    "metadata": { "type": "object" },
                }),
                &["name"],
            ),
        },
        ToolSpec {
            name: "context_get_collection_info",
            description: "Name, metadata and document count of a collection.",
            read_only: true,
            schema: name_only(),
        },
        ToolSpec {
            name: "context_get_collection_count",
            description: "Number of documents in a collection.",
            read_only: true,
            schema: name_only(),
        },
        ToolSpec {
            name: "context_peek_collection",
            description: "First documents of a collection in id order.",
            read_only: true,
            schema: object_schema(
                json!({
                    "name": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": 10 },
                }),
                &["name"],
            ),
        },
        ToolSpec {
            name: "context_add_documents",
            description: "Add documents to a collection. Ids must be new.",
            read_only: false,
            schema: object_schema(
                json!({
                    "collection": { "type": "string" },
                    "documents": {
                        "type": "array",
                        "items": object_schema(
                            json!({
                                "id": { "type": "string" },
                                "content": { "type": "string" },
                                "metadata": { "type": "object" },
                            }),
                            &["id", "content"],
                        ),
                    },
                }),
                &["collection", "documents"],
            ),
        },
        ToolSpec {
            name: "context_query_documents",
            description: "Free-text search within a collection, best match first.",
            read_only: true,
            schema: object_schema(query_props, &["collection", "text"]),
        },
        ToolSpec {
            name: "context_get_documents",
            description: "Fetch documents by ids and/or filter, with pagination.",
            read_only: true,
            schema: object_schema(get_props, &["collection"]),
        },
        ToolSpec {
            name: "context_update_documents",
            description: "Replace content and/or metadata of existing documents.",
            read_only: false,
            schema: object_schema(
                json!({
                    "collection": { "type": "string" },
                    "documents": {
                        "type": "array",
                        "items": object_schema(
                            json!({
                                "id": { "type": "string" },
                                "content": { "type": "string" },
                                "metadata": { "type": "object" },
                            }),
                            &["id"],
                        ),
                    },
                }),
                &["collection", "documents"],
            ),
        },
        ToolSpec {
            name: "context_delete_documents",
            description: "Delete documents by id.",
            read_only: false,
            schema: object_schema(
                json!({
                    "collection": { "type": "string" },
                    "ids": { "type": "array", "items": { "type": "string" } },
                }),
                &["collection", "ids"],
            ),
        },
        ToolSpec {
            name: "context_modify_collection",
            description: "Rename a collection and/or replace its metadata.",
            read_only: false,
            schema: object_schema(
                json!({
                    "name": { "type": "string" },
                    "new_name": { "type": "string" },
                    "new_metadata": { "type": "object" },
                }),
                &["name"],
            ),
        },
        ToolSpec {
            name: "context_delete_collection",
            description: "Delete a collection and all of its documents.",
            read_only: false,
            schema: name_only(),
        },
        ToolSpec {
            name: "context_fork_collection",
            description: "Copy a collection into a new one, replacing any existing target.",
            read_only: false,
            schema: object_schema(
                json!({
                    "name": { "type": "string" },
                    "new_name": { "type": "string" },
                    "metadata": { "type": "object" },
                }),
                &["name", "new_name"],
            ),
        },
        ToolSpec {
            name: "context_check_document_changed",
            description: "Compare a project file with its stored fingerprint.",
            read_only: true,
            schema: object_schema(
                json!({ "file_path": { "type": "string", "description": "Project-relative path" } }),
                &["file_path"],
            ),
        },
        ToolSpec {
            name: "context_list_changed_documents",
            description: "Files that need reindexing and indexed files that were deleted.",
            read_only: true,
            schema: object_schema(
                json!({
                    "collection": { "type": "string" },
                    "directories": { "type": "array", "items": { "type": "string" } },
                }),
                &[],
            ),
        },
    ]
}

#[derive(Deserialize)]
struct Paging {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
struct NameArgs {
    name: String,
}

#[derive(Deserialize)]
struct CreateArgs {
    name: String,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct PeekArgs {
    name: String,
    #[serde(default = "default_peek")]
    limit: usize,
}

fn default_peek() -> usize {
    10
}

#[derive(Deserialize)]
struct AddArgs {
    collection: String,
    documents: Vec<NewDocument>,
}

#[derive(Deserialize)]
struct UpdateArgs {
    collection: String,
    documents: Vec<DocumentUpdate>,
}

#[derive(Deserialize)]
struct QueryArgs {
    collection: String,
    #[serde(flatten)]
    request: QueryRequest,
}

#[derive(Deserialize)]
struct GetArgs {
    collection: String,
    #[serde(flatten)]
    request: GetRequest,
}

#[derive(Deserialize)]
struct DeleteArgs {
    collection: String,
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct ModifyArgs {
    name: String,
    new_name: Option<String>,
    new_metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct ForkArgs {
    name: String,
    new_name: String,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct CheckArgs {
    file_path: String,
}

#[derive(Deserialize)]
struct ChangedArgs {
    collection: Option<String>,
    directories: Option<Vec<String>>,
}

fn parse<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).with_context(|| format!("invalid arguments for {}", tool))
}

/// Serves the store and fingerprint operations as MCP tools.
///
/// Cheap to clone; every session shares the same backends.
#[derive(Clone)]
pub struct McpBridge {
    project: Arc<Project>,
    store: Arc<dyn DocumentStore>,
    fingerprints: Arc<dyn FingerprintStore>,
}

impl McpBridge {
    pub fn new(
        project: Project,
        store: Arc<dyn DocumentStore>,
        fingerprints: Arc<dyn FingerprintStore>,
    ) -> Self {
        Self {
            project: Arc::new(project),
            store,
            fingerprints,
        }
    }

    fn to_mcp_tool(spec: ToolSpec) -> Tool {
        let input_schema = match spec.schema {
            Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };
        Tool {
            name: Cow::Borrowed(spec.name),
            title: None,
            description: Some(Cow::Borrowed(spec.description)),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(spec.read_only)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    /// Run one tool by name and return its JSON reply.
    pub async fn dispatch(&self, tool: &str, args: Value) -> Result<Value> {
        debug!(tool, "mcp tool call");
        let store = self.store.as_ref();
        match tool {
            "context_list_collections" => {
                let a: Paging = parse(tool, args)?;
                let names = store.list_collections(a.limit, a.offset).await?;
                Ok(json!({ "collections": names }))
            }
            "context_create_collection" => {
                let a: CreateArgs = parse(tool, args)?;
                store.create_collection(&a.name, a.metadata).await?;
                Ok(json!({ "name": a.name }))
            }
            "context_get_collection_info" => {
                let a: NameArgs = parse(tool, args)?;
                let info = store.collection_info(&a.name).await?;
                let count = store.collection_count(&a.name).await?;
                Ok(json!({ "name": info.name, "metadata": info.metadata, "count": count }))
            }
            "context_get_collection_count" => {
                let a: NameArgs = parse(tool, args)?;
                let count = store.collection_count(&a.name).await?;
                Ok(json!({ "name": a.name, "count": count }))
            }
            "context_peek_collection" => {
                let a: PeekArgs = parse(tool, args)?;
                let docs = store.peek(&a.name, a.limit).await?;
                Ok(json!({ "documents": docs }))
            }
            "context_add_documents" => {
                let a: AddArgs = parse(tool, args)?;
                let added = store.add_documents(&a.collection, &a.documents).await?;
                for doc in &a.documents {
                    self.record_fingerprint(&a.collection, &doc.id, &doc.content)
                        .await;
                }
                Ok(json!({ "added": added }))
            }
            "context_query_documents" => {
                let a: QueryArgs = parse(tool, args)?;
                let matches = store.query(&a.collection, &a.request).await?;
                Ok(json!({ "matches": matches }))
            }
            "context_get_documents" => {
                let a: GetArgs = parse(tool, args)?;
                let docs = store.get_documents(&a.collection, &a.request).await?;
                Ok(json!({ "documents": docs }))
            }
            "context_update_documents" => {
                let a: UpdateArgs = parse(tool, args)?;
                let updated = store.update_documents(&a.collection, &a.documents).await?;
                for doc in &a.documents {
                    if let Some(content) = &doc.content {
                        self.record_fingerprint(&a.collection, &doc.id, content)
                            .await;
                    }
                }
                Ok(json!({ "updated": updated }))
            }
            "context_delete_documents" => {
                let a: DeleteArgs = parse(tool, args)?;
                let deleted = store.delete_documents(&a.collection, &a.ids).await?;
                Ok(json!({ "deleted": deleted }))
            }
            "context_modify_collection" => {
                let a: ModifyArgs = parse(tool, args)?;
                store
                    .modify_collection(&a.name, a.new_name.as_deref(), a.new_metadata)
                    .await?;
                Ok(json!({ "name": a.new_name.unwrap_or(a.name) }))
            }
            "context_delete_collection" => {
                let a: NameArgs = parse(tool, args)?;
                store.delete_collection(&a.name).await?;
                Ok(json!({ "deleted": a.name }))
            }
            "context_fork_collection" => {
                let a: ForkArgs = parse(tool, args)?;
                store.fork_collection(&a.name, &a.new_name, a.metadata).await?;
                Ok(json!({ "name": a.new_name, "forked_from": a.name }))
            }
            "context_check_document_changed" => {
                let a: CheckArgs = parse(tool, args)?;
                let status = self.fingerprints.has_changed(&a.file_path, None)?;
                Ok(serde_json::to_value(status)?)
            }
            "context_list_changed_documents" => {
                let a: ChangedArgs = parse(tool, args)?;
                let changed = self
                    .fingerprints
                    .list_changed(a.collection.as_deref(), a.directories.as_deref())?;
                Ok(serde_json::to_value(changed)?)
            }
            other => bail!("unknown tool: {}", other),
        }
    }

    /// Record the digest of `content` as written to the store for `id`.
    ///
    /// Only ids naming a project file get an entry, and only when the
    /// document exists after the write. Failures only log.
    async fn record_fingerprint(&self, collection: &str, id: &str, content: &str) {
        if !self.project.resolve(id).is_file() {
            return;
        }
        match self.store.document_exists(collection, id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(file = id, error = %message, "fingerprint refresh skipped");
                return;
            }
        }
        if let Err(e) = self.fingerprints.update(id, content.as_bytes()) {
            let message = format!("{:#}", e);
            warn!(file = id, error = %message, "fingerprint refresh failed");
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "specfold".to_string(),
                title: Some("specfold context store".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Project context store. Use context_query_documents to search ADRs, features, \
                 rules and UI intent, and context_list_changed_documents to find files that \
                 need reindexing."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = tool_specs().into_iter().map(Self::to_mcp_tool).collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        tool_specs()
            .into_iter()
            .find(|s| s.name == name)
            .map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if !tool_specs().iter().any(|s| s.name == request.name) {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            ));
        }

        let args = request
            .arguments
            .map(Value::Object)
            .unwrap_or(Value::Object(serde_json::Map::new()));

        match self.dispatch(&request.name, args).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!("{:#}", e))])),
        }
    }
}

/// `mcp` command: serve the project's store over stdin/stdout until the
/// client disconnects.
pub async fn run_stdio(project: Project) -> Result<()> {
    use rmcp::{transport::stdio, ServiceExt};

    if !project.store_initialized() {
        return Err(SpecfoldError::NotInitialized(project.root().to_path_buf()).into());
    }
    let store = Arc::new(SqliteStore::open(&project.store_path()).await?);
    let fingerprints = Arc::new(JsonFingerprintStore::new(&project));
    let bridge = McpBridge::new(project, store.clone(), fingerprints);

    let service = bridge
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;
    store.close().await;
    Ok(())
}
