//! Reference target store backed by sled.
//!
//! Collections are sled trees named `collection:<name>`; documents are stored
//! as JSON under their key. Index definitions live in the `_indexes` collection.
//!
//! A query script commits in one sled transaction over every collection it
//! touches, and a document set in one transaction over its collection, so a
//! storage fault leaves neither half applied. `DROP` empties a collection.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::transaction::{TransactionError, TransactionResult};
use sled::{IVec, Transactional};
use tracing::{debug, info};

use super::statement::{parse_script, Statement};
use super::ScriptExecutor;
use crate::changeset::{ChangeSet, ChangeSetKind};
use crate::checksum::matching_members;
use crate::error::ExecutionError;

/// Default collection receiving bulk-loaded documents.
pub const DEFAULT_DOCUMENT_COLLECTION: &str = "documents";

/// Collection holding deployed index definitions.
pub const INDEX_COLLECTION: &str = "_indexes";

/// Target store configuration.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Collection bulk document sets are loaded into.
    pub document_collection: String,
}

impl TargetConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            document_collection: DEFAULT_DOCUMENT_COLLECTION.to_string(),
        }
    }

    /// Set the collection bulk document sets are loaded into.
    pub fn with_document_collection(mut self, collection: impl Into<String>) -> Self {
        self.document_collection = collection.into();
        self
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape of an index definition payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDefinition {
    /// Collection the index covers.
    pub collection: String,
    /// Indexed document fields, in key order.
    pub fields: Vec<String>,
}

/// sled database acting as the migration target.
pub struct SledTarget {
    db: sled::Db,
    config: TargetConfig,
}

impl SledTarget {
    /// Wrap an open sled database.
    pub fn new(db: sled::Db, config: TargetConfig) -> Self {
        Self { db, config }
    }

    /// Target configuration.
    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Read a document from a collection.
    pub fn get_document(&self, collection: &str, key: &str) -> Result<Option<Value>, ExecutionError> {
        let tree = self.collection(collection)?;
        match tree.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                ExecutionError::InvalidDocument {
                    name: key.to_string(),
                    message: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    /// Read a deployed index definition by name.
    pub fn index_definition(&self, name: &str) -> Result<Option<IndexDefinition>, ExecutionError> {
        match self.get_document(INDEX_COLLECTION, name)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ExecutionError::InvalidDocument {
                    name: name.to_string(),
                    message: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    fn collection(&self, name: &str) -> Result<sled::Tree, ExecutionError> {
        Ok(self.db.open_tree(collection_tree(name))?)
    }

    /// Resolve statements to writes before anything is committed.
    fn prepare(&self, statements: &[Statement]) -> Result<WritePlan, ExecutionError> {
        let mut names: Vec<&str> = Vec::new();
        let mut ops = Vec::with_capacity(statements.len());

        for statement in statements {
            let collection = statement.collection();
            let tree = match names.iter().position(|name| *name == collection) {
                Some(index) => index,
                None => {
                    names.push(collection);
                    names.len() - 1
                }
            };
            ops.push(match statement {
                Statement::Put { key, document, .. } => WriteOp::Put {
                    tree,
                    key: key.clone(),
                    value: encode_document(key, document)?,
                },
                Statement::Delete { key, .. } => WriteOp::Delete {
                    tree,
                    key: key.clone(),
                },
                Statement::Drop { .. } => WriteOp::Clear { tree },
            });
        }

        let trees = names
            .iter()
            .map(|name| self.collection(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut existing = Vec::with_capacity(trees.len());
        for (index, tree) in trees.iter().enumerate() {
            let cleared = ops
                .iter()
                .any(|op| matches!(op, WriteOp::Clear { tree: target } if *target == index));
            let keys = if cleared {
                tree.iter().keys().collect::<Result<Vec<_>, _>>()?
            } else {
                Vec::new()
            };
            existing.push(keys);
        }

        Ok(WritePlan {
            trees,
            existing,
            ops,
        })
    }

    /// Apply every write of a script in one transaction across its collections.
    fn commit(&self, plan: &WritePlan) -> Result<(), ExecutionError> {
        if plan.ops.is_empty() {
            return Ok(());
        }

        let result: TransactionResult<(), ExecutionError> =
            plan.trees.as_slice().transaction(|trees| {
                // Keys put earlier in the script, so a later DROP removes them too.
                let mut written: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); trees.len()];

                for op in &plan.ops {
                    match op {
                        WriteOp::Put { tree, key, value } => {
                            trees[*tree].insert(key.as_bytes(), value.as_slice())?;
                            written[*tree].insert(key.as_str());
                        }
                        WriteOp::Delete { tree, key } => {
                            trees[*tree].remove(key.as_bytes())?;
                            written[*tree].remove(key.as_str());
                        }
                        WriteOp::Clear { tree } => {
                            for key in &plan.existing[*tree] {
                                trees[*tree].remove(key.clone())?;
                            }
                            for key in std::mem::take(&mut written[*tree]) {
                                trees[*tree].remove(key.as_bytes())?;
                            }
                        }
                    }
                }
                Ok(())
            });

        transaction_outcome(result)
    }
}

/// Statements of one script, resolved against the trees they touch.
struct WritePlan {
    trees: Vec<sled::Tree>,
    /// Keys held before the script ran, for trees the script clears.
    existing: Vec<Vec<IVec>>,
    ops: Vec<WriteOp>,
}

enum WriteOp {
    Put {
        tree: usize,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        tree: usize,
        key: String,
    },
    Clear {
        tree: usize,
    },
}

impl ScriptExecutor for SledTarget {
    fn run_query(&self, changeset: &ChangeSet) -> Result<(), ExecutionError> {
        let script = read_to_string(&changeset.source)?;
        let statements = parse_script(&script)?;

        debug!(
            script = %changeset.script_id,
            statements = statements.len(),
            "running query script"
        );
        let plan = self.prepare(&statements)?;
        self.commit(&plan)?;
        self.db.flush()?;
        Ok(())
    }

    fn load_documents(&self, changeset: &ChangeSet) -> Result<(), ExecutionError> {
        let members = matching_members(
            &changeset.source,
            ChangeSetKind::BulkDocuments.member_extensions(),
        )
        .map_err(|e| ExecutionError::Read {
            path: changeset.source.clone(),
            reason: e.to_string(),
        })?;

        // Validate every document before the first write.
        let mut documents = Vec::with_capacity(members.len());
        for member in &members {
            let key = member
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| ExecutionError::InvalidDocument {
                    name: member.display().to_string(),
                    message: "file name is not valid UTF-8".to_string(),
                })?;
            let document: Value = serde_json::from_str(&read_to_string(member)?).map_err(|e| {
                ExecutionError::InvalidDocument {
                    name: key.to_string(),
                    message: e.to_string(),
                }
            })?;
            documents.push((key.to_string(), encode_document(key, &document)?));
        }

        let collection = self.collection(&self.config.document_collection)?;
        let result: TransactionResult<(), ExecutionError> = collection.transaction(|tx| {
            for (key, value) in &documents {
                tx.insert(key.as_bytes(), value.as_slice())?;
            }
            Ok(())
        });
        transaction_outcome(result)?;
        collection.flush()?;

        info!(
            collection = %self.config.document_collection,
            documents = members.len(),
            "documents loaded"
        );
        Ok(())
    }

    fn deploy_index(&self, changeset: &ChangeSet) -> Result<(), ExecutionError> {
        let name = changeset.description.as_str();
        let definition: IndexDefinition = serde_json::from_str(&read_to_string(&changeset.source)?)
            .map_err(|e| ExecutionError::InvalidDocument {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        if definition.collection.is_empty() || definition.fields.is_empty() {
            return Err(ExecutionError::InvalidDocument {
                name: name.to_string(),
                message: "index needs a collection and at least one field".to_string(),
            });
        }

        let value = serde_json::to_vec(&definition).map_err(|e| ExecutionError::InvalidDocument {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        let indexes = self.collection(INDEX_COLLECTION)?;
        indexes.insert(name.as_bytes(), value)?;
        indexes.flush()?;

        info!(index = name, collection = %definition.collection, "index deployed");
        Ok(())
    }
}

fn collection_tree(name: &str) -> String {
    format!("collection:{name}")
}

fn transaction_outcome(result: TransactionResult<(), ExecutionError>) -> Result<(), ExecutionError> {
    match result {
        Ok(()) => Ok(()),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(ExecutionError::Target(e)),
    }
}

fn encode_document(key: &str, document: &Value) -> Result<Vec<u8>, ExecutionError> {
    serde_json::to_vec(document).map_err(|e| ExecutionError::InvalidDocument {
        name: key.to_string(),
        message: e.to_string(),
    })
}

fn read_to_string(path: &Path) -> Result<String, ExecutionError> {
    fs::read_to_string(path).map_err(|e| ExecutionError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
