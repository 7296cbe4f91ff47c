//! The transactional instance importer (spec.md §4.6): a pre-order DFS over
//! an XML document that resolves each element to a table, binds its
//! attributes and simple-content children to columns, backfills `NOT NULL`
//! columns with no bound value, optionally probes for an existing row, and
//! inserts — all inside one transaction per file.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use roxmltree::{Document, Node};
use tracing::{debug, instrument, warn};
use xsdrel_model::model::{Model, Table};
use xsdrel_model::resolver::resolve;

use crate::error::{ImportError, Result};
use crate::executor::SqlExecutor;
use crate::value::{coerce, default_for, Value};

/// How read-with-retry and idempotency behave for one import run
/// (SPEC_FULL.md §C.1 / spec.md §4.7).
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Probe for an existing row before inserting (spec.md §4.6.7). Disabling
    /// this trades correctness under re-ingestion for raw insert throughput.
    pub idempotency: bool,
    pub read_retries: u32,
    pub read_retry_delay: Duration,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            idempotency: true,
            read_retries: 5,
            read_retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportResult {
    pub total_rows: u64,
    pub per_table: HashMap<String, u64>,
    /// Elements that resolved to no table and were skipped, along with the
    /// reason, for the audit trail (spec.md §4.6 step 2 / §4.10).
    pub skipped: Vec<SkippedElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedElement {
    pub local_name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMatchingTable,
    MissingRequiredParentKey,
}

pub struct Importer<'m> {
    model: &'m Model,
    options: ImportOptions,
}

impl<'m> Importer<'m> {
    pub fn new(model: &'m Model, options: ImportOptions) -> Self {
        Self { model, options }
    }

    /// Read `path` (with retry, spec.md §4.7 "file is read exclusively after
    /// the ready gate"), parse it, and import it inside one transaction.
    /// Rolls back on any error and propagates it; commits and returns the
    /// per-table counts otherwise.
    #[instrument(skip(self, executor), fields(path = %path.display()))]
    pub async fn import_file<E: SqlExecutor>(&self, path: &Path, executor: &mut E) -> Result<ImportResult> {
        let text = self.read_with_retry(path).await?;
        let doc = Document::parse(&text).map_err(|source| ImportError::Xml {
            path: path.display().to_string(),
            source,
        })?;

        executor.begin().await?;

        let mut result = ImportResult::default();
        let walk_outcome = self.walk(executor, doc.root_element(), None, None, &mut result).await;

        match walk_outcome {
            Ok(()) => {
                executor.commit().await?;
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "rolling back import transaction");
                executor.rollback().await?;
                Err(e)
            }
        }
    }

    async fn read_with_retry(&self, path: &Path) -> Result<String> {
        let mut last_err = None;
        for _attempt in 1..=self.options.read_retries {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(self.options.read_retry_delay).await;
                }
            }
        }
        Err(ImportError::Read {
            path: path.display().to_string(),
            attempts: self.options.read_retries,
            source: last_err.expect("loop runs at least once"),
        })
    }

    /// Recursive pre-order walk implementing spec.md §4.6 steps 1-11.
    #[async_recursion::async_recursion]
    async fn walk<E: SqlExecutor>(
        &self,
        executor: &mut E,
        el: Node<'_, '_>,
        parent_table: Option<&str>,
        parent_id: Option<i64>,
        result: &mut ImportResult,
    ) -> Result<()> {
        let local_name = el.tag_name().name();
        let ns = el.tag_name().namespace();

        // Step 1: resolve the element to a table.
        let Some(table_name) = resolve(self.model, ns, local_name, parent_table).map(str::to_string) else {
            debug!(element = local_name, "no matching table, recursing into children without a parent");
            result.skipped.push(SkippedElement {
                local_name: local_name.to_string(),
                reason: SkipReason::NoMatchingTable,
            });
            for child in el.children().filter(|n| n.is_element()) {
                self.walk(executor, child, parent_table, parent_id, result).await?;
            }
            return Ok(());
        };

        let table = self
            .model
            .table_by_name(&table_name)
            .expect("resolver only returns names present in the model");

        // Step 2: build the values map from the parent FK, attributes, and
        // simple-content children; track which child elements were consumed
        // as scalar columns so we don't re-walk them as child rows.
        let mut values: Vec<(String, Value)> = Vec::new();
        let mut consumed_children: Vec<String> = Vec::new();

        if let Some(parent_name) = parent_table {
            let fk_col = format!("{parent_name}Id");
            if let (Some(pid), true) = (parent_id, table.has_column(&fk_col)) {
                values.push((fk_col, Value::Int(pid)));
            }
        }

        for attr in el.attributes() {
            let col_name = xsdrel_model::ident::pascal_sanitized(attr.name());
            if let Some(col) = table.find_column(&col_name) {
                values.push((col.name.clone(), coerce(attr.value(), &col.sql_type)));
            }
        }

        for child in el.children().filter(|n| n.is_element()) {
            let child_local = child.tag_name().name();
            let col_name = xsdrel_model::ident::pascal_sanitized(child_local);
            let is_scalar_child = table.has_column(&col_name)
                && child.children().filter(|n| n.is_element()).count() == 0
                && resolve(self.model, child.tag_name().namespace(), child_local, Some(&table_name)).is_none();
            if is_scalar_child {
                if let Some(col) = table.find_column(&col_name) {
                    let text = child.text().unwrap_or("");
                    values.push((col.name.clone(), coerce(text, &col.sql_type)));
                    consumed_children.push(child_local.to_string());
                }
            }
        }

        // Step: <choice> discriminator stamped on the parent from its first
        // matching branch child (a values-map-construction-time equivalent
        // of a post-hoc update into the same row).
        if table.has_column("ChoiceOption") {
            if let Some(first_child) = el.children().find(|n| n.is_element()) {
                values.push((
                    "ChoiceOption".to_string(),
                    Value::Text(xsdrel_model::ident::pascal_sanitized(first_child.tag_name().name())),
                ));
            }
        }

        // This element is itself a choice branch: stamp which option it is
        // on its own row.
        if table.has_column("ChoiceParentOption") {
            values.push((
                "ChoiceParentOption".to_string(),
                Value::Text(xsdrel_model::ident::pascal_sanitized(local_name)),
            ));
        }

        // Step: a required parent FK with no value bound means we cannot
        // legally insert this row — skip it but keep walking its children
        // parentless, per spec.md §4.6 step 8.
        if let Some(parent_name) = parent_table {
            let fk_col = format!("{parent_name}Id");
            if let Some(col) = table.find_column(&fk_col) {
                let bound = values.iter().any(|(name, _)| name == &fk_col);
                if !col.nullable && !bound {
                    warn!(table = %table_name, "missing required parent key, skipping row");
                    result.skipped.push(SkippedElement {
                        local_name: local_name.to_string(),
                        reason: SkipReason::MissingRequiredParentKey,
                    });
                    for child in el.children().filter(|n| n.is_element()) {
                        if consumed_children.iter().any(|c| c == child.tag_name().name()) {
                            continue;
                        }
                        self.walk(executor, child, Some(&table_name), None, result).await?;
                    }
                    return Ok(());
                }
            }
        }

        // Step: backfill NOT NULL columns with no bound value, never the
        // parent FK itself (spec.md §4.6 step 6).
        let parent_fk_name = parent_table.map(|p| format!("{p}Id"));
        for col in &table.columns {
            if col.is_primary_key || col.nullable {
                continue;
            }
            if parent_fk_name.as_deref() == Some(col.name.as_str()) {
                continue;
            }
            if !values.iter().any(|(name, _)| name == &col.name) {
                values.push((col.name.clone(), default_for(&col.sql_type)));
            }
        }

        // Step: the default-row-insert special case — no values bound, no
        // parent, and every non-identity column nullable. Still probe first
        // when idempotency is on: the zero-column predicate matches any
        // existing row, so a contentless anchor table (e.g. S1's `Root`)
        // is reused rather than re-inserted on every import.
        let row_id = if values.is_empty() && parent_id.is_none() {
            let existing = if self.options.idempotency {
                self.probe_for_existing(executor, table, &values).await?
            } else {
                None
            };

            match existing {
                Some(id) => id,
                None => {
                    let id = executor.insert_default(&table.schema, &table.name).await?;
                    *result.per_table.entry(table_name.clone()).or_insert(0) += 1;
                    result.total_rows += 1;
                    id
                }
            }
        } else {
            let existing = if self.options.idempotency {
                self.probe_for_existing(executor, table, &values).await?
            } else {
                None
            };

            match existing {
                // Idempotent hit: reuse the existing PK, do not insert, do
                // not count (spec.md §4.6 step 7c / S3: re-import totals 0).
                Some(id) => id,
                None => {
                    let id = executor.insert(&table.schema, &table.name, &values).await?;
                    *result.per_table.entry(table_name.clone()).or_insert(0) += 1;
                    result.total_rows += 1;
                    id
                }
            }
        };

        // Step: recurse into children not already consumed as scalar columns.
        for child in el.children().filter(|n| n.is_element()) {
            if consumed_children.iter().any(|c| c == child.tag_name().name()) {
                continue;
            }
            self.walk(executor, child, Some(&table_name), Some(row_id), result).await?;
        }

        Ok(())
    }

    /// Probe via each unique constraint first (spec.md §4.6.7a), falling
    /// back to a full-row duplicate probe over every bound column
    /// (§4.6.7b) when no unique constraint matches or none is declared.
    async fn probe_for_existing<E: SqlExecutor>(&self, executor: &mut E, table: &Table, values: &[(String, Value)]) -> Result<Option<i64>> {
        let pk_column = table.pk_name();

        for unique in &table.uniques {
            let columns: Option<Vec<(String, Value)>> = unique
                .columns
                .iter()
                .map(|name| values.iter().find(|(n, _)| n == name).cloned())
                .collect();
            if let Some(columns) = columns {
                if let Some(id) = executor.probe(&table.schema, &table.name, &pk_column, &columns).await? {
                    return Ok(Some(id));
                }
            }
        }

        // A zero-column full-row predicate is vacuously true (spec.md §4.6
        // step 7b): it matches any existing row, which is exactly right for
        // the default-row-insert anchor (S1's `Root`) on re-import.
        executor.probe(&table.schema, &table.name, &pk_column, values).await
    }
}
