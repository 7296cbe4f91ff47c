//! The database seam: [`SqlExecutor`] is the one trait the importer talks
//! to, so unit tests can drive it against [`memory::MemoryExecutor`] instead
//! of a live SQL Server, following the provider-abstraction pattern of
//! `axiograph-llm-sync`'s `LLMInterface`.

use async_trait::async_trait;

use crate::error::Result;
use crate::value::Value;

#[async_trait]
pub trait SqlExecutor: Send {
    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;

    /// `SELECT TOP 1 [pk_column] FROM [schema].[table] WHERE <null-safe
    /// conjunction over columns>` (spec.md §4.6.7). Used for both the
    /// unique-constraint probe and the generic full-row duplicate probe —
    /// they differ only in which columns are passed in.
    async fn probe(&mut self, schema: &str, table: &str, pk_column: &str, columns: &[(String, Value)]) -> Result<Option<i64>>;

    /// `INSERT INTO [schema].[table] (...) VALUES (...);
    /// SELECT CAST(SCOPE_IDENTITY() AS INT);`
    async fn insert(&mut self, schema: &str, table: &str, columns: &[(String, Value)]) -> Result<i64>;

    /// `INSERT INTO [schema].[table] DEFAULT VALUES;
    /// SELECT CAST(SCOPE_IDENTITY() AS INT);` (spec.md §4.6 step 9).
    async fn insert_default(&mut self, schema: &str, table: &str) -> Result<i64>;
}

pub mod tiberius_executor {
    use super::*;
    use crate::error::ImportError;
    use tiberius::{Client, Query};
    use tokio::net::TcpStream;
    use tokio_util::compat::Compat;

    /// Real SQL Server executor backing production imports. One instance
    /// owns the connection for exactly one file's transaction (spec.md §5:
    /// "DB connections are per-import").
    pub struct TiberiusExecutor {
        client: Client<Compat<TcpStream>>,
    }

    impl TiberiusExecutor {
        pub fn new(client: Client<Compat<TcpStream>>) -> Self {
            Self { client }
        }

        /// Open one connection from an ADO-style connection string (spec.md
        /// §5: "DB connections are per-import" — callers construct a fresh
        /// `TiberiusExecutor` per file rather than pooling).
        pub async fn connect(connection_str: &str) -> Result<Self> {
            use tokio_util::compat::TokioAsyncWriteCompatExt;

            let config = tiberius::Config::from_ado_string(connection_str).map_err(|e| ImportError::Database(e.to_string()))?;
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?;
            tcp.set_nodelay(true).map_err(|e| ImportError::Database(e.to_string()))?;

            let client = Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?;
            Ok(Self { client })
        }

        fn bind<'a>(query: &mut Query<'a>, value: &'a Value) {
            match value {
                Value::Null => query.bind(Option::<&str>::None),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::Text(s) => query.bind(s.as_str()),
                Value::Bool(b) => query.bind(*b),
            }
        }
    }

    #[async_trait]
    impl SqlExecutor for TiberiusExecutor {
        async fn begin(&mut self) -> Result<()> {
            self.client
                .execute("BEGIN TRANSACTION", &[])
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?;
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            self.client
                .execute("COMMIT TRANSACTION", &[])
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            self.client
                .execute("ROLLBACK TRANSACTION", &[])
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?;
            Ok(())
        }

        async fn probe(&mut self, schema: &str, table: &str, pk_column: &str, columns: &[(String, Value)]) -> Result<Option<i64>> {
            // No bound columns means the full-row predicate is vacuously
            // true (spec.md §4.6 step 7b): match any existing row.
            let mut sql = format!("SELECT TOP 1 [{pk_column}] FROM [{schema}].[{table}]");
            if !columns.is_empty() {
                let conditions: Vec<String> = columns
                    .iter()
                    .enumerate()
                    .map(|(i, (col, _))| format!("([{col}] = @p{i} OR ([{col}] IS NULL AND @p{i} IS NULL))"))
                    .collect();
                sql.push_str(" WHERE ");
                sql.push_str(&conditions.join(" AND "));
            }

            let mut query = Query::new(sql);
            for (_, value) in columns {
                Self::bind(&mut query, value);
            }

            let stream = query
                .query(&mut self.client)
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?;
            let row = stream
                .into_row()
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?;
            Ok(row.and_then(|r| r.get::<i32, _>(0)).map(i64::from))
        }

        async fn insert(&mut self, schema: &str, table: &str, columns: &[(String, Value)]) -> Result<i64> {
            let col_list = columns.iter().map(|(c, _)| format!("[{c}]")).collect::<Vec<_>>().join(", ");
            let param_list = (0..columns.len()).map(|i| format!("@p{i}")).collect::<Vec<_>>().join(", ");
            let sql = format!(
                "INSERT INTO [{schema}].[{table}] ({col_list}) VALUES ({param_list}); SELECT CAST(SCOPE_IDENTITY() AS INT);"
            );

            let mut query = Query::new(sql);
            for (_, value) in columns {
                Self::bind(&mut query, value);
            }

            let row = query
                .query(&mut self.client)
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?
                .into_row()
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?
                .ok_or_else(|| ImportError::Database("INSERT did not return an identity".to_string()))?;

            row.get::<i32, _>(0).map(i64::from).ok_or_else(|| ImportError::Database("SCOPE_IDENTITY() was NULL".to_string()))
        }

        async fn insert_default(&mut self, schema: &str, table: &str) -> Result<i64> {
            let sql = format!(
                "INSERT INTO [{schema}].[{table}] DEFAULT VALUES; SELECT CAST(SCOPE_IDENTITY() AS INT);"
            );
            let row = self
                .client
                .query(sql, &[])
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?
                .into_row()
                .await
                .map_err(|e| ImportError::Database(e.to_string()))?
                .ok_or_else(|| ImportError::Database("INSERT did not return an identity".to_string()))?;

            row.get::<i32, _>(0).map(i64::from).ok_or_else(|| ImportError::Database("SCOPE_IDENTITY() was NULL".to_string()))
        }
    }
}

pub mod memory {
    use super::*;
    use std::collections::HashMap;

    /// An in-memory stand-in for a SQL Server connection, used by the
    /// importer's unit and integration tests. It mirrors NULL-safe
    /// equality and identity auto-increment without touching a real
    /// database, so the idempotency and backfill rules in spec.md §4.6
    /// can be exercised deterministically.
    #[derive(Debug, Default)]
    pub struct MemoryExecutor {
        tables: HashMap<String, Vec<HashMap<String, Value>>>,
        next_id: HashMap<String, i64>,
        in_transaction: bool,
        committed_snapshot: Option<(HashMap<String, Vec<HashMap<String, Value>>>, HashMap<String, i64>)>,
    }

    impl MemoryExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn row_count(&self, schema: &str, table: &str) -> usize {
            self.tables.get(&key(schema, table)).map(|rows| rows.len()).unwrap_or(0)
        }

        pub fn rows(&self, schema: &str, table: &str) -> &[HashMap<String, Value>] {
            self.tables.get(&key(schema, table)).map(|v| v.as_slice()).unwrap_or(&[])
        }

        fn next_identity(&mut self, key: &str) -> i64 {
            let counter = self.next_id.entry(key.to_string()).or_insert(0);
            *counter += 1;
            *counter
        }
    }

    fn key(schema: &str, table: &str) -> String {
        format!("{schema}.{table}")
    }

    #[async_trait]
    impl SqlExecutor for MemoryExecutor {
        async fn begin(&mut self) -> Result<()> {
            self.in_transaction = true;
            self.committed_snapshot = Some((self.tables.clone(), self.next_id.clone()));
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            self.in_transaction = false;
            self.committed_snapshot = None;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            if let Some((tables, next_id)) = self.committed_snapshot.take() {
                self.tables = tables;
                self.next_id = next_id;
            }
            self.in_transaction = false;
            Ok(())
        }

        async fn probe(&mut self, schema: &str, table: &str, pk_column: &str, columns: &[(String, Value)]) -> Result<Option<i64>> {
            let Some(rows) = self.tables.get(&key(schema, table)) else {
                return Ok(None);
            };
            for row in rows {
                let matches = columns.iter().all(|(col, value)| {
                    let existing = row.get(col).unwrap_or(&Value::Null);
                    existing.null_safe_eq(value)
                });
                if matches {
                    if let Some(Value::Int(id)) = row.get(pk_column) {
                        return Ok(Some(*id));
                    }
                }
            }
            Ok(None)
        }

        async fn insert(&mut self, schema: &str, table: &str, columns: &[(String, Value)]) -> Result<i64> {
            let k = key(schema, table);
            let id = self.next_identity(&k);
            let mut row: HashMap<String, Value> = columns.iter().cloned().collect();
            row.insert(format!("{table}Id"), Value::Int(id));
            self.tables.entry(k).or_default().push(row);
            Ok(id)
        }

        async fn insert_default(&mut self, schema: &str, table: &str) -> Result<i64> {
            self.insert(schema, table, &[]).await
        }
    }
}
