use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};
use sqlx::PgConnection;

use super::plan::Step;
use super::{SCHEMA, STATE_TABLE};
use crate::policy::Policy;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyKey {
    pub table: String,
    pub name: String,
}

impl PolicyKey {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        PolicyKey { table: table.into(), name: name.into() }
    }

    pub fn of(policy: &Policy) -> Self {
        PolicyKey::new(policy.table, policy.name)
    }
}

/// A policy's definition in the shape `pg_policies` reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDef {
    pub permissive: bool,
    pub command: String,
    pub roles: Vec<String>,
    pub qual: Option<String>,
    pub with_check: Option<String>,
}

impl PolicyDef {
    pub fn of(policy: &Policy) -> Self {
        PolicyDef {
            permissive: true,
            command: policy.command.as_sql().to_string(),
            roles: vec![policy.grantee.as_sql().to_string()],
            qual: policy.using.as_ref().map(|p| p.to_sql()),
            with_check: policy.with_check.as_ref().map(|p| p.to_sql()),
        }
    }

    /// Same kind, command and roles. Expression text is stored deparsed by
    /// Postgres, so it is only compared through the sealed digest.
    pub fn same_shape(&self, other: &PolicyDef) -> bool {
        self.permissive == other.permissive && self.command == other.command && self.roles == other.roles
    }
}

/// The parts of the live catalog the migrator reasons about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// Managed tables that currently exist.
    pub tables: BTreeSet<String>,
    /// Managed tables with row-level security switched on.
    pub rls_enabled: BTreeSet<String>,
    /// Every policy found on managed tables, whoever created it.
    pub policies: BTreeMap<PolicyKey, PolicyDef>,
    /// Fingerprint recorded by the last successful migration.
    pub fingerprint: Option<String>,
    /// `digest()` of the catalog as the last successful migration left it.
    pub sealed: Option<String>,
}

impl CatalogSnapshot {
    pub fn empty() -> Self {
        CatalogSnapshot::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.policies.is_empty()
    }

    pub fn policy_keys(&self) -> BTreeSet<PolicyKey> {
        self.policies.keys().cloned().collect()
    }

    /// Hash of the security-relevant catalog: which tables enforce RLS and
    /// the full definition of every policy on them.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for table in &self.rls_enabled {
            hasher.update(format!("rls {}\n", table).as_bytes());
        }
        for (key, def) in &self.policies {
            hasher.update(
                format!(
                    "policy {}.{} {} {} {:?} {:?} {:?}\n",
                    key.table, key.name, def.permissive, def.command, def.roles, def.qual, def.with_check
                )
                    .as_bytes(),
            );
        }
        format!("{:x}", hasher.finalize())
    }

    /// Reads tables, RLS flags and policy definitions from the system
    /// catalogs, plus what the last migration recorded.
    pub async fn load(conn: &mut PgConnection, managed: &[&str]) -> Result<Self, sqlx::Error> {
        let managed: Vec<String> = managed.iter().map(|t| t.to_string()).collect();

        let tables: Vec<(String, bool)> = sqlx::query_as(
            "SELECT c.relname::text, c.relrowsecurity FROM pg_catalog.pg_class c \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relkind = 'r' AND c.relname = ANY($2)",
        )
            .bind(SCHEMA)
            .bind(&managed)
            .fetch_all(&mut *conn)
            .await?;

        let policies: Vec<(String, String, String, String, Vec<String>, Option<String>, Option<String>)> =
            sqlx::query_as(
                "SELECT tablename::text, policyname::text, permissive, cmd, roles::text[], qual, with_check \
                 FROM pg_catalog.pg_policies WHERE schemaname = $1 AND tablename = ANY($2)",
            )
                .bind(SCHEMA)
                .bind(&managed)
                .fetch_all(&mut *conn)
                .await?;

        let state_exists: (bool,) = sqlx::query_as("SELECT to_regclass($1) IS NOT NULL")
            .bind(format!("{}.{}", SCHEMA, STATE_TABLE))
            .fetch_one(&mut *conn)
            .await?;

        // Read through to_jsonb so a state table from before the digest
        // column existed still loads.
        let (fingerprint, sealed) = if state_exists.0 {
            let row: Option<(String, Option<String>)> = sqlx::query_as(&format!(
                "SELECT fingerprint, to_jsonb(s) ->> 'catalog_digest' FROM {}.{} s WHERE id",
                SCHEMA, STATE_TABLE
            ))
                .fetch_optional(&mut *conn)
                .await?;
            match row {
                Some((fp, digest)) => (Some(fp), digest),
                None => (None, None),
            }
        } else {
            (None, None)
        };

        Ok(CatalogSnapshot {
            rls_enabled: tables.iter().filter(|(_, rls)| *rls).map(|(t, _)| t.clone()).collect(),
            tables: tables.into_iter().map(|(t, _)| t).collect(),
            policies: policies
                .into_iter()
                .map(|(table, name, permissive, command, roles, qual, with_check)| {
                    let def = PolicyDef { permissive: permissive == "PERMISSIVE", command, roles, qual, with_check };
                    (PolicyKey::new(table, name), def)
                })
                .collect(),
            fingerprint,
            sealed,
        })
    }

    /// Applies the catalog effect of plan steps, without a database.
    /// Recording a fingerprint also seals the result, as `migrate::apply`
    /// does once every step has run.
    pub fn replay(&mut self, steps: &[Step]) {
        let mut recorded = false;
        for step in steps {
            match step {
                Step::DropPolicy { table, name } => {
                    self.policies.remove(&PolicyKey::new(table.as_str(), name.as_str()));
                }
                Step::DropTable(table) => {
                    self.tables.remove(*table);
                    self.rls_enabled.remove(*table);
                    self.policies.retain(|key, _| key.table != *table);
                }
                Step::CreateTable { name, .. } => {
                    self.tables.insert(name.to_string());
                }
                Step::EnableRls(table) => {
                    self.rls_enabled.insert(table.to_string());
                }
                Step::CreatePolicy { table, name, def, .. } => {
                    self.policies.insert(PolicyKey::new(*table, *name), def.clone());
                }
                Step::RecordFingerprint(fp) => {
                    self.fingerprint = Some(fp.clone());
                    recorded = true;
                }
                Step::Sql(_) => {}
            }
        }
        if recorded {
            self.sealed = Some(self.digest());
        }
    }
}
