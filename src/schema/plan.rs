use serde::Serialize;

use super::catalog::{CatalogSnapshot, PolicyDef, PolicyKey};
use super::migrate::SchemaError;
use super::{bootstrap, DesiredSchema, SCHEMA, STATE_TABLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    /// The catalog already matches the desired schema.
    Noop,
    /// No managed objects exist yet.
    Create,
    /// Tables match but row-level security or policies drifted; policies
    /// are dropped and recreated without touching rows.
    Repair,
    /// Managed objects exist but differ; they are dropped and recreated.
    Rebuild,
}

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Permit a rebuild, which drops every managed table and its rows.
    pub allow_reset: bool,
    /// Create the `auth` scaffolding for plain Postgres.
    pub auth_bootstrap: bool,
}

/// One executable statement, tagged with its catalog effect where the
/// migrator needs to reason about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    DropPolicy { table: String, name: String },
    DropTable(&'static str),
    CreateTable { name: &'static str, sql: String },
    EnableRls(&'static str),
    CreatePolicy { table: &'static str, name: &'static str, def: PolicyDef, sql: String },
    RecordFingerprint(String),
    Sql(String),
}

impl Step {
    pub fn sql(&self) -> String {
        match self {
            Step::DropPolicy { table, name } => {
                format!("DROP POLICY IF EXISTS \"{}\" ON {}.{}", name.replace('"', "\"\""), SCHEMA, table)
            }
            Step::DropTable(table) => format!("DROP TABLE IF EXISTS {}.{} CASCADE", SCHEMA, table),
            Step::EnableRls(table) => format!("ALTER TABLE {}.{} ENABLE ROW LEVEL SECURITY", SCHEMA, table),
            Step::CreateTable { sql, .. } | Step::CreatePolicy { sql, .. } | Step::Sql(sql) => sql.clone(),
            Step::RecordFingerprint(fp) => format!(
                "INSERT INTO {schema}.{state} (id, fingerprint, applied_at) VALUES (true, '{fp}', now()) \
                 ON CONFLICT (id) DO UPDATE SET fingerprint = EXCLUDED.fingerprint, applied_at = EXCLUDED.applied_at",
                schema = SCHEMA,
                state = STATE_TABLE,
                fp = fp
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub action: PlanAction,
    pub fingerprint: String,
    pub steps: Vec<Step>,
}

impl MigrationPlan {
    /// Diffs the desired schema against a catalog snapshot.
    ///
    /// The drop phase works from what the catalog actually holds, so
    /// policies added or renamed out of band are removed too. Policy bodies
    /// and RLS flags are checked against the digest sealed by the last
    /// migration.
    pub fn build(
        desired: &DesiredSchema,
        current: &CatalogSnapshot,
        options: &PlanOptions,
    ) -> Result<MigrationPlan, SchemaError> {
        let fingerprint = desired.fingerprint();
        let tables_match = current.fingerprint.as_deref() == Some(fingerprint.as_str())
            && desired.table_names().iter().all(|t| current.tables.contains(*t));
        let security_matches = desired.table_names().iter().all(|t| current.rls_enabled.contains(*t))
            && current.policy_keys() == desired.policy_keys()
            && desired.policies.iter().all(|p| {
                current.policies.get(&PolicyKey::of(p)).is_some_and(|live| live.same_shape(&PolicyDef::of(p)))
            })
            && current.sealed.as_deref() == Some(current.digest().as_str());

        let action = if tables_match && security_matches {
            PlanAction::Noop
        } else if tables_match {
            PlanAction::Repair
        } else if current.is_empty() {
            PlanAction::Create
        } else {
            PlanAction::Rebuild
        };

        if action == PlanAction::Rebuild && !options.allow_reset {
            return Err(SchemaError::ResetRequired { tables: current.tables.iter().cloned().collect() });
        }

        // Idempotent; rerun so roles and auth.uid() exist even when the
        // managed schema is already in place.
        let mut steps: Vec<Step> = Vec::new();
        if options.auth_bootstrap {
            steps.extend(bootstrap::statements().into_iter().map(|s| Step::Sql(s.to_string())));
        }
        if action == PlanAction::Noop {
            return Ok(MigrationPlan { action, fingerprint, steps });
        }

        for key in current.policies.keys() {
            steps.push(Step::DropPolicy { table: key.table.clone(), name: key.name.clone() });
        }
        if action == PlanAction::Repair {
            steps.extend(desired.security_steps());
        } else {
            for func in &desired.functions {
                steps.push(Step::Sql(format!("DROP FUNCTION IF EXISTS {} CASCADE", func.signature)));
            }
            for table in desired.tables.iter().rev() {
                steps.push(Step::DropTable(table.name));
            }
            for ty in desired.enums.iter().rev() {
                steps.push(Step::Sql(format!("DROP TYPE IF EXISTS {}.{} CASCADE", SCHEMA, ty.name)));
            }
            steps.extend(desired.create_steps());
        }

        steps.push(Step::Sql(format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\n    \
                 id boolean PRIMARY KEY DEFAULT true CHECK (id),\n    \
                 fingerprint text NOT NULL,\n    \
                 catalog_digest text,\n    \
                 applied_at timestamptz NOT NULL DEFAULT now()\n)",
            SCHEMA, STATE_TABLE
        )));
        steps.push(Step::Sql(format!(
            "ALTER TABLE {}.{} ADD COLUMN IF NOT EXISTS catalog_digest text",
            SCHEMA, STATE_TABLE
        )));
        steps.push(Step::Sql(format!("ALTER TABLE {}.{} ENABLE ROW LEVEL SECURITY", SCHEMA, STATE_TABLE)));
        steps.push(Step::RecordFingerprint(fingerprint.clone()));

        Ok(MigrationPlan { action, fingerprint, steps })
    }

    pub fn is_noop(&self) -> bool {
        self.action == PlanAction::Noop
    }

    pub fn statements(&self) -> Vec<String> {
        self.steps.iter().map(Step::sql).collect()
    }
}
