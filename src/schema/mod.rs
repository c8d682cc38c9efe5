//! Declarative description of the database this crate owns.
//!
//! [`DesiredSchema`] is the single source of truth: migrations diff it
//! against the live catalog (see [`plan`]) instead of replaying scripts.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use sha2::{Digest, Sha256};

use crate::models::{BookingStatus, Gender, Role, SlotStatus};
use crate::policy::{rules, Policy};

pub mod bootstrap;
pub mod catalog;
pub mod functions;
pub mod migrate;
pub mod plan;
pub mod tables;

pub use catalog::{CatalogSnapshot, PolicyDef, PolicyKey};
pub use migrate::{apply, dry_run, SchemaError};
pub use plan::{MigrationPlan, PlanAction, PlanOptions, Step};

pub const SCHEMA: &str = "public";
pub const STATE_TABLE: &str = "schema_state";

lazy_static! {
    pub static ref DESIRED: DesiredSchema = DesiredSchema::build();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: &'static str,
    pub labels: Vec<&'static str>,
}

impl EnumType {
    pub fn of<T>(name: &'static str, labels: &[T], as_str: fn(&T) -> &'static str) -> Self {
        EnumType { name, labels: labels.iter().map(as_str).collect() }
    }

    pub fn create_sql(&self) -> String {
        let labels: Vec<String> = self.labels.iter().map(|l| format!("'{}'", l)).collect();
        format!("CREATE TYPE {}.{} AS ENUM ({})", SCHEMA, self.name, labels.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    /// Everything after the type: nullability, defaults.
    pub modifiers: &'static str,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: &'static str, modifiers: &'static str) -> Self {
        Column { name, sql_type, modifiers }
    }

    fn render(&self) -> String {
        if self.modifiers.is_empty() {
            format!("{} {}", self.name, self.sql_type)
        } else {
            format!("{} {} {}", self.name, self.sql_type, self.modifiers)
        }
    }
}

/// Table-level constraints. Foreign keys always cascade deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableConstraint {
    PrimaryKey(Vec<&'static str>),
    Unique { name: &'static str, columns: Vec<&'static str> },
    ForeignKey {
        name: &'static str,
        columns: Vec<&'static str>,
        references: &'static str,
        ref_columns: Vec<&'static str>,
    },
    Check { name: &'static str, expr: &'static str },
}

impl TableConstraint {
    fn render(&self) -> String {
        match self {
            TableConstraint::PrimaryKey(cols) => format!("PRIMARY KEY ({})", cols.join(", ")),
            TableConstraint::Unique { name, columns } => {
                format!("CONSTRAINT {} UNIQUE ({})", name, columns.join(", "))
            }
            TableConstraint::ForeignKey { name, columns, references, ref_columns } => format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
                name,
                columns.join(", "),
                qualify(references),
                ref_columns.join(", ")
            ),
            TableConstraint::Check { name, expr } => format!("CONSTRAINT {} CHECK ({})", name, expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: &'static str,
    pub unique: bool,
    pub columns: Vec<&'static str>,
    pub predicate: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: Vec<Column>,
    pub constraints: Vec<TableConstraint>,
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn create_sql(&self) -> String {
        let mut lines: Vec<String> = self.columns.iter().map(Column::render).collect();
        lines.extend(self.constraints.iter().map(TableConstraint::render));
        format!("CREATE TABLE {}.{} (\n    {}\n)", SCHEMA, self.name, lines.join(",\n    "))
    }

    pub fn index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|idx| {
                let mut sql = format!(
                    "CREATE {}INDEX {} ON {}.{} ({})",
                    if idx.unique { "UNIQUE " } else { "" },
                    idx.name,
                    SCHEMA,
                    self.name,
                    idx.columns.join(", ")
                );
                if let Some(pred) = idx.predicate {
                    sql.push_str(" WHERE ");
                    sql.push_str(pred);
                }
                sql
            })
            .collect()
    }

    /// Managed tables this one references. Tables outside `public` are
    /// provided by the identity provider and are not counted.
    pub fn dependencies(&self) -> BTreeSet<&'static str> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                TableConstraint::ForeignKey { references, .. }
                    if !references.contains('.') && *references != self.name =>
                {
                    Some(*references)
                }
                _ => None,
            })
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

fn qualify(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{}.{}", SCHEMA, name)
    }
}

/// A function owned by the schema, recreated on every rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFunction {
    /// Name plus argument types, as `DROP FUNCTION` wants it.
    pub signature: &'static str,
    pub definition: &'static str,
}

#[derive(Debug, Clone)]
pub struct DesiredSchema {
    pub enums: Vec<EnumType>,
    /// In dependency order: every table appears after the tables it references.
    pub tables: Vec<Table>,
    pub functions: Vec<SqlFunction>,
    pub triggers: Vec<&'static str>,
    pub policies: Vec<Policy>,
    pub grants: Vec<&'static str>,
}

impl DesiredSchema {
    pub fn build() -> Self {
        DesiredSchema {
            enums: vec![
                EnumType::of("user_role", Role::ALL, Role::as_str),
                EnumType::of("gender_type", Gender::ALL, Gender::as_str),
                EnumType::of("slot_status", SlotStatus::ALL, SlotStatus::as_str),
                EnumType::of("booking_status", BookingStatus::ALL, BookingStatus::as_str),
            ],
            tables: tables::all(),
            functions: functions::all(),
            triggers: functions::triggers(),
            policies: rules::all(),
            grants: functions::grants(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name).collect()
    }

    pub fn policy_keys(&self) -> BTreeSet<PolicyKey> {
        self.policies.iter().map(PolicyKey::of).collect()
    }

    /// Everything that creates the desired objects, in executable order.
    pub fn create_steps(&self) -> Vec<Step> {
        let mut out: Vec<Step> = self.enums.iter().map(|e| Step::Sql(e.create_sql())).collect();
        for table in &self.tables {
            out.push(Step::CreateTable { name: table.name, sql: table.create_sql() });
            out.extend(table.index_sql().into_iter().map(Step::Sql));
        }
        out.extend(self.functions.iter().map(|f| Step::Sql(f.definition.to_string())));
        out.extend(self.triggers.iter().map(|t| Step::Sql(t.to_string())));
        out.extend(self.security_steps());
        out
    }

    /// RLS switches, policies and client grants. Safe to rerun once the
    /// catalogued policies have been dropped.
    pub fn security_steps(&self) -> Vec<Step> {
        let mut out: Vec<Step> = self.tables.iter().map(|t| Step::EnableRls(t.name)).collect();
        out.extend(self.policies.iter().map(|p| Step::CreatePolicy {
            table: p.table,
            name: p.name,
            def: PolicyDef::of(p),
            sql: p.create_sql(),
        }));
        out.extend(self.grants.iter().map(|g| Step::Sql(g.to_string())));
        out
    }

    pub fn create_statements(&self) -> Vec<String> {
        self.create_steps().iter().map(Step::sql).collect()
    }

    /// sha256 over the rendered DDL; any change to the description changes it.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for stmt in self.create_statements() {
            hasher.update(stmt.as_bytes());
            hasher.update(b";\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_in_dependency_order() {
        let mut seen = BTreeSet::new();
        for table in &DESIRED.tables {
            for dep in table.dependencies() {
                assert!(seen.contains(dep), "{} references {} before it is created", table.name, dep);
            }
            seen.insert(table.name);
        }
    }

    #[test]
    fn seven_tables_are_managed() {
        assert_eq!(
            DESIRED.table_names(),
            vec![
                "profiles",
                "service_areas",
                "patient_profiles",
                "nurse_profiles",
                "nurse_service_areas",
                "nurse_slots",
                "bookings"
            ]
        );
    }

    #[test]
    fn every_table_has_rls_and_a_policy() {
        let stmts = DESIRED.create_statements();
        for table in DESIRED.table_names() {
            let rls = format!("ALTER TABLE public.{} ENABLE ROW LEVEL SECURITY", table);
            assert!(stmts.contains(&rls), "missing RLS for {}", table);
            assert!(DESIRED.policies.iter().any(|p| p.table == table), "no policy on {}", table);
        }
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(DESIRED.fingerprint(), DesiredSchema::build().fingerprint());
        assert_eq!(DESIRED.fingerprint().len(), 64);
    }

    #[test]
    fn enum_labels_follow_rust_enums() {
        let role = &DESIRED.enums[0];
        assert_eq!(role.create_sql(), "CREATE TYPE public.user_role AS ENUM ('patient', 'nurse')");
    }

    #[test]
    fn slot_table_pins_one_hour() {
        let sql = DESIRED.table("nurse_slots").unwrap().create_sql();
        assert!(sql.contains("CHECK (end_time > start_time)"));
        assert!(sql.contains("EXTRACT(EPOCH FROM (end_time - start_time)) = 3600"));
    }
}
