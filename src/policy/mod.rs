//! Row-level security policies as data.
//!
//! Each [`Policy`] renders to the `CREATE POLICY` statement the database
//! enforces, and can be evaluated in-process with the same permissive
//! semantics, which is what the in-memory store relies on.

use uuid::Uuid;

use crate::models::{Caller, Role};

pub mod rows;
pub mod rules;

pub use rows::PolicyRow;

/// The statement kinds a policy can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl Command {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Command::All => "ALL",
            Command::Select => "SELECT",
            Command::Insert => "INSERT",
            Command::Update => "UPDATE",
            Command::Delete => "DELETE",
        }
    }

    fn covers(self, op: Operation) -> bool {
        matches!(
            (self, op),
            (Command::All, _)
                | (Command::Select, Operation::Select)
                | (Command::Insert, Operation::Insert)
                | (Command::Update, Operation::Update)
                | (Command::Delete, Operation::Delete)
        )
    }
}

/// A concrete statement being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grantee {
    Public,
    Authenticated,
}

impl Grantee {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Grantee::Public => "public",
            Grantee::Authenticated => "authenticated",
        }
    }

    fn admits(self, caller: &Caller) -> bool {
        match self {
            Grantee::Public => true,
            Grantee::Authenticated => matches!(caller, Caller::Authenticated(_)),
        }
    }
}

/// Answers `profiles.role` lookups made by [`Predicate::CallerHasRole`].
pub trait RoleLookup {
    fn role_of(&self, id: Uuid) -> Option<Role>;
}

impl<F> RoleLookup for F
where
    F: Fn(Uuid) -> Option<Role>,
{
    fn role_of(&self, id: Uuid) -> Option<Role> {
        self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Always,
    /// `auth.uid() = <column>`
    CallerIs(&'static str),
    /// The caller's own `profiles` row holds this role.
    CallerHasRole(Role),
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::Always => "true".to_string(),
            Predicate::CallerIs(column) => format!("auth.uid() = {}", column),
            Predicate::CallerHasRole(role) => format!(
                "EXISTS (SELECT 1 FROM public.profiles WHERE profiles.id = auth.uid() AND profiles.role = '{}')",
                role
            ),
            Predicate::Any(parts) => join_sql(parts, " OR "),
            Predicate::All(parts) => join_sql(parts, " AND "),
        }
    }

    pub fn eval(&self, caller: Option<Uuid>, row: &dyn PolicyRow, roles: &dyn RoleLookup) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::CallerIs(column) => match (caller, row.uuid_column(column)) {
                (Some(me), Some(owner)) => me == owner,
                _ => false,
            },
            Predicate::CallerHasRole(role) => caller.and_then(|me| roles.role_of(me)) == Some(*role),
            Predicate::Any(parts) => parts.iter().any(|p| p.eval(caller, row, roles)),
            Predicate::All(parts) => parts.iter().all(|p| p.eval(caller, row, roles)),
        }
    }
}

fn join_sql(parts: &[Predicate], sep: &str) -> String {
    let rendered: Vec<String> = parts.iter().map(Predicate::to_sql).collect();
    format!("({})", rendered.join(sep))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: &'static str,
    pub table: &'static str,
    pub command: Command,
    pub grantee: Grantee,
    pub using: Option<Predicate>,
    pub with_check: Option<Predicate>,
}

impl Policy {
    pub fn create_sql(&self) -> String {
        let mut sql = format!(
            "CREATE POLICY \"{}\" ON public.{} AS PERMISSIVE FOR {} TO {}",
            self.name,
            self.table,
            self.command.as_sql(),
            self.grantee.as_sql()
        );
        if let Some(using) = &self.using {
            sql.push_str(&format!(" USING ({})", using.to_sql()));
        }
        if let Some(check) = &self.with_check {
            sql.push_str(&format!(" WITH CHECK ({})", check.to_sql()));
        }
        sql
    }

    /// Predicate guarding rows that already exist.
    fn existing(&self) -> Option<&Predicate> {
        self.using.as_ref()
    }

    /// Predicate guarding rows being written; falls back to USING as
    /// Postgres does when a policy has no WITH CHECK.
    fn incoming(&self) -> Option<&Predicate> {
        self.with_check.as_ref().or(self.using.as_ref())
    }
}

/// Evaluates a policy set for one table the way Postgres combines
/// permissive policies: any applicable policy that passes grants access.
pub struct Gate<'a> {
    policies: &'a [Policy],
    roles: &'a dyn RoleLookup,
}

impl<'a> Gate<'a> {
    pub fn new(policies: &'a [Policy], roles: &'a dyn RoleLookup) -> Self {
        Gate { policies, roles }
    }

    fn check(&self, table: &str, op: Operation, caller: &Caller, row: &dyn PolicyRow, incoming: bool) -> bool {
        if caller.bypasses_policies() {
            return true;
        }
        let me = caller.identity();
        self.policies
            .iter()
            .filter(|p| p.table == table && p.command.covers(op) && p.grantee.admits(caller))
            .filter_map(|p| if incoming { p.incoming() } else { p.existing() })
            .any(|pred| pred.eval(me, row, self.roles))
    }

    pub fn can_select(&self, table: &str, caller: &Caller, row: &dyn PolicyRow) -> bool {
        self.check(table, Operation::Select, caller, row, false)
    }

    pub fn can_insert(&self, table: &str, caller: &Caller, row: &dyn PolicyRow) -> bool {
        self.check(table, Operation::Insert, caller, row, true)
    }

    pub fn can_update(&self, table: &str, caller: &Caller, old: &dyn PolicyRow, new: &dyn PolicyRow) -> bool {
        self.check(table, Operation::Update, caller, old, false) && self.check(table, Operation::Update, caller, new, true)
    }

    pub fn can_delete(&self, table: &str, caller: &Caller, row: &dyn PolicyRow) -> bool {
        self.check(table, Operation::Delete, caller, row, false)
    }

    /// Whether any policy at all lets this caller write to the table.
    pub fn has_write_path(&self, table: &str, caller: &Caller) -> bool {
        caller.bypasses_policies()
            || self.policies.iter().any(|p| {
                p.table == table
                    && p.grantee.admits(caller)
                    && [Operation::Insert, Operation::Update, Operation::Delete]
                        .into_iter()
                        .any(|op| p.command.covers(op))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::rows::Columns;

    fn no_roles(_: Uuid) -> Option<Role> {
        None
    }

    #[test]
    fn renders_select_policy() {
        let policy = Policy {
            name: "own",
            table: "profiles",
            command: Command::Select,
            grantee: Grantee::Authenticated,
            using: Some(Predicate::CallerIs("id")),
            with_check: None,
        };
        assert_eq!(
            policy.create_sql(),
            "CREATE POLICY \"own\" ON public.profiles AS PERMISSIVE FOR SELECT TO authenticated USING (auth.uid() = id)"
        );
    }

    #[test]
    fn nested_predicates_parenthesize() {
        let pred = Predicate::All(vec![
            Predicate::CallerIs("patient_id"),
            Predicate::Any(vec![Predicate::Always, Predicate::CallerIs("nurse_id")]),
        ]);
        assert_eq!(pred.to_sql(), "(auth.uid() = patient_id AND (true OR auth.uid() = nurse_id))");
    }

    #[test]
    fn caller_is_needs_an_identity() {
        let id = Uuid::new_v4();
        let row = Columns::new().with("id", id);
        let pred = Predicate::CallerIs("id");
        assert!(pred.eval(Some(id), &row, &no_roles));
        assert!(!pred.eval(None, &row, &no_roles));
        assert!(!pred.eval(Some(Uuid::new_v4()), &row, &no_roles));
    }

    #[test]
    fn all_policy_checks_incoming_rows_with_using() {
        let owner = Uuid::new_v4();
        let policies = vec![Policy {
            name: "manage",
            table: "nurse_slots",
            command: Command::All,
            grantee: Grantee::Authenticated,
            using: Some(Predicate::CallerIs("nurse_id")),
            with_check: None,
        }];
        let gate = Gate::new(&policies, &no_roles);
        let mine = Columns::new().with("nurse_id", owner);
        let theirs = Columns::new().with("nurse_id", Uuid::new_v4());
        let me = Caller::Authenticated(owner);
        assert!(gate.can_insert("nurse_slots", &me, &mine));
        assert!(!gate.can_insert("nurse_slots", &me, &theirs));
        assert!(!gate.can_update("nurse_slots", &me, &mine, &theirs));
        assert!(gate.can_insert("nurse_slots", &Caller::Service, &theirs));
    }
}
