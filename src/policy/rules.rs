use super::{Command, Grantee, Policy, Predicate};
use crate::models::Role;
use crate::schema::tables::{
    BOOKINGS, NURSE_PROFILES, NURSE_SERVICE_AREAS, NURSE_SLOTS, PATIENT_PROFILES, PROFILES, SERVICE_AREAS,
};

fn policy(
    name: &'static str,
    table: &'static str,
    command: Command,
    grantee: Grantee,
    using: Option<Predicate>,
    with_check: Option<Predicate>,
) -> Policy {
    Policy { name, table, command, grantee, using, with_check }
}

/// Select, insert and update of the caller's own row, keyed by `id`.
fn self_service(table: &'static str, prefix: &'static [&'static str; 3]) -> Vec<Policy> {
    let own = || Some(Predicate::CallerIs("id"));
    vec![
        policy(prefix[0], table, Command::Select, Grantee::Authenticated, own(), None),
        policy(prefix[1], table, Command::Insert, Grantee::Authenticated, None, own()),
        policy(prefix[2], table, Command::Update, Grantee::Authenticated, own(), own()),
    ]
}

fn either_party() -> Predicate {
    Predicate::Any(vec![Predicate::CallerIs("patient_id"), Predicate::CallerIs("nurse_id")])
}

/// Every row-level policy in the schema.
///
/// `service_areas` has no write policy; it is maintained
/// through the service path, which bypasses row-level security.
pub fn all() -> Vec<Policy> {
    let mut out = Vec::new();

    out.extend(self_service(
        PROFILES,
        &["profiles_select_own", "profiles_insert_own", "profiles_update_own"],
    ));

    out.push(policy(
        "service_areas_select_all",
        SERVICE_AREAS,
        Command::Select,
        Grantee::Public,
        Some(Predicate::Always),
        None,
    ));

    out.extend(self_service(
        PATIENT_PROFILES,
        &["patient_profiles_select_own", "patient_profiles_insert_own", "patient_profiles_update_own"],
    ));

    out.extend(self_service(
        NURSE_PROFILES,
        &["nurse_profiles_select_own", "nurse_profiles_insert_own", "nurse_profiles_update_own"],
    ));
    out.push(policy(
        "nurse_profiles_select_directory",
        NURSE_PROFILES,
        Command::Select,
        Grantee::Authenticated,
        Some(Predicate::Always),
        None,
    ));

    for (table, read, manage) in [
        (NURSE_SERVICE_AREAS, "nurse_service_areas_select_authenticated", "nurse_service_areas_manage_own"),
        (NURSE_SLOTS, "nurse_slots_select_authenticated", "nurse_slots_manage_own"),
    ] {
        out.push(policy(read, table, Command::Select, Grantee::Authenticated, Some(Predicate::Always), None));
        out.push(policy(
            manage,
            table,
            Command::All,
            Grantee::Authenticated,
            Some(Predicate::CallerIs("nurse_id")),
            Some(Predicate::CallerIs("nurse_id")),
        ));
    }

    out.push(policy(
        "bookings_select_party",
        BOOKINGS,
        Command::Select,
        Grantee::Authenticated,
        Some(either_party()),
        None,
    ));
    out.push(policy(
        "bookings_insert_patient",
        BOOKINGS,
        Command::Insert,
        Grantee::Authenticated,
        None,
        Some(Predicate::All(vec![
            Predicate::CallerIs("patient_id"),
            Predicate::CallerHasRole(Role::Patient),
        ])),
    ));
    out.push(policy(
        "bookings_update_party",
        BOOKINGS,
        Command::Update,
        Grantee::Authenticated,
        Some(either_party()),
        Some(either_party()),
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Caller;
    use crate::policy::rows::Columns;
    use crate::policy::Gate;
    use uuid::Uuid;

    #[test]
    fn policy_names_are_unique() {
        let policies = all();
        let mut names: Vec<_> = policies.iter().map(|p| p.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), policies.len());
    }

    #[test]
    fn service_areas_have_no_client_write_path() {
        let policies = all();
        let roles = |_: Uuid| -> Option<Role> { None };
        let gate = Gate::new(&policies, &roles);
        assert!(!gate.has_write_path(SERVICE_AREAS, &Caller::Authenticated(Uuid::new_v4())));
        assert!(!gate.has_write_path(SERVICE_AREAS, &Caller::Anonymous));
        assert!(gate.has_write_path(SERVICE_AREAS, &Caller::Service));
    }

    #[test]
    fn booking_insert_requires_patient_role() {
        let patient = Uuid::new_v4();
        let nurse = Uuid::new_v4();
        let policies = all();
        let roles = move |id: Uuid| {
            if id == patient {
                Some(Role::Patient)
            } else if id == nurse {
                Some(Role::Nurse)
            } else {
                None
            }
        };
        let gate = Gate::new(&policies, &roles);

        let by_patient = Columns::new().with("patient_id", patient).with("nurse_id", nurse);
        assert!(gate.can_insert(BOOKINGS, &Caller::Authenticated(patient), &by_patient));

        // A nurse asserting itself as the patient still fails the role check.
        let by_nurse = Columns::new().with("patient_id", nurse).with("nurse_id", nurse);
        assert!(!gate.can_insert(BOOKINGS, &Caller::Authenticated(nurse), &by_nurse));
    }

    #[test]
    fn insert_policy_renders_role_subquery() {
        let sql = all().into_iter().find(|p| p.name == "bookings_insert_patient").unwrap().create_sql();
        assert!(sql.ends_with(
            "WITH CHECK ((auth.uid() = patient_id AND EXISTS (SELECT 1 FROM public.profiles \
             WHERE profiles.id = auth.uid() AND profiles.role = 'patient')))"
        ));
    }
}
