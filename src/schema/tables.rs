use super::{Column, Index, Table, TableConstraint};
use TableConstraint::{Check, ForeignKey, PrimaryKey, Unique};

pub const PROFILES: &str = "profiles";
pub const SERVICE_AREAS: &str = "service_areas";
pub const PATIENT_PROFILES: &str = "patient_profiles";
pub const NURSE_PROFILES: &str = "nurse_profiles";
pub const NURSE_SERVICE_AREAS: &str = "nurse_service_areas";
pub const NURSE_SLOTS: &str = "nurse_slots";
pub const BOOKINGS: &str = "bookings";

const CREATED_AT: Column = Column::new("created_at", "timestamptz", "NOT NULL DEFAULT now()");
const UPDATED_AT: Column = Column::new("updated_at", "timestamptz", "NOT NULL DEFAULT now()");
const TEXT_SET: &str = "NOT NULL DEFAULT '{}'";

/// The managed tables, identity-linked first, bookings last.
pub fn all() -> Vec<Table> {
    vec![
        profiles(),
        service_areas(),
        patient_profiles(),
        nurse_profiles(),
        nurse_service_areas(),
        nurse_slots(),
        bookings(),
    ]
}

fn profiles() -> Table {
    Table {
        name: PROFILES,
        columns: vec![
            Column::new("id", "uuid", "NOT NULL"),
            Column::new("role", "public.user_role", "NOT NULL"),
            Column::new("full_name", "text", "NOT NULL"),
            Column::new("phone", "text", ""),
            Column::new("address", "text", ""),
            CREATED_AT,
            UPDATED_AT,
        ],
        constraints: vec![
            PrimaryKey(vec!["id"]),
            // Target of the (id, role) keys on the extension tables.
            Unique { name: "profiles_id_role_key", columns: vec!["id", "role"] },
            ForeignKey {
                name: "profiles_id_fkey",
                columns: vec!["id"],
                references: "auth.users",
                ref_columns: vec!["id"],
            },
        ],
        indexes: vec![Index { name: "profiles_role_idx", unique: false, columns: vec!["role"], predicate: None }],
    }
}

fn service_areas() -> Table {
    Table {
        name: SERVICE_AREAS,
        columns: vec![
            Column::new("id", "uuid", "NOT NULL DEFAULT gen_random_uuid()"),
            Column::new("pincode", "text", "NOT NULL"),
            Column::new("service_id", "text", "NOT NULL"),
            Column::new("is_available", "boolean", "NOT NULL DEFAULT true"),
            CREATED_AT,
        ],
        constraints: vec![
            PrimaryKey(vec!["id"]),
            Unique { name: "service_areas_pincode_service_key", columns: vec!["pincode", "service_id"] },
        ],
        indexes: vec![],
    }
}

fn patient_profiles() -> Table {
    Table {
        name: PATIENT_PROFILES,
        columns: vec![
            Column::new("id", "uuid", "NOT NULL"),
            Column::new("role", "public.user_role", "NOT NULL DEFAULT 'patient'"),
            Column::new("date_of_birth", "date", ""),
            Column::new("gender", "public.gender_type", ""),
            Column::new("blood_group", "text", ""),
            Column::new("emergency_contact", "text", ""),
            Column::new("medical_conditions", "text[]", TEXT_SET),
            Column::new("allergies", "text[]", TEXT_SET),
            Column::new("current_medications", "text[]", TEXT_SET),
            CREATED_AT,
            UPDATED_AT,
        ],
        constraints: vec![
            PrimaryKey(vec!["id"]),
            Check { name: "patient_profiles_role_check", expr: "role = 'patient'" },
            ForeignKey {
                name: "patient_profiles_profile_fkey",
                columns: vec!["id", "role"],
                references: PROFILES,
                ref_columns: vec!["id", "role"],
            },
        ],
        indexes: vec![],
    }
}

fn nurse_profiles() -> Table {
    Table {
        name: NURSE_PROFILES,
        columns: vec![
            Column::new("id", "uuid", "NOT NULL"),
            Column::new("role", "public.user_role", "NOT NULL DEFAULT 'nurse'"),
            Column::new("qualification", "text", "NOT NULL"),
            Column::new("experience_years", "integer", "NOT NULL DEFAULT 0"),
            Column::new("specializations", "text[]", TEXT_SET),
            Column::new("languages", "text[]", TEXT_SET),
            CREATED_AT,
            UPDATED_AT,
        ],
        constraints: vec![
            PrimaryKey(vec!["id"]),
            Check { name: "nurse_profiles_role_check", expr: "role = 'nurse'" },
            Check { name: "nurse_profiles_experience_check", expr: "experience_years >= 0" },
            ForeignKey {
                name: "nurse_profiles_profile_fkey",
                columns: vec!["id", "role"],
                references: PROFILES,
                ref_columns: vec!["id", "role"],
            },
        ],
        indexes: vec![],
    }
}

fn nurse_service_areas() -> Table {
    Table {
        name: NURSE_SERVICE_AREAS,
        columns: vec![
            Column::new("id", "uuid", "NOT NULL DEFAULT gen_random_uuid()"),
            Column::new("nurse_id", "uuid", "NOT NULL"),
            Column::new("pincode", "text", "NOT NULL"),
            Column::new("is_active", "boolean", "NOT NULL DEFAULT true"),
            CREATED_AT,
        ],
        constraints: vec![
            PrimaryKey(vec!["id"]),
            Unique { name: "nurse_service_areas_nurse_pincode_key", columns: vec!["nurse_id", "pincode"] },
            ForeignKey {
                name: "nurse_service_areas_nurse_fkey",
                columns: vec!["nurse_id"],
                references: NURSE_PROFILES,
                ref_columns: vec!["id"],
            },
        ],
        indexes: vec![Index {
            name: "nurse_service_areas_pincode_idx",
            unique: false,
            columns: vec!["pincode"],
            predicate: Some("is_active"),
        }],
    }
}

fn nurse_slots() -> Table {
    Table {
        name: NURSE_SLOTS,
        columns: vec![
            Column::new("id", "uuid", "NOT NULL DEFAULT gen_random_uuid()"),
            Column::new("nurse_id", "uuid", "NOT NULL"),
            Column::new("date", "date", "NOT NULL"),
            Column::new("start_time", "time", "NOT NULL"),
            Column::new("end_time", "time", "NOT NULL"),
            Column::new("status", "public.slot_status", "NOT NULL DEFAULT 'available'"),
            CREATED_AT,
        ],
        constraints: vec![
            PrimaryKey(vec!["id"]),
            // Lets bookings pin the slot's nurse with a composite key.
            Unique { name: "nurse_slots_id_nurse_key", columns: vec!["id", "nurse_id"] },
            Check { name: "valid_time_range", expr: "end_time > start_time" },
            Check { name: "one_hour_slot", expr: "EXTRACT(EPOCH FROM (end_time - start_time)) = 3600" },
            ForeignKey {
                name: "nurse_slots_nurse_fkey",
                columns: vec!["nurse_id"],
                references: NURSE_PROFILES,
                ref_columns: vec!["id"],
            },
        ],
        indexes: vec![Index {
            name: "nurse_slots_nurse_date_idx",
            unique: false,
            columns: vec!["nurse_id", "date", "start_time"],
            predicate: None,
        }],
    }
}

fn bookings() -> Table {
    Table {
        name: BOOKINGS,
        columns: vec![
            Column::new("id", "uuid", "NOT NULL DEFAULT gen_random_uuid()"),
            Column::new("patient_id", "uuid", "NOT NULL"),
            Column::new("nurse_id", "uuid", "NOT NULL"),
            Column::new("slot_id", "uuid", "NOT NULL"),
            Column::new("service_id", "text", "NOT NULL"),
            Column::new("status", "public.booking_status", "NOT NULL DEFAULT 'pending'"),
            Column::new("notes", "text", ""),
            CREATED_AT,
            UPDATED_AT,
        ],
        constraints: vec![
            PrimaryKey(vec!["id"]),
            ForeignKey {
                name: "bookings_patient_fkey",
                columns: vec!["patient_id"],
                references: PATIENT_PROFILES,
                ref_columns: vec!["id"],
            },
            ForeignKey {
                name: "bookings_nurse_fkey",
                columns: vec!["nurse_id"],
                references: NURSE_PROFILES,
                ref_columns: vec!["id"],
            },
            ForeignKey {
                name: "bookings_slot_fkey",
                columns: vec!["slot_id", "nurse_id"],
                references: NURSE_SLOTS,
                ref_columns: vec!["id", "nurse_id"],
            },
        ],
        indexes: vec![
            Index {
                name: "bookings_active_slot_key",
                unique: true,
                columns: vec!["slot_id"],
                predicate: Some("status <> 'cancelled'"),
            },
            Index { name: "bookings_patient_idx", unique: false, columns: vec!["patient_id"], predicate: None },
            Index { name: "bookings_nurse_idx", unique: false, columns: vec!["nurse_id"], predicate: None },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_tables_share_the_profile_key() {
        for name in ["patient_profiles", "nurse_profiles"] {
            let table = all().into_iter().find(|t| t.name == name).unwrap();
            let sql = table.create_sql();
            assert!(sql.contains("PRIMARY KEY (id)"));
            assert!(sql.contains("FOREIGN KEY (id, role) REFERENCES public.profiles (id, role) ON DELETE CASCADE"));
        }
    }

    #[test]
    fn profiles_cascade_from_identity_provider() {
        let sql = profiles().create_sql();
        assert!(sql.contains("REFERENCES auth.users (id) ON DELETE CASCADE"));
        assert!(profiles().dependencies().is_empty());
    }

    #[test]
    fn active_booking_index_is_partial() {
        let sql = bookings().index_sql();
        assert_eq!(
            sql[0],
            "CREATE UNIQUE INDEX bookings_active_slot_key ON public.bookings (slot_id) WHERE status <> 'cancelled'"
        );
    }
}
