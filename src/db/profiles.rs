use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{NurseDetails, NurseProfileRow, PatientDetails, PatientProfileRow, Profile, ProfileDetails, ProfileRow};

/// How an insert treats an existing primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Fail,
    Skip,
}

impl OnConflict {
    fn clause(self) -> &'static str {
        match self {
            OnConflict::Fail => "",
            OnConflict::Skip => " ON CONFLICT (id) DO NOTHING",
        }
    }
}

pub async fn insert_identity(conn: &mut PgConnection, id: Uuid, email: &str) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query("INSERT INTO auth.users (id, email) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind(id)
        .bind(email)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(rows)
}

pub async fn insert_profile(conn: &mut PgConnection, profile: &Profile, on_conflict: OnConflict) -> Result<u64, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO public.profiles (id, role, full_name, phone, address)
        VALUES ($1, $2, $3, $4, $5){}
        "#,
        on_conflict.clause()
    );
    let rows = sqlx::query(&sql)
        .bind(profile.id)
        .bind(profile.role())
        .bind(&profile.full_name)
        .bind(&profile.phone)
        .bind(&profile.address)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(rows)
}

/// Inserts the extension row for `id`. The `(id, role)` foreign key makes
/// this fail when `id` belongs to a profile of the other role.
pub async fn insert_details(
    conn: &mut PgConnection,
    id: Uuid,
    details: &ProfileDetails,
    on_conflict: OnConflict,
) -> Result<u64, sqlx::Error> {
    match details {
        ProfileDetails::Patient(p) => insert_patient_details(conn, id, p, on_conflict).await,
        ProfileDetails::Nurse(n) => insert_nurse_details(conn, id, n, on_conflict).await,
    }
}

async fn insert_patient_details(
    conn: &mut PgConnection,
    id: Uuid,
    details: &PatientDetails,
    on_conflict: OnConflict,
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO public.patient_profiles
            (id, date_of_birth, gender, blood_group, emergency_contact,
             medical_conditions, allergies, current_medications)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8){}
        "#,
        on_conflict.clause()
    );
    let rows = sqlx::query(&sql)
        .bind(id)
        .bind(details.date_of_birth)
        .bind(details.gender)
        .bind(&details.blood_group)
        .bind(&details.emergency_contact)
        .bind(&details.medical_conditions)
        .bind(&details.allergies)
        .bind(&details.current_medications)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(rows)
}

async fn insert_nurse_details(
    conn: &mut PgConnection,
    id: Uuid,
    details: &NurseDetails,
    on_conflict: OnConflict,
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO public.nurse_profiles (id, qualification, experience_years, specializations, languages)
        VALUES ($1, $2, $3, $4, $5){}
        "#,
        on_conflict.clause()
    );
    let rows = sqlx::query(&sql)
        .bind(id)
        .bind(&details.qualification)
        .bind(details.experience_years)
        .bind(&details.specializations)
        .bind(&details.languages)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(rows)
}

pub async fn get_profile_row(conn: &mut PgConnection, id: Uuid) -> Result<Option<ProfileRow>, sqlx::Error> {
    sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT id, role, full_name, phone, address, created_at, updated_at
        FROM public.profiles
        WHERE id = $1
        "#,
    )
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn get_patient_row(conn: &mut PgConnection, id: Uuid) -> Result<Option<PatientProfileRow>, sqlx::Error> {
    sqlx::query_as::<_, PatientProfileRow>(
        r#"
        SELECT id, date_of_birth, gender, blood_group, emergency_contact,
               medical_conditions, allergies, current_medications
        FROM public.patient_profiles
        WHERE id = $1
        "#,
    )
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn get_nurse_row(conn: &mut PgConnection, id: Uuid) -> Result<Option<NurseProfileRow>, sqlx::Error> {
    sqlx::query_as::<_, NurseProfileRow>(
        r#"
        SELECT id, qualification, experience_years, specializations, languages
        FROM public.nurse_profiles
        WHERE id = $1
        "#,
    )
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Nurses visible to the caller, for directory browsing.
pub async fn list_nurse_rows(conn: &mut PgConnection) -> Result<Vec<NurseProfileRow>, sqlx::Error> {
    sqlx::query_as::<_, NurseProfileRow>(
        r#"
        SELECT id, qualification, experience_years, specializations, languages
        FROM public.nurse_profiles
        ORDER BY experience_years DESC, id
        "#,
    )
        .fetch_all(conn)
        .await
}

pub async fn update_contact(
    conn: &mut PgConnection,
    id: Uuid,
    phone: Option<&str>,
    address: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query(
        "UPDATE public.profiles SET phone = $1, address = $2, updated_at = now() WHERE id = $3",
    )
        .bind(phone)
        .bind(address)
        .bind(id)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(rows)
}

/// Removes a profile and, through the cascading keys, everything hanging
/// off it: extension row, coverage, slots and bookings.
pub async fn delete_profile(conn: &mut PgConnection, id: Uuid) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query("DELETE FROM public.profiles WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(rows)
}
