use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

use super::ModelError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Nurse,
}

pg_enum_labels!(Role, "role", { Patient => "patient", Nurse => "nurse" });

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "gender_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

pg_enum_labels!(Gender, "gender", { Male => "male", Female => "female", Other => "other" });

/// Base `profiles` row as stored.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub id: Uuid,
    pub role: Role,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PatientDetails {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub blood_group: Option<String>,
    pub emergency_contact: Option<String>,
    pub medical_conditions: Vec<String>,
    pub allergies: Vec<String>,
    pub current_medications: Vec<String>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NurseDetails {
    pub qualification: String,
    pub experience_years: i32,
    pub specializations: Vec<String>,
    pub languages: Vec<String>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PatientProfileRow {
    pub id: Uuid,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub details: PatientDetails,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NurseProfileRow {
    pub id: Uuid,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub details: NurseDetails,
}

/// Role-specific payload of a profile. A profile carries exactly one of
/// these, and the variant is its role.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ProfileDetails {
    Patient(PatientDetails),
    Nurse(NurseDetails),
}

impl ProfileDetails {
    pub fn role(&self) -> Role {
        match self {
            ProfileDetails::Patient(_) => Role::Patient,
            ProfileDetails::Nurse(_) => Role::Nurse,
        }
    }
}

/// A registered identity together with its role extension.
///
/// In storage this is one `profiles` row plus the `patient_profiles` or
/// `nurse_profiles` row sharing its primary key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(flatten)]
    pub details: ProfileDetails,
}

impl Profile {
    pub fn patient(id: Uuid, full_name: impl Into<String>, details: PatientDetails) -> Self {
        Profile {
            id,
            full_name: full_name.into(),
            phone: None,
            address: None,
            details: ProfileDetails::Patient(details),
        }
    }

    pub fn nurse(id: Uuid, full_name: impl Into<String>, details: NurseDetails) -> Self {
        Profile {
            id,
            full_name: full_name.into(),
            phone: None,
            address: None,
            details: ProfileDetails::Nurse(details),
        }
    }

    pub fn with_contact(mut self, phone: Option<&str>, address: Option<&str>) -> Self {
        self.phone = phone.map(str::to_string);
        self.address = address.map(str::to_string);
        self
    }

    pub fn role(&self) -> Role {
        self.details.role()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if let ProfileDetails::Nurse(nurse) = &self.details {
            if nurse.experience_years < 0 {
                return Err(ModelError::NegativeExperience);
            }
        }
        Ok(())
    }

    /// Joins a base row with whichever extension row was found for it.
    pub fn assemble(
        base: ProfileRow,
        patient: Option<PatientProfileRow>,
        nurse: Option<NurseProfileRow>,
    ) -> Result<Profile, ModelError> {
        let details = match (base.role, patient, nurse) {
            (Role::Patient, Some(p), None) => ProfileDetails::Patient(p.details),
            (Role::Nurse, None, Some(n)) => ProfileDetails::Nurse(n.details),
            (Role::Patient, _, Some(_)) => {
                return Err(ModelError::RoleMismatch { id: base.id, expected: Role::Patient, found: Role::Nurse })
            }
            (Role::Nurse, Some(_), _) => {
                return Err(ModelError::RoleMismatch { id: base.id, expected: Role::Nurse, found: Role::Patient })
            }
            (role, None, None) => return Err(ModelError::MissingDetails { id: base.id, role }),
        };
        Ok(Profile {
            id: base.id,
            full_name: base.full_name,
            phone: base.phone,
            address: base.address,
            details,
        })
    }
}

/// Per-role totals shown on the landing page.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileCounts {
    pub patients: i64,
    pub nurses: i64,
}

impl ProfileCounts {
    pub fn add(&mut self, role: Role, total: i64) {
        match role {
            Role::Patient => self.patients += total,
            Role::Nurse => self.nurses += total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(role: Role) -> ProfileRow {
        let now = Utc::now();
        ProfileRow {
            id: Uuid::new_v4(),
            role,
            full_name: "Asha".into(),
            phone: None,
            address: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn nurse_row(id: Uuid) -> NurseProfileRow {
        NurseProfileRow {
            id,
            details: NurseDetails {
                qualification: "BSc Nursing".into(),
                experience_years: 4,
                specializations: vec![],
                languages: vec!["en".into()],
            },
        }
    }

    #[test]
    fn assemble_picks_matching_extension() {
        let row = base(Role::Nurse);
        let id = row.id;
        let profile = Profile::assemble(row, None, Some(nurse_row(id))).unwrap();
        assert_eq!(profile.role(), Role::Nurse);
    }

    #[test]
    fn assemble_rejects_cross_role_extension() {
        let row = base(Role::Patient);
        let id = row.id;
        let err = Profile::assemble(row, None, Some(nurse_row(id))).unwrap_err();
        assert_eq!(err, ModelError::RoleMismatch { id, expected: Role::Patient, found: Role::Nurse });
    }

    #[test]
    fn assemble_requires_extension() {
        let row = base(Role::Patient);
        let id = row.id;
        assert_eq!(
            Profile::assemble(row, None, None).unwrap_err(),
            ModelError::MissingDetails { id, role: Role::Patient }
        );
    }

    #[test]
    fn serializes_role_tag_inline() {
        let profile = Profile::patient(Uuid::nil(), "Ravi", PatientDetails::default());
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["role"], "patient");
        assert_eq!(json["full_name"], "Ravi");
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Nurse".parse::<Role>().unwrap(), Role::Nurse);
        assert!("doctor".parse::<Role>().is_err());
    }
}
