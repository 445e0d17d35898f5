//! The built-in role policy map.
//!
//! This table is the only place the capability sets of `admin`, `teacher`
//! and `student` are defined. Seeding, lazy role creation and per-user
//! assignment all read from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bumped whenever the grants below change. Stamped onto built-in role rows
/// so a stored capability set can be traced back to the map that wrote it.
pub const POLICY_VERSION: i32 = 1;

pub const VIEW_STUDENT_DATA: &str = "view_student_data";
pub const MANAGE_COURSES: &str = "manage_courses";
pub const GENERATE_TEACHING_CONTENT: &str = "generate_teaching_content";

/// Capabilities held by teachers. Also the fallback table consulted for
/// teacher accounts that predate the `role` table.
pub const TEACHER_CAPABILITIES: &[&str] =
    &[VIEW_STUDENT_DATA, MANAGE_COURSES, GENERATE_TEACHING_CONTENT];

/// Module that owns accounts, roles and the teaching capabilities.
pub const USERS_MODULE: &str = "users";

/// What a built-in role is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// The full capability catalogue.
    All,
    /// Exactly these codenames (in any module).
    Codenames(&'static [&'static str]),
    /// No direct grants.
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinRole {
    Admin,
    Teacher,
    Student,
}

/// The role assigned to accounts created without one.
pub const DEFAULT_ROLE: BuiltinRole = BuiltinRole::Student;

impl BuiltinRole {
    pub const ALL: [BuiltinRole; 3] = [Self::Admin, Self::Teacher, Self::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    /// Returns `None` for custom role names.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Admin => "Administrator role with every capability",
            Self::Teacher => {
                "Teacher role: view student data, manage courses and generate teaching content"
            }
            Self::Student => "Student role with restricted basic access",
        }
    }

    pub fn grant(&self) -> Grant {
        match self {
            Self::Admin => Grant::All,
            Self::Teacher => Grant::Codenames(TEACHER_CAPABILITIES),
            Self::Student => Grant::Nothing,
        }
    }
}

impl fmt::Display for BuiltinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("'{s}' is not a built-in role"))
    }
}

/// Description given to roles created on demand for a non-built-in name.
pub fn custom_role_description(name: &str) -> String {
    format!("Custom role: {name}")
}

/// Description for any role name, built-in or custom.
pub fn describe(name: &str) -> String {
    match BuiltinRole::from_name(name) {
        Some(builtin) => builtin.description().to_string(),
        None => custom_role_description(name),
    }
}
