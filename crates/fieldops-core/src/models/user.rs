use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

/// Dashboard role. Route guards on the front end key off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Supervisor,
    Officer,
    Viewer,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Supervisor => "Supervisor",
            Role::Officer => "Field Officer",
            Role::Viewer => "Viewer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub field_office: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub last_login: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// "Jane Doe (Field Officer, North District)"
    pub fn summary(&self) -> String {
        match self.field_office {
            Some(ref office) => format!(
                "{} ({}, {})",
                self.full_name(),
                self.role.display_name(),
                office
            ),
            None => format!("{} ({})", self.full_name(), self.role.display_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_from_api() {
        let json = r#"{"id":"u-17","firstName":"Jane","lastName":"Doe","email":"jane@fieldops.test","role":"officer","fieldOffice":"North District","jobTitle":"Inspector","active":true,"lastLogin":"2026-03-02T08:15:00Z"}"#;

        let profile: UserProfile = serde_json::from_str(json).expect("profile should parse");
        assert_eq!(profile.role, Role::Officer);
        assert_eq!(profile.field_office.as_deref(), Some("North District"));
        assert!(profile.last_login.is_some());
        assert_eq!(profile.summary(), "Jane Doe (Field Officer, North District)");
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{"id":"1","firstName":"Sam","lastName":"","email":"sam@fieldops.test","role":"viewer"}"#;

        let profile: UserProfile = serde_json::from_str(json).expect("profile should parse");
        assert!(profile.active);
        assert_eq!(profile.job_title, None);
        assert_eq!(profile.full_name(), "Sam");
        assert_eq!(profile.summary(), "Sam (Viewer)");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let json = r#"{"id":"1","firstName":"A","lastName":"B","email":"a@b.com","role":"root"}"#;
        assert!(serde_json::from_str::<UserProfile>(json).is_err());
    }
}
