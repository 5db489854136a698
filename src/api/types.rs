use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Student row as served by `/display`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    pub niveau: String,
    pub points: i64,
    pub status: String,
    #[serde(rename = "lastActivity", default)]
    pub last_activity: Option<LastActivity>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.prenom, self.nom)
    }
}

/// Last activity as the server sends it: epoch milliseconds or a date string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LastActivity {
    Millis(i64),
    Text(String),
}

impl LastActivity {
    /// Parse into a UTC instant. Strings without an offset are read as UTC.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            LastActivity::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            LastActivity::Text(text) => parse_activity_text(text.trim()),
        }
    }

    /// `dd/mm/YYYY`, or the raw text when it cannot be parsed
    pub fn display_date(&self) -> String {
        match (self.to_datetime(), self) {
            (Some(at), _) => at.format("%d/%m/%Y").to_string(),
            (None, LastActivity::Text(text)) => text.clone(),
            (None, LastActivity::Millis(ms)) => ms.to_string(),
        }
    }
}

fn parse_activity_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Reason as served by `/display_raison`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub id: i64,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub points: i64,
}

impl Reason {
    pub fn is_bonus(&self) -> bool {
        self.kind == "bonus"
    }

    /// Signed point value as shown to the operator, e.g. `+2 pts`
    pub fn points_label(&self) -> String {
        if self.points > 0 {
            format!("+{} pts", self.points)
        } else {
            format!("{} pts", self.points)
        }
    }
}

/// Body of `POST /attribuer_point`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub id_etudiant: i64,
    pub id_enseignement: i64,
    #[serde(rename = "studentName")]
    pub student_name: String,
    #[serde(rename = "studentLevel")]
    pub student_level: String,
    pub id_raison: i64,
    #[serde(rename = "qrData")]
    pub qr_data: String,
    pub reason: String,
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
}
