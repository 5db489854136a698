use crate::api::{ApiClient, Attribution, Reason, Student};
use crate::config::AttributionConfig;
use crate::error::{ApiError, AttributionError};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

/// Timestamp layout of an attribution, as a French locale renders it
const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Turns a scanned badge payload into a point attribution.
///
/// Holds the student and reason lists fetched from the backend and the last
/// attribution made.
pub struct AttributionDesk {
    client: ApiClient,
    teaching_id: i64,
    timezone: Tz,
    students: Vec<Student>,
    reasons: Vec<Reason>,
    last: Option<Attribution>,
}

impl AttributionDesk {
    pub fn new(client: ApiClient, config: &AttributionConfig) -> Result<Self, AttributionError> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| AttributionError::InvalidTimezone(config.timezone.clone()))?;

        Ok(Self {
            client,
            teaching_id: config.teaching_id,
            timezone,
            students: Vec::new(),
            reasons: Vec::new(),
            last: None,
        })
    }

    /// Fetch reasons and students from the backend
    pub async fn load(&mut self) -> Result<(), ApiError> {
        self.reasons = self.client.reasons().await?;
        self.students = self.client.students().await?;
        Ok(())
    }

    /// Replace the cached lists without contacting the backend
    pub fn set_roster(&mut self, students: Vec<Student>, reasons: Vec<Reason>) {
        self.students = students;
        self.reasons = reasons;
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn reasons(&self) -> &[Reason] {
        &self.reasons
    }

    pub fn reason(&self, id: i64) -> Result<&Reason, AttributionError> {
        self.reasons
            .iter()
            .find(|r| r.id == id)
            .ok_or(AttributionError::UnknownReason(id))
    }

    pub fn last_attribution(&self) -> Option<&Attribution> {
        self.last.as_ref()
    }

    /// Attribute the selected reason to the student whose id is `payload`
    pub async fn handle_scan(
        &mut self,
        payload: &str,
        reason: Option<i64>,
    ) -> Result<Attribution, AttributionError> {
        self.handle_scan_at(payload, reason, Utc::now()).await
    }

    pub(crate) async fn handle_scan_at(
        &mut self,
        payload: &str,
        reason: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Attribution, AttributionError> {
        let attribution = self.prepare(payload, reason, now)?;
        info!(
            "Attributing {} ({}) to student {}",
            attribution.reason, attribution.points, attribution.id_etudiant
        );

        // The attribution stands even if the backend does not acknowledge it
        match self.client.attribute_points(&attribution).await {
            Ok(ack) => debug!("Attribution acknowledged: {}", ack),
            Err(e) => warn!(
                "Attribution for student {} not acknowledged: {}",
                attribution.id_etudiant, e
            ),
        }

        self.last = Some(attribution.clone());
        Ok(attribution)
    }

    fn prepare(
        &self,
        payload: &str,
        reason: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Attribution, AttributionError> {
        let reason = match reason {
            Some(id) => self.reason(id)?,
            None => return Err(AttributionError::NoReasonSelected),
        };

        let student = payload
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|id| self.students.iter().find(|s| s.id == id))
            .ok_or_else(|| AttributionError::StudentNotFound(payload.to_string()))?;

        Ok(Attribution {
            id_etudiant: student.id,
            id_enseignement: self.teaching_id,
            student_name: student.nom.clone(),
            student_level: student.niveau.clone(),
            id_raison: reason.id,
            qr_data: payload.to_string(),
            reason: reason.label.clone(),
            points: reason.points,
            kind: reason.kind.clone(),
            timestamp: now
                .with_timezone(&self.timezone)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        })
    }
}
