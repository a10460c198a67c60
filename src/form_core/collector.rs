use crate::errors::{
    ApiError, EditRefused, FieldError, FieldErrors, GateError, SubmitError, SubmitRejected,
};
use crate::form_core::renderer::EditState;
use crate::form_core::validate::validate_all;
use crate::model::{Audience, FieldValue, FormDefinition, ShareLink, Submission, SubmissionPayload};
use crate::services::api::FormApi;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Editing,
    Submitting,
    Submitted(Submission),
    Unavailable(GateError),
}

/// Share-link constraints echoed by `generate-link`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkConstraints {
    pub expires_at: Option<DateTime<Utc>>,
    pub time_limit: Option<u32>,
}

impl From<&ShareLink> for LinkConstraints {
    fn from(link: &ShareLink) -> Self {
        Self {
            expires_at: link.expires_at,
            time_limit: link.time_limit,
        }
    }
}

/// A validated attempt waiting for the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSubmission {
    pub form_id: String,
    pub audience: Audience,
    pub attempt: u64,
    pub payload: SubmissionPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Submitted(Submission),
    Failed(String),
    Blocked(GateError),
    // Result for an attempt that is no longer current
    Stale,
}

/// Validation and submission state machine for one form instance.
#[derive(Debug, Clone)]
pub struct ResponseCollector {
    form_id: String,
    audience: Audience,
    edit: EditState,
    defaults: BTreeMap<String, FieldValue>,
    phase: Phase,
    errors: FieldErrors,
    last_failure: Option<String>,
    constraints: LinkConstraints,
    opened_at: DateTime<Utc>,
    attempt: u64,
    submitted: u32,
}

impl ResponseCollector {
    pub fn new(
        form_id: impl Into<String>,
        audience: Audience,
        definition: Arc<FormDefinition>,
        defaults: BTreeMap<String, FieldValue>,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let edit = EditState::initialize(definition, &defaults);
        Self {
            form_id: form_id.into(),
            audience,
            edit,
            defaults,
            phase: Phase::Editing,
            errors: FieldErrors::default(),
            last_failure: None,
            constraints: LinkConstraints::default(),
            opened_at,
            attempt: 0,
            submitted: 0,
        }
    }

    pub fn with_constraints(mut self, constraints: LinkConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn preview(mut self) -> Self {
        self.edit.preview = true;
        self
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn audience(&self) -> Audience {
        self.audience
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn edit(&self) -> &EditState {
        &self.edit
    }

    pub fn definition(&self) -> &Arc<FormDefinition> {
        self.edit.definition()
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn field_error(&self, field_id: &str) -> Option<&FieldError> {
        self.errors.get(field_id)
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn is_preview(&self) -> bool {
        self.edit.preview
    }

    /// Values may change only while editing.
    pub fn is_editable(&self) -> bool {
        matches!(self.phase, Phase::Editing)
    }

    #[allow(dead_code)]
    pub fn submitted_count(&self) -> u32 {
        self.submitted
    }

    pub fn set_value(&mut self, field_id: &str, value: FieldValue) -> Result<(), EditRefused> {
        if !self.is_editable() {
            return Err(EditRefused::Locked);
        }
        self.edit.set_value(field_id, value)?;
        self.errors.remove(field_id);
        Ok(())
    }

    pub fn clear_value(&mut self, field_id: &str) -> Result<(), EditRefused> {
        if !self.is_editable() {
            return Err(EditRefused::Locked);
        }
        self.edit.clear(field_id)?;
        self.errors.remove(field_id);
        Ok(())
    }

    /// Link expiry and time limit; the link's limit wins over the form's own setting.
    pub fn check_gate(&self, now: DateTime<Utc>) -> Result<(), GateError> {
        if let Some(exp) = self.constraints.expires_at {
            if now > exp {
                return Err(GateError::LinkExpired);
            }
        }
        let limit = self
            .constraints
            .time_limit
            .or(self.edit.definition().advanced.time_limit)
            .filter(|m| *m > 0);
        if let Some(minutes) = limit {
            if now - self.opened_at > Duration::minutes(i64::from(minutes)) {
                return Err(GateError::TimeLimitExceeded(minutes));
            }
        }
        Ok(())
    }

    /// Gate check at open time; an expired link blocks the session immediately.
    pub fn open(&mut self, now: DateTime<Utc>) -> Result<(), GateError> {
        if let Err(g) = self.check_gate(now) {
            self.phase = Phase::Unavailable(g.clone());
            return Err(g);
        }
        Ok(())
    }

    /// Editing → Validating → Submitting. Every field is checked before deciding.
    pub fn begin_submit(&mut self, now: DateTime<Utc>) -> Result<PendingSubmission, SubmitRejected> {
        if self.edit.preview {
            return Err(SubmitRejected::Preview);
        }
        match &self.phase {
            Phase::Editing => {}
            Phase::Submitting => return Err(SubmitRejected::InFlight),
            Phase::Submitted(_) => {
                if self.edit.definition().advanced.allow_multiple_attempts {
                    return Err(SubmitRejected::RestartRequired);
                }
                let g = GateError::AttemptsExhausted;
                self.phase = Phase::Unavailable(g.clone());
                return Err(SubmitRejected::Gate(g));
            }
            Phase::Unavailable(g) => return Err(SubmitRejected::Gate(g.clone())),
        }
        if let Err(g) = self.check_gate(now) {
            self.phase = Phase::Unavailable(g.clone());
            return Err(SubmitRejected::Gate(g));
        }
        let errors = validate_all(self.edit.definition(), self.edit.values());
        if !errors.is_empty() {
            tracing::debug!(form = %self.form_id, count = errors.len(), "submission invalid");
            self.errors = errors.clone();
            return Err(SubmitRejected::Invalid(errors));
        }
        self.errors = FieldErrors::default();
        self.last_failure = None;
        self.phase = Phase::Submitting;
        self.attempt += 1;
        Ok(PendingSubmission {
            form_id: self.form_id.clone(),
            audience: self.audience,
            attempt: self.attempt,
            payload: SubmissionPayload {
                data: self.edit.payload_data(),
            },
        })
    }

    /// Apply the backend's answer for `attempt`.
    pub fn complete(&mut self, attempt: u64, result: Result<Submission, ApiError>) -> Completion {
        match result {
            Ok(sub) => self.succeed(attempt, sub),
            Err(e) => self.fail(attempt, &e),
        }
    }

    fn is_current(&self, attempt: u64) -> bool {
        let current = attempt == self.attempt && self.phase == Phase::Submitting;
        if !current {
            tracing::debug!(form = %self.form_id, attempt, "dropping stale submit result");
        }
        current
    }

    fn succeed(&mut self, attempt: u64, sub: Submission) -> Completion {
        if !self.is_current(attempt) {
            return Completion::Stale;
        }
        tracing::info!(form = %self.form_id, submission = %sub.id, "submitted");
        self.submitted += 1;
        self.phase = Phase::Submitted(sub.clone());
        Completion::Submitted(sub)
    }

    fn fail(&mut self, attempt: u64, e: &ApiError) -> Completion {
        if !self.is_current(attempt) {
            return Completion::Stale;
        }
        if e.is_terminal() {
            let g = GateError::Refused(e.to_string());
            self.phase = Phase::Unavailable(g.clone());
            return Completion::Blocked(g);
        }
        tracing::warn!(form = %self.form_id, error = %e, "submit failed");
        let msg = e.to_string();
        self.phase = Phase::Editing;
        self.last_failure = Some(msg.clone());
        Completion::Failed(msg)
    }

    /// Start a new response after a successful one, when the form allows it.
    pub fn restart(&mut self) -> Result<(), SubmitRejected> {
        match &self.phase {
            Phase::Submitted(_) if self.edit.definition().advanced.allow_multiple_attempts => {
                let preview = self.edit.preview;
                self.edit = EditState::initialize(self.edit.definition().clone(), &self.defaults);
                self.edit.preview = preview;
                self.phase = Phase::Editing;
                self.errors = FieldErrors::default();
                self.last_failure = None;
                Ok(())
            }
            Phase::Submitted(_) => Err(SubmitRejected::Gate(GateError::AttemptsExhausted)),
            Phase::Submitting => Err(SubmitRejected::InFlight),
            Phase::Unavailable(g) => Err(SubmitRejected::Gate(g.clone())),
            Phase::Editing => Ok(()),
        }
    }

    /// Synchronous submit through `api`.
    pub fn submit(&mut self, api: &dyn FormApi, now: DateTime<Utc>) -> Result<Submission, SubmitError> {
        let pending = self.begin_submit(now)?;
        match api.submit(&pending.form_id, pending.audience, &pending.payload) {
            Ok(sub) => {
                self.succeed(pending.attempt, sub.clone());
                Ok(sub)
            }
            Err(e) => {
                self.fail(pending.attempt, &e);
                Err(SubmitError::Api(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, FieldType, Section};
    use crate::services::memory_api::MemoryFormApi;

    fn contact(allow_multiple: bool) -> Arc<FormDefinition> {
        let mut def = FormDefinition::new("Contact").with_sections(vec![Section::new("s1", "Info")
            .with_fields(vec![Field::new("f1", FieldType::Email, "Email").required()])]);
        def.advanced.allow_multiple_attempts = allow_multiple;
        Arc::new(def)
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn collector(def: Arc<FormDefinition>) -> ResponseCollector {
        ResponseCollector::new("contact", Audience::Member, def, BTreeMap::new(), now())
    }

    #[test]
    fn contact_scenario_invalid_then_submitted() {
        let api = MemoryFormApi::default();
        api.seed("contact", (*contact(false)).clone());
        let mut c = collector(contact(false));

        c.set_value("f1", FieldValue::text("not-an-email")).unwrap();
        match c.submit(&api, now()) {
            Err(SubmitError::Rejected(SubmitRejected::Invalid(errs))) => {
                assert_eq!(errs.len(), 1);
                assert_eq!(errs.get("f1").map(|e| e.to_string()).as_deref(), Some("invalid email"));
            }
            other => panic!("expected invalid, got {other:?}"),
        }
        assert_eq!(c.phase(), &Phase::Editing);
        assert_eq!(api.submit_calls(), 0);

        c.set_value("f1", FieldValue::text("a@b.com")).unwrap();
        assert!(c.errors().is_empty());
        let sub = c.submit(&api, now()).unwrap();
        assert_eq!(sub.data.len(), 1);
        assert_eq!(sub.data.get("f1"), Some(&FieldValue::text("a@b.com")));
        assert!(matches!(c.phase(), Phase::Submitted(_)));
    }

    #[test]
    fn second_attempt_is_blocked_without_calling_the_api() {
        let api = MemoryFormApi::default();
        api.seed("contact", (*contact(false)).clone());
        let mut c = collector(contact(false));
        c.set_value("f1", FieldValue::text("a@b.com")).unwrap();
        c.submit(&api, now()).unwrap();
        assert_eq!(api.submit_calls(), 1);

        let err = c.submit(&api, now()).unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Rejected(SubmitRejected::Gate(GateError::AttemptsExhausted))
        ));
        assert_eq!(api.submit_calls(), 1);
        assert_eq!(c.phase(), &Phase::Unavailable(GateError::AttemptsExhausted));
        assert_eq!(c.restart(), Err(SubmitRejected::Gate(GateError::AttemptsExhausted)));
    }

    #[test]
    fn multiple_attempts_require_restart() {
        let api = MemoryFormApi::default();
        api.seed("contact", (*contact(true)).clone());
        let mut c = collector(contact(true));
        c.set_value("f1", FieldValue::text("a@b.com")).unwrap();
        c.submit(&api, now()).unwrap();
        assert!(matches!(
            c.submit(&api, now()),
            Err(SubmitError::Rejected(SubmitRejected::RestartRequired))
        ));
        assert_eq!(c.set_value("f1", FieldValue::text("x@y.io")), Err(EditRefused::Locked));
        c.restart().unwrap();
        assert_eq!(c.edit().value("f1"), None);
        c.set_value("f1", FieldValue::text("x@y.io")).unwrap();
        c.submit(&api, now()).unwrap();
        assert_eq!(c.submitted_count(), 2);
        assert_eq!(api.responses("contact").len(), 2);
    }

    #[test]
    fn reentrant_submit_is_rejected_and_edits_are_locked() {
        let mut c = collector(contact(false));
        c.set_value("f1", FieldValue::text("a@b.com")).unwrap();
        let pending = c.begin_submit(now()).unwrap();
        assert_eq!(pending.attempt, 1);
        assert_eq!(c.begin_submit(now()), Err(SubmitRejected::InFlight));
        assert_eq!(c.set_value("f1", FieldValue::text("z@z.io")), Err(EditRefused::Locked));
        // a stale attempt number is ignored
        assert_eq!(
            c.complete(7, Err(ApiError::Unavailable("late".into()))),
            Completion::Stale
        );
        assert_eq!(c.phase(), &Phase::Submitting);
    }

    #[test]
    fn transport_failure_returns_to_editing_with_values() {
        let api = MemoryFormApi::default();
        api.seed("contact", (*contact(false)).clone());
        api.fail_next_submits(1);
        let mut c = collector(contact(false));
        c.set_value("f1", FieldValue::text("a@b.com")).unwrap();
        assert!(matches!(c.submit(&api, now()), Err(SubmitError::Api(_))));
        assert_eq!(c.phase(), &Phase::Editing);
        assert_eq!(c.edit().value("f1"), Some(&FieldValue::text("a@b.com")));
        assert!(c.last_failure().is_some());
        assert!(c.errors().is_empty());
        c.submit(&api, now()).unwrap();
    }

    #[test]
    fn preview_never_submits() {
        let mut c = collector(contact(false)).preview();
        c.set_value("f1", FieldValue::text("a@b.com")).unwrap();
        assert_eq!(c.begin_submit(now()), Err(SubmitRejected::Preview));
        assert_eq!(c.phase(), &Phase::Editing);
    }

    #[test]
    fn expired_link_and_time_limit_block() {
        let mut c = collector(contact(false)).with_constraints(LinkConstraints {
            expires_at: Some(now() - Duration::minutes(1)),
            time_limit: None,
        });
        assert_eq!(c.open(now()), Err(GateError::LinkExpired));
        assert_eq!(c.phase(), &Phase::Unavailable(GateError::LinkExpired));

        let mut c = collector(contact(false)).with_constraints(LinkConstraints {
            expires_at: None,
            time_limit: Some(10),
        });
        c.open(now()).unwrap();
        c.set_value("f1", FieldValue::text("a@b.com")).unwrap();
        let late = now() + Duration::minutes(11);
        assert_eq!(
            c.begin_submit(late),
            Err(SubmitRejected::Gate(GateError::TimeLimitExceeded(10)))
        );
        assert_eq!(c.phase(), &Phase::Unavailable(GateError::TimeLimitExceeded(10)));
    }

    #[test]
    fn form_time_limit_applies_without_link() {
        let mut def = (*contact(false)).clone();
        def.advanced.time_limit = Some(5);
        let mut c = collector(Arc::new(def));
        c.set_value("f1", FieldValue::text("a@b.com")).unwrap();
        assert!(c.begin_submit(now() + Duration::minutes(4)).is_ok());
    }

    #[test]
    fn payload_keys_match_fields_with_values() {
        let def = Arc::new(FormDefinition::new("F").with_sections(vec![Section::new("s", "S")
            .with_fields(vec![
                Field::new("a", FieldType::Text, "A"),
                Field::new("b", FieldType::Text, "B"),
                Field::new("c", FieldType::Number, "C"),
            ])]));
        let mut c = collector(def);
        c.set_value("a", FieldValue::text("x")).unwrap();
        c.set_value("c", FieldValue::text("2")).unwrap();
        let p = c.begin_submit(now()).unwrap();
        let keys: Vec<&str> = p.payload.data.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(p.payload.data.get("c"), Some(&FieldValue::Number(2.0)));
    }
}
