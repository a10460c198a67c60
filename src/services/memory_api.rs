use crate::errors::ApiError;
use crate::model::{
    Audience, Field, FieldType, FormDefinition, LinkRequest, Section, ShareLink, Submission,
    SubmissionPayload,
};
use crate::services::api::FormApi;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Stored {
    layout: Option<FormDefinition>,
    responses: Vec<Submission>,
}

#[derive(Default)]
struct Inner {
    forms: HashMap<String, Stored>,
    next_id: u64,
    fail_submits: u32,
    submit_calls: usize,
}

/// In-process backend for the demo mode, headless runs and tests.
#[derive(Default)]
pub struct MemoryFormApi {
    inner: Mutex<Inner>,
}

impl MemoryFormApi {
    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ApiError> {
        self.inner
            .lock()
            .map_err(|_| ApiError::Unavailable("memory store lock poisoned".into()))
    }

    /// Store `def` as the layout of `form_id`, assigning a layout id when missing.
    pub fn seed(&self, form_id: &str, mut def: FormDefinition) {
        if let Ok(mut inner) = self.lock() {
            if def.id.is_none() {
                inner.next_id += 1;
                def.id = Some(format!("layout-{}", inner.next_id));
            }
            inner.forms.entry(form_id.to_string()).or_default().layout = Some(def);
        }
    }

    /// Make the next `n` submits fail with a transport-style error.
    #[allow(dead_code)]
    pub fn fail_next_submits(&self, n: u32) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_submits = n;
        }
    }

    pub fn submit_calls(&self) -> usize {
        self.lock().map(|i| i.submit_calls).unwrap_or(0)
    }

    pub fn responses(&self, form_id: &str) -> Vec<Submission> {
        self.lock()
            .ok()
            .and_then(|i| i.forms.get(form_id).map(|s| s.responses.clone()))
            .unwrap_or_default()
    }

    /// A backend preloaded with the sample forms used by `FORMDESK_DEMO=1`.
    pub fn demo() -> Self {
        let api = Self::default();
        api.seed("contact", demo_contact_form());
        api.seed("feedback", demo_feedback_form());
        api
    }
}

pub fn demo_contact_form() -> FormDefinition {
    FormDefinition::new("Contact")
        .with_sections(vec![Section::new("s1", "Info").with_fields(vec![
            Field::new("name", FieldType::Text, "Name").required(),
            Field::new("email", FieldType::Email, "Email").required(),
            Field::new("phone", FieldType::Tel, "Phone"),
        ])])
}

pub fn demo_feedback_form() -> FormDefinition {
    let mut comments = Field::new("comments", FieldType::Textarea, "Comments");
    comments.rows = Some(4);
    comments.max = Some(500.0);
    let mut def = FormDefinition::new("Product feedback").with_sections(vec![
        Section::new("about", "About you").with_fields(vec![
            Field::new("name", FieldType::Text, "Name"),
            Field::new("email", FieldType::Email, "Email"),
        ]),
        Section::new("rating", "Rating").with_fields(vec![
            Field::new("score", FieldType::Number, "Score (1-5)")
                .required()
                .with_range(Some(1.0), Some(5.0)),
            Field::new("area", FieldType::Select, "Area")
                .with_options(["Billing", "Support", "Product"]),
            Field::new("channels", FieldType::Checkbox, "Contact me via")
                .with_options(["Email", "Phone"]),
            Field::new("visited", FieldType::Date, "Visit date"),
            comments,
        ]),
    ]);
    def.description = Some("Tell us how we are doing.".into());
    def.advanced.allow_multiple_attempts = true;
    def
}

impl FormApi for MemoryFormApi {
    fn fetch_layout(&self, form_id: &str, _audience: Audience) -> Result<FormDefinition, ApiError> {
        let inner = self.lock()?;
        inner
            .forms
            .get(form_id)
            .and_then(|s| s.layout.clone())
            .ok_or_else(|| ApiError::NotFound(form_id.to_string()))
    }

    fn create_layout(
        &self,
        form_id: &str,
        def: &FormDefinition,
    ) -> Result<FormDefinition, ApiError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let mut saved = def.clone();
        saved.id = Some(format!("layout-{}", inner.next_id));
        inner.forms.entry(form_id.to_string()).or_default().layout = Some(saved.clone());
        Ok(saved)
    }

    fn update_layout(
        &self,
        form_id: &str,
        def: &FormDefinition,
    ) -> Result<FormDefinition, ApiError> {
        let mut inner = self.lock()?;
        let stored = inner
            .forms
            .get_mut(form_id)
            .filter(|s| s.layout.is_some())
            .ok_or_else(|| ApiError::NotFound(form_id.to_string()))?;
        stored.layout = Some(def.clone());
        Ok(def.clone())
    }

    fn list_responses(&self, form_id: &str) -> Result<Vec<Submission>, ApiError> {
        let inner = self.lock()?;
        inner
            .forms
            .get(form_id)
            .map(|s| s.responses.clone())
            .ok_or_else(|| ApiError::NotFound(form_id.to_string()))
    }

    fn submit(
        &self,
        form_id: &str,
        _audience: Audience,
        payload: &SubmissionPayload,
    ) -> Result<Submission, ApiError> {
        let mut inner = self.lock()?;
        inner.submit_calls += 1;
        if inner.fail_submits > 0 {
            inner.fail_submits -= 1;
            return Err(ApiError::Unavailable("simulated outage".into()));
        }
        inner.next_id += 1;
        let sub = Submission {
            id: format!("resp-{}", inner.next_id),
            submitted_at: Utc::now(),
            data: payload.data.clone(),
        };
        let stored = inner
            .forms
            .get_mut(form_id)
            .ok_or_else(|| ApiError::NotFound(form_id.to_string()))?;
        stored.responses.push(sub.clone());
        Ok(sub)
    }

    fn generate_link(&self, form_id: &str, req: &LinkRequest) -> Result<ShareLink, ApiError> {
        let inner = self.lock()?;
        if !inner.forms.contains_key(form_id) {
            return Err(ApiError::NotFound(form_id.to_string()));
        }
        Ok(ShareLink {
            url: format!("memory://form-guard/{form_id}"),
            expires_at: req.expires_at,
            time_limit: req.time_limit,
        })
    }
}
