use crate::errors::{BuilderError, SaveError, SchemaError};
use crate::form_core::validate::{validate_definition, validate_field_schema};
use crate::model::{Field, FieldType, FieldValue, FormDefinition, Section};
use crate::services::api::FormApi;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Partial update for one field. `Some(None)` clears an optional attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldPatch {
    pub id: Option<String>,
    pub kind: Option<FieldType>,
    pub label: Option<String>,
    pub placeholder: Option<Option<String>>,
    pub required: Option<bool>,
    pub options: Option<Vec<String>>,
    pub min: Option<Option<f64>>,
    pub max: Option<Option<f64>>,
    pub rows: Option<Option<u16>>,
    pub default_value: Option<Option<FieldValue>>,
    pub image: Option<Option<String>>,
}

impl FieldPatch {
    fn apply_to(&self, f: &mut Field) {
        if let Some(v) = &self.id {
            f.id = v.clone();
        }
        if let Some(v) = self.kind {
            f.kind = v;
        }
        if let Some(v) = &self.label {
            f.label = v.clone();
        }
        if let Some(v) = &self.placeholder {
            f.placeholder = v.clone();
        }
        if let Some(v) = self.required {
            f.required = v;
        }
        if let Some(v) = &self.options {
            f.options = v.clone();
        }
        if let Some(v) = self.min {
            f.min = v;
        }
        if let Some(v) = self.max {
            f.max = v;
        }
        if let Some(v) = self.rows {
            f.rows = v;
        }
        if let Some(v) = &self.default_value {
            f.default_value = v.clone();
        }
        if let Some(v) = &self.image {
            f.image = v.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SectionPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub image: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormMetaPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub proctored: Option<bool>,
    pub time_limit: Option<Option<u32>>,
    pub allow_multiple_attempts: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuilderCommand {
    AddSection {
        section: Section,
    },
    RemoveSection {
        id: String,
    },
    ReorderSections {
        order: Vec<String>,
    },
    UpdateSection {
        id: String,
        patch: SectionPatch,
    },
    AddField {
        section_id: String,
        field: Field,
    },
    RemoveField {
        section_id: String,
        field_id: String,
    },
    ReorderFields {
        section_id: String,
        order: Vec<String>,
    },
    UpdateField {
        section_id: String,
        field_id: String,
        patch: FieldPatch,
    },
    UpdateFormMeta(FormMetaPatch),
}

/// Full-replace save request produced from the current draft.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub form_id: String,
    pub definition: FormDefinition,
    // No server id yet: POST instead of PATCH
    pub create: bool,
}

/// Authoring surface over a local draft; edits accumulate until `save`.
#[derive(Debug, Clone)]
pub struct FormBuilder {
    form_id: String,
    draft: FormDefinition,
    journal: Vec<BuilderCommand>,
    // Set between begin_save and finish_save/abort_save; the draft is frozen meanwhile
    saving: bool,
}

impl FormBuilder {
    pub fn new(form_id: impl Into<String>, draft: FormDefinition) -> Self {
        Self {
            form_id: form_id.into(),
            draft,
            journal: Vec::new(),
            saving: false,
        }
    }

    /// A fresh definition for a form that has no layout yet.
    pub fn blank(form_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(form_id, FormDefinition::new(title))
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn draft(&self) -> &FormDefinition {
        &self.draft
    }

    /// Unsaved commands, oldest first.
    pub fn journal(&self) -> &[BuilderCommand] {
        &self.journal
    }

    pub fn is_dirty(&self) -> bool {
        !self.journal.is_empty()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Independent copy for preview or publishing; later edits do not reach it.
    pub fn snapshot(&self) -> Arc<FormDefinition> {
        Arc::new(self.draft.clone())
    }

    fn section_ids(&self) -> HashSet<&str> {
        self.draft.sections.iter().map(|s| s.id.as_str()).collect()
    }

    fn field_ids(&self) -> HashSet<&str> {
        self.draft.fields().map(|f| f.id.as_str()).collect()
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let taken: HashSet<&str> = self.section_ids().union(&self.field_ids()).copied().collect();
        loop {
            let raw = Uuid::new_v4().simple().to_string();
            let id = format!("{prefix}-{}", &raw[..8]);
            if !taken.contains(id.as_str()) {
                return id;
            }
        }
    }

    fn section_mut(&mut self, id: &str) -> Result<&mut Section, BuilderError> {
        self.draft
            .sections
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| BuilderError::UnknownSection(id.to_string()))
    }

    /// Single mutation entry point; a command that changes nothing is not journaled.
    pub fn apply(&mut self, cmd: BuilderCommand) -> Result<(), BuilderError> {
        if self.saving {
            return Err(BuilderError::SaveInProgress);
        }
        let before = self.draft.clone();
        self.apply_inner(&cmd)?;
        if self.draft != before {
            tracing::debug!(form = %self.form_id, ?cmd, "builder command");
            self.journal.push(cmd);
        }
        Ok(())
    }

    fn apply_inner(&mut self, cmd: &BuilderCommand) -> Result<(), BuilderError> {
        match cmd {
            BuilderCommand::AddSection { section } => {
                if section.id.is_empty() {
                    return Err(SchemaError::EmptyId.into());
                }
                if self.section_ids().contains(section.id.as_str()) {
                    return Err(BuilderError::DuplicateId(section.id.clone()));
                }
                if section.title.trim().is_empty() {
                    return Err(SchemaError::EmptySectionTitle(section.id.clone()).into());
                }
                let mut taken = self.field_ids();
                for f in &section.fields {
                    validate_field_schema(f)?;
                    if !taken.insert(f.id.as_str()) {
                        return Err(BuilderError::DuplicateId(f.id.clone()));
                    }
                }
                self.draft.sections.push(section.clone());
            }
            BuilderCommand::RemoveSection { id } => {
                let idx = self
                    .draft
                    .sections
                    .iter()
                    .position(|s| &s.id == id)
                    .ok_or_else(|| BuilderError::UnknownSection(id.clone()))?;
                self.draft.sections.remove(idx);
            }
            BuilderCommand::ReorderSections { order } => {
                let current: Vec<&str> = self.draft.sections.iter().map(|s| s.id.as_str()).collect();
                check_permutation(&current, order)?;
                let mut rest = std::mem::take(&mut self.draft.sections);
                for id in order {
                    if let Some(pos) = rest.iter().position(|s| &s.id == id) {
                        self.draft.sections.push(rest.remove(pos));
                    }
                }
            }
            BuilderCommand::UpdateSection { id, patch } => {
                let section = self.section_mut(id)?;
                if let Some(t) = &patch.title {
                    if t.trim().is_empty() {
                        return Err(SchemaError::EmptySectionTitle(id.clone()).into());
                    }
                    section.title = t.clone();
                }
                if let Some(d) = &patch.description {
                    section.description = d.clone();
                }
                if let Some(i) = &patch.image {
                    section.image = i.clone();
                }
            }
            BuilderCommand::AddField { section_id, field } => {
                validate_field_schema(field)?;
                if self.field_ids().contains(field.id.as_str()) {
                    return Err(BuilderError::DuplicateId(field.id.clone()));
                }
                self.section_mut(section_id)?.fields.push(field.clone());
            }
            BuilderCommand::RemoveField {
                section_id,
                field_id,
            } => {
                let section = self.section_mut(section_id)?;
                let idx = section
                    .fields
                    .iter()
                    .position(|f| &f.id == field_id)
                    .ok_or_else(|| BuilderError::UnknownField {
                        section: section_id.clone(),
                        field: field_id.clone(),
                    })?;
                section.fields.remove(idx);
            }
            BuilderCommand::ReorderFields { section_id, order } => {
                let section = self.section_mut(section_id)?;
                let current: Vec<&str> = section.fields.iter().map(|f| f.id.as_str()).collect();
                check_permutation(&current, order)?;
                let mut rest = std::mem::take(&mut section.fields);
                for id in order {
                    if let Some(pos) = rest.iter().position(|f| &f.id == id) {
                        section.fields.push(rest.remove(pos));
                    }
                }
            }
            BuilderCommand::UpdateField {
                section_id,
                field_id,
                patch,
            } => {
                if let Some(new_id) = &patch.id {
                    if new_id != field_id && self.field_ids().contains(new_id.as_str()) {
                        return Err(BuilderError::DuplicateId(new_id.clone()));
                    }
                }
                let section = self.section_mut(section_id)?;
                let field = section
                    .fields
                    .iter_mut()
                    .find(|f| &f.id == field_id)
                    .ok_or_else(|| BuilderError::UnknownField {
                        section: section_id.clone(),
                        field: field_id.clone(),
                    })?;
                let mut candidate = field.clone();
                patch.apply_to(&mut candidate);
                validate_field_schema(&candidate)?;
                *field = candidate;
            }
            BuilderCommand::UpdateFormMeta(patch) => {
                if let Some(t) = &patch.title {
                    if t.trim().is_empty() {
                        return Err(SchemaError::EmptyTitle.into());
                    }
                    self.draft.title = t.clone();
                }
                if let Some(d) = &patch.description {
                    self.draft.description = d.clone();
                }
                if let Some(p) = patch.proctored {
                    self.draft.advanced.proctored = p;
                }
                if let Some(t) = patch.time_limit {
                    self.draft.advanced.time_limit = t;
                }
                if let Some(m) = patch.allow_multiple_attempts {
                    self.draft.advanced.allow_multiple_attempts = m;
                }
            }
        }
        Ok(())
    }

    pub fn add_section(&mut self, title: impl Into<String>) -> Result<String, BuilderError> {
        let id = self.fresh_id("s");
        let section = Section::new(id.clone(), title);
        self.apply(BuilderCommand::AddSection { section })?;
        Ok(id)
    }

    pub fn remove_section(&mut self, id: &str) -> Result<(), BuilderError> {
        self.apply(BuilderCommand::RemoveSection { id: id.to_string() })
    }

    pub fn reorder_sections(&mut self, order: Vec<String>) -> Result<(), BuilderError> {
        self.apply(BuilderCommand::ReorderSections { order })
    }

    pub fn update_section(&mut self, id: &str, patch: SectionPatch) -> Result<(), BuilderError> {
        self.apply(BuilderCommand::UpdateSection {
            id: id.to_string(),
            patch,
        })
    }

    /// Append a new field of `kind`; choice types start with one placeholder option.
    pub fn add_field(&mut self, section_id: &str, kind: FieldType) -> Result<String, BuilderError> {
        let id = self.fresh_id("f");
        let mut field = Field::new(id.clone(), kind, "Untitled question");
        if kind.needs_options() {
            field.options = vec!["Option 1".to_string()];
        }
        self.apply(BuilderCommand::AddField {
            section_id: section_id.to_string(),
            field,
        })?;
        Ok(id)
    }

    pub fn remove_field(&mut self, section_id: &str, field_id: &str) -> Result<(), BuilderError> {
        self.apply(BuilderCommand::RemoveField {
            section_id: section_id.to_string(),
            field_id: field_id.to_string(),
        })
    }

    pub fn reorder_fields(&mut self, section_id: &str, order: Vec<String>) -> Result<(), BuilderError> {
        self.apply(BuilderCommand::ReorderFields {
            section_id: section_id.to_string(),
            order,
        })
    }

    pub fn update_field(
        &mut self,
        section_id: &str,
        field_id: &str,
        patch: FieldPatch,
    ) -> Result<(), BuilderError> {
        self.apply(BuilderCommand::UpdateField {
            section_id: section_id.to_string(),
            field_id: field_id.to_string(),
            patch,
        })
    }

    pub fn update_form_meta(&mut self, patch: FormMetaPatch) -> Result<(), BuilderError> {
        self.apply(BuilderCommand::UpdateFormMeta(patch))
    }

    /// Move a section one or more steps; clamps at the ends.
    pub fn move_section(&mut self, id: &str, delta: isize) -> Result<(), BuilderError> {
        let mut order: Vec<String> = self.draft.sections.iter().map(|s| s.id.clone()).collect();
        let from = order
            .iter()
            .position(|s| s == id)
            .ok_or_else(|| BuilderError::UnknownSection(id.to_string()))?;
        shift(&mut order, from, delta);
        self.reorder_sections(order)
    }

    pub fn move_field(&mut self, section_id: &str, field_id: &str, delta: isize) -> Result<(), BuilderError> {
        let section = self
            .draft
            .section(section_id)
            .ok_or_else(|| BuilderError::UnknownSection(section_id.to_string()))?;
        let mut order: Vec<String> = section.fields.iter().map(|f| f.id.clone()).collect();
        let from = order
            .iter()
            .position(|f| f == field_id)
            .ok_or_else(|| BuilderError::UnknownField {
                section: section_id.to_string(),
                field: field_id.to_string(),
            })?;
        shift(&mut order, from, delta);
        self.reorder_fields(section_id, order)
    }

    /// Validate the draft and describe the create-or-update call that persists it.
    pub fn prepare_save(&self) -> Result<SaveRequest, SchemaError> {
        validate_definition(&self.draft)?;
        Ok(SaveRequest {
            form_id: self.form_id.clone(),
            definition: self.draft.clone(),
            create: self.draft.id.is_none(),
        })
    }

    /// Freeze the draft until the outstanding save is finished or aborted.
    pub fn begin_save(&mut self) -> Result<SaveRequest, SaveError> {
        if self.saving {
            return Err(SaveError::InProgress);
        }
        let req = self.prepare_save()?;
        self.saving = true;
        Ok(req)
    }

    /// Adopt the server's copy after a successful save.
    pub fn finish_save(&mut self, saved: FormDefinition) {
        tracing::info!(form = %self.form_id, layout = ?saved.id, commands = self.journal.len(), "layout saved");
        self.draft = saved;
        self.journal.clear();
        self.saving = false;
    }

    /// The save failed; the draft and its journal stay as they were.
    pub fn abort_save(&mut self) {
        self.saving = false;
    }

    pub fn save(&mut self, api: &dyn FormApi) -> Result<FormDefinition, SaveError> {
        let req = self.begin_save()?;
        let result = if req.create {
            api.create_layout(&req.form_id, &req.definition)
        } else {
            api.update_layout(&req.form_id, &req.definition)
        };
        match result {
            Ok(saved) => {
                self.finish_save(saved.clone());
                Ok(saved)
            }
            Err(e) => {
                self.abort_save();
                Err(e.into())
            }
        }
    }
}

fn check_permutation(current: &[&str], order: &[String]) -> Result<(), BuilderError> {
    if current.len() != order.len() {
        return Err(BuilderError::NotAPermutation);
    }
    let want: HashSet<&str> = current.iter().copied().collect();
    let got: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
    if want != got || got.len() != order.len() {
        return Err(BuilderError::NotAPermutation);
    }
    Ok(())
}

fn shift(order: &mut Vec<String>, from: usize, delta: isize) {
    if order.is_empty() {
        return;
    }
    let max = order.len() as isize - 1;
    let to = (from as isize + delta).clamp(0, max) as usize;
    let item = order.remove(from);
    order.insert(to, item);
}
