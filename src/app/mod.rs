use crate::config::FormEntry;
use crate::errors::ApiError;
use crate::form_core::builder::{FormBuilder, SaveRequest};
use crate::form_core::collector::{Completion, PendingSubmission, ResponseCollector};
use crate::form_core::renderer::guest_defaults;
use crate::form_core::validate::validate_definition;
use crate::model::{Audience, FormDefinition, LinkRequest, Submission};
use crate::services::loader::{LoadKind, LoadMsg, LoadOutcome};
use crate::stores::{self, NoticeLevel};
use crate::ui::{AppState, Fallback, PendingOpen, View};
use crate::widgets::builder::BuilderWidget;
use crate::widgets::form_widget::FormWidget;
use crate::widgets::responses::ResponsesWidget;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_LINK_TTL_HOURS: u32 = 72;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenTarget {
    Fill,
    Builder,
    Responses,
}

pub enum AppMsg {
    Open { form_id: String, target: OpenTarget },
    GenerateLink { form_id: String },
    PreviewDraft,
    Loaded(LoadMsg),
    Back,
    Retry,
}

#[allow(clippy::large_enum_variant)]
pub enum Effect {
    FetchLayout {
        form_id: String,
        audience: Audience,
    },
    SaveLayout {
        req: SaveRequest,
    },
    Submit {
        pending: PendingSubmission,
    },
    FetchResponses {
        form_id: String,
    },
    GenerateLink {
        form_id: String,
        req: LinkRequest,
    },
    ShowToast {
        text: String,
        level: NoticeLevel,
    },
    CopyToClipboard {
        text: String,
    },
    Unavailable {
        reason: String,
    },
}

pub(crate) fn toast(text: impl Into<String>, level: NoticeLevel) -> Effect {
    Effect::ShowToast {
        text: text.into(),
        level,
    }
}

pub fn update(state: &mut AppState, msg: AppMsg) -> Vec<Effect> {
    use AppMsg::*;
    let mut effects: Vec<Effect> = Vec::new();
    match msg {
        Open { form_id, target } => {
            let ticket = state.next_ticket();
            let entry = entry_for(state, &form_id);
            state.dbg(format!("open {form_id} as {target:?} t{ticket}"));
            tracing::info!(form = %form_id, ?target, ticket, "open");
            state.fallback = None;
            state.unavailable = None;
            state.status_text = Some(format!("Loading {}", entry.display_title()));
            state.pending = Some(PendingOpen {
                form_id: form_id.clone(),
                target,
            });
            state.view = View::Loading;
            effects.push(match target {
                OpenTarget::Fill => Effect::FetchLayout {
                    form_id,
                    audience: entry.audience,
                },
                // Authors always edit through the member endpoints
                OpenTarget::Builder => Effect::FetchLayout {
                    form_id,
                    audience: Audience::Member,
                },
                OpenTarget::Responses => Effect::FetchResponses { form_id },
            });
        }
        GenerateLink { form_id } => {
            let ttl = state
                .config
                .link_ttl_hours
                .unwrap_or(DEFAULT_LINK_TTL_HOURS);
            let req = LinkRequest {
                expires_at: Some(Utc::now() + Duration::hours(i64::from(ttl))),
                time_limit: state.config.form(&form_id).and_then(|e| e.time_limit),
            };
            state.status_text = Some(format!("Generating link for {form_id}"));
            effects.push(Effect::GenerateLink { form_id, req });
        }
        PreviewDraft => {
            let Some(bw) = &state.builder else {
                return effects;
            };
            let collector = ResponseCollector::new(
                bw.builder.form_id(),
                Audience::Member,
                bw.builder.snapshot(),
                BTreeMap::new(),
                Utc::now(),
            )
            .preview();
            state.fill = Some(FormWidget::new(collector));
            state.previewing = true;
            state.view = View::Fill;
        }
        Loaded(msg) => {
            if msg.ticket != state.ticket {
                state.dbg(format!(
                    "drop stale {:?} result (t{} != t{})",
                    msg.kind, msg.ticket, state.ticket
                ));
                tracing::debug!(ticket = msg.ticket, current = state.ticket, kind = ?msg.kind, "stale result dropped");
                return effects;
            }
            state.status_text = None;
            match msg.kind {
                LoadKind::Layout => on_layout(state, msg.outcome, &mut effects),
                LoadKind::Save => on_saved(state, msg.outcome, &mut effects),
                LoadKind::Submit { attempt } => {
                    on_submitted(state, attempt, msg.outcome, &mut effects)
                }
                LoadKind::Responses => on_responses(state, msg.outcome, &mut effects),
                LoadKind::Link => on_link(state, msg.outcome, &mut effects),
            }
        }
        Back => {
            if state.view == View::Fill && state.previewing {
                state.previewing = false;
                state.fill = None;
                state.view = View::Builder;
                return effects;
            }
            if state.view == View::Builder {
                if let Some(bw) = state.builder.as_mut() {
                    if bw.builder.is_dirty() && !bw.confirm_discard {
                        bw.confirm_discard = true;
                        effects.push(toast(
                            "Unsaved changes. Ctrl+S to save or Esc again to discard.",
                            NoticeLevel::Info,
                        ));
                        return effects;
                    }
                }
            }
            state.next_ticket();
            state.pending = None;
            state.fill = None;
            state.builder = None;
            state.responses = None;
            state.previewing = false;
            state.unavailable = None;
            state.fallback = None;
            state.status_text = None;
            state.view = View::Home;
        }
        Retry => {
            if let Some(fb) = state.fallback.take() {
                return update(
                    state,
                    Open {
                        form_id: fb.form_id,
                        target: fb.target,
                    },
                );
            }
        }
    }
    effects
}

fn entry_for(state: &AppState, form_id: &str) -> FormEntry {
    state
        .config
        .form(form_id)
        .cloned()
        .unwrap_or_else(|| FormEntry::new(form_id, Audience::Member))
}

fn show_fallback(state: &mut AppState, pending: PendingOpen, message: String) {
    tracing::warn!(form = %pending.form_id, error = %message, "view fell back");
    state.dbg(format!("fallback {}: {message}", pending.form_id));
    state.fallback = Some(Fallback {
        form_id: pending.form_id,
        target: pending.target,
        message,
    });
    state.view = View::Fallback;
}

fn show_unavailable(state: &mut AppState, reason: String) {
    state.dbg(format!("unavailable: {reason}"));
    state.unavailable = Some(reason);
    state.view = View::Unavailable;
}

fn on_layout(
    state: &mut AppState,
    outcome: Result<LoadOutcome, ApiError>,
    effects: &mut Vec<Effect>,
) {
    let Some(pending) = state.pending.take() else {
        state.dbg("layout arrived with nothing pending");
        return;
    };
    match outcome {
        Ok(LoadOutcome::Layout(def)) => match pending.target {
            OpenTarget::Builder => {
                // The author can repair a malformed layout in place
                if let Err(e) = validate_definition(&def) {
                    effects.push(toast(format!("Layout needs fixing: {e}"), NoticeLevel::Error));
                }
                state
                    .layouts
                    .insert(pending.form_id.clone(), Arc::new(def.clone()));
                state.builder = Some(BuilderWidget::new(FormBuilder::new(pending.form_id, def)));
                state.view = View::Builder;
            }
            _ => {
                if let Err(e) = validate_definition(&def) {
                    show_fallback(state, pending, format!("the form definition is invalid: {e}"));
                    return;
                }
                let def = Arc::new(def);
                state.layouts.insert(pending.form_id.clone(), def.clone());
                open_fill(state, pending.form_id, def);
            }
        },
        Ok(_) => state.dbg("unexpected outcome for a layout request"),
        Err(ApiError::NotFound(_)) if pending.target == OpenTarget::Builder => {
            let title = entry_for(state, &pending.form_id).display_title().to_string();
            state.builder = Some(BuilderWidget::new(FormBuilder::blank(pending.form_id, title)));
            state.view = View::Builder;
            effects.push(toast("No layout yet; starting a new one", NoticeLevel::Info));
        }
        Err(e) if e.is_terminal() => show_unavailable(state, e.to_string()),
        Err(e) => show_fallback(state, pending, e.to_string()),
    }
}

fn open_fill(state: &mut AppState, form_id: String, def: Arc<FormDefinition>) {
    let entry = entry_for(state, &form_id);
    let mut defaults = BTreeMap::new();
    let mut constraints = state.links.get(&form_id).cloned().unwrap_or_default();
    if entry.audience == Audience::Guest {
        let guest = stores::guest_identity();
        defaults = guest_defaults(guest.name.as_deref(), guest.email.as_deref());
        constraints.expires_at = constraints.expires_at.or(entry.expires_at);
        constraints.time_limit = constraints.time_limit.or(entry.time_limit);
    }
    let now = Utc::now();
    let mut collector = ResponseCollector::new(form_id, entry.audience, def, defaults, now)
        .with_constraints(constraints);
    if let Err(g) = collector.open(now) {
        show_unavailable(state, g.to_string());
        return;
    }
    state.fill = Some(FormWidget::new(collector));
    state.view = View::Fill;
}

fn on_saved(state: &mut AppState, outcome: Result<LoadOutcome, ApiError>, effects: &mut Vec<Effect>) {
    let Some(bw) = state.builder.as_mut() else {
        return;
    };
    match outcome {
        Ok(LoadOutcome::Saved(def)) => {
            let form_id = bw.builder.form_id().to_string();
            bw.builder.finish_save(def.clone());
            bw.confirm_discard = false;
            state.layouts.insert(form_id, Arc::new(def));
            effects.push(toast("Layout saved", NoticeLevel::Success));
        }
        Ok(_) => {
            bw.builder.abort_save();
            state.dbg("unexpected outcome for a save request");
        }
        Err(e) => {
            bw.builder.abort_save();
            effects.push(toast(format!("Save failed: {e}"), NoticeLevel::Error));
        }
    }
}

fn on_submitted(
    state: &mut AppState,
    attempt: u64,
    outcome: Result<LoadOutcome, ApiError>,
    effects: &mut Vec<Effect>,
) {
    let result: Result<Submission, ApiError> = match outcome {
        Ok(LoadOutcome::Submitted(sub)) => Ok(sub),
        Ok(_) => {
            state.dbg("unexpected outcome for a submit request");
            return;
        }
        Err(e) => Err(e),
    };
    let Some(fw) = state.fill.as_mut() else {
        return;
    };
    match fw.collector.complete(attempt, result) {
        Completion::Submitted(sub) => {
            if fw.collector.audience() == Audience::Guest {
                stores::clear_guest();
            }
            effects.push(toast(
                format!("Response submitted ({})", sub.id),
                NoticeLevel::Success,
            ));
        }
        Completion::Failed(msg) => {
            effects.push(toast(format!("Submit failed: {msg}"), NoticeLevel::Error));
        }
        Completion::Blocked(g) => show_unavailable(state, g.to_string()),
        Completion::Stale => state.dbg(format!("stale submit attempt {attempt} ignored")),
    }
}

fn on_responses(
    state: &mut AppState,
    outcome: Result<LoadOutcome, ApiError>,
    effects: &mut Vec<Effect>,
) {
    let pending = state.pending.take();
    match outcome {
        Ok(LoadOutcome::Responses(list)) => {
            if let Some(p) = pending {
                let entry = entry_for(state, &p.form_id);
                let layout = state.layouts.get(&p.form_id).cloned();
                state.responses = Some(ResponsesWidget::new(
                    p.form_id,
                    entry.display_title(),
                    layout,
                    list,
                ));
                state.view = View::Responses;
            } else if let Some(rw) = state.responses.as_mut() {
                rw.replace(list);
            }
        }
        Ok(_) => state.dbg("unexpected outcome for a responses request"),
        Err(e) => match pending {
            Some(_) if e.is_terminal() => show_unavailable(state, e.to_string()),
            Some(p) => show_fallback(state, p, e.to_string()),
            None => effects.push(toast(format!("Refresh failed: {e}"), NoticeLevel::Error)),
        },
    }
}

fn on_link(state: &mut AppState, outcome: Result<LoadOutcome, ApiError>, effects: &mut Vec<Effect>) {
    match outcome {
        Ok(LoadOutcome::Link { form_id, link }) => {
            state.dbg(format!("link for {form_id}: {}", link.url));
            state.links.insert(form_id, (&link).into());
            effects.push(toast(
                format!("Share link copied: {}", link.url),
                NoticeLevel::Success,
            ));
            effects.push(Effect::CopyToClipboard { text: link.url });
        }
        Ok(_) => state.dbg("unexpected outcome for a link request"),
        Err(e) => effects.push(toast(format!("Link generation failed: {e}"), NoticeLevel::Error)),
    }
}

#[cfg(test)]
mod tests;
