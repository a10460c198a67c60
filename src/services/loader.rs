use crate::errors::ApiError;
use crate::form_core::builder::SaveRequest;
use crate::form_core::collector::PendingSubmission;
use crate::model::{Audience, FormDefinition, LinkRequest, ShareLink, Submission};
use crate::services::api::FormApi;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub(crate) enum LoadOutcome {
    Layout(FormDefinition),
    Saved(FormDefinition),
    Submitted(Submission),
    Responses(Vec<Submission>),
    Link { form_id: String, link: ShareLink },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoadKind {
    Layout,
    Save,
    Submit { attempt: u64 },
    Responses,
    Link,
}

/// Result of one background request, tagged with the ticket of the view that asked.
pub(crate) struct LoadMsg {
    pub(crate) ticket: u64,
    pub(crate) kind: LoadKind,
    pub(crate) outcome: Result<LoadOutcome, ApiError>,
}

// Every request runs on its own short-lived thread; the UI loop drains `tx`.
fn spawn_request<F>(ticket: u64, kind: LoadKind, tx: Sender<LoadMsg>, call: F)
where
    F: FnOnce() -> Result<LoadOutcome, ApiError> + Send + 'static,
{
    thread::spawn(move || {
        let started = Instant::now();
        let outcome = call();
        match &outcome {
            Ok(_) => tracing::debug!(ticket, ?kind, elapsed_ms = started.elapsed().as_millis() as u64, "request done"),
            Err(e) => tracing::warn!(ticket, ?kind, error = %e, "request failed"),
        }
        // Receiver gone means the shell is shutting down
        let _ = tx.send(LoadMsg {
            ticket,
            kind,
            outcome,
        });
    });
}

pub(crate) fn spawn_fetch_layout(
    api: Arc<dyn FormApi>,
    ticket: u64,
    form_id: String,
    audience: Audience,
    tx: Sender<LoadMsg>,
) {
    spawn_request(ticket, LoadKind::Layout, tx, move || {
        api.fetch_layout(&form_id, audience).map(LoadOutcome::Layout)
    });
}

pub(crate) fn spawn_save_layout(
    api: Arc<dyn FormApi>,
    ticket: u64,
    req: SaveRequest,
    tx: Sender<LoadMsg>,
) {
    spawn_request(ticket, LoadKind::Save, tx, move || {
        let saved = if req.create {
            api.create_layout(&req.form_id, &req.definition)?
        } else {
            api.update_layout(&req.form_id, &req.definition)?
        };
        Ok(LoadOutcome::Saved(saved))
    });
}

pub(crate) fn spawn_submit(
    api: Arc<dyn FormApi>,
    ticket: u64,
    pending: PendingSubmission,
    tx: Sender<LoadMsg>,
) {
    let kind = LoadKind::Submit {
        attempt: pending.attempt,
    };
    spawn_request(ticket, kind, tx, move || {
        api.submit(&pending.form_id, pending.audience, &pending.payload)
            .map(LoadOutcome::Submitted)
    });
}

pub(crate) fn spawn_list_responses(
    api: Arc<dyn FormApi>,
    ticket: u64,
    form_id: String,
    tx: Sender<LoadMsg>,
) {
    spawn_request(ticket, LoadKind::Responses, tx, move || {
        api.list_responses(&form_id).map(LoadOutcome::Responses)
    });
}

pub(crate) fn spawn_generate_link(
    api: Arc<dyn FormApi>,
    ticket: u64,
    form_id: String,
    req: LinkRequest,
    tx: Sender<LoadMsg>,
) {
    spawn_request(ticket, LoadKind::Link, tx, move || {
        let link = api.generate_link(&form_id, &req)?;
        Ok(LoadOutcome::Link { form_id, link })
    });
}

#[cfg(test)]
mod loader_tests;
