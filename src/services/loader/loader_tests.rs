use super::*;
use crate::form_core::builder::FormBuilder;
use crate::model::{FieldValue, SubmissionPayload};
use crate::services::memory_api::MemoryFormApi;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::time::Duration;

fn demo_api() -> Arc<dyn FormApi> {
    Arc::new(MemoryFormApi::demo())
}

fn recv(rx: &mpsc::Receiver<LoadMsg>) -> LoadMsg {
    rx.recv_timeout(Duration::from_secs(5))
        .expect("worker did not report back")
}

#[test]
fn fetch_reports_layout_with_ticket() {
    let (tx, rx) = mpsc::channel();
    spawn_fetch_layout(demo_api(), 7, "contact".into(), Audience::Guest, tx);
    let msg = recv(&rx);
    assert_eq!(msg.ticket, 7);
    assert_eq!(msg.kind, LoadKind::Layout);
    match msg.outcome {
        Ok(LoadOutcome::Layout(def)) => assert_eq!(def.title, "Contact"),
        _ => panic!("expected a layout"),
    }
}

#[test]
fn fetch_of_unknown_form_reports_not_found() {
    let (tx, rx) = mpsc::channel();
    spawn_fetch_layout(demo_api(), 1, "nope".into(), Audience::Member, tx);
    assert!(matches!(recv(&rx).outcome, Err(ApiError::NotFound(_))));
}

#[test]
fn submit_carries_attempt_in_kind() {
    let (tx, rx) = mpsc::channel();
    let mut data = BTreeMap::new();
    data.insert("name".to_string(), FieldValue::text("Ada"));
    let pending = PendingSubmission {
        form_id: "contact".into(),
        audience: Audience::Member,
        attempt: 3,
        payload: SubmissionPayload { data },
    };
    spawn_submit(demo_api(), 2, pending, tx);
    let msg = recv(&rx);
    assert_eq!(msg.kind, LoadKind::Submit { attempt: 3 });
    assert!(matches!(msg.outcome, Ok(LoadOutcome::Submitted(_))));
}

#[test]
fn save_creates_when_no_layout_id() {
    let api = Arc::new(MemoryFormApi::default());
    let mut b = FormBuilder::blank("fresh", "Fresh");
    b.add_section("One").unwrap();
    let req = b.prepare_save().unwrap();
    let (tx, rx) = mpsc::channel();
    spawn_save_layout(api.clone(), 4, req, tx);
    match recv(&rx).outcome {
        Ok(LoadOutcome::Saved(def)) => assert!(def.id.is_some()),
        _ => panic!("expected a saved layout"),
    }
    assert!(api.fetch_layout("fresh", Audience::Member).is_ok());
}

#[test]
fn responses_and_links_round_trip_through_workers() {
    let api = demo_api();
    let (tx, rx) = mpsc::channel();
    spawn_list_responses(api.clone(), 5, "feedback".into(), tx.clone());
    match recv(&rx).outcome {
        Ok(LoadOutcome::Responses(list)) => assert!(list.is_empty()),
        _ => panic!("expected responses"),
    }
    let req = LinkRequest {
        expires_at: None,
        time_limit: Some(10),
    };
    spawn_generate_link(api, 6, "feedback".into(), req, tx);
    match recv(&rx).outcome {
        Ok(LoadOutcome::Link { form_id, link }) => {
            assert_eq!(form_id, "feedback");
            assert_eq!(link.time_limit, Some(10));
        }
        _ => panic!("expected a link"),
    }
}
