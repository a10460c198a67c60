use super::*;
use crate::form_core::collector::Phase;
use crate::model::{FieldValue, ShareLink};
use crate::services::memory_api::{demo_contact_form, demo_feedback_form};
use crate::stores::GuestIdentity;

fn state_with(forms: Vec<FormEntry>) -> AppState {
    let mut st = AppState::default();
    st.config.forms = forms;
    st
}

fn member_state() -> AppState {
    let mut feedback = FormEntry::new("feedback", Audience::Member);
    feedback.title = Some("Product feedback".into());
    feedback.time_limit = Some(20);
    state_with(vec![feedback])
}

fn loaded(st: &AppState, kind: LoadKind, outcome: Result<LoadOutcome, ApiError>) -> AppMsg {
    AppMsg::Loaded(LoadMsg {
        ticket: st.ticket,
        kind,
        outcome,
    })
}

fn open(st: &mut AppState, form_id: &str, target: OpenTarget) -> Vec<Effect> {
    update(
        st,
        AppMsg::Open {
            form_id: form_id.into(),
            target,
        },
    )
}

fn open_fill_with(st: &mut AppState, form_id: &str, def: FormDefinition) {
    open(st, form_id, OpenTarget::Fill);
    let msg = loaded(st, LoadKind::Layout, Ok(LoadOutcome::Layout(def)));
    update(st, msg);
}

fn open_builder_with(st: &mut AppState, def: FormDefinition) {
    open(st, "feedback", OpenTarget::Builder);
    let msg = loaded(st, LoadKind::Layout, Ok(LoadOutcome::Layout(def)));
    update(st, msg);
}

fn has_toast(effects: &[Effect], want: NoticeLevel) -> bool {
    effects
        .iter()
        .any(|e| matches!(e, Effect::ShowToast { level, .. } if *level == want))
}

fn submission(id: &str) -> Submission {
    Submission {
        id: id.into(),
        submitted_at: Utc::now(),
        data: BTreeMap::new(),
    }
}

#[test]
fn open_shows_loading_and_requests_layout() {
    let mut st = member_state();
    let effects = open(&mut st, "feedback", OpenTarget::Fill);
    assert_eq!(st.view, View::Loading);
    assert_eq!(st.ticket, 1);
    assert_eq!(
        st.pending,
        Some(PendingOpen {
            form_id: "feedback".into(),
            target: OpenTarget::Fill,
        })
    );
    assert!(matches!(
        effects.as_slice(),
        [Effect::FetchLayout { form_id, audience: Audience::Member }] if form_id == "feedback"
    ));
    assert_eq!(st.status_text.as_deref(), Some("Loading Product feedback"));
}

#[test]
fn layout_for_the_current_ticket_opens_the_fill_view() {
    let mut st = member_state();
    open_fill_with(&mut st, "feedback", demo_feedback_form());
    assert_eq!(st.view, View::Fill);
    assert!(st.pending.is_none());
    assert!(st.layouts.contains_key("feedback"));
    let fw = st.fill.as_ref().expect("fill widget");
    assert_eq!(fw.collector.form_id(), "feedback");
    assert!(fw.collector.is_editable());
}

#[test]
fn results_for_an_abandoned_view_are_dropped() {
    let mut st = member_state();
    open(&mut st, "feedback", OpenTarget::Fill);
    let stale_ticket = st.ticket;
    update(&mut st, AppMsg::Back);
    assert_eq!(st.view, View::Home);
    let effects = update(
        &mut st,
        AppMsg::Loaded(LoadMsg {
            ticket: stale_ticket,
            kind: LoadKind::Layout,
            outcome: Ok(LoadOutcome::Layout(demo_feedback_form())),
        }),
    );
    assert!(effects.is_empty());
    assert_eq!(st.view, View::Home);
    assert!(st.fill.is_none());
    assert!(st.debug_log.iter().any(|l| l.contains("drop stale")));
}

#[test]
fn invalid_layout_falls_back_and_retry_reopens() {
    let mut st = member_state();
    let mut broken = demo_feedback_form();
    broken.title = String::new();
    open_fill_with(&mut st, "feedback", broken);
    assert_eq!(st.view, View::Fallback);
    let fb = st.fallback.clone().expect("fallback");
    assert_eq!(fb.target, OpenTarget::Fill);
    assert!(fb.message.contains("invalid"));

    let before = st.ticket;
    let effects = update(&mut st, AppMsg::Retry);
    assert_eq!(st.view, View::Loading);
    assert!(st.ticket > before);
    assert!(st.fallback.is_none());
    assert!(matches!(effects.as_slice(), [Effect::FetchLayout { .. }]));
}

#[test]
fn backend_errors_choose_fallback_or_unavailable() {
    let mut st = member_state();
    open(&mut st, "feedback", OpenTarget::Fill);
    let msg = loaded(&st, LoadKind::Layout, Err(ApiError::Unavailable("connection refused".into())));
    update(&mut st, msg);
    assert_eq!(st.view, View::Fallback);

    open(&mut st, "feedback", OpenTarget::Fill);
    let gone = ApiError::Status {
        method: "GET",
        url: "http://x/form-guard/feedback/layout".into(),
        status: 410,
        body: "expired".into(),
    };
    let msg = loaded(&st, LoadKind::Layout, Err(gone));
    update(&mut st, msg);
    assert_eq!(st.view, View::Unavailable);
    assert!(st.unavailable.as_deref().is_some_and(|r| r.contains("410")));
}

#[test]
fn builder_starts_blank_when_no_layout_exists() {
    let mut st = member_state();
    let effects = open(&mut st, "feedback", OpenTarget::Builder);
    // Authors always go through the member endpoints
    assert!(matches!(
        effects.as_slice(),
        [Effect::FetchLayout { audience: Audience::Member, .. }]
    ));
    let msg = loaded(&st, LoadKind::Layout, Err(ApiError::NotFound("feedback".into())));
    let effects = update(&mut st, msg);
    assert_eq!(st.view, View::Builder);
    let bw = st.builder.as_ref().expect("builder");
    assert_eq!(bw.builder.draft().title, "Product feedback");
    assert!(bw.builder.draft().sections.is_empty());
    assert!(has_toast(&effects, NoticeLevel::Info));
}

#[test]
fn builder_opens_a_malformed_layout_for_repair() {
    let mut st = member_state();
    let mut broken = demo_feedback_form();
    broken.sections[0].title = String::new();
    open(&mut st, "feedback", OpenTarget::Builder);
    let msg = loaded(&st, LoadKind::Layout, Ok(LoadOutcome::Layout(broken)));
    let effects = update(&mut st, msg);
    assert_eq!(st.view, View::Builder);
    assert!(has_toast(&effects, NoticeLevel::Error));
}

#[test]
fn submit_completion_moves_the_collector_on() {
    let mut st = member_state();
    open_fill_with(&mut st, "feedback", demo_feedback_form());
    let pending = {
        let fw = st.fill.as_mut().expect("fill widget");
        fw.collector
            .set_value("score", FieldValue::Number(4.0))
            .unwrap();
        fw.collector.begin_submit(Utc::now()).unwrap()
    };
    let msg = loaded(
        &st,
        LoadKind::Submit {
            attempt: pending.attempt,
        },
        Ok(LoadOutcome::Submitted(submission("r-1"))),
    );
    let effects = update(&mut st, msg);
    assert!(has_toast(&effects, NoticeLevel::Success));
    let fw = st.fill.as_ref().expect("fill widget");
    assert!(matches!(fw.collector.phase(), Phase::Submitted(s) if s.id == "r-1"));

    // A late answer for an older attempt changes nothing
    let msg = loaded(
        &st,
        LoadKind::Submit { attempt: 0 },
        Ok(LoadOutcome::Submitted(submission("r-0"))),
    );
    assert!(update(&mut st, msg).is_empty());
    assert!(st.debug_log.iter().any(|l| l.contains("stale submit")));
}

#[test]
fn failed_submit_keeps_answers_for_retry() {
    let mut st = member_state();
    open_fill_with(&mut st, "feedback", demo_feedback_form());
    let pending = {
        let fw = st.fill.as_mut().expect("fill widget");
        fw.collector
            .set_value("score", FieldValue::Number(2.0))
            .unwrap();
        fw.collector.begin_submit(Utc::now()).unwrap()
    };
    let msg = loaded(
        &st,
        LoadKind::Submit {
            attempt: pending.attempt,
        },
        Err(ApiError::Unavailable("timeout".into())),
    );
    let effects = update(&mut st, msg);
    assert!(has_toast(&effects, NoticeLevel::Error));
    let fw = st.fill.as_ref().expect("fill widget");
    assert_eq!(fw.collector.phase(), &Phase::Editing);
    assert!(fw.collector.last_failure().is_some());
    assert_eq!(
        fw.collector.edit().value("score"),
        Some(&FieldValue::Number(2.0))
    );
}

// The only test that touches the process-wide guest store
#[test]
fn guest_identity_prefills_and_is_cleared_after_submit() {
    let mut st = state_with(vec![FormEntry::new("contact", Audience::Guest)]);
    stores::set_guest(GuestIdentity {
        name: Some("Ada".into()),
        email: Some("ada@example.org".into()),
    });
    let effects = open(&mut st, "contact", OpenTarget::Fill);
    assert!(matches!(
        effects.as_slice(),
        [Effect::FetchLayout { audience: Audience::Guest, .. }]
    ));
    let msg = loaded(&st, LoadKind::Layout, Ok(LoadOutcome::Layout(demo_contact_form())));
    update(&mut st, msg);
    let pending = {
        let fw = st.fill.as_mut().expect("fill widget");
        assert_eq!(fw.collector.edit().value("name"), Some(&FieldValue::text("Ada")));
        fw.collector.begin_submit(Utc::now()).unwrap()
    };
    assert_eq!(pending.audience, Audience::Guest);
    let msg = loaded(
        &st,
        LoadKind::Submit {
            attempt: pending.attempt,
        },
        Ok(LoadOutcome::Submitted(submission("g-1"))),
    );
    update(&mut st, msg);
    assert!(stores::guest_identity().is_empty());
}

#[test]
fn expired_link_makes_the_form_unavailable_on_open() {
    let mut st = member_state();
    st.links.insert(
        "feedback".into(),
        crate::form_core::collector::LinkConstraints {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            time_limit: None,
        },
    );
    open_fill_with(&mut st, "feedback", demo_feedback_form());
    assert_eq!(st.view, View::Unavailable);
    assert!(st.fill.is_none());
}

#[test]
fn generated_link_is_remembered_and_copied() {
    let mut st = member_state();
    let effects = update(
        &mut st,
        AppMsg::GenerateLink {
            form_id: "feedback".into(),
        },
    );
    match effects.as_slice() {
        [Effect::GenerateLink { form_id, req }] => {
            assert_eq!(form_id, "feedback");
            assert!(req.expires_at.is_some_and(|t| t > Utc::now()));
            assert_eq!(req.time_limit, Some(20));
        }
        _ => panic!("expected a link request"),
    }
    let link = ShareLink {
        url: "https://forms.example.com/f/abc".into(),
        expires_at: None,
        time_limit: Some(20),
    };
    let msg = loaded(
        &st,
        LoadKind::Link,
        Ok(LoadOutcome::Link {
            form_id: "feedback".into(),
            link,
        }),
    );
    let effects = update(&mut st, msg);
    assert_eq!(st.links.get("feedback").and_then(|l| l.time_limit), Some(20));
    assert!(effects.iter().any(
        |e| matches!(e, Effect::CopyToClipboard { text } if text == "https://forms.example.com/f/abc")
    ));
}

#[test]
fn dirty_builder_needs_a_second_back() {
    let mut st = member_state();
    open_builder_with(&mut st, demo_feedback_form());
    st.builder
        .as_mut()
        .expect("builder")
        .builder
        .add_section("Extra")
        .unwrap();
    let effects = update(&mut st, AppMsg::Back);
    assert_eq!(st.view, View::Builder);
    assert!(st.builder.as_ref().is_some_and(|b| b.confirm_discard));
    assert!(has_toast(&effects, NoticeLevel::Info));

    update(&mut st, AppMsg::Back);
    assert_eq!(st.view, View::Home);
    assert!(st.builder.is_none());
}

#[test]
fn saved_layout_clears_the_journal() {
    let mut st = member_state();
    open_builder_with(&mut st, demo_feedback_form());
    let mut saved = {
        let bw = st.builder.as_mut().expect("builder");
        bw.builder.add_section("Extra").unwrap();
        bw.builder.draft().clone()
    };
    saved.id = Some("layout-9".into());
    let msg = loaded(&st, LoadKind::Save, Ok(LoadOutcome::Saved(saved)));
    let effects = update(&mut st, msg);
    assert!(has_toast(&effects, NoticeLevel::Success));
    let bw = st.builder.as_ref().expect("builder");
    assert!(!bw.builder.is_dirty());
    assert_eq!(bw.builder.draft().id.as_deref(), Some("layout-9"));
    assert_eq!(
        st.layouts.get("feedback").and_then(|d| d.id.clone()).as_deref(),
        Some("layout-9")
    );
}

#[test]
fn builder_is_frozen_while_a_save_is_outstanding() {
    use crate::widgets::Widget;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    let ctrl_s = KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL);

    let mut st = member_state();
    open_builder_with(&mut st, demo_feedback_form());
    let bw = st.builder.as_mut().expect("builder");
    bw.builder.add_section("Extra").unwrap();
    let sections = bw.builder.draft().sections.len();
    let req = match bw.on_key(ctrl_s).as_slice() {
        [Effect::SaveLayout { req }] => req.clone(),
        _ => panic!("expected a save effect"),
    };
    assert!(bw.builder.is_saving());

    // Edits and a second save are refused until the reply arrives
    assert!(matches!(
        bw.builder.add_section("Typed during save"),
        Err(crate::errors::BuilderError::SaveInProgress)
    ));
    let effects = bw.on_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::NONE));
    assert!(has_toast(&effects, NoticeLevel::Info));
    let effects = bw.on_key(ctrl_s);
    assert!(!effects.iter().any(|e| matches!(e, Effect::SaveLayout { .. })));
    assert_eq!(bw.builder.draft().sections.len(), sections);

    let mut saved = req.definition;
    saved.id = Some("layout-1".into());
    let msg = loaded(&st, LoadKind::Save, Ok(LoadOutcome::Saved(saved)));
    update(&mut st, msg);
    let bw = st.builder.as_mut().expect("builder");
    assert!(!bw.builder.is_saving());
    assert!(!bw.builder.is_dirty());
    assert_eq!(bw.builder.draft().sections.len(), sections);
    bw.builder.add_section("After save").unwrap();
    assert!(bw.builder.is_dirty());

    // A failed save unfreezes the draft and keeps its journal
    let Some(Effect::SaveLayout { .. }) = bw.on_key(ctrl_s).into_iter().next() else {
        panic!("expected a save effect");
    };
    let msg = loaded(&st, LoadKind::Save, Err(ApiError::Unavailable("connection refused".into())));
    let effects = update(&mut st, msg);
    assert!(has_toast(&effects, NoticeLevel::Error));
    let bw = st.builder.as_ref().expect("builder");
    assert!(!bw.builder.is_saving());
    assert!(bw.builder.is_dirty());
}

#[test]
fn preview_runs_the_draft_and_back_returns_to_the_builder() {
    let mut st = member_state();
    open_builder_with(&mut st, demo_feedback_form());
    update(&mut st, AppMsg::PreviewDraft);
    assert_eq!(st.view, View::Fill);
    assert!(st.previewing);
    assert!(st.fill.as_ref().is_some_and(|f| f.collector.is_preview()));

    update(&mut st, AppMsg::Back);
    assert_eq!(st.view, View::Builder);
    assert!(!st.previewing);
    assert!(st.fill.is_none());
    assert!(st.builder.is_some());
}

#[test]
fn responses_open_then_refresh_in_place() {
    let mut st = member_state();
    let effects = open(&mut st, "feedback", OpenTarget::Responses);
    assert!(matches!(
        effects.as_slice(),
        [Effect::FetchResponses { form_id }] if form_id == "feedback"
    ));
    let msg = loaded(
        &st,
        LoadKind::Responses,
        Ok(LoadOutcome::Responses(vec![submission("r-1")])),
    );
    update(&mut st, msg);
    assert_eq!(st.view, View::Responses);
    assert_eq!(st.responses.as_ref().map(|r| r.len()), Some(1));

    let msg = loaded(
        &st,
        LoadKind::Responses,
        Ok(LoadOutcome::Responses(vec![submission("r-1"), submission("r-2")])),
    );
    update(&mut st, msg);
    assert_eq!(st.responses.as_ref().map(|r| r.len()), Some(2));

    let msg = loaded(&st, LoadKind::Responses, Err(ApiError::Unavailable("down".into())));
    let effects = update(&mut st, msg);
    assert_eq!(st.view, View::Responses);
    assert!(has_toast(&effects, NoticeLevel::Error));
}
