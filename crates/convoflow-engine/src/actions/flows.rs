//! Entering other flows and triggering new sessions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::{evaluate_trimmed, fail, fatal, parse_urn, OtherContacts};
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::errors::{ActionError, ReadError};
use crate::events::{Event, Exclusions, FlowEntered, SessionTriggered};
use crate::run::{EventCallback, ModifierCallback, Run, SessionHistory, Step};
use crate::types::{AssetReference, ContactReference, FlowReference};

/// How many sessions can trigger each other without any input being
/// received before we stop them.
pub const MAX_ANCESTORS_SINCE_INPUT: u32 = 5;

/// History for sessions triggered by this run's session.
fn child_history(run: &dyn Run) -> SessionHistory {
    let session = run.session();
    SessionHistory::for_child(session.uuid(), session.history(), session.input().is_some())
}

fn too_many_ancestors(run: &dyn Run, log: &mut EventCallback<'_>) -> bool {
    if run.session().history().ancestors_since_input >= MAX_ANCESTORS_SINCE_INPUT {
        log(Event::error(
            "too many sessions have been spawned since the last time input was received",
        ));
        return true;
    }
    false
}

fn run_summary(run: &dyn Run) -> Result<serde_json::Value, ActionError> {
    run.snapshot().map_err(|e| ActionError::Snapshot {
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// enter_flow
// ---------------------------------------------------------------------------

/// Starts a child run of another flow in this session. Unless terminal, the
/// parent resumes when the child ends.
///
/// ```json
/// {
///   "type": "enter_flow",
///   "uuid": "...",
///   "flow": {"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Collect Language"},
///   "terminal": false
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterFlow {
    #[serde(flatten)]
    pub base: ActionBase,
    pub flow: FlowReference,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
}

#[async_trait]
impl Action for EnterFlow {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let Some(flow) = run.session().assets().flows().get(self.flow.uuid) else {
            let text = format!(
                "missing dependency: {}",
                AssetReference::Flow(self.flow.clone())
            );
            fail(run, &text, log_event);
            return Ok(());
        };

        if !run.session().can_enter_flow(&flow) {
            let text = format!(
                "flow loop detected, stopping execution before entering '{}'",
                flow.name
            );
            fatal(run, &text, log_event);
            return Ok(());
        }

        let session_type = run.session().session_type();
        if !session_type.can_enter(flow.flow_type) {
            let text = format!(
                "can't enter {} of type {:?} from type {:?}",
                flow.reference(),
                flow.flow_type,
                session_type
            );
            fail(run, &text, log_event);
            return Ok(());
        }

        let parent_run_uuid = run.uuid();
        let reference = flow.reference();
        run.session_mut().push_flow(flow, parent_run_uuid, self.terminal);
        log_event(Event::new(FlowEntered {
            flow: reference,
            parent_run_uuid,
            terminal: self.terminal,
        }));
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        dependency(AssetReference::Flow(self.flow.clone()));
    }
}

// ---------------------------------------------------------------------------
// start_session
// ---------------------------------------------------------------------------

/// Asks the caller to start new sessions in a flow for other contacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSession {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(flatten)]
    pub recipients: OtherContacts,
    pub flow: FlowReference,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_contact: bool,
    #[serde(default)]
    pub exclusions: Exclusions,
}

#[async_trait]
impl Action for StartSession {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let recipients = self.recipients.resolve(run, log_event);

        let Some(flow) = run.session().assets().flows().get(self.flow.uuid) else {
            log_event(Event::dependency_error(&AssetReference::Flow(
                self.flow.clone(),
            )));
            return Ok(());
        };

        if run.session().batch_start()
            && (!recipients.groups.is_empty() || !recipients.contact_query.is_empty())
        {
            log_event(Event::error("can't trigger sessions during batch starts"));
            return Ok(());
        }

        if too_many_ancestors(run, log_event) {
            return Ok(());
        }

        if recipients.is_empty() && !self.create_contact {
            return Ok(());
        }

        let run_summary = run_summary(run)?;
        log_event(Event::new(SessionTriggered {
            flow: flow.reference(),
            groups: recipients.groups,
            contacts: recipients.contacts,
            contact_query: recipients.contact_query,
            create_contact: self.create_contact,
            urns: recipients.urns,
            exclusions: self.exclusions,
            interrupt: false,
            run_summary,
            history: child_history(run),
        }));
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        self.recipients.inspect(dependency);
        dependency(AssetReference::Flow(self.flow.clone()));
    }
}

// ---------------------------------------------------------------------------
// trigger_session
// ---------------------------------------------------------------------------

/// Asks the caller to start a session in a flow for exactly one other
/// contact, given as a contact or an evaluated URN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSession {
    #[serde(flatten)]
    pub base: ActionBase,
    pub flow: FlowReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub urn: String,
    #[serde(default)]
    pub interrupt: bool,
}

#[async_trait]
impl Action for TriggerSession {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        if self.contact.is_some() == !self.urn.is_empty() {
            return Err(ReadError::validation("must specify either contact or urn"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let urn = if self.urn.is_empty() {
            None
        } else {
            let evaluated = evaluate_trimmed(run, &self.urn, log_event);
            let urn = parse_urn(run, &evaluated);
            if urn.is_none() {
                log_event(Event::error(format!("'{evaluated}' is not a valid URN")));
            }
            urn
        };
        if urn.is_none() && self.contact.is_none() {
            return Ok(());
        }

        let Some(flow) = run.session().assets().flows().get(self.flow.uuid) else {
            log_event(Event::dependency_error(&AssetReference::Flow(
                self.flow.clone(),
            )));
            return Ok(());
        };

        if too_many_ancestors(run, log_event) {
            return Ok(());
        }

        let run_summary = run_summary(run)?;
        log_event(Event::new(SessionTriggered {
            flow: flow.reference(),
            groups: Vec::new(),
            contacts: self.contact.iter().cloned().collect(),
            contact_query: String::new(),
            create_contact: false,
            urns: urn.into_iter().collect(),
            exclusions: Exclusions::default(),
            interrupt: self.interrupt,
            run_summary,
            history: child_history(run),
        }));
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        dependency(AssetReference::Flow(self.flow.clone()));
        if let Some(contact) = &self.contact {
            dependency(AssetReference::Contact(contact.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{execute, read_action};
    use crate::events::EventKind;
    use crate::modifiers::Modifier;
    use crate::run::RunStatus;
    use crate::test_support::{self, TestRun, TestSession};
    use crate::types::Urn;
    use serde_json::{json, Value};
    use uuid::Uuid;

    async fn run_action(run: &mut TestRun, data: Value) -> Vec<Event> {
        let action = read_action(&data).unwrap();
        let mut events = Vec::new();
        execute(
            action.as_ref(),
            run,
            &Step::new(Uuid::new_v4()),
            &mut |_: Modifier| {},
            &mut |e: Event| events.push(e),
        )
        .await
        .unwrap();
        events
    }

    fn flow_json(run: &TestRun, name: &str) -> Value {
        let flow = run.session().assets().flows().find_by_name(name).unwrap();
        json!({"uuid": flow.uuid, "name": name})
    }

    fn triggered(event: &Event) -> &SessionTriggered {
        match &event.kind {
            EventKind::SessionTriggered(e) => e,
            _ => panic!("expected session_triggered, got {}", event.type_name()),
        }
    }

    #[tokio::test]
    async fn test_enter_flow() {
        let mut run = TestSession::builder().build_run();
        let child = flow_json(&run, "Child Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "enter_flow",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": child
            }),
        )
        .await;
        assert_eq!(events[0].type_name(), "flow_entered");
        assert_eq!(run.session().flow_stack().len(), 2);
    }

    #[tokio::test]
    async fn test_start_flow_alias() {
        let mut run = TestSession::builder().build_run();
        let child = flow_json(&run, "Child Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "start_flow",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": child,
                "terminal": true
            }),
        )
        .await;
        match &events[0].kind {
            EventKind::FlowEntered(e) => assert!(e.terminal),
            _ => panic!("expected flow_entered"),
        }
    }

    #[tokio::test]
    async fn test_enter_flow_loop_is_fatal() {
        let mut run = TestSession::builder().build_run();
        let parent = flow_json(&run, "Parent Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "enter_flow",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": parent
            }),
        )
        .await;
        assert!(events[0].is_fatal());
        assert_eq!(events[1].type_name(), "run_ended");
        assert_eq!(run.status(), RunStatus::Errored);
    }

    #[tokio::test]
    async fn test_enter_missing_flow_fails_run() {
        let mut run = TestSession::builder().build_run();
        let events = run_action(
            &mut run,
            json!({
                "type": "enter_flow",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": {"uuid": "5e0e8b42-7ecb-4f37-8b56-95a8b1b8ce44", "name": "Deleted"}
            }),
        )
        .await;
        assert_eq!(events[0].type_name(), "failure");
        assert_eq!(run.status(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_enter_voice_flow_from_messaging_fails() {
        let mut run = TestSession::builder().build_run();
        let voice = flow_json(&run, "Voice Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "enter_flow",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": voice
            }),
        )
        .await;
        assert_eq!(events[0].type_name(), "failure");
        assert_eq!(run.status(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_start_session() {
        let mut run = TestSession::builder()
            .input(test_support::msg_in("go"))
            .build_run();
        let child = flow_json(&run, "Child Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "start_session",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "urns": ["tel:+12065551212"],
                "contact_query": "age > 10",
                "flow": child,
                "exclusions": {"in_a_flow": true}
            }),
        )
        .await;
        let e = triggered(&events[0]);
        assert_eq!(e.urns, vec![Urn::from("tel:+12065551212")]);
        assert_eq!(e.contact_query, "age > 10");
        assert!(e.exclusions.in_a_flow);
        assert_eq!(e.history.ancestors, 1);
        assert_eq!(e.history.ancestors_since_input, 0);
        assert_eq!(e.run_summary["uuid"], json!(run.uuid()));
    }

    #[tokio::test]
    async fn test_start_session_loop_prevention() {
        let mut run = TestSession::builder()
            .history(SessionHistory {
                parent_uuid: Some(Uuid::new_v4()),
                ancestors: 5,
                ancestors_since_input: 5,
            })
            .build_run();
        let child = flow_json(&run, "Child Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "start_session",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "urns": ["tel:+12065551212"],
                "flow": child
            }),
        )
        .await;
        match &events[0].kind {
            EventKind::Error(e) => assert_eq!(
                e.text,
                "too many sessions have been spawned since the last time input was received"
            ),
            _ => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn test_start_session_batch_start() {
        let mut run = TestSession::builder().batch_start(true).build_run();
        let child = flow_json(&run, "Child Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "start_session",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "contact_query": "age > 10",
                "flow": child
            }),
        )
        .await;
        match &events[0].kind {
            EventKind::Error(e) => assert_eq!(e.text, "can't trigger sessions during batch starts"),
            _ => panic!("expected error"),
        }
    }

    #[test]
    fn test_trigger_session_needs_one_recipient() {
        for data in [
            json!({
                "type": "trigger_session",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": {"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Registration"}
            }),
            json!({
                "type": "trigger_session",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": {"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Registration"},
                "contact": {"uuid": "1e1ce1e1-9288-4504-869e-022d1003c72a", "name": "Bob"},
                "urn": "tel:+12065551212"
            }),
        ] {
            let err = read_action(&data).unwrap_err();
            assert_eq!(err.to_string(), "must specify either contact or urn");
        }
    }

    #[tokio::test]
    async fn test_trigger_session_by_urn() {
        let mut run = TestSession::builder().build_run();
        let child = flow_json(&run, "Child Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "trigger_session",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": child,
                "urn": "0788 123 123",
                "interrupt": true
            }),
        )
        .await;
        let e = triggered(&events[0]);
        assert_eq!(e.urns, vec![Urn::from("tel:+250788123123")]);
        assert!(e.interrupt);
        assert!(e.contacts.is_empty());
        // no input so the chain keeps counting
        assert_eq!(e.history.ancestors_since_input, 1);
    }

    #[tokio::test]
    async fn test_trigger_session_loop_prevention() {
        let mut run = TestSession::builder()
            .history(SessionHistory {
                parent_uuid: Some(Uuid::new_v4()),
                ancestors: 5,
                ancestors_since_input: 5,
            })
            .build_run();
        let child = flow_json(&run, "Child Flow");
        let events = run_action(
            &mut run,
            json!({
                "type": "trigger_session",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "flow": child,
                "urn": "tel:+12065551212"
            }),
        )
        .await;

        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::Error(e) => assert_eq!(
                e.text,
                "too many sessions have been spawned since the last time input was received"
            ),
            _ => panic!("expected error, got {}", events[0].type_name()),
        }
        assert!(!events.iter().any(|e| e.type_name() == "session_triggered"));
    }
}
