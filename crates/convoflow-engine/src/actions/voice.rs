//! Actions used in voice flows. All of them need the session's call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::{current_locale, evaluate_trimmed, languages, parse_urn};
use super::{Action, ActionBase};
use crate::errors::ActionError;
use crate::events::{DialWait, Event, IvrCreated};
use crate::run::{Call, EventCallback, ModifierCallback, Run, Step};
use crate::types::{MsgContent, MsgOut};

const NO_CALL: &str = "voice actions can only be used in sessions with a call";

/// The session's call, logging an error if there isn't one.
fn session_call(run: &dyn Run, log: &mut EventCallback<'_>) -> Option<Call> {
    let call = run.session().call().cloned();
    if call.is_none() {
        log(Event::error(NO_CALL));
    }
    call
}

/// Logs an IVR message over the call. Audio is carried as an `audio:`
/// attachment.
fn log_ivr(call: &Call, text: String, audio_url: &str, locale: String, log: &mut EventCallback<'_>) {
    let attachments = if audio_url.is_empty() {
        Vec::new()
    } else {
        vec![format!("audio:{audio_url}")]
    };
    let msg = MsgOut::new(
        Some(call.urn.clone()),
        Some(call.channel.clone()),
        MsgContent {
            text,
            attachments,
            quick_replies: Vec::new(),
        },
        None,
        locale,
        None,
    );
    log(Event::new(IvrCreated { msg }));
}

// ---------------------------------------------------------------------------
// say_msg
// ---------------------------------------------------------------------------

/// Says text to the contact, or plays a recording of it.
///
/// ```json
/// {"type": "say_msg", "uuid": "...", "text": "Hello @contact.name", "audio_url": ""}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SayMsg {
    #[serde(flatten)]
    pub base: ActionBase,
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audio_url: String,
}

#[async_trait]
impl Action for SayMsg {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let languages = languages(run);
        let (localized, language) =
            run.get_text_array(self.base.uuid, "text", &[self.text.clone()], &languages);
        let localized = localized.into_iter().next().unwrap_or_default();
        let text = evaluate_trimmed(run, &localized, log_event);
        let audio_url = run.get_text(self.base.uuid, "audio_url", &self.audio_url, &languages);

        if text.is_empty() && audio_url.is_empty() {
            log_event(Event::error(
                "Can't say message without audio URL or backdown text",
            ));
            return Ok(());
        }

        let Some(call) = session_call(run, log_event) else {
            return Ok(());
        };
        let locale = current_locale(run, language.as_deref());
        log_ivr(&call, text, &audio_url, locale, log_event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// play_audio
// ---------------------------------------------------------------------------

/// Plays a recording from an evaluated URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayAudio {
    #[serde(flatten)]
    pub base: ActionBase,
    pub audio_url: String,
}

#[async_trait]
impl Action for PlayAudio {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let languages = languages(run);
        let (localized, language) = run.get_text_array(
            self.base.uuid,
            "audio_url",
            &[self.audio_url.clone()],
            &languages,
        );
        let localized = localized.into_iter().next().unwrap_or_default();
        let audio_url = evaluate_trimmed(run, &localized, log_event);
        if audio_url.is_empty() {
            log_event(Event::error("audio URL evaluated to empty, skipping"));
            return Ok(());
        }

        let Some(call) = session_call(run, log_event) else {
            return Ok(());
        };
        let locale = current_locale(run, language.as_deref());
        log_ivr(&call, String::new(), &audio_url, locale, log_event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// play_msg
// ---------------------------------------------------------------------------

/// Legacy voice action: plays a recording if there is one, otherwise says
/// the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayMsg {
    #[serde(flatten)]
    pub base: ActionBase,
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audio_url: String,
}

#[async_trait]
impl Action for PlayMsg {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let languages = languages(run);
        let localized = run.get_text(self.base.uuid, "text", &self.text, &languages);
        let text = evaluate_trimmed(run, &localized, log_event);
        let audio_url = run.get_text(self.base.uuid, "audio_url", &self.audio_url, &languages);

        if audio_url.is_empty() && text.is_empty() {
            log_event(Event::error(
                "need either audio URL or backdown text, skipping",
            ));
            return Ok(());
        }

        let Some(call) = session_call(run, log_event) else {
            return Ok(());
        };
        let locale = current_locale(run, None);
        log_ivr(&call, text, &audio_url, locale, log_event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// forward_ivr
// ---------------------------------------------------------------------------

fn default_dial_limit() -> u32 {
    60
}

fn default_call_limit() -> u32 {
    7200
}

/// Forwards the call to another number. The caller dials and resumes the
/// session with how that went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardIvr {
    #[serde(flatten)]
    pub base: ActionBase,
    pub urn: String,
    #[serde(default = "default_dial_limit")]
    pub dial_limit_seconds: u32,
    #[serde(default = "default_call_limit")]
    pub call_limit_seconds: u32,
}

#[async_trait]
impl Action for ForwardIvr {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if session_call(run, log_event).is_none() {
            return Ok(());
        }

        let evaluated = evaluate_trimmed(run, &self.urn, log_event);
        let Some(urn) = parse_urn(run, &evaluated) else {
            log_event(Event::error(format!("'{evaluated}' is not a valid URN")));
            return Ok(());
        };

        log_event(Event::new(DialWait {
            urn,
            dial_limit_seconds: self.dial_limit_seconds,
            call_limit_seconds: self.call_limit_seconds,
            expires_on: None,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{execute, read_action};
    use crate::events::EventKind;
    use crate::modifiers::Modifier;
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

    fn ivr_msg(event: &Event) -> &MsgOut {
        match &event.kind {
            EventKind::IvrCreated(e) => &e.msg,
            _ => panic!("expected ivr_created, got {}", event.type_name()),
        }
    }

    #[tokio::test]
    async fn test_say_msg() {
        let mut run = TestSession::builder()
            .call(test_support::voice_call())
            .build_run();
        let name = run.contact().unwrap().name().to_string();
        let events = run_action(
            &mut run,
            json!({
                "type": "say_msg",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "text": "Hello @contact.name"
            }),
        )
        .await;
        let msg = ivr_msg(&events[0]);
        assert_eq!(msg.content.text, format!("Hello {name}"));
        assert_eq!(msg.urn, Some(test_support::voice_call().urn));
    }

    #[tokio::test]
    async fn test_say_nothing() {
        let mut run = TestSession::builder()
            .call(test_support::voice_call())
            .build_run();
        let events = run_action(
            &mut run,
            json!({"type": "say_msg", "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912", "text": "  "}),
        )
        .await;
        match &events[0].kind {
            EventKind::Error(e) => {
                assert_eq!(e.text, "Can't say message without audio URL or backdown text")
            }
            _ => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn test_play_audio() {
        let mut run = TestSession::builder()
            .call(test_support::voice_call())
            .build_run();
        let events = run_action(
            &mut run,
            json!({
                "type": "play_audio",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "audio_url": "http://uploads.temba.io/2353262.m4a"
            }),
        )
        .await;
        assert_eq!(
            ivr_msg(&events[0]).content.attachments,
            vec!["audio:http://uploads.temba.io/2353262.m4a"]
        );
    }

    #[tokio::test]
    async fn test_voice_action_without_call() {
        let mut run = TestSession::builder().build_run();
        let events = run_action(
            &mut run,
            json!({
                "type": "play_audio",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "audio_url": "http://uploads.temba.io/2353262.m4a"
            }),
        )
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].type_name(), "error");
    }

    #[tokio::test]
    async fn test_forward_ivr() {
        let mut run = TestSession::builder()
            .call(test_support::voice_call())
            .build_run();
        let events = run_action(
            &mut run,
            json!({
                "type": "forward_ivr",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "urn": "0788 123 123"
            }),
        )
        .await;
        match &events[0].kind {
            EventKind::DialWait(e) => {
                assert_eq!(e.urn, Urn::from("tel:+250788123123"));
                assert_eq!(e.dial_limit_seconds, 60);
                assert_eq!(e.call_limit_seconds, 7200);
            }
            _ => panic!("expected dial_wait"),
        }
    }
}
