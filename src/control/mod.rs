//! Newline-delimited JSON control channel.
//!
//! One request object per input line; every request is answered with one or
//! more event lines. Timer notices are pushed as they happen, so a client
//! sees the countdown without polling.

use crate::error::AppError;
use crate::orchestrator::{HotkeyAction, HotkeyOutcome, RestoreOutcome, SessionOrchestrator, SessionView};
use crate::session::{RestoreReport, SaveAction, SaveOutcome};
use crate::timer::TimerNotice;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Read, Write};
use std::sync::{Arc, Mutex, Weak};

/// Longest request line accepted.
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Save,
    Restore {
        #[serde(default)]
        now: bool,
    },
    CancelTimer,
    ClearSession,
    GetState,
    SetSetting {
        key: String,
        value: serde_json::Value,
    },
    Hotkey {
        action: HotkeyAction,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    State(SessionView),
    Saved {
        action: SaveAction,
        app_count: usize,
        excluded: usize,
        failed: usize,
    },
    Restored {
        opened: usize,
        failed: usize,
    },
    Scheduled {
        delay_secs: u64,
    },
    Timer {
        notice: TimerNotice,
    },
    Error {
        message: String,
    },
    Warning {
        message: String,
    },
}

impl OutgoingMessage {
    fn error(e: &AppError) -> Self {
        OutgoingMessage::Error { message: e.to_string() }
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

fn write_message(out: &SharedWriter, message: &OutgoingMessage) -> io::Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');

    let mut out = out.lock().unwrap_or_else(|p| p.into_inner());
    out.write_all(&line)?;
    out.flush()
}

fn restored_messages(report: &RestoreReport, messages: &mut Vec<OutgoingMessage>) {
    messages.push(OutgoingMessage::Restored {
        opened: report.opened(),
        failed: report.failed(),
    });
    if let Some(message) = &report.persistence_warning {
        messages.push(OutgoingMessage::Warning {
            message: message.clone(),
        });
    }
}

fn saved_messages(outcome: &SaveOutcome, messages: &mut Vec<OutgoingMessage>) {
    messages.push(OutgoingMessage::Saved {
        action: outcome.action,
        app_count: outcome.snapshot.len(),
        excluded: outcome.excluded,
        failed: outcome.failed(),
    });
    if let Some(message) = &outcome.persistence_warning {
        messages.push(OutgoingMessage::Warning {
            message: message.clone(),
        });
    }
}

fn restore_messages(outcome: &RestoreOutcome, messages: &mut Vec<OutgoingMessage>) {
    match outcome {
        RestoreOutcome::Scheduled { delay_secs } => messages.push(OutgoingMessage::Scheduled {
            delay_secs: *delay_secs,
        }),
        RestoreOutcome::Restored(report) => restored_messages(report, messages),
    }
}

/// Textual form of a JSON setting value.
fn setting_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(items) => serde_json::to_string(items).unwrap_or_default(),
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) | serde_json::Value::Object(_) => {
            value.to_string()
        }
    }
}

pub struct ControlHost {
    orchestrator: Arc<SessionOrchestrator>,
    out: SharedWriter,
}

impl ControlHost {
    /// Build a host writing events to `writer`, and route timer notices to it.
    pub fn new(orchestrator: Arc<SessionOrchestrator>, writer: Box<dyn Write + Send>) -> Self {
        let out: SharedWriter = Arc::new(Mutex::new(writer));

        let listener_out = Arc::clone(&out);
        let weak: Weak<SessionOrchestrator> = Arc::downgrade(&orchestrator);
        orchestrator.set_timer_listener(Arc::new(move |notice: &TimerNotice| {
            let mut messages = vec![OutgoingMessage::Timer {
                notice: notice.clone(),
            }];
            let settled = matches!(
                notice,
                TimerNotice::Fired { .. } | TimerNotice::Failed { .. } | TimerNotice::Cancelled
            );
            if settled {
                if let Some(orchestrator) = weak.upgrade() {
                    messages.push(OutgoingMessage::State(orchestrator.view()));
                }
            }
            for message in &messages {
                if let Err(e) = write_message(&listener_out, message) {
                    warn!("Failed to send timer notice: {e}");
                }
            }
        }));

        Self { orchestrator, out }
    }

    /// Serve requests until `reader` reaches end of input.
    pub fn run<R: BufRead>(&self, mut reader: R) -> io::Result<()> {
        let limit = u64::try_from(MAX_MESSAGE_SIZE + 1).unwrap_or(u64::MAX);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if (&mut reader).take(limit).read_until(b'\n', &mut buf)? == 0 {
                break;
            }

            let messages = if buf.len() > MAX_MESSAGE_SIZE && buf.last() != Some(&b'\n') {
                let skipped = discard_line(&mut reader)?;
                vec![too_large(buf.len() + skipped)]
            } else {
                match std::str::from_utf8(&buf) {
                    Ok(text) => {
                        let line = text.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if line.len() > MAX_MESSAGE_SIZE {
                            vec![too_large(line.len())]
                        } else {
                            match serde_json::from_str::<IncomingMessage>(line) {
                                Ok(message) => self.handle_message(message),
                                Err(e) => vec![OutgoingMessage::Error {
                                    message: format!("Invalid request: {e}"),
                                }],
                            }
                        }
                    }
                    Err(e) => vec![OutgoingMessage::Error {
                        message: format!("Invalid request: {e}"),
                    }],
                }
            };

            for message in &messages {
                write_message(&self.out, message)?;
            }
        }
        debug!("Control input closed");
        Ok(())
    }

    pub fn handle_message(&self, message: IncomingMessage) -> Vec<OutgoingMessage> {
        debug!("Control request: {message:?}");
        let mut messages = Vec::new();

        match message {
            IncomingMessage::GetState => {}
            IncomingMessage::Save => match self.orchestrator.save() {
                Ok(outcome) => saved_messages(&outcome, &mut messages),
                Err(e) => messages.push(OutgoingMessage::error(&e)),
            },
            IncomingMessage::Restore { now } => {
                let result = if now {
                    self.orchestrator.restore_now().map(RestoreOutcome::Restored)
                } else {
                    self.orchestrator.restore()
                };
                match result {
                    Ok(outcome) => restore_messages(&outcome, &mut messages),
                    Err(e) => messages.push(OutgoingMessage::error(&e)),
                }
            }
            IncomingMessage::CancelTimer => {
                if !self.orchestrator.cancel_timer() {
                    debug!("No pending restore to cancel");
                }
            }
            IncomingMessage::ClearSession => {
                let outcome = self.orchestrator.clear_session();
                if let Some(message) = outcome.persistence_warning {
                    messages.push(OutgoingMessage::Warning { message });
                }
            }
            IncomingMessage::SetSetting { key, value } => {
                match self.orchestrator.set_setting(&key, &setting_text(&value)) {
                    Ok(None) => {}
                    Ok(Some(message)) => messages.push(OutgoingMessage::Warning { message }),
                    Err(e) => messages.push(OutgoingMessage::error(&e)),
                }
            }
            IncomingMessage::Hotkey { action } => match self.orchestrator.handle_hotkey(action) {
                Ok(HotkeyOutcome::Saved(outcome)) => saved_messages(&outcome, &mut messages),
                Ok(HotkeyOutcome::Restore(outcome)) => restore_messages(&outcome, &mut messages),
                Err(e) => messages.push(OutgoingMessage::error(&e)),
            },
        }

        messages.push(OutgoingMessage::State(self.orchestrator.view()));
        messages
    }
}

fn too_large(len: usize) -> OutgoingMessage {
    warn!("Rejected control message of {len} bytes");
    OutgoingMessage::Error {
        message: format!("Message too large: {len} bytes (max: {MAX_MESSAGE_SIZE} bytes)"),
    }
}

/// Skip the rest of the current line without buffering it. Returns the
/// number of bytes skipped, not counting the newline.
fn discard_line<R: BufRead>(reader: &mut R) -> io::Result<usize> {
    let mut skipped = 0;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(skipped);
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(skipped + pos);
        }
        let len = available.len();
        reader.consume(len);
        skipped += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::platform::ProcessActions;
    use crate::test_utils::{sample_app, setup_shared_db, FakeActions};
    use serde_json::Value;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn messages(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn host(count: usize) -> (ControlHost, SharedBuf, Arc<FakeActions>, Arc<Mutex<Database>>, TempDir) {
        let (db, dir) = setup_shared_db();
        let apps = (0..count)
            .map(|i| sample_app(&format!("com.example.app{i}")))
            .collect();
        let actions = Arc::new(FakeActions::new(apps));
        let orchestrator = Arc::new(
            SessionOrchestrator::new(&db, Arc::clone(&actions) as Arc<dyn ProcessActions>).unwrap(),
        );
        let buf = SharedBuf::default();
        let host = ControlHost::new(orchestrator, Box::new(buf.clone()));
        (host, buf, actions, db, dir)
    }

    fn types(messages: &[Value]) -> Vec<&str> {
        messages.iter().filter_map(|m| m["type"].as_str()).collect()
    }

    #[test]
    fn test_get_state_on_empty_store() {
        let (host, buf, _actions, _db, _dir) = host(1);

        host.run(&b"{\"type\":\"get_state\"}\n"[..]).unwrap();

        let messages = buf.messages();
        assert_eq!(types(&messages), vec!["state"]);
        assert_eq!(messages[0]["has_session"], false);
        assert_eq!(messages[0]["is_save_enabled"], true);
    }

    #[test]
    fn test_save_and_restore_over_the_wire() {
        let (host, buf, actions, _db, _dir) = host(3);
        let input = "{\"type\":\"save\"}\n\n{\"type\":\"restore\"}\n";

        host.run(input.as_bytes()).unwrap();

        let messages = buf.messages();
        assert_eq!(types(&messages), vec!["saved", "state", "restored", "state"]);
        assert_eq!(messages[0]["app_count"], 3);
        assert_eq!(messages[0]["action"], "hide");
        assert_eq!(messages[1]["session_label"], "3 apps");
        assert_eq!(messages[2]["opened"], 3);
        assert_eq!(messages[3]["has_session"], false);
        assert_eq!(actions.opened().len(), 3);
    }

    #[test]
    fn test_invalid_request_reports_error_and_continues() {
        let (host, buf, _actions, _db, _dir) = host(1);
        let input = "not json\n{\"type\":\"launch_rockets\"}\n{\"type\":\"get_state\"}\n";

        host.run(input.as_bytes()).unwrap();

        assert_eq!(types(&buf.messages()), vec!["error", "error", "state"]);
    }

    #[test]
    fn test_oversized_line_is_skipped_and_reading_continues() {
        let (host, buf, _actions, _db, _dir) = host(1);
        let mut input = vec![b'x'; MAX_MESSAGE_SIZE + 4096];
        input.extend_from_slice(b"\n{\"type\":\"get_state\"}\n");

        host.run(&input[..]).unwrap();

        let messages = buf.messages();
        assert_eq!(types(&messages), vec!["error", "state"]);
        let error = messages[0]["message"].as_str().unwrap();
        assert!(error.starts_with("Message too large"), "{error}");
    }

    #[test]
    fn test_invalid_utf8_line_reports_error_and_continues() {
        let (host, buf, _actions, _db, _dir) = host(1);
        let input = b"\xff\xfe\n{\"type\":\"get_state\"}\n";

        host.run(&input[..]).unwrap();

        assert_eq!(types(&buf.messages()), vec!["error", "state"]);
    }

    #[test]
    fn test_restore_without_session_is_error() {
        let (host, buf, _actions, _db, _dir) = host(1);

        host.run(&b"{\"type\":\"restore\"}\n"[..]).unwrap();

        let messages = buf.messages();
        assert_eq!(types(&messages), vec!["error", "state"]);
        assert_eq!(messages[0]["message"], "No saved session");
    }

    #[test]
    fn test_scheduled_restore_can_be_cancelled() {
        let (host, buf, actions, _db, _dir) = host(2);
        let input = concat!(
            "{\"type\":\"set_setting\",\"key\":\"wait_before_restore\",\"value\":true}\n",
            "{\"type\":\"save\"}\n",
            "{\"type\":\"restore\"}\n",
            "{\"type\":\"cancel_timer\"}\n",
        );

        host.run(input.as_bytes()).unwrap();

        let messages = buf.messages();
        let scheduled = messages.iter().find(|m| m["type"] == "scheduled").unwrap();
        assert_eq!(scheduled["delay_secs"], 10);
        assert!(messages
            .iter()
            .any(|m| m["type"] == "timer" && m["notice"]["event"] == "cancelled"));
        let last = messages.last().unwrap();
        assert_eq!(last["type"], "state");
        assert_eq!(last["is_timer_visible"], false);
        assert_eq!(last["has_session"], true);
        assert!(actions.opened().is_empty());
    }

    #[test]
    fn test_set_setting_accepts_lists_and_reports_invalid_values() {
        let (host, buf, _actions, _db, _dir) = host(1);
        let input = concat!(
            "{\"type\":\"set_setting\",\"key\":\"custom_ignored_bundle_ids\",\"value\":[\"com.example.chat\"]}\n",
            "{\"type\":\"set_setting\",\"key\":\"ignore_system_apps\",\"value\":\"maybe\"}\n",
        );

        host.run(input.as_bytes()).unwrap();

        let messages = buf.messages();
        assert_eq!(types(&messages), vec!["state", "error", "state"]);
        assert_eq!(
            messages[0]["settings"]["custom_ignored_bundle_ids"],
            serde_json::json!(["com.example.chat"])
        );
    }

    #[test]
    fn test_hotkey_request() {
        let (host, buf, actions, _db, _dir) = host(2);

        host.run(&b"{\"type\":\"hotkey\",\"action\":\"save\"}\n"[..]).unwrap();

        assert_eq!(types(&buf.messages()), vec!["saved", "state"]);
        assert_eq!(actions.hidden().len(), 2);
    }

    #[test]
    fn test_setting_text() {
        assert_eq!(setting_text(&Value::Bool(true)), "true");
        assert_eq!(setting_text(&Value::String("1 hour".to_string())), "1 hour");
        assert_eq!(setting_text(&Value::Null), "");
    }
}
