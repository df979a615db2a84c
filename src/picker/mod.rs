//! Interactive element picker.
//!
//! A session arms the in-page script from [`script`], waits for the first of a
//! selection, an Escape cancel, the timeout or a host-side cancel, and always
//! disarms the page afterwards. The session holds the picker lease for its whole
//! lifetime, so the controller cannot swap the page out from under it.

pub mod script;

use crate::driver::{MessageReceiver, Page};
use crate::error::{FlowError, Result};
use crate::flow::events::{EventBus, PickerState, RunEvent};
use crate::flow::lifecycle::Lifecycle;
use crate::flow::schema::SelectorType;
use async_trait::async_trait;
use script::{PickerMessage, CHANNEL_NAME, DISARM_SCRIPT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Selector chosen by the user, with the type handlers normalize it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedSelector {
    pub selector: String,
    pub selector_type: SelectorType,
}

/// Obtains a selector by asking the user to click an element.
#[async_trait]
pub trait SelectorPicker: Send + Sync {
    async fn pick(&self, page: &Arc<dyn Page>, cancel: &CancellationToken) -> Result<PickedSelector>;
}

impl PickerState {
    pub fn can_advance_to(self, next: PickerState) -> bool {
        use PickerState::*;
        matches!(
            (self, next),
            (Idle, Arming)
                | (Arming, Armed)
                | (Arming, Idle)
                | (Armed, Resolved)
                | (Armed, Cancelled)
                | (Armed, TimedOut)
                | (Armed, Idle)
                | (Resolved, Idle)
                | (Cancelled, Idle)
                | (TimedOut, Idle)
        )
    }
}

/// State of one picker session; returns to `Idle` when dropped.
struct PickerSession<'a> {
    state: PickerState,
    events: &'a EventBus,
}

impl<'a> PickerSession<'a> {
    fn new(events: &'a EventBus) -> Self {
        Self {
            state: PickerState::Idle,
            events,
        }
    }

    fn advance(&mut self, next: PickerState) {
        if !self.state.can_advance_to(next) {
            tracing::warn!("Unexpected picker transition {:?} -> {:?}", self.state, next);
        }
        tracing::debug!("Picker {:?} -> {:?}", self.state, next);
        self.state = next;
        self.events.emit(RunEvent::PickerStateChanged { state: next });
    }
}

impl Drop for PickerSession<'_> {
    fn drop(&mut self) {
        if self.state != PickerState::Idle {
            self.advance(PickerState::Idle);
        }
    }
}

enum Outcome {
    Message(PickerMessage),
    ChannelClosed,
    TimedOut,
    Cancelled,
}

async fn next_message(rx: &mut MessageReceiver) -> Outcome {
    while let Some(raw) = rx.recv().await {
        match PickerMessage::parse(&raw) {
            Some(message) => return Outcome::Message(message),
            None => tracing::debug!("Ignoring picker channel message: {}", raw),
        }
    }
    Outcome::ChannelClosed
}

/// The CDP-backed picker used by the controller.
#[derive(Clone)]
pub struct ElementPicker {
    lifecycle: Lifecycle,
    timeout: Duration,
    events: EventBus,
}

impl ElementPicker {
    pub fn new(lifecycle: Lifecycle, timeout: Duration, events: EventBus) -> Self {
        Self {
            lifecycle,
            timeout,
            events,
        }
    }
}

#[async_trait]
impl SelectorPicker for ElementPicker {
    async fn pick(&self, page: &Arc<dyn Page>, cancel: &CancellationToken) -> Result<PickedSelector> {
        let _lease = self.lifecycle.try_lock_for_picker()?;
        let mut session = PickerSession::new(&self.events);
        session.advance(PickerState::Arming);

        if let Err(e) = page.evaluate(DISARM_SCRIPT).await {
            tracing::debug!("No previous picker to disarm: {}", e);
        }
        let mut rx = page.open_channel(CHANNEL_NAME).await?;
        if let Err(e) = page.evaluate(&script::arm_script(CHANNEL_NAME)).await {
            let _ = page.close_channel(CHANNEL_NAME).await;
            return Err(e);
        }
        session.advance(PickerState::Armed);
        tracing::info!("Element picker armed, waiting up to {:?}", self.timeout);

        let outcome = tokio::select! {
            outcome = next_message(&mut rx) => outcome,
            _ = tokio::time::sleep(self.timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        if let Err(e) = page.close_channel(CHANNEL_NAME).await {
            tracing::warn!("Failed to remove picker channel: {}", e);
        }
        if let Err(e) = page.evaluate(DISARM_SCRIPT).await {
            tracing::warn!("Failed to disarm picker: {}", e);
        }

        match outcome {
            Outcome::Message(PickerMessage::Selected(picked)) => {
                session.advance(PickerState::Resolved);
                tracing::info!("Picked {:?} selector {}", picked.selector_type, picked.selector);
                Ok(picked)
            }
            Outcome::Message(PickerMessage::Cancelled) | Outcome::Cancelled => {
                session.advance(PickerState::Cancelled);
                Err(FlowError::PickerCancelled)
            }
            Outcome::TimedOut => {
                session.advance(PickerState::TimedOut);
                Err(FlowError::PickerTimedOut(self.timeout.as_secs()))
            }
            Outcome::ChannelClosed => Err(FlowError::driver("Page closed while picking an element")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_transitions() {
        use PickerState::*;
        assert!(Idle.can_advance_to(Arming));
        assert!(Armed.can_advance_to(Resolved));
        assert!(TimedOut.can_advance_to(Idle));
        assert!(!Idle.can_advance_to(Resolved));
        assert!(!Resolved.can_advance_to(Armed));
    }

    #[tokio::test]
    async fn test_session_returns_to_idle_on_drop() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        {
            let mut session = PickerSession::new(&bus);
            session.advance(PickerState::Arming);
            session.advance(PickerState::Armed);
        }
        let states: Vec<PickerState> = std::iter::from_fn(|| match rx.try_recv() {
            Ok(RunEvent::PickerStateChanged { state }) => Some(state),
            _ => None,
        })
        .collect();
        assert_eq!(
            states,
            vec![PickerState::Arming, PickerState::Armed, PickerState::Idle]
        );
    }
}
