use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::command_framer::{CommandFramer, FramerError};
use super::command_table::RobotCommand;
use crate::error::InteractionError;
use crate::hw::{DeviceSession, FoundDevice, HardwareClient, NotificationRunSummary};
use crate::notification::{EmittedNotification, NotificationFilter};
use crate::protocol::EndpointId;

/// Pause after a command so the robot can act on it before the next one.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Errors returned while dispatching a named command.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown command `{name}`")]
    UnknownCommand { name: String },
    #[error(transparent)]
    Framer(#[from] FramerError),
}

impl DispatchError {
    /// Returns `true` when the session can no longer be used.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::UnknownCommand { .. } => false,
            Self::Framer(error) => error.is_connection_lost(),
        }
    }
}

/// What was sent for one successfully dispatched command.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DispatchReceipt {
    command: RobotCommand,
    bytes: Vec<u8>,
    checksum: u32,
    writes: usize,
}

impl DispatchReceipt {
    /// The dispatched command.
    #[must_use]
    pub fn command(&self) -> RobotCommand {
        self.command
    }

    /// Command bytes before padding.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The 24-bit checksum word of the command bytes.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Number of writes performed.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }
}

#[derive(Debug)]
struct Subscription {
    emitted: mpsc::UnboundedReceiver<EmittedNotification>,
    filter_task: JoinHandle<NotificationRunSummary>,
}

/// One open robot connection with sequential command dispatch.
///
/// Notifications are filtered on their own task and queued for the caller,
/// so dispatch never waits on them. Always finish with
/// [`ControlSession::close`] to release the connection.
#[derive(Debug)]
pub struct ControlSession {
    session: DeviceSession,
    subscription: Option<Subscription>,
}

impl ControlSession {
    /// Opens a connection to a discovered robot.
    ///
    /// # Errors
    ///
    /// Returns an error when the robot cannot be reached or lacks a required
    /// endpoint.
    #[instrument(skip(client, device), level = "debug", fields(device_id = device.device_id()))]
    pub async fn open(
        client: &dyn HardwareClient,
        device: &FoundDevice,
    ) -> Result<Self, InteractionError> {
        let session = client.connect(device).await?;
        Ok(Self {
            session,
            subscription: None,
        })
    }

    /// Returns the connected robot.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        self.session.device()
    }

    /// Subscribes to status notifications and hands them to `filter`.
    ///
    /// The filter runs on a dedicated task for the rest of the session. A
    /// second call replaces the previous subscription.
    ///
    /// # Errors
    ///
    /// Returns an error when the notify characteristic cannot be subscribed.
    #[instrument(skip(self, filter), level = "debug")]
    pub async fn subscribe(&mut self, filter: NotificationFilter) -> Result<(), InteractionError> {
        let feed = self
            .session
            .subscribe_endpoint(EndpointId::NotifyCharacteristic)
            .await?;
        let (emitted_tx, emitted) = mpsc::unbounded_channel();
        let filter_task = tokio::spawn(filter.run(feed, emitted_tx));

        if let Some(previous) = self.subscription.replace(Subscription {
            emitted,
            filter_task,
        }) {
            previous.filter_task.abort();
        }
        Ok(())
    }

    /// Resolves `name` in the command table and sends it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownCommand`] without writing anything when
    /// the name is not in the table, or the framer error when sending fails.
    /// The session stays usable after either.
    pub async fn dispatch(&self, name: &str) -> Result<DispatchReceipt, DispatchError> {
        let command = RobotCommand::lookup(name).ok_or_else(|| DispatchError::UnknownCommand {
            name: name.to_string(),
        })?;
        self.send(command).await
    }

    /// Sends a command from the table.
    ///
    /// # Errors
    ///
    /// Returns the framer error when any handshake write fails.
    #[instrument(skip(self), level = "info", fields(%command))]
    pub async fn send(&self, command: RobotCommand) -> Result<DispatchReceipt, DispatchError> {
        let frame = CommandFramer::execute(&self.session, command.bytes()).await?;
        info!(checksum = frame.checksum(), "command sent");
        Ok(DispatchReceipt {
            command,
            bytes: command.bytes().to_vec(),
            checksum: frame.checksum(),
            writes: frame.writes(),
        })
    }

    /// Returns the next already-filtered notification, if one is queued.
    pub fn try_next_notification(&mut self) -> Option<EmittedNotification> {
        self.subscription
            .as_mut()
            .and_then(|subscription| subscription.emitted.try_recv().ok())
    }

    /// Returns every queued notification.
    pub fn drain_notifications(&mut self) -> Vec<EmittedNotification> {
        std::iter::from_fn(|| self.try_next_notification()).collect()
    }

    /// Waits for the next filtered notification. Returns `None` when not
    /// subscribed or once the notification feed has closed.
    pub async fn next_notification(&mut self) -> Option<EmittedNotification> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.emitted.recv().await,
            None => None,
        }
    }

    /// Releases the connection and collects the notification counters.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport fails to disconnect.
    #[instrument(skip(self), level = "debug", fields(device_id = self.device().device_id()))]
    pub async fn close(self) -> Result<NotificationRunSummary, InteractionError> {
        let Self {
            session,
            subscription,
        } = self;

        if let Err(error) = session.close().await {
            if let Some(subscription) = subscription {
                subscription.filter_task.abort();
            }
            return Err(error);
        }

        let Some(subscription) = subscription else {
            return Ok(NotificationRunSummary::default());
        };
        drop(subscription.emitted);
        match subscription.filter_task.await {
            Ok(summary) => {
                debug!(?summary, "notification filter finished");
                Ok(summary)
            }
            Err(error) => {
                warn!(%error, "notification filter task ended abnormally");
                Ok(NotificationRunSummary::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::{FakeBackendConfig, FakeRecorder, fake_hardware_client};

    async fn open_fake(
        notifications: Option<&str>,
        recorder: &FakeRecorder,
    ) -> ControlSession {
        let config = FakeBackendConfig::builder()
            .scan_fixture("hci0|AA:BB|Altadena|-43".parse().expect("fixture should parse"))
            .maybe_notifications(
                notifications.map(|raw| raw.parse().expect("payloads should parse")),
            )
            .recorder(recorder.clone())
            .build();
        let client = fake_hardware_client(config);
        let devices = client
            .scan(Duration::ZERO)
            .await
            .expect("fake scan should succeed");
        ControlSession::open(client.as_ref(), &devices[0])
            .await
            .expect("fake connect should succeed")
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_sends_known_command() {
        let recorder = FakeRecorder::new();
        let session = open_fake(None, &recorder).await;

        let receipt = session.dispatch("status").await.expect("status should send");

        assert_eq!(RobotCommand::Status, receipt.command());
        assert_eq!(&[0x16, 0x03, 0x19], receipt.bytes());
        assert_eq!(0x32, receipt.checksum());
        assert_eq!(7, receipt.writes());
        assert_eq!(7, recorder.writes().len());
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_name_without_writing() {
        let recorder = FakeRecorder::new();
        let session = open_fake(None, &recorder).await;

        let result = session.dispatch("mop").await;

        assert_matches!(result, Err(DispatchError::UnknownCommand { name }) if name == "mop");
        assert_eq!(0, recorder.write_attempts());
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn subscribe_filters_notifications_on_task() {
        let recorder = FakeRecorder::new();
        let mut session = open_fake(Some("0500,0600,0600,0700,0900,01"), &recorder).await;
        session
            .subscribe(NotificationFilter::new())
            .await
            .expect("subscribe should succeed");

        let mut values = Vec::new();
        while let Some(notification) = session.next_notification().await {
            values.push(notification.value);
        }
        assert_eq!(vec![5, 7, 9], values);

        let summary = session.close().await.expect("close should succeed");
        assert_eq!(6, summary.received());
        assert_eq!(3, summary.emitted());
        assert_eq!(2, summary.suppressed());
        assert_eq!(1, summary.malformed());
        assert_eq!(1, recorder.disconnects());
    }

    #[tokio::test]
    async fn close_without_subscription_reports_empty_summary() {
        let recorder = FakeRecorder::new();
        let mut session = open_fake(None, &recorder).await;

        assert_eq!(None, session.next_notification().await);
        assert!(session.drain_notifications().is_empty());
        let summary = session.close().await.expect("close should succeed");

        assert_eq!(NotificationRunSummary::default(), summary);
        assert_eq!(1, recorder.disconnects());
    }
}
