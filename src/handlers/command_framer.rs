use std::time::Duration;

use serde::Serialize;
use strum_macros::{Display, EnumIter};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, instrument, trace};

use crate::error::InteractionError;
use crate::hw::{DeviceSession, WriteMode};
use crate::protocol::EndpointId;
use crate::utils::format_hex;

/// Largest command that fits in one payload frame.
pub const MAX_COMMAND_LEN: usize = 20;

/// Pause after every frame step. The robot drops frames that arrive faster.
pub const STEP_DELAY: Duration = Duration::from_millis(80);

/// Parameter carried by the begin-transaction marker (500, big-endian).
const BEGIN_PARAMETER: [u8; 2] = [0x01, 0xF4];

/// Only the low 24 bits of the byte sum are kept.
const CHECKSUM_MASK: u32 = 0x00FF_FFFF;

/// One step of the command handshake, in transmission order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FrameStep {
    BeginTransaction,
    AnnounceLength,
    Payload,
    Checksum,
    Commit,
    LengthEcho,
    EndTransaction,
}

/// A single write planned for one frame step.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FrameWrite {
    pub step: FrameStep,
    pub endpoint: EndpointId,
    pub payload: Vec<u8>,
    pub mode: WriteMode,
}

impl FrameWrite {
    fn control(step: FrameStep, payload: [u8; 4]) -> Self {
        Self {
            step,
            endpoint: EndpointId::ControlCharacteristic,
            payload: payload.to_vec(),
            mode: WriteMode::WithResponse,
        }
    }
}

/// Errors returned while framing and sending a command.
#[derive(Debug, Error)]
pub enum FramerError {
    #[error("command is {len} bytes long; at most {max} bytes fit in one frame")]
    TooLong { len: usize, max: usize },
    #[error("frame step `{step}` failed")]
    Write {
        step: FrameStep,
        source: InteractionError,
    },
}

impl FramerError {
    /// Returns `true` when the write failed because the link is gone.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Write {
                source: InteractionError::Ble(btleplug::Error::NotConnected),
                ..
            }
        )
    }
}

/// Result of a fully transmitted command.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct FrameReceipt {
    checksum: u32,
    writes: usize,
}

impl FrameReceipt {
    /// The 24-bit checksum word computed for the command.
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

/// Turns command bytes into the robot's seven-step write handshake.
///
/// Steps 1, 2 and 4 to 7 go to the control characteristic with response;
/// step 3 sends the zero-padded 20-byte payload without response. The
/// framer is not reentrant: one command must finish before the next starts
/// on the same session.
pub struct CommandFramer;

impl CommandFramer {
    /// Sum of all command bytes, reduced modulo 2^24.
    #[must_use]
    pub fn checksum(command: &[u8]) -> u32 {
        command
            .iter()
            .fold(0_u32, |sum, byte| sum.wrapping_add(u32::from(*byte)))
            & CHECKSUM_MASK
    }

    /// Builds the ordered writes for a command without touching the transport.
    ///
    /// ```
    /// use braava::{CommandFramer, FrameStep};
    ///
    /// let writes = CommandFramer::plan(&[0x16, 0x03, 0x19]).unwrap();
    /// assert_eq!(7, writes.len());
    /// assert_eq!(FrameStep::Checksum, writes[3].step);
    /// assert_eq!(vec![0x04, 0x00, 0x00, 0x32], writes[3].payload);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`FramerError::TooLong`] for commands longer than
    /// [`MAX_COMMAND_LEN`].
    pub fn plan(command: &[u8]) -> Result<Vec<FrameWrite>, FramerError> {
        let too_long = || FramerError::TooLong {
            len: command.len(),
            max: MAX_COMMAND_LEN,
        };
        if command.len() > MAX_COMMAND_LEN {
            return Err(too_long());
        }
        let len = u8::try_from(command.len()).map_err(|_| too_long())?;

        let mut payload = command.to_vec();
        payload.resize(MAX_COMMAND_LEN, 0x00);

        // The checksum frame carries bits 16..24 and 0..8 of the sum.
        let [_, checksum_high, _, checksum_low] = Self::checksum(command).to_be_bytes();

        Ok(vec![
            FrameWrite::control(
                FrameStep::BeginTransaction,
                [0x01, 0x00, BEGIN_PARAMETER[0], BEGIN_PARAMETER[1]],
            ),
            FrameWrite::control(FrameStep::AnnounceLength, [0x0D, 0x00, 0x00, len]),
            FrameWrite {
                step: FrameStep::Payload,
                endpoint: EndpointId::PayloadCharacteristic,
                payload,
                mode: WriteMode::WithoutResponse,
            },
            FrameWrite::control(
                FrameStep::Checksum,
                [0x04, 0x00, checksum_high, checksum_low],
            ),
            FrameWrite::control(FrameStep::Commit, [0x05, 0x00, 0x00, 0x00]),
            FrameWrite::control(FrameStep::LengthEcho, [0x08, 0x00, 0x00, len]),
            FrameWrite::control(FrameStep::EndTransaction, [0x0E, 0x00, 0x00, len]),
        ])
    }

    /// Sends a command through the full handshake.
    ///
    /// Every write is awaited and followed by [`STEP_DELAY`], including the
    /// last one. The first failed write aborts the remaining steps; steps
    /// already sent are not undone.
    ///
    /// # Errors
    ///
    /// Returns [`FramerError::TooLong`] before any write for oversized
    /// commands, or [`FramerError::Write`] naming the failed step.
    #[instrument(
        skip(session, command),
        level = "debug",
        fields(command = %format_hex(command), len = command.len())
    )]
    pub async fn execute(
        session: &DeviceSession,
        command: &[u8],
    ) -> Result<FrameReceipt, FramerError> {
        let writes = Self::plan(command)?;

        for write in &writes {
            session
                .write_endpoint(write.endpoint, &write.payload, write.mode)
                .await
                .map_err(|source| FramerError::Write {
                    step: write.step,
                    source,
                })?;
            trace!(step = %write.step, payload = %format_hex(&write.payload), "frame step written");
            sleep(STEP_DELAY).await;
        }

        let receipt = FrameReceipt {
            checksum: Self::checksum(command),
            writes: writes.len(),
        };
        debug!(checksum = receipt.checksum, "command handshake complete");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::hw::{FakeBackendConfig, FakeRecorder, HardwareClient, fake_hardware_client};

    async fn fake_session(
        fail_writes: Option<&str>,
        recorder: &FakeRecorder,
    ) -> DeviceSession {
        let config = FakeBackendConfig::builder()
            .scan_fixture("hci0|AA:BB|Altadena|-43".parse().expect("fixture should parse"))
            .maybe_fail_writes(fail_writes.map(|raw| raw.parse().expect("ordinals should parse")))
            .recorder(recorder.clone())
            .build();
        let client = fake_hardware_client(config);
        let devices = client
            .scan(Duration::ZERO)
            .await
            .expect("fake scan should succeed");
        client
            .connect(&devices[0])
            .await
            .expect("fake connect should succeed")
    }

    #[test]
    fn plan_produces_seven_steps_in_order() {
        let writes = CommandFramer::plan(&[0x17, 0x04, 0x1B, 0x00]).expect("start should frame");

        let steps: Vec<FrameStep> = writes.iter().map(|write| write.step).collect();
        assert_eq!(FrameStep::iter().collect::<Vec<_>>(), steps);

        let payloads: Vec<Vec<u8>> = writes.iter().map(|write| write.payload.clone()).collect();
        let mut padded = vec![0x17, 0x04, 0x1B, 0x00];
        padded.resize(20, 0x00);
        assert_eq!(
            vec![
                vec![0x01, 0x00, 0x01, 0xF4],
                vec![0x0D, 0x00, 0x00, 0x04],
                padded,
                vec![0x04, 0x00, 0x00, 0x36],
                vec![0x05, 0x00, 0x00, 0x00],
                vec![0x08, 0x00, 0x00, 0x04],
                vec![0x0E, 0x00, 0x00, 0x04],
            ],
            payloads
        );
    }

    #[test]
    fn plan_routes_payload_without_response() {
        let writes = CommandFramer::plan(&[0x16, 0x03, 0x19]).expect("status should frame");

        for write in &writes {
            if write.step == FrameStep::Payload {
                assert_eq!(EndpointId::PayloadCharacteristic, write.endpoint);
                assert_eq!(WriteMode::WithoutResponse, write.mode);
                assert_eq!(MAX_COMMAND_LEN, write.payload.len());
            } else {
                assert_eq!(EndpointId::ControlCharacteristic, write.endpoint);
                assert_eq!(WriteMode::WithResponse, write.mode);
                assert_eq!(4, write.payload.len());
            }
        }
    }

    #[rstest]
    #[case::start(&[0x17, 0x04, 0x1B, 0x00], 0x36)]
    #[case::dock(&[0x04, 0x04, 0x09, 0x01], 0x12)]
    #[case::status(&[0x16, 0x03, 0x19], 0x32)]
    #[case::full_frame_of_ones(&[0xFF; 20], 0x13EC)]
    fn checksum_sums_bytes(#[case] command: &[u8], #[case] expected: u32) {
        assert_eq!(expected, CommandFramer::checksum(command));
    }

    #[test]
    fn checksum_frame_sends_third_and_first_byte_of_sum() {
        let writes = CommandFramer::plan(&[0xFF; 20]).expect("20 bytes should frame");
        assert_eq!(vec![0x04, 0x00, 0x00, 0xEC], writes[3].payload);
    }

    #[test]
    fn checksum_wraps_at_24_bits() {
        let bytes = vec![0xFF; 0x1_0102];
        assert_eq!(
            (0xFF_u32 * 0x1_0102) & 0x00FF_FFFF,
            CommandFramer::checksum(&bytes)
        );
    }

    #[rstest]
    #[case(1)]
    #[case(20)]
    fn plan_accepts_lengths_up_to_frame_size(#[case] len: usize) {
        let writes = CommandFramer::plan(&vec![0xAA; len]).expect("command should frame");
        assert_eq!(7, writes.len());
        assert_eq!(MAX_COMMAND_LEN, writes[2].payload.len());
        assert_eq!(vec![0xAA; len], writes[2].payload[..len].to_vec());
        assert!(writes[2].payload[len..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn plan_rejects_commands_longer_than_frame() {
        assert_matches!(
            CommandFramer::plan(&[0x01; 21]),
            Err(FramerError::TooLong { len: 21, max: 20 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn execute_writes_every_step_and_waits_between_them() {
        let recorder = FakeRecorder::new();
        let session = fake_session(None, &recorder).await;

        let started = tokio::time::Instant::now();
        let receipt = CommandFramer::execute(&session, &[0x04, 0x04, 0x09, 0x01])
            .await
            .expect("dock should send");

        assert!(started.elapsed() >= STEP_DELAY * 7);
        assert_eq!(7, receipt.writes());
        assert_eq!(0x12, receipt.checksum());
        let expected: Vec<_> = CommandFramer::plan(&[0x04, 0x04, 0x09, 0x01])
            .expect("dock should frame")
            .into_iter()
            .map(|write| (write.endpoint, write.payload, write.mode))
            .collect();
        let recorded: Vec<_> = recorder
            .writes()
            .into_iter()
            .map(|write| (write.endpoint, write.payload, write.mode))
            .collect();
        assert_eq!(expected, recorded);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_stops_at_failed_step() {
        let recorder = FakeRecorder::new();
        let session = fake_session(Some("4"), &recorder).await;

        let result = CommandFramer::execute(&session, &[0x17, 0x04, 0x1B, 0x00]).await;

        assert_matches!(
            result,
            Err(FramerError::Write {
                step: FrameStep::Checksum,
                ..
            })
        );
        assert_eq!(4, recorder.write_attempts());
        assert_eq!(3, recorder.writes().len());
    }

    #[tokio::test]
    async fn execute_rejects_long_command_without_writing() {
        let recorder = FakeRecorder::new();
        let session = fake_session(None, &recorder).await;

        let result = CommandFramer::execute(&session, &[0x00; 21]).await;

        assert_matches!(result, Err(FramerError::TooLong { .. }));
        assert_eq!(0, recorder.write_attempts());
    }

    #[test]
    fn write_error_names_the_step() {
        let error = FramerError::Write {
            step: FrameStep::Checksum,
            source: InteractionError::FakeWriteRejected {
                ordinal: 4,
                endpoint: EndpointId::ControlCharacteristic,
            },
        };
        assert_eq!("frame step `checksum` failed", error.to_string());
    }
}
