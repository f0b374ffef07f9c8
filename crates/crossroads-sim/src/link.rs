//! Connection to the bridge's device port.
//!
//! One task drives both directions: it sleeps until the current phase
//! ends while reading manual commands from the bridge, and writes a
//! report line after every change of lights.

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crossroads_types::{LineDecoder, ManualDirective, encode_line};

use crate::config::SimConfig;
use crate::controller::{Applied, SignalController};
use crate::error::SimError;

/// Bytes read from the bridge per call.
const READ_CHUNK: usize = 1024;

/// Connect to the bridge and run until it closes the connection.
pub async fn run(config: &SimConfig) -> Result<(), SimError> {
    let stream = TcpStream::connect(&config.bridge_addr)
        .await
        .map_err(|source| SimError::Connect {
            addr: config.bridge_addr.clone(),
            source,
        })?;
    info!(addr = config.bridge_addr, "Connected to bridge server");

    drive(stream, SignalController::new(config.timings)).await
}

/// Run `controller` over an established connection.
///
/// Returns `Ok` when the bridge closes the stream.
pub async fn drive(stream: TcpStream, mut controller: SignalController) -> Result<(), SimError> {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = LineDecoder::new();
    let mut buf = vec![0_u8; READ_CHUNK];

    send_report(&mut writer, &controller).await?;
    let mut deadline = next_deadline(&controller);

    loop {
        tokio::select! {
            () = wait_until(deadline) => {
                controller.advance();
                send_report(&mut writer, &controller).await?;
                deadline = next_deadline(&controller);
            }
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    info!(residue = decoder.pending(), "Connection closed by bridge server");
                    return Ok(());
                }
                let chunk = buf.get(..n).unwrap_or_default();
                for decoded in decoder.decode(chunk) {
                    match decoded {
                        Ok(value) => {
                            if apply_command(&mut controller, &value) {
                                send_report(&mut writer, &controller).await?;
                                deadline = next_deadline(&controller);
                            }
                        }
                        Err(e) => warn!(line = e.line, error = %e.source, "Received invalid JSON"),
                    }
                }
            }
        }
    }
}

/// Apply one command from the bridge. Returns whether the lights changed.
fn apply_command(controller: &mut SignalController, value: &Value) -> bool {
    let Value::Object(command) = value else {
        warn!(%value, "Ignoring non-object command");
        return false;
    };

    let directive = ManualDirective::interpret(command);
    match controller.apply(&directive) {
        Applied::Changed => {
            match directive {
                ManualDirective::Override { lane, color } => {
                    info!(lane, %color, "Manual mode ON");
                }
                _ => info!("Manual mode OFF, resuming automatic cycle"),
            }
            true
        }
        Applied::Ignored => {
            debug!("Resume received while already automatic");
            false
        }
        Applied::Rejected(reason) => {
            warn!(reason, "Invalid manual command received");
            false
        }
    }
}

async fn send_report(
    writer: &mut OwnedWriteHalf,
    controller: &SignalController,
) -> Result<(), SimError> {
    let report = controller.report();
    let line = encode_line(&report)?;
    writer.write_all(line.as_bytes()).await?;
    debug!(lights = report.summary(), manual = controller.is_manual(), "report sent");
    Ok(())
}

fn next_deadline(controller: &SignalController) -> Option<Instant> {
    controller
        .phase_duration()
        .and_then(|d| Instant::now().checked_add(d))
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader, Lines};
    use tokio::net::TcpListener;
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::time::timeout;

    use super::*;
    use crate::controller::PhaseTimings;

    const WAIT: Duration = Duration::from_secs(3);

    type BridgeLines = Lines<BufReader<OwnedReadHalf>>;
    type SimTask = tokio::task::JoinHandle<Result<(), SimError>>;

    /// Accept the simulator on a local listener, playing the bridge.
    async fn pair(timings: PhaseTimings) -> (BridgeLines, OwnedWriteHalf, SimTask) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sim = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await?;
            drive(stream, SignalController::new(timings)).await
        });
        let (bridge, _) = listener.accept().await.unwrap();
        let (read, write) = bridge.into_split();
        (BufReader::new(read).lines(), write, sim)
    }

    async fn next_statuses(lines: &mut BridgeLines) -> Vec<String> {
        let line = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();
        let report: Value = serde_json::from_str(&line).unwrap();
        report["intersection"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["status"].as_str().unwrap().to_owned())
            .collect()
    }

    fn slow() -> PhaseTimings {
        PhaseTimings {
            green: Duration::from_secs(60),
            yellow: Duration::from_secs(60),
            all_red: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn automatic_cycle_reports_every_phase() {
        let timings = PhaseTimings {
            green: Duration::from_millis(20),
            yellow: Duration::from_millis(20),
            all_red: Duration::from_millis(20),
        };
        let (mut lines, _write, _sim) = pair(timings).await;

        assert_eq!(next_statuses(&mut lines).await, ["GREEN", "RED", "RED", "RED"]);
        assert_eq!(next_statuses(&mut lines).await, ["YELLOW", "RED", "RED", "RED"]);
        assert_eq!(next_statuses(&mut lines).await, ["RED", "RED", "RED", "RED"]);
        assert_eq!(next_statuses(&mut lines).await, ["RED", "GREEN", "RED", "RED"]);
    }

    #[tokio::test]
    async fn manual_override_then_resume() {
        let (mut lines, mut write, _sim) = pair(slow()).await;
        assert_eq!(next_statuses(&mut lines).await, ["GREEN", "RED", "RED", "RED"]);

        let command = json!({"manual_control": true, "lane": 3, "color": "YELLOW"});
        write.write_all(encode_line(&command).unwrap().as_bytes()).await.unwrap();
        assert_eq!(next_statuses(&mut lines).await, ["RED", "RED", "YELLOW", "RED"]);

        // Invalid and malformed commands produce no report.
        write
            .write_all(b"{\"manual_control\":true,\"lane\":9,\"color\":\"GREEN\"}\n{oops\n")
            .await
            .unwrap();
        write.write_all(b"{\"manual_control\":false}\n").await.unwrap();
        assert_eq!(next_statuses(&mut lines).await, ["RED", "RED", "RED", "RED"]);
    }

    #[tokio::test]
    async fn exits_cleanly_when_bridge_closes() {
        let (mut lines, write, sim) = pair(slow()).await;
        next_statuses(&mut lines).await;
        drop(lines);
        drop(write);

        let result = timeout(WAIT, sim).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
