//! Position reports for the bridge display.

use std::net::SocketAddr;

use dlock_core::NodeId;
use error_stack::{Report, ResultExt};
use serde::Serialize;
use tokio::net::UdpSocket;

use crate::PeerError;
use crate::track::Position;

/// `{"senderId": 2, "position": {"x": 250, "y": 300}, "angle": 0.0}`
#[derive(Debug, Clone, Serialize)]
pub struct PositionReport {
    #[serde(rename = "senderId")]
    pub sender: NodeId,
    pub position: Position,
    pub angle: f64,
}

/// Fire-and-forget UDP sender towards the display.
#[derive(Debug)]
pub struct DisplayReporter {
    socket: UdpSocket,
    target: SocketAddr,
}

impl DisplayReporter {
    pub async fn connect(target: SocketAddr) -> Result<Self, Report<PeerError>> {
        let local: SocketAddr = if target.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .change_context(PeerError::Display)
            .attach_with(|| format!("display: {target}"))?;
        Ok(Self { socket, target })
    }

    pub async fn report(&self, report: &PositionReport) -> Result<(), Report<PeerError>> {
        let mut payload = serde_json::to_vec(report).change_context(PeerError::Display)?;
        payload.push(b'\n');
        self.socket
            .send_to(&payload, self.target)
            .await
            .change_context(PeerError::Display)
            .attach_with(|| format!("display: {}", self.target))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_wire_shape() {
        let report = PositionReport {
            sender: NodeId(2),
            position: Position { x: 250, y: 300 },
            angle: 0.5,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"senderId": 2, "position": {"x": 250, "y": 300}, "angle": 0.5})
        );
    }

    #[tokio::test]
    async fn reports_reach_the_display() {
        let display = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reporter = DisplayReporter::connect(display.local_addr().unwrap())
            .await
            .unwrap();

        let report = PositionReport {
            sender: NodeId(1),
            position: Position { x: 1, y: 2 },
            angle: 0.0,
        };
        reporter.report(&report).await.unwrap();

        let mut buf = [0; 256];
        let (len, _) = display.recv_from(&mut buf).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(json["senderId"], 1);
        assert_eq!(json["position"]["y"], 2);
    }
}
