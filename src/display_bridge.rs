use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::control::{ControlCommand, ControlEvent, ControlPlane};
use crate::dsp::Mode;

/// 显示进程（OLED/LED/触摸）发来的消息
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayMessage {
    /// 触摸传感器上升沿
    ToggleMute,
    SetMode { mode: u32 },
    SetMix { mix: f32 },
}

impl DisplayMessage {
    pub fn into_event(self, at: Instant) -> Option<ControlEvent> {
        match self {
            DisplayMessage::ToggleMute => Some(ControlEvent::MuteEdge(at)),
            DisplayMessage::SetMode { mode } => {
                Mode::from_u32(mode).map(|m| ControlEvent::Command(ControlCommand::SetMode(m)))
            }
            DisplayMessage::SetMix { mix } => Some(ControlEvent::Command(ControlCommand::SetMix(mix))),
        }
    }
}

pub struct DisplayBridge {
    socket: Arc<UdpSocket>,
    target_addr: String,
    tx: mpsc::Sender<ControlEvent>,
}

// 显示进程和本进程通过本地UDP通信，端口在配置中指定
impl DisplayBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<ControlEvent>) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(format!("127.0.0.1:{}", config.telemetry_local_port)).await?;
        let target_addr = format!("127.0.0.1:{}", config.telemetry_remote_port);
        Self::with_socket(socket, target_addr, tx)
    }

    pub fn with_socket(
        socket: UdpSocket,
        target_addr: String,
        tx: mpsc::Sender<ControlEvent>,
    ) -> anyhow::Result<Self> {
        log::info!(
            "Display bridge: local={}, remote={}",
            socket.local_addr()?,
            target_addr
        );
        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            tx,
        })
    }

    /// 接收显示进程的输入事件（静音切换等），转发到控制通道
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = [0u8; 1024];
        loop {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            let at = Instant::now();
            let msg = match serde_json::from_slice::<DisplayMessage>(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    log::debug!("Ignoring display message: {}", e);
                    continue;
                }
            };
            let Some(event) = msg.into_event(at) else {
                continue;
            };
            if self.tx.send(event).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// 按固定节奏读取控制面快照并推送给显示进程，快照不变时不发送
    pub async fn publish(&self, plane: Arc<ControlPlane>, interval: Duration) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last = None;
        loop {
            ticker.tick().await;
            let snapshot = plane.snapshot();
            if last == Some(snapshot) {
                continue;
            }
            last = Some(snapshot);
            let msg = serde_json::to_string(&snapshot)?;
            if let Err(e) = self.socket.send_to(msg.as_bytes(), &self.target_addr).await {
                log::debug!("Display not reachable: {}", e);
            }
        }
    }
}
