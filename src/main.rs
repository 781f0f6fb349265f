use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;

use denoise_relay::config::Config;
use denoise_relay::control::{self, ControlEvent, ControlPlane};
use denoise_relay::display_bridge::DisplayBridge;
use denoise_relay::session::{Session, SessionEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::new().map_err(|e| anyhow::anyhow!(e))?;
    log::info!(
        "Role={}, rate={}Hz, frame={} samples ({} bytes, {:?}), delay={}s ({} frames), wire={}",
        config.role,
        config.sample_rate,
        config.samples_per_frame,
        config.frame_bytes(),
        config.frame_duration(),
        config.delay_seconds,
        config.delay_frames(),
        config.wire_format,
    );

    // 控制面：音频线程每帧读取一次
    let plane = Arc::new(ControlPlane::new(config.initial_mode, config.initial_mix));

    // 控制事件通道（stdin命令、显示进程的触摸事件）
    let (tx_control, rx_control) = mpsc::channel::<ControlEvent>(32);
    tokio::spawn(control::run_control_loop(
        rx_control,
        plane.clone(),
        config.mute_cooldown(),
    ));

    if config.stdin_commands {
        control::spawn_stdin_reader(tx_control.clone()).context("Failed to start stdin reader")?;
    }

    // 显示进程桥接
    if config.telemetry_enabled {
        let bridge = Arc::new(DisplayBridge::new(&config, tx_control.clone()).await?);
        let bridge_clone = bridge.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge_clone.run().await {
                log::error!("Display bridge error: {}", e);
            }
        });
        let interval = Duration::from_millis(config.telemetry_interval_ms.max(1));
        let plane_clone = plane.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.publish(plane_clone, interval).await {
                log::error!("Display publish error: {}", e);
            }
        });
    }
    drop(tx_control);

    // 会话事件通道
    let (tx_session, mut rx_session) = mpsc::channel::<SessionEvent>(8);
    let mut session = Session::start(&config, plane.clone(), tx_session)?;

    let mut failure = None;
    loop {
        tokio::select! {
            // 处理 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }
            Some(event) = rx_session.recv() => {
                match event {
                    SessionEvent::Connected(peer) => {
                        log::info!("Session connected: {}", peer);
                    }
                    SessionEvent::Finished(stats) => {
                        log::info!("Session finished: {:?}", stats);
                        break;
                    }
                    SessionEvent::Failed(reason) => {
                        failure = Some(reason);
                        break;
                    }
                }
            }
            else => break,
        }
    }

    // 停止音频线程，释放设备、套接字和降噪器
    tokio::task::spawn_blocking(move || session.stop()).await?;

    match failure {
        Some(reason) => Err(anyhow::anyhow!("Session failed: {}", reason)),
        None => Ok(()),
    }
}
