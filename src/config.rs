use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;

use crate::dsp::{Mode, NATIVE_FRAME_SIZE, NATIVE_SAMPLE_RATE};
use crate::protocol::WireFormat;

/// 会话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 监听端口，接收、处理并播放
    Receiver,
    /// 主动连接，采集并发送
    Sender,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receiver" | "rx" => Ok(Role::Receiver),
            "sender" | "tx" => Ok(Role::Sender),
            other => Err(format!("unknown session role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Receiver => f.write_str("receiver"),
            Role::Sender => f.write_str("sender"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // 会话配置
    pub role: Role,
    pub listen_ip: &'static str,
    pub peer_ip: &'static str,
    pub port: u16,

    // 音频配置
    pub sample_rate: u32,
    pub samples_per_frame: usize,
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub capture_channels: u32,
    pub playback_channels: u32,
    pub playback_period_size: usize,

    // 传输格式
    pub wire_format: WireFormat,

    // DSP 配置
    pub initial_mode: Mode,
    pub initial_mix: f32,
    pub hpf_cutoff_hz: f64,
    pub denoiser: bool,
    pub sender_dsp: bool,
    pub denoiser_libs: Vec<&'static str>,

    // 延迟线
    pub delay_seconds: f64,

    // 控制输入
    pub mute_cooldown_ms: u64,
    pub stdin_commands: bool,

    // 显示进程桥接
    pub telemetry_enabled: bool,
    pub telemetry_local_port: u16,
    pub telemetry_remote_port: u16,
    pub telemetry_interval_ms: u64,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            role: env!("SESSION_ROLE").parse()
                .map_err(|_| "Failed to parse SESSION_ROLE")?,
            listen_ip: env!("LISTEN_IP"),
            peer_ip: env!("PEER_IP"),
            port: env!("PORT").parse()
                .map_err(|_| "Failed to parse PORT")?,

            sample_rate: env!("SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse SAMPLE_RATE")?,
            samples_per_frame: env!("SAMPLES_PER_FRAME").parse()
                .map_err(|_| "Failed to parse SAMPLES_PER_FRAME")?,
            capture_device: env!("CAPTURE_DEVICE"),
            playback_device: env!("PLAYBACK_DEVICE"),
            capture_channels: env!("CAPTURE_CHANNELS").parse()
                .map_err(|_| "Failed to parse CAPTURE_CHANNELS")?,
            playback_channels: env!("PLAYBACK_CHANNELS").parse()
                .map_err(|_| "Failed to parse PLAYBACK_CHANNELS")?,
            playback_period_size: env!("PLAYBACK_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse PLAYBACK_PERIOD_SIZE")?,

            wire_format: env!("WIRE_FORMAT").parse()
                .map_err(|_| "Failed to parse WIRE_FORMAT")?,

            initial_mode: env!("DSP_MODE").parse()
                .map_err(|_| "Failed to parse DSP_MODE")?,
            initial_mix: env!("DSP_MIX").parse()
                .map_err(|_| "Failed to parse DSP_MIX")?,
            hpf_cutoff_hz: env!("DSP_CUTOFF_HZ").parse()
                .map_err(|_| "Failed to parse DSP_CUTOFF_HZ")?,
            denoiser: env!("DENOISER").parse()
                .map_err(|_| "Failed to parse DENOISER")?,
            sender_dsp: env!("SENDER_DSP").parse()
                .map_err(|_| "Failed to parse SENDER_DSP")?,
            denoiser_libs: env!("DENOISER_LIBS")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),

            delay_seconds: env!("DELAY_SECONDS").parse()
                .map_err(|_| "Failed to parse DELAY_SECONDS")?,

            mute_cooldown_ms: env!("MUTE_COOLDOWN_MS").parse()
                .map_err(|_| "Failed to parse MUTE_COOLDOWN_MS")?,
            stdin_commands: env!("STDIN_COMMANDS").parse()
                .map_err(|_| "Failed to parse STDIN_COMMANDS")?,

            telemetry_enabled: env!("TELEMETRY_ENABLED").parse()
                .map_err(|_| "Failed to parse TELEMETRY_ENABLED")?,
            telemetry_local_port: env!("TELEMETRY_LOCAL_PORT").parse()
                .map_err(|_| "Failed to parse TELEMETRY_LOCAL_PORT")?,
            telemetry_remote_port: env!("TELEMETRY_REMOTE_PORT").parse()
                .map_err(|_| "Failed to parse TELEMETRY_REMOTE_PORT")?,
            telemetry_interval_ms: env!("TELEMETRY_INTERVAL_MS").parse()
                .map_err(|_| "Failed to parse TELEMETRY_INTERVAL_MS")?,
        })
    }

    /// 检查配置项之间的约束，两端的帧长和采样率必须一致，这里只能检查本端
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.samples_per_frame == 0 {
            bail!("samples_per_frame must be greater than zero");
        }
        if self.sample_rate == 0 {
            bail!("sample_rate must be greater than zero");
        }
        if !(self.delay_seconds >= 0.0) {
            bail!("delay seconds must be non-negative, got {}", self.delay_seconds);
        }
        if !(self.hpf_cutoff_hz > 0.0 && self.hpf_cutoff_hz < self.sample_rate as f64 / 2.0) {
            bail!(
                "cutoff {}Hz must be between 0 and half the sample rate",
                self.hpf_cutoff_hz
            );
        }
        if self.playback_channels == 0 || self.capture_channels == 0 {
            bail!("channel counts must be at least 1");
        }
        if self.denoiser_enabled() {
            if self.sample_rate != NATIVE_SAMPLE_RATE {
                bail!(
                    "the denoiser runs at {}Hz only, configured rate is {}Hz",
                    NATIVE_SAMPLE_RATE,
                    self.sample_rate
                );
            }
            if self.samples_per_frame % NATIVE_FRAME_SIZE != 0 {
                bail!(
                    "samples_per_frame {} is not a multiple of the denoiser frame size {}",
                    self.samples_per_frame,
                    NATIVE_FRAME_SIZE
                );
            }
        }
        Ok(())
    }

    /// 本端是否需要 DSP 链（接收端总是需要，发送端看配置）
    pub fn dsp_enabled(&self) -> bool {
        match self.role {
            Role::Receiver => true,
            Role::Sender => self.sender_dsp,
        }
    }

    /// 本端是否加载 RNNoise
    pub fn denoiser_enabled(&self) -> bool {
        self.dsp_enabled() && self.denoiser
    }

    /// 每帧 PCM 字节数（不含头）
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame * 2
    }

    /// 延迟线深度 D = ceil(delay * rate / frame)
    pub fn delay_frames(&self) -> usize {
        delay_frames(self.delay_seconds, self.sample_rate, self.samples_per_frame)
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples_per_frame as f64 / self.sample_rate as f64)
    }

    pub fn mute_cooldown(&self) -> Duration {
        Duration::from_millis(self.mute_cooldown_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_ip, self.port)
    }

    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.peer_ip, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}

/// Depth of the delay line in whole frames, rounded up.
pub fn delay_frames(delay_seconds: f64, sample_rate: u32, samples_per_frame: usize) -> usize {
    if samples_per_frame == 0 {
        return 0;
    }
    (delay_seconds * sample_rate as f64 / samples_per_frame as f64).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_frames_rounds_up() {
        assert_eq!(delay_frames(0.5, 48000, 480), 50);
        assert_eq!(delay_frames(0.5, 16000, 1024), 8);
        assert_eq!(delay_frames(0.5, 48000, 3840), 7);
        assert_eq!(delay_frames(0.0, 48000, 480), 0);
    }

    #[test]
    fn role_parses_aliases() {
        assert_eq!("receiver".parse::<Role>(), Ok(Role::Receiver));
        assert_eq!(" TX ".parse::<Role>(), Ok(Role::Sender));
        assert!("relay".parse::<Role>().is_err());
    }

    #[test]
    fn validate_rejects_misaligned_frames_when_denoiser_runs() {
        let mut config = Config::default();
        config.role = Role::Receiver;
        config.sample_rate = 48000;
        config.denoiser = true;
        config.samples_per_frame = 1024;
        assert!(config.validate().is_err());

        config.role = Role::Sender;
        config.sender_dsp = false;
        assert!(!config.denoiser_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_requires_48k_for_the_denoiser() {
        let mut config = Config::default();
        config.role = Role::Receiver;
        config.denoiser = true;
        config.sample_rate = 16000;
        config.samples_per_frame = 480;
        assert!(config.validate().is_err());
    }

    #[test]
    fn receiver_without_denoiser_accepts_16k_1024() {
        let mut config = Config::default();
        config.role = Role::Receiver;
        config.denoiser = false;
        config.sample_rate = 16000;
        config.samples_per_frame = 1024;
        assert!(config.dsp_enabled());
        assert!(!config.denoiser_enabled());
        assert!(config.validate().is_ok());
        assert_eq!(config.delay_frames(), 8);
    }

    #[test]
    fn validate_rejects_negative_delay() {
        let mut config = Config::default();
        config.samples_per_frame = 480;
        config.delay_seconds = -1.0;
        assert!(config.validate().is_err());
    }
}
