use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    session: Session,
    audio: Audio,
    protocol: Protocol,
    dsp: Dsp,
    delay: Delay,
    control: Control,
    telemetry: Telemetry,
}

#[derive(Deserialize)]
struct Session {
    role: String,
    listen_ip: String,
    peer_ip: String,
    port: u16,
}

#[derive(Deserialize)]
struct Audio {
    sample_rate: u32,
    samples_per_frame: usize,
    capture_device: String,
    playback_device: String,
    capture_channels: u32,
    playback_channels: u32,
    playback_period_size: usize,
}

#[derive(Deserialize)]
struct Protocol {
    wire: String,
}

#[derive(Deserialize)]
struct Dsp {
    mode: u32,
    mix: f32,
    cutoff_hz: f64,
    denoiser: bool,
    sender_dsp: bool,
    denoiser_libs: Vec<String>,
}

#[derive(Deserialize)]
struct Delay {
    seconds: f64,
}

#[derive(Deserialize)]
struct Control {
    mute_cooldown_ms: u64,
    stdin_commands: bool,
}

#[derive(Deserialize)]
struct Telemetry {
    enabled: bool,
    local_port: u16,
    remote_port: u16,
    interval_ms: u64,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 会话配置
    println!("cargo:rustc-env=SESSION_ROLE={}", config.session.role);
    println!("cargo:rustc-env=LISTEN_IP={}", config.session.listen_ip);
    println!("cargo:rustc-env=PEER_IP={}", config.session.peer_ip);
    println!("cargo:rustc-env=PORT={}", config.session.port);

    // 音频配置
    println!("cargo:rustc-env=SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=SAMPLES_PER_FRAME={}", config.audio.samples_per_frame);
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=CAPTURE_CHANNELS={}", config.audio.capture_channels);
    println!("cargo:rustc-env=PLAYBACK_CHANNELS={}", config.audio.playback_channels);
    println!("cargo:rustc-env=PLAYBACK_PERIOD_SIZE={}", config.audio.playback_period_size);

    // 传输格式
    println!("cargo:rustc-env=WIRE_FORMAT={}", config.protocol.wire);

    // DSP 配置
    println!("cargo:rustc-env=DSP_MODE={}", config.dsp.mode);
    println!("cargo:rustc-env=DSP_MIX={}", config.dsp.mix);
    println!("cargo:rustc-env=DSP_CUTOFF_HZ={}", config.dsp.cutoff_hz);
    println!("cargo:rustc-env=DENOISER={}", config.dsp.denoiser);
    println!("cargo:rustc-env=SENDER_DSP={}", config.dsp.sender_dsp);
    println!("cargo:rustc-env=DENOISER_LIBS={}", config.dsp.denoiser_libs.join(","));

    // 延迟线
    println!("cargo:rustc-env=DELAY_SECONDS={}", config.delay.seconds);

    // 控制输入
    println!("cargo:rustc-env=MUTE_COOLDOWN_MS={}", config.control.mute_cooldown_ms);
    println!("cargo:rustc-env=STDIN_COMMANDS={}", config.control.stdin_commands);

    // 显示进程桥接
    println!("cargo:rustc-env=TELEMETRY_ENABLED={}", config.telemetry.enabled);
    println!("cargo:rustc-env=TELEMETRY_LOCAL_PORT={}", config.telemetry.local_port);
    println!("cargo:rustc-env=TELEMETRY_REMOTE_PORT={}", config.telemetry.remote_port);
    println!("cargo:rustc-env=TELEMETRY_INTERVAL_MS={}", config.telemetry.interval_ms);
}
