use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use bytes::BytesMut;
use rand::Rng;

use denoise_relay::audio::{AudioSource, CaptureStatus, MemorySink};
use denoise_relay::control::ControlPlane;
use denoise_relay::delay_line::DelayLine;
use denoise_relay::dsp::{saturate, Denoiser, DspChain, DspError, HighPassFilter, Mode, NATIVE_FRAME_SIZE};
use denoise_relay::protocol::{encode_packet, FrameAssembler, PacketHeader, WireFormat};
use denoise_relay::session::{ReceiverPipeline, SenderPipeline};

/// Deterministic stateful stand-in for RNNoise: each output depends on the
/// input sample and the last sample of the previous call.
#[derive(Default)]
struct Smear {
    carry: f32,
}

impl Denoiser for Smear {
    fn frame_size(&self) -> usize {
        NATIVE_FRAME_SIZE
    }

    fn process_frame(&mut self, input: &[f32], output: &mut [f32]) -> Result<f32, DspError> {
        for (o, &x) in output.iter_mut().zip(input) {
            *o = 0.5 * x + 0.25 * self.carry;
        }
        self.carry = input[input.len() - 1];
        Ok(0.9)
    }
}

fn chain(samples_per_frame: usize) -> DspChain {
    DspChain::new(48000, samples_per_frame, 100.0, Box::new(Smear::default())).unwrap()
}

fn random_frame(len: usize) -> Vec<i16> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(i16::MIN..=i16::MAX)).collect()
}

/// Splits a byte stream at random points before handing it to the reader.
struct ChunkedReader {
    data: VecDeque<u8>,
    max_chunk: usize,
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_empty() {
            return Ok(0);
        }
        let want = rand::thread_rng().gen_range(1..=self.max_chunk);
        let n = want.min(buf.len()).min(self.data.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.data.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

/// Yields a fixed list of frames, then ends.
struct ScriptedSource {
    frames: VecDeque<Vec<i16>>,
}

impl AudioSource for ScriptedSource {
    fn read_frame(&mut self, frame: &mut [i16]) -> Result<CaptureStatus> {
        match self.frames.pop_front() {
            Some(next) => {
                frame.copy_from_slice(&next);
                Ok(CaptureStatus::Complete)
            }
            None => Ok(CaptureStatus::Ended),
        }
    }
}

#[test]
fn assembler_output_does_not_depend_on_fragmentation() {
    let mut rng = rand::thread_rng();
    for format in [WireFormat::Raw, WireFormat::Telemetry] {
        for samples_per_frame in [480usize, 1024, 3840] {
            let frames: Vec<Vec<i16>> = (0..6).map(|_| random_frame(samples_per_frame)).collect();
            let mut stream = BytesMut::new();
            for (i, frame) in frames.iter().enumerate() {
                let header = PacketHeader { mode: i as u32 % 4, rms: rng.gen_range(0..=u32::MAX) };
                encode_packet(format, header, frame, &mut stream);
            }

            let mut assembler = FrameAssembler::new(format, samples_per_frame);
            let mut out = Vec::new();
            let mut rest: &[u8] = &stream;
            while !rest.is_empty() {
                let n = rng.gen_range(1..=rest.len().min(5000));
                out.extend(assembler.push(&rest[..n]));
                rest = &rest[n..];
            }

            assert_eq!(assembler.pending(), 0);
            let samples: Vec<Vec<i16>> = out.into_iter().map(|p| p.samples).collect();
            assert_eq!(samples, frames, "{} / {}", format, samples_per_frame);
        }
    }
}

#[test]
fn header_fields_survive_the_wire() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let header = PacketHeader {
            mode: rng.gen_range(0..=u32::MAX),
            rms: rng.gen_range(0..=u32::MAX),
        };
        let mut buf = BytesMut::new();
        encode_packet(WireFormat::Telemetry, header, &[0; 480], &mut buf);
        let packets = FrameAssembler::new(WireFormat::Telemetry, 480).push(&buf);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].header, Some(header));
    }
}

#[test]
fn hpf_state_runs_across_frames() {
    let frames: Vec<Vec<i16>> = (0..8).map(|_| random_frame(480)).collect();

    let mut chain = chain(480);
    let chained: Vec<i16> = frames
        .iter()
        .flat_map(|f| chain.process(f.clone(), Mode::Hpf, 1.0).unwrap())
        .collect();

    let whole: Vec<f64> = frames.iter().flatten().map(|&s| s as f64).collect();
    let mut filtered = vec![0.0; whole.len()];
    HighPassFilter::new(48000.0, 100.0).process(&whole, &mut filtered);
    let expected: Vec<i16> = filtered.into_iter().map(saturate).collect();

    assert_eq!(chained, expected);
}

#[test]
fn large_frames_are_denoised_in_native_chunks() {
    let frame = random_frame(3840);

    let mut chain = chain(3840);
    let out = chain.process(frame.clone(), Mode::Rnn, 1.0).unwrap();

    let mut direct = Smear::default();
    let mut expected = Vec::with_capacity(frame.len());
    let mut wet = vec![0.0f32; NATIVE_FRAME_SIZE];
    for chunk in frame.chunks(NATIVE_FRAME_SIZE) {
        let input: Vec<f32> = chunk.iter().map(|&s| s as f32).collect();
        direct.process_frame(&input, &mut wet).unwrap();
        expected.extend(wet.iter().map(|&w| saturate(w as f64)));
    }

    assert_eq!(out, expected);
}

#[test]
fn mix_blends_dry_and_wet() {
    let mut rng = rand::thread_rng();
    let frame = random_frame(480);
    for _ in 0..10 {
        let mix: f32 = rng.gen_range(0.0..=1.0);
        let out = chain(480).process(frame.clone(), Mode::Rnn, mix).unwrap();

        let mut smear = Smear::default();
        let input: Vec<f32> = frame.iter().map(|&s| s as f32).collect();
        let mut wet = vec![0.0f32; 480];
        smear.process_frame(&input, &mut wet).unwrap();
        let m = mix as f64;
        let expected: Vec<i16> = frame
            .iter()
            .zip(&wet)
            .map(|(&d, &w)| saturate((1.0 - m) * d as f64 + m * w as f64))
            .collect();
        assert_eq!(out, expected);
    }
}

#[test]
fn delay_line_holds_back_exactly_depth_frames() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let depth = rng.gen_range(0..64usize);
        let total = depth + rng.gen_range(0..64usize);
        let mut line = DelayLine::new(depth);
        let mut popped = Vec::new();
        for i in 0..total {
            line.push(i);
            while let Some(f) = line.try_pop() {
                popped.push(f);
            }
            assert!(line.len() <= depth);
        }
        assert_eq!(popped, (0..total - depth).collect::<Vec<_>>());
    }
}

#[test]
fn sender_to_receiver_end_to_end() {
    let frames: Vec<Vec<i16>> = (0..60).map(|i| vec![i as i16 * 10; 480]).collect();

    let tx_plane = Arc::new(ControlPlane::new(Mode::Raw, 1.0));
    let mut sender = SenderPipeline::new(WireFormat::Telemetry, 480, None, tx_plane);
    let mut source = ScriptedSource { frames: frames.clone().into() };
    let mut wire = Vec::new();
    let running = AtomicBool::new(true);
    let sent = sender.run(&mut source, &mut wire, &running).unwrap();
    assert_eq!(sent.frames_sent, 60);
    assert_eq!(wire.len(), 60 * (8 + 960));
    // First frame is silence in RAW mode.
    assert_eq!(&wire[..8], &[0u8; 8]);

    let rx_plane = Arc::new(ControlPlane::new(Mode::Raw, 1.0));
    let delay = denoise_relay::config::delay_frames(0.5, 48000, 480);
    assert_eq!(delay, 50);
    let mut receiver = ReceiverPipeline::new(WireFormat::Telemetry, delay, chain(480), rx_plane.clone());
    let mut reader = ChunkedReader { data: wire.into(), max_chunk: 3000 };
    let mut sink = MemorySink::default();
    let stats = receiver.run(&mut reader, &mut sink, &running).unwrap();

    assert_eq!(stats.frames_received, 60);
    assert_eq!(stats.frames_played, 10);
    assert_eq!(receiver.buffered(), 50);
    assert_eq!(sink.frames, frames[..10].to_vec());
    assert!(sink.finished);
    assert_eq!(rx_plane.peer_mode(), Some(0));
    assert_eq!(rx_plane.level(), 590);
}

#[test]
fn nothing_plays_before_the_line_fills() {
    let plane = Arc::new(ControlPlane::new(Mode::Raw, 1.0));
    let mut receiver = ReceiverPipeline::new(WireFormat::Raw, 50, chain(480), plane);
    let mut sink = MemorySink::default();
    let mut buf = BytesMut::new();
    for i in 0..50 {
        buf.clear();
        encode_packet(WireFormat::Raw, PacketHeader::default(), &vec![i as i16; 480], &mut buf);
        receiver.handle_chunk(&buf, &mut sink).unwrap();
        assert!(sink.frames.is_empty());
    }
    buf.clear();
    encode_packet(WireFormat::Raw, PacketHeader::default(), &[99; 480], &mut buf);
    receiver.handle_chunk(&buf, &mut sink).unwrap();
    assert_eq!(sink.frames, vec![vec![0i16; 480]]);
}

#[test]
fn mode_switch_only_affects_later_frames() {
    let plane = Arc::new(ControlPlane::new(Mode::Raw, 1.0));
    let mut receiver = ReceiverPipeline::new(WireFormat::Raw, 2, chain(480), plane.clone());
    let mut sink = MemorySink::default();
    let constant = vec![1000i16; 480];
    let mut buf = BytesMut::new();
    encode_packet(WireFormat::Raw, PacketHeader::default(), &constant, &mut buf);

    for _ in 0..3 {
        receiver.handle_chunk(&buf, &mut sink).unwrap();
    }
    assert_eq!(sink.frames.len(), 1);

    plane.set_mode(Mode::Hpf);
    receiver.handle_chunk(&buf, &mut sink).unwrap();
    receiver.handle_chunk(&buf, &mut sink).unwrap();
    // Frames queued before the switch come out untouched.
    assert_eq!(sink.frames.len(), 3);
    assert!(sink.frames.iter().all(|f| *f == constant));

    receiver.handle_chunk(&buf, &mut sink).unwrap();
    let filtered = &sink.frames[3];
    assert!(filtered[0] < 1000);
    assert!(filtered[479].abs() < filtered[0].abs());
}

#[test]
fn muted_frames_are_drained_not_played() {
    let plane = Arc::new(ControlPlane::new(Mode::Raw, 1.0));
    let mut receiver = ReceiverPipeline::new(WireFormat::Raw, 0, chain(480), plane.clone());
    let mut sink = MemorySink::default();
    let mut buf = BytesMut::new();
    encode_packet(WireFormat::Raw, PacketHeader::default(), &[7; 480], &mut buf);

    plane.set_muted(true);
    for _ in 0..5 {
        receiver.handle_chunk(&buf, &mut sink).unwrap();
    }
    assert!(sink.frames.is_empty());
    assert_eq!(receiver.buffered(), 0);
    assert_eq!(receiver.stats().frames_muted, 5);

    plane.set_muted(false);
    receiver.handle_chunk(&buf, &mut sink).unwrap();
    assert_eq!(sink.frames.len(), 1);
}

#[test]
fn both_mode_denoises_the_filtered_signal() {
    let frames: Vec<Vec<i16>> = (0..4).map(|_| random_frame(960)).collect();

    let mut chain = chain(960);
    let out: Vec<i16> = frames
        .iter()
        .flat_map(|f| chain.process(f.clone(), Mode::Both, 1.0).unwrap())
        .collect();

    // HPF over the unbroken stream, then the denoiser on 480-sample chunks.
    let whole: Vec<f64> = frames.iter().flatten().map(|&s| s as f64).collect();
    let mut filtered = vec![0.0; whole.len()];
    HighPassFilter::new(48000.0, 100.0).process(&whole, &mut filtered);
    let mut smear = Smear::default();
    let mut wet = vec![0.0f32; NATIVE_FRAME_SIZE];
    let mut expected = Vec::with_capacity(whole.len());
    for chunk in filtered.chunks(NATIVE_FRAME_SIZE) {
        let input: Vec<f32> = chunk.iter().map(|&d| d as f32).collect();
        smear.process_frame(&input, &mut wet).unwrap();
        expected.extend(wet.iter().map(|&w| saturate(w as f64)));
    }

    assert_eq!(out, expected);
}

#[test]
fn both_mode_fully_dry_matches_hpf() {
    let frames: Vec<Vec<i16>> = (0..5).map(|_| random_frame(480)).collect();
    let mut both = chain(480);
    let mut hpf = chain(480);
    for frame in &frames {
        assert_eq!(
            both.process(frame.clone(), Mode::Both, 0.0).unwrap(),
            hpf.process(frame.clone(), Mode::Hpf, 1.0).unwrap()
        );
    }
}

#[test]
fn receiver_in_both_mode_plays_the_chain_output() {
    let plane = Arc::new(ControlPlane::new(Mode::Both, 0.5));
    let mut receiver = ReceiverPipeline::new(WireFormat::Raw, 1, chain(480), plane);
    let mut reference = chain(480);
    let mut sink = MemorySink::default();

    let frames: Vec<Vec<i16>> = (0..4).map(|_| random_frame(480)).collect();
    let mut buf = BytesMut::new();
    for frame in &frames {
        buf.clear();
        encode_packet(WireFormat::Raw, PacketHeader::default(), frame, &mut buf);
        receiver.handle_chunk(&buf, &mut sink).unwrap();
    }

    let expected: Vec<Vec<i16>> = frames
        .iter()
        .map(|f| reference.process(f.clone(), Mode::Both, 0.5).unwrap())
        .collect();
    assert_eq!(sink.frames, expected[..3].to_vec());
}

/// Replays capture results, including overflowed reads.
struct LossySource {
    reads: VecDeque<(CaptureStatus, Vec<i16>)>,
}

impl AudioSource for LossySource {
    fn read_frame(&mut self, frame: &mut [i16]) -> Result<CaptureStatus> {
        match self.reads.pop_front() {
            Some((status, samples)) => {
                frame.copy_from_slice(&samples);
                Ok(status)
            }
            None => Ok(CaptureStatus::Ended),
        }
    }
}

#[test]
fn overflowed_capture_is_still_sent() {
    let mut padded = vec![300i16; 240];
    padded.extend(vec![0i16; 240]);
    let mut source = LossySource {
        reads: VecDeque::from(vec![
            (CaptureStatus::Complete, vec![100; 480]),
            (CaptureStatus::Overflowed, padded.clone()),
            (CaptureStatus::Complete, vec![200; 480]),
        ]),
    };

    let plane = Arc::new(ControlPlane::new(Mode::Raw, 1.0));
    let mut sender = SenderPipeline::new(WireFormat::Raw, 480, None, plane);
    let mut wire = Vec::new();
    let running = AtomicBool::new(true);
    let stats = sender.run(&mut source, &mut wire, &running).unwrap();

    assert_eq!(stats.frames_sent, 3);
    assert_eq!(stats.overflows, 1);

    let packets = FrameAssembler::new(WireFormat::Raw, 480).push(&wire);
    assert_eq!(packets.len(), 3);
    assert_eq!(packets[1].samples, padded);
}
