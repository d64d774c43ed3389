//! Integration tests for the NEV / NSx readers.
//!
//! Most tests write small synthetic recordings to temporary files. The tests
//! against real recordings need the test_data directory.
//! Run with: cargo test --test integration_tests

use nevsx_core::fanout;
use nevsx_core::{
    DecodeError, DigitalColumns, DigitalReason, DigitalSession, Packet, PacketDecoder,
    PacketFilter, PacketKind, ReaderOptions, SampleBlockReader,
};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const TEST_NEV: &str = "test_data/sample.nev";
const TEST_NSX: &str = "test_data/sample.ns5";

const PACKET_SIZE: usize = 24;
const CONTINUATION: u32 = 0x00FF_FFFF;

// ============================================================================
// Synthetic file builders
// ============================================================================

fn ext_record(tag: &[u8; 8], payload: &[u8]) -> Vec<u8> {
    let mut r = tag.to_vec();
    r.extend_from_slice(payload);
    r.resize(32, 0);
    r
}

fn amplifier(id: u16, neural_scale: u16, bytes_per_sample: u8, stim_scale: f32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&id.to_le_bytes());
    p.extend_from_slice(&[1, 4]);
    p.extend_from_slice(&neural_scale.to_le_bytes());
    p.extend_from_slice(&[0u8; 6]);
    p.extend_from_slice(&[2, bytes_per_sample]);
    p.extend_from_slice(&stim_scale.to_le_bytes());
    ext_record(b"NEUEVWAV", &p)
}

fn nev_file(flags: u16, ext: &[Vec<u8>], records: &[Vec<u8>]) -> NamedTempFile {
    let header_size = 336 + 32 * ext.len();
    let mut b = Vec::new();
    b.extend_from_slice(b"NEURALEV");
    b.extend_from_slice(&[3, 0]);
    b.extend_from_slice(&flags.to_le_bytes());
    b.extend_from_slice(&(header_size as u32).to_le_bytes());
    b.extend_from_slice(&(PACKET_SIZE as u32).to_le_bytes());
    b.extend_from_slice(&30_000u32.to_le_bytes());
    b.extend_from_slice(&30_000u32.to_le_bytes());
    for v in [2022u16, 3, 1, 14, 9, 0, 0, 0] {
        b.extend_from_slice(&v.to_le_bytes());
    }
    let mut creator = [0u8; 32];
    creator[..9].copy_from_slice(b"synthetic");
    b.extend_from_slice(&creator);
    b.resize(336 - 4, 0);
    b.extend_from_slice(&(ext.len() as u32).to_le_bytes());
    for r in ext {
        b.extend_from_slice(r);
    }
    for r in records {
        b.extend_from_slice(r);
    }

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&b).unwrap();
    file.flush().unwrap();
    file
}

fn event(timestamp: u32, id: u16, tail: &[u8]) -> Vec<u8> {
    let mut r = timestamp.to_le_bytes().to_vec();
    r.extend_from_slice(&id.to_le_bytes());
    r.extend_from_slice(tail);
    r.resize(PACKET_SIZE, 0);
    r
}

fn digital(timestamp: u32, reason: u8, parallel: u16) -> Vec<u8> {
    let mut tail = vec![reason, 0];
    tail.extend_from_slice(&parallel.to_le_bytes());
    event(timestamp, 0, &tail)
}

fn waveform_event(timestamp: u32, id: u16, samples: &[i16]) -> Vec<u8> {
    let mut tail = vec![0u8, 0];
    for s in samples {
        tail.extend_from_slice(&s.to_le_bytes());
    }
    event(timestamp, id, &tail)
}

fn continuation(samples: &[i16]) -> Vec<u8> {
    let mut r = CONTINUATION.to_le_bytes().to_vec();
    for s in samples {
        r.extend_from_slice(&s.to_le_bytes());
    }
    r.resize(PACKET_SIZE, 0);
    r
}

fn nsx_file(channels: u16, blocks: &[(u32, u32)]) -> NamedTempFile {
    let mut b = Vec::new();
    b.extend_from_slice(b"NEURALCD");
    b.extend_from_slice(&[2, 3]);
    b.extend_from_slice(&(314u32 + 66 * u32::from(channels)).to_le_bytes());
    let mut label = [0u8; 16];
    label[..6].copy_from_slice(b"30 kS/");
    b.extend_from_slice(&label);
    b.extend_from_slice(&[0u8; 256]);
    b.extend_from_slice(&1u32.to_le_bytes());
    b.extend_from_slice(&30_000u32.to_le_bytes());
    b.extend_from_slice(&[0u8; 16]);
    b.extend_from_slice(&u32::from(channels).to_le_bytes());

    for id in 0..channels {
        let start = b.len();
        b.extend_from_slice(b"CC");
        b.extend_from_slice(&(id + 1).to_le_bytes());
        b.resize(start + 66, 0);
    }

    for &(timestamp, frames) in blocks {
        b.push(0x01);
        b.extend_from_slice(&timestamp.to_le_bytes());
        b.extend_from_slice(&frames.to_le_bytes());
        for f in 0..frames {
            for c in 0..channels {
                b.extend_from_slice(&sample_value(timestamp + f, c).to_le_bytes());
            }
        }
    }

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&b).unwrap();
    file.flush().unwrap();
    file
}

fn sample_value(timestamp: u32, channel: u16) -> i16 {
    ((timestamp % 1000) as i16) * 8 + channel as i16
}

// ============================================================================
// NEV
// ============================================================================

/// Decode a small recording with every record category and extended header.
#[test]
fn test_decode_synthetic_nev() {
    let mut dig = b"digin\0".to_vec();
    dig.resize(16, 0);
    dig.push(1); // parallel mode

    let mut label = 3u16.to_le_bytes().to_vec();
    label.extend_from_slice(b"motor cortex");

    let ext = vec![
        amplifier(3, 250, 2, 0.0),
        amplifier(5122, 1, 2, 0.5),
        ext_record(b"NEUEVLBL", &label),
        ext_record(b"DIGLABEL", &dig),
        ext_record(b"NEUEVUNK", &[]),
    ];
    let records = vec![
        digital(10, DigitalReason::PARALLEL, 0b0011),
        waveform_event(20, 3, &[1, -2, 3, -4, 5, -6, 7, -8]),
        continuation(&[9, 10]),
        waveform_event(30, 5122, &[100, 200]),
        digital(40, DigitalReason::PARALLEL, 0b0110),
        digital(50, DigitalReason::SMA3, 0b0110),
    ];
    let file = nev_file(0, &ext, &records);

    let mut decoder = PacketDecoder::open(file.path()).unwrap();
    assert_eq!(decoder.header().creator, "synthetic");
    assert_eq!(decoder.header().ticks_to_seconds(45_000), 1.5);

    let registry = decoder.registry();
    assert_eq!(registry.label(3), Some("motor cortex"));
    assert!(registry.has_digital_events());
    assert_eq!(registry.digital_mode().to_string(), "Parallel");
    assert_eq!(registry.skipped_tags().to_vec(), vec!["NEUEVUNK".to_string()]);
    assert_eq!(registry.stim_amplifier(2).unwrap().scale_factor, 0.5);

    let mut packets = Vec::new();
    while let Some(packet) = decoder.next_packet().unwrap() {
        packets.push(packet);
    }
    assert!(decoder.at_end());
    let kinds: Vec<PacketKind> = packets.iter().map(Packet::kind).collect();
    assert_eq!(
        kinds,
        vec![
            PacketKind::Digital,
            PacketKind::Spike,
            PacketKind::Stim,
            PacketKind::Digital,
            PacketKind::Digital,
        ]
    );

    // spike waveform: 16 bytes from the record, 20 from the continuation
    let samples = decoder.waveform_samples(&packets[1]).unwrap().unwrap();
    assert_eq!(samples.len(), 8 + 10);
    assert_eq!(&samples[..8], &[1, -2, 3, -4, 5, -6, 7, -8]);
    assert_eq!(&samples[8..10], &[9, 10]);

    let stim = &packets[2];
    match stim {
        Packet::Stim(s) => assert_eq!(s.electrode_id, 2),
        other => panic!("expected stim, got {:?}", other),
    }
    let layout = decoder.waveform_layout(stim).unwrap();
    let volts = layout.to_physical(stim.waveform().unwrap()).unwrap().unwrap();
    assert_eq!(&volts[..2], &[50.0, 100.0]);

    let mut session = DigitalSession::default();
    let mut columns = DigitalColumns::default();
    let mut transitions = Vec::new();
    for packet in &packets {
        if let Packet::Digital(d) = packet {
            columns.push(d);
            transitions.extend(session.observe(d));
        }
    }
    assert_eq!(columns.len(), 3);
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[1].rising(), 0b0100);
    assert_eq!(transitions[1].falling(), 0b0001);
}

/// The global 16-bit flag overrides the per-electrode sample width.
#[test]
fn test_all_waveforms_16bit_flag() {
    let ext = vec![amplifier(7, 1, 1, 0.0)];
    let records = vec![waveform_event(1, 7, &[-300, 300])];

    let narrow = nev_file(0, &ext, &records);
    let mut decoder = PacketDecoder::open(narrow.path()).unwrap();
    let packet = decoder.next_packet().unwrap().unwrap();
    assert_eq!(decoder.waveform_samples(&packet).unwrap().unwrap().len(), 16);

    let wide = nev_file(1, &ext, &records);
    let mut decoder = PacketDecoder::open(wide.path()).unwrap();
    let packet = decoder.next_packet().unwrap().unwrap();
    let samples = decoder.waveform_samples(&packet).unwrap().unwrap();
    assert_eq!(&samples[..2], &[-300, 300]);
}

/// Filtering must not change which records belong to which packet.
#[test]
fn test_filter_and_small_read_ahead() {
    let records = vec![
        waveform_event(1, 4, &[1]),
        continuation(&[2]),
        digital(2, DigitalReason::SERIAL, 0xFFFF),
        waveform_event(3, 6000, &[3]),
        continuation(&[4]),
        continuation(&[5]),
        waveform_event(4, 4, &[6]),
    ];
    let file = nev_file(0, &[], &records);

    for window in [1, 2, 3, 100] {
        let options = ReaderOptions::default()
            .with_buffer_packets(window)
            .with_filter(PacketFilter::NONE.with_spike(true));
        let decoder = PacketDecoder::open_with(file.path(), options).unwrap();
        let packets: Vec<Packet> = decoder.map(|p| p.unwrap()).collect();

        let timestamps: Vec<u32> = packets.iter().map(Packet::timestamp).collect();
        assert_eq!(timestamps, vec![1, 4], "read-ahead of {} packets", window);
        assert_eq!(packets[0].waveform().unwrap().len(), 16 + 20);
        assert_eq!(packets[1].waveform().unwrap().len(), 16);
    }
}

#[test]
fn test_open_wrong_format() {
    let nsx = nsx_file(1, &[]);
    let err = PacketDecoder::open(nsx.path()).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidMagic { .. }));
    assert!(err.is_format_error());

    let nev = nev_file(0, &[], &[]);
    let err = SampleBlockReader::open(nev.path()).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidMagic { .. }));
}

#[test]
fn test_truncated_extended_headers() {
    let file = nev_file(0, &[amplifier(1, 1, 1, 0.0)], &[]);
    let bytes = std::fs::read(file.path()).unwrap();

    let mut short = NamedTempFile::new().unwrap();
    short.write_all(&bytes[..bytes.len() - 5]).unwrap();
    short.flush().unwrap();

    let err = PacketDecoder::open(short.path()).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Truncated {
            what: "extended header",
            ..
        }
    ));
}

// ============================================================================
// NSx
// ============================================================================

/// Pull a multi-block recording and fan every chunk out across workers.
#[test]
fn test_pull_and_fan_out() {
    let channels = 5u16;
    let file = nsx_file(channels, &[(0, 100), (200, 0), (300, 45)]);
    let mut reader = SampleBlockReader::open(file.path()).unwrap();
    assert_eq!(reader.channel_count(), 5);
    assert_eq!(reader.header().label, "30 kS/");
    assert_eq!(reader.channels()[4].electrode_id, 5);

    let mut total = 0;
    let mut chunk_starts = Vec::new();
    while reader.has_more_data() {
        let chunk = reader.pull(40).unwrap();
        chunk_starts.push(chunk.timestamp);
        total += chunk.frames;

        let per_channel = fanout::fan_out(&chunk.samples, reader.channel_count(), 2, |range, view| {
            range
                .map(|c| view.channel(c).collect::<Vec<i16>>())
                .collect::<Vec<_>>()
        });
        let per_channel: Vec<Vec<i16>> = per_channel.into_iter().flatten().collect();
        assert_eq!(per_channel.len(), 5);
        for (c, values) in per_channel.iter().enumerate() {
            let expected: Vec<i16> = (0..chunk.frames as u32)
                .map(|f| sample_value(chunk.timestamp + f, c as u16))
                .collect();
            assert_eq!(values, &expected);
        }
    }

    assert_eq!(total, 145);
    assert_eq!(chunk_starts, vec![0, 40, 80, 300, 340]);
    assert!(matches!(reader.pull(1), Err(DecodeError::UseAfterEnd)));
}

#[test]
fn test_read_frames_reuses_buffer() {
    let file = nsx_file(2, &[(10, 3)]);
    let mut reader = SampleBlockReader::open(file.path()).unwrap();
    let mut buffer = Vec::with_capacity(64);

    assert_eq!(reader.read_frames(2, &mut buffer).unwrap(), 2);
    assert_eq!(buffer.len(), 4);
    assert_eq!(reader.read_frames(2, &mut buffer).unwrap(), 1);
    assert_eq!(buffer, vec![sample_value(12, 0), sample_value(12, 1)]);
    assert!(!reader.has_more_data());
}

// ============================================================================
// Real recordings
// ============================================================================

/// Walk a real NEV file end to end.
#[test]
fn test_decode_real_nev() {
    let test_path = Path::new(TEST_NEV);
    if !test_path.exists() {
        eprintln!("Skipping test: test file not found at {}", TEST_NEV);
        return;
    }

    let decoder = PacketDecoder::open(test_path).expect("Failed to open file");
    let mut last = [0u32; 3];
    let mut count = 0usize;
    for packet in decoder {
        let packet = packet.expect("Failed to decode packet");
        let slot = packet.kind() as usize;
        // timestamps are non-decreasing within a category
        assert!(packet.timestamp() >= last[slot]);
        last[slot] = packet.timestamp();
        count += 1;
    }
    assert!(count > 0);
}

/// Read a real NSx file to the end.
#[test]
fn test_decode_real_nsx() {
    let test_path = Path::new(TEST_NSX);
    if !test_path.exists() {
        eprintln!("Skipping test: test file not found at {}", TEST_NSX);
        return;
    }

    let mut reader = SampleBlockReader::open(test_path).expect("Failed to open file");
    assert!(reader.sampling_frequency() > 0.0);
    let mut buffer = Vec::new();
    let mut frames = 0;
    while reader.has_more_data() {
        frames += reader.read_frames(30_000, &mut buffer).expect("Failed to read frames");
    }
    assert!(frames > 0);
}
