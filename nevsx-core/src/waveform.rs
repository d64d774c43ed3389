//! Unpacking of spike and stimulation waveforms.
//!
//! Waveform payloads are stored as raw little-endian signed integers whose
//! width comes either from the file-wide 16-bit flag or from the amplifier
//! extended header of the electrode.

use crate::error::{DecodeError, Result};
use crate::extheader::ExtendedHeaderRegistry;
use crate::header::EvHeader;
use crate::types::{Packet, PacketKind};
use byteorder::{ByteOrder, LittleEndian};

/// Sample width and conversion factor for one electrode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformLayout {
    pub bytes_per_sample: u8,
    /// Physical units per count, known only when the electrode has an
    /// amplifier header.
    pub scale_factor: Option<f64>,
}

impl WaveformLayout {
    /// Resolves the layout of waveforms on `electrode_id`.
    ///
    /// When the file-wide 16-bit flag is set the width is 2 regardless of
    /// the amplifier header. Otherwise the width comes from the amplifier
    /// header, and `None` is returned if the electrode has none.
    pub fn resolve(
        header: &EvHeader,
        registry: &ExtendedHeaderRegistry,
        kind: PacketKind,
        electrode_id: u16,
    ) -> Option<Self> {
        let amplifier = match kind {
            PacketKind::Digital => return None,
            PacketKind::Spike => registry
                .spike_amplifier(electrode_id)
                .map(|a| (a.bytes_per_sample, a.scale_factor)),
            PacketKind::Stim => registry
                .stim_amplifier(electrode_id)
                .map(|a| (a.bytes_per_sample, a.scale_factor)),
        };

        if header.all_waveforms_16bit() {
            return Some(Self {
                bytes_per_sample: 2,
                scale_factor: amplifier.map(|(_, scale)| scale),
            });
        }
        amplifier.map(|(bytes_per_sample, scale)| Self {
            bytes_per_sample,
            scale_factor: Some(scale),
        })
    }

    /// Layout for a packet, keyed by its category and electrode.
    pub fn for_packet(
        header: &EvHeader,
        registry: &ExtendedHeaderRegistry,
        packet: &Packet,
    ) -> Option<Self> {
        let electrode_id = match packet {
            Packet::Digital(_) => return None,
            Packet::Spike(p) => p.electrode_id,
            Packet::Stim(p) => p.electrode_id,
        };
        Self::resolve(header, registry, packet.kind(), electrode_id)
    }

    pub fn unpack(&self, bytes: &[u8]) -> Result<Vec<i64>> {
        unpack_samples(bytes, self.bytes_per_sample)
    }

    /// Unpacks `bytes` and converts every sample to physical units.
    ///
    /// Returns `Ok(None)` when the scale factor is unknown.
    pub fn to_physical(&self, bytes: &[u8]) -> Result<Option<Vec<f64>>> {
        let Some(scale) = self.scale_factor else {
            return Ok(None);
        };
        let samples = self.unpack(bytes)?;
        Ok(Some(samples.into_iter().map(|s| s as f64 * scale).collect()))
    }
}

/// Decodes a byte run into signed samples of `bytes_per_sample` bytes each.
///
/// Widths of 1, 2, 4 and 8 bytes are supported. A trailing partial sample
/// is ignored.
pub fn unpack_samples(bytes: &[u8], bytes_per_sample: u8) -> Result<Vec<i64>> {
    let width = usize::from(bytes_per_sample);
    if !matches!(width, 1 | 2 | 4 | 8) {
        return Err(DecodeError::invalid_format(format!(
            "unpacking {}-byte waveform samples is not supported",
            bytes_per_sample
        )));
    }

    let mut samples = Vec::new();
    samples.try_reserve_exact(bytes.len() / width)?;
    samples.extend(bytes.chunks_exact(width).map(|chunk| match width {
        1 => i64::from(chunk[0] as i8),
        2 => i64::from(LittleEndian::read_i16(chunk)),
        4 => i64::from(LittleEndian::read_i32(chunk)),
        _ => LittleEndian::read_i64(chunk),
    }));
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extheader::{EXTENDED_HEADER_SIZE, TAG_WAVEFORM};
    use crate::header::FLAG_ALL_WAVEFORMS_16BIT;
    use crate::types::{OriginTime, SpikePacket};

    fn ev_header(flags: u16) -> EvHeader {
        EvHeader {
            major_version: 2,
            minor_version: 3,
            flags,
            header_size: 336,
            packet_size: 16,
            timestamp_clock_hz: 30_000,
            waveform_clock_hz: 30_000,
            origin: OriginTime::default(),
            creator: String::new(),
            comment: String::new(),
            processor_time: 0,
            extended_header_count: 0,
        }
    }

    fn amplifier_record(electrode_id: u16, bytes_per_sample: u8) -> [u8; EXTENDED_HEADER_SIZE] {
        let mut r = [0u8; EXTENDED_HEADER_SIZE];
        r[..8].copy_from_slice(TAG_WAVEFORM);
        r[8..10].copy_from_slice(&electrode_id.to_le_bytes());
        r[12..14].copy_from_slice(&3u16.to_le_bytes());
        r[21] = bytes_per_sample;
        r
    }

    fn spike_on(electrode_id: u16) -> Packet {
        Packet::Spike(SpikePacket {
            timestamp: 1,
            electrode_id,
            unit: 0,
            waveform: vec![0xFF, 0xFF, 0x02, 0x00],
        })
    }

    #[test]
    fn test_16bit_flag_resolves_without_amplifier_header() {
        let registry = ExtendedHeaderRegistry::default();
        let packet = spike_on(3);
        let header = ev_header(FLAG_ALL_WAVEFORMS_16BIT);

        let layout = WaveformLayout::for_packet(&header, &registry, &packet).unwrap();
        assert_eq!(layout.bytes_per_sample, 2);
        assert_eq!(layout.scale_factor, None);
        assert_eq!(layout.unpack(packet.waveform().unwrap()).unwrap(), vec![-1, 2]);

        assert!(WaveformLayout::for_packet(&ev_header(0), &registry, &packet).is_none());
    }

    #[test]
    fn test_16bit_flag_overrides_amplifier_width() {
        let mut registry = ExtendedHeaderRegistry::default();
        registry.add_record(&amplifier_record(3, 1));
        let packet = spike_on(3);

        let narrow = WaveformLayout::for_packet(&ev_header(0), &registry, &packet).unwrap();
        assert_eq!(narrow.bytes_per_sample, 1);
        assert_eq!(narrow.scale_factor, Some(3e9));

        let header = ev_header(FLAG_ALL_WAVEFORMS_16BIT);
        let wide = WaveformLayout::for_packet(&header, &registry, &packet).unwrap();
        assert_eq!(wide.bytes_per_sample, 2);
        assert_eq!(wide.scale_factor, Some(3e9));
    }

    #[test]
    fn test_digital_packets_have_no_layout() {
        let registry = ExtendedHeaderRegistry::default();
        let header = ev_header(FLAG_ALL_WAVEFORMS_16BIT);
        assert!(WaveformLayout::resolve(&header, &registry, PacketKind::Digital, 0).is_none());
    }

    #[test]
    fn test_unpack_widths() {
        assert_eq!(unpack_samples(&[0xFF, 0x01, 0x80], 1).unwrap(), vec![-1, 1, -128]);
        assert_eq!(
            unpack_samples(&[0x00, 0x80, 0x10, 0x00], 2).unwrap(),
            vec![-32768, 16]
        );
        assert_eq!(
            unpack_samples(&(-70_000i32).to_le_bytes(), 4).unwrap(),
            vec![-70_000]
        );
        assert_eq!(
            unpack_samples(&i64::MIN.to_le_bytes(), 8).unwrap(),
            vec![i64::MIN]
        );
    }

    #[test]
    fn test_trailing_partial_sample_ignored() {
        assert_eq!(unpack_samples(&[1, 0, 2, 0, 3], 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_unsupported_width() {
        let err = unpack_samples(&[0; 6], 3).unwrap_err();
        assert!(err.is_format_error());
        assert!(unpack_samples(&[0; 6], 0).is_err());
    }

    #[test]
    fn test_physical_units() {
        let layout = WaveformLayout {
            bytes_per_sample: 2,
            scale_factor: Some(0.25),
        };
        let bytes: Vec<u8> = [4i16, -8].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(layout.to_physical(&bytes).unwrap(), Some(vec![1.0, -2.0]));

        let unscaled = WaveformLayout {
            scale_factor: None,
            ..layout
        };
        assert!(unscaled.to_physical(&bytes).unwrap().is_none());
        assert_eq!(unscaled.unpack(&bytes).unwrap(), vec![4, -8]);
    }
}
