//! Compositor snapshots: a fixed prefix, a format version, and the bincode-encoded state

use crate::ppu::Ppu;
use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

const SNAPSHOT_PREFIX: &[u8] = b"gbraster";

// Prefix + 2 bytes for version
const HEADER_LEN: usize = SNAPSHOT_PREFIX.len() + 2;

pub const SNAPSHOT_VERSION: u16 = 1;

macro_rules! bincode_config {
    () => {
        bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding()
            .with_limit::<{ 100 * 1024 * 1024 }>()
    };
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot does not start with the expected prefix")]
    PrefixMismatch,
    #[error("Snapshot version mismatch; expected {expected}, was {actual}")]
    VersionMismatch { expected: u16, actual: u16 },
    #[error("Error encoding snapshot: {source}")]
    Encode {
        #[from]
        source: EncodeError,
    },
    #[error("Error decoding snapshot: {source}")]
    Decode {
        #[from]
        source: DecodeError,
    },
}

/// Serialize the full compositor state, including memory, registers, and pending writes.
///
/// # Errors
///
/// Propagates bincode encoding errors.
pub fn save_snapshot(ppu: &Ppu) -> Result<Vec<u8>, SnapshotError> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + 128 * 1024);
    bytes.extend_from_slice(SNAPSHOT_PREFIX);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());

    let body = bincode::encode_to_vec(ppu, bincode_config!())?;
    bytes.extend_from_slice(&body);

    log::debug!("Saved {} byte snapshot", bytes.len());

    Ok(bytes)
}

/// Restore a compositor from a snapshot produced by [`save_snapshot`].
///
/// # Errors
///
/// Returns an error if the prefix or version does not match, or if decoding fails.
pub fn load_snapshot(bytes: &[u8]) -> Result<Ppu, SnapshotError> {
    if bytes.len() < HEADER_LEN || &bytes[..SNAPSHOT_PREFIX.len()] != SNAPSHOT_PREFIX {
        return Err(SnapshotError::PrefixMismatch);
    }

    let version = u16::from_le_bytes([bytes[SNAPSHOT_PREFIX.len()], bytes[SNAPSHOT_PREFIX.len() + 1]]);
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch { expected: SNAPSHOT_VERSION, actual: version });
    }

    let (ppu, _) = bincode::decode_from_slice(&bytes[HEADER_LEN..], bincode_config!())?;
    Ok(ppu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppu::registers::BLDY;
    use raster_config::RasterConfig;
    use test_log::test;

    #[test]
    fn snapshot_restores_memory_and_registers() {
        let mut ppu = Ppu::new(&RasterConfig::default());
        ppu.write_vram(0x1234, 0xBEEF);
        ppu.write_palette_ram(0x20, 0x7FFF);
        ppu.write_register(BLDY, 7);

        let snapshot = save_snapshot(&ppu).unwrap();
        assert_eq!(&snapshot[..8], b"gbraster");

        let restored = load_snapshot(&snapshot).unwrap();
        assert_eq!(restored.read_vram(0x1234), 0xBEEF);
        assert_eq!(restored.read_palette_ram(0x20), 0x7FFF);
        assert_eq!(restored.read_register(BLDY), 7);
    }

    #[test]
    fn snapshot_header_is_validated() {
        let ppu = Ppu::new(&RasterConfig::default());
        let mut snapshot = save_snapshot(&ppu).unwrap();

        assert!(matches!(load_snapshot(b"gbr"), Err(SnapshotError::PrefixMismatch)));

        snapshot[8] = 99;
        assert!(matches!(
            load_snapshot(&snapshot),
            Err(SnapshotError::VersionMismatch { expected: SNAPSHOT_VERSION, actual: 99 })
        ));
    }
}
