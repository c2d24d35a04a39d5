//! In-process stand-in for the VRAM transfer engine: requests are copied into a bounded queue and
//! applied to compositor memory in one batch

use gba_raster::Ppu;
use gba_raster::bg::MAX_TRACKED_SLOTS;
use gba_raster::transfer::{TransferDestination, TransferRequest, VramTransfer};
use std::collections::VecDeque;

const QUEUE_CAPACITY: usize = 32;

#[derive(Debug)]
struct PendingCopy {
    slot: u8,
    data: Vec<u8>,
    destination: TransferDestination,
}

#[derive(Debug, Default)]
pub struct QueuedTransfer {
    pending: VecDeque<PendingCopy>,
    next_slot: u8,
}

impl QueuedTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Write every queued copy into compositor memory in request order.
    pub fn apply(&mut self, ppu: &mut Ppu) {
        if self.pending.is_empty() {
            return;
        }

        log::trace!("Applying {} queued transfers", self.pending.len());

        for PendingCopy { data, destination, .. } in self.pending.drain(..) {
            match destination {
                TransferDestination::BgVram(offset) => ppu.write_vram_bytes(offset, &data),
                TransferDestination::BgPalette(offset) => ppu.write_palette_ram_bytes(offset, &data),
            }
        }
    }
}

impl VramTransfer for QueuedTransfer {
    fn request_copy(&mut self, request: TransferRequest<'_>) -> Option<u8> {
        if self.pending.len() >= QUEUE_CAPACITY {
            return None;
        }

        let slot = self.next_slot;
        self.next_slot = (self.next_slot + 1) % MAX_TRACKED_SLOTS;

        self.pending.push_back(PendingCopy {
            slot,
            data: request.source.to_vec(),
            destination: request.destination,
        });

        Some(slot)
    }

    fn has_space(&self, slot: u8) -> bool {
        !self.pending.iter().any(|copy| copy.slot == slot)
    }
}
