//! Fixed-capacity table of client slots
//!
//! The slot index is the client's id. This module handles:
//! - First-fit assignment of a free slot to a newly accepted connection
//! - Lookup of the link behind a client id for sending
//! - Freeing a slot, either by its own receive task or by an explicit removal
//! - Draining every occupied slot during teardown
//!
//! Each assignment is stamped with a generation. A receive task can only
//! release the generation it was started for, so a task that notices its
//! peer is gone after the slot was already removed and handed to a newer
//! connection leaves the newer connection alone.

use log::info;
use shared::Link;

/// Index of a slot in the server's table
pub type ClientId = u32;

/// One occupied slot
#[derive(Debug)]
struct Slot<L> {
    link: L,
    generation: u64,
}

/// Maps client ids to the link that currently occupies them
///
/// A link leaves the table only through [`release`](SlotTable::release),
/// [`remove`](SlotTable::remove) or [`drain`](SlotTable::drain). All three
/// shut the link down and hand it back to the caller, whose drop closes it,
/// so every link is closed exactly once.
#[derive(Debug)]
pub struct SlotTable<L> {
    slots: Vec<Option<Slot<L>>>,
    next_generation: u64,
}

impl<L: Link> SlotTable<L> {
    /// Creates a table with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            next_generation: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    pub fn is_full(&self) -> bool {
        self.first_free().is_none()
    }

    /// Finds the lowest free slot
    ///
    /// Linear in the capacity. Returns None when every slot is taken.
    pub fn first_free(&self) -> Option<ClientId> {
        self.slots
            .iter()
            .position(|slot| slot.is_none())
            .map(|index| index as ClientId)
    }

    /// Puts a link into the lowest free slot
    ///
    /// Returns the client id together with the generation the slot's
    /// receive task must present when it releases the slot. Gives the link
    /// back untouched if the table is full.
    pub fn assign(&mut self, link: L) -> Result<(ClientId, u64), L> {
        let Some(id) = self.first_free() else {
            return Err(link);
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        self.slots[id as usize] = Some(Slot { link, generation });

        info!("Client {} assigned to slot", id);
        Ok((id, generation))
    }

    /// Returns the link occupying `id`, if any
    pub fn get(&self, id: ClientId) -> Option<&L> {
        self.slots
            .get(id as usize)
            .and_then(|slot| slot.as_ref())
            .map(|slot| &slot.link)
    }

    /// Frees `id` on behalf of the receive task started for `generation`
    ///
    /// Does nothing and returns None if the slot is free or was reassigned
    /// in the meantime.
    pub fn release(&mut self, id: ClientId, generation: u64) -> Option<L> {
        let entry = self.slots.get_mut(id as usize)?;
        if entry.as_ref().map(|slot| slot.generation) != Some(generation) {
            return None;
        }

        let slot = entry.take()?;
        slot.link.shutdown();
        info!("Client {} released its slot", id);
        Some(slot.link)
    }

    /// Frees `id` regardless of which connection holds it
    ///
    /// Returns None for an out-of-range id or a slot that is already free,
    /// which makes removing twice harmless.
    pub fn remove(&mut self, id: ClientId) -> Option<L> {
        let slot = self.slots.get_mut(id as usize)?.take()?;
        slot.link.shutdown();
        info!("Client {} removed", id);
        Some(slot.link)
    }

    /// Frees every occupied slot and returns their links
    pub fn drain(&mut self) -> Vec<L> {
        self.slots
            .iter_mut()
            .filter_map(|entry| entry.take())
            .map(|slot| {
                slot.link.shutdown();
                slot.link
            })
            .collect()
    }

    /// Returns the ids of all occupied slots in ascending order
    pub fn occupied(&self) -> Vec<ClientId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index as ClientId)
            .collect()
    }
}
