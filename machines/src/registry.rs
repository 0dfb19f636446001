//! Machine registry for automatic front-end discovery.
//!
//! Each buildable machine model self-registers via [`inventory::submit!`]
//! with a [`MachineEntry`] carrying its CLI name, the name of the ROM
//! directory holding its firmware, and a factory function. The front-end
//! discovers available models at runtime without a central list.

use ember_core::core::machine::Machine;

use crate::rom_loader::{RomLoadError, RomSet};

/// Describes a buildable machine model.
pub struct MachineEntry {
    /// CLI name used to select this model (e.g., "coco2").
    pub name: &'static str,
    /// ROM directory name holding the model's firmware images.
    pub rom_name: &'static str,
    /// Factory: construct a Machine from a loaded ROM set.
    pub create: fn(&RomSet) -> Result<Box<dyn Machine>, RomLoadError>,
}

impl MachineEntry {
    pub const fn new(
        name: &'static str,
        rom_name: &'static str,
        create: fn(&RomSet) -> Result<Box<dyn Machine>, RomLoadError>,
    ) -> Self {
        Self {
            name,
            rom_name,
            create,
        }
    }
}

inventory::collect!(MachineEntry);

/// Return all registered models, sorted by name.
pub fn all() -> Vec<&'static MachineEntry> {
    let mut entries: Vec<_> = inventory::iter::<MachineEntry>.into_iter().collect();
    entries.sort_by_key(|e| e.name);
    entries
}

/// Look up a model by its CLI name.
pub fn find(name: &str) -> Option<&'static MachineEntry> {
    inventory::iter::<MachineEntry>
        .into_iter()
        .find(|e| e.name == name)
}
