//! Chain parts and their signal registries

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::signal::{SignalCells, SignalId};
use crate::error::{Error, Result};

/// Boundary-scan register layout of a part
///
/// Maps each signal to the cells backing it. The layout is normally produced
/// by whatever loads the part description; it is fixed once the chain is
/// configured.
#[derive(Debug, Clone, Default)]
pub struct PartLayout {
    dr_len: usize,
    signals: BTreeMap<SignalId, SignalCells>,
}

impl PartLayout {
    /// Create an empty layout for a data register of `dr_len` bits
    pub fn new(dr_len: usize) -> Self {
        Self {
            dr_len,
            signals: BTreeMap::new(),
        }
    }

    /// Register a signal
    ///
    /// # Errors
    /// * `InvalidSignal` - if the signal is already defined, has neither an
    ///   input nor an output cell, or uses a cell outside the register
    pub fn add_signal(&mut self, id: SignalId, cells: SignalCells) -> Result<()> {
        if self.signals.contains_key(&id) || cells.direction().is_none() {
            return Err(Error::InvalidSignal(id));
        }
        match cells.max_bit() {
            Some(bit) if bit < self.dr_len => {}
            _ => return Err(Error::InvalidSignal(id)),
        }
        self.signals.insert(id, cells);
        Ok(())
    }

    /// Builder form of [`add_signal`](Self::add_signal)
    pub fn with_signal(mut self, id: SignalId, cells: SignalCells) -> Result<Self> {
        self.add_signal(id, cells)?;
        Ok(self)
    }

    /// Length of the data register in bits
    pub fn dr_len(&self) -> usize {
        self.dr_len
    }

    /// Look up the cells of a signal
    pub fn signal(&self, id: &SignalId) -> Option<&SignalCells> {
        self.signals.get(id)
    }

    /// Iterate over all registered signals
    pub fn signals(&self) -> impl Iterator<Item = (&SignalId, &SignalCells)> {
        self.signals.iter()
    }

    /// Number of registered signals
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Whether no signals are registered
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// One device in the scan chain
///
/// A part owns the values it will drive on the next shift and the values
/// captured by the previous one. Every cell starts at 0, so all output
/// drivers start disabled.
#[derive(Debug, Clone)]
pub struct Part {
    name: String,
    id: u32,
    layout: PartLayout,
    driven: Vec<bool>,
    captured: Vec<bool>,
}

impl Part {
    /// Create a part with the given identification value and layout
    pub fn new(name: impl Into<String>, id: u32, layout: PartLayout) -> Self {
        let len = layout.dr_len();
        Self {
            name: name.into(),
            id,
            layout,
            driven: vec![false; len],
            captured: vec![false; len],
        }
    }

    /// Create an inert part that only contributes a one-bit register
    pub fn bypass(name: impl Into<String>, id: u32) -> Self {
        Self::new(name, id, PartLayout::new(1))
    }

    /// Part name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identification register value
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Register layout
    pub fn layout(&self) -> &PartLayout {
        &self.layout
    }

    /// Length of the data register in bits
    pub fn dr_len(&self) -> usize {
        self.layout.dr_len()
    }

    /// Assign a signal for the next shift
    ///
    /// With `enabled` set the output driver is switched on and `value` is
    /// driven. Otherwise the driver is switched off and the pin is left to
    /// the target.
    ///
    /// # Errors
    /// * `UnknownSignal` - if the signal is not defined
    /// * `SignalDirection` - if `enabled` is set on an input-only signal
    pub fn set_signal(&mut self, id: SignalId, enabled: bool, value: bool) -> Result<()> {
        let cells = *self.layout.signal(&id).ok_or(Error::UnknownSignal(id))?;

        if enabled && cells.output.is_none() {
            return Err(Error::SignalDirection(id));
        }
        if let Some(out) = cells.output {
            self.driven[out] = value;
        }
        if let Some(ctrl) = cells.control {
            self.driven[ctrl] = enabled;
        }
        Ok(())
    }

    /// Value of a signal captured by the most recent shift
    ///
    /// # Errors
    /// * `UnknownSignal` - if the signal is not defined
    /// * `SignalDirection` - if the signal has no input cell
    pub fn get_signal(&self, id: SignalId) -> Result<bool> {
        let cells = self.layout.signal(&id).ok_or(Error::UnknownSignal(id))?;
        let input = cells.input.ok_or(Error::SignalDirection(id))?;
        Ok(self.captured[input])
    }

    pub(crate) fn driven_bits(&self) -> &[bool] {
        &self.driven
    }

    pub(crate) fn capture(&mut self, bits: &[bool]) {
        self.captured.copy_from_slice(bits);
    }
}
