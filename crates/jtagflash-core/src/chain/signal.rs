//! Signal identifiers and boundary-scan cell descriptions

use core::fmt;

/// Structured signal identifier
///
/// A signal is named by a base name and an optional bus index, so `MA[7]`
/// is `SignalId::indexed("MA", 7)` and `nWE` is `SignalId::new("nWE")`.
/// Comparison and hashing work on the pair directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId {
    name: &'static str,
    index: Option<u16>,
}

impl SignalId {
    /// Create an identifier for a single (non-bus) signal
    pub const fn new(name: &'static str) -> Self {
        Self { name, index: None }
    }

    /// Create an identifier for one line of a bus
    pub const fn indexed(name: &'static str, index: u16) -> Self {
        Self {
            name,
            index: Some(index),
        }
    }

    /// Base name of the signal
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bus index, if the signal is part of a bus
    pub fn index(&self) -> Option<u16> {
        self.index
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.name, i),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Direction of a signal as seen from the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sampled from the target only
    Input,
    /// Driven by the controller only
    Output,
    /// Can be driven or sampled
    Bidirectional,
}

/// Boundary-scan cells backing a signal
///
/// Positions are bit offsets inside the owning part's data register. A
/// control cell, when present, enables the output driver when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalCells {
    /// Cell capturing the pin level
    pub input: Option<usize>,
    /// Cell holding the value driven onto the pin
    pub output: Option<usize>,
    /// Cell enabling the output driver
    pub control: Option<usize>,
}

impl SignalCells {
    /// Input-only signal
    pub const fn input(bit: usize) -> Self {
        Self {
            input: Some(bit),
            output: None,
            control: None,
        }
    }

    /// Output signal with a driver enable cell
    pub const fn output(output: usize, control: usize) -> Self {
        Self {
            input: None,
            output: Some(output),
            control: Some(control),
        }
    }

    /// Bidirectional signal (input, output and enable cells)
    pub const fn bidirectional(input: usize, output: usize, control: usize) -> Self {
        Self {
            input: Some(input),
            output: Some(output),
            control: Some(control),
        }
    }

    /// Direction implied by the cells, `None` if the signal has neither an
    /// input nor an output cell
    pub fn direction(&self) -> Option<Direction> {
        match (self.input, self.output) {
            (Some(_), Some(_)) => Some(Direction::Bidirectional),
            (Some(_), None) => Some(Direction::Input),
            (None, Some(_)) => Some(Direction::Output),
            (None, None) => None,
        }
    }

    /// Highest cell position used by this signal
    pub(crate) fn max_bit(&self) -> Option<usize> {
        [self.input, self.output, self.control]
            .into_iter()
            .flatten()
            .max()
    }
}
