//! Target registry and initialization
//!
//! Opens a target by name, autodetects the flash behind its bus and
//! returns a [`FlashHandle`].

use jtagflash_core::bus::Bus;
use jtagflash_core::flash::{FlashController, PartDatabase, PollConfig};

use crate::error::{Result, SessionError};
use crate::handle::{BoxedBus, FlashHandle};

/// Parsed target parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetParams {
    /// Target name
    pub name: String,
    /// Key-value parameters, in the order given
    pub params: Vec<(String, String)>,
}

impl TargetParams {
    /// Parameters as borrowed pairs
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse a target string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
///
/// # Example
/// ```ignore
/// let params = parse_target_params("dummy:busy=3")?;
/// assert_eq!(params.name, "dummy");
/// assert_eq!(params.params, [("busy".to_string(), "3".to_string())]);
/// ```
pub fn parse_target_params(s: &str) -> Result<TargetParams> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = Vec::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            let (key, value) = opt
                .split_once('=')
                .ok_or_else(|| SessionError::InvalidParameter(opt.to_string()))?;
            params.push((key.to_string(), value.to_string()));
        }
    }

    Ok(TargetParams {
        name: name.to_string(),
        params,
    })
}

/// Open a target and detect its flash
///
/// # Arguments
/// * `target` - Target string (e.g., "dummy" or "dummy:part=AT32UC3B064")
/// * `db` - Part database used for identification
/// * `poll` - Readiness polling bounds for flash commands
pub fn open_target(target: &str, db: &PartDatabase, poll: PollConfig) -> Result<FlashHandle> {
    let params = parse_target_params(target)?;
    let bus = open_bus(&params, db)?;

    let mut ctl = FlashController::with_poll(bus, poll);
    match ctl.autodetect_in(db.parts())? {
        Some(info) => Ok(FlashHandle::new(ctl, info, params.name)),
        None => Err(SessionError::NotDetected {
            id: ctl.bus().target_id()?,
        }),
    }
}

/// Open the bus of a target without probing the flash
pub fn open_bus(params: &TargetParams, db: &PartDatabase) -> Result<BoxedBus> {
    match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(params, db),

        _ => {
            let _ = db;
            Err(SessionError::UnknownTarget(params.name.clone()))
        }
    }
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &TargetParams, db: &PartDatabase) -> Result<BoxedBus> {
    let config = jtagflash_dummy::parse_options(&params.pairs(), db.parts())?;
    log::info!(
        "Opening emulated board ({}, {} address lines)",
        config.part.name,
        config.bus.address_lines
    );
    Ok(Box::new(jtagflash_dummy::DummyBoard::bus(&config)?))
}

/// Information about a target
pub struct TargetInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Get information about all available targets (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_targets() -> Vec<TargetInfo> {
    let mut targets = Vec::new();

    #[cfg(feature = "dummy")]
    targets.push(TargetInfo {
        name: "dummy",
        description: "Emulated PXA-style board with AT32UC3 flash (part=<name>,busy=<n>,bus=<pxa250|wide>,inert=<n>,idcode=<id>)",
    });

    targets
}

/// Generate a short list of target names for CLI help
pub fn target_names_short() -> String {
    let targets = available_targets();
    if targets.is_empty() {
        return "none (recompile with features)".to_string();
    }
    let names: Vec<&str> = targets.iter().map(|t| t.name).collect();
    names.join(", ")
}
