//! Whitelist/blacklist selection of units.

use regex::Regex;
use tracing::debug;

use crate::collector::config::ConfigError;
use crate::collector::unit::UnitDescriptor;

/// Selects the units to collect.
///
/// A unit passes when its full name matches the whitelist, does not match
/// the blacklist and its load state is `loaded`. Patterns are anchored at
/// both ends.
#[derive(Debug, Clone)]
pub struct UnitFilter {
    whitelist: Regex,
    blacklist: Regex,
}

fn anchored(which: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| ConfigError::InvalidPattern {
        which,
        pattern: pattern.to_string(),
        source,
    })
}

impl UnitFilter {
    pub fn new(whitelist: &str, blacklist: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            whitelist: anchored("whitelist", whitelist)?,
            blacklist: anchored("blacklist", blacklist)?,
        })
    }

    pub fn accepts(&self, unit: &UnitDescriptor) -> bool {
        self.whitelist.is_match(&unit.name)
            && !self.blacklist.is_match(&unit.name)
            && unit.load_state == "loaded"
    }

    /// Keeps accepted units, preserving their order.
    pub fn filter(&self, units: Vec<UnitDescriptor>) -> Vec<UnitDescriptor> {
        units
            .into_iter()
            .filter(|unit| {
                let accepted = self.accepts(unit);
                if accepted {
                    debug!("Adding unit: {}", unit.name);
                } else {
                    debug!("Ignoring unit: {}", unit.name);
                }
                accepted
            })
            .collect()
    }
}
