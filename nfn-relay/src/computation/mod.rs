//! In-network evaluation of expression names.
//!
//! A computation that needs external data is parked in a continuation
//! table under its [`ConfigId`] and resumed when the data is delivered.

pub mod machine;
pub mod term;

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info};
use nfn_core::{Interest, Prefix};
use serde::{Deserialize, Serialize};

use crate::error::ComputationError;
use machine::{Machine, Outcome};

pub use machine::{Closure, Environment, Step, Value};
pub use term::{parse_term, Term};

/// Identifier of a computation, used to resume it after a sub-Interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(pub u64);

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config#{}", self.0)
    }
}

/// A computation in progress
#[derive(Debug)]
pub struct Configuration {
    pub id: ConfigId,
    /// The Interest that asked for the result
    pub origin: Interest,
    /// Name of the data the computation is waiting for
    pub awaiting: Option<Prefix>,
    machine: Machine,
}

impl Configuration {
    pub fn transitions(&self) -> u64 {
        self.machine.transitions()
    }
}

/// Where a computation stands after being started or resumed
#[derive(Debug)]
pub enum Progress {
    Done {
        origin: Interest,
        result: Vec<u8>,
        transitions: u64,
    },
    Suspended {
        id: ConfigId,
        name: Prefix,
    },
}

/// Continuation table of suspended computations
#[derive(Debug)]
pub struct ComputationEngine {
    suspended: BTreeMap<ConfigId, Configuration>,
    next_id: u64,
    step_limit: u64,
}

impl ComputationEngine {
    pub fn new(step_limit: u64) -> Self {
        Self {
            suspended: BTreeMap::new(),
            next_id: 0,
            step_limit,
        }
    }

    /// Parse the expression carried by an Interest name and reduce it
    pub fn start(&mut self, interest: &Interest) -> Result<Progress, ComputationError> {
        let prefix = &interest.prefix;
        let source = prefix
            .expression()
            .ok_or_else(|| ComputationError::Parse(format!("{} is not an expression", prefix)))?;
        if prefix.nfn.thunk {
            debug!("Thunk requested for {}, reducing in place", prefix);
        }
        let term = parse_term(&source)?;

        let id = ConfigId(self.next_id);
        self.next_id += 1;
        info!("Starting {} for {:?}", id, source);

        self.drive(Configuration {
            id,
            origin: interest.clone(),
            awaiting: None,
            machine: Machine::new(term),
        })
    }

    /// Hand a suspended computation the data it was waiting for
    pub fn resume(&mut self, id: ConfigId, payload: &[u8]) -> Result<Progress, ComputationError> {
        let mut config = self
            .suspended
            .remove(&id)
            .ok_or(ComputationError::UnknownConfiguration(id))?;
        debug!("Resuming {} with {} bytes", id, payload.len());
        config.machine.resume(payload)?;
        config.awaiting = None;
        self.drive(config)
    }

    /// Forget a suspended computation
    pub fn discard(&mut self, id: ConfigId) -> bool {
        let removed = self.suspended.remove(&id).is_some();
        if removed {
            debug!("Discarded {}", id);
        }
        removed
    }

    fn drive(&mut self, mut config: Configuration) -> Result<Progress, ComputationError> {
        match config.machine.run(self.step_limit)? {
            Outcome::Done(value) => {
                let transitions = config.transitions();
                debug!("{} finished after {} transitions", config.id, transitions);
                Ok(Progress::Done {
                    origin: config.origin,
                    result: value.into_bytes(),
                    transitions,
                })
            }
            Outcome::Suspended(name) => {
                let prefix = Prefix::from_uri_with_suite(&name, config.origin.prefix.suite)
                    .map_err(|e| ComputationError::Parse(e.to_string()))?;
                let id = config.id;
                debug!("{} waiting for {}", id, prefix);
                config.awaiting = Some(prefix.clone());
                self.suspended.insert(id, config);
                Ok(Progress::Suspended { id, name: prefix })
            }
        }
    }

    pub fn get(&self, id: ConfigId) -> Option<&Configuration> {
        self.suspended.get(&id)
    }

    pub fn is_suspended(&self, id: ConfigId) -> bool {
        self.suspended.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.suspended.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suspended.is_empty()
    }
}
