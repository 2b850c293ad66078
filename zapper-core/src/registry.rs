//! Named signal storage, consumed as an opaque synchronous dependency.
//!
//! The core mandates nothing about the storage format; the application
//! supplies an implementation (a JSON file in the stock front end).

use std::collections::HashMap;

use crate::error::Error;
use crate::signal::DecodedSignal;

pub trait SignalRegistry {
    /// Persist `signal` under `name`, replacing any previous definition.
    fn store(&mut self, name: &str, signal: &DecodedSignal) -> Result<(), Error>;

    fn load(&self, name: &str) -> Result<DecodedSignal, Error>;

    /// Stored names, sorted.
    fn list(&self) -> Result<Vec<String>, Error>;
}

/// In-memory registry for tests and throwaway sessions.
#[derive(Default)]
pub struct MemRegistry {
    signals: HashMap<String, DecodedSignal>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalRegistry for MemRegistry {
    fn store(&mut self, name: &str, signal: &DecodedSignal) -> Result<(), Error> {
        self.signals.insert(name.to_owned(), signal.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<DecodedSignal, Error> {
        self.signals
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSignal(name.to_owned()))
    }

    fn list(&self) -> Result<Vec<String>, Error> {
        let mut names: Vec<String> = self.signals.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Protocol;

    #[test]
    fn store_load_list() {
        let mut reg = MemRegistry::new();
        let sig = DecodedSignal::new(Protocol::Nec, Some(4), 8);
        reg.store("tv_power", &sig).unwrap();
        reg.store("tv_mute", &DecodedSignal::new(Protocol::Rc5, Some(0), 13))
            .unwrap();

        assert_eq!(reg.load("tv_power").unwrap(), sig);
        assert_eq!(reg.list().unwrap(), vec!["tv_mute", "tv_power"]);
        assert_eq!(
            reg.load("nope"),
            Err(Error::UnknownSignal("nope".to_owned()))
        );
    }
}
