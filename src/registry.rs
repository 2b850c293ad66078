//! JSON file signal registry.
//!
//! A single JSON object of name -> signal at a user-chosen path. Every
//! rewrite rotates the previous contents through `.bak`, `.bak1`, `.bak2`,
//! so a bad recording session cannot eat a code file that took an evening
//! of pointing remotes at the receiver to build.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use zapper_core::{DecodedSignal, Error, SignalRegistry};

pub struct JsonRegistry {
    path: PathBuf,
}

impl JsonRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> JsonRegistry {
        JsonRegistry {
            path: path.as_ref().to_owned(),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, DecodedSignal>, Error> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| Error::Registry(e.to_string()))
            }
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::Registry(e.to_string())),
        }
    }

    fn write_all(&self, signals: &BTreeMap<String, DecodedSignal>) -> Result<(), Error> {
        self.rotate_backups();
        let json =
            serde_json::to_vec_pretty(signals).map_err(|e| Error::Registry(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| Error::Registry(e.to_string()))
    }

    /// file -> file.bak -> file.bak1 -> file.bak2
    fn rotate_backups(&self) {
        let _ = fs::rename(self.with_suffix(".bak1"), self.with_suffix(".bak2"));
        let _ = fs::rename(self.with_suffix(".bak"), self.with_suffix(".bak1"));
        let _ = fs::rename(&self.path, self.with_suffix(".bak"));
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut s = self.path.clone().into_os_string();
        s.push(suffix);
        PathBuf::from(s)
    }
}

impl SignalRegistry for JsonRegistry {
    fn store(&mut self, name: &str, signal: &DecodedSignal) -> Result<(), Error> {
        let mut signals = self.read_all()?;
        signals.insert(name.to_owned(), signal.clone());
        self.write_all(&signals)
    }

    fn load(&self, name: &str) -> Result<DecodedSignal, Error> {
        self.read_all()?
            .remove(name)
            .ok_or_else(|| Error::UnknownSignal(name.to_owned()))
    }

    fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.read_all()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapper_core::Protocol;

    fn scratch_path(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("zapper-regtest-{}-{}", std::process::id(), tag));
        p
    }

    fn cleanup(path: &Path) {
        for suffix in &["", ".bak", ".bak1", ".bak2"] {
            let mut s = path.to_owned().into_os_string();
            s.push(suffix);
            let _ = fs::remove_file(PathBuf::from(s));
        }
    }

    #[test]
    fn store_and_load_round_trip() {
        let path = scratch_path("roundtrip");
        cleanup(&path);

        let mut reg = JsonRegistry::new(&path);
        let sig = DecodedSignal::new(Protocol::Nec, Some(0x10), 0x2F);
        reg.store("amp_volume_up", &sig).unwrap();

        assert_eq!(reg.load("amp_volume_up").unwrap(), sig);
        assert_eq!(reg.list().unwrap(), vec!["amp_volume_up"]);
        assert!(matches!(reg.load("missing"), Err(Error::UnknownSignal(_))));

        cleanup(&path);
    }

    #[test]
    fn rewrite_keeps_a_backup() {
        let path = scratch_path("backup");
        cleanup(&path);

        let mut reg = JsonRegistry::new(&path);
        reg.store("a", &DecodedSignal::new(Protocol::Rc5, Some(1), 2))
            .unwrap();
        reg.store("b", &DecodedSignal::new(Protocol::Sirc, Some(3), 4))
            .unwrap();

        let bak: BTreeMap<String, DecodedSignal> =
            serde_json::from_slice(&fs::read(reg.with_suffix(".bak")).unwrap()).unwrap();
        assert!(bak.contains_key("a"));
        assert!(!bak.contains_key("b"));
        assert_eq!(reg.list().unwrap(), vec!["a", "b"]);

        cleanup(&path);
    }
}
