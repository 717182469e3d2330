//! The global probability model and its fingerprint.
//!
//! The engine gates every mutation on the operator role before calling in
//! here; this module only validates values and applies them.

use coldchain_decision::{Cpt, NodeId, Priors, ProbabilityModel};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// SHA-256 over [`ProbabilityModel::canonical_bytes`].
pub fn fingerprint(model: &ProbabilityModel) -> [u8; 32] {
    let digest = Sha256::digest(model.canonical_bytes());
    let mut output = [0u8; 32];
    output.copy_from_slice(&digest);
    output
}

/// Owner of the single global [`ProbabilityModel`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelStore {
    model: ProbabilityModel,
}

impl ModelStore {
    /// Empty store: priors `(0, 0)`, no CPTs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current model.
    pub const fn model(&self) -> &ProbabilityModel {
        &self.model
    }

    /// Validate and overwrite the prior pair.
    pub fn set_priors(&mut self, f1: u8, f2: u8) -> Result<Priors> {
        let priors = Priors::new(f1, f2)?;
        self.model.set_priors(priors);
        Ok(priors)
    }

    /// Validate and overwrite one CPT. Returns the node and previous table.
    pub fn set_cpt(&mut self, node: u8, table: [u8; 4]) -> Result<(NodeId, Option<Cpt>)> {
        let node = NodeId::new(node)?;
        let cpt = Cpt::from_table(table)?;
        Ok((node, self.model.set_cpt(node, cpt)))
    }

    /// Copy of the model, only if all five CPTs are set.
    pub fn complete_snapshot(&self) -> Result<ProbabilityModel> {
        if self.model.is_complete() {
            Ok(self.model.clone())
        } else {
            Err(Error::ModelIncomplete {
                missing: self.model.missing(),
            })
        }
    }

    /// Fingerprint of the current model.
    pub fn fingerprint(&self) -> [u8; 32] {
        fingerprint(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn set_priors_validates_before_writing() {
        let mut store = ModelStore::new();
        store.set_priors(90, 90).unwrap();
        let err = store.set_priors(101, 50).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.model().priors(), Priors::new(90, 90).unwrap());
    }

    #[test]
    fn set_cpt_rejects_unknown_node_and_bad_values() {
        let mut store = ModelStore::new();
        assert!(store.set_cpt(0, [1, 2, 3, 4]).is_err());
        assert!(store.set_cpt(6, [1, 2, 3, 4]).is_err());
        assert!(store.set_cpt(1, [1, 2, 3, 104]).is_err());
        assert!(store.model().missing().len() == 5);

        let (node, previous) = store.set_cpt(3, [70, 10, 70, 10]).unwrap();
        assert_eq!(node.get(), 3);
        assert_eq!(previous, None);
        let (_, previous) = store.set_cpt(3, [71, 10, 70, 10]).unwrap();
        assert_eq!(previous.map(Cpt::table), Some([70, 10, 70, 10]));
    }

    #[test]
    fn snapshot_requires_complete_model() {
        let mut store = ModelStore::new();
        for node in 1..=4 {
            store.set_cpt(node, [50, 50, 50, 50]).unwrap();
        }
        let err = store.complete_snapshot().unwrap_err();
        assert!(matches!(
            err,
            Error::ModelIncomplete { ref missing } if missing.len() == 1
        ));
        store.set_cpt(5, [50, 50, 50, 50]).unwrap();
        assert!(store.complete_snapshot().is_ok());
    }

    #[test]
    fn fingerprint_tracks_changes() {
        let mut store = ModelStore::new();
        let empty = store.fingerprint();
        assert_eq!(empty, ModelStore::new().fingerprint());
        store.set_priors(90, 90).unwrap();
        assert_ne!(store.fingerprint(), empty);
    }
}
