//! Parameter snapshots as JSON files.

use log::info;
use netsolve_core::{Net, NetsolveError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBlob {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Learnable parameters of a net at a given iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub iter: usize,
    pub params: Vec<NamedBlob>,
}

impl Snapshot {
    pub fn capture<N: Net + ?Sized>(net: &N, iter: usize) -> Self {
        let params = net
            .learnable_params()
            .into_iter()
            .map(|(name, blob)| NamedBlob {
                name,
                shape: blob.shape().to_vec(),
                data: blob.data().to_vec(),
            })
            .collect();
        Snapshot { iter, params }
    }

    /// Copies the stored values into `net`.
    ///
    /// Nothing is written unless every parameter matches by position, name
    /// and shape.
    pub fn apply_to<N: Net + ?Sized>(&self, net: &mut N) -> Result<(), NetsolveError> {
        let layout: Vec<(String, Vec<usize>)> = net
            .learnable_params()
            .into_iter()
            .map(|(name, blob)| (name, blob.shape().to_vec()))
            .collect();
        if layout.len() != self.params.len() {
            return Err(NetsolveError::DimensionMismatch {
                expected: layout.len(),
                actual: self.params.len(),
            });
        }
        for ((name, shape), stored) in layout.iter().zip(&self.params) {
            if *name != stored.name {
                return Err(NetsolveError::UnknownOutput(stored.name.clone()));
            }
            if *shape != stored.shape || stored.data.len() != shape.iter().product::<usize>() {
                return Err(NetsolveError::shape(shape, &stored.shape, &format!("restore {}", name)));
            }
        }
        for (blob, stored) in net.learnable_params_mut().into_iter().zip(&self.params) {
            blob.data_mut().copy_from_slice(&stored.data);
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, NetsolveError> {
        serde_json::to_string(self).map_err(|e| NetsolveError::Serialization(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, NetsolveError> {
        serde_json::from_str(text).map_err(|e| NetsolveError::Serialization(e.to_string()))
    }
}

pub fn snapshot_path(prefix: &str, iter: usize) -> PathBuf {
    PathBuf::from(format!("{}_iter_{}.json", prefix, iter))
}

/// Writes `{prefix}_iter_{iter}.json`, creating its directory if needed.
pub fn save<N: Net + ?Sized>(net: &N, iter: usize, prefix: &str) -> Result<PathBuf, NetsolveError> {
    let path = snapshot_path(prefix, iter);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&path, Snapshot::capture(net, iter).to_json()?)?;
    info!("Snapshotting to {}", path.display());
    Ok(path)
}

/// Loads a snapshot into `net` and returns the iteration it was taken at.
pub fn restore<N: Net + ?Sized>(net: &mut N, path: impl AsRef<Path>) -> Result<usize, NetsolveError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| NetsolveError::Io(format!("{}: {}", path.display(), e)))?;
    let snapshot = Snapshot::from_json(&text)?;
    snapshot.apply_to(net)?;
    info!("Restored {} at iteration {}", path.display(), snapshot.iter);
    Ok(snapshot.iter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsolve_core::DenseNet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn net(seed: u64, hidden: &[usize]) -> DenseNet {
        DenseNet::new(&[1, 2, 2], hidden, 3, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_save_and_restore() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("nested/lenet");
        let source = net(1, &[5]);
        let path = save(&source, 250, prefix.to_str().unwrap()).unwrap();
        assert!(path.ends_with("nested/lenet_iter_250.json"));

        let mut target = net(2, &[5]);
        assert_ne!(target.learnable_params()[0].1.data(), source.learnable_params()[0].1.data());
        assert_eq!(restore(&mut target, &path).unwrap(), 250);
        for ((_, a), (_, b)) in source.learnable_params().iter().zip(target.learnable_params()) {
            assert_eq!(a.data(), b.data());
        }
    }

    #[test]
    fn test_restore_rejects_other_architectures() {
        let snapshot = Snapshot::capture(&net(1, &[5]), 10);

        let mut wider = net(1, &[6]);
        assert!(matches!(snapshot.apply_to(&mut wider), Err(NetsolveError::ShapeMismatch { .. })));

        let mut deeper = net(1, &[5, 4]);
        assert!(matches!(
            snapshot.apply_to(&mut deeper),
            Err(NetsolveError::DimensionMismatch { expected: 6, actual: 4 })
        ));

        let mut renamed = snapshot.clone();
        renamed.params[0].name = "conv1.weight".to_string();
        let mut same = net(3, &[5]);
        let before = same.learnable_params()[0].1.data().to_vec();
        assert_eq!(
            renamed.apply_to(&mut same),
            Err(NetsolveError::UnknownOutput("conv1.weight".to_string()))
        );
        assert_eq!(same.learnable_params()[0].1.data(), before.as_slice());
    }

    #[test]
    fn test_restore_missing_or_garbled_file() {
        let dir = tempdir().unwrap();
        let mut target = net(1, &[]);
        assert!(matches!(restore(&mut target, dir.path().join("nope.json")), Err(NetsolveError::Io(_))));
        let garbled = dir.path().join("bad.json");
        fs::write(&garbled, "{\"iter\": 3").unwrap();
        assert!(matches!(restore(&mut target, &garbled), Err(NetsolveError::Serialization(_))));
    }
}
