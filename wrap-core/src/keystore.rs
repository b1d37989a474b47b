//! Durable storage for Groth16 key material and the compiled circuit.
//!
//! Everything is stored as compressed `ark-serialize` bytes with no version
//! header. Reads are validated and must consume the whole file; writes go
//! through a staging file so a failed save never truncates the destination.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ark_groth16::{ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use tracing::debug;

use crate::{
    groth16::{CompiledCircuit, WrapCurve},
    utils::{errors::WrapError, fs::write_atomically},
};

pub fn read_canonical<T: CanonicalDeserialize>(path: &Path) -> Result<T, WrapError> {
    let key_read = |reason: String| WrapError::KeyRead {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = fs::read(path).map_err(|e| key_read(e.to_string()))?;
    let mut reader = bytes.as_slice();
    let value = T::deserialize_compressed(&mut reader).map_err(|e| key_read(e.to_string()))?;
    if !reader.is_empty() {
        return Err(key_read(format!("{} trailing bytes", reader.len())));
    }
    debug!(path = %path.display(), bytes = bytes.len(), "loaded");
    Ok(value)
}

pub fn write_canonical<T: CanonicalSerialize>(path: &Path, value: &T) -> Result<(), WrapError> {
    write_atomically(path, |w| {
        value
            .serialize_compressed(w)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    })
    .map_err(|e| WrapError::KeyWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(path = %path.display(), bytes = value.compressed_size(), "saved");
    Ok(())
}

/// Where the pipeline keeps its key material.
pub trait KeyStore: Sync {
    fn load_proving_key<E: WrapCurve>(&self) -> Result<ProvingKey<E>, WrapError>;

    fn load_verifying_key<E: WrapCurve>(&self) -> Result<VerifyingKey<E>, WrapError>;

    fn save_proving_key<E: WrapCurve>(&self, pk: &ProvingKey<E>) -> Result<(), WrapError>;

    fn save_verifying_key<E: WrapCurve>(&self, vk: &VerifyingKey<E>) -> Result<(), WrapError>;

    /// `None` when the store does not keep a compiled circuit.
    fn load_compiled(&self) -> Result<Option<CompiledCircuit>, WrapError>;

    fn save_compiled(&self, compiled: &CompiledCircuit) -> Result<(), WrapError>;
}

/// Keys as files at fixed paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileKeyStore {
    pub proving_key: PathBuf,
    pub verifying_key: PathBuf,
    pub compiled_circuit: Option<PathBuf>,
}

impl KeyStore for FileKeyStore {
    fn load_proving_key<E: WrapCurve>(&self) -> Result<ProvingKey<E>, WrapError> {
        read_canonical(&self.proving_key)
    }

    fn load_verifying_key<E: WrapCurve>(&self) -> Result<VerifyingKey<E>, WrapError> {
        read_canonical(&self.verifying_key)
    }

    fn save_proving_key<E: WrapCurve>(&self, pk: &ProvingKey<E>) -> Result<(), WrapError> {
        write_canonical(&self.proving_key, pk)
    }

    fn save_verifying_key<E: WrapCurve>(&self, vk: &VerifyingKey<E>) -> Result<(), WrapError> {
        write_canonical(&self.verifying_key, vk)
    }

    fn load_compiled(&self) -> Result<Option<CompiledCircuit>, WrapError> {
        self.compiled_circuit
            .as_deref()
            .map(read_canonical::<CompiledCircuit>)
            .transpose()
    }

    fn save_compiled(&self, compiled: &CompiledCircuit) -> Result<(), WrapError> {
        match &self.compiled_circuit {
            Some(path) => write_canonical(path, compiled),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groth16::R1csMatrices;
    use ark_bn254::{Bn254, Fr, G1Affine, G2Affine};
    use ark_ec::AffineRepr;

    fn store(dir: &Path) -> FileKeyStore {
        FileKeyStore {
            proving_key: dir.join("vm_pk"),
            verifying_key: dir.join("vm_vk"),
            compiled_circuit: Some(dir.join("vm_ccs")),
        }
    }

    fn toy_vk() -> VerifyingKey<Bn254> {
        VerifyingKey {
            alpha_g1: G1Affine::generator(),
            beta_g2: G2Affine::generator(),
            gamma_g2: G2Affine::generator(),
            delta_g2: G2Affine::generator(),
            gamma_abc_g1: vec![G1Affine::generator(); 3],
        }
    }

    #[test]
    fn verifying_key_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save_verifying_key(&toy_vk()).unwrap();
        assert_eq!(store.load_verifying_key::<Bn254>().unwrap(), toy_vk());
    }

    #[test]
    fn missing_or_truncated_keys_are_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(
            store.load_proving_key::<Bn254>(),
            Err(WrapError::KeyRead { .. })
        ));

        store.save_verifying_key(&toy_vk()).unwrap();
        let bytes = fs::read(&store.verifying_key).unwrap();
        fs::write(&store.verifying_key, &bytes[..bytes.len() - 1]).unwrap();
        assert!(matches!(
            store.load_verifying_key::<Bn254>(),
            Err(WrapError::KeyRead { .. })
        ));

        let mut padded = bytes.clone();
        padded.push(0);
        fs::write(&store.verifying_key, padded).unwrap();
        assert!(matches!(
            store.load_verifying_key::<Bn254>(),
            Err(WrapError::KeyRead { .. })
        ));
    }

    #[test]
    fn unwritable_destination_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let store = FileKeyStore {
            proving_key: blocker.join("vm_pk"),
            verifying_key: blocker.join("vm_vk"),
            compiled_circuit: None,
        };
        assert!(matches!(
            store.save_verifying_key(&toy_vk()),
            Err(WrapError::KeyWrite { .. })
        ));
    }

    #[test]
    fn compiled_circuit_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        let compiled = CompiledCircuit::Bn254(R1csMatrices::<Fr> {
            num_instance_variables: 3,
            num_witness_variables: 1,
            num_constraints: 1,
            a: vec![vec![(Fr::from(1u64), 1)]],
            b: vec![vec![(Fr::from(1u64), 0)]],
            c: vec![vec![(Fr::from(1u64), 3)]],
        });
        store.save_compiled(&compiled).unwrap();
        assert_eq!(store.load_compiled().unwrap(), Some(compiled.clone()));

        store.compiled_circuit = None;
        store.save_compiled(&compiled).unwrap();
        assert_eq!(store.load_compiled().unwrap(), None);
    }
}
