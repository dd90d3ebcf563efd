//! Layer-qualified parameter keys and the per-layer parameter store
//!
//! A parameter slot moves through three states:
//! - declared: name and shape are known, no value yet
//! - initialized: the first assignment allocates the value
//! - mutated: later assignments overwrite the value in place
//!
//! Snapshots are [`ParamTable`]s keyed by [`LayerKey`], serialized as
//! `"layer/param"` strings so a whole-network table can be stored as one
//! JSON object.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::ChordError;

/// Name of a tensor owned by a layer: a parameter or an input/output slot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LayerKey {
    /// Owning layer
    pub layer: String,
    /// Name local to the layer
    pub name: String,
}

impl LayerKey {
    /// Key for `name` owned by `layer`
    pub fn new(layer: &str, name: &str) -> Self {
        Self {
            layer: layer.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.layer, self.name)
    }
}

impl FromStr for LayerKey {
    type Err = ChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('/') {
            Some((layer, name)) if !layer.is_empty() && !name.is_empty() => {
                Ok(LayerKey::new(layer, name))
            }
            _ => Err(ChordError::InvalidParameter(format!(
                "Expected 'layer/name', got '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for LayerKey {
    type Error = ChordError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LayerKey> for String {
    fn from(key: LayerKey) -> Self {
        key.to_string()
    }
}

/// Parameter values keyed by layer and parameter name
pub type ParamTable = BTreeMap<LayerKey, ArrayD<f32>>;

/// Named tensors flowing into or out of a layer
pub type TensorMap = BTreeMap<LayerKey, ArrayD<f32>>;

/// Read a parameter snapshot written with [`save_param_table`]
pub fn load_param_table(path: &Path) -> Result<ParamTable, ChordError> {
    if !path.exists() {
        return Err(ChordError::MissingInputFile(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Write a parameter snapshot as a JSON object
pub fn save_param_table(path: &Path, table: &ParamTable) -> Result<(), ChordError> {
    crate::io::write_json(path, table)
}

/// An initialized parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    key: LayerKey,
    value: ArrayD<f32>,
}

impl Parameter {
    /// Fully qualified name
    pub fn key(&self) -> &LayerKey {
        &self.key
    }

    /// Current value
    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }
}

/// Lifecycle state of one parameter
#[derive(Debug, Clone)]
pub enum ParamSlot {
    /// Declared with a shape, not yet assigned
    Declared {
        /// Shape the first assignment must have
        shape: Vec<usize>,
    },
    /// Holds a value
    Initialized(Parameter),
}

impl ParamSlot {
    /// Expected shape of the slot
    pub fn shape(&self) -> &[usize] {
        match self {
            ParamSlot::Declared { shape } => shape,
            ParamSlot::Initialized(param) => param.value.shape(),
        }
    }
}

/// Parameters of one layer
#[derive(Debug, Clone)]
pub struct ParamStore {
    layer: String,
    slots: BTreeMap<String, ParamSlot>,
}

impl ParamStore {
    /// Declare every parameter of `shapes` for `layer`, all unset
    pub fn declare(layer: &str, shapes: &BTreeMap<String, Vec<usize>>) -> Self {
        let slots = shapes
            .iter()
            .map(|(name, shape)| (name.clone(), ParamSlot::Declared { shape: shape.clone() }))
            .collect();
        Self {
            layer: layer.to_string(),
            slots,
        }
    }

    /// Owning layer name
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Slot for a local parameter name
    pub fn slot(&self, name: &str) -> Option<&ParamSlot> {
        self.slots.get(name)
    }

    /// Whether every declared parameter holds a value
    pub fn is_initialized(&self) -> bool {
        self.slots
            .values()
            .all(|slot| matches!(slot, ParamSlot::Initialized(_)))
    }

    /// Value of an initialized parameter
    ///
    /// # Errors
    ///
    /// `UndeclaredParameter` for an unknown name, `InvalidParameter` if the
    /// parameter has not been assigned yet
    pub fn value(&self, name: &str) -> Result<&ArrayD<f32>, ChordError> {
        match self.slots.get(name) {
            Some(ParamSlot::Initialized(param)) => Ok(&param.value),
            Some(ParamSlot::Declared { .. }) => Err(ChordError::InvalidParameter(format!(
                "Parameter {} is not initialized",
                LayerKey::new(&self.layer, name)
            ))),
            None => Err(ChordError::UndeclaredParameter(
                LayerKey::new(&self.layer, name).to_string(),
            )),
        }
    }

    /// Values of every initialized parameter, keyed by qualified name
    pub fn param_values(&self) -> ParamTable {
        self.slots
            .values()
            .filter_map(|slot| match slot {
                ParamSlot::Initialized(param) => Some((param.key.clone(), param.value.clone())),
                ParamSlot::Declared { .. } => None,
            })
            .collect()
    }

    /// Assign values to this layer's parameters
    ///
    /// Entries owned by other layers are ignored. The first assignment of a
    /// parameter initializes it; later ones overwrite the existing storage.
    /// Every entry is checked before any is applied.
    ///
    /// # Errors
    ///
    /// - `UndeclaredParameter` if a name of this layer was never declared
    /// - `ShapeMismatch` if a value's shape differs from the declared one
    pub fn set_param_values(&mut self, values: &ParamTable) -> Result<(), ChordError> {
        let owned: Vec<(&LayerKey, &ArrayD<f32>)> =
            values.iter().filter(|(key, _)| key.layer == self.layer).collect();

        for (key, value) in &owned {
            let slot = self
                .slots
                .get(&key.name)
                .ok_or_else(|| ChordError::UndeclaredParameter(key.to_string()))?;
            if slot.shape() != value.shape() {
                return Err(ChordError::ShapeMismatch(format!(
                    "{}: expected {:?}, got {:?}",
                    key,
                    slot.shape(),
                    value.shape()
                )));
            }
        }

        for (key, value) in owned {
            let Some(slot) = self.slots.get_mut(&key.name) else {
                continue;
            };
            match slot {
                ParamSlot::Initialized(param) => param.value.assign(value),
                ParamSlot::Declared { .. } => {
                    log::debug!("Initializing {} with shape {:?}", key, value.shape());
                    *slot = ParamSlot::Initialized(Parameter {
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn store() -> ParamStore {
        let mut shapes = BTreeMap::new();
        shapes.insert("weights".to_string(), vec![2, 3]);
        shapes.insert("bias".to_string(), vec![3]);
        ParamStore::declare("affine0", &shapes)
    }

    fn table(entries: &[(&str, &[usize], f32)]) -> ParamTable {
        entries
            .iter()
            .map(|(key, shape, fill)| {
                (key.parse().unwrap(), ArrayD::from_elem(IxDyn(shape), *fill))
            })
            .collect()
    }

    #[test]
    fn test_layer_key_round_trip() {
        let key: LayerKey = "conv/0/weights".parse().unwrap();
        assert_eq!(key.layer, "conv/0");
        assert_eq!(key.name, "weights");
        assert_eq!(key.to_string(), "conv/0/weights");
        assert!("weights".parse::<LayerKey>().is_err());
        assert!("/weights".parse::<LayerKey>().is_err());
    }

    #[test]
    fn test_declared_then_initialized() {
        let mut params = store();
        assert!(!params.is_initialized());
        assert!(matches!(
            params.value("bias"),
            Err(ChordError::InvalidParameter(_))
        ));
        assert!(params.param_values().is_empty());

        params
            .set_param_values(&table(&[("affine0/weights", &[2, 3], 0.5), ("affine0/bias", &[3], 0.0)]))
            .unwrap();
        assert!(params.is_initialized());
        assert_eq!(params.value("weights").unwrap()[[1, 2]], 0.5);
        assert_eq!(params.param_values().len(), 2);
    }

    #[test]
    fn test_reassignment_mutates_in_place() {
        let mut params = store();
        params
            .set_param_values(&table(&[("affine0/weights", &[2, 3], 1.0)]))
            .unwrap();
        let before = params.value("weights").unwrap().as_ptr();

        params
            .set_param_values(&table(&[("affine0/weights", &[2, 3], 2.0)]))
            .unwrap();
        let after = params.value("weights").unwrap();
        assert_eq!(after.as_ptr(), before);
        assert!(after.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_undeclared_parameter() {
        let mut params = store();
        let result = params.set_param_values(&table(&[("affine0/gamma", &[3], 1.0)]));
        assert!(matches!(result, Err(ChordError::UndeclaredParameter(_))));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut params = store();
        params
            .set_param_values(&table(&[("affine0/bias", &[3], 1.0)]))
            .unwrap();

        let result = params.set_param_values(&table(&[("affine0/bias", &[4], 1.0)]));
        assert!(matches!(result, Err(ChordError::ShapeMismatch(_))));
        // Failed update leaves the value untouched
        assert!(params.value("bias").unwrap().iter().all(|&v| v == 1.0));

        let first = store().set_param_values(&table(&[("affine0/weights", &[3, 2], 1.0)]));
        assert!(matches!(first, Err(ChordError::ShapeMismatch(_))));
    }

    #[test]
    fn test_other_layers_are_ignored() {
        let mut params = store();
        params
            .set_param_values(&table(&[
                ("affine0/bias", &[3], 1.0),
                ("affine1/gamma", &[7], 1.0),
                ("softmax/weights", &[9, 9], 1.0),
            ]))
            .unwrap();
        assert_eq!(params.param_values().len(), 1);
    }

    #[test]
    fn test_param_table_json() {
        let values = table(&[("affine0/bias", &[2], 0.25)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        save_param_table(&path, &values).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"affine0/bias\""));
        assert_eq!(load_param_table(&path).unwrap(), values);
        assert!(matches!(
            load_param_table(&dir.path().join("missing.json")),
            Err(ChordError::MissingInputFile(_))
        ));
    }
}
