//! A chain of layers used as a classifier
//!
//! The primary output of each layer feeds the primary input of the next.
//! Between layers the batch is reshaped to the next layer's declared input
//! shape, so consecutive layers only need matching element counts.

use std::collections::BTreeSet;
use std::path::Path;

use ndarray::{Array2, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::ops::flatten_2d;
use super::params::load_param_table;
use super::{Layer, LayerDescriptor, LayerSpec, ParamTable};
use crate::error::ChordError;
use crate::selection::Predictor;

/// Network definition file: `{"layers": [<layer spec>, ...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    /// Layers in forward order
    pub layers: Vec<LayerSpec>,
}

impl NetworkDefinition {
    /// Load a definition file
    ///
    /// # Errors
    ///
    /// `MissingInputFile` if `path` does not exist; `Serialization` for malformed JSON
    pub fn load(path: &Path) -> Result<Self, ChordError> {
        if !path.exists() {
            return Err(ChordError::MissingInputFile(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Ordered chain of layers with a private generator for dropout masks
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    rng: StdRng,
}

fn num_elements(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl Network {
    /// Build and initialize every layer from one seeded generator
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if there are no layers, a name repeats, or a
    ///   layer's arguments are invalid
    /// - `ShapeMismatch` if a layer's output size differs from the next input size
    pub fn new(specs: Vec<LayerSpec>, seed: u64) -> Result<Self, ChordError> {
        if specs.is_empty() {
            return Err(ChordError::InvalidParameter(
                "A network needs at least one layer".to_string(),
            ));
        }

        let mut names = BTreeSet::new();
        for spec in &specs {
            if !names.insert(spec.name().to_string()) {
                return Err(ChordError::InvalidParameter(format!(
                    "Duplicate layer name '{}'",
                    spec.name()
                )));
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let layers = specs
            .into_iter()
            .map(|spec| Layer::new(spec, &mut rng))
            .collect::<Result<Vec<_>, _>>()?;

        for pair in layers.windows(2) {
            let (out, next) = (pair[0].output_shape(), pair[1].input_shape());
            if num_elements(out) != num_elements(next) {
                return Err(ChordError::ShapeMismatch(format!(
                    "{} outputs {:?}, {} expects {:?}",
                    pair[0].name(),
                    out,
                    pair[1].name(),
                    next
                )));
            }
        }

        log::debug!(
            "Network of {} layers: {:?} -> {:?}",
            layers.len(),
            layers[0].input_shape(),
            layers[layers.len() - 1].output_shape()
        );

        Ok(Self { layers, rng })
    }

    /// Build from a definition file
    pub fn from_definition_file(path: &Path, seed: u64) -> Result<Self, ChordError> {
        Self::new(NetworkDefinition::load(path)?.layers, seed)
    }

    /// Layers in forward order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Descriptors of every layer
    pub fn descriptors(&self) -> Vec<LayerDescriptor> {
        self.layers.iter().map(|l| l.descriptor().clone()).collect()
    }

    /// Input shape of the first layer, without the batch axis
    pub fn input_shape(&self) -> &[usize] {
        self.layers[0].input_shape()
    }

    /// Output shape of the last layer, without the batch axis
    pub fn output_shape(&self) -> &[usize] {
        self.layers[self.layers.len() - 1].output_shape()
    }

    /// Every parameter of every layer
    pub fn param_values(&self) -> ParamTable {
        self.layers.iter().flat_map(|l| l.param_values()).collect()
    }

    /// Assign a (partial) snapshot; each layer takes the entries it owns
    ///
    /// Entries naming no layer of this network are ignored.
    pub fn set_param_values(&mut self, values: &ParamTable) -> Result<(), ChordError> {
        for layer in &mut self.layers {
            layer.set_param_values(values)?;
        }
        let unmatched = values
            .keys()
            .filter(|key| !self.layers.iter().any(|l| l.name() == key.layer))
            .count();
        if unmatched > 0 {
            log::debug!("Ignored {} parameters of unknown layers", unmatched);
        }
        Ok(())
    }

    /// Run the batch through every layer
    ///
    /// `x` must hold `N` observations of the first layer's input size.
    pub fn forward(&mut self, x: &ArrayD<f32>, dropout: Option<f32>) -> Result<ArrayD<f32>, ChordError> {
        let Some(&batch) = x.shape().first() else {
            return Err(ChordError::ShapeMismatch("Input has no batch axis".to_string()));
        };

        let mut current = x.clone();
        for layer in &self.layers {
            let mut dims = vec![batch];
            dims.extend_from_slice(layer.input_shape());
            if current.len() != num_elements(&dims) {
                return Err(ChordError::ShapeMismatch(format!(
                    "{} expects {:?} per observation, got {:?}",
                    layer.name(),
                    layer.input_shape(),
                    &current.shape()[1..]
                )));
            }
            let shaped = current.to_shape(IxDyn(&dims))?.into_owned();
            current = layer.forward(&shaped, dropout, &mut self.rng)?;
        }
        Ok(current)
    }
}

impl Predictor for Network {
    fn load_snapshot(&mut self, path: &Path) -> Result<(), ChordError> {
        let values = load_param_table(path)?;
        self.set_param_values(&values)
    }

    fn posterior(&mut self, inputs: &ArrayD<f32>) -> Result<Array2<f32>, ChordError> {
        flatten_2d(&self.forward(inputs, None)?)
    }
}
