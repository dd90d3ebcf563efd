//! Several independent softmax classifiers over one flattened input

use std::collections::BTreeMap;

use ndarray::{s, Array3, ArrayD, Axis, Ix2, Ix3};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::ops::{flatten_2d, softmax_rows};
use super::{
    normal_tensor, validate_dims, Activation, LayerKind, LayerShapes, ParamStore, BIAS, WEIGHTS,
};
use crate::error::ChordError;

/// Multi-softmax layer arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSoftmaxArgs {
    /// Unique layer name
    pub name: String,
    /// Input shape; flattened before the transform
    pub input_shape: Vec<usize>,
    /// Output shape as (n_softmaxes, output_dim)
    pub output_shape: (usize, usize),
    /// Activation applied before each softmax (default: linear)
    #[serde(default)]
    pub activation: Activation,
}

impl LayerKind for MultiSoftmaxArgs {
    fn type_name(&self) -> &'static str {
        "MultiSoftmax"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn infer_shapes(&self) -> Result<LayerShapes, ChordError> {
        validate_dims("Input shape", &self.input_shape)?;
        let (n_softmax, out_dim) = self.output_shape;
        validate_dims("Output shape", &[n_softmax, out_dim])?;
        let n_in: usize = self.input_shape.iter().product();
        Ok(LayerShapes {
            input: vec![n_in],
            output: vec![n_softmax, out_dim],
            params: BTreeMap::from([
                (WEIGHTS.to_string(), vec![n_softmax, n_in, out_dim]),
                (BIAS.to_string(), vec![n_softmax, out_dim]),
            ]),
        })
    }

    fn init_params(
        &self,
        shapes: &LayerShapes,
        rng: &mut StdRng,
    ) -> Result<BTreeMap<String, ArrayD<f32>>, ChordError> {
        let w_shape = &shapes.params[WEIGHTS];
        let scale = (1.0 / w_shape.iter().sum::<usize>() as f32).sqrt();
        Ok(BTreeMap::from([
            (WEIGHTS.to_string(), normal_tensor(w_shape, scale, rng)?),
            (BIAS.to_string(), ArrayD::zeros(shapes.params[BIAS].as_slice())),
        ]))
    }

    /// Output is `(N, n_softmaxes, output_dim)`, each row summing to one
    fn forward(
        &self,
        x: &ArrayD<f32>,
        params: &ParamStore,
        _dropout: Option<f32>,
        _rng: &mut StdRng,
    ) -> Result<ArrayD<f32>, ChordError> {
        let x = flatten_2d(x)?;
        let weights = params.value(WEIGHTS)?.view().into_dimensionality::<Ix3>()?;
        let bias = params.value(BIAS)?.view().into_dimensionality::<Ix2>()?;

        let (n_softmax, _, out_dim) = weights.dim();
        let mut out = Array3::<f32>::zeros((x.nrows(), n_softmax, out_dim));
        for i in 0..n_softmax {
            let mut z = x.dot(&weights.index_axis(Axis(0), i)) + &bias.slice(s![i..i + 1, ..]);
            self.activation.apply_inplace(&mut z);
            out.slice_mut(s![.., i, ..]).assign(&softmax_rows(z.view()));
        }
        Ok(out.into_dyn())
    }
}
