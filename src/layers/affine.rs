//! Fully connected layers: affine and softmax

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayD, Axis};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::ops::{flatten_2d, softmax_rows};
use super::{
    apply_dropout, normal_tensor, param_1d, param_2d, validate_dims, Activation, LayerKind,
    LayerShapes, ParamStore, BIAS, WEIGHTS,
};
use crate::error::ChordError;

/// Affine transform `act(x W + b)` over flattened inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffineArgs {
    /// Unique layer name
    pub name: String,
    /// Weight matrix shape as (n_in, n_out)
    pub weight_shape: (usize, usize),
    /// Activation (default: tanh)
    #[serde(default = "super::default_tanh")]
    pub activation: Activation,
}

/// Affine transform followed by a row softmax
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxArgs {
    /// Unique layer name
    pub name: String,
    /// Flattened input size
    pub input_dim: usize,
    /// Number of classes
    pub output_dim: usize,
    /// Activation applied before the softmax (default: linear)
    #[serde(default)]
    pub activation: Activation,
}

fn dense_shapes(n_in: usize, n_out: usize) -> Result<LayerShapes, ChordError> {
    validate_dims("Weight shape", &[n_in, n_out])?;
    Ok(LayerShapes {
        input: vec![n_in],
        output: vec![n_out],
        params: BTreeMap::from([
            (WEIGHTS.to_string(), vec![n_in, n_out]),
            (BIAS.to_string(), vec![n_out]),
        ]),
    })
}

/// Normal weights scaled by `sqrt(k / sum(weight_shape))`, zero bias
fn dense_init(
    shapes: &LayerShapes,
    k: f32,
    rng: &mut StdRng,
) -> Result<BTreeMap<String, ArrayD<f32>>, ChordError> {
    let w_shape = &shapes.params[WEIGHTS];
    let scale = (k / w_shape.iter().sum::<usize>() as f32).sqrt();
    Ok(BTreeMap::from([
        (WEIGHTS.to_string(), normal_tensor(w_shape, scale, rng)?),
        (BIAS.to_string(), ArrayD::zeros(shapes.params[BIAS].as_slice())),
    ]))
}

/// `act(flatten(x) W + b)`
pub(crate) fn dense_forward(
    x: &ArrayD<f32>,
    params: &ParamStore,
    activation: Activation,
) -> Result<Array2<f32>, ChordError> {
    let x = flatten_2d(x)?;
    let weights = param_2d(params, WEIGHTS)?;
    let bias = param_1d(params, BIAS)?;
    let mut z = x.dot(&weights) + &bias.insert_axis(Axis(0));
    activation.apply_inplace(&mut z);
    Ok(z)
}

impl LayerKind for AffineArgs {
    fn type_name(&self) -> &'static str {
        "Affine"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn infer_shapes(&self) -> Result<LayerShapes, ChordError> {
        dense_shapes(self.weight_shape.0, self.weight_shape.1)
    }

    fn init_params(
        &self,
        shapes: &LayerShapes,
        rng: &mut StdRng,
    ) -> Result<BTreeMap<String, ArrayD<f32>>, ChordError> {
        dense_init(shapes, 1.0, rng)
    }

    fn forward(
        &self,
        x: &ArrayD<f32>,
        params: &ParamStore,
        dropout: Option<f32>,
        rng: &mut StdRng,
    ) -> Result<ArrayD<f32>, ChordError> {
        let mut z = dense_forward(x, params, self.activation)?;
        apply_dropout(&mut z, dropout, rng)?;
        Ok(z.into_dyn())
    }
}

impl LayerKind for SoftmaxArgs {
    fn type_name(&self) -> &'static str {
        "Softmax"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn infer_shapes(&self) -> Result<LayerShapes, ChordError> {
        dense_shapes(self.input_dim, self.output_dim)
    }

    fn init_params(
        &self,
        shapes: &LayerShapes,
        rng: &mut StdRng,
    ) -> Result<BTreeMap<String, ArrayD<f32>>, ChordError> {
        dense_init(shapes, 6.0, rng)
    }

    fn forward(
        &self,
        x: &ArrayD<f32>,
        params: &ParamStore,
        _dropout: Option<f32>,
        _rng: &mut StdRng,
    ) -> Result<ArrayD<f32>, ChordError> {
        let z = dense_forward(x, params, self.activation)?;
        Ok(softmax_rows(z.view()).into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Layer, LayerKey, LayerSpec, ParamTable};
    use ndarray::{arr2, IxDyn};
    use rand::SeedableRng;

    fn affine(activation: Activation) -> Layer {
        let spec = LayerSpec::Affine(AffineArgs {
            name: "fc".to_string(),
            weight_shape: (2, 3),
            activation,
        });
        let mut layer = Layer::new(spec, &mut StdRng::seed_from_u64(0)).unwrap();
        let mut values = ParamTable::new();
        values.insert(
            LayerKey::new("fc", WEIGHTS),
            arr2(&[[1.0f32, 0.0, -1.0], [0.0, 2.0, 1.0]]).into_dyn(),
        );
        values.insert(
            LayerKey::new("fc", BIAS),
            ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.5f32, 0.0, 0.0]).unwrap(),
        );
        layer.set_param_values(&values).unwrap();
        layer
    }

    #[test]
    fn test_affine_forward() {
        let layer = affine(Activation::Relu);
        let x = arr2(&[[1.0f32, 1.0], [2.0, -1.0]]).into_dyn();
        let z = layer.forward(&x, None, &mut StdRng::seed_from_u64(1)).unwrap();
        // [1.5, 2, 0] and [2.5, -2, -3] before relu
        assert_eq!(z, arr2(&[[1.5f32, 2.0, 0.0], [2.5, 0.0, 0.0]]).into_dyn());
    }

    #[test]
    fn test_affine_dropout_scales_by_rate_plus_half() {
        let layer = affine(Activation::Linear);
        let x = arr2(&[[1.0f32, 1.0]]).into_dyn();
        let z = layer.forward(&x, Some(0.0), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(z, arr2(&[[0.75f32, 1.0, 0.0]]).into_dyn());
    }

    #[test]
    fn test_affine_init_scale() {
        let spec = LayerSpec::Affine(AffineArgs {
            name: "fc".to_string(),
            weight_shape: (150, 50),
            activation: Activation::Tanh,
        });
        let layer = Layer::new(spec, &mut StdRng::seed_from_u64(11)).unwrap();
        let w = layer.params().value(WEIGHTS).unwrap();
        let n = w.len() as f32;
        let mean = w.sum() / n;
        let std = (w.mapv(|v| (v - mean).powi(2)).sum() / n).sqrt();

        let expected = (1.0f32 / 200.0).sqrt();
        assert!(mean.abs() < 0.01);
        assert!((std - expected).abs() / expected < 0.05);
        assert!(layer.params().value(BIAS).unwrap().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_init_is_deterministic_per_seed() {
        let spec = LayerSpec::Softmax(SoftmaxArgs {
            name: "out".to_string(),
            input_dim: 8,
            output_dim: 4,
            activation: Activation::Linear,
        });
        let a = Layer::new(spec.clone(), &mut StdRng::seed_from_u64(5)).unwrap();
        let b = Layer::new(spec.clone(), &mut StdRng::seed_from_u64(5)).unwrap();
        let c = Layer::new(spec, &mut StdRng::seed_from_u64(6)).unwrap();
        assert_eq!(a.param_values(), b.param_values());
        assert_ne!(a.param_values(), c.param_values());
    }

    #[test]
    fn test_softmax_init_scale_and_output() {
        let spec = LayerSpec::Softmax(SoftmaxArgs {
            name: "out".to_string(),
            input_dim: 120,
            output_dim: 80,
            activation: Activation::Linear,
        });
        let layer = Layer::new(spec, &mut StdRng::seed_from_u64(2)).unwrap();
        let w = layer.params().value(WEIGHTS).unwrap();
        let n = w.len() as f32;
        let std = (w.mapv(|v| v * v).sum() / n).sqrt();
        let expected = (6.0f32 / 200.0).sqrt();
        assert!((std - expected).abs() / expected < 0.05);

        let x = ArrayD::from_elem(IxDyn(&[3, 120]), 0.1f32);
        let p = layer.forward(&x, Some(0.5), &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(p.shape(), &[3, 80]);
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_zero_sized_weights_rejected() {
        let spec = LayerSpec::Affine(AffineArgs {
            name: "fc".to_string(),
            weight_shape: (0, 3),
            activation: Activation::Tanh,
        });
        assert!(matches!(
            spec.descriptor(),
            Err(ChordError::InvalidParameter(_))
        ));
    }
}
