//! Radial basis function (distance) layer

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayD};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::ops::flatten_2d;
use super::{
    apply_dropout, normal_tensor, param_2d, validate_dims, Activation, LayerExtras, LayerKind,
    LayerShapes, ParamStore, WEIGHTS,
};
use crate::error::ChordError;

/// Distance between an input and each template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpNorm {
    /// Sum of absolute differences
    #[default]
    L1,
    /// Sum of squared differences
    L2,
}

/// RBF layer arguments; the layer has weights but no bias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbfArgs {
    /// Unique layer name
    pub name: String,
    /// Flattened input size
    pub input_dim: usize,
    /// Number of templates
    pub output_dim: usize,
    /// Distance (default: l1)
    #[serde(default)]
    pub lp_norm: LpNorm,
    /// Activation (default: linear)
    #[serde(default)]
    pub activation: Activation,
}

impl LayerKind for RbfArgs {
    fn type_name(&self) -> &'static str {
        "RBF"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn infer_shapes(&self) -> Result<LayerShapes, ChordError> {
        validate_dims("Weight shape", &[self.input_dim, self.output_dim])?;
        Ok(LayerShapes {
            input: vec![self.input_dim],
            output: vec![self.output_dim],
            params: BTreeMap::from([(
                WEIGHTS.to_string(),
                vec![self.input_dim, self.output_dim],
            )]),
        })
    }

    fn init_params(
        &self,
        shapes: &LayerShapes,
        rng: &mut StdRng,
    ) -> Result<BTreeMap<String, ArrayD<f32>>, ChordError> {
        let w_shape = &shapes.params[WEIGHTS];
        let scale = (1.0 / w_shape.iter().sum::<usize>() as f32).sqrt();
        Ok(BTreeMap::from([(
            WEIGHTS.to_string(),
            normal_tensor(w_shape, scale, rng)?,
        )]))
    }

    /// `z[n, o] = sum_i d(x[n, i], w[i, o])`
    fn forward(
        &self,
        x: &ArrayD<f32>,
        params: &ParamStore,
        dropout: Option<f32>,
        rng: &mut StdRng,
    ) -> Result<ArrayD<f32>, ChordError> {
        let x = flatten_2d(x)?;
        let weights = param_2d(params, WEIGHTS)?;
        let distance: fn(f32) -> f32 = match self.lp_norm {
            LpNorm::L1 => |d: f32| d.abs(),
            LpNorm::L2 => |d: f32| d * d,
        };

        let mut z = Array2::<f32>::zeros((x.nrows(), weights.ncols()));
        for ((n, o), v) in z.indexed_iter_mut() {
            *v = x
                .row(n)
                .iter()
                .zip(weights.column(o))
                .map(|(a, b)| distance(a - b))
                .sum();
        }
        self.activation.apply_inplace(&mut z);
        apply_dropout(&mut z, dropout, rng)?;
        Ok(z.into_dyn())
    }

    fn extras(&self) -> LayerExtras {
        LayerExtras {
            lp_norm: Some(self.lp_norm),
            ..LayerExtras::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Layer, LayerKey, LayerSpec, ParamTable, BIAS};
    use ndarray::arr2;
    use rand::SeedableRng;

    fn layer(lp_norm: LpNorm) -> Layer {
        let mut layer = Layer::declare(LayerSpec::Rbf(RbfArgs {
            name: "rbf".to_string(),
            input_dim: 2,
            output_dim: 2,
            lp_norm,
            activation: Activation::Linear,
        }))
        .unwrap();
        let mut values = ParamTable::new();
        // Templates are the columns: (0, 0) and (1, 2)
        values.insert(
            LayerKey::new("rbf", WEIGHTS),
            arr2(&[[0.0f32, 1.0], [0.0, 2.0]]).into_dyn(),
        );
        layer.set_param_values(&values).unwrap();
        layer
    }

    #[test]
    fn test_rbf_has_no_bias() {
        let layer = Layer::new(
            LayerSpec::Rbf(RbfArgs {
                name: "rbf".to_string(),
                input_dim: 3,
                output_dim: 4,
                lp_norm: LpNorm::L1,
                activation: Activation::Linear,
            }),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        assert!(layer.params().slot(BIAS).is_none());
        assert_eq!(layer.param_values().len(), 1);
        assert_eq!(layer.descriptor().extras.lp_norm, Some(LpNorm::L1));
    }

    #[test]
    fn test_rbf_distances() {
        let x = arr2(&[[1.0f32, 1.0]]).into_dyn();
        let mut rng = StdRng::seed_from_u64(0);

        let l1 = layer(LpNorm::L1).forward(&x, None, &mut rng).unwrap();
        assert_eq!(l1, arr2(&[[2.0f32, 1.0]]).into_dyn());

        let l2 = layer(LpNorm::L2).forward(&x, None, &mut rng).unwrap();
        assert_eq!(l2, arr2(&[[2.0f32, 1.0]]).into_dyn());

        let far = arr2(&[[3.0f32, 0.0]]).into_dyn();
        let l2 = layer(LpNorm::L2).forward(&far, None, &mut rng).unwrap();
        assert_eq!(l2, arr2(&[[9.0f32, 8.0]]).into_dyn());
    }

    #[test]
    fn test_lp_norm_json() {
        let args: RbfArgs =
            serde_json::from_str(r#"{"name": "r", "input_dim": 2, "output_dim": 3}"#).unwrap();
        assert_eq!(args.lp_norm, LpNorm::L1);
        assert!(serde_json::from_str::<RbfArgs>(
            r#"{"name": "r", "input_dim": 2, "output_dim": 3, "lp_norm": "l3"}"#
        )
        .is_err());
    }
}
