//! Convolution with max pooling over `(maps, rows, cols)` inputs

use std::collections::BTreeMap;

use ndarray::{ArrayD, Axis, Ix4};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::ops::{as_4d, conv2d, dropout_mask, max_pool2d, BorderMode};
use super::{
    normal_tensor, param_1d, validate_dims, Activation, LayerExtras, LayerKind, LayerShapes,
    ParamStore, BIAS, WEIGHTS,
};
use crate::error::ChordError;

fn unit_pool() -> (usize, usize) {
    (1, 1)
}

/// Convolution layer arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv3DArgs {
    /// Unique layer name
    pub name: String,
    /// Input shape as (in_maps, rows, cols)
    pub input_shape: Vec<usize>,
    /// Kernel shape as (num_kernels, k_rows, k_cols); a 4-element
    /// (num_kernels, in_maps, k_rows, k_cols) shape is also accepted
    pub weight_shape: Vec<usize>,
    /// Max-pool window over (rows, cols)
    #[serde(default = "unit_pool")]
    pub pool_shape: (usize, usize),
    /// Downsampling factors, recorded in the descriptor only
    #[serde(default = "unit_pool")]
    pub downsample_shape: (usize, usize),
    /// Activation (default: tanh)
    #[serde(default = "super::default_tanh")]
    pub activation: Activation,
    /// Border handling (default: valid)
    #[serde(default)]
    pub border_mode: BorderMode,
}

impl Conv3DArgs {
    /// Full kernel shape `(num_kernels, in_maps, k_rows, k_cols)`
    ///
    /// The map count of a 3-element kernel shape is filled in from the input.
    pub fn kernel_shape(&self) -> Result<Vec<usize>, ChordError> {
        if self.input_shape.len() != 3 {
            return Err(ChordError::InvalidParameter(format!(
                "{}: input shape {:?} must be (maps, rows, cols)",
                self.name, self.input_shape
            )));
        }
        let in_maps = self.input_shape[0];
        let mut w = self.weight_shape.clone();
        match w.len() {
            3 => w.insert(1, in_maps),
            4 if w[1] == in_maps => {}
            4 => {
                return Err(ChordError::InvalidParameter(format!(
                    "{}: kernel expects {} input maps, input has {}",
                    self.name, w[1], in_maps
                )))
            }
            _ => {
                return Err(ChordError::InvalidParameter(format!(
                    "{}: weight shape {:?} must have 3 or 4 dimensions",
                    self.name, self.weight_shape
                )))
            }
        }
        Ok(w)
    }
}

impl LayerKind for Conv3DArgs {
    fn type_name(&self) -> &'static str {
        "Conv3D"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    /// Output is `(num_kernels, conv(rows) / pool_rows, conv(cols) / pool_cols)`
    /// where `conv(d)` is `d - k + 1` in valid mode and `d + k - 1` in full mode
    fn infer_shapes(&self) -> Result<LayerShapes, ChordError> {
        let w = self.kernel_shape()?;
        validate_dims("Input shape", &self.input_shape)?;
        validate_dims("Weight shape", &w)?;
        validate_dims("Pool shape", &[self.pool_shape.0, self.pool_shape.1])?;
        validate_dims(
            "Downsample shape",
            &[self.downsample_shape.0, self.downsample_shape.1],
        )?;

        let rows = self.border_mode.conv_len(self.input_shape[1], w[2])? / self.pool_shape.0;
        let cols = self.border_mode.conv_len(self.input_shape[2], w[3])? / self.pool_shape.1;
        if rows == 0 || cols == 0 {
            return Err(ChordError::InvalidParameter(format!(
                "{}: pooling {:?} leaves an empty output",
                self.name, self.pool_shape
            )));
        }

        Ok(LayerShapes {
            input: self.input_shape.clone(),
            output: vec![w[0], rows, cols],
            params: BTreeMap::from([
                (BIAS.to_string(), vec![w[0]]),
                (WEIGHTS.to_string(), w),
            ]),
        })
    }

    /// Normal weights scaled by `sqrt(3 / fan_in)`, times 4 for sigmoid; zero bias
    fn init_params(
        &self,
        shapes: &LayerShapes,
        rng: &mut StdRng,
    ) -> Result<BTreeMap<String, ArrayD<f32>>, ChordError> {
        let w_shape = &shapes.params[WEIGHTS];
        let fan_in: usize = w_shape[1..].iter().product();
        let mut weights = normal_tensor(w_shape, (3.0 / fan_in as f32).sqrt(), rng)?;
        if self.activation == Activation::Sigmoid {
            weights *= 4.0;
        }
        Ok(BTreeMap::from([
            (WEIGHTS.to_string(), weights),
            (BIAS.to_string(), ArrayD::zeros(shapes.params[BIAS].as_slice())),
        ]))
    }

    fn forward(
        &self,
        x: &ArrayD<f32>,
        params: &ParamStore,
        dropout: Option<f32>,
        rng: &mut StdRng,
    ) -> Result<ArrayD<f32>, ChordError> {
        let weights = params.value(WEIGHTS)?.view().into_dimensionality::<Ix4>()?;
        let bias = param_1d(params, BIAS)?;

        let mut z = conv2d(as_4d(x)?, weights, self.border_mode)?;
        let per_map = |v: ndarray::Array1<f32>| {
            v.insert_axis(Axis(1)).insert_axis(Axis(2)).insert_axis(Axis(0))
        };
        z += &per_map(bias);
        self.activation.apply_inplace(&mut z);
        if let Some(rate) = dropout {
            z *= &per_map(dropout_mask(z.dim().1, rate, rng)?);
        }
        Ok(max_pool2d(&z, self.pool_shape)?.into_dyn())
    }

    fn flattens_input(&self) -> bool {
        false
    }

    fn extras(&self) -> LayerExtras {
        LayerExtras {
            pool: Some(self.pool_shape),
            downsample: Some(self.downsample_shape),
            border_mode: Some(self.border_mode),
            lp_norm: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Layer, LayerKey, LayerSpec, ParamTable};
    use ndarray::{Array4, IxDyn};
    use rand::SeedableRng;

    fn args(input_shape: Vec<usize>, weight_shape: Vec<usize>) -> Conv3DArgs {
        Conv3DArgs {
            name: "conv".to_string(),
            input_shape,
            weight_shape,
            pool_shape: (1, 1),
            downsample_shape: (1, 1),
            activation: Activation::Linear,
            border_mode: BorderMode::Valid,
        }
    }

    #[test]
    fn test_conv_shape_inference_with_pooling() {
        let mut conv = args(vec![1, 10, 10], vec![4, 3, 3]);
        conv.pool_shape = (2, 2);
        let shapes = conv.infer_shapes().unwrap();
        assert_eq!(shapes.output, vec![4, 4, 4]);
        assert_eq!(shapes.params[WEIGHTS], vec![4, 1, 3, 3]);
        assert_eq!(shapes.params[BIAS], vec![4]);
    }

    #[test]
    fn test_conv_shape_floor_and_full_mode() {
        let mut conv = args(vec![2, 11, 9], vec![3, 2, 4, 2]);
        conv.pool_shape = (3, 2);
        // (11 - 4 + 1) / 3 = 2, (9 - 2 + 1) / 2 = 4
        assert_eq!(conv.infer_shapes().unwrap().output, vec![3, 2, 4]);

        conv.border_mode = BorderMode::Full;
        // (11 + 4 - 1) / 3 = 4, (9 + 2 - 1) / 2 = 5
        assert_eq!(conv.infer_shapes().unwrap().output, vec![3, 4, 5]);
    }

    #[test]
    fn test_conv_kernel_map_mismatch() {
        let conv = args(vec![2, 8, 8], vec![3, 5, 2, 2]);
        assert!(matches!(
            conv.infer_shapes(),
            Err(ChordError::InvalidParameter(_))
        ));
        assert!(args(vec![8, 8], vec![3, 2, 2]).infer_shapes().is_err());
        assert!(args(vec![1, 2, 2], vec![3, 3, 3]).infer_shapes().is_err());
    }

    #[test]
    fn test_conv_init_scale_sigmoid() {
        let mut conv = args(vec![2, 12, 12], vec![64, 5, 5]);
        let linear = Layer::new(LayerSpec::Conv3D(conv.clone()), &mut StdRng::seed_from_u64(9))
            .unwrap();
        conv.activation = Activation::Sigmoid;
        let sigmoid = Layer::new(LayerSpec::Conv3D(conv), &mut StdRng::seed_from_u64(9)).unwrap();

        let w = linear.params().value(WEIGHTS).unwrap();
        let std = (w.mapv(|v| v * v).sum() / w.len() as f32).sqrt();
        let expected = (3.0f32 / 50.0).sqrt();
        assert!((std - expected).abs() / expected < 0.05);

        let ws = sigmoid.params().value(WEIGHTS).unwrap();
        assert_eq!(ws, &w.mapv(|v| v * 4.0));
    }

    #[test]
    fn test_conv_forward_with_bias_and_pool() {
        let mut conv = args(vec![1, 4, 4], vec![2, 2, 2]);
        conv.pool_shape = (3, 3);
        let mut layer = Layer::declare(LayerSpec::Conv3D(conv)).unwrap();

        let mut values = ParamTable::new();
        values.insert(
            LayerKey::new("conv", WEIGHTS),
            ArrayD::from_elem(IxDyn(&[2, 1, 2, 2]), 1.0),
        );
        values.insert(
            LayerKey::new("conv", BIAS),
            ArrayD::from_shape_vec(IxDyn(&[2]), vec![0.0, -100.0]).unwrap(),
        );
        layer.set_param_values(&values).unwrap();

        let x = Array4::from_shape_fn((1, 1, 4, 4), |(_, _, i, j)| (i * 4 + j) as f32).into_dyn();
        let z = layer
            .forward(&x, None, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(z.shape(), &[1, 2, 1, 1]);
        // Window sums over the top-left 3x3 conv outputs; the largest is at (2, 2)
        let best = 10.0 + 11.0 + 14.0 + 15.0;
        assert_eq!(z[[0, 0, 0, 0]], best);
        assert_eq!(z[[0, 1, 0, 0]], best - 100.0);
    }

    #[test]
    fn test_conv_dropout_is_per_map() {
        let conv = args(vec![1, 3, 3], vec![8, 1, 1]);
        let mut layer = Layer::declare(LayerSpec::Conv3D(conv)).unwrap();
        let mut values = ParamTable::new();
        values.insert(
            LayerKey::new("conv", WEIGHTS),
            ArrayD::from_elem(IxDyn(&[8, 1, 1, 1]), 1.0),
        );
        values.insert(LayerKey::new("conv", BIAS), ArrayD::zeros(IxDyn(&[8])));
        layer.set_param_values(&values).unwrap();

        let x = ArrayD::from_elem(IxDyn(&[2, 1, 3, 3]), 1.0f32);
        let z = layer
            .forward(&x, Some(0.5), &mut StdRng::seed_from_u64(4))
            .unwrap();
        for m in 0..8 {
            let first = z[[0, m, 0, 0]];
            assert!(first == 0.0 || first == 1.0);
            assert!(z
                .index_axis(Axis(1), m)
                .iter()
                .all(|&v| v == first));
        }
    }
}
