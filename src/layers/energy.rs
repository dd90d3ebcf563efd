//! Energy to probability: `softmax(-x)`

use std::collections::BTreeMap;

use ndarray::ArrayD;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::ops::{flatten_2d, softmax_rows};
use super::{validate_dims, Activation, LayerKind, LayerShapes, ParamStore};
use crate::error::ChordError;

/// Parameter-free layer turning energies (distances) into a distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPdfArgs {
    /// Unique layer name
    pub name: String,
    /// Number of energies per observation
    pub input_dim: usize,
}

impl LayerKind for EnergyPdfArgs {
    fn type_name(&self) -> &'static str {
        "EnergyPDF"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn activation(&self) -> Activation {
        Activation::Linear
    }

    fn infer_shapes(&self) -> Result<LayerShapes, ChordError> {
        validate_dims("Input dimension", &[self.input_dim])?;
        Ok(LayerShapes {
            input: vec![self.input_dim],
            output: vec![self.input_dim],
            params: BTreeMap::new(),
        })
    }

    fn init_params(
        &self,
        _shapes: &LayerShapes,
        _rng: &mut StdRng,
    ) -> Result<BTreeMap<String, ArrayD<f32>>, ChordError> {
        Ok(BTreeMap::new())
    }

    fn forward(
        &self,
        x: &ArrayD<f32>,
        _params: &ParamStore,
        _dropout: Option<f32>,
        _rng: &mut StdRng,
    ) -> Result<ArrayD<f32>, ChordError> {
        let negated = flatten_2d(x)?.mapv(|v| -v);
        Ok(softmax_rows(negated.view()).into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Layer, LayerSpec};
    use ndarray::arr2;
    use rand::SeedableRng;

    #[test]
    fn test_energy_pdf_prefers_low_energy() {
        let layer = Layer::new(
            LayerSpec::EnergyPdf(EnergyPdfArgs {
                name: "pdf".to_string(),
                input_dim: 3,
            }),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        assert!(layer.param_values().is_empty());
        assert!(layer.params().is_initialized());

        let x = arr2(&[[0.0f32, 1.0, 5.0]]).into_dyn();
        let p = layer
            .forward(&x, Some(0.9), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(p[[0, 0]] > p[[0, 1]] && p[[0, 1]] > p[[0, 2]]);
        let total: f32 = p.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        let expected = 1.0 / (1.0 + (-1.0f32).exp() + (-5.0f32).exp());
        assert!((p[[0, 0]] - expected).abs() < 1e-6);
    }
}
