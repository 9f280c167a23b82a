// ============================================================
// Layer 2 — Tensor Demo
// ============================================================
// Allocates three (2, 3) tensors with different initialisers
// and reports what each one looks like: values, shape,
// element type and the device it lives on.

use anyhow::{anyhow, Result};
use burn::{prelude::*, tensor::Distribution};

pub const DEMO_SHAPE: [usize; 2] = [2, 3];

/// Everything printed for one tensor
#[derive(Debug, Clone)]
pub struct TensorReport {
    pub name:   &'static str,
    pub shape:  Vec<usize>,
    pub dtype:  String,
    pub device: String,
    pub values: Vec<f32>,
    pub pretty: String,
}

impl TensorReport {
    fn of<B: Backend>(name: &'static str, tensor: Tensor<B, 2>) -> Result<Self> {
        let pretty = format!("{tensor}");
        let values = tensor
            .to_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read values of '{name}': {e:?}"))?;

        Ok(Self {
            name,
            shape:  tensor.dims().to_vec(),
            dtype:  format!("{:?}", tensor.dtype()),
            device: format!("{:?}", tensor.device()),
            values,
            pretty,
        })
    }
}

/// Build the uniform-random, ones and zeros tensors on `device`
pub fn build<B: Backend>(device: &B::Device) -> Result<Vec<TensorReport>> {
    let rand  = Tensor::<B, 2>::random(DEMO_SHAPE, Distribution::Uniform(0.0, 1.0), device);
    let ones  = Tensor::<B, 2>::ones(DEMO_SHAPE, device);
    let zeros = Tensor::<B, 2>::zeros(DEMO_SHAPE, device);

    Ok(vec![
        TensorReport::of("Random Tensor", rand)?,
        TensorReport::of("Ones Tensor", ones)?,
        TensorReport::of("Zeros Tensor", zeros)?,
    ])
}

/// Print every report and return them
pub fn run<B: Backend>(device: &B::Device) -> Result<Vec<TensorReport>> {
    let reports = build::<B>(device)?;
    for r in &reports {
        println!("{}:\n{}\n", r.name, r.pretty);
    }

    // One tensor is enough for the attribute listing
    if let Some(first) = reports.first() {
        println!("Shape of tensor: {:?}", first.shape);
        println!("Datatype of tensor: {}", first.dtype);
        println!("Device tensor is stored on: {}", first.device);
    }
    tracing::info!("Tensor demo finished on {:?}", device);
    Ok(reports)
}
