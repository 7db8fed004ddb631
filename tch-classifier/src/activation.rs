use crate::common::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    LeakyRelu,
}

impl nn::Module for Activation {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match *self {
            Activation::Linear => xs.shallow_clone(),
            Activation::Relu => xs.relu(),
            Activation::LeakyRelu => xs.maximum(&(xs * 0.01)),
        }
    }
}

pub trait TensorActivationExt {
    fn activation(&self, act: Activation) -> Tensor;
}

impl TensorActivationExt for Tensor {
    fn activation(&self, act: Activation) -> Tensor {
        nn::Module::forward(&act, self)
    }
}
