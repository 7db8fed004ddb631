use crate::{
    activation::{Activation, TensorActivationExt as _},
    batch_norm::{BatchNorm2D, BatchNorm2DInit},
    common::*,
};

#[derive(Debug, Clone)]
pub struct ConvBn2DInit {
    pub in_c: i64,
    pub out_c: i64,
    pub k: i64,
    pub s: i64,
    pub p: i64,
    pub g: i64,
    pub bias: bool,
    pub activation: Activation,
    pub batch_norm: Option<BatchNorm2DInit>,
}

impl ConvBn2DInit {
    pub fn new(in_c: i64, out_c: i64, k: i64) -> Self {
        Self {
            in_c,
            out_c,
            k,
            s: 1,
            p: k / 2,
            g: 1,
            bias: false,
            activation: Activation::Relu,
            batch_norm: Some(Default::default()),
        }
    }

    pub fn stride(self, s: i64) -> Self {
        Self { s, ..self }
    }

    pub fn activation(self, activation: Activation) -> Self {
        Self { activation, ..self }
    }

    pub fn build<'p, P>(self, path: P) -> ConvBn2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            in_c,
            out_c,
            k,
            s,
            p,
            g,
            bias,
            activation,
            batch_norm,
        } = self;

        let conv = nn::conv2d(
            path / "conv",
            in_c,
            out_c,
            k,
            nn::ConvConfig {
                stride: s,
                padding: p,
                groups: g,
                bias,
                ..Default::default()
            },
        );
        let bn = batch_norm.map(|init| init.build(path / "bn", out_c));

        ConvBn2D {
            conv,
            bn,
            activation,
        }
    }
}

#[derive(Debug)]
pub struct ConvBn2D {
    conv: nn::Conv2D,
    bn: Option<BatchNorm2D>,
    activation: Activation,
}

impl nn::ModuleT for ConvBn2D {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let Self {
            ref conv,
            ref bn,
            activation,
        } = *self;

        let xs = xs.apply(conv);
        let xs = match bn {
            Some(bn) => bn.forward_t(&xs, train),
            None => xs,
        };
        xs.activation(activation)
    }
}

impl ConvBn2D {
    /// Folds the batch norm statistics into the convolution weights.
    ///
    /// Eval-mode outputs are preserved up to floating-point rounding.
    /// No-op when the module carries no batch norm.
    pub fn fuse_batch_norm(&mut self) {
        let bn = match self.bn.take() {
            Some(bn) => bn,
            None => return,
        };

        tch::no_grad(|| {
            let BatchNorm2D {
                running_mean,
                running_var,
                ws,
                bs,
                eps,
                ..
            } = bn;

            let std = (running_var + eps).sqrt();
            let gamma = ws.unwrap_or_else(|| Tensor::ones_like(&std));
            let beta = bs.unwrap_or_else(|| Tensor::zeros_like(&std));
            let scale = gamma / std;

            let bias = match &self.conv.bs {
                Some(bs) => bs.shallow_clone(),
                None => Tensor::zeros_like(&running_mean),
            };

            self.conv.ws = &self.conv.ws * scale.view([-1, 1, 1, 1]);
            self.conv.bs = Some(beta + (bias - running_mean) * scale);
        });
    }

    pub fn has_batch_norm(&self) -> bool {
        self.bn.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tch::{Device, Kind};

    #[test]
    fn batch_norm_fusion_preserves_eval_output() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let mut conv_bn = ConvBn2DInit::new(3, 8, 3).build(&root / "conv_bn");

        // Perturb the statistics so the fusion actually has work to do.
        tch::no_grad(|| {
            if let Some(bn) = &conv_bn.bn {
                let mut mean = bn.running_mean.shallow_clone();
                let mut var = bn.running_var.shallow_clone();
                let _ = mean.copy_(&(Tensor::rand(&[8], (Kind::Float, Device::Cpu)) - 0.5));
                let _ = var.copy_(&(Tensor::rand(&[8], (Kind::Float, Device::Cpu)) + 0.5));
            }
        });

        let input = Tensor::rand(&[2, 3, 16, 16], (Kind::Float, Device::Cpu));
        let before = conv_bn.forward_t(&input, false);

        conv_bn.fuse_batch_norm();
        assert!(!conv_bn.has_batch_norm());

        let after = conv_bn.forward_t(&input, false);
        let max_diff = f64::from((before - after).abs().max());
        assert_abs_diff_eq!(max_diff, 0.0, epsilon = 1e-5);
    }
}
