use crate::common::*;

#[derive(Debug, Clone)]
pub struct BatchNorm2DInit {
    pub cudnn_enabled: bool,
    pub eps: R64,
    pub momentum: R64,
    pub ws_init: Option<nn::Init>,
    pub bs_init: Option<nn::Init>,
}

impl Default for BatchNorm2DInit {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            eps: r64(1e-5),
            momentum: r64(0.1),
            ws_init: Some(nn::Init::Const(1.0)),
            bs_init: Some(nn::Init::Const(0.0)),
        }
    }
}

impl BatchNorm2DInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, out_dim: i64) -> BatchNorm2D {
        let path = path.borrow();
        let Self {
            cudnn_enabled,
            eps,
            momentum,
            ws_init,
            bs_init,
        } = self;

        let ws = ws_init.map(|init| path.var("weight", &[out_dim], init));
        let bs = bs_init.map(|init| path.var("bias", &[out_dim], init));

        BatchNorm2D {
            running_mean: path.zeros_no_train("running_mean", &[out_dim]),
            running_var: path.ones_no_train("running_var", &[out_dim]),
            ws,
            bs,
            cudnn_enabled,
            eps: eps.raw(),
            momentum: momentum.raw(),
        }
    }
}

#[derive(Debug)]
pub struct BatchNorm2D {
    pub(crate) running_mean: Tensor,
    pub(crate) running_var: Tensor,
    pub(crate) ws: Option<Tensor>,
    pub(crate) bs: Option<Tensor>,
    pub(crate) eps: f64,
    cudnn_enabled: bool,
    momentum: f64,
}

impl nn::ModuleT for BatchNorm2D {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let Self {
            ref running_mean,
            ref running_var,
            ref ws,
            ref bs,
            momentum,
            eps,
            cudnn_enabled,
        } = *self;

        Tensor::batch_norm(
            input,
            ws.as_ref(),
            bs.as_ref(),
            Some(running_mean),
            Some(running_var),
            train,
            momentum,
            eps,
            cudnn_enabled,
        )
    }
}
