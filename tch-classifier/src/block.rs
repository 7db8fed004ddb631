use crate::{
    activation::Activation,
    common::*,
    conv_bn_2d::{ConvBn2D, ConvBn2DInit},
};

/// Two 3x3 conv-bn layers with an identity or projection shortcut.
#[derive(Debug, Clone)]
pub struct BasicBlockInit {
    pub in_c: i64,
    pub out_c: i64,
    pub s: i64,
}

impl BasicBlockInit {
    pub fn build<'p, P>(self, path: P) -> BasicBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self { in_c, out_c, s } = self;

        let conv1 = ConvBn2DInit::new(in_c, out_c, 3).stride(s).build(path / "conv1");
        let conv2 = ConvBn2DInit::new(out_c, out_c, 3)
            .activation(Activation::Linear)
            .build(path / "conv2");
        let shortcut = (in_c != out_c || s != 1).then(|| {
            ConvBn2DInit::new(in_c, out_c, 1)
                .stride(s)
                .activation(Activation::Linear)
                .build(path / "shortcut")
        });

        BasicBlock {
            conv1,
            conv2,
            shortcut,
        }
    }
}

#[derive(Debug)]
pub struct BasicBlock {
    conv1: ConvBn2D,
    conv2: ConvBn2D,
    shortcut: Option<ConvBn2D>,
}

impl nn::ModuleT for BasicBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let residual = match &self.shortcut {
            Some(shortcut) => shortcut.forward_t(xs, train),
            None => xs.shallow_clone(),
        };
        let xs = self.conv1.forward_t(xs, train);
        let xs = self.conv2.forward_t(&xs, train);
        (xs + residual).relu()
    }
}

impl BasicBlock {
    pub fn fuse_batch_norm(&mut self) {
        self.conv1.fuse_batch_norm();
        self.conv2.fuse_batch_norm();
        if let Some(shortcut) = &mut self.shortcut {
            shortcut.fuse_batch_norm();
        }
    }
}

/// 1x1 reduce, 3x3, 1x1 expand, with an identity or projection shortcut.
#[derive(Debug, Clone)]
pub struct BottleneckInit {
    pub in_c: i64,
    pub out_c: i64,
    pub s: i64,
}

impl BottleneckInit {
    pub fn build<'p, P>(self, path: P) -> Bottleneck
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self { in_c, out_c, s } = self;
        let mid_c = out_c / 4;

        let conv1 = ConvBn2DInit::new(in_c, mid_c, 1).build(path / "conv1");
        let conv2 = ConvBn2DInit::new(mid_c, mid_c, 3).stride(s).build(path / "conv2");
        let conv3 = ConvBn2DInit::new(mid_c, out_c, 1)
            .activation(Activation::Linear)
            .build(path / "conv3");
        let shortcut = (in_c != out_c || s != 1).then(|| {
            ConvBn2DInit::new(in_c, out_c, 1)
                .stride(s)
                .activation(Activation::Linear)
                .build(path / "shortcut")
        });

        Bottleneck {
            conv1,
            conv2,
            conv3,
            shortcut,
        }
    }
}

#[derive(Debug)]
pub struct Bottleneck {
    conv1: ConvBn2D,
    conv2: ConvBn2D,
    conv3: ConvBn2D,
    shortcut: Option<ConvBn2D>,
}

impl nn::ModuleT for Bottleneck {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let residual = match &self.shortcut {
            Some(shortcut) => shortcut.forward_t(xs, train),
            None => xs.shallow_clone(),
        };
        let xs = self.conv1.forward_t(xs, train);
        let xs = self.conv2.forward_t(&xs, train);
        let xs = self.conv3.forward_t(&xs, train);
        (xs + residual).relu()
    }
}

impl Bottleneck {
    pub fn fuse_batch_norm(&mut self) {
        self.conv1.fuse_batch_norm();
        self.conv2.fuse_batch_norm();
        self.conv3.fuse_batch_norm();
        if let Some(shortcut) = &mut self.shortcut {
            shortcut.fuse_batch_norm();
        }
    }
}
