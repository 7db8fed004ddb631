use crate::{
    block::{BasicBlock, BasicBlockInit, Bottleneck, BottleneckInit},
    common::*,
    conv_bn_2d::{ConvBn2D, ConvBn2DInit},
    ml_decoder::{MlDecoder, MlDecoderInit},
};

pub const STEM_DOWNSCALE: i64 = 4;

/// Backbone variants, named after the checkpoints they load.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum Variant {
    #[serde(rename = "tresnet_m")]
    #[strum(serialize = "tresnet_m")]
    TResNetM,
    #[serde(rename = "tresnet_l")]
    #[strum(serialize = "tresnet_l")]
    TResNetL,
    #[serde(rename = "tresnet_xl")]
    #[strum(serialize = "tresnet_xl")]
    TResNetXl,
}

impl Variant {
    pub fn width(&self) -> i64 {
        match self {
            Variant::TResNetM => 64,
            Variant::TResNetL => 80,
            Variant::TResNetXl => 96,
        }
    }

    pub fn depths(&self) -> [usize; 4] {
        match self {
            Variant::TResNetM => [3, 4, 11, 3],
            Variant::TResNetL => [4, 5, 18, 3],
            Variant::TResNetXl => [4, 5, 24, 3],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierInit {
    pub num_classes: i64,
    pub variant: Variant,
    pub input_size: i64,
    pub use_decoder: bool,
}

impl ClassifierInit {
    pub fn build<'p, P>(self, path: P) -> Result<Classifier>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            num_classes,
            variant,
            input_size,
            use_decoder,
        } = self;

        ensure!(num_classes > 0, "num_classes must be positive");
        ensure!(
            input_size > 0 && input_size % 32 == 0,
            "input size {} is not a positive multiple of 32",
            input_size
        );

        let w = variant.width();
        let depths = variant.depths();
        let stage_channels = [w, w * 2, w * 4, w * 8];

        // Space-to-depth stem: 3 channels become 3 * 4 * 4.
        let stem = ConvBn2DInit::new(3 * STEM_DOWNSCALE * STEM_DOWNSCALE, w, 3)
            .build(path / "stem");

        let mut in_c = w;
        let mut stages = Vec::new();
        for (stage_index, (&out_c, &depth)) in
            stage_channels.iter().zip(depths.iter()).enumerate()
        {
            let stage_path = path / format!("stage{}", stage_index + 1);
            let mut blocks = Vec::with_capacity(depth);
            for block_index in 0..depth {
                let s = if block_index == 0 && stage_index > 0 { 2 } else { 1 };
                let block_path = &stage_path / format!("block{}", block_index);
                let block = if stage_index < 2 {
                    Block::Basic(BasicBlockInit { in_c, out_c, s }.build(block_path))
                } else {
                    Block::Bottleneck(BottleneckInit { in_c, out_c, s }.build(block_path))
                };
                blocks.push(block);
                in_c = out_c;
            }
            stages.push(blocks);
        }

        let feature_dim = stage_channels[3];
        let head = if use_decoder {
            Head::Decoder(
                MlDecoderInit {
                    num_classes,
                    in_dim: feature_dim,
                    embed_dim: feature_dim.min(512),
                    num_groups: num_classes.min(100),
                }
                .build(path / "head"),
            )
        } else {
            Head::Linear(nn::linear(
                path / "head",
                feature_dim,
                num_classes,
                Default::default(),
            ))
        };

        Ok(Classifier {
            stem,
            stages,
            head,
            num_classes,
            input_size,
            variant,
        })
    }
}

#[derive(Debug)]
enum Block {
    Basic(BasicBlock),
    Bottleneck(Bottleneck),
}

impl nn::ModuleT for Block {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        match self {
            Block::Basic(block) => block.forward_t(xs, train),
            Block::Bottleneck(block) => block.forward_t(xs, train),
        }
    }
}

impl Block {
    fn fuse_batch_norm(&mut self) {
        match self {
            Block::Basic(block) => block.fuse_batch_norm(),
            Block::Bottleneck(block) => block.fuse_batch_norm(),
        }
    }
}

#[derive(Debug)]
enum Head {
    Linear(nn::Linear),
    Decoder(MlDecoder),
}

#[derive(Debug)]
pub struct Classifier {
    stem: ConvBn2D,
    stages: Vec<Vec<Block>>,
    head: Head,
    num_classes: i64,
    input_size: i64,
    variant: Variant,
}

impl nn::ModuleT for Classifier {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let xs = xs.pixel_unshuffle(STEM_DOWNSCALE);
        let mut xs = self.stem.forward_t(&xs, train);
        for stage in &self.stages {
            for block in stage {
                xs = block.forward_t(&xs, train);
            }
        }

        match &self.head {
            Head::Linear(linear) => xs
                .adaptive_avg_pool2d(&[1, 1])
                .flatten(1, 3)
                .apply(linear),
            Head::Decoder(decoder) => decoder.forward_t(&xs, train),
        }
    }
}

impl Classifier {
    /// Recursive equivalent of the usual `fuse_bn_recursively` pass.
    pub fn fuse_batch_norm(&mut self) {
        self.stem.fuse_batch_norm();
        for stage in &mut self.stages {
            for block in stage {
                block.fuse_batch_norm();
            }
        }
    }

    pub fn num_classes(&self) -> i64 {
        self.num_classes
    }

    pub fn input_size(&self) -> i64 {
        self.input_size
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }
}
