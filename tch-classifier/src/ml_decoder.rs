use crate::common::*;

/// Attention decoder head for multi-label classification.
///
/// A fixed set of learned group queries attends over the flattened
/// spatial features, and every group projects its attended embedding to
/// a contiguous slice of class logits. This is the non-shared-query
/// variant: `num_groups * classes_per_group >= num_classes`, and the
/// surplus logits are discarded.
#[derive(Debug, Clone)]
pub struct MlDecoderInit {
    pub num_classes: i64,
    pub in_dim: i64,
    pub embed_dim: i64,
    pub num_groups: i64,
}

impl MlDecoderInit {
    pub fn build<'p, P>(self, path: P) -> MlDecoder
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            num_classes,
            in_dim,
            embed_dim,
            num_groups,
        } = self;
        let classes_per_group = (num_classes + num_groups - 1) / num_groups;

        let input_proj = nn::linear(path / "input_proj", in_dim, embed_dim, Default::default());
        let queries = path.var(
            "query_embed",
            &[num_groups, embed_dim],
            nn::Init::Randn {
                mean: 0.0,
                stdev: 0.02,
            },
        );
        let group_fc = path.var(
            "group_fc",
            &[num_groups, embed_dim, classes_per_group],
            nn::Init::Randn {
                mean: 0.0,
                stdev: 0.02,
            },
        );
        let group_bias = path.var(
            "group_bias",
            &[num_groups * classes_per_group],
            nn::Init::Const(0.0),
        );

        MlDecoder {
            input_proj,
            queries,
            group_fc,
            group_bias,
            num_classes,
            embed_dim,
        }
    }
}

#[derive(Debug)]
pub struct MlDecoder {
    input_proj: nn::Linear,
    queries: Tensor,
    group_fc: Tensor,
    group_bias: Tensor,
    num_classes: i64,
    embed_dim: i64,
}

impl nn::ModuleT for MlDecoder {
    fn forward_t(&self, features: &Tensor, _train: bool) -> Tensor {
        let Self {
            ref input_proj,
            ref queries,
            ref group_fc,
            ref group_bias,
            num_classes,
            embed_dim,
        } = *self;

        // [b, c, h, w] -> [b, h*w, e]
        let keys = features
            .flatten(2, 3)
            .transpose(1, 2)
            .apply(input_proj);

        // [b, g, h*w]
        let attn = (keys.matmul(&queries.tr()).transpose(1, 2) / (embed_dim as f64).sqrt())
            .softmax(-1, Kind::Float);

        // [b, g, e]
        let attended = attn.matmul(&keys);

        // [b, g, 1, e] x [g, e, cpg] -> [b, g, cpg]
        let logits = attended
            .unsqueeze(2)
            .matmul(group_fc)
            .squeeze_dim(2)
            .flatten(1, 2)
            + group_bias;

        logits.narrow(1, 0, num_classes)
    }
}

impl MlDecoder {
    pub fn num_classes(&self) -> i64 {
        self.num_classes
    }
}
