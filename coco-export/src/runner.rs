use crate::{
    common::*,
    dataset::{load_image, MultiLabelDataset},
};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array2, ArrayView1, ArrayView2};

/// Row-aligned sigmoid scores, ground-truth labels, and source paths.
///
/// The three members always have the same row count and row order; the
/// runner populates them in dataset order and the filter compacts them
/// together.
#[derive(Debug, Clone)]
pub struct ScoreTable {
    pub scores: Array2<f32>,
    pub labels: Array2<f32>,
    pub paths: Vec<PathBuf>,
}

impl ScoreTable {
    pub fn num_rows(&self) -> usize {
        self.scores.nrows()
    }
}

/// Runs the model over the whole dataset, one fixed-size batch at a
/// time (the last batch may be short), writing sigmoid probabilities
/// and label rows into pre-allocated matrices at the running offset.
pub fn run_inference<M>(
    model: &M,
    dataset: &MultiLabelDataset,
    input_size: i64,
    batch_size: usize,
    device: Device,
) -> Result<ScoreTable>
where
    M: nn::ModuleT,
{
    ensure!(batch_size > 0, "batch size must be positive");

    let num_rows = dataset.len();
    let num_classes = dataset.num_classes;
    let mut scores = Array2::<f32>::zeros((num_rows, num_classes));
    let mut labels = Array2::<f32>::zeros((num_rows, num_classes));
    let mut paths = Vec::with_capacity(num_rows);

    info!("computing sigmoid scores for {} images", num_rows);
    let bar = ProgressBar::new(num_rows as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut offset = 0;
    for batch in dataset.records.chunks(batch_size) {
        let images: Vec<Tensor> = batch
            .iter()
            .map(|record| load_image(&record.path, input_size))
            .try_collect()?;
        let input = Tensor::stack(&images, 0).to_device(device);

        let probs = tch::no_grad(|| model.forward_t(&input, false).sigmoid())
            .to_device(Device::Cpu);

        let (rows, cols) = probs
            .size2()
            .map_err(|_| format_err!("model produced a non-matrix output"))?;
        ensure!(
            rows as usize == batch.len() && cols as usize == num_classes,
            "model output shape mismatch: got [{}, {}], expected [{}, {}]",
            rows,
            cols,
            batch.len(),
            num_classes
        );

        let flat = Vec::<f32>::from(&probs.contiguous().view([-1]));
        let batch_scores = ArrayView2::from_shape((batch.len(), num_classes), &flat)?;
        scores
            .slice_mut(s![offset..offset + batch.len(), ..])
            .assign(&batch_scores);

        for (row, record) in batch.iter().enumerate() {
            labels
                .slice_mut(s![offset + row, ..])
                .assign(&ArrayView1::from(record.labels.as_slice()));
            paths.push(record.path.clone());
        }

        offset += batch.len();
        bar.inc(batch.len() as u64);
    }
    bar.finish();

    Ok(ScoreTable {
        scores,
        labels,
        paths,
    })
}
