//! Exports multi-label sigmoid scores for a COCO-style dataset.
//!
//! The pipeline is strictly sequential: provision the pretrained
//! checkpoint, adapt the dataset, run batched inference, drop
//! zero-label rows, sample example rows, and persist the results.

mod common;
pub mod config;
pub mod dataset;
pub mod export;
pub mod runner;
pub mod sample;
pub mod zoo;

use crate::{common::*, config::Config, dataset::MultiLabelDataset, zoo::LoadedModel};
use rand::{rngs::StdRng, SeedableRng};

pub fn run(config: &Config) -> Result<()> {
    let Config {
        model: ref model_cfg,
        dataset: ref dataset_cfg,
        export: ref export_cfg,
        ..
    } = *config;

    // model
    let LoadedModel {
        model,
        vs: _vs,
        classes,
    } = zoo::load_model(model_cfg)?;
    export::write_class_table(&export_cfg.class_names_file, &classes)?;

    // dataset
    let dataset = MultiLabelDataset::load(&dataset_cfg.dataset_dir, &dataset_cfg.split, &classes)?;
    info!(
        "dataset '{}' loaded with {} images",
        dataset_cfg.split,
        dataset.len()
    );

    // inference
    let table = runner::run_inference(
        &model,
        &dataset,
        model_cfg.input_size as i64,
        export_cfg.batch_size,
        model_cfg.device,
    )?;

    // filter and sample
    let table = table.retain_labeled();
    info!(
        "{} rows retained after dropping zero-label images",
        table.num_rows()
    );

    let mut rng = match export_cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let indexes = table.sample_examples(export_cfg.num_examples, &mut rng)?;

    // persist
    info!(
        "writing scores and labels to '{}'",
        export_cfg.archive_file.display()
    );
    export::write_archive(&export_cfg.archive_file, &table, &indexes)?;

    info!(
        "copying {} example images to '{}'",
        indexes.len(),
        export_cfg.examples_dir.display()
    );
    export::copy_examples(&export_cfg.examples_dir, &table, &indexes)?;

    Ok(())
}
