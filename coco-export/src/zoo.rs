use crate::{common::*, config::ModelConfig};
use tch_classifier::{Classifier, ClassifierInit};

/// A constructed model together with its weight store and class table.
pub struct LoadedModel {
    pub model: Classifier,
    pub vs: nn::VarStore,
    pub classes: IndexSet<String>,
}

/// Makes sure `path` exists locally, fetching it from `url` if absent.
///
/// No network access happens when the file is already present.
pub fn ensure_file(path: &Path, url: &str) -> Result<()> {
    if path.exists() {
        info!("found '{}', skipping download", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }

    info!("downloading '{}' from {}", path.display(), url);
    let response = reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("failed to download '{}'", url))?;
    let bytes = response
        .bytes()
        .with_context(|| format!("failed to read response body from '{}'", url))?;
    fs::write(path, &bytes)
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    Ok(())
}

/// Loads the ordered class-name table shipped with the checkpoint.
pub fn load_class_table(path: &Path) -> Result<IndexSet<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read class table '{}'", path.display()))?;
    let names: Vec<String> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse class table '{}'", path.display()))?;
    let classes: IndexSet<String> = names.iter().cloned().collect();
    ensure!(
        classes.len() == names.len(),
        "class table '{}' contains duplicate names",
        path.display()
    );
    Ok(classes)
}

/// Provisions the checkpoint, builds the classifier, loads the weights,
/// and fuses the batch norm layers for inference.
pub fn load_model(config: &ModelConfig) -> Result<LoadedModel> {
    let ModelConfig {
        ref weights_file,
        ref weights_url,
        ref classes_file,
        ref classes_url,
        arch,
        num_classes,
        input_size,
        use_ml_decoder,
        device,
    } = *config;

    ensure_file(weights_file, weights_url)?;
    ensure_file(classes_file, classes_url)?;

    let classes = load_class_table(classes_file)?;
    ensure!(
        classes.len() == num_classes,
        "class table has {} entries but the model is configured for {} classes",
        classes.len(),
        num_classes
    );

    let mut vs = nn::VarStore::new(device);
    let mut model = ClassifierInit {
        num_classes: num_classes as i64,
        variant: arch,
        input_size: input_size as i64,
        use_decoder: use_ml_decoder,
    }
    .build(vs.root())?;

    vs.load(weights_file)
        .with_context(|| format!("failed to load weights from '{}'", weights_file.display()))?;

    // Fold batch norm into the convolutions after the statistics are in
    // place, mirroring the checkpoint's published inference recipe.
    model.fuse_batch_norm();
    vs.freeze();

    info!(
        "model {} loaded on {:?} with {} classes",
        arch.as_ref(),
        device,
        num_classes
    );

    Ok(LoadedModel { model, vs, classes })
}
